use serde::{Deserialize, Serialize};

/// Which stream directions a device supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceDirection {
    Input,
    Output,
    Both,
}

impl DeviceDirection {
    pub fn has_output(self) -> bool {
        matches!(self, Self::Output | Self::Both)
    }

    pub fn has_input(self) -> bool {
        matches!(self, Self::Input | Self::Both)
    }

    /// Combine the directions of two listings of the same device.
    pub fn merge(self, other: Self) -> Self {
        if self == other {
            self
        } else {
            Self::Both
        }
    }
}

/// A system audio device as seen at enumeration time.
///
/// `id` is the device UID, which survives reboots and re-enumeration, so it is
/// what gets persisted in a [`RoutingPlan`](super::routing_plan::RoutingPlan).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioDevice {
    pub id: String,
    pub name: String,
    pub direction: DeviceDirection,
    #[serde(default)]
    pub is_aggregate: bool,
}

impl AudioDevice {
    pub fn new(id: impl Into<String>, name: impl Into<String>, direction: DeviceDirection) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            direction,
            is_aggregate: false,
        }
    }

    pub fn aggregate(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            direction: DeviceDirection::Output,
            is_aggregate: true,
        }
    }

    pub fn is_same(&self, other: &AudioDevice) -> bool {
        self.id == other.id
    }

    /// Exact name match first, then substring ("BlackHole 2ch" matches "BlackHole 2ch (virtual)").
    pub fn matches_name(&self, name: &str) -> bool {
        self.name == name || self.name.contains(name)
    }
}
