use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::device::AudioDevice;

/// Everything that has to be undone to put the user's audio routing back.
///
/// Written to disk before any default device is switched, so a crash leaves
/// enough behind for the next launch to repair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingPlan {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub original_output: AudioDevice,
    pub original_input: Option<AudioDevice>,
    pub aggregate: AudioDevice,
    pub loopback: AudioDevice,
}

impl RoutingPlan {
    pub fn new(
        original_output: AudioDevice,
        original_input: Option<AudioDevice>,
        aggregate: AudioDevice,
        loopback: AudioDevice,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            original_output,
            original_input,
            aggregate,
            loopback,
        }
    }
}

/// Routing controller state machine.
///
/// ```text
/// NotRouted → Switching → Routed → Restoring → NotRouted
///                 ↓ (failure / cancel: unwind)
///             NotRouted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingPhase {
    NotRouted,
    Switching,
    Routed,
    Restoring,
}
