use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// External components SoundGrabber needs before it can route audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dependency {
    /// Virtual loopback audio driver (BlackHole 2ch).
    LoopbackDriver,
    /// Command-line default-device switcher (SwitchAudioSource).
    SwitchHelper,
}

impl Dependency {
    /// Install order: the driver first, the helper second.
    pub const ALL: [Dependency; 2] = [Dependency::LoopbackDriver, Dependency::SwitchHelper];

    pub fn is_required(self) -> bool {
        true
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::LoopbackDriver => "loopback driver",
            Self::SwitchHelper => "device switch helper",
        }
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Installation status of a single dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DependencyStatus {
    Missing,
    Installing,
    InstallFailed { reason: String },
    Installed { version: Option<String> },
}

impl DependencyStatus {
    pub fn is_installed(&self) -> bool {
        matches!(self, Self::Installed { .. })
    }
}

impl fmt::Display for DependencyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => f.write_str("missing"),
            Self::Installing => f.write_str("installing"),
            Self::InstallFailed { reason } => write!(f, "install failed: {reason}"),
            Self::Installed { version: Some(v) } => write!(f, "installed ({v})"),
            Self::Installed { version: None } => f.write_str("installed"),
        }
    }
}

pub type DependencyReport = BTreeMap<Dependency, DependencyStatus>;

/// Result of a single installer run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    Installed,
    Failed(String),
}

impl InstallOutcome {
    pub fn is_installed(&self) -> bool {
        matches!(self, Self::Installed)
    }
}

/// Required dependencies in `report` that are not installed.
pub fn missing_required(report: &DependencyReport) -> Vec<Dependency> {
    Dependency::ALL
        .iter()
        .copied()
        .filter(|dep| dep.is_required())
        .filter(|dep| !report.get(dep).map(DependencyStatus::is_installed).unwrap_or(false))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_entries_count_as_missing() {
        let mut report = DependencyReport::new();
        report.insert(Dependency::SwitchHelper, DependencyStatus::Installed { version: None });

        assert_eq!(missing_required(&report), vec![Dependency::LoopbackDriver]);
    }

    #[test]
    fn install_failure_is_not_installed() {
        let mut report = DependencyReport::new();
        report.insert(
            Dependency::LoopbackDriver,
            DependencyStatus::InstallFailed {
                reason: "user cancelled".into(),
            },
        );
        report.insert(
            Dependency::SwitchHelper,
            DependencyStatus::Installed {
                version: Some("1.2.2".into()),
            },
        );

        assert_eq!(missing_required(&report), vec![Dependency::LoopbackDriver]);
    }

    #[test]
    fn status_serializes_with_tag() {
        let json = serde_json::to_string(&DependencyStatus::Installed {
            version: Some("0.6.0".into()),
        })
        .unwrap();
        assert_eq!(json, r#"{"status":"installed","version":"0.6.0"}"#);
    }
}
