use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::models::error::CaptureError;
use crate::models::routing_plan::RoutingPlan;

pub const PLAN_FILE_NAME: &str = "routing-plan.json";

/// Durable copy of the in-flight [`RoutingPlan`].
///
/// Present on disk exactly while routing may be applied. Writes go to a
/// temporary file that is renamed into place, so a crash mid-write leaves
/// either the old plan or the new one.
#[derive(Debug, Clone)]
pub struct PlanStore {
    path: PathBuf,
}

impl PlanStore {
    /// Store `routing-plan.json` in `state_dir`.
    pub fn in_dir(state_dir: &Path) -> Self {
        Self {
            path: state_dir.join(PLAN_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn save(&self, plan: &RoutingPlan) -> Result<(), CaptureError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| storage("failed to create state directory", e))?;
        }
        let json = serde_json::to_vec_pretty(plan)
            .map_err(|e| CaptureError::StorageError(format!("failed to serialize routing plan: {}", e)))?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| storage("failed to write routing plan", e))?;
        fs::rename(&tmp, &self.path).map_err(|e| storage("failed to persist routing plan", e))?;
        log::debug!("Persisted routing plan {} to {}", plan.id, self.path.display());
        Ok(())
    }

    /// The persisted plan, if any.
    ///
    /// An unreadable plan is moved aside to `*.corrupt` and treated as absent;
    /// there is nothing in it that could be used to restore routing.
    pub fn load(&self) -> Result<Option<RoutingPlan>, CaptureError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(storage("failed to read routing plan", e)),
        };
        match serde_json::from_slice(&bytes) {
            Ok(plan) => Ok(Some(plan)),
            Err(e) => {
                let aside = self.path.with_extension("json.corrupt");
                log::warn!(
                    "Routing plan at {} is unreadable ({}); moving it to {}",
                    self.path.display(),
                    e,
                    aside.display()
                );
                fs::rename(&self.path, &aside).map_err(|e| storage("failed to move corrupt routing plan", e))?;
                Ok(None)
            }
        }
    }

    /// Remove the persisted plan. Already absent is fine.
    pub fn clear(&self) -> Result<(), CaptureError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage("failed to remove routing plan", e)),
        }
    }
}

fn storage(context: &str, e: io::Error) -> CaptureError {
    CaptureError::StorageError(format!("{}: {}", context, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::device::{AudioDevice, DeviceDirection};

    fn plan() -> RoutingPlan {
        RoutingPlan::new(
            AudioDevice::new("spk", "Speakers", DeviceDirection::Output),
            Some(AudioDevice::new("mic", "Built-in Microphone", DeviceDirection::Input)),
            AudioDevice::aggregate("agg", "SoundGrabber"),
            AudioDevice::new("bh", "BlackHole 2ch", DeviceDirection::Both),
        )
    }

    #[test]
    fn save_load_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = PlanStore::in_dir(&dir.path().join("state"));
        assert_eq!(store.load().unwrap(), None);

        let plan = plan();
        store.save(&plan).unwrap();
        assert!(store.exists());
        assert_eq!(store.load().unwrap(), Some(plan));

        store.clear().unwrap();
        assert!(!store.exists());
        store.clear().unwrap();
    }

    #[test]
    fn no_temp_file_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = PlanStore::in_dir(dir.path());
        store.save(&plan()).unwrap();

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec![PLAN_FILE_NAME.to_string()]);
    }

    #[test]
    fn corrupt_plan_is_moved_aside() {
        let dir = tempfile::tempdir().unwrap();
        let store = PlanStore::in_dir(dir.path());
        fs::write(store.path(), b"{not json").unwrap();

        assert_eq!(store.load().unwrap(), None);
        assert!(!store.exists());
        assert!(dir.path().join("routing-plan.json.corrupt").exists());
    }
}
