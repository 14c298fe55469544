use parking_lot::Mutex;

use super::cancel::CancelToken;
use super::plan_store::PlanStore;
use crate::models::device::AudioDevice;
use crate::models::error::{CaptureError, DeviceError};
use crate::models::routing_plan::{RoutingPhase, RoutingPlan};
use crate::traits::device_registry::AudioDeviceRegistry;

/// Names the controller looks up and creates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingOptions {
    pub loopback_name: String,
    pub aggregate_name: String,
}

impl Default for RoutingOptions {
    fn default() -> Self {
        Self {
            loopback_name: "BlackHole 2ch".into(),
            aggregate_name: "SoundGrabber".into(),
        }
    }
}

/// A completed routing step, recorded so a failure can undo it.
#[derive(Debug)]
enum Step {
    CreatedAggregate(AudioDevice),
    PersistedPlan,
    SwitchedOutput { previous: AudioDevice },
    SwitchedInput { previous: Option<AudioDevice> },
}

/// Owns every change SoundGrabber makes to the system's audio routing.
///
/// ```text
/// NotRouted → Switching → Routed → Restoring → NotRouted
/// ```
///
/// The routing plan is persisted before any default device is switched and
/// removed only once everything has been put back, so a crash at any point
/// leaves enough on disk for [`repair_orphaned`](Self::repair_orphaned).
/// Transactions are serialized; a begin never interleaves with an end.
pub struct RoutingController<R> {
    registry: R,
    store: PlanStore,
    options: RoutingOptions,
    phase: Mutex<RoutingPhase>,
    transaction: Mutex<()>,
}

impl<R: AudioDeviceRegistry> RoutingController<R> {
    pub fn new(registry: R, store: PlanStore, options: RoutingOptions) -> Self {
        Self {
            registry,
            store,
            options,
            phase: Mutex::new(RoutingPhase::NotRouted),
            transaction: Mutex::new(()),
        }
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    pub fn options(&self) -> &RoutingOptions {
        &self.options
    }

    pub fn phase(&self) -> RoutingPhase {
        *self.phase.lock()
    }

    /// A plan from an earlier session is still on disk.
    pub fn has_persisted_plan(&self) -> bool {
        self.store.exists()
    }

    fn set_phase(&self, phase: RoutingPhase) {
        let mut current = self.phase.lock();
        if *current != phase {
            log::debug!("Routing phase {:?} -> {:?}", *current, phase);
            *current = phase;
        }
    }

    /// Route system output through an aggregate that mirrors into the loopback.
    ///
    /// On failure or cancellation every completed step has been undone when
    /// this returns.
    pub fn begin_routing(&self, cancel: &CancelToken) -> Result<RoutingPlan, CaptureError> {
        let _tx = self.transaction.lock();

        if let Some(stale) = self.store.load()? {
            return Err(CaptureError::RoutingFailed(format!(
                "routing plan {} from an earlier session has not been restored",
                stale.id
            )));
        }

        self.set_phase(RoutingPhase::Switching);
        let mut journal = Vec::new();
        match self.apply(cancel, &mut journal) {
            Ok(plan) => {
                self.set_phase(RoutingPhase::Routed);
                log::info!(
                    "Routed output {} -> {} (plan {})",
                    plan.original_output.name,
                    plan.aggregate.name,
                    plan.id
                );
                Ok(plan)
            }
            Err(e) => {
                log::warn!("Routing aborted after {} step(s): {}", journal.len(), e);
                if let Err(unwind) = self.unwind(journal) {
                    log::error!("Routing unwind incomplete: {}", unwind);
                }
                self.set_phase(RoutingPhase::NotRouted);
                Err(e)
            }
        }
    }

    fn apply(&self, cancel: &CancelToken, journal: &mut Vec<Step>) -> Result<RoutingPlan, CaptureError> {
        cancel.check()?;
        let original_output = self.registry.default_output().map_err(DeviceError::into_routing)?;
        if original_output.is_aggregate {
            return Err(CaptureError::RoutingFailed(format!(
                "default output '{}' is already an aggregate device",
                original_output.name
            )));
        }
        let original_input = match self.registry.default_input() {
            Ok(device) => Some(device),
            Err(DeviceError::NotFound(_)) => None,
            Err(e) => return Err(e.into_routing()),
        };

        cancel.check()?;
        let loopback = self
            .registry
            .find_device(&self.options.loopback_name)
            .map_err(DeviceError::into_enumeration)?
            .filter(|d| d.direction.has_input() && !d.is_aggregate)
            .ok_or_else(|| {
                CaptureError::RoutingFailed(format!("loopback device '{}' not found", self.options.loopback_name))
            })?;

        cancel.check()?;
        let aggregate = self
            .registry
            .create_aggregate_device(&loopback, &original_output, &self.options.aggregate_name)
            .map_err(DeviceError::into_routing)?;
        journal.push(Step::CreatedAggregate(aggregate.clone()));

        let plan = RoutingPlan::new(original_output.clone(), original_input.clone(), aggregate, loopback);
        self.store.save(&plan)?;
        journal.push(Step::PersistedPlan);

        cancel.check()?;
        if !original_output.is_same(&plan.aggregate) {
            self.registry
                .set_default_output(&plan.aggregate)
                .map_err(DeviceError::into_routing)?;
            journal.push(Step::SwitchedOutput {
                previous: original_output,
            });
        }

        cancel.check()?;
        if !original_input.as_ref().is_some_and(|d| d.is_same(&plan.loopback)) {
            self.registry
                .set_default_input(&plan.loopback)
                .map_err(DeviceError::into_routing)?;
            journal.push(Step::SwitchedInput {
                previous: original_input,
            });
        }

        cancel.check()?;
        Ok(plan)
    }

    /// Undo `journal` in reverse. The persisted plan goes last, and only if
    /// everything else was undone.
    fn unwind(&self, journal: Vec<Step>) -> Result<(), CaptureError> {
        let mut failures = Vec::new();
        let mut persisted = false;

        for step in journal.into_iter().rev() {
            let result = match step {
                Step::SwitchedInput { previous: Some(previous) } => {
                    self.restore_input(&previous).map_err(|e| format!("restore input: {}", e))
                }
                Step::SwitchedInput { previous: None } => Ok(()),
                Step::SwitchedOutput { previous } => self
                    .restore_output(&previous, None)
                    .map_err(|e| format!("restore output: {}", e)),
                Step::PersistedPlan => {
                    persisted = true;
                    Ok(())
                }
                Step::CreatedAggregate(aggregate) => self
                    .registry
                    .destroy_aggregate_device(&aggregate)
                    .map_err(|e| format!("destroy aggregate: {}", e)),
            };
            if let Err(failure) = result {
                failures.push(failure);
            }
        }

        if !failures.is_empty() {
            return Err(CaptureError::RoutingFailed(failures.join("; ")));
        }
        if persisted {
            self.store.clear()?;
        }
        Ok(())
    }

    /// Put the routing in `plan` back the way it was.
    ///
    /// Idempotent: pieces that are already restored or gone are skipped. Every
    /// step is attempted; if any fails the plan stays on disk for the next
    /// repair and the joined failures are returned.
    pub fn end_routing(&self, plan: &RoutingPlan) -> Result<(), CaptureError> {
        let _tx = self.transaction.lock();
        self.set_phase(RoutingPhase::Restoring);
        let result = self.restore_plan(plan);
        self.set_phase(RoutingPhase::NotRouted);
        match &result {
            Ok(()) => log::info!("Restored routing from plan {}", plan.id),
            Err(e) => log::error!("Restoring plan {} failed: {}", plan.id, e),
        }
        result
    }

    /// Restore a plan left behind by a session that never ended (crash, kill).
    ///
    /// Returns the repaired plan, or `None` if there was nothing to repair.
    /// Does nothing while this controller has routing of its own applied.
    pub fn repair_orphaned(&self) -> Result<Option<RoutingPlan>, CaptureError> {
        let _tx = self.transaction.lock();
        if self.phase() != RoutingPhase::NotRouted {
            return Ok(None);
        }
        let Some(plan) = self.store.load()? else {
            return Ok(None);
        };

        log::warn!(
            "Found routing plan {} from {} left by a previous run; restoring",
            plan.id,
            plan.created_at.to_rfc3339()
        );
        self.set_phase(RoutingPhase::Restoring);
        let result = self.restore_plan(&plan);
        self.set_phase(RoutingPhase::NotRouted);
        result.map(|()| Some(plan))
    }

    fn restore_plan(&self, plan: &RoutingPlan) -> Result<(), CaptureError> {
        let mut failures = Vec::new();

        if let Err(e) = self.restore_output(&plan.original_output, Some(plan.loopback.id.as_str())) {
            failures.push(format!("restore output: {}", e));
        }
        if let Some(input) = &plan.original_input {
            if let Err(e) = self.restore_input(input) {
                failures.push(format!("restore input: {}", e));
            }
        }
        if let Err(e) = self.registry.destroy_aggregate_device(&plan.aggregate) {
            failures.push(format!("destroy aggregate: {}", e));
        }

        if !failures.is_empty() {
            return Err(CaptureError::RoutingFailed(failures.join("; ")));
        }
        self.store.clear()
    }

    /// Make `original` the default output again, or the first ordinary output
    /// if it has been unplugged.
    fn restore_output(&self, original: &AudioDevice, loopback_id: Option<&str>) -> Result<(), DeviceError> {
        let devices = self.registry.list_devices()?;
        let target = if devices.iter().any(|d| d.is_same(original)) {
            original.clone()
        } else {
            let fallback = devices
                .into_iter()
                .find(|d| {
                    d.direction.has_output()
                        && !d.is_aggregate
                        && !d.matches_name(&self.options.loopback_name)
                        && Some(d.id.as_str()) != loopback_id
                })
                .ok_or_else(|| DeviceError::NotFound(format!("{} (no fallback output)", original.name)))?;
            log::warn!(
                "Original output '{}' is gone; restoring to '{}'",
                original.name,
                fallback.name
            );
            fallback
        };

        if self.registry.default_output().is_ok_and(|d| d.is_same(&target)) {
            return Ok(());
        }
        self.registry.set_default_output(&target)
    }

    fn restore_input(&self, original: &AudioDevice) -> Result<(), DeviceError> {
        if !self.registry.contains(original)? {
            log::warn!("Original input '{}' is gone; leaving input as is", original.name);
            return Ok(());
        }
        if self.registry.default_input().is_ok_and(|d| d.is_same(original)) {
            return Ok(());
        }
        self.registry.set_default_input(original)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{RegistryOp, SimulatedAudioSystem};
    use std::sync::Arc;

    fn controller(dir: &std::path::Path) -> (Arc<SimulatedAudioSystem>, RoutingController<Arc<SimulatedAudioSystem>>) {
        let system = Arc::new(SimulatedAudioSystem::with_standard_devices());
        let controller = RoutingController::new(system.clone(), PlanStore::in_dir(dir), RoutingOptions::default());
        (system, controller)
    }

    #[test]
    fn begin_and_end() {
        let dir = tempfile::tempdir().unwrap();
        let (system, controller) = controller(dir.path());

        let plan = controller.begin_routing(&CancelToken::new()).unwrap();
        assert_eq!(controller.phase(), RoutingPhase::Routed);
        assert!(controller.has_persisted_plan());
        assert_eq!(system.current_output().unwrap(), plan.aggregate);
        assert_eq!(system.current_input().unwrap(), plan.loopback);
        assert_eq!(plan.original_output.name, "Speakers");

        controller.end_routing(&plan).unwrap();
        assert_eq!(controller.phase(), RoutingPhase::NotRouted);
        assert!(!controller.has_persisted_plan());
        assert_eq!(system.current_output().unwrap().name, "Speakers");
        assert_eq!(system.current_input().unwrap().name, "Built-in Microphone");
        assert!(system.aggregates().is_empty());

        // Idempotent.
        controller.end_routing(&plan).unwrap();
    }

    #[test]
    fn missing_loopback_fails_without_side_effects() {
        let dir = tempfile::tempdir().unwrap();
        let (system, controller) = controller(dir.path());
        system.remove_device("BlackHole2ch_UID");

        let err = controller.begin_routing(&CancelToken::new()).unwrap_err();
        assert!(matches!(err, CaptureError::RoutingFailed(_)));
        assert_eq!(system.call_count(RegistryOp::CreateAggregate), 0);
        assert_eq!(system.current_output().unwrap().name, "Speakers");
        assert_eq!(controller.phase(), RoutingPhase::NotRouted);
    }

    #[test]
    fn cancelled_token_does_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (system, controller) = controller(dir.path());
        let cancel = CancelToken::new();
        cancel.cancel();

        assert_eq!(controller.begin_routing(&cancel), Err(CaptureError::Cancelled));
        assert!(system.calls().is_empty());
    }

    #[test]
    fn refuses_while_a_plan_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let (_system, controller) = controller(dir.path());
        let plan = controller.begin_routing(&CancelToken::new()).unwrap();

        assert!(matches!(
            controller.begin_routing(&CancelToken::new()),
            Err(CaptureError::RoutingFailed(_))
        ));
        controller.end_routing(&plan).unwrap();
    }

    #[test]
    fn unplugged_original_output_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let (system, controller) = controller(dir.path());
        system.add_device(AudioDevice::new(
            "usb",
            "USB Headset",
            crate::models::device::DeviceDirection::Output,
        ));
        system.force_default_output("usb");

        let plan = controller.begin_routing(&CancelToken::new()).unwrap();
        system.remove_device("usb");
        controller.end_routing(&plan).unwrap();

        let restored = system.current_output().unwrap();
        assert_eq!(restored.name, "Speakers");
        assert!(system.aggregates().is_empty());
    }

    #[test]
    fn failed_restore_keeps_plan_for_repair() {
        let dir = tempfile::tempdir().unwrap();
        let (system, controller) = controller(dir.path());
        let plan = controller.begin_routing(&CancelToken::new()).unwrap();

        system.fail_always(RegistryOp::DestroyAggregate, DeviceError::Failed("busy".into()));
        assert!(controller.end_routing(&plan).is_err());
        assert!(controller.has_persisted_plan());
        // Everything else was still attempted.
        assert_eq!(system.current_output().unwrap().name, "Speakers");

        system.clear_faults();
        assert_eq!(controller.repair_orphaned().unwrap(), Some(plan));
        assert!(!controller.has_persisted_plan());
        assert!(system.aggregates().is_empty());
    }
}
