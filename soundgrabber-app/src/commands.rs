use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};

use soundgrabber_core::models::dependency::missing_required;
use soundgrabber_core::{
    AudioDeviceRegistry, CaptureProvider, Dependency, DeviceDirection, InstallOutcome, RecordingArtifact,
    SessionSupervisor,
};

use crate::console_delegate::ConsoleDelegate;

const HEALTH_INTERVAL: Duration = Duration::from_millis(250);

pub fn doctor<R, P>(supervisor: &SessionSupervisor<R, P>) -> anyhow::Result<()>
where
    R: AudioDeviceRegistry,
    P: CaptureProvider,
{
    let report = supervisor.check_dependencies();
    for (dependency, status) in &report {
        println!("{:<22} {}", dependency.label(), status);
    }
    println!("{:<22} {:?}", "routing", supervisor.routing_phase());
    println!("{:<22} {}", "output folder", supervisor.settings().output_folder.display());

    let missing = missing_required(&report);
    if !missing.is_empty() {
        println!();
        println!("Run `soundgrabber install` to install the missing dependencies.");
    }
    Ok(())
}

pub fn install<R, P>(supervisor: &SessionSupervisor<R, P>, dependency: Option<Dependency>) -> anyhow::Result<()>
where
    R: AudioDeviceRegistry,
    P: CaptureProvider,
{
    let outcomes = match dependency {
        Some(dep) => vec![(dep, supervisor.install(dep))],
        None => supervisor.install_missing(),
    };
    if outcomes.is_empty() {
        println!("Everything is already installed.");
        return Ok(());
    }

    let mut failed = Vec::new();
    for (dep, outcome) in outcomes {
        match outcome {
            InstallOutcome::Installed => println!("{:<22} installed", dep.label()),
            InstallOutcome::Failed(reason) => {
                println!("{:<22} failed: {}", dep.label(), reason);
                failed.push(dep.label());
            }
        }
    }
    if !failed.is_empty() {
        bail!("could not install {}", failed.join(", "));
    }
    Ok(())
}

pub fn devices<R, P>(supervisor: &SessionSupervisor<R, P>) -> anyhow::Result<()>
where
    R: AudioDeviceRegistry,
    P: CaptureProvider,
{
    let registry = supervisor.registry();
    let devices = registry.list_devices().context("listing audio devices")?;
    let output = registry.default_output().ok();
    let input = registry.default_input().ok();

    for device in &devices {
        let direction = match device.direction {
            DeviceDirection::Input => "in",
            DeviceDirection::Output => "out",
            DeviceDirection::Both => "in/out",
        };
        let mut marks = Vec::new();
        if output.as_ref().is_some_and(|d| d.is_same(device)) {
            marks.push("default output");
        }
        if input.as_ref().is_some_and(|d| d.is_same(device)) {
            marks.push("default input");
        }
        if device.is_aggregate {
            marks.push("aggregate");
        }
        println!("{:<32} {:<7} {}", device.name, direction, marks.join(", "));
    }
    Ok(())
}

pub fn record<R, P>(
    supervisor: &SessionSupervisor<R, P>,
    output: Option<PathBuf>,
    duration: Option<f64>,
    install_missing: bool,
) -> anyhow::Result<()>
where
    R: AudioDeviceRegistry,
    P: CaptureProvider,
{
    let delegate = ConsoleDelegate::new();
    supervisor.set_delegate(delegate.clone());

    let stop_requested = Arc::new(AtomicBool::new(false));
    for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(&stop_requested)).context("installing signal handler")?;
    }

    if install_missing {
        supervisor.ensure_dependencies()?;
    }
    let path = supervisor.start(output)?;
    println!("Recording to {}", path.display());
    match duration {
        Some(secs) => println!("Stopping after {secs:.1} s (Ctrl-C to stop early)."),
        None => println!("Press Enter or Ctrl-C to stop."),
    }
    if duration.is_none() {
        spawn_enter_listener(Arc::clone(&stop_requested))?;
    }

    let deadline = duration
        .filter(|secs| *secs > 0.0)
        .map(|secs| Instant::now() + Duration::from_secs_f64(secs));
    while !stop_requested.load(Ordering::SeqCst) {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }
        if let Err(e) = supervisor.check_health() {
            if let Some(artifact) = delegate.take_finished() {
                print_artifact(&artifact);
            }
            return Err(e).context("recording interrupted");
        }
        thread::sleep(HEALTH_INTERVAL);
    }

    let stopped = supervisor.stop();
    let artifact = match &stopped {
        Ok(Some(artifact)) => Some(artifact.clone()),
        _ => delegate.take_finished(),
    };
    if let Some(artifact) = &artifact {
        print_artifact(artifact);
    }
    let diagnostics = supervisor.diagnostics();
    if diagnostics.samples_dropped > 0 {
        log::warn!("{} samples dropped while writing", diagnostics.samples_dropped);
    }
    stopped.context("stopping the recording")?;
    Ok(())
}

pub fn repair<R, P>(supervisor: &SessionSupervisor<R, P>) -> anyhow::Result<()>
where
    R: AudioDeviceRegistry,
    P: CaptureProvider,
{
    // Startup already attempted a repair; report what it did first.
    let notice = match supervisor.take_notice() {
        Some(notice) => Some(notice),
        None => supervisor.repair()?,
    };
    match notice {
        Some(_) => println!("Audio routing restored."),
        None => println!("Nothing to repair."),
    }
    Ok(())
}

pub fn last<R, P>(supervisor: &SessionSupervisor<R, P>) -> anyhow::Result<()>
where
    R: AudioDeviceRegistry,
    P: CaptureProvider,
{
    match supervisor.last_recording()? {
        Some(path) => println!("{}", path.display()),
        None => bail!(
            "no recordings in {}",
            supervisor.settings().output_folder.display()
        ),
    }
    Ok(())
}

fn spawn_enter_listener(stop_requested: Arc<AtomicBool>) -> anyhow::Result<()> {
    thread::Builder::new()
        .name("soundgrabber-stdin".into())
        .spawn(move || {
            let mut line = String::new();
            // EOF (stdin closed) also stops the recording.
            let _ = io::stdin().lock().read_line(&mut line);
            stop_requested.store(true, Ordering::SeqCst);
        })
        .context("spawning stdin listener")?;
    Ok(())
}

fn print_artifact(artifact: &RecordingArtifact) {
    println!(
        "Saved {} ({:.1} s, {} Hz, {} ch, {} bytes)",
        artifact.file_path.display(),
        artifact.duration_secs,
        artifact.sample_rate,
        artifact.channels,
        artifact.byte_size
    );
    println!("sha256 {}", artifact.checksum);
}
