mod commands;
mod console_delegate;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};

use soundgrabber_core::sim::{SimulatedAudioSystem, SimulatedInstaller, SimulatedTap};
use soundgrabber_core::storage::settings;
use soundgrabber_core::{
    AudioDeviceRegistry, CaptureProvider, Dependency, RecordingSink, RetryingRegistry, SessionSupervisor, Settings,
    SinkFactory, WavFileWriter,
};

#[derive(Parser)]
#[command(name = "soundgrabber", version, about = "Record everything your Mac is playing")]
struct Cli {
    /// Settings file (default: <config dir>/soundgrabber/settings.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use an in-memory audio system instead of the real one
    #[arg(long, global = true)]
    simulate: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check that the loopback driver and the switch helper are installed
    Doctor,
    /// Install missing dependencies
    Install {
        #[arg(value_enum)]
        dependency: Option<DependencyArg>,
    },
    /// List audio devices and the current defaults
    Devices,
    /// Record system audio until Enter or Ctrl-C
    Record {
        /// Output file (default: <output folder>/<prefix><timestamp>.wav)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Stop automatically after this many seconds
        #[arg(short, long)]
        duration: Option<f64>,
        /// Install missing dependencies before recording
        #[arg(long)]
        install_missing: bool,
    },
    /// Undo routing left behind by a crashed run
    Repair,
    /// Print the path of the most recent recording
    Last,
}

#[derive(Clone, Copy, ValueEnum)]
enum DependencyArg {
    Driver,
    Helper,
}

impl From<DependencyArg> for Dependency {
    fn from(arg: DependencyArg) -> Self {
        match arg {
            DependencyArg::Driver => Dependency::LoopbackDriver,
            DependencyArg::Helper => Dependency::SwitchHelper,
        }
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let settings_path = cli.config.unwrap_or_else(settings::default_settings_path);
    let settings = settings::load_or_init(&settings_path)
        .with_context(|| format!("loading settings from {}", settings_path.display()))?;
    log::debug!("Settings loaded from {}", settings_path.display());

    if cli.simulate {
        run_simulated(settings, cli.command)
    } else {
        run_native(settings, cli.command)
    }
}

fn wav_sinks() -> SinkFactory {
    Arc::new(|| Box::new(WavFileWriter::new()) as Box<dyn RecordingSink>)
}

/// Dry run against an in-memory device list and a silent tap.
///
/// Routing state and the "installed" helper live under
/// `<state_dir>/simulated`, apart from the real ones.
fn run_simulated(mut settings: Settings, command: Command) -> anyhow::Result<()> {
    let sim_dir = settings.state_dir.join("simulated");
    let helper_path = sim_dir.join("bin").join(&settings.dependencies.helper_name);
    settings.state_dir = sim_dir;
    settings.dependencies.helper_search_paths = vec![helper_path.clone()];
    settings.dependencies.helper_name = "soundgrabber-simulated-helper".into();

    let system = Arc::new(SimulatedAudioSystem::with_standard_devices());
    let installer = Arc::new(SimulatedInstaller::new(Arc::clone(&system), helper_path));
    let tap = SimulatedTap::realtime_silence(settings.sample_rate, 2);

    log::info!("Using the simulated audio system");
    let supervisor = SessionSupervisor::new(settings, RetryingRegistry::new(system), tap, installer, wav_sinks());
    dispatch(&supervisor, command)
}

#[cfg(target_os = "macos")]
fn run_native(settings: Settings, command: Command) -> anyhow::Result<()> {
    use soundgrabber_core::DependencyProbe;
    use soundgrabber_macos::{LoopbackTap, MacDeviceRegistry, PackageInstaller, SwitchAudio};

    let probe = DependencyProbe::from_settings(&settings);
    let helper = probe.locate_helper().unwrap_or_else(|| {
        let deps = &settings.dependencies;
        deps.helper_install_dir.join(&deps.helper_name)
    });
    let registry = Arc::new(MacDeviceRegistry::new(SwitchAudio::new(helper)));
    let installer = Arc::new(PackageInstaller::new(probe, registry.clone()));
    let tap = LoopbackTap::new(settings.loopback_device.clone());

    let supervisor = SessionSupervisor::new(settings, RetryingRegistry::new(registry), tap, installer, wav_sinks());
    dispatch(&supervisor, command)
}

#[cfg(not(target_os = "macos"))]
fn run_native(_settings: Settings, _command: Command) -> anyhow::Result<()> {
    anyhow::bail!("system audio capture requires macOS; pass --simulate for a dry run")
}

fn dispatch<R, P>(supervisor: &SessionSupervisor<R, P>, command: Command) -> anyhow::Result<()>
where
    R: AudioDeviceRegistry,
    P: CaptureProvider,
{
    match command {
        Command::Doctor => commands::doctor(supervisor),
        Command::Install { dependency } => commands::install(supervisor, dependency.map(Dependency::from)),
        Command::Devices => commands::devices(supervisor),
        Command::Record {
            output,
            duration,
            install_missing,
        } => commands::record(supervisor, output, duration, install_missing),
        Command::Repair => commands::repair(supervisor),
        Command::Last => commands::last(supervisor),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_record_options() {
        let cli = Cli::try_parse_from([
            "soundgrabber",
            "--simulate",
            "record",
            "-d",
            "2.5",
            "-o",
            "/tmp/x.wav",
            "--install-missing",
        ])
        .unwrap();
        assert!(cli.simulate);
        match cli.command {
            Command::Record {
                output,
                duration,
                install_missing,
            } => {
                assert_eq!(output, Some(PathBuf::from("/tmp/x.wav")));
                assert_eq!(duration, Some(2.5));
                assert!(install_missing);
            }
            _ => panic!("expected record"),
        }
    }

    #[test]
    fn install_accepts_named_dependency() {
        let cli = Cli::try_parse_from(["soundgrabber", "install", "helper"]).unwrap();
        match cli.command {
            Command::Install { dependency } => {
                assert_eq!(dependency.map(Dependency::from), Some(Dependency::SwitchHelper))
            }
            _ => panic!("expected install"),
        }
    }
}
