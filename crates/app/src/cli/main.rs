//! Triband CLI Application

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use triband_core::domain::audio::AudioEnumerator;
use triband_core::domain::config::{
    Command, CommandExecutor, CommandResult, ConfigManager, ConfigWatcher,
    ParameterCommandExecutor, PresetManager, TribandConfig,
};
use triband_core::domain::params::{ParamId, ParameterSnapshot, ParameterSource, ParameterStore};
use triband_core::domain::processor::Equalizer;
use triband_infra::analysis::{log_frequencies, measure_impulse_response, response_table};
use triband_infra::audio::{CpalEnumerator, EqStream};

#[derive(Parser)]
#[command(name = "triband")]
#[command(about = "Three-band real-time equalizer", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration directory (defaults to the platform config dir)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List audio devices
    Devices,

    /// Run input through the equalizer to the output device
    Run {
        /// Preset to start from and follow for hot reload
        #[arg(short, long)]
        preset: Option<String>,
    },

    /// Print the magnitude response of the configured equalizer
    Response {
        /// Preset to analyse instead of the saved parameters
        #[arg(short, long)]
        preset: Option<String>,

        /// Number of log-spaced frequency points
        #[arg(long, default_value_t = 25)]
        points: usize,

        /// Also measure the response with an impulse and an FFT
        #[arg(long)]
        measure: bool,
    },

    /// Manage presets
    Preset {
        #[command(subcommand)]
        action: PresetAction,
    },
}

#[derive(Subcommand)]
enum PresetAction {
    /// List saved presets
    List,

    /// Save the configured parameters, with optional overrides, as a preset
    Save {
        name: String,

        /// Parameter override such as "Peak Gain=3.5" (repeatable)
        #[arg(short = 's', long = "set", value_name = "PARAM=VALUE")]
        overrides: Vec<String>,
    },

    /// Print a preset's parameters
    Show {
        name: String,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete a preset
    Delete { name: String },

    /// Write the built-in presets that are missing
    InstallDefaults,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Parse `"Param Name=value"`
fn parse_override(raw: &str) -> anyhow::Result<(ParamId, f32)> {
    let (name, value) = raw
        .split_once('=')
        .with_context(|| format!("expected PARAM=VALUE, got {raw:?}"))?;
    let id: ParamId = name.parse()?;
    let value: f32 = value
        .trim()
        .parse()
        .with_context(|| format!("invalid value for {id}: {value:?}"))?;
    Ok((id, value))
}

fn print_snapshot(snapshot: &ParameterSnapshot) {
    for id in ParamId::ALL {
        let value = snapshot.get(id);
        let shown = match id {
            ParamId::ChooseFilter => snapshot.filter_kind.to_string(),
            ParamId::LowCutSlope => snapshot.low_cut_slope.to_string(),
            ParamId::HighCutSlope => snapshot.high_cut_slope.to_string(),
            _ => format!("{value}"),
        };
        println!("{:<14} {}", id.as_str(), shown);
    }
}

/// Loaded configuration plus the managers derived from it
struct Session {
    manager: ConfigManager,
    config: TribandConfig,
    presets: PresetManager,
}

impl Session {
    async fn load(config_dir: Option<PathBuf>) -> anyhow::Result<Self> {
        let dir = match config_dir {
            Some(dir) => dir,
            None => ConfigManager::default_config_dir()?,
        };
        let manager = ConfigManager::new(dir);
        let config = manager.load().await;
        let presets = PresetManager::new(manager.preset_dir(&config));
        debug!(config = %manager.config_path().display(), "Configuration ready");
        Ok(Self {
            manager,
            config,
            presets,
        })
    }

    /// Parameters from the named preset, or the saved configuration
    async fn parameters(&self, preset: Option<&str>) -> anyhow::Result<ParameterSnapshot> {
        match preset {
            Some(name) => Ok(self.presets.load_preset(name).await?.parameters),
            None => Ok(self.config.parameters),
        }
    }
}

fn list_devices() -> anyhow::Result<()> {
    let enumerator = CpalEnumerator::new();
    for device in enumerator.devices()? {
        let rate = device
            .default_sample_rate
            .map(|r| format!("{} Hz", r.hz()))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{} {:<8} {:>2}ch {:>9}  {}",
            if device.is_default { "*" } else { " " },
            format!("{:?}", device.device_type),
            device.max_channels,
            rate,
            device.name
        );
    }
    Ok(())
}

async fn run(config_dir: Option<PathBuf>, preset: Option<String>) -> anyhow::Result<()> {
    let ctx = Session::load(config_dir).await?;
    let active = preset.or_else(|| ctx.config.app.active_preset.clone());
    let parameters = ctx.parameters(active.as_deref()).await?;
    let store = Arc::new(ParameterStore::from_snapshot(&parameters));

    let settings = ctx.config.app.stream_settings();
    let enumerator = CpalEnumerator::new();
    let stream = EqStream::start(&enumerator, &settings, Arc::clone(&store))?;

    let watcher = ConfigWatcher::new(ctx.presets.preset_dir().to_path_buf()).await?;
    let mut changes = watcher.subscribe();
    let mut stats_tick = tokio::time::interval(Duration::from_secs(10));

    info!(preset = active.as_deref().unwrap_or("<config>"), "Running, press Ctrl+C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = changes.recv() => {
                let Ok(path) = changed else { continue };
                let stem = path.file_stem().and_then(|s| s.to_str());
                if active.is_none() || stem != active.as_deref() {
                    continue;
                }
                match PresetManager::load_preset_file(&path).await {
                    Ok(loaded) => {
                        store.replace(&loaded.parameters);
                        info!(path = %path.display(), "Preset reloaded");
                    }
                    Err(e) => warn!(path = %path.display(), error = %e, "Ignoring unreadable preset"),
                }
            }
            _ = stats_tick.tick() => {
                let stats = stream.stats();
                debug!(underruns = stats.underruns(), overruns = stats.overruns(), "Stream stats");
            }
        }
    }

    info!("Stopping");
    let mut config = ctx.config;
    config.parameters = store.snapshot();
    ctx.manager.save(&config).await?;
    Ok(())
}

async fn response(
    config_dir: Option<PathBuf>,
    preset: Option<String>,
    points: usize,
    measure: bool,
) -> anyhow::Result<()> {
    let ctx = Session::load(config_dir).await?;
    let parameters = ctx.parameters(preset.as_deref()).await?;
    let sample_rate = f64::from(ctx.config.app.sample_rate);

    let mut equalizer = Equalizer::new(parameters);
    equalizer.prepare(sample_rate, ctx.config.app.block_size as usize);

    let freqs = log_frequencies(20.0, 20000.0, points);
    let table = response_table(equalizer.processor().left(), sample_rate, &freqs);
    let measured = if measure {
        Some(measure_impulse_response(&mut equalizer, 65536)?)
    } else {
        None
    };

    println!(
        "{:>9} {:>9} {:>9} {:>9} {:>9}{}",
        "Hz",
        "low-cut",
        parameters.filter_kind.name(),
        "high-cut",
        "total",
        if measured.is_some() { "   measured" } else { "" }
    );
    for point in &table {
        let extra = measured
            .as_ref()
            .map(|m| format!(" {:>10.2}", m.db_at(point.freq)))
            .unwrap_or_default();
        println!(
            "{:>9.1} {:>9.2} {:>9.2} {:>9.2} {:>9.2}{}",
            point.freq, point.low_cut_db, point.mid_band_db, point.high_cut_db, point.total_db, extra
        );
    }
    Ok(())
}

async fn preset(config_dir: Option<PathBuf>, action: PresetAction) -> anyhow::Result<()> {
    let ctx = Session::load(config_dir).await?;
    match action {
        PresetAction::List => {
            for name in ctx.presets.list_presets().await? {
                println!("{name}");
            }
        }
        PresetAction::Save { name, overrides } => {
            let store = Arc::new(ParameterStore::from_snapshot(&ctx.config.parameters));
            let executor = ParameterCommandExecutor::new(store, ctx.presets.clone());

            for raw in &overrides {
                let (id, value) = parse_override(raw)?;
                if let CommandResult::ParameterChanged { value: stored, .. } =
                    executor.execute(Command::SetParameter { id, value }).await
                {
                    if stored != value {
                        warn!(param = %id, requested = value, stored, "Value adjusted to range");
                    }
                }
            }

            match executor.execute(Command::SavePreset { name }).await {
                CommandResult::PresetSaved { name } => println!("Saved preset {name}"),
                CommandResult::Error(e) => bail!(e),
                other => bail!("unexpected result {other:?}"),
            }
        }
        PresetAction::Show { name, json } => {
            let preset = ctx.presets.load_preset(&name).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&preset.parameters)?);
            } else {
                print_snapshot(&preset.parameters);
            }
        }
        PresetAction::Delete { name } => {
            ctx.presets.delete_preset(&name).await?;
            println!("Deleted preset {name}");
        }
        PresetAction::InstallDefaults => {
            for name in ctx.presets.install_factory_presets().await? {
                println!("Installed {name}");
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    info!("Triband starting");

    match cli.command {
        Commands::Devices => list_devices(),
        Commands::Run { preset } => run(cli.config_dir, preset).await,
        Commands::Response {
            preset,
            points,
            measure,
        } => response(cli.config_dir, preset, points, measure).await,
        Commands::Preset { action } => preset(cli.config_dir, action).await,
    }
}
