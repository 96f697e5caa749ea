//! Configuration management for Triband
//!
//! This module provides:
//! - Application settings (audio stream, preset directory) and the saved
//!   equalizer parameters, serialized as TOML
//! - Preset files holding one parameter snapshot each
//! - Command bus applying control edits to the parameter store
//! - Hot-reload support via file system watcher

use crate::domain::audio::{SampleRate, StreamSettings};
use crate::domain::params::{
    FilterKind, ParamId, ParameterSnapshot, ParameterSource, ParameterStore, Slope,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument, warn};

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur during configuration operations
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("File watch error: {0}")]
    WatchError(#[from] notify::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Preset not found: {0}")]
    PresetNotFound(String),

    #[error("Invalid preset name: {0:?}")]
    InvalidPresetName(String),
}

async fn read_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = fs::read_to_string(path).await?;
    Ok(toml::from_str(&contents)?)
}

async fn write_toml<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let toml_str = toml::to_string_pretty(value)?;
    fs::write(path, toml_str).await?;
    Ok(())
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Sample rate the duplex stream is opened with
    pub sample_rate: u32,

    /// Frames per callback, also the equalizer's max block size
    pub block_size: u32,

    /// Input device name (None = system default)
    pub input_device: Option<String>,

    /// Output device name (None = system default)
    pub output_device: Option<String>,

    /// Preset directory
    pub preset_dir: PathBuf,

    /// Preset applied at startup and followed for hot reload
    pub active_preset: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            block_size: 512,
            input_device: None,
            output_device: None,
            preset_dir: PathBuf::from("presets"),
            active_preset: None,
        }
    }
}

impl AppConfig {
    pub fn stream_settings(&self) -> StreamSettings {
        StreamSettings {
            sample_rate: SampleRate::from_hz(self.sample_rate),
            block_size: self.block_size,
            input_device: self.input_device.clone(),
            output_device: self.output_device.clone(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.stream_settings()
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

/// Complete Triband configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TribandConfig {
    pub app: AppConfig,
    pub parameters: ParameterSnapshot,
}

impl TribandConfig {
    /// Load configuration from TOML file
    ///
    /// Parameters are legalized against their ranges on the way in.
    #[instrument(skip(path))]
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let mut config: Self = read_toml(path).await?;
        config.app.validate()?;
        config.parameters = config.parameters.clamped();

        debug!("Configuration loaded successfully");
        Ok(config)
    }

    /// Save configuration to TOML file
    #[instrument(skip(self, path))]
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        info!(path = %path.display(), "Saving configuration");

        write_toml(self, path).await?;

        debug!("Configuration saved successfully");
        Ok(())
    }

    /// Factory default: flat equalizer, 48 kHz, 512-frame blocks
    pub fn factory_default() -> Self {
        Self::default()
    }
}

/// One saved equalizer setting
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Preset {
    pub parameters: ParameterSnapshot,
}

impl Preset {
    pub fn new(parameters: ParameterSnapshot) -> Self {
        Self { parameters }
    }

    /// A small set of starting points written by `PresetManager::install_factory_presets`
    pub fn factory_presets() -> Vec<(&'static str, Preset)> {
        let flat = ParameterSnapshot::default();
        vec![
            ("flat", Preset::new(flat)),
            (
                "voice",
                Preset::new(ParameterSnapshot {
                    low_cut_freq: 90.0,
                    high_cut_freq: 12000.0,
                    peak_freq: 3000.0,
                    peak_gain_db: 3.0,
                    peak_quality: 0.7,
                    low_cut_slope: Slope::Db24,
                    ..flat
                }),
            ),
            (
                "hum-notch",
                Preset::new(ParameterSnapshot {
                    filter_kind: FilterKind::Notch,
                    peak_freq: 50.0,
                    peak_quality: 8.0,
                    ..flat
                }),
            ),
            (
                "telephone",
                Preset::new(ParameterSnapshot {
                    low_cut_freq: 300.0,
                    high_cut_freq: 3400.0,
                    filter_kind: FilterKind::BandPass,
                    peak_freq: 1000.0,
                    peak_quality: 0.5,
                    low_cut_slope: Slope::Db48,
                    high_cut_slope: Slope::Db48,
                    ..flat
                }),
            ),
        ]
    }
}

/// Command types for runtime parameter management
#[derive(Debug, Clone)]
pub enum Command {
    SetParameter { id: ParamId, value: f32 },
    SetNormalized { id: ParamId, normalized: f32 },
    LoadSnapshot { snapshot: ParameterSnapshot },
    ResetToDefaults,
    LoadPreset { name: String },
    SavePreset { name: String },
}

/// Result of command execution
#[derive(Debug, Clone, PartialEq)]
pub enum CommandResult {
    ParameterChanged { id: ParamId, value: f32 },
    SnapshotLoaded { snapshot: ParameterSnapshot },
    PresetLoaded { name: String },
    PresetSaved { name: String },
    Error(String),
}

/// Trait for command execution
#[async_trait::async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, command: Command) -> CommandResult;
}

/// Applies commands to a shared parameter store
pub struct ParameterCommandExecutor {
    store: Arc<ParameterStore>,
    presets: PresetManager,
}

impl ParameterCommandExecutor {
    pub fn new(store: Arc<ParameterStore>, presets: PresetManager) -> Self {
        Self { store, presets }
    }

    pub fn store(&self) -> &Arc<ParameterStore> {
        &self.store
    }
}

#[async_trait::async_trait]
impl CommandExecutor for ParameterCommandExecutor {
    #[instrument(skip(self))]
    async fn execute(&self, command: Command) -> CommandResult {
        match command {
            Command::SetParameter { id, value } => {
                let value = self.store.set(id, value);
                CommandResult::ParameterChanged { id, value }
            }
            Command::SetNormalized { id, normalized } => {
                let value = self.store.set_normalized(id, normalized);
                CommandResult::ParameterChanged { id, value }
            }
            Command::LoadSnapshot { snapshot } => {
                self.store.replace(&snapshot);
                CommandResult::SnapshotLoaded {
                    snapshot: self.store.snapshot(),
                }
            }
            Command::ResetToDefaults => {
                self.store.replace(&ParameterSnapshot::default());
                CommandResult::SnapshotLoaded {
                    snapshot: self.store.snapshot(),
                }
            }
            Command::LoadPreset { name } => match self.presets.load_preset(&name).await {
                Ok(preset) => {
                    self.store.replace(&preset.parameters);
                    CommandResult::PresetLoaded { name }
                }
                Err(e) => CommandResult::Error(e.to_string()),
            },
            Command::SavePreset { name } => {
                let preset = Preset::new(self.store.snapshot());
                match self.presets.save_preset(&name, &preset).await {
                    Ok(()) => CommandResult::PresetSaved { name },
                    Err(e) => CommandResult::Error(e.to_string()),
                }
            }
        }
    }
}

/// File system watcher for hot-reload
pub struct ConfigWatcher {
    _watcher: notify::RecommendedWatcher,
    config_tx: broadcast::Sender<PathBuf>,
}

impl ConfigWatcher {
    /// Watch `preset_dir` for created or modified `.toml` files
    pub async fn new(preset_dir: PathBuf) -> Result<Self> {
        use notify::Watcher;

        let (config_tx, _config_rx) = broadcast::channel(32);

        fs::create_dir_all(&preset_dir).await?;

        let tx_clone = config_tx.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) => {
                    if !matches!(
                        event.kind,
                        notify::EventKind::Create(_) | notify::EventKind::Modify(_)
                    ) {
                        return;
                    }
                    for path in event.paths {
                        if path.extension().and_then(|e| e.to_str()) == Some("toml") {
                            // No subscribers is fine, nothing is listening yet
                            let _ = tx_clone.send(path);
                        }
                    }
                }
                Err(e) => error!(error = %e, "Preset watch error"),
            }
        })?;

        watcher.watch(&preset_dir, notify::RecursiveMode::NonRecursive)?;

        info!(path = %preset_dir.display(), "Preset watcher started");

        Ok(Self {
            _watcher: watcher,
            config_tx,
        })
    }

    /// Subscribe to preset change events
    pub fn subscribe(&self) -> broadcast::Receiver<PathBuf> {
        self.config_tx.subscribe()
    }
}

/// Preset manager
///
/// Presets are `<name>.toml` files in a single directory.
#[derive(Debug, Clone)]
pub struct PresetManager {
    preset_dir: PathBuf,
}

impl PresetManager {
    pub fn new(preset_dir: PathBuf) -> Self {
        Self { preset_dir }
    }

    pub fn preset_dir(&self) -> &Path {
        &self.preset_dir
    }

    /// Path of the file backing preset `name`
    ///
    /// Names may not be empty or contain path separators.
    pub fn preset_path(&self, name: &str) -> Result<PathBuf> {
        let invalid = name.is_empty()
            || name.starts_with('.')
            || name.contains(['/', '\\'])
            || name.trim() != name;
        if invalid {
            return Err(ConfigError::InvalidPresetName(name.to_string()));
        }
        Ok(self.preset_dir.join(format!("{}.toml", name)))
    }

    /// List all available presets, sorted by name
    #[instrument(skip(self))]
    pub async fn list_presets(&self) -> Result<Vec<String>> {
        let mut presets = Vec::new();

        let mut entries = match fs::read_dir(&self.preset_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(presets),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "toml") {
                if let Some(name) = path.file_stem().and_then(|n| n.to_str()) {
                    presets.push(name.to_string());
                }
            }
        }

        presets.sort();
        debug!(count = presets.len(), "Listed presets");
        Ok(presets)
    }

    /// Load a preset by name, legalizing every parameter
    #[instrument(skip(self))]
    pub async fn load_preset(&self, name: &str) -> Result<Preset> {
        let path = self.preset_path(name)?;

        if !path.exists() {
            return Err(ConfigError::PresetNotFound(name.to_string()));
        }

        Self::load_preset_file(&path).await
    }

    /// Load a preset from an explicit path (hot-reload events carry paths)
    pub async fn load_preset_file(path: &Path) -> Result<Preset> {
        let mut preset: Preset = read_toml(path).await?;
        preset.parameters = preset.parameters.clamped();
        debug!(path = %path.display(), "Preset loaded");
        Ok(preset)
    }

    #[instrument(skip(self, preset))]
    pub async fn save_preset(&self, name: &str, preset: &Preset) -> Result<()> {
        let path = self.preset_path(name)?;
        write_toml(preset, &path).await?;
        info!(name, "Preset saved");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn delete_preset(&self, name: &str) -> Result<()> {
        let path = self.preset_path(name)?;

        if !path.exists() {
            return Err(ConfigError::PresetNotFound(name.to_string()));
        }

        fs::remove_file(&path).await?;
        info!(name, "Preset deleted");
        Ok(())
    }

    pub async fn preset_exists(&self, name: &str) -> bool {
        match self.preset_path(name) {
            Ok(path) => fs::try_exists(&path).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Write the factory presets that do not exist yet
    ///
    /// Returns the names that were written.
    #[instrument(skip(self))]
    pub async fn install_factory_presets(&self) -> Result<Vec<String>> {
        let mut written = Vec::new();
        for (name, preset) in Preset::factory_presets() {
            if !self.preset_exists(name).await {
                self.save_preset(name, &preset).await?;
                written.push(name.to_string());
            }
        }
        Ok(written)
    }
}

/// Configuration manager for the main Triband config
///
/// Manages `config.toml` inside the config directory
/// (`~/.config/triband` on Linux).
pub struct ConfigManager {
    config_dir: PathBuf,
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new(config_dir: PathBuf) -> Self {
        let config_path = config_dir.join("config.toml");
        Self {
            config_dir,
            config_path,
        }
    }

    /// Platform config directory joined with `triband`
    pub fn default_config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join("triband"))
            .ok_or_else(|| ConfigError::Invalid("Could not determine config directory".to_string()))
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Preset directory resolved against the config directory when relative
    pub fn preset_dir(&self, config: &TribandConfig) -> PathBuf {
        if config.app.preset_dir.is_absolute() {
            config.app.preset_dir.clone()
        } else {
            self.config_dir.join(&config.app.preset_dir)
        }
    }

    /// Load configuration from file
    ///
    /// A missing file yields the factory default, which is written back.
    /// A corrupt file is copied to `config.toml.corrupt` and the factory
    /// default is returned.
    #[instrument(skip(self))]
    pub async fn load(&self) -> TribandConfig {
        if !self.config_path.exists() {
            info!(
                path = %self.config_path.display(),
                "Config file not found, creating factory default"
            );

            let config = TribandConfig::factory_default();
            if let Err(e) = config.save_to_file(&self.config_path).await {
                error!(
                    path = %self.config_path.display(),
                    error = %e,
                    "Failed to save factory default config"
                );
            }
            return config;
        }

        match TribandConfig::load_from_file(&self.config_path).await {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    path = %self.config_path.display(),
                    error = %e,
                    "Failed to load config, using factory default"
                );

                let backup_path = self.config_path.with_extension("toml.corrupt");
                if let Err(copy_err) = fs::copy(&self.config_path, &backup_path).await {
                    error!(
                        path = %backup_path.display(),
                        error = %copy_err,
                        "Failed to backup corrupt config"
                    );
                }

                TribandConfig::factory_default()
            }
        }
    }

    #[instrument(skip(self, config))]
    pub async fn save(&self, config: &TribandConfig) -> Result<()> {
        fs::create_dir_all(&self.config_dir).await?;
        config.save_to_file(&self.config_path).await
    }

    /// Delete the config file if present
    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<()> {
        if self.config_path.exists() {
            fs::remove_file(&self.config_path).await?;
            info!(path = %self.config_path.display(), "Configuration cleared");
        }
        Ok(())
    }

    pub fn exists(&self) -> bool {
        self.config_path.exists()
    }
}
