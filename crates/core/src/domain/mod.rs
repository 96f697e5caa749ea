//! Domain entities and business rules

pub mod audio;
pub mod config;
pub mod dsp;
pub mod params;
pub mod processor;

// Re-export specific items to avoid ambiguous glob imports
pub use audio::{
    AudioEnumerator, AudioError, DeviceId, DeviceInfo, DeviceType, SampleRate, StreamSettings,
};
pub use config::{
    Command, CommandExecutor, CommandResult, ConfigError, ConfigManager, ConfigWatcher,
    AppConfig, ParameterCommandExecutor, Preset, PresetManager, TribandConfig,
};
pub use dsp::{
    BiquadCoeffs, BiquadFilter, ChainPosition, CoefficientSet, CutFilterBank, MidBandFilter,
    MonoChain,
};
pub use params::{
    FilterKind, ParamError, ParamId, ParamRange, ParameterSnapshot, ParameterSource,
    ParameterStore, Slope,
};
pub use processor::{update_all, Equalizer, ProcessSpec, StereoProcessor};
