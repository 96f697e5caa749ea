//! Equalizer parameters and the lock-free parameter store
//!
//! This module provides:
//! - `ParameterSnapshot`, the per-block read of every control value
//! - `ParamId` / `ParamRange` metadata (ranges, step, skew) for host automation
//! - `ParameterStore`, one atomic cell per parameter, written by the control
//!   context and read by the audio context without locks
//! - `ParameterSource`, the seam through which the processor reads snapshots

use crossbeam::atomic::AtomicCell;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, trace};

pub type Result<T> = std::result::Result<T, ParamError>;

/// Errors raised when raw values cross into the typed parameter model
#[derive(Debug, Error, PartialEq)]
pub enum ParamError {
    #[error("Unknown filter kind index: {0}")]
    UnknownFilterKind(u8),

    #[error("Invalid slope index: {0} (expected 0..=3)")]
    InvalidSlope(u8),

    #[error("Unknown parameter: {0}")]
    UnknownParameter(String),
}

/// Response of the mid-band filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum FilterKind {
    Peak = 0,
    Notch = 1,
    BandPass = 2,
}

impl FilterKind {
    pub const ALL: [FilterKind; 3] = [FilterKind::Peak, FilterKind::Notch, FilterKind::BandPass];

    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            FilterKind::Peak => "Peak",
            FilterKind::Notch => "Notch",
            FilterKind::BandPass => "BandPass",
        }
    }
}

impl TryFrom<u8> for FilterKind {
    type Error = ParamError;

    fn try_from(index: u8) -> Result<Self> {
        match index {
            0 => Ok(FilterKind::Peak),
            1 => Ok(FilterKind::Notch),
            2 => Ok(FilterKind::BandPass),
            other => Err(ParamError::UnknownFilterKind(other)),
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Roll-off of a cut filter
///
/// The index is the number of cascaded second-order sections minus one,
/// so `Db12` runs one section and `Db48` runs four.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Slope {
    Db12 = 0,
    Db24 = 1,
    Db36 = 2,
    Db48 = 3,
}

impl Slope {
    pub const ALL: [Slope; 4] = [Slope::Db12, Slope::Db24, Slope::Db36, Slope::Db48];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Number of active second-order sections
    pub fn sections(self) -> usize {
        self.index() + 1
    }

    /// Butterworth order realised by this slope
    pub fn order(self) -> usize {
        2 * self.sections()
    }

    pub fn db_per_octave(self) -> u32 {
        12 * self.sections() as u32
    }
}

impl TryFrom<u8> for Slope {
    type Error = ParamError;

    fn try_from(index: u8) -> Result<Self> {
        match index {
            0 => Ok(Slope::Db12),
            1 => Ok(Slope::Db24),
            2 => Ok(Slope::Db36),
            3 => Ok(Slope::Db48),
            other => Err(ParamError::InvalidSlope(other)),
        }
    }
}

impl fmt::Display for Slope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}db/Oct", self.db_per_octave())
    }
}

/// Consistent read of every control parameter, taken once per block
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterSnapshot {
    pub low_cut_freq: f32,
    pub high_cut_freq: f32,
    pub filter_kind: FilterKind,
    pub peak_freq: f32,
    pub peak_gain_db: f32,
    pub peak_quality: f32,
    pub low_cut_slope: Slope,
    pub high_cut_slope: Slope,
}

impl Default for ParameterSnapshot {
    fn default() -> Self {
        Self {
            low_cut_freq: 20.0,
            high_cut_freq: 20000.0,
            filter_kind: FilterKind::Peak,
            peak_freq: 750.0,
            peak_gain_db: 0.0,
            peak_quality: 1.0,
            low_cut_slope: Slope::Db12,
            high_cut_slope: Slope::Db12,
        }
    }
}

/// Value range of a parameter
///
/// Mirrors the usual plugin-host range model: `interval` is the legal step
/// (0 = continuous) and `skew` bends the normalized mapping so that
/// frequency controls spend more travel on the low end.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamRange {
    pub start: f32,
    pub end: f32,
    pub interval: f32,
    pub skew: f32,
}

impl ParamRange {
    pub const fn new(start: f32, end: f32, interval: f32, skew: f32) -> Self {
        Self { start, end, interval, skew }
    }

    /// Map a normalized 0..1 value onto the range (no snapping)
    ///
    /// NaN maps to the start of the range.
    pub fn from_normalized(&self, normalized: f32) -> f32 {
        if normalized.is_nan() {
            return self.start;
        }
        let mut proportion = normalized.clamp(0.0, 1.0);
        if self.skew != 1.0 && proportion > 0.0 {
            proportion = (proportion.ln() / self.skew).exp();
        }
        self.start + (self.end - self.start) * proportion
    }

    /// Map a plain value back to 0..1
    pub fn to_normalized(&self, value: f32) -> f32 {
        let proportion = ((value - self.start) / (self.end - self.start)).clamp(0.0, 1.0);
        if self.skew == 1.0 {
            proportion
        } else {
            proportion.powf(self.skew)
        }
    }

    /// Snap to the nearest legal step and clamp to the range
    ///
    /// NaN legalizes to the start of the range.
    pub fn legalize(&self, value: f32) -> f32 {
        if value.is_nan() {
            return self.start;
        }
        let snapped = if self.interval > 0.0 {
            // f64 keeps decimal steps like 0.05 from drifting off the grid
            let (start, interval) = (self.start as f64, self.interval as f64);
            let steps = ((value as f64 - start) / interval + 0.5).floor();
            (start + interval * steps) as f32
        } else {
            value
        };
        snapped.clamp(self.start, self.end)
    }
}

/// Identifier of every parameter the equalizer consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamId {
    LowCutFreq,
    HighCutFreq,
    ChooseFilter,
    PeakFreq,
    PeakGain,
    PeakQuality,
    LowCutSlope,
    HighCutSlope,
}

impl ParamId {
    pub const ALL: [ParamId; 8] = [
        ParamId::LowCutFreq,
        ParamId::HighCutFreq,
        ParamId::ChooseFilter,
        ParamId::PeakFreq,
        ParamId::PeakGain,
        ParamId::PeakQuality,
        ParamId::LowCutSlope,
        ParamId::HighCutSlope,
    ];

    /// Host-facing parameter identifier
    pub fn as_str(self) -> &'static str {
        match self {
            ParamId::LowCutFreq => "LowCut Freq",
            ParamId::HighCutFreq => "HighCut Freq",
            ParamId::ChooseFilter => "Choose filter",
            ParamId::PeakFreq => "Peak Freq",
            ParamId::PeakGain => "Peak Gain",
            ParamId::PeakQuality => "Peak Quality",
            ParamId::LowCutSlope => "LowCut Slope",
            ParamId::HighCutSlope => "HighCut Slope",
        }
    }

    pub fn range(self) -> ParamRange {
        match self {
            ParamId::LowCutFreq | ParamId::HighCutFreq | ParamId::PeakFreq => {
                ParamRange::new(20.0, 20000.0, 1.0, 0.25)
            }
            ParamId::PeakGain => ParamRange::new(-24.0, 24.0, 0.5, 1.0),
            ParamId::PeakQuality => ParamRange::new(0.1, 10.0, 0.05, 1.0),
            ParamId::ChooseFilter => ParamRange::new(0.0, 2.0, 1.0, 1.0),
            ParamId::LowCutSlope | ParamId::HighCutSlope => ParamRange::new(0.0, 3.0, 1.0, 1.0),
        }
    }

    /// Whether the parameter is a discrete choice rather than a float
    pub fn is_choice(self) -> bool {
        matches!(
            self,
            ParamId::ChooseFilter | ParamId::LowCutSlope | ParamId::HighCutSlope
        )
    }

    pub fn default_value(self) -> f32 {
        ParameterSnapshot::default().get(self)
    }
}

impl fmt::Display for ParamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParamId {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self> {
        ParamId::ALL
            .into_iter()
            .find(|id| id.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParamError::UnknownParameter(s.to_string()))
    }
}

impl ParameterSnapshot {
    /// Read one field as a plain value (choices as their index)
    pub fn get(&self, id: ParamId) -> f32 {
        match id {
            ParamId::LowCutFreq => self.low_cut_freq,
            ParamId::HighCutFreq => self.high_cut_freq,
            ParamId::ChooseFilter => self.filter_kind.index() as f32,
            ParamId::PeakFreq => self.peak_freq,
            ParamId::PeakGain => self.peak_gain_db,
            ParamId::PeakQuality => self.peak_quality,
            ParamId::LowCutSlope => self.low_cut_slope.index() as f32,
            ParamId::HighCutSlope => self.high_cut_slope.index() as f32,
        }
    }

    /// Copy with every field legalized against its range
    pub fn clamped(&self) -> Self {
        let legal = |id: ParamId| id.range().legalize(self.get(id));
        Self {
            low_cut_freq: legal(ParamId::LowCutFreq),
            high_cut_freq: legal(ParamId::HighCutFreq),
            filter_kind: self.filter_kind,
            peak_freq: legal(ParamId::PeakFreq),
            peak_gain_db: legal(ParamId::PeakGain),
            peak_quality: legal(ParamId::PeakQuality),
            low_cut_slope: self.low_cut_slope,
            high_cut_slope: self.high_cut_slope,
        }
    }
}

/// Source of per-block parameter snapshots
///
/// The audio context calls `snapshot` once at the start of every block;
/// implementations must not block or allocate.
pub trait ParameterSource: Send + Sync {
    fn snapshot(&self) -> ParameterSnapshot;
}

impl ParameterSource for ParameterSnapshot {
    fn snapshot(&self) -> ParameterSnapshot {
        *self
    }
}

impl<S: ParameterSource + ?Sized> ParameterSource for std::sync::Arc<S> {
    fn snapshot(&self) -> ParameterSnapshot {
        (**self).snapshot()
    }
}

/// Lock-free parameter store
///
/// Every parameter lives in its own atomic cell. The control context writes
/// (values are clamped and snapped on the way in), the audio context reads.
/// A snapshot may mix values from two edits; each field is still a value
/// some writer stored.
#[derive(Debug)]
pub struct ParameterStore {
    low_cut_freq: AtomicCell<f32>,
    high_cut_freq: AtomicCell<f32>,
    filter_kind: AtomicCell<FilterKind>,
    peak_freq: AtomicCell<f32>,
    peak_gain_db: AtomicCell<f32>,
    peak_quality: AtomicCell<f32>,
    low_cut_slope: AtomicCell<Slope>,
    high_cut_slope: AtomicCell<Slope>,
}

impl ParameterStore {
    /// Create a store holding the default layout values
    pub fn new() -> Self {
        Self::from_snapshot(&ParameterSnapshot::default())
    }

    pub fn from_snapshot(snapshot: &ParameterSnapshot) -> Self {
        let s = snapshot.clamped();
        Self {
            low_cut_freq: AtomicCell::new(s.low_cut_freq),
            high_cut_freq: AtomicCell::new(s.high_cut_freq),
            filter_kind: AtomicCell::new(s.filter_kind),
            peak_freq: AtomicCell::new(s.peak_freq),
            peak_gain_db: AtomicCell::new(s.peak_gain_db),
            peak_quality: AtomicCell::new(s.peak_quality),
            low_cut_slope: AtomicCell::new(s.low_cut_slope),
            high_cut_slope: AtomicCell::new(s.high_cut_slope),
        }
    }

    /// Current plain value of one parameter
    pub fn get(&self, id: ParamId) -> f32 {
        match id {
            ParamId::LowCutFreq => self.low_cut_freq.load(),
            ParamId::HighCutFreq => self.high_cut_freq.load(),
            ParamId::ChooseFilter => self.filter_kind.load().index() as f32,
            ParamId::PeakFreq => self.peak_freq.load(),
            ParamId::PeakGain => self.peak_gain_db.load(),
            ParamId::PeakQuality => self.peak_quality.load(),
            ParamId::LowCutSlope => self.low_cut_slope.load().index() as f32,
            ParamId::HighCutSlope => self.high_cut_slope.load().index() as f32,
        }
    }

    /// Store a plain value, legalized against the parameter's range
    ///
    /// Returns the value actually stored.
    pub fn set(&self, id: ParamId, value: f32) -> f32 {
        let value = id.range().legalize(value);
        match id {
            ParamId::LowCutFreq => self.low_cut_freq.store(value),
            ParamId::HighCutFreq => self.high_cut_freq.store(value),
            ParamId::PeakFreq => self.peak_freq.store(value),
            ParamId::PeakGain => self.peak_gain_db.store(value),
            ParamId::PeakQuality => self.peak_quality.store(value),
            // legalize() rounds the index and keeps it within ALL
            ParamId::ChooseFilter => self.filter_kind.store(FilterKind::ALL[value as usize]),
            ParamId::LowCutSlope => self.low_cut_slope.store(Slope::ALL[value as usize]),
            ParamId::HighCutSlope => self.high_cut_slope.store(Slope::ALL[value as usize]),
        }
        trace!(param = %id, value, "Parameter set");
        value
    }

    /// Current value mapped to 0..1
    pub fn normalized(&self, id: ParamId) -> f32 {
        id.range().to_normalized(self.get(id))
    }

    /// Store a normalized 0..1 value (host automation path)
    pub fn set_normalized(&self, id: ParamId, normalized: f32) -> f32 {
        self.set(id, id.range().from_normalized(normalized))
    }

    pub fn set_filter_kind(&self, kind: FilterKind) {
        self.filter_kind.store(kind);
    }

    pub fn set_low_cut_slope(&self, slope: Slope) {
        self.low_cut_slope.store(slope);
    }

    pub fn set_high_cut_slope(&self, slope: Slope) {
        self.high_cut_slope.store(slope);
    }

    /// Overwrite every parameter (e.g. when a preset is restored)
    pub fn replace(&self, snapshot: &ParameterSnapshot) {
        let s = snapshot.clamped();
        self.low_cut_freq.store(s.low_cut_freq);
        self.high_cut_freq.store(s.high_cut_freq);
        self.filter_kind.store(s.filter_kind);
        self.peak_freq.store(s.peak_freq);
        self.peak_gain_db.store(s.peak_gain_db);
        self.peak_quality.store(s.peak_quality);
        self.low_cut_slope.store(s.low_cut_slope);
        self.high_cut_slope.store(s.high_cut_slope);
        debug!(?s, "Parameter state replaced");
    }
}

impl Default for ParameterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ParameterSource for ParameterStore {
    fn snapshot(&self) -> ParameterSnapshot {
        ParameterSnapshot {
            low_cut_freq: self.low_cut_freq.load(),
            high_cut_freq: self.high_cut_freq.load(),
            filter_kind: self.filter_kind.load(),
            peak_freq: self.peak_freq.load(),
            peak_gain_db: self.peak_gain_db.load(),
            peak_quality: self.peak_quality.load(),
            low_cut_slope: self.low_cut_slope.load(),
            high_cut_slope: self.high_cut_slope.load(),
        }
    }
}
