//! Triband infrastructure: device I/O and response analysis

pub mod analysis;
pub mod audio;
