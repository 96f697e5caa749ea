//! Triband core: parameter model, filter design and the stereo equalizer
//!
//! Everything here is platform-agnostic. Device I/O lives in `triband-infra`.

pub mod domain;
