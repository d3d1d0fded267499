//! Microphone sources, noise gating and WAV encoding.

#[cfg(feature = "cpal-audio")]
pub mod capture;
pub mod gate;
pub mod recorder;
pub mod wav;
