//! Request-scoped staging of uploaded audio.

pub mod staging;

pub use staging::{AudioFormat, StagedAudio};
