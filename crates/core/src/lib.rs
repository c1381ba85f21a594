#![deny(warnings)]

pub mod concat;
pub mod config;
pub mod dialogue;
pub mod pipeline;
pub mod progress;
pub mod synth;
pub mod tts;
pub mod util;
