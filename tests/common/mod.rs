//! Shared fixtures for the integration tests.

#![allow(dead_code)]

mod synth_font;

pub use synth_font::synth_font;
