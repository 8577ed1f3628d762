//! # UI Module
//!
//! All UI components for the vocal tuner.

pub mod beat_lights;
pub mod cent_meter;
pub mod main_display;
