//! Shared types for globe-radio: directory entities, UI snapshots, country
//! markers, configuration and platform paths.

pub mod config;
pub mod markers;
pub mod platform;
pub mod protocol;
