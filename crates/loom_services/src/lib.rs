//! Loom Services Layer
//!
//! Host-facing services for the runtime. Currently: settings persistence.

pub mod settings;

pub use settings::{Settings, SettingsError, SimulationSettings, WorkerSettings};
