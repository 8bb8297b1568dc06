//! ---
//! iotsim_section: "01-core-functionality"
//! iotsim_subsection: "module"
//! iotsim_type: "source"
//! iotsim_scope: "code"
//! iotsim_description: "Shared primitives and utilities for the simulator runtime."
//! iotsim_version: "v0.1.0"
//! iotsim_owner: "tbd"
//! ---
//! Core shared primitives for the IoT simulator workspace.
//! This crate exposes configuration loading, tracing setup, time helpers, and
//! version metadata consumed across the workspace.

pub mod config;
pub mod logging;
pub mod time;
pub mod version;

pub use config::{
    AppConfig, EngineConfig, InvocationConfig, LoggingConfig, MetricsConfig, PublisherConfig,
    PublisherKind, StageStoreConfig, StageStoreKind,
};
pub use logging::{init_tracing, LogFormat};
pub use version::VersionInfo;
