//! gisdesk-core - Core library for gisdesk
//!
//! This crate provides the startup and health-check logic for a headless GIS
//! desktop served to browsers over VNC:
//!
//! - **deps**: runtime package import checks and optional upgrade
//! - **compat**: minimum version checks
//! - **tools**: required external command lookup
//! - **supervisor**: stale process cleanup, ordered launch, verification
//! - **readiness**: post-launch readiness probing
//! - **status**: the persisted status record
//! - **orchestrator**: the checklist driver tying the above together
//! - **validate**: quick and full environment validation

pub mod compat;
pub mod config;
pub mod deps;
pub mod error;
pub mod exec;
pub mod orchestrator;
pub mod proctable;
pub mod readiness;
pub mod status;
pub mod supervisor;
pub mod tools;
pub mod validate;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
pub use orchestrator::{Host, Orchestrator};
pub use status::{Status, StatusRecord};
