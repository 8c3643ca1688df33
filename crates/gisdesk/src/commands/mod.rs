//! Command implementations for the gisdesk CLI.

pub mod health;
pub mod run;
pub mod status;
pub mod validate;
