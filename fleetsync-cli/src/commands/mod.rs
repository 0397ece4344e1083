//! CLI command implementations.

pub mod accounts;
pub mod common;
pub mod config;
pub mod run;
pub mod schedule;
