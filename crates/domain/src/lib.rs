//! Shared types for the WasteWise gateway crates.

pub mod config;
pub mod content;
pub mod error;
pub mod trace;
