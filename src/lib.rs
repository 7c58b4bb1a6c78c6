//! QuickBox - a local script launcher
//!
//! Discovers `.py` scripts in registered folders, reads launch settings from
//! `#pqr` header comments, resolves the interpreter for the current OS and
//! runs scripts directly or inside a terminal window.

pub mod app;
pub mod config;
pub mod error;
pub mod executor;
pub mod interpreter;
pub mod logging;
pub mod metadata_writer;
pub mod scripts;
pub mod watcher;
