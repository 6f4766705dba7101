//! Core functionality module
//!
//! This module contains the scan pipeline itself: the session state machine,
//! the per-frame classifier, field extraction, the exclusive scanner front,
//! plus configuration and error types shared by the rest of the crate.
//!
//! # Submodules
//!
//! - `classifier` - Turns one decode attempt into a session verdict
//! - `config` - Configuration loading, saving, and management
//! - `error` - Error types and result aliases
//! - `extractor` - Supplier code and lot fields from label text
//! - `scanner` - One active session at a time, cancellation handles
//! - `session` - Single-use scan session and its lifecycle

pub mod classifier;
pub mod config;
pub mod error;
pub mod extractor;
pub mod scanner;
pub mod session;
