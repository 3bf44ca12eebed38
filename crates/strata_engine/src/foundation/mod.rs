//! Foundation module - Core utilities and types
//!
//! This module provides fundamental utilities used throughout the engine:
//! - Math types and operations
//! - Buffer allocation context shared by the cache and archive reader
//! - Handle-based collections (priority list)
//! - Logging setup

pub mod math;
pub mod memory;
pub mod collections;
pub mod logging;
