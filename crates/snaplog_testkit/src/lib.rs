//! # snaplog testkit
//!
//! Test utilities for snaplog.
//!
//! This crate provides:
//! - Temporary loggers and log-file helpers
//! - A reference state model that applies operations directly
//! - Property-based generators for operation sequences
//! - Crash simulation: torn appends and truncated files
//!
//! ## Usage
//!
//! ```rust,ignore
//! use snaplog_testkit::prelude::*;
//!
//! #[test]
//! fn records() {
//!     with_temp_logger(|logger| {
//!         record_ops(logger, &[Op::put("a", "1")]).unwrap();
//!         assert_eq!(collect_ops(logger).len(), 1);
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;
pub mod model;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::model::*;
    pub use snaplog_core::{Logger, Op};
}

pub use crash::*;
pub use fixtures::*;
pub use generators::*;
pub use model::*;
