//! # DataFront Testkit
//!
//! Test utilities for DataFront.
//!
//! This crate provides:
//! - A recording comms transport capturing every broadcast
//! - A loopback dispatcher routing commands in process
//! - Canned entities, stores, and a fully wired test front
//! - Property-based test generators using proptest
//! - Tracing setup for tests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use datafront_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn update_reaches_subscriber() {
//!     let front = TestFront::start();
//!     let command = table_command("A", "bases".into(), &["12"]);
//!     front.dispatch(&command).unwrap();
//!     // ... publish and assert on front.comms
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod comms;
pub mod dispatch;
pub mod fixtures;
pub mod generators;
pub mod logging;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::comms::*;
    pub use crate::dispatch::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::logging::*;
}

pub use comms::*;
pub use dispatch::*;
pub use fixtures::*;
pub use generators::*;
pub use logging::*;
