//! Shared test utilities for the superbird provisioning crates.
//!
//! # Modules
//!
//! - [`mod@must`] - Unwrap helpers with good error messages and `#[track_caller]`
//! - [`mock`] - Recording fakes for the device seams
//! - [`fixtures`] - Dump directories and environment regions
//! - [`prelude`] - Convenience re-exports
//!
//! # Usage
//!
//! ```rust,ignore
//! use superbird_test_helpers::prelude::*;
//! ```
//!
//! Only use this crate from `tests/` directories. Unit tests inside
//! `superbird-provision` would see two copies of its types.

#![deny(unsafe_op_in_unsafe_fn)]
#![allow(clippy::panic)]

pub mod fixtures;
pub mod mock;
pub mod must;
pub mod prelude;

pub use must::*;
