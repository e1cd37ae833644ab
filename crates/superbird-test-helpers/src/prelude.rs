//! Convenience re-exports for common test utilities.
//!
//! ```rust,ignore
//! use superbird_test_helpers::prelude::*;
//! ```

pub use crate::fixtures::{DumpDir, TEST_REGION_SIZE, env_region, sample_env};
pub use crate::mock::{CallLog, DeviceCall, RecordingDevice, ScriptedLink, TimedCall};
pub use crate::must::{must, must_async, must_parse, must_some};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;
