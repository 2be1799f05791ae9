//! Jobs the scheduler can run against the catalog.

pub(crate) mod error;
pub(crate) mod timezone_fixer;

pub(crate) use error::JobError;
pub(crate) use timezone_fixer::{FixerSettings, RunSummary, TimezoneFixer};
