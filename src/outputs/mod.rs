//! Output generation for the result file and the console report.
//!
//! # Submodules
//!
//! - [`json`]: Writes the [`ResultDocument`](crate::models::ResultDocument) to disk
//! - [`report`]: Formats a short human-readable summary for the console

pub mod json;
pub mod report;
