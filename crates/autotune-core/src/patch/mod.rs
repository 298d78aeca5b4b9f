//! Patch application: apply and revert unified diffs with the host `patch` tool.
//!
//! # Modules
//!
//! - [`diff`]: `count_diff_lines()`, `touched_files()`
//! - [`tool`]: `PatchApplicator` trait, `PatchTool` (probe, dry-run-then-apply)
//! - [`error`]: `PatchApplyError`

pub mod diff;
pub mod error;
pub mod tool;

pub use diff::{count_diff_lines, touched_files};
pub use error::{PatchApplyError, PatchOperation, PatchResultOf};
pub use tool::{PatchApplicator, PatchTool, PatchToolConfig};
