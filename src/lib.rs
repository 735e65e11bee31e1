//! Diff-anchored discussions.
//!
//! Notes anchored to lines of a comparison keep a stable thread identity
//! across pushes, are carried forward to the new comparison when their line
//! survives, and may carry suggestions that are applied as commits on the
//! source branch.

pub mod config;
pub mod diff;
pub mod discussion;
pub mod hash;
pub mod migration;
pub mod note;
pub mod position;
pub mod report;
pub mod resolution;
pub mod suggestion;
