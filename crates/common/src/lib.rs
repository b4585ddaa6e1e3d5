//! Shared plumbing for batchtrack binaries.

pub mod logging;
