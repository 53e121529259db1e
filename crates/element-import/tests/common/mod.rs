//! Shared utilities for the element-import integration tests.
//!
//! - `TestHarness` runs imports against a seeded in-memory database
//! - builders assemble configs and workbooks programmatically
//! - `write_xlsx` saves workbooks as real files for `CalamineLoader`

pub mod builders;
pub mod harness;
pub mod xlsx;

pub use builders::*;
pub use harness::*;
pub use xlsx::*;
