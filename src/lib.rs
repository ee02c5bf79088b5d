//! Preview, search and column rewriting for comma-separated text files.

pub mod codec;
pub mod columns;
pub mod error;
pub mod files;
pub mod finalize;
pub mod logging;
pub mod pipeline;
pub mod rules;
pub mod stats;

pub use error::{Error, Result};
