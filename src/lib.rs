pub mod config;
pub mod error;
pub mod db;
pub mod dataset;
pub mod embeddings;
pub mod index;
pub mod eval;
pub mod pipeline;
pub mod cli;

#[cfg(test)]
pub(crate) mod test_utils;

pub use config::Config;
pub use error::{CirevalError, Result};
pub use eval::{MetricsEvaluator, RunReport};
