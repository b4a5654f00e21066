//! Email Ensemble: multi-provider AI consensus for email analysis.

pub mod config;
pub mod ensemble;
pub mod error;
pub mod llm;
pub mod store;

pub use error::{Error, Result};
