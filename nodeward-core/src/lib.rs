//! nodeward core
//!
//! Record types shared by the fetch and HTTP layers, the pure health
//! evaluators that turn those records into a judgement, and the ambient
//! configuration and logging setup.

pub mod config;
pub mod health;
pub mod logging;
pub mod models;
pub mod units;

pub use config::Config;
pub use health::{HealthReport, Judgement};
