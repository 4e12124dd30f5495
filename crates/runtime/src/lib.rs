//! Process plumbing shared by the gateway and fetcher binaries.

pub mod env;
pub mod health;
pub mod telemetry;

pub use health::{HealthReport, HealthStatus};
pub use telemetry::{init_tracing, LogFormat};
