pub mod config;
pub mod dates;
pub mod error;
pub mod store;
pub mod telemetry;
pub mod workflows;
