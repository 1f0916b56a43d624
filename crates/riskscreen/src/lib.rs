pub mod config;
pub mod error;
pub mod platform;
pub mod screening;
pub mod telemetry;
