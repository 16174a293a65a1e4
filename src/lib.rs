pub mod cli;
pub mod config;
pub mod helper;
pub mod pipelines;
pub mod telemetry;
