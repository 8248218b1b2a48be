pub mod cli;
pub mod compare;
pub mod config;
pub mod engine;
pub mod k8s;
pub mod report;
pub mod storage;
pub mod telemetry;
