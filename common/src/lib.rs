// Common library: worker framework, clients and the profile image checker

pub mod bootstrap;
pub mod config;
pub mod errors;
pub mod event;
pub mod queue;
pub mod sniff;
pub mod storage;
pub mod telemetry;
pub mod worker;
