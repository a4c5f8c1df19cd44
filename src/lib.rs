pub mod chain;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod orchestration;
pub mod retry;
pub mod supervisor;
