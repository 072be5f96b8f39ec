pub mod api;
pub mod audit;
pub mod cli;
pub mod config;
pub mod context;
pub mod logging;
pub mod metrics;
pub mod relay;
pub mod server;
pub mod ssh;
pub mod utils;
