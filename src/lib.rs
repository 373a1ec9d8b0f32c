pub mod app;
pub mod clock;
pub mod config;
pub mod error;
pub mod guard;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod prompt;
pub mod rate_limit;
pub mod state;
pub mod worker;
