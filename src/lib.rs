//! Web3 Gateway Library

pub mod blockchain;
pub mod cache;
pub mod completion;
pub mod config;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod operation;
pub mod queue;
pub mod resilience;
pub mod worker;

pub use config::schema::GatewayConfig;
pub use http::HttpServer;
pub use lifecycle::{Gateway, Shutdown};
