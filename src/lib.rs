pub mod billing;
pub mod config;
pub mod error;
pub mod routes;
pub mod webhooks;
