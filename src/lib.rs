// src/lib.rs
pub mod config;
pub mod health;
pub mod metrics;
pub mod server;
pub mod store;
