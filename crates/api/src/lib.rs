//! HTTP API: signed inbound webhooks, admin trigger, health.

pub mod app;
pub mod config;
pub mod context;
pub mod middleware;
pub mod signature;
