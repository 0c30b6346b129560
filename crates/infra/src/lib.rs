//! Infrastructure layer: platform port, stores, filters and the reconciliation runtime.

pub mod baseline;
pub mod config;
pub mod engine;
pub mod error;
pub mod filter;
pub mod ledger;
pub mod lock;
pub mod notifier;
pub mod pipeline;
pub mod platform;
pub mod resolver;
pub mod services;
pub mod window;
pub mod writer;

pub use config::SyncConfig;
pub use engine::Reconciler;
pub use error::{SyncError, SyncResult};
pub use pipeline::{IntakeOutcome, SyncPipeline};
pub use services::SyncServices;
