pub mod admin;
pub mod system;
pub mod webhooks;
