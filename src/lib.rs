//! # Garbage Courier Telegram Bot
//!
//! A Telegram bot for a garbage take-out courier service: clients place and
//! pay for pickup orders, couriers accept and complete them, operators and
//! admins supervise. Telegram updates and payment notifications arrive as
//! webhooks on one HTTP server; orders live in PostgreSQL.

pub mod bot;
pub mod config;
pub mod context;
pub mod db;
pub mod errors;
pub mod gateway;
pub mod lifecycle;
pub mod localization;
pub mod models;
pub mod observability;
pub mod observability_config;
pub mod payments;
pub mod roles;
pub mod server;
pub mod settings;

// Re-export types for easier access
pub use context::AppContext;
pub use models::{DetailedStatus, OrderStatus, Role};
