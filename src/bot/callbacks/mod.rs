//! Callbacks module for handling all inline keyboard callback queries
//!
//! - `callback_types`: the [`CallbackAction`] enum and its wire format
//! - `callback_handler`: routes a parsed action to its handler
//! - `client_callbacks`: client menu, orders, payments, subscriptions, ratings
//! - `courier_callbacks`: order board, transitions, stats
//! - `staff_callbacks`: operator and admin screens

pub mod callback_handler;
pub mod callback_types;
pub mod client_callbacks;
pub mod courier_callbacks;
pub mod staff_callbacks;

pub use callback_handler::handle_callback;
pub use callback_types::CallbackAction;
