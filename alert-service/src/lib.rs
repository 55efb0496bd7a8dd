//! Low-stock alert evaluation and dispatch.
//!
//! Inventory level webhooks are matched against tracked products, evaluated
//! against each product's threshold and frequency policy, and turned into at
//! most one notification job per qualifying event on the `inventory-alerts`
//! queue. Rendering and delivering the email is left to the queue's workers.

pub mod api;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod guard;
pub mod handlers;
pub mod memory;
pub mod models;
pub mod queue;
pub mod schema;
pub mod store;
