// Library entry point for codifeed
// Exposes modules for testing

pub mod api;
pub mod auth;
pub mod models;
pub mod pagination;
pub mod search;
pub mod store;
