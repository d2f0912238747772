//! Request handlers, one module per resource

pub mod auth;
pub mod health;
pub mod oauth;
pub mod rights;
pub mod roles;
pub mod users;
