//! Request and response bodies

pub mod auth;
pub mod common;
pub mod rbac;
pub mod users;

pub use auth::*;
pub use common::*;
pub use rbac::*;
pub use users::*;
