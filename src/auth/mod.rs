//! # Auth Module
//!
//! Account workflow component:
//! - registration, sign-in and password reset by mailed one-time codes
//! - JWT access/refresh pair issuance and refresh
//! - AuthedUser extractor for protected routes

pub mod codes;
pub mod extractors;
pub mod handlers;
pub mod models;
pub mod password;
pub mod routes;
pub mod service;
pub mod tokens;
pub mod validators;

#[cfg(test)]
mod tests;

pub use extractors::AuthedUser;
pub use routes::auth_routes;
pub use service::AuthService;
pub use tokens::TokenIssuer;
