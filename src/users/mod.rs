//! # Users Module
//!
//! Profile & relationship component:
//! - cache-aside profile reads by id and username, username search
//! - partial profile updates, avatars, social links
//! - follow / subscribe edges with counters, throttled by action locks

pub mod avatar;
pub mod handlers;
pub mod models;
pub mod repository;
pub mod routes;
pub mod service;
pub mod social;
pub mod validators;


pub use models::{FullUser, PublicUser, Role};
pub use repository::{SqliteUserStore, StoreError, UserStore};
pub use routes::users_routes;
pub use service::UserService;
