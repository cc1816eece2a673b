// src/cache/keys.rs
//! Cache key namespace

use crate::users::models::{Relation, RelationSide};

pub fn user_key(user_id: &str) -> String {
    format!("user:{}", user_id)
}

pub fn user_by_username_key(username: &str) -> String {
    format!("user-name:{}", username)
}

pub fn registration_code_key(code: u64) -> String {
    format!("registration-code:{}", code)
}

pub fn sign_in_code_key(code: u64) -> String {
    format!("sign-in-code:{}", code)
}

pub fn forgot_password_code_key(code: u64) -> String {
    format!("forgot-password-code:{}", code)
}

pub fn search_results_key(query: &str, limit: u32, offset: u32) -> String {
    format!("search-results:{}:{}:{}", query, limit, offset)
}

/// `user-followers:<id>:…` lists who follows `<id>`, `user-follows:<id>:…`
/// lists whom `<id>` follows; subscriptions mirror that.
pub fn relation_list_key(
    relation: Relation,
    side: RelationSide,
    user_id: &str,
    limit: u32,
    offset: u32,
) -> String {
    let prefix = match (relation, side) {
        (Relation::Follow, RelationSide::Incoming) => "user-followers",
        (Relation::Follow, RelationSide::Outgoing) => "user-follows",
        (Relation::Subscribe, RelationSide::Incoming) => "user-subscribers",
        (Relation::Subscribe, RelationSide::Outgoing) => "user-subscriptions",
    };
    format!("{}:{}:{}:{}", prefix, user_id, limit, offset)
}

/// Lock key for one (actor, action, target) triple
pub fn action_lock_key(actor_id: &str, action: &str, target_id: &str) -> String {
    format!("{}-is-{}:{}", actor_id, action, target_id)
}

pub fn prepare_email_key(email: &str) -> String {
    format!("{}-prepare-for-registration", email)
}

pub fn prepare_username_key(username: &str) -> String {
    format!("{}-prepare-for-registration", username)
}
