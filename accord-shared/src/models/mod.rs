/// Database models
///
/// - `user`: user accounts
/// - `subscription`: per-user subscription tier and usage limit
/// - `api_key`: hashed API keys owned by a user
///
/// Subscriptions and API keys point at their user through `user_id`.
/// Deleting a user together with its dependents goes through
/// [`crate::account::AccountDeletion`].

pub mod api_key;
pub mod subscription;
pub mod user;
