/// Middleware for the API server
///
/// - `security`: security headers on every response
/// - `validation`: the `ValidatedJson` extractor and field validators

pub mod security;
pub mod validation;
