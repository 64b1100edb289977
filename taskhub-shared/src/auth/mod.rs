/// Authentication and authorization
///
/// - [`password`]: Argon2id hashing
/// - [`jwt`]: bearer token issuance and validation
/// - [`middleware`]: request authentication and the [`middleware::AuthContext`] identity
/// - [`authorization`]: the per-resource authorization guard

pub mod authorization;
pub mod jwt;
pub mod middleware;
pub mod password;
