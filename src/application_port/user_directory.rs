use crate::application_port::AuthError;
use crate::domain_model::*;

/// Boundary to wherever user records and password hashes live.
#[async_trait::async_trait]
pub trait UserDirectory: Send + Sync {
    /// Unknown email and wrong password both yield `InvalidCredentials`.
    async fn authenticate(&self, email: &str, password: &str) -> Result<Principal, AuthError>;

    async fn find(&self, user_id: UserId) -> Result<Option<Principal>, AuthError>;
}
