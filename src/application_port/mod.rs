mod auth_service;
mod call_scope;
mod credential_signer;
mod user_directory;

pub use auth_service::*;
pub use call_scope::*;
pub use credential_signer::*;
pub use user_directory::*;
