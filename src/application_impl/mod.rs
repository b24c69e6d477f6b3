mod jwt_credential_signer;
mod replay_guard;
mod rotation_coordinator;
mod session_revocation_index;
mod static_user_directory;
mod store_call;

pub use jwt_credential_signer::*;
pub use replay_guard::*;
pub use rotation_coordinator::*;
pub use session_revocation_index::*;
pub use static_user_directory::*;
pub use store_call::*;
