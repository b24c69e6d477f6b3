// store

mod refresh_token_store;
mod replay_mark_store;
mod store_error;

pub use refresh_token_store::*;
pub use replay_mark_store::*;
pub use store_error::*;
