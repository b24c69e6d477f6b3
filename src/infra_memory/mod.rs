mod refresh_token_store_memory;
mod replay_mark_store_memory;

pub use refresh_token_store_memory::*;
pub use replay_mark_store_memory::*;
