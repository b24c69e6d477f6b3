mod redis_codec;
mod refresh_token_store_redis;
mod replay_mark_store_redis;

pub use refresh_token_store_redis::*;
pub use replay_mark_store_redis::*;
