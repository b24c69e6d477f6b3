mod index_pruner;
mod server;

pub use index_pruner::*;
pub use server::*;
