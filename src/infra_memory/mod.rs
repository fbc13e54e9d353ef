mod refresh_store_memory;

pub use refresh_store_memory::*;
