mod refresh_store_mysql;

pub use refresh_store_mysql::*;

mod util;
