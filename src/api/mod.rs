mod cookies;
mod error;
mod handler;
mod router;

pub use cookies::REFRESH_COOKIE;
pub use error::recover_error;
pub use router::routes;
