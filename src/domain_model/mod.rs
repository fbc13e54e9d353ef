mod access;
mod refresh;
mod user;

pub use access::*;
pub use refresh::*;
pub use user::*;
