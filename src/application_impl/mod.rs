mod credential_signer_jwt;
mod session_service_impl;

pub use credential_signer_jwt::*;
pub use session_service_impl::*;
