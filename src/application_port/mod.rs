mod credential_signer;
mod session_service;

pub use credential_signer::*;
pub use session_service::*;
