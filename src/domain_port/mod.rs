mod identity_verifier;
mod refresh_store;

pub use identity_verifier::*;
pub use refresh_store::*;
