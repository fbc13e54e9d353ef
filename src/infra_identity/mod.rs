mod fake_verifier;
mod firebase_verifier;

pub use fake_verifier::*;
pub use firebase_verifier::*;
