//! Proof generation for fulfillments.
//!
//! The proof is computed over the 32-byte block seed of the request's target
//! round, so it is deterministic per round and verifiable by anyone holding
//! the beacon's registered public key.

use beacon::vrf::{self, VrfOutput, VrfProof, VrfPublicKey, VrfSecretKey};
use beacon::Seed;

/// Holder of the beacon's VRF secret key.
#[derive(Debug, Clone)]
pub struct Prover {
    secret: VrfSecretKey,
}

impl Prover {
    pub fn new(secret: VrfSecretKey) -> Self {
        Self { secret }
    }

    pub fn public_key(&self) -> VrfPublicKey {
        self.secret.public_key()
    }

    /// Prove over `seed`, returning the proof and the output it commits to.
    pub fn prove(&self, seed: &Seed) -> (VrfProof, VrfOutput) {
        vrf::prove(&self.secret, seed.as_bytes())
    }
}
