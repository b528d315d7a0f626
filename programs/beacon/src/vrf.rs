//! Verifiable random function used by the beacon.
//!
//! Backed by schnorrkel's sr25519 VRF. A proof is the 32-byte VRF pre-output
//! followed by the 64-byte DLEQ proof; the 64-byte output is the SHA-512 of
//! the VRF bytes extracted from the verified pre-output.
//!
//! ```text
//! proof  = preout (32) || proof (64)
//! output = SHA-512(make_bytes(inout, OUTPUT_CONTEXT))
//! ```

use schnorrkel::vrf::{VRFPreOut, VRFProof};
use schnorrkel::{signing_context, ExpansionMode, MiniSecretKey, PublicKey};
use sha2::{Digest, Sha512};
use thiserror::Error;

use crate::types::hex_bytes;

/// Domain separation for the VRF transcript.
const VRF_CONTEXT: &[u8] = b"randomness-beacon-vrf";
/// Label used to extract output bytes from the VRF in/out pair.
const OUTPUT_CONTEXT: &[u8] = b"randomness-beacon-output";

hex_bytes!(
    /// Public key the beacon verifies proofs against.
    VrfPublicKey,
    32
);

hex_bytes!(
    /// Serialized VRF proof submitted with `completeRequest`.
    VrfProof,
    96
);

hex_bytes!(
    /// Randomness delivered to the requester's callback.
    VrfOutput,
    64
);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VrfError {
    #[error("invalid VRF secret key: {0}")]
    InvalidSecretKey(String),
    #[error("invalid VRF public key: {0}")]
    InvalidPublicKey(String),
    #[error("malformed VRF proof: {0}")]
    MalformedProof(String),
    #[error("VRF proof does not verify")]
    VerificationFailed,
}

/// 32-byte VRF mini secret key. Never leaves the process holding it.
#[derive(Clone)]
pub struct VrfSecretKey {
    inner: MiniSecretKey,
}

impl VrfSecretKey {
    pub fn generate() -> Self {
        Self {
            inner: MiniSecretKey::generate(),
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, VrfError> {
        MiniSecretKey::from_bytes(bytes)
            .map(|inner| Self { inner })
            .map_err(|e| VrfError::InvalidSecretKey(e.to_string()))
    }

    pub fn from_hex(s: &str) -> Result<Self, VrfError> {
        let bytes = hex::decode(s.trim()).map_err(|e| VrfError::InvalidSecretKey(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.inner.to_bytes()
    }

    pub fn public_key(&self) -> VrfPublicKey {
        let keypair = self.inner.expand_to_keypair(ExpansionMode::Uniform);
        VrfPublicKey(keypair.public.to_bytes())
    }
}

impl std::fmt::Debug for VrfSecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "VrfSecretKey(public={})", self.public_key())
    }
}

impl VrfPublicKey {
    /// Whether the bytes decode to a usable sr25519 point.
    pub fn is_valid(&self) -> bool {
        PublicKey::from_bytes(&self.0).is_ok()
    }
}

/// Generate a fresh keypair.
pub fn keypair() -> (VrfPublicKey, VrfSecretKey) {
    let secret = VrfSecretKey::generate();
    (secret.public_key(), secret)
}

/// Prove `message` under `secret`. Deterministic for a given key and message.
pub fn prove(secret: &VrfSecretKey, message: &[u8]) -> (VrfProof, VrfOutput) {
    let keypair = secret.inner.expand_to_keypair(ExpansionMode::Uniform);
    let (inout, proof, _) = keypair.vrf_sign(signing_context(VRF_CONTEXT).bytes(message));

    let mut bytes = [0u8; 96];
    bytes[..32].copy_from_slice(&inout.to_preout().to_bytes());
    bytes[32..].copy_from_slice(&proof.to_bytes());

    let raw: [u8; 32] = inout.make_bytes(OUTPUT_CONTEXT);
    (VrfProof(bytes), expand_output(&raw))
}

/// Verify `proof` for `message` under `public`, returning the output.
pub fn verify(public: &VrfPublicKey, proof: &VrfProof, message: &[u8]) -> Result<VrfOutput, VrfError> {
    let public =
        PublicKey::from_bytes(&public.0).map_err(|e| VrfError::InvalidPublicKey(e.to_string()))?;
    let preout = VRFPreOut::from_bytes(&proof.0[..32])
        .map_err(|e| VrfError::MalformedProof(e.to_string()))?;
    let dleq =
        VRFProof::from_bytes(&proof.0[32..]).map_err(|e| VrfError::MalformedProof(e.to_string()))?;

    let (inout, _) = public
        .vrf_verify(signing_context(VRF_CONTEXT).bytes(message), &preout, &dleq)
        .map_err(|_| VrfError::VerificationFailed)?;

    let raw: [u8; 32] = inout.make_bytes(OUTPUT_CONTEXT);
    Ok(expand_output(&raw))
}

fn expand_output(raw: &[u8; 32]) -> VrfOutput {
    let digest = Sha512::digest(raw);
    let mut output = [0u8; 64];
    output.copy_from_slice(&digest);
    VrfOutput(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proof_verifies_and_output_matches() {
        let (pk, sk) = keypair();
        let (proof, output) = prove(&sk, b"seed");
        assert_eq!(verify(&pk, &proof, b"seed").unwrap(), output);
    }

    #[test]
    fn deterministic_output_for_same_message() {
        let sk = VrfSecretKey::from_bytes(&[7u8; 32]).unwrap();
        let (_, o1) = prove(&sk, b"round-10");
        let (_, o2) = prove(&sk, b"round-10");
        let (_, o3) = prove(&sk, b"round-11");
        assert_eq!(o1, o2);
        assert_ne!(o1, o3);
    }

    #[test]
    fn rejects_wrong_message_and_wrong_key() {
        let (pk, sk) = keypair();
        let (other_pk, _) = keypair();
        let (proof, _) = prove(&sk, b"seed");
        assert!(verify(&pk, &proof, b"other").is_err());
        assert!(verify(&other_pk, &proof, b"seed").is_err());
    }

    #[test]
    fn rejects_tampered_proof() {
        let (pk, sk) = keypair();
        let (mut proof, _) = prove(&sk, b"seed");
        proof.0[40] ^= 0x01;
        assert!(verify(&pk, &proof, b"seed").is_err());
    }

    #[test]
    fn proof_text_forms_survive_outside_the_defining_module() {
        let (_, sk) = keypair();
        let (proof, output) = prove(&sk, b"seed");
        assert_eq!(VrfProof::LEN, 96);
        assert_eq!(proof.to_string().parse::<VrfProof>().unwrap(), proof);
        let json = serde_json::to_string(&output).unwrap();
        assert_eq!(serde_json::from_str::<VrfOutput>(&json).unwrap(), output);
        assert!("abc".parse::<VrfPublicKey>().is_err());
        // An 80-byte ECVRF-sized proof is not a valid sr25519 proof.
        assert!(hex::encode([0u8; 80]).parse::<VrfProof>().is_err());
    }

    #[test]
    fn secret_key_hex_roundtrip() {
        let sk = VrfSecretKey::from_bytes(&[3u8; 32]).unwrap();
        let restored = VrfSecretKey::from_hex(&hex::encode(sk.to_bytes())).unwrap();
        assert_eq!(restored.public_key(), sk.public_key());
    }
}
