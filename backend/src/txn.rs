//! Operator credentials and signed call envelopes.
//!
//! The operator signs each state-changing call with an sr25519 key; the
//! public key is the sender address. Signed bytes:
//!
//! ```text
//! app_id (8, BE) || method (1) || request_id (8, BE) [|| proof (96)]
//! ```

use beacon::vrf::VrfProof;
use beacon::{Address, AppId, RequestId};
use schnorrkel::{signing_context, ExpansionMode, Keypair, MiniSecretKey, PublicKey, Signature};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const CALL_CONTEXT: &[u8] = b"randomness-beacon-call";

const METHOD_COMPLETE: u8 = 0;
const METHOD_CANCEL: u8 = 1;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TxnError {
    #[error("invalid operator key: {0}")]
    InvalidKey(String),
    #[error("sender is not a valid public key")]
    InvalidSender,
    #[error("malformed signature")]
    MalformedSignature,
    #[error("signature does not match sender")]
    InvalidSignature,
}

/// State-changing beacon calls the daemon submits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum BeaconCall {
    CompleteRequest { request_id: RequestId, proof: VrfProof },
    CancelRequest { request_id: RequestId },
}

impl BeaconCall {
    pub fn request_id(&self) -> RequestId {
        match self {
            BeaconCall::CompleteRequest { request_id, .. } | BeaconCall::CancelRequest { request_id } => {
                *request_id
            }
        }
    }

    fn signing_bytes(&self, app_id: AppId) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(8 + 1 + 8 + VrfProof::LEN);
        bytes.extend_from_slice(&app_id.0.to_be_bytes());
        match self {
            BeaconCall::CompleteRequest { request_id, proof } => {
                bytes.push(METHOD_COMPLETE);
                bytes.extend_from_slice(&request_id.to_be_bytes());
                bytes.extend_from_slice(proof.as_bytes());
            }
            BeaconCall::CancelRequest { request_id } => {
                bytes.push(METHOD_CANCEL);
                bytes.extend_from_slice(&request_id.to_be_bytes());
            }
        }
        bytes
    }
}

/// A call plus the sender's signature over it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedCall {
    pub app_id: AppId,
    pub sender: Address,
    #[serde(flatten)]
    pub call: BeaconCall,
    /// Hex-encoded 64-byte sr25519 signature.
    pub signature: String,
}

impl SignedCall {
    /// Check the signature and return the authenticated sender.
    pub fn verify(&self) -> Result<Address, TxnError> {
        let public = PublicKey::from_bytes(self.sender.as_bytes()).map_err(|_| TxnError::InvalidSender)?;
        let raw = hex::decode(&self.signature).map_err(|_| TxnError::MalformedSignature)?;
        let signature = Signature::from_bytes(&raw).map_err(|_| TxnError::MalformedSignature)?;
        public
            .verify(
                signing_context(CALL_CONTEXT).bytes(&self.call.signing_bytes(self.app_id)),
                &signature,
            )
            .map_err(|_| TxnError::InvalidSignature)?;
        Ok(self.sender)
    }
}

/// Operator signing key.
pub struct OperatorKey {
    keypair: Keypair,
}

impl OperatorKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TxnError> {
        let mini = MiniSecretKey::from_bytes(bytes).map_err(|e| TxnError::InvalidKey(e.to_string()))?;
        Ok(Self {
            keypair: mini.expand_to_keypair(ExpansionMode::Uniform),
        })
    }

    pub fn from_hex(s: &str) -> Result<Self, TxnError> {
        let bytes = hex::decode(s.trim()).map_err(|e| TxnError::InvalidKey(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    pub fn address(&self) -> Address {
        Address(self.keypair.public.to_bytes())
    }

    pub fn sign(&self, app_id: AppId, call: BeaconCall) -> SignedCall {
        let signature = self
            .keypair
            .sign(signing_context(CALL_CONTEXT).bytes(&call.signing_bytes(app_id)));
        SignedCall {
            app_id,
            sender: self.address(),
            call,
            signature: hex::encode(signature.to_bytes()),
        }
    }
}

impl std::fmt::Debug for OperatorKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OperatorKey({})", self.address())
    }
}
