//! Checkpoint verification against the log's public key
//!
//! Signatures are checked over the note body with the key the log
//! publishes; consistency between two checkpoints is proven with an
//! RFC 6962 proof fetched from the log.

use crate::checkpoint::SignedCheckpoint;
use crate::client::LogClient;
use crate::error::{MonitorError, Result};
use crate::merkle;
use ring::signature::{self, UnparsedPublicKey};
use sha2::{Digest, Sha256};
use x509_parser::prelude::FromDer;
use x509_parser::x509::SubjectPublicKeyInfo;

const OID_EC_PUBLIC_KEY: &str = "1.2.840.10045.2.1";
const OID_ED25519: &str = "1.3.101.112";
const OID_RSA_ENCRYPTION: &str = "1.2.840.113549.1.1.1";

/// Signature scheme of the log key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAlgorithm {
    /// ECDSA over P-256 with SHA-256, ASN.1 signatures
    EcdsaP256Sha256,
    /// Ed25519 over the raw payload
    Ed25519,
    /// RSA PKCS#1 v1.5 with SHA-256
    RsaPkcs1Sha256,
}

/// A log public key decoded from SubjectPublicKeyInfo
#[derive(Debug, Clone)]
pub struct LogPublicKey {
    algorithm: KeyAlgorithm,
    key_bytes: Vec<u8>,
    spki_der: Vec<u8>,
}

impl LogPublicKey {
    /// Decode a `PUBLIC KEY` PEM block
    pub fn from_pem(pem: &str) -> Result<Self> {
        let (_, block) = x509_parser::pem::parse_x509_pem(pem.trim().as_bytes())
            .map_err(|e| MonitorError::Config(format!("Invalid public key PEM: {}", e)))?;
        if block.label != "PUBLIC KEY" {
            return Err(MonitorError::Config(format!(
                "Expected PUBLIC KEY PEM block, got {}",
                block.label
            )));
        }
        Self::from_spki_der(&block.contents)
    }

    /// Decode DER-encoded SubjectPublicKeyInfo
    pub fn from_spki_der(der: &[u8]) -> Result<Self> {
        let (_, spki) = SubjectPublicKeyInfo::from_der(der)
            .map_err(|e| MonitorError::Config(format!("Invalid public key: {}", e)))?;

        let key_bytes = spki.subject_public_key.data.to_vec();
        let algorithm = match spki.algorithm.algorithm.to_id_string().as_str() {
            OID_EC_PUBLIC_KEY if key_bytes.len() == 65 && key_bytes[0] == 0x04 => {
                KeyAlgorithm::EcdsaP256Sha256
            }
            OID_EC_PUBLIC_KEY => {
                return Err(MonitorError::Config(
                    "Unsupported elliptic curve, only P-256 is accepted".to_string(),
                ))
            }
            OID_ED25519 => KeyAlgorithm::Ed25519,
            OID_RSA_ENCRYPTION => KeyAlgorithm::RsaPkcs1Sha256,
            other => {
                return Err(MonitorError::Config(format!(
                    "Unsupported public key algorithm {}",
                    other
                )))
            }
        };

        Ok(Self {
            algorithm,
            key_bytes,
            spki_der: der.to_vec(),
        })
    }

    /// Signature scheme
    pub fn algorithm(&self) -> KeyAlgorithm {
        self.algorithm
    }

    /// Note key hint: first 4 bytes of SHA-256 over the SPKI DER
    pub fn key_hint(&self) -> u32 {
        let digest = Sha256::digest(&self.spki_der);
        u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
    }

    fn verify(&self, message: &[u8], sig: &[u8]) -> bool {
        let alg: &'static dyn signature::VerificationAlgorithm = match self.algorithm {
            KeyAlgorithm::EcdsaP256Sha256 => &signature::ECDSA_P256_SHA256_ASN1,
            KeyAlgorithm::Ed25519 => &signature::ED25519,
            KeyAlgorithm::RsaPkcs1Sha256 => &signature::RSA_PKCS1_2048_8192_SHA256,
        };
        UnparsedPublicKey::new(alg, &self.key_bytes)
            .verify(message, sig)
            .is_ok()
    }
}

/// Verifies checkpoints published by one log
#[derive(Debug, Clone)]
pub struct LogVerifier {
    key: LogPublicKey,
}

impl LogVerifier {
    /// Create a verifier for the given key
    pub fn new(key: LogPublicKey) -> Self {
        Self { key }
    }

    /// Create a verifier from a `PUBLIC KEY` PEM block
    pub fn from_pem(pem: &str) -> Result<Self> {
        LogPublicKey::from_pem(pem).map(Self::new)
    }

    /// Fetch the log's public key and build a verifier
    pub async fn fetch(client: &dyn LogClient) -> Result<Self> {
        let pem = client.public_key().await?;
        let verifier = Self::from_pem(&pem)?;
        tracing::info!(
            client = client.name(),
            algorithm = ?verifier.key.algorithm(),
            key_hint = %format!("{:08x}", verifier.key.key_hint()),
            "Log public key loaded"
        );
        Ok(verifier)
    }

    /// The log key
    pub fn key(&self) -> &LogPublicKey {
        &self.key
    }

    /// Verify every signature on a checkpoint
    ///
    /// Requires at least one signature; each must carry this key's hint
    /// and verify over the note body.
    pub fn verify_signature(&self, checkpoint: &SignedCheckpoint) -> Result<()> {
        if checkpoint.signatures.is_empty() {
            return Err(MonitorError::Signature(format!(
                "checkpoint {} is unsigned",
                checkpoint
            )));
        }

        let payload = checkpoint.signed_payload();
        let hint = self.key.key_hint();
        for sig in &checkpoint.signatures {
            if sig.key_hint != hint {
                return Err(MonitorError::Signature(format!(
                    "signature by {} has key hint {:08x}, expected {:08x}",
                    sig.name, sig.key_hint, hint
                )));
            }
            if !self.key.verify(payload.as_bytes(), &sig.signature) {
                return Err(MonitorError::Signature(format!(
                    "invalid signature by {} on checkpoint {}",
                    sig.name, checkpoint
                )));
            }
        }
        Ok(())
    }

    /// Prove that `current` extends `previous`
    pub async fn verify_consistency(
        &self,
        previous: &SignedCheckpoint,
        current: &SignedCheckpoint,
        tree_id: &str,
        client: &dyn LogClient,
    ) -> Result<()> {
        let old_size = previous.tree_size;
        let new_size = current.tree_size;

        if old_size == 0 {
            return Err(MonitorError::EmptyLogConsistency);
        }

        if old_size == new_size {
            if previous.root_hash != current.root_hash {
                return Err(MonitorError::Consistency(format!(
                    "root hash changed at tree size {}: {} != {}",
                    new_size,
                    hex::encode(&previous.root_hash),
                    hex::encode(&current.root_hash)
                )));
            }
            return Ok(());
        }

        if old_size > new_size {
            return Err(MonitorError::Consistency(format!(
                "log shrank from {} to {} entries",
                old_size, new_size
            )));
        }

        let proof = client.consistency_proof(old_size, new_size, tree_id).await?;
        let hashes = proof
            .hashes
            .iter()
            .map(|h| hex::decode(h))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| MonitorError::Consistency(format!("malformed proof hash: {}", e)))?;

        merkle::verify_consistency(
            old_size,
            new_size,
            &hashes,
            &previous.root_hash,
            &current.root_hash,
        )
        .map_err(|e| {
            MonitorError::Consistency(format!(
                "proof from {} to {} rejected: {}",
                old_size, new_size, e
            ))
        })?;

        tracing::debug!(old_size, new_size, "Consistency proof verified");
        Ok(())
    }
}
