//! Shared fixtures: an in-process transparency log with a real Merkle
//! tree, Ed25519-signed checkpoints and switchable misbehaviour.

#![allow(dead_code)]

use a3s_tlog_monitor::checkpoint::{NoteSignature, SignedCheckpoint};
use a3s_tlog_monitor::client::{ConsistencyProof, InactiveShard, LogClient, LogInfo, RawLogEntry};
use a3s_tlog_monitor::merkle::{empty_root, leaf_hash, node_hash, Hash};
use a3s_tlog_monitor::{LogVerifier, MonitorError, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ring::rand::SystemRandom;
use ring::signature::{Ed25519KeyPair, KeyPair};
use sha2::{Digest, Sha256};
use std::sync::Mutex;

pub const ED25519_SPKI_PREFIX: &str = "302a300506032b6570032100";
pub const ORIGIN: &str = "log.example - 2605736670972794746";
pub const TREE_ID: &str = "2605736670972794746";

// ─── Merkle Tree ─────────────────────────────────────────────────

fn split_point(n: usize) -> usize {
    let mut k = 1;
    while k * 2 < n {
        k *= 2;
    }
    k
}

/// RFC 6962 Merkle tree hash
pub fn tree_root(leaves: &[Vec<u8>]) -> Hash {
    match leaves.len() {
        0 => empty_root(),
        1 => leaf_hash(&leaves[0]),
        n => {
            let k = split_point(n);
            node_hash(&tree_root(&leaves[..k]), &tree_root(&leaves[k..]))
        }
    }
}

fn subproof(m: usize, leaves: &[Vec<u8>], complete: bool) -> Vec<Hash> {
    let n = leaves.len();
    if m == n {
        return if complete { Vec::new() } else { vec![tree_root(leaves)] };
    }
    let k = split_point(n);
    if m <= k {
        let mut proof = subproof(m, &leaves[..k], complete);
        proof.push(tree_root(&leaves[k..]));
        proof
    } else {
        let mut proof = subproof(m - k, &leaves[k..], false);
        proof.push(tree_root(&leaves[..k]));
        proof
    }
}

/// RFC 6962 consistency proof from `m` to `leaves.len()`
pub fn consistency_proof(m: usize, leaves: &[Vec<u8>]) -> Vec<Hash> {
    subproof(m, leaves, true)
}

// ─── Keys & Entries ──────────────────────────────────────────────

pub fn public_key_pem(der: &[u8]) -> String {
    format!(
        "-----BEGIN PUBLIC KEY-----\n{}\n-----END PUBLIC KEY-----\n",
        BASE64.encode(der)
    )
}

/// SPKI DER of an Ed25519 key whose public bytes are all `seed`
pub fn seeded_key_der(seed: u8) -> Vec<u8> {
    let mut der = hex::decode(ED25519_SPKI_PREFIX).unwrap();
    der.extend_from_slice(&[seed; 32]);
    der
}

/// Fingerprint the monitor computes for [`seeded_key_der`]
pub fn seeded_key_fingerprint(seed: u8) -> String {
    hex::encode(Sha256::digest(seeded_key_der(seed)))
}

/// Canonical hashedrekord body signed with the seeded key
pub fn hashedrekord_body(seed: u8) -> Vec<u8> {
    let pem = public_key_pem(&seeded_key_der(seed));
    serde_json::to_vec(&serde_json::json!({
        "apiVersion": "0.0.1",
        "kind": "hashedrekord",
        "spec": {
            "data": {"hash": {"algorithm": "sha256", "value": hex::encode([seed; 32])}},
            "signature": {
                "content": BASE64.encode([seed; 64]),
                "publicKey": {"content": BASE64.encode(pem)}
            }
        }
    }))
    .unwrap()
}

/// Log signing key
pub struct LogSigner {
    pair: Ed25519KeyPair,
    pem: String,
    key_hint: u32,
}

impl LogSigner {
    pub fn generate() -> Self {
        let rng = SystemRandom::new();
        let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng).unwrap();
        let pair = Ed25519KeyPair::from_pkcs8(pkcs8.as_ref()).unwrap();
        let mut der = hex::decode(ED25519_SPKI_PREFIX).unwrap();
        der.extend_from_slice(pair.public_key().as_ref());
        let pem = public_key_pem(&der);
        let key_hint = LogVerifier::from_pem(&pem).unwrap().key().key_hint();
        Self {
            pair,
            pem,
            key_hint,
        }
    }

    pub fn pem(&self) -> &str {
        &self.pem
    }

    pub fn verifier(&self) -> LogVerifier {
        LogVerifier::from_pem(&self.pem).unwrap()
    }

    pub fn sign(&self, mut checkpoint: SignedCheckpoint) -> SignedCheckpoint {
        let sig = self.pair.sign(checkpoint.signed_payload().as_bytes());
        checkpoint.signatures = vec![NoteSignature {
            name: "log.example".to_string(),
            key_hint: self.key_hint,
            signature: sig.as_ref().to_vec(),
        }];
        checkpoint
    }
}

// ─── Fake Log ────────────────────────────────────────────────────

#[derive(Default)]
struct FakeState {
    leaves: Vec<Vec<u8>>,
    published: usize,
    inactive_offset: u64,
    forged_root: Option<Vec<u8>>,
    corrupt_signature: bool,
    unavailable: bool,
    proof_requests: usize,
    entry_requests: Vec<Vec<u64>>,
}

/// In-process log serving signed checkpoints over a real Merkle tree
pub struct FakeLog {
    signer: LogSigner,
    state: Mutex<FakeState>,
}

impl FakeLog {
    pub fn new() -> Self {
        Self {
            signer: LogSigner::generate(),
            state: Mutex::new(FakeState::default()),
        }
    }

    pub fn signer(&self) -> &LogSigner {
        &self.signer
    }

    pub fn verifier(&self) -> LogVerifier {
        self.signer.verifier()
    }

    /// Append entries without publishing them
    pub fn append(&self, bodies: impl IntoIterator<Item = Vec<u8>>) {
        self.state.lock().unwrap().leaves.extend(bodies);
    }

    /// Append `n` filler entries
    pub fn append_filler(&self, n: usize) {
        let start = self.state.lock().unwrap().leaves.len();
        self.append((start..start + n).map(|i| hashedrekord_body((i % 200) as u8)));
    }

    /// Serve a checkpoint covering the first `size` entries
    pub fn publish(&self, size: usize) {
        let mut state = self.state.lock().unwrap();
        assert!(size <= state.leaves.len());
        state.published = size;
    }

    /// Append filler entries and publish all of them
    pub fn grow_to(&self, size: usize) {
        let current = self.state.lock().unwrap().leaves.len();
        if size > current {
            self.append_filler(size - current);
        }
        self.publish(size);
    }

    /// Sign a root that does not match the served entries
    pub fn forge_root(&self, root: Option<Vec<u8>>) {
        self.state.lock().unwrap().forged_root = root;
    }

    pub fn corrupt_signature(&self, corrupt: bool) {
        self.state.lock().unwrap().corrupt_signature = corrupt;
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unwrap().unavailable = unavailable;
    }

    /// Pretend `offset` leaves live in frozen shards
    pub fn set_inactive_offset(&self, offset: u64) {
        self.state.lock().unwrap().inactive_offset = offset;
    }

    pub fn proof_requests(&self) -> usize {
        self.state.lock().unwrap().proof_requests
    }

    pub fn entry_requests(&self) -> Vec<Vec<u64>> {
        self.state.lock().unwrap().entry_requests.clone()
    }

    /// Correctly signed checkpoint for the first `size` entries
    pub fn checkpoint(&self, size: usize) -> SignedCheckpoint {
        let state = self.state.lock().unwrap();
        let root = tree_root(&state.leaves[..size]).to_vec();
        self.signer
            .sign(SignedCheckpoint::new(ORIGIN, size as u64, root))
    }
}

#[async_trait]
impl LogClient for FakeLog {
    async fn log_info(&self) -> Result<LogInfo> {
        let state = self.state.lock().unwrap();
        if state.unavailable {
            return Err(MonitorError::Connection("connection refused".to_string()));
        }

        let root = match &state.forged_root {
            Some(root) => root.clone(),
            None => tree_root(&state.leaves[..state.published]).to_vec(),
        };
        let mut checkpoint = self.signer.sign(SignedCheckpoint::new(
            ORIGIN,
            state.published as u64,
            root.clone(),
        ));
        if state.corrupt_signature {
            checkpoint.signatures[0].signature[0] ^= 0xff;
        }

        let inactive_shards = if state.inactive_offset > 0 {
            vec![InactiveShard {
                root_hash: String::new(),
                signed_tree_head: String::new(),
                tree_id: "1".to_string(),
                tree_size: state.inactive_offset,
            }]
        } else {
            Vec::new()
        };

        Ok(LogInfo {
            root_hash: hex::encode(root),
            signed_tree_head: checkpoint.serialize(),
            tree_id: TREE_ID.to_string(),
            tree_size: state.published as u64,
            inactive_shards,
        })
    }

    async fn public_key(&self) -> Result<String> {
        Ok(self.signer.pem().to_string())
    }

    async fn consistency_proof(
        &self,
        first_size: u64,
        last_size: u64,
        _tree_id: &str,
    ) -> Result<ConsistencyProof> {
        let mut state = self.state.lock().unwrap();
        state.proof_requests += 1;
        let last = last_size as usize;
        if last > state.leaves.len() || first_size > last_size {
            return Err(MonitorError::Api(format!(
                "no proof from {} to {}",
                first_size, last_size
            )));
        }
        let leaves = &state.leaves[..last];
        Ok(ConsistencyProof {
            root_hash: hex::encode(tree_root(leaves)),
            hashes: consistency_proof(first_size as usize, leaves)
                .iter()
                .map(hex::encode)
                .collect(),
        })
    }

    async fn entries_by_index(&self, indices: &[u64]) -> Result<Vec<RawLogEntry>> {
        let mut state = self.state.lock().unwrap();
        state.entry_requests.push(indices.to_vec());
        let offset = state.inactive_offset;
        let published = state.published as u64;

        Ok(indices
            .iter()
            .filter(|&&index| index >= offset && index - offset < published)
            .map(|&index| RawLogEntry {
                uuid: format!("{:064x}", index),
                body: BASE64.encode(&state.leaves[(index - offset) as usize]),
                integrated_time: 0,
                log_id: TREE_ID.to_string(),
                log_index: index,
            })
            .collect())
    }

    fn name(&self) -> &str {
        "fake"
    }
}
