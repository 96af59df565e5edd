//! RFC 6962 Merkle tree hashing and consistency-proof verification
//!
//! Verification follows RFC 9162 §2.1.4.2.

use sha2::{Digest, Sha256};

/// A SHA-256 tree hash
pub type Hash = [u8; 32];

/// Hash of a leaf: `SHA-256(0x00 || data)`
pub fn leaf_hash(data: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update([0x00]);
    hasher.update(data);
    hasher.finalize().into()
}

/// Hash of an interior node: `SHA-256(0x01 || left || right)`
pub fn node_hash(left: &[u8], right: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update([0x01]);
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

/// Root of the empty tree: `SHA-256("")`
pub fn empty_root() -> Hash {
    Sha256::digest(b"").into()
}

/// Reasons a consistency proof is rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProofError {
    SizeOrder { first: u64, second: u64 },
    EmptyFirstTree,
    UnexpectedProof(usize),
    EmptyProof,
    TooLong,
    BadHashLength(usize),
    RootMismatch,
}

impl std::fmt::Display for ProofError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SizeOrder { first, second } => {
                write!(f, "first tree size {} exceeds second {}", first, second)
            }
            Self::EmptyFirstTree => write!(f, "first tree is empty"),
            Self::UnexpectedProof(n) => {
                write!(f, "expected empty proof for equal sizes, got {} hashes", n)
            }
            Self::EmptyProof => write!(f, "empty consistency proof"),
            Self::TooLong => write!(f, "consistency proof has too many hashes"),
            Self::BadHashLength(n) => write!(f, "proof hash has {} bytes, expected 32", n),
            Self::RootMismatch => write!(f, "calculated root does not match"),
        }
    }
}

impl std::error::Error for ProofError {}

/// Verify that a tree of `first` leaves with root `first_root` is a prefix
/// of a tree of `second` leaves with root `second_root`
pub fn verify_consistency(
    first: u64,
    second: u64,
    proof: &[Vec<u8>],
    first_root: &[u8],
    second_root: &[u8],
) -> Result<(), ProofError> {
    if first > second {
        return Err(ProofError::SizeOrder { first, second });
    }
    if first == second {
        if !proof.is_empty() {
            return Err(ProofError::UnexpectedProof(proof.len()));
        }
        return if first_root == second_root {
            Ok(())
        } else {
            Err(ProofError::RootMismatch)
        };
    }
    if first == 0 {
        return Err(ProofError::EmptyFirstTree);
    }
    if proof.is_empty() {
        return Err(ProofError::EmptyProof);
    }
    if let Some(bad) = proof.iter().find(|h| h.len() != 32) {
        return Err(ProofError::BadHashLength(bad.len()));
    }

    let mut path: Vec<&[u8]> = Vec::with_capacity(proof.len() + 1);
    if first.is_power_of_two() {
        path.push(first_root);
    }
    path.extend(proof.iter().map(Vec::as_slice));

    let mut fn_ = first - 1;
    let mut sn = second - 1;
    while fn_ & 1 == 1 {
        fn_ >>= 1;
        sn >>= 1;
    }

    let mut fr: Hash = to_hash(path[0])?;
    let mut sr: Hash = fr;

    for c in &path[1..] {
        if sn == 0 {
            return Err(ProofError::TooLong);
        }
        if fn_ & 1 == 1 || fn_ == sn {
            fr = node_hash(c, &fr);
            sr = node_hash(c, &sr);
            if fn_ & 1 == 0 {
                while fn_ & 1 == 0 && fn_ != 0 {
                    fn_ >>= 1;
                    sn >>= 1;
                }
            }
        } else {
            sr = node_hash(&sr, c);
        }
        fn_ >>= 1;
        sn >>= 1;
    }

    if sn != 0 || fr.as_slice() != first_root || sr.as_slice() != second_root {
        return Err(ProofError::RootMismatch);
    }
    Ok(())
}

fn to_hash(bytes: &[u8]) -> Result<Hash, ProofError> {
    bytes
        .try_into()
        .map_err(|_| ProofError::BadHashLength(bytes.len()))
}
