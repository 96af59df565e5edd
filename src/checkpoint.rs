//! Signed checkpoint codec
//!
//! A checkpoint is a signed note: a newline-terminated body of
//! `origin`, `tree size`, `base64 root hash` and optional extra lines,
//! then a blank line and one signature line per signer:
//!
//! ```text
//! rekor.sigstore.dev - 1193050959916656506
//! 266676745
//! 3ZhLKI3mKUlpedQ9hiIMbJIjKr3vTc+ueViyxWqwQGA=
//!
//! — rekor.sigstore.dev wNI9ajBEAiAE7ER4yd8Waq4Z...
//! ```
//!
//! History files store one checkpoint per line with every newline
//! escaped as the two characters `\n`.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use thiserror::Error;

/// Prefix of every signature line (em dash + space)
pub const SIGNATURE_PREFIX: &str = "\u{2014} ";

/// Digest size of the log's hash function (SHA-256)
pub const ROOT_HASH_LEN: usize = 32;

/// Errors produced while decoding checkpoint text
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CheckpointError {
    #[error("checkpoint body has {0} lines, expected at least 3")]
    TooFewLines(usize),

    #[error("note body must end with a newline")]
    UnterminatedBody,

    #[error("invalid tree size {0:?}")]
    InvalidTreeSize(String),

    #[error("invalid root hash: {0}")]
    InvalidRootHash(String),

    #[error("malformed signature line {0:?}")]
    MalformedSignature(String),

    #[error("empty signature block")]
    EmptySignatureBlock,
}

/// One signature over the checkpoint body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteSignature {
    /// Signer name (usually the log's hostname)
    pub name: String,
    /// First 4 bytes of SHA-256 over the signer's SPKI DER, big endian
    pub key_hint: u32,
    /// Raw signature bytes
    pub signature: Vec<u8>,
}

impl NoteSignature {
    fn parse(line: &str) -> Result<Self, CheckpointError> {
        let malformed = || CheckpointError::MalformedSignature(line.to_string());

        let rest = line.strip_prefix(SIGNATURE_PREFIX).ok_or_else(malformed)?;
        let (name, encoded) = rest.rsplit_once(' ').ok_or_else(malformed)?;
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(malformed());
        }

        let raw = BASE64.decode(encoded).map_err(|_| malformed())?;
        if raw.len() < 5 {
            return Err(malformed());
        }
        let key_hint = u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]);

        Ok(Self {
            name: name.to_string(),
            key_hint,
            signature: raw[4..].to_vec(),
        })
    }

    fn encode(&self) -> String {
        let mut raw = Vec::with_capacity(4 + self.signature.len());
        raw.extend_from_slice(&self.key_hint.to_be_bytes());
        raw.extend_from_slice(&self.signature);
        format!("{}{} {}\n", SIGNATURE_PREFIX, self.name, BASE64.encode(raw))
    }
}

/// A log checkpoint together with its note signatures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedCheckpoint {
    /// Log identity, e.g. `rekor.sigstore.dev - 1193050959916656506`
    pub origin: String,
    /// Number of leaves committed
    pub tree_size: u64,
    /// Merkle tree root hash
    pub root_hash: Vec<u8>,
    /// Extra body lines after the root hash
    pub extra_data: Vec<String>,
    /// Signatures over the body, empty for an unsigned note
    pub signatures: Vec<NoteSignature>,
}

impl SignedCheckpoint {
    /// Build an unsigned checkpoint
    pub fn new(origin: impl Into<String>, tree_size: u64, root_hash: Vec<u8>) -> Self {
        Self {
            origin: origin.into(),
            tree_size,
            root_hash,
            extra_data: Vec::new(),
            signatures: Vec::new(),
        }
    }

    /// Decode the signed-note text form
    pub fn parse(text: &str) -> Result<Self, CheckpointError> {
        let (body, signature_block) = match text.rfind("\n\n") {
            Some(split) => (&text[..=split], Some(&text[split + 2..])),
            None => (text, None),
        };

        if !body.ends_with('\n') {
            return Err(CheckpointError::UnterminatedBody);
        }

        let lines: Vec<&str> = body.split_terminator('\n').collect();
        if lines.len() < 3 {
            return Err(CheckpointError::TooFewLines(lines.len()));
        }

        let tree_size = parse_tree_size(lines[1])?;

        let root_hash = BASE64
            .decode(lines[2])
            .map_err(|e| CheckpointError::InvalidRootHash(e.to_string()))?;
        if root_hash.len() != ROOT_HASH_LEN {
            return Err(CheckpointError::InvalidRootHash(format!(
                "expected {} bytes, got {}",
                ROOT_HASH_LEN,
                root_hash.len()
            )));
        }

        let signatures = match signature_block {
            Some(block) => {
                if block.is_empty() {
                    return Err(CheckpointError::EmptySignatureBlock);
                }
                if !block.ends_with('\n') {
                    return Err(CheckpointError::MalformedSignature(block.to_string()));
                }
                block
                    .split_terminator('\n')
                    .map(NoteSignature::parse)
                    .collect::<Result<Vec<_>, _>>()?
            }
            None => Vec::new(),
        };

        Ok(Self {
            origin: lines[0].to_string(),
            tree_size,
            root_hash,
            extra_data: lines[3..].iter().map(|l| l.to_string()).collect(),
            signatures,
        })
    }

    /// The note body covered by signatures
    pub fn signed_payload(&self) -> String {
        let mut body = format!(
            "{}\n{}\n{}\n",
            self.origin,
            self.tree_size,
            BASE64.encode(&self.root_hash)
        );
        for line in &self.extra_data {
            body.push_str(line);
            body.push('\n');
        }
        body
    }

    /// Encode back to signed-note text
    pub fn serialize(&self) -> String {
        let mut text = self.signed_payload();
        if !self.signatures.is_empty() {
            text.push('\n');
            for sig in &self.signatures {
                text.push_str(&sig.encode());
            }
        }
        text
    }

    /// Flatten to a single history-file line (without the trailing newline)
    ///
    /// A literal `\n` already present in the origin or an extra line does not
    /// survive the round trip; it decodes as a newline.
    pub fn to_record(&self) -> String {
        escape_record(&self.serialize())
    }

    /// Decode a single history-file line
    pub fn from_record(record: &str) -> Result<Self, CheckpointError> {
        Self::parse(&unescape_record(record))
    }

    /// Unix timestamp (seconds) from a `Timestamp: <nanos>` extra line, if present
    pub fn timestamp(&self) -> Option<i64> {
        self.extra_data.iter().find_map(|line| {
            line.strip_prefix("Timestamp: ")
                .and_then(|nanos| nanos.trim().parse::<i64>().ok())
                .map(|nanos| nanos / 1_000_000_000)
        })
    }
}

impl std::fmt::Display for SignedCheckpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.origin, self.tree_size)
    }
}

/// Replace newlines with the two-character sequence `\n`
pub fn escape_record(text: &str) -> String {
    text.replace('\n', "\\n")
}

/// Inverse of [`escape_record`]
pub fn unescape_record(record: &str) -> String {
    record.replace("\\n", "\n")
}

fn parse_tree_size(raw: &str) -> Result<u64, CheckpointError> {
    let canonical = !raw.is_empty()
        && raw.bytes().all(|b| b.is_ascii_digit())
        && (raw == "0" || !raw.starts_with('0'));
    if !canonical {
        return Err(CheckpointError::InvalidTreeSize(raw.to_string()));
    }
    raw.parse::<u64>()
        .map_err(|_| CheckpointError::InvalidTreeSize(raw.to_string()))
}
