//! Verification material extracted from log entries
//!
//! Each entry body names the certificate or key that signed the
//! artifact. This module decodes that material and derives what the
//! matcher compares: certificate subjects, issuer, extension values,
//! key subjects and fingerprints.

use super::extensions::{OID_FULCIO_ISSUER_V1, OID_FULCIO_ISSUER_V2};
use crate::client::RawLogEntry;
use crate::error::{MonitorError, Result};
use base64::engine::general_purpose::{STANDARD as BASE64, STANDARD_NO_PAD as BASE64_NO_PAD};
use base64::Engine;
use serde_json::Value;
use sha2::{Digest, Sha256};
use x509_parser::extensions::GeneralName;
use x509_parser::pem::Pem;
use x509_parser::prelude::{FromDer, X509Certificate};
use x509_parser::x509::SubjectPublicKeyInfo;

const ED25519_SPKI_PREFIX: [u8; 12] = [
    0x30, 0x2a, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70, 0x03, 0x21, 0x00,
];

/// A signing certificate found in an entry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertificateMaterial {
    /// SAN emails, URIs and DNS names
    pub subjects: Vec<String>,
    /// OIDC issuer from the Fulcio issuer extension
    pub issuer: Option<String>,
    /// Hex SHA-256 of the certificate DER
    pub fingerprint: String,
    /// `(dot-notation OID, decoded value)` for every extension
    pub extensions: Vec<(String, String)>,
}

/// A bare signing key found in an entry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyMaterial {
    /// Ecosystem-specific fingerprints (PGP lists primary key and subkeys)
    pub fingerprints: Vec<String>,
    /// Subjects bound to the key (PGP user-ID emails)
    pub subjects: Vec<String>,
}

/// Everything the matcher needs from one entry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryMaterial {
    pub uuid: String,
    pub index: u64,
    pub certificates: Vec<CertificateMaterial>,
    pub keys: Vec<KeyMaterial>,
}

/// Encoding of a verifier carried in an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VerifierFormat {
    X509,
    Ssh,
    Pgp,
    Minisign,
}

impl EntryMaterial {
    /// Decode an entry body and extract its verification material
    pub fn extract(entry: &RawLogEntry) -> Result<Self> {
        let body = BASE64
            .decode(entry.body.trim())
            .map_err(|e| MonitorError::Api(format!("entry {} body: {}", entry.uuid, e)))?;
        let body: Value = serde_json::from_slice(&body)?;

        let mut material = Self {
            uuid: entry.uuid.clone(),
            index: entry.log_index,
            ..Default::default()
        };

        for (format, encoded) in verifiers(&body) {
            let raw = match BASE64.decode(encoded.trim()) {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::debug!(uuid = %entry.uuid, error = %e, "Skipping undecodable verifier");
                    continue;
                }
            };
            match format {
                VerifierFormat::X509 => material.add_x509(&raw),
                VerifierFormat::Ssh => material.keys.extend(ssh_key(&raw)),
                VerifierFormat::Pgp => material.keys.extend(pgp_key(&raw)),
                VerifierFormat::Minisign => material.keys.extend(minisign_key(&raw)),
            }
        }

        Ok(material)
    }

    fn add_x509(&mut self, raw: &[u8]) {
        if raw.starts_with(b"-----BEGIN") {
            for pem in Pem::iter_from_buffer(raw).flatten() {
                match pem.label.as_str() {
                    "CERTIFICATE" => self.certificates.extend(certificate(&pem.contents)),
                    "PUBLIC KEY" => self.keys.extend(pkix_key(&pem.contents)),
                    _ => {}
                }
            }
        } else if let Some(cert) = certificate(raw) {
            self.certificates.push(cert);
        } else {
            self.keys.extend(pkix_key(raw));
        }
    }
}

/// Locate the base64 verifiers in an entry body by kind
fn verifiers(body: &Value) -> Vec<(VerifierFormat, &str)> {
    let kind = body.get("kind").and_then(Value::as_str).unwrap_or_default();
    let spec = match body.get("spec") {
        Some(spec) => spec,
        None => return Vec::new(),
    };
    let str_at = |pointer: &str| spec.pointer(pointer).and_then(Value::as_str);

    let mut found = Vec::new();
    match kind {
        "hashedrekord" | "jar" => {
            found.extend(str_at("/signature/publicKey/content").map(|c| (VerifierFormat::X509, c)));
        }
        "rekord" => {
            let format = match str_at("/signature/format").unwrap_or("x509") {
                "ssh" => VerifierFormat::Ssh,
                "pgp" => VerifierFormat::Pgp,
                "minisign" => VerifierFormat::Minisign,
                _ => VerifierFormat::X509,
            };
            found.extend(str_at("/signature/publicKey/content").map(|c| (format, c)));
        }
        "dsse" => {
            for sig in spec
                .get("signatures")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
            {
                found.extend(sig.get("verifier").and_then(Value::as_str).map(|c| (VerifierFormat::X509, c)));
            }
        }
        "intoto" => {
            found.extend(str_at("/publicKey").map(|c| (VerifierFormat::X509, c)));
            for sig in spec
                .pointer("/content/envelope/signatures")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
            {
                found.extend(sig.get("publicKey").and_then(Value::as_str).map(|c| (VerifierFormat::X509, c)));
            }
        }
        "cose" => {
            found.extend(str_at("/publicKey").map(|c| (VerifierFormat::X509, c)));
        }
        "alpine" => {
            found.extend(str_at("/publicKey/content").map(|c| (VerifierFormat::X509, c)));
        }
        "rpm" | "helm" => {
            found.extend(str_at("/publicKey/content").map(|c| (VerifierFormat::Pgp, c)));
        }
        other => {
            tracing::debug!(kind = other, "Entry kind carries no monitored verifier");
        }
    }
    found
}

fn hex_sha256(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn certificate(der: &[u8]) -> Option<CertificateMaterial> {
    let (_, cert) = X509Certificate::from_der(der).ok()?;

    let mut subjects = Vec::new();
    if let Ok(Some(san)) = cert.subject_alternative_name() {
        for name in &san.value.general_names {
            match name {
                GeneralName::RFC822Name(s) | GeneralName::URI(s) | GeneralName::DNSName(s) => {
                    subjects.push(s.to_string())
                }
                _ => {}
            }
        }
    }

    let extensions: Vec<(String, String)> = cert
        .extensions()
        .iter()
        .map(|ext| {
            let oid = ext.oid.to_id_string();
            let value = decode_extension_value(&oid, ext.value);
            (oid, value)
        })
        .collect();

    let issuer = [OID_FULCIO_ISSUER_V2, OID_FULCIO_ISSUER_V1]
        .iter()
        .find_map(|wanted| {
            extensions
                .iter()
                .find(|(oid, _)| oid == wanted)
                .map(|(_, value)| value.clone())
        });

    Some(CertificateMaterial {
        subjects,
        issuer,
        fingerprint: hex_sha256(der),
        extensions,
    })
}

/// Decode an extension value to text
///
/// Fulcio's early OIDs (`…57264.1.1` to `…1.6`) hold raw strings, later
/// ones a DER UTF8String. Anything else falls back to UTF-8, then hex.
pub fn decode_extension_value(oid: &str, value: &[u8]) -> String {
    let raw_string_oid = oid
        .strip_prefix("1.3.6.1.4.1.57264.1.")
        .and_then(|arc| arc.parse::<u32>().ok())
        .is_some_and(|arc| (1..=6).contains(&arc));

    if !raw_string_oid {
        if let Some(inner) = der_utf8_string(value) {
            return inner;
        }
    }
    match std::str::from_utf8(value) {
        Ok(s) => s.to_string(),
        Err(_) => hex::encode(value),
    }
}

fn der_utf8_string(value: &[u8]) -> Option<String> {
    let (&tag, rest) = value.split_first()?;
    if tag != 0x0c {
        return None;
    }
    let (&first, rest) = rest.split_first()?;
    let (len, content) = if first < 0x80 {
        (first as usize, rest)
    } else {
        let n = (first & 0x7f) as usize;
        if n == 0 || n > 4 || rest.len() < n {
            return None;
        }
        let len = rest[..n].iter().fold(0usize, |acc, b| (acc << 8) | *b as usize);
        (len, &rest[n..])
    };
    if content.len() != len {
        return None;
    }
    String::from_utf8(content.to_vec()).ok()
}

fn pkix_key(der: &[u8]) -> Option<KeyMaterial> {
    SubjectPublicKeyInfo::from_der(der).ok()?;
    Some(KeyMaterial {
        fingerprints: vec![hex_sha256(der)],
        subjects: Vec::new(),
    })
}

fn ssh_key(raw: &[u8]) -> Option<KeyMaterial> {
    let text = std::str::from_utf8(raw).ok()?;
    let blob = text.split_whitespace().nth(1)?;
    let blob = BASE64.decode(blob).ok()?;
    Some(KeyMaterial {
        fingerprints: vec![BASE64_NO_PAD.encode(Sha256::digest(&blob))],
        subjects: Vec::new(),
    })
}

fn minisign_key(raw: &[u8]) -> Option<KeyMaterial> {
    let text = std::str::from_utf8(raw).ok()?;
    let line = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with("untrusted comment:"))
        .last()?;
    let decoded = BASE64.decode(line).ok()?;
    if decoded.len() != 42 || &decoded[..2] != b"Ed" {
        return None;
    }
    let mut spki = ED25519_SPKI_PREFIX.to_vec();
    spki.extend_from_slice(&decoded[10..]);
    Some(KeyMaterial {
        fingerprints: vec![hex_sha256(&spki)],
        subjects: Vec::new(),
    })
}

fn pgp_key(raw: &[u8]) -> Option<KeyMaterial> {
    let binary = if raw.starts_with(b"-----BEGIN PGP") {
        dearmor(std::str::from_utf8(raw).ok()?)?
    } else {
        raw.to_vec()
    };

    let mut key = KeyMaterial::default();
    for (tag, body) in pgp_packets(&binary) {
        match tag {
            // public key and public subkey
            6 | 14 if body.first() == Some(&4) => {
                let mut ctx = ring::digest::Context::new(&ring::digest::SHA1_FOR_LEGACY_USE_ONLY);
                ctx.update(&[0x99]);
                ctx.update(&(body.len() as u16).to_be_bytes());
                ctx.update(body);
                key.fingerprints.push(hex::encode(ctx.finish()));
            }
            // user ID
            13 => {
                if let Ok(uid) = std::str::from_utf8(body) {
                    key.subjects.push(uid_subject(uid));
                }
            }
            _ => {}
        }
    }

    (!key.fingerprints.is_empty()).then_some(key)
}

fn uid_subject(uid: &str) -> String {
    match (uid.rfind('<'), uid.rfind('>')) {
        (Some(open), Some(close)) if open < close => uid[open + 1..close].to_string(),
        _ => uid.trim().to_string(),
    }
}

fn dearmor(text: &str) -> Option<Vec<u8>> {
    let mut lines = text.lines().skip_while(|l| !l.starts_with("-----BEGIN PGP"));
    lines.next()?;
    let mut in_body = false;
    let mut encoded = String::new();
    for line in lines {
        let line = line.trim();
        if line.starts_with("-----END") {
            break;
        }
        if !in_body {
            if line.is_empty() {
                in_body = true;
            }
            continue;
        }
        if line.starts_with('=') {
            break;
        }
        encoded.push_str(line);
    }
    BASE64.decode(encoded).ok()
}

/// Split an OpenPGP packet stream into `(tag, body)` pairs
fn pgp_packets(data: &[u8]) -> Vec<(u8, &[u8])> {
    let mut packets = Vec::new();
    let mut pos = 0;

    while pos < data.len() {
        let header = data[pos];
        if header & 0x80 == 0 {
            break;
        }
        pos += 1;

        let (tag, len) = if header & 0x40 != 0 {
            let tag = header & 0x3f;
            let Some(&first) = data.get(pos) else { break };
            match first {
                0..=191 => {
                    pos += 1;
                    (tag, first as usize)
                }
                192..=223 => {
                    let Some(&second) = data.get(pos + 1) else { break };
                    pos += 2;
                    (tag, ((first as usize - 192) << 8) + second as usize + 192)
                }
                255 => {
                    let Some(bytes) = data.get(pos + 1..pos + 5) else { break };
                    pos += 5;
                    (tag, u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize)
                }
                // partial body lengths never occur in key material
                _ => break,
            }
        } else {
            let tag = (header >> 2) & 0x0f;
            let len = match header & 0x03 {
                0 => {
                    let Some(&b) = data.get(pos) else { break };
                    pos += 1;
                    b as usize
                }
                1 => {
                    let Some(bytes) = data.get(pos..pos + 2) else { break };
                    pos += 2;
                    u16::from_be_bytes([bytes[0], bytes[1]]) as usize
                }
                2 => {
                    let Some(bytes) = data.get(pos..pos + 4) else { break };
                    pos += 4;
                    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize
                }
                _ => data.len() - pos,
            };
            (tag, len)
        };

        let Some(body) = data.get(pos..pos + len) else { break };
        packets.push((tag, body));
        pos += len;
    }

    packets
}
