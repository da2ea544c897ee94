use rand::rngs::OsRng;
use secp256k1::ecdsa::Signature;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use std::fmt;
use std::str::FromStr;

/// Length in bytes of a raw public key (`X || Y`, no SEC1 prefix)
pub const PUBLIC_KEY_LEN: usize = 64;

/// Length in bytes of an encoded private scalar
pub const PRIVATE_KEY_LEN: usize = 32;

/// SEC1 tag for an uncompressed point
const UNCOMPRESSED_TAG: u8 = 0x04;

/// Errors that can occur during cryptographic operations
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Decoding error: {0}")]
    Decode(String),

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("Failed to sign message: {0}")]
    Signing(String),
}

/// Represents a wallet address (hex encoded SHA-256 of the raw public key)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(pub String);

impl Address {
    /// Derives the address of a raw public key
    pub fn from_public_key(public_key: &[u8]) -> Self {
        Address(hex::encode(pub_key_hash(public_key)))
    }

    /// Creates an address from an owner identifier as stored in outputs
    pub fn from_pub_key_hash(hash: &[u8]) -> Self {
        Address(hex::encode(hash))
    }

    /// Decodes the address into the owner identifier stored in outputs
    pub fn to_pub_key_hash(&self) -> Result<Vec<u8>, CryptoError> {
        hex::decode(&self.0).map_err(|e| CryptoError::Decode(e.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Address {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !validate_address(s) {
            return Err(CryptoError::InvalidAddress(s.to_string()));
        }

        Ok(Address(s.to_string()))
    }
}

/// Hashes a raw public key into the owner identifier used by outputs.
pub fn pub_key_hash(public_key: &[u8]) -> Vec<u8> {
    Sha256::digest(public_key).to_vec()
}

/// Derives an address from a raw public key. Pure and deterministic.
pub fn derive_address(public_key: &[u8]) -> Address {
    Address::from_public_key(public_key)
}

/// Structural check only: non-empty and hex encoded.
///
/// No length or checksum check is made, and nothing ties the address
/// to an existing key. Any well-formed hex string is accepted.
pub fn validate_address(address: &str) -> bool {
    !address.is_empty() && hex::decode(address).is_ok()
}

/// Encodes a private key as its 32-byte big-endian scalar
pub fn encode_private_key(secret_key: &SecretKey) -> Vec<u8> {
    secret_key.secret_bytes().to_vec()
}

/// Decodes a private scalar.
///
/// Scalars shorter than 32 bytes are left padded with zeros, so keys whose
/// leading zero bytes were stripped by another encoder still round-trip.
pub fn decode_private_key(bytes: &[u8]) -> Result<SecretKey, CryptoError> {
    if bytes.is_empty() || bytes.len() > PRIVATE_KEY_LEN {
        return Err(CryptoError::Decode(format!(
            "private key must be 1 to {} bytes, got {}",
            PRIVATE_KEY_LEN,
            bytes.len()
        )));
    }

    let mut scalar = [0u8; PRIVATE_KEY_LEN];
    scalar[PRIVATE_KEY_LEN - bytes.len()..].copy_from_slice(bytes);

    SecretKey::from_slice(&scalar).map_err(|e| CryptoError::Decode(e.to_string()))
}

/// Hex wrapper around [`encode_private_key`]
pub fn private_key_to_hex(secret_key: &SecretKey) -> String {
    hex::encode(encode_private_key(secret_key))
}

/// Hex wrapper around [`decode_private_key`]
pub fn private_key_from_hex(encoded: &str) -> Result<SecretKey, CryptoError> {
    let bytes = hex::decode(encoded.trim()).map_err(|e| CryptoError::Decode(e.to_string()))?;
    decode_private_key(&bytes)
}

/// Serializes a public key as `X || Y`
pub fn raw_public_key(public_key: &PublicKey) -> Vec<u8> {
    public_key.serialize_uncompressed()[1..].to_vec()
}

/// Generates a fresh key pair
pub fn generate_keypair() -> (SecretKey, PublicKey) {
    let secp = Secp256k1::new();
    secp.generate_keypair(&mut OsRng)
}

/// Represents a wallet with a keypair
#[derive(Debug, Clone)]
pub struct Wallet {
    secret_key: SecretKey,
    public_key: PublicKey,
    address: Address,
}

impl Wallet {
    /// Creates a new wallet with a random keypair
    pub fn new() -> Self {
        let (secret_key, public_key) = generate_keypair();
        Self::from_keys(secret_key, public_key)
    }

    /// Creates a wallet from an existing private key
    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let secp = Secp256k1::signing_only();
        let public_key = PublicKey::from_secret_key(&secp, &secret_key);
        Self::from_keys(secret_key, public_key)
    }

    /// Creates a wallet from an encoded private scalar
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        decode_private_key(bytes).map(Self::from_secret_key)
    }

    fn from_keys(secret_key: SecretKey, public_key: PublicKey) -> Self {
        let address = derive_address(&raw_public_key(&public_key));

        Wallet {
            secret_key,
            public_key,
            address,
        }
    }

    /// Gets the wallet's address
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Gets the owner identifier outputs paying this wallet carry
    pub fn pub_key_hash(&self) -> Vec<u8> {
        pub_key_hash(&self.public_key_bytes())
    }

    /// Gets the wallet's raw public key
    pub fn public_key_bytes(&self) -> Vec<u8> {
        raw_public_key(&self.public_key)
    }

    pub fn secret_key(&self) -> &SecretKey {
        &self.secret_key
    }

    /// Exports the wallet's private key as bytes
    pub fn export_secret_key(&self) -> Vec<u8> {
        encode_private_key(&self.secret_key)
    }
}

impl Default for Wallet {
    fn default() -> Self {
        Self::new()
    }
}

/// Signs a 32-byte digest, returning the compact `r || s` encoding
pub fn sign_digest(secret_key: &SecretKey, digest: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let message =
        Message::from_digest_slice(digest).map_err(|e| CryptoError::Signing(e.to_string()))?;
    let secp = Secp256k1::signing_only();
    let signature = secp.sign_ecdsa(&message, secret_key);

    Ok(signature.serialize_compact().to_vec())
}

/// Verifies a compact signature over a digest against a raw public key.
///
/// Signatures and keys that do not split into two equal halves of the
/// expected size verify as false.
pub fn verify_signature(digest: &[u8], signature: &[u8], public_key: &[u8]) -> bool {
    if signature.is_empty() || signature.len() % 2 != 0 {
        return false;
    }
    if public_key.len() != PUBLIC_KEY_LEN {
        return false;
    }

    let message = match Message::from_digest_slice(digest) {
        Ok(message) => message,
        Err(_) => return false,
    };
    let signature = match Signature::from_compact(signature) {
        Ok(signature) => signature,
        Err(_) => return false,
    };

    let mut sec1 = Vec::with_capacity(PUBLIC_KEY_LEN + 1);
    sec1.push(UNCOMPRESSED_TAG);
    sec1.extend_from_slice(public_key);
    let public_key = match PublicKey::from_slice(&sec1) {
        Ok(key) => key,
        Err(_) => return false,
    };

    let secp = Secp256k1::verification_only();
    secp.verify_ecdsa(&message, &signature, &public_key).is_ok()
}
