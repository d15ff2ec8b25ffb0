//! # RH Signing
//!
//! Turns an eQ claim set into the opaque token carried on the launch redirect.
//!
//! The claims are signed as an RS256 JWT with this service's private key, and the signed token
//! is then encrypted as a compact JWE (`RSA-OAEP` key wrapping, `A256GCM` content) with eQ's
//! public key. Only eQ can read the claims; only this service can have issued them.
//!
//! Key material is supplied as a JSON key store (`JSON_SECRET_KEYS`):
//!
//! ```json
//! { "keys": {
//!     "<kid>": { "purpose": "authentication", "type": "private", "value": "<PEM>" },
//!     "<kid>": { "purpose": "authentication", "type": "public", "value": "<PEM>" }
//! } }
//! ```
//!
//! The store is validated once at startup. A store missing either `authentication` key, or
//! with a PEM that does not parse, is a startup failure rather than a per-request error.

use std::collections::BTreeMap;

use josekit::jwe::{self, alg::rsaes::RsaesJweEncrypter, JweHeader, RSA_OAEP};
use josekit::JoseError;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Purpose tag of the keys used for launch tokens.
pub const AUTHENTICATION_PURPOSE: &str = "authentication";

/// Content encryption algorithm of the launch token.
pub const CONTENT_ENCRYPTION: &str = "A256GCM";

const PRIVATE_KEY: &str = "private";
const PUBLIC_KEY: &str = "public";

/// Errors that can occur while loading keys or producing tokens.
#[derive(Error, Debug)]
pub enum SigningError {
    #[error("failed to parse key store: {0}")]
    KeyStoreParse(serde_json::Error),
    #[error("no {key_type} key with purpose '{purpose}' in key store")]
    MissingKey {
        purpose: String,
        key_type: &'static str,
    },
    #[error("invalid signing key '{kid}': {source}")]
    InvalidKey {
        kid: String,
        #[source]
        source: jsonwebtoken::errors::Error,
    },
    #[error("invalid encryption key '{kid}': {source}")]
    InvalidEncryptionKey {
        kid: String,
        #[source]
        source: JoseError,
    },
    #[error("failed to encode token: {0}")]
    Encode(jsonwebtoken::errors::Error),
    #[error("failed to encrypt token: {0}")]
    Encrypt(JoseError),
}

pub type SigningResult<T> = std::result::Result<T, SigningError>;

/// Anything that can turn a claim set into a launch token.
pub trait ClaimSigner: Send + Sync {
    /// Produces the token for `claims`.
    ///
    /// # Errors
    ///
    /// Returns a [`SigningError`] if the claims cannot be serialised, signed or encrypted.
    fn sign(&self, claims: &Map<String, Value>) -> SigningResult<String>;
}

#[derive(Deserialize)]
struct KeyFile {
    keys: BTreeMap<String, KeyEntry>,
}

#[derive(Deserialize)]
struct KeyEntry {
    purpose: String,
    #[serde(rename = "type")]
    key_type: String,
    value: String,
}

impl KeyFile {
    /// First key (ordered by key id) with the given purpose and type.
    fn find(&self, purpose: &str, key_type: &'static str) -> SigningResult<(&str, &str)> {
        self.keys
            .iter()
            .find(|(_, entry)| entry.purpose == purpose && entry.key_type == key_type)
            .map(|(kid, entry)| (kid.as_str(), entry.value.as_str()))
            .ok_or_else(|| SigningError::MissingKey {
                purpose: purpose.into(),
                key_type,
            })
    }
}

/// RS256 JWT signer.
pub struct JwtSigner {
    kid: String,
    key: EncodingKey,
}

impl std::fmt::Debug for JwtSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtSigner").field("kid", &self.kid).finish()
    }
}

impl JwtSigner {
    /// Creates a signer from a PEM encoded RSA private key.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError::InvalidKey`] if the PEM is not a usable RSA private key.
    pub fn from_rsa_pem(kid: impl Into<String>, pem: &str) -> SigningResult<Self> {
        let kid = kid.into();
        let key = EncodingKey::from_rsa_pem(pem.as_bytes()).map_err(|source| {
            SigningError::InvalidKey {
                kid: kid.clone(),
                source,
            }
        })?;
        Ok(Self { kid, key })
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Signs `claims` as a compact JWS with this signer's `kid` in the header.
    pub fn sign(&self, claims: &Map<String, Value>) -> SigningResult<String> {
        let header = Header {
            alg: Algorithm::RS256,
            kid: Some(self.kid.clone()),
            ..Header::default()
        };
        encode(&header, claims, &self.key).map_err(SigningError::Encode)
    }
}

/// Encrypts signed tokens for eQ.
pub struct TokenEncrypter {
    kid: String,
    encrypter: RsaesJweEncrypter,
}

impl std::fmt::Debug for TokenEncrypter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenEncrypter").field("kid", &self.kid).finish()
    }
}

impl TokenEncrypter {
    /// Creates an encrypter from eQ's PEM encoded RSA public key.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError::InvalidEncryptionKey`] if the PEM is not a usable RSA public key.
    pub fn from_rsa_pem(kid: impl Into<String>, pem: &str) -> SigningResult<Self> {
        let kid = kid.into();
        let encrypter = RSA_OAEP.encrypter_from_pem(pem.as_bytes()).map_err(|source| {
            SigningError::InvalidEncryptionKey {
                kid: kid.clone(),
                source,
            }
        })?;
        Ok(Self { kid, encrypter })
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Wraps `token` in a compact JWE addressed to this key.
    pub fn encrypt(&self, token: &str) -> SigningResult<String> {
        let mut header = JweHeader::new();
        header.set_content_encryption(CONTENT_ENCRYPTION);
        header.set_key_id(self.kid.as_str());
        jwe::serialize_compact(token.as_bytes(), &header, &self.encrypter)
            .map_err(SigningError::Encrypt)
    }
}

/// Signs launch claims with our key, then encrypts the result for eQ.
#[derive(Debug)]
pub struct LaunchTokenEncoder {
    signer: JwtSigner,
    encrypter: TokenEncrypter,
}

impl LaunchTokenEncoder {
    pub fn new(signer: JwtSigner, encrypter: TokenEncrypter) -> Self {
        Self { signer, encrypter }
    }

    /// Loads both `authentication` keys from a JSON key store.
    ///
    /// The first private and the first public key (ordered by key id) whose purpose is
    /// `authentication` are used.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - the JSON cannot be parsed,
    /// - the private or the public `authentication` key is missing, or
    /// - either key is not a valid RSA key of its type.
    pub fn from_key_store(json: &str) -> SigningResult<Self> {
        let file: KeyFile = serde_json::from_str(json).map_err(SigningError::KeyStoreParse)?;

        tracing::info!("Validating key file");

        let (signing_kid, signing_pem) = file.find(AUTHENTICATION_PURPOSE, PRIVATE_KEY)?;
        let (encryption_kid, encryption_pem) = file.find(AUTHENTICATION_PURPOSE, PUBLIC_KEY)?;

        Ok(Self::new(
            JwtSigner::from_rsa_pem(signing_kid, signing_pem)?,
            TokenEncrypter::from_rsa_pem(encryption_kid, encryption_pem)?,
        ))
    }

    pub fn signer(&self) -> &JwtSigner {
        &self.signer
    }

    pub fn encrypter(&self) -> &TokenEncrypter {
        &self.encrypter
    }
}

impl ClaimSigner for LaunchTokenEncoder {
    fn sign(&self, claims: &Map<String, Value>) -> SigningResult<String> {
        let signed = self.signer.sign(claims)?;
        self.encrypter.encrypt(&signed)
    }
}
