//! Request signing and consent-token encryption for the Open Banking
//! provider.
//!
//! Every provider request carries a fresh idempotency key and a signature
//! over `client_secret;idempotency_key[;bearer_token]`. Requests made on
//! behalf of an authorized consent additionally carry the consent token,
//! AES-256-CBC encrypted under `SHA256(client_secret)`. Inbound webhooks are
//! signed the same way, so [`verify_signature`] is shared with the webhook
//! processor.

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::Rng;

use crate::hashing::{sha256_bytes, sha256_hex};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency_key";
pub const SIGNATURE_HEADER: &str = "signature";
pub const CONSENT_TOKEN_HEADER: &str = "consent_token";

/// Number of random characters appended to the idempotency key timestamp.
pub const IDEMPOTENCY_SUFFIX_LENGTH: usize = 16;

const SIGNATURE_PREFIX: &str = "SHA-256(";
const CONSENT_PREFIX: &str = "AES-256-CBC(";
const ENVELOPE_SUFFIX: &str = ")";
const IV_LENGTH: usize = 16;

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// OAuth client credentials issued by the provider.
///
/// Passed explicitly to whatever needs to sign or verify; there is no
/// process-global secret.
#[derive(Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
}

impl Credentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// `Basic base64(client_id:client_secret)` for OAuth endpoints.
    pub fn basic_authorization(&self) -> String {
        let raw = format!("{}:{}", self.client_id, self.client_secret);
        format!("Basic {}", BASE64.encode(raw))
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Idempotency keys and signatures
// ---------------------------------------------------------------------------

/// Generate a unique idempotency key: millisecond timestamp prefix plus a
/// random alphanumeric suffix.
pub fn generate_idempotency_key() -> String {
    let suffix: String = rand::rng()
        .sample_iter(&rand::distr::Alphanumeric)
        .take(IDEMPOTENCY_SUFFIX_LENGTH)
        .map(char::from)
        .collect();
    format!("{}-{suffix}", chrono::Utc::now().timestamp_millis())
}

/// Compute the enveloped signature `SHA-256(<hex digest>)`.
///
/// `None` leaves the token segment out; `Some("")` signs an empty segment,
/// so the material ends in `;`.
pub fn compute_signature(
    client_secret: &str,
    idempotency_key: &str,
    bearer_token: Option<&str>,
) -> String {
    let mut material = format!("{client_secret};{idempotency_key}");
    if let Some(token) = bearer_token {
        material.push(';');
        material.push_str(token);
    }
    format!("{SIGNATURE_PREFIX}{}{ENVELOPE_SUFFIX}", sha256_hex(material.as_bytes()))
}

/// Recompute the signature and compare it to `provided` in constant time.
pub fn verify_signature(
    client_secret: &str,
    idempotency_key: &str,
    bearer_token: Option<&str>,
    provided: &str,
) -> bool {
    let expected = compute_signature(client_secret, idempotency_key, bearer_token);
    constant_time_eq(expected.as_bytes(), provided.as_bytes())
}

/// Length-leaking but otherwise branch-free comparison; `subtle` is not
/// part of the dependency set for a single call site.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

// ---------------------------------------------------------------------------
// Consent token cipher
// ---------------------------------------------------------------------------

/// AES-256-CBC cipher for consent tokens, keyed by `SHA256(client_secret)`.
#[derive(Clone)]
pub struct ConsentCipher {
    key: [u8; 32],
}

impl ConsentCipher {
    pub fn new(client_secret: &str) -> Self {
        Self {
            key: sha256_bytes(client_secret.as_bytes()),
        }
    }

    /// Encrypt a consent token into its `AES-256-CBC(<base64>)` envelope.
    ///
    /// A random IV is generated per call and prepended to the ciphertext.
    pub fn encrypt(&self, consent_token: &str) -> String {
        let mut iv = [0u8; IV_LENGTH];
        rand::rng().fill(&mut iv);

        let ciphertext = Aes256CbcEnc::new(&self.key.into(), &iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(consent_token.as_bytes());

        let mut payload = Vec::with_capacity(IV_LENGTH + ciphertext.len());
        payload.extend_from_slice(&iv);
        payload.extend_from_slice(&ciphertext);

        format!("{CONSENT_PREFIX}{}{ENVELOPE_SUFFIX}", BASE64.encode(payload))
    }

    /// Reverse [`encrypt`](Self::encrypt).
    ///
    /// The envelope is optional on input. Any failure (bad base64, short
    /// payload, wrong key, bad padding, non-UTF-8 plaintext) yields `None`
    /// and a warning; callers continue without a consent token.
    pub fn decrypt(&self, encrypted: &str) -> Option<String> {
        match self.try_decrypt(encrypted) {
            Ok(token) => Some(token),
            Err(reason) => {
                tracing::warn!(reason, "Failed to decrypt consent token");
                None
            }
        }
    }

    fn try_decrypt(&self, encrypted: &str) -> Result<String, &'static str> {
        let inner = encrypted.trim();
        let inner = inner.strip_prefix(CONSENT_PREFIX).unwrap_or(inner);
        let inner = inner.strip_suffix(ENVELOPE_SUFFIX).unwrap_or(inner);

        let bytes = BASE64.decode(inner).map_err(|_| "invalid base64")?;
        if bytes.len() <= IV_LENGTH {
            return Err("payload shorter than IV");
        }
        let (iv, ciphertext) = bytes.split_at(IV_LENGTH);

        let decryptor =
            Aes256CbcDec::new_from_slices(&self.key, iv).map_err(|_| "invalid key or IV length")?;
        let plaintext = decryptor
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| "decryption failed")?;

        String::from_utf8(plaintext).map_err(|_| "plaintext is not UTF-8")
    }
}

// ---------------------------------------------------------------------------
// SignedRequestBuilder
// ---------------------------------------------------------------------------

/// Which `Authorization` scheme a request uses.
#[derive(Debug, Clone, Copy)]
pub enum AuthScheme<'a> {
    /// Client credentials, for `/oauth2/*` endpoints.
    Basic,
    /// A connection's access token, for resource endpoints.
    Bearer(&'a str),
}

/// The authentication headers for one outgoing request.
#[derive(Debug, Clone)]
pub struct SignedHeaders {
    pub authorization: String,
    pub idempotency_key: String,
    pub signature: String,
    pub consent_token: Option<String>,
}

impl SignedHeaders {
    /// Header name/value pairs, `Authorization` first.
    pub fn pairs(&self) -> Vec<(&'static str, &str)> {
        let mut pairs = vec![
            ("Authorization", self.authorization.as_str()),
            (IDEMPOTENCY_KEY_HEADER, self.idempotency_key.as_str()),
            (SIGNATURE_HEADER, self.signature.as_str()),
        ];
        if let Some(consent) = &self.consent_token {
            pairs.push((CONSENT_TOKEN_HEADER, consent.as_str()));
        }
        pairs
    }
}

/// Produces [`SignedHeaders`] for provider requests.
pub struct SignedRequestBuilder {
    credentials: Credentials,
    consent_cipher: ConsentCipher,
}

impl SignedRequestBuilder {
    pub fn new(credentials: Credentials) -> Self {
        let consent_cipher = ConsentCipher::new(&credentials.client_secret);
        Self {
            credentials,
            consent_cipher,
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn consent_cipher(&self) -> &ConsentCipher {
        &self.consent_cipher
    }

    /// Build headers with a fresh idempotency key.
    pub fn sign(&self, auth: AuthScheme<'_>, consent_token: Option<&str>) -> SignedHeaders {
        let idempotency_key = generate_idempotency_key();
        let (authorization, bearer) = match auth {
            AuthScheme::Basic => (self.credentials.basic_authorization(), None),
            AuthScheme::Bearer(token) => (format!("Bearer {token}"), Some(token)),
        };
        let signature = compute_signature(&self.credentials.client_secret, &idempotency_key, bearer);
        let consent_token = consent_token
            .filter(|c| !c.is_empty())
            .map(|c| self.consent_cipher.encrypt(c));

        SignedHeaders {
            authorization,
            idempotency_key,
            signature,
            consent_token,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
