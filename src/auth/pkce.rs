/// PKCE (Proof Key for Code Exchange) Implementation
///
/// Implements RFC 7636 - Proof Key for Code Exchange by OAuth Public Clients.
/// Also generates the `state` and `nonce` values sent with each login request.
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};

/// Random bytes behind a code_verifier (86 characters once encoded)
const VERIFIER_BYTES: usize = 64;

/// Random bytes behind `state` and `nonce` (32 characters once encoded)
const TOKEN_BYTES: usize = 24;

/// Generate a cryptographically random code_verifier
///
/// Per RFC 7636: code_verifier = high-entropy cryptographic random STRING using the
/// unreserved characters [A-Z] / [a-z] / [0-9] / "-" / "." / "_" / "~"
/// with a minimum length of 43 characters and a maximum length of 128 characters.
pub fn generate_code_verifier() -> String {
    let bytes: [u8; VERIFIER_BYTES] = rand::random();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Calculate code_challenge from code_verifier using S256 method
///
/// Per RFC 7636: code_challenge = BASE64URL(SHA256(ASCII(code_verifier)))
pub fn generate_code_challenge(code_verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code_verifier.as_bytes());
    let hash = hasher.finalize();
    URL_SAFE_NO_PAD.encode(hash)
}

/// CSRF `state` for the authorization request
pub fn generate_state() -> String {
    random_url_token()
}

/// OIDC `nonce` bound into the ID token
pub fn generate_nonce() -> String {
    random_url_token()
}

fn random_url_token() -> String {
    let bytes: [u8; TOKEN_BYTES] = rand::random();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// PKCE pair containing both verifier and challenge
#[derive(Debug, Clone)]
pub struct PkcePair {
    /// The code verifier (keep secret, send to token endpoint)
    pub code_verifier: String,

    /// The code challenge (send to authorization endpoint)
    pub code_challenge: String,
}

impl PkcePair {
    /// Generate a new PKCE verifier/challenge pair
    pub fn generate() -> Self {
        let code_verifier = generate_code_verifier();
        let code_challenge = generate_code_challenge(&code_verifier);

        Self {
            code_verifier,
            code_challenge,
        }
    }
}
