//! Trigger tokens
//!
//! Trigger endpoints accept a JWT signed with HMAC-SHA256 (`HS256`) using the
//! shared secret from the server configuration. Only the signature and the
//! token structure are checked: tokens carry no expiry and stay valid for as
//! long as the secret does.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// The only signing algorithm accepted.
pub const ALGORITHM: &str = "HS256";

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid signing secret")]
    InvalidSecret,

    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("unsupported signing algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("invalid token signature")]
    InvalidSignature,
}

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    typ: Option<String>,
}

/// Signs and verifies trigger tokens with a shared secret
#[derive(Clone)]
pub struct TokenSigner {
    mac: HmacSha256,
}

impl TokenSigner {
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, TokenError> {
        let mac =
            HmacSha256::new_from_slice(secret.as_ref()).map_err(|_| TokenError::InvalidSecret)?;
        Ok(Self { mac })
    }

    /// Produces a token with an empty claim set
    pub fn sign(&self) -> Result<String, TokenError> {
        self.sign_claims(&serde_json::Map::new())
    }

    /// Produces a token carrying the given claims
    pub fn sign_claims<C: Serialize>(&self, claims: &C) -> Result<String, TokenError> {
        let header = Header {
            alg: ALGORITHM.to_string(),
            typ: Some("JWT".to_string()),
        };
        let header = serde_json::to_vec(&header).map_err(|e| TokenError::Malformed(e.to_string()))?;
        let claims = serde_json::to_vec(claims).map_err(|e| TokenError::Malformed(e.to_string()))?;

        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header),
            URL_SAFE_NO_PAD.encode(claims)
        );
        let signature = self.signature(signing_input.as_bytes());

        Ok(format!(
            "{}.{}",
            signing_input,
            URL_SAFE_NO_PAD.encode(signature)
        ))
    }

    /// Checks structure, algorithm and signature of a token
    pub fn verify(&self, token: &str) -> Result<(), TokenError> {
        if token.is_empty() {
            return Err(TokenError::Malformed("empty token".to_string()));
        }

        let mut segments = token.split('.');
        let (Some(header_b64), Some(claims_b64), Some(signature_b64), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(TokenError::Malformed(
                "expected three dot-separated segments".to_string(),
            ));
        };

        let header: Header = decode_json(header_b64, "header")?;
        if header.alg != ALGORITHM {
            return Err(TokenError::UnsupportedAlgorithm(header.alg));
        }
        let _claims: serde_json::Map<String, serde_json::Value> = decode_json(claims_b64, "claims")?;

        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|e| TokenError::Malformed(format!("signature: {}", e)))?;

        let signing_input_len = header_b64.len() + 1 + claims_b64.len();
        let mut mac = self.mac.clone();
        mac.update(&token.as_bytes()[..signing_input_len]);
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::InvalidSignature)
    }

    pub fn is_valid(&self, token: &str) -> bool {
        self.verify(token).is_ok()
    }

    fn signature(&self, input: &[u8]) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(input);
        mac.finalize().into_bytes().to_vec()
    }
}

/// Verifies `token` against `secret`
pub fn verify(token: &str, secret: &str) -> bool {
    TokenSigner::new(secret)
        .map(|signer| signer.is_valid(token))
        .unwrap_or(false)
}

fn decode_json<T: for<'de> Deserialize<'de>>(segment: &str, what: &str) -> Result<T, TokenError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| TokenError::Malformed(format!("{}: {}", what, e)))?;
    serde_json::from_slice(&bytes).map_err(|e| TokenError::Malformed(format!("{}: {}", what, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "correct horse battery staple";

    #[test]
    fn test_signed_token_verifies() {
        let signer = TokenSigner::new(SECRET).unwrap();
        let token = signer.sign().unwrap();

        assert_eq!(token.split('.').count(), 3);
        assert!(signer.verify(&token).is_ok());
        assert!(verify(&token, SECRET));
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let token = TokenSigner::new("other secret").unwrap().sign().unwrap();

        assert!(matches!(
            TokenSigner::new(SECRET).unwrap().verify(&token),
            Err(TokenError::InvalidSignature)
        ));
        assert!(!verify(&token, SECRET));
    }

    #[test]
    fn test_any_single_byte_change_invalidates_token() {
        let token = TokenSigner::new(SECRET).unwrap().sign().unwrap();

        for idx in 0..token.len() {
            let mut bytes = token.clone().into_bytes();
            bytes[idx] = if bytes[idx] == b'A' { b'B' } else { b'A' };
            let tampered = String::from_utf8(bytes).unwrap();

            assert!(
                !verify(&tampered, SECRET),
                "tampering byte {} was not detected",
                idx
            );
        }
    }

    #[test]
    fn test_malformed_tokens_are_rejected() {
        let signer = TokenSigner::new(SECRET).unwrap();

        for token in ["", "abc", "a.b", "a.b.c.d", "!!.??.##"] {
            assert!(
                matches!(signer.verify(token), Err(TokenError::Malformed(_))),
                "expected {:?} to be malformed",
                token
            );
        }
    }

    #[test]
    fn test_other_algorithms_are_rejected() {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let claims = URL_SAFE_NO_PAD.encode(b"{}");
        let token = format!("{}.{}.", header, claims);

        assert!(matches!(
            TokenSigner::new(SECRET).unwrap().verify(&token),
            Err(TokenError::UnsupportedAlgorithm(alg)) if alg == "none"
        ));
    }

    #[test]
    fn test_claims_do_not_expire() {
        let signer = TokenSigner::new(SECRET).unwrap();
        let token = signer
            .sign_claims(&serde_json::json!({ "exp": 1, "sub": "ci" }))
            .unwrap();

        assert!(signer.is_valid(&token));
    }

    #[test]
    fn test_large_claim_sets_verify() {
        let signer = TokenSigner::new(SECRET).unwrap();
        let token = signer
            .sign_claims(&serde_json::json!({ "sub": "x".repeat(4000) }))
            .unwrap();

        assert!(token.len() > 4096);
        assert!(signer.is_valid(&token));
        assert!(verify(&token, SECRET));
    }
}
