//! PKCE (Proof Key for Code Exchange) helpers.
//!
//! The adapter never generates or enforces PKCE itself. Callers that want it
//! derive a challenge here and inject it through
//! [`AuthentikConfig::with_pkce_challenge`](crate::config::AuthentikConfig::with_pkce_challenge).

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};

/// Compute `BASE64URL(SHA256(code_verifier))` per RFC 7636.
#[must_use]
pub fn s256_challenge(code_verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(code_verifier.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_s256_rfc_vector() {
        // RFC 7636 Appendix B test vector
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        assert_eq!(s256_challenge(verifier), "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
    }
}
