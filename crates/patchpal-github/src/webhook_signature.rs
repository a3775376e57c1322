use anyhow::{anyhow, bail, Context, Result};
use hmac::{Hmac, Mac};
use sha2::Sha256;

pub const GITHUB_SIGNATURE_HEADER: &str = "x-hub-signature-256";
pub const GITHUB_EVENT_HEADER: &str = "x-github-event";
pub const GITHUB_DELIVERY_HEADER: &str = "x-github-delivery";

/// Verify an `X-Hub-Signature-256` header (`sha256=<hex>`) against `payload`.
pub fn verify_github_sha256_signature(
    payload: &[u8],
    signature: &str,
    secret: &[u8],
) -> Result<()> {
    let Some(digest_hex) = signature.trim().strip_prefix("sha256=") else {
        bail!("github webhook signature must use sha256=<hex> format");
    };
    let signature_bytes = decode_hex(digest_hex)?;
    let mut mac = Hmac::<Sha256>::new_from_slice(secret)
        .context("failed to initialize webhook HMAC verifier")?;
    mac.update(payload);
    mac.verify_slice(&signature_bytes)
        .map_err(|_| anyhow!("webhook signature verification failed"))
}

fn decode_hex(value: &str) -> Result<Vec<u8>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        bail!("signature digest cannot be empty");
    }
    if trimmed.len() % 2 != 0 {
        bail!("signature digest must have an even number of hex characters");
    }

    let raw = trimmed.as_bytes();
    let mut bytes = Vec::with_capacity(raw.len() / 2);
    for pair in raw.chunks(2) {
        let hex = std::str::from_utf8(pair).context("invalid utf-8 in digest")?;
        let byte = u8::from_str_radix(hex, 16)
            .with_context(|| format!("invalid hex byte '{hex}' in signature digest"))?;
        bytes.push(byte);
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    use super::verify_github_sha256_signature;

    fn sign(payload: &[u8], secret: &[u8]) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret).expect("mac");
        mac.update(payload);
        let digest = mac.finalize().into_bytes();
        let hex = digest
            .iter()
            .map(|byte| format!("{byte:02x}"))
            .collect::<String>();
        format!("sha256={hex}")
    }

    #[test]
    fn functional_verify_accepts_matching_signature() {
        let payload = br#"{"action":"opened"}"#;
        let header = sign(payload, b"secret");
        verify_github_sha256_signature(payload, &header, b"secret").expect("valid signature");
    }

    #[test]
    fn regression_verify_rejects_wrong_secret_and_tampered_payload() {
        let payload = br#"{"action":"opened"}"#;
        let header = sign(payload, b"secret");
        assert!(verify_github_sha256_signature(payload, &header, b"other").is_err());
        assert!(verify_github_sha256_signature(b"{}", &header, b"secret").is_err());
    }

    #[test]
    fn unit_verify_rejects_malformed_headers() {
        assert!(verify_github_sha256_signature(b"x", "sha1=abcd", b"secret").is_err());
        assert!(verify_github_sha256_signature(b"x", "sha256=", b"secret").is_err());
        assert!(verify_github_sha256_signature(b"x", "sha256=abc", b"secret").is_err());
        assert!(verify_github_sha256_signature(b"x", "sha256=zz", b"secret").is_err());
    }
}
