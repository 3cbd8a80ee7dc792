use hmac::{Hmac, Mac};
use sha2::Sha512;

type HmacSha512 = Hmac<Sha512>;

/// Paystack signs webhook bodies with HMAC-SHA512 under the account's secret key
/// and sends the hex digest in `x-paystack-signature`.
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha512::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Hex signature for `body`, as Paystack would send it.
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = match HmacSha512::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_round_trip() {
        let body = br#"{"event":"charge.success"}"#;
        let signature = sign("sk_test", body);
        assert_eq!(signature.len(), 128);
        assert!(verify_signature("sk_test", body, &signature));
    }

    #[test]
    fn test_signature_rejects_tampering() {
        let signature = sign("sk_test", b"{\"amount\":100}");
        assert!(!verify_signature("sk_test", b"{\"amount\":900}", &signature));
        assert!(!verify_signature("sk_other", b"{\"amount\":100}", &signature));
        assert!(!verify_signature("sk_test", b"{\"amount\":100}", "not-hex"));
    }
}
