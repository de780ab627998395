use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Chargeflow-Signature";

/// HMAC-SHA256 over `"<timestamp>.<body>"`, rendered as `t=<timestamp>,v1=<hex>`.
#[derive(Clone)]
pub struct WebhookSigner {
    secret: Vec<u8>,
}

impl WebhookSigner {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into().into_bytes(),
        }
    }

    pub fn sign(&self, payload: &str, timestamp: i64) -> String {
        format!("t={},v1={}", timestamp, hex::encode(self.mac(payload, timestamp)))
    }

    /// Checks a signature header against the payload. `tolerance_secs` bounds
    /// how old the embedded timestamp may be relative to `now`.
    pub fn verify(&self, payload: &str, header: &str, now: i64, tolerance_secs: i64) -> bool {
        let mut timestamp = None;
        let mut signature = None;
        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", v)) => timestamp = v.parse::<i64>().ok(),
                Some(("v1", v)) => signature = hex::decode(v).ok(),
                _ => {}
            }
        }

        let (Some(timestamp), Some(signature)) = (timestamp, signature) else {
            return false;
        };
        if (now - timestamp).abs() > tolerance_secs {
            return false;
        }

        let expected = self.mac(payload, timestamp);
        expected.ct_eq(signature.as_slice()).into()
    }

    fn mac(&self, payload: &str, timestamp: i64) -> Vec<u8> {
        // HMAC accepts keys of any length, so this never fails.
        let mut mac = match HmacSha256::new_from_slice(&self.secret) {
            Ok(mac) => mac,
            Err(_) => return Vec::new(),
        };
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }
}
