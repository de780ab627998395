use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{Charge, MethodFamily};

/// A charge as presented to the payer: the charge itself plus the raw QR
/// payloads, keyed by rail (`pix` or `crypto`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    #[serde(flatten)]
    pub charge: Charge,
    pub qr_codes: BTreeMap<String, String>,
}

impl From<Charge> for Invoice {
    fn from(charge: Charge) -> Self {
        let mut qr_codes = BTreeMap::new();
        let payload = charge
            .instructions
            .as_ref()
            .and_then(|i| i.qr_payload.clone());
        if let Some(payload) = payload {
            match charge.payment_method.family() {
                MethodFamily::InstantTransfer => {
                    qr_codes.insert("pix".to_string(), payload);
                }
                MethodFamily::Crypto => {
                    qr_codes.insert("crypto".to_string(), payload);
                }
                MethodFamily::Card | MethodFamily::BankSlip => {}
            }
        }
        Self { charge, qr_codes }
    }
}
