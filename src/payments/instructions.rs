use chrono::Duration;
use std::sync::Arc;

use super::{boleto, crypto, pix::PixPayload, rates::RateTable};
use crate::{
    domain::{
        BankDetails, Charge, CryptoDetails, MethodFamily, PaymentInstructions, RailDetails,
    },
    error::{AppError, Result},
};

/// Derives payer-facing instructions from a charge. Never touches storage.
pub struct InstructionGenerator {
    table: Arc<RateTable>,
}

impl InstructionGenerator {
    pub fn new(table: Arc<RateTable>) -> Self {
        Self { table }
    }

    pub fn build(&self, charge: &Charge) -> Result<PaymentInstructions> {
        match charge.payment_method.family() {
            MethodFamily::InstantTransfer => self.instant_transfer(charge),
            MethodFamily::Card => Ok(self.card(charge)),
            MethodFamily::BankSlip => self.bank_slip(charge),
            MethodFamily::Crypto => self.crypto(charge),
        }
    }

    fn instant_transfer(&self, charge: &Charge) -> Result<PaymentInstructions> {
        let merchant = &self.table.merchant;
        let txid = charge.id.simple().to_string();
        let qr = PixPayload {
            key: &merchant.pix_key,
            merchant_name: &merchant.name,
            merchant_city: &merchant.city,
            amount: charge.amount,
            description: charge.description.as_deref(),
            txid: &txid,
        }
        .encode()?;

        Ok(PaymentInstructions {
            title: "Pay with Pix".to_string(),
            steps: vec![
                "Open your bank's app and choose Pix".to_string(),
                "Scan the QR code or paste the copy-and-paste code".to_string(),
                format!(
                    "Check that the amount is {} and the recipient is {}",
                    format_money(charge.amount, &charge.currency),
                    merchant.name
                ),
                "Confirm the transfer; the payment is recognised within seconds".to_string(),
            ],
            qr_payload: Some(qr),
            payment_url: charge.payment_url.clone(),
            expires_at: Some(charge.created_at + secs(self.table.expiry.pix_secs)),
            details: Some(RailDetails::BankDetails(BankDetails {
                beneficiary: merchant.name.clone(),
                pix_key: Some(merchant.pix_key.clone()),
                digitable_line: None,
            })),
        })
    }

    fn card(&self, charge: &Charge) -> PaymentInstructions {
        PaymentInstructions {
            title: "Pay by card".to_string(),
            steps: vec![
                "Open the payment link".to_string(),
                "Enter the card number, expiry date and security code".to_string(),
                format!(
                    "Authorise the charge of {}",
                    format_money(charge.amount, &charge.currency)
                ),
                "Keep the page open until the confirmation appears".to_string(),
            ],
            qr_payload: None,
            payment_url: charge.payment_url.clone(),
            expires_at: Some(charge.created_at + secs(self.table.expiry.card_secs)),
            details: None,
        }
    }

    fn bank_slip(&self, charge: &Charge) -> Result<PaymentInstructions> {
        let due = charge.created_at + secs(self.table.expiry.boleto_secs);
        let line = boleto::digitable_line(charge.id, charge.amount, due)?;
        Ok(PaymentInstructions {
            title: "Pay with boleto".to_string(),
            steps: vec![
                "Open the payment link to view or print the slip".to_string(),
                "Pay it at any bank, lottery outlet or banking app using the barcode".to_string(),
                format!("Pay before {}", due.format("%Y-%m-%d")),
                "Clearing takes up to 3 business days".to_string(),
            ],
            qr_payload: None,
            payment_url: charge.payment_url.clone(),
            expires_at: Some(due),
            details: Some(RailDetails::BankDetails(BankDetails {
                beneficiary: self.table.merchant.name.clone(),
                pix_key: None,
                digitable_line: Some(line),
            })),
        })
    }

    fn crypto(&self, charge: &Charge) -> Result<PaymentInstructions> {
        let asset = self.table.asset(charge.payment_method)?;
        let payment = charge.crypto.as_ref().ok_or_else(|| {
            AppError::Internal(format!("crypto charge {} has no deposit address", charge.id))
        })?;

        let label = charge
            .description
            .clone()
            .unwrap_or_else(|| format!("Charge {}", charge.id));
        let qr = crypto::payment_uri(
            asset,
            &payment.address,
            payment.amount,
            &label,
            charge.payment_url.as_deref(),
        );

        Ok(PaymentInstructions {
            title: format!("Pay with {}", asset.symbol),
            steps: vec![
                format!(
                    "Send exactly {} {} to the address below",
                    payment.amount.normalize(),
                    asset.symbol
                ),
                format!("Use the {} network only; other networks lose the funds", asset.network),
                "Scan the QR code with your wallet to pre-fill address and amount".to_string(),
                format!(
                    "The payment completes after {} network confirmation(s)",
                    payment.required_confirmations
                ),
            ],
            qr_payload: Some(qr),
            payment_url: charge.payment_url.clone(),
            expires_at: Some(charge.created_at + secs(self.table.expiry.crypto_secs)),
            details: Some(RailDetails::CryptoDetails(CryptoDetails {
                address: payment.address.clone(),
                amount: payment.amount,
                symbol: asset.symbol.clone(),
                network: asset.network.clone(),
                confirmations_needed: payment.required_confirmations,
            })),
        })
    }
}

// Capped at ten years; anything longer is a configuration mistake.
fn secs(s: u64) -> Duration {
    Duration::seconds(s.min(315_360_000) as i64)
}

pub fn format_money(minor: i64, currency: &str) -> String {
    format!("{} {}.{:02}", currency, minor / 100, (minor % 100).abs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChargeStatus, CryptoPayment, Metadata, PaymentMethod};
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn charge(method: PaymentMethod) -> Charge {
        let now = Utc::now();
        let id = Uuid::new_v4();
        Charge {
            id,
            amount: 15000,
            currency: "BRL".to_string(),
            payment_method: method,
            status: ChargeStatus::Pending,
            customer_name: "Ana".to_string(),
            customer_email: "ana@example.com".to_string(),
            description: Some("Order 9".to_string()),
            webhook_url: None,
            metadata: Metadata::new(),
            fee: 0,
            net_amount: 15000,
            refunded_amount: 0,
            crypto: None,
            invoice_id: None,
            payment_url: Some(format!("https://pay.example.com/{}", id)),
            instructions: None,
            idempotency_key: None,
            captured_at: None,
            captured_amount: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn generator() -> InstructionGenerator {
        InstructionGenerator::new(Arc::new(RateTable::default()))
    }

    #[test]
    fn pix_has_qr_and_five_minute_expiry() {
        let c = charge(PaymentMethod::Pix);
        let i = generator().build(&c).unwrap();
        assert!(i.qr_payload.as_deref().unwrap().starts_with("000201"));
        assert_eq!(i.expires_at.unwrap() - c.created_at, Duration::minutes(5));
    }

    #[test]
    fn card_uses_payment_url_without_qr() {
        let c = charge(PaymentMethod::CreditCard);
        let i = generator().build(&c).unwrap();
        assert!(i.qr_payload.is_none());
        assert_eq!(i.payment_url, c.payment_url);
        assert_eq!(i.expires_at.unwrap() - c.created_at, Duration::minutes(30));
        assert!(i.details.is_none());
    }

    #[test]
    fn boleto_expires_in_three_days() {
        let c = charge(PaymentMethod::Boleto);
        let i = generator().build(&c).unwrap();
        assert!(i.qr_payload.is_none());
        assert_eq!(i.expires_at.unwrap() - c.created_at, Duration::days(3));
        match i.details {
            Some(RailDetails::BankDetails(b)) => assert!(b.digitable_line.is_some()),
            other => panic!("unexpected details: {:?}", other),
        }
    }

    #[test]
    fn crypto_embeds_address_and_amount() {
        let mut c = charge(PaymentMethod::Solana);
        c.crypto = Some(CryptoPayment {
            address: "So1anaAddr".to_string(),
            amount: dec!(0.166667),
            symbol: "SOL".to_string(),
            network: "Solana".to_string(),
            confirmations: 0,
            required_confirmations: 1,
        });
        let i = generator().build(&c).unwrap();
        let qr = i.qr_payload.unwrap();
        assert!(qr.starts_with("solana:So1anaAddr?amount=0.166667&label=Order%209"));
        match i.details {
            Some(RailDetails::CryptoDetails(d)) => {
                assert_eq!(d.confirmations_needed, 1);
                assert_eq!(d.symbol, "SOL");
            }
            other => panic!("unexpected details: {:?}", other),
        }
    }

    #[test]
    fn crypto_without_address_is_an_error() {
        let c = charge(PaymentMethod::Bitcoin);
        assert!(generator().build(&c).is_err());
    }

    #[test]
    fn money_formatting() {
        assert_eq!(format_money(15000, "BRL"), "BRL 150.00");
        assert_eq!(format_money(7, "BRL"), "BRL 0.07");
    }
}
