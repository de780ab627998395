use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{
    domain::PaymentMethod,
    error::{AppError, Result},
};

/// Per-method fee pair: `percentage` of the amount plus a `fixed` minor-unit charge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub percentage: Decimal,
    pub fixed: i64,
}

impl FeeSchedule {
    pub const fn new(percentage: Decimal, fixed: i64) -> Self {
        Self { percentage, fixed }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CryptoAsset {
    pub symbol: String,
    pub network: String,
    /// URI scheme used in QR payloads (`bitcoin:`, `ethereum:`...).
    pub uri_scheme: String,
    pub confirmations: u32,
    /// Decimal places the payer is asked to send.
    pub decimals: u32,
    /// Price of one unit in the table's quote currency.
    pub rate: Decimal,
}

/// Seconds elapsed since creation before a time-driven transition applies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettlementTimings {
    pub pix_settle_secs: u64,
    pub card_processing_secs: u64,
    pub card_settle_secs: u64,
    pub boleto_settle_secs: u64,
}

impl Default for SettlementTimings {
    fn default() -> Self {
        Self {
            pix_settle_secs: 10,
            card_processing_secs: 3,
            card_settle_secs: 15,
            boleto_settle_secs: 86_400,
        }
    }
}

/// Advisory instruction lifetimes, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpiryWindows {
    pub pix_secs: u64,
    pub card_secs: u64,
    pub boleto_secs: u64,
    pub crypto_secs: u64,
}

impl Default for ExpiryWindows {
    fn default() -> Self {
        Self {
            pix_secs: 5 * 60,
            card_secs: 30 * 60,
            boleto_secs: 3 * 24 * 60 * 60,
            crypto_secs: 60 * 60,
        }
    }
}

/// Receiving side of instant transfers and bank slips.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MerchantAccount {
    pub pix_key: String,
    pub name: String,
    pub city: String,
}

impl Default for MerchantAccount {
    fn default() -> Self {
        Self {
            pix_key: "pagamentos@chargeflow.local".to_string(),
            name: "Chargeflow Merchant".to_string(),
            city: "Sao Paulo".to_string(),
        }
    }
}

/// Fee schedules, crypto assets and timing parameters. Built once at startup
/// and shared by the fee engine, instruction generator and state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateTable {
    pub quote_currency: String,
    pub fees: BTreeMap<PaymentMethod, FeeSchedule>,
    pub assets: BTreeMap<PaymentMethod, CryptoAsset>,
    pub settlement: SettlementTimings,
    pub expiry: ExpiryWindows,
    pub merchant: MerchantAccount,
    /// Secret used to derive per-charge deposit addresses.
    pub wallet_seed: String,
    /// Prefix for public payment links, e.g. `https://pay.example.com`.
    pub payment_base_url: String,
}

impl Default for RateTable {
    fn default() -> Self {
        let mut fees = BTreeMap::new();
        fees.insert(PaymentMethod::Pix, FeeSchedule::new(dec!(0.99), 0));
        fees.insert(PaymentMethod::CreditCard, FeeSchedule::new(dec!(3.49), 39));
        fees.insert(PaymentMethod::DebitCard, FeeSchedule::new(dec!(1.99), 39));
        fees.insert(PaymentMethod::Boleto, FeeSchedule::new(dec!(0), 349));
        for method in [
            PaymentMethod::Bitcoin,
            PaymentMethod::Ethereum,
            PaymentMethod::Usdt,
            PaymentMethod::Solana,
        ] {
            fees.insert(method, FeeSchedule::new(dec!(1.00), 0));
        }

        let mut assets = BTreeMap::new();
        assets.insert(
            PaymentMethod::Bitcoin,
            CryptoAsset {
                symbol: "BTC".to_string(),
                network: "Bitcoin".to_string(),
                uri_scheme: "bitcoin".to_string(),
                confirmations: 3,
                decimals: 8,
                rate: dec!(350000),
            },
        );
        assets.insert(
            PaymentMethod::Ethereum,
            CryptoAsset {
                symbol: "ETH".to_string(),
                network: "Ethereum".to_string(),
                uri_scheme: "ethereum".to_string(),
                confirmations: 12,
                decimals: 8,
                rate: dec!(18000),
            },
        );
        assets.insert(
            PaymentMethod::Usdt,
            CryptoAsset {
                symbol: "USDT".to_string(),
                network: "Ethereum (ERC-20)".to_string(),
                uri_scheme: "ethereum".to_string(),
                confirmations: 15,
                decimals: 6,
                rate: dec!(5.50),
            },
        );
        assets.insert(
            PaymentMethod::Solana,
            CryptoAsset {
                symbol: "SOL".to_string(),
                network: "Solana".to_string(),
                uri_scheme: "solana".to_string(),
                confirmations: 1,
                decimals: 6,
                rate: dec!(900),
            },
        );

        Self {
            quote_currency: "BRL".to_string(),
            fees,
            assets,
            settlement: SettlementTimings::default(),
            expiry: ExpiryWindows::default(),
            merchant: MerchantAccount::default(),
            wallet_seed: "change-me-in-production".to_string(),
            payment_base_url: "http://localhost:8080/pay".to_string(),
        }
    }
}

impl RateTable {
    pub fn fee_schedule(&self, method: PaymentMethod) -> Result<FeeSchedule> {
        self.fees
            .get(&method)
            .copied()
            .ok_or_else(|| AppError::UnsupportedMethod(method.to_string()))
    }

    pub fn asset(&self, method: PaymentMethod) -> Result<&CryptoAsset> {
        self.assets
            .get(&method)
            .ok_or_else(|| AppError::UnsupportedMethod(method.to_string()))
    }

    pub fn payment_url(&self, reference: &str) -> String {
        format!("{}/{}", self.payment_base_url.trim_end_matches('/'), reference)
    }

    /// Rejects tables that could produce a negative fee or a zero-confirmation rail.
    pub fn validate(&self) -> Result<()> {
        for (method, schedule) in &self.fees {
            if schedule.percentage < Decimal::ZERO || schedule.fixed < 0 {
                return Err(AppError::Config(format!(
                    "negative fee schedule for {}",
                    method
                )));
            }
            if method.is_crypto() && !self.assets.contains_key(method) {
                return Err(AppError::Config(format!(
                    "{} has a fee schedule but no asset definition",
                    method
                )));
            }
        }
        for (method, asset) in &self.assets {
            if asset.confirmations == 0 {
                return Err(AppError::Config(format!(
                    "{} requires at least one confirmation",
                    method
                )));
            }
            if asset.rate <= Decimal::ZERO {
                return Err(AppError::Config(format!("{} rate must be positive", method)));
            }
        }
        Ok(())
    }
}

/// Source of fiat-per-unit exchange rates for crypto rails.
pub trait RateSource: Send + Sync {
    fn rate(&self, method: PaymentMethod, currency: &str) -> Option<Decimal>;
}

/// Fixed rates read from the rate table.
pub struct StaticRateSource {
    quote_currency: String,
    rates: BTreeMap<PaymentMethod, Decimal>,
}

impl StaticRateSource {
    pub fn from_table(table: &RateTable) -> Self {
        Self {
            quote_currency: table.quote_currency.clone(),
            rates: table
                .assets
                .iter()
                .map(|(method, asset)| (*method, asset.rate))
                .collect(),
        }
    }
}

impl RateSource for StaticRateSource {
    fn rate(&self, method: PaymentMethod, currency: &str) -> Option<Decimal> {
        if !self.quote_currency.eq_ignore_ascii_case(currency) {
            return None;
        }
        self.rates.get(&method).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_is_valid() {
        let table = RateTable::default();
        table.validate().unwrap();
        assert_eq!(table.fees.len(), PaymentMethod::ALL.len());
        assert_eq!(table.asset(PaymentMethod::Solana).unwrap().confirmations, 1);
        assert_eq!(table.asset(PaymentMethod::Usdt).unwrap().confirmations, 15);
    }

    #[test]
    fn missing_fee_schedule_is_unsupported() {
        let mut table = RateTable::default();
        table.fees.remove(&PaymentMethod::Boleto);
        assert!(matches!(
            table.fee_schedule(PaymentMethod::Boleto),
            Err(AppError::UnsupportedMethod(_))
        ));
    }

    #[test]
    fn rejects_negative_fees() {
        let mut table = RateTable::default();
        table
            .fees
            .insert(PaymentMethod::Pix, FeeSchedule::new(dec!(-1), 0));
        assert!(table.validate().is_err());
    }

    #[test]
    fn static_source_only_quotes_its_currency() {
        let source = StaticRateSource::from_table(&RateTable::default());
        assert_eq!(source.rate(PaymentMethod::Bitcoin, "brl"), Some(dec!(350000)));
        assert_eq!(source.rate(PaymentMethod::Bitcoin, "USD"), None);
        assert_eq!(source.rate(PaymentMethod::Pix, "BRL"), None);
    }

    #[test]
    fn payment_url_joins_cleanly() {
        let mut table = RateTable::default();
        table.payment_base_url = "https://pay.example.com/".to_string();
        assert_eq!(table.payment_url("inv_1"), "https://pay.example.com/inv_1");
    }
}
