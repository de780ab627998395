use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use sha2::Sha256;
use uuid::Uuid;

use super::rates::CryptoAsset;
use crate::{
    domain::PaymentMethod,
    error::{AppError, Result},
};

type HmacSha256 = Hmac<Sha256>;

/// Deterministic per-charge deposit address: HMAC(wallet_seed, method:charge_id)
/// shaped into the asset's address format. Stands in for an HD-wallet derivation;
/// the same seed and charge always yield the same address.
pub fn derive_address(seed: &str, method: PaymentMethod, charge_id: Uuid) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(seed.as_bytes())
        .map_err(|e| AppError::Config(format!("wallet seed: {}", e)))?;
    mac.update(method.as_str().as_bytes());
    mac.update(b":");
    mac.update(charge_id.as_bytes());
    let digest = hex::encode(mac.finalize().into_bytes());

    let address = match method {
        PaymentMethod::Bitcoin => format!("bc1q{}", &digest[..38]),
        PaymentMethod::Ethereum | PaymentMethod::Usdt => format!("0x{}", &digest[..40]),
        PaymentMethod::Solana => digest[..44].to_string(),
        other => return Err(AppError::UnsupportedMethod(format!("{} has no address", other))),
    };
    Ok(address)
}

/// `scheme:address?amount=X&label=...&r=<payment url>`
pub fn payment_uri(
    asset: &CryptoAsset,
    address: &str,
    amount: Decimal,
    label: &str,
    payment_url: Option<&str>,
) -> String {
    let mut uri = format!(
        "{}:{}?amount={}&label={}",
        asset.uri_scheme,
        address,
        amount.normalize(),
        urlencoding::encode(label)
    );
    if let Some(url) = payment_url {
        uri.push_str("&r=");
        uri.push_str(&urlencoding::encode(url));
    }
    uri
}
