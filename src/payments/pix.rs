//! Pix "copia e cola" payloads.
//!
//! The payload is an EMV merchant-presented QR string: a flat sequence of
//! `ID LEN VALUE` fields where `LEN` is two decimal digits, closed by a
//! CRC16/CCITT-FALSE checksum over everything before it (including the
//! `6304` header of the checksum field itself).

use crate::error::{AppError, Result};

const GUI: &str = "br.gov.bcb.pix";
const BRL_NUMERIC: &str = "986";
/// EMV tag 54 holds at most 13 characters.
const MAX_AMOUNT_LEN: usize = 13;

#[derive(Debug, Clone)]
pub struct PixPayload<'a> {
    pub key: &'a str,
    pub merchant_name: &'a str,
    pub merchant_city: &'a str,
    /// Minor units.
    pub amount: i64,
    pub description: Option<&'a str>,
    pub txid: &'a str,
}

impl PixPayload<'_> {
    pub fn encode(&self) -> Result<String> {
        let mut account = String::new();
        push_field(&mut account, "00", GUI)?;
        push_field(&mut account, "01", self.key)?;
        if let Some(desc) = self.description.map(sanitize).filter(|d| !d.is_empty()) {
            // Merchant account info is capped at 99 chars overall.
            let room = 99usize.saturating_sub(account.len() + 4);
            if room > 0 {
                let desc: String = desc.chars().take(room).collect();
                push_field(&mut account, "02", &desc)?;
            }
        }

        let mut additional = String::new();
        let txid: String = self
            .txid
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .take(25)
            .collect();
        push_field(&mut additional, "05", if txid.is_empty() { "***" } else { &txid })?;

        let mut out = String::new();
        push_field(&mut out, "00", "01")?;
        push_field(&mut out, "01", "12")?;
        push_field(&mut out, "26", &account)?;
        push_field(&mut out, "52", "0000")?;
        push_field(&mut out, "53", BRL_NUMERIC)?;
        push_field(&mut out, "54", &format_amount(self.amount)?)?;
        push_field(&mut out, "58", "BR")?;
        push_field(&mut out, "59", &truncate(&sanitize(self.merchant_name), 25))?;
        push_field(&mut out, "60", &truncate(&sanitize(self.merchant_city), 15))?;
        push_field(&mut out, "62", &additional)?;

        out.push_str("6304");
        let crc = crc16_ccitt(out.as_bytes());
        out.push_str(&format!("{:04X}", crc));
        Ok(out)
    }
}

fn push_field(out: &mut String, id: &str, value: &str) -> Result<()> {
    let len = value.len();
    if len > 99 {
        return Err(AppError::Validation(format!(
            "pix field {} is {} bytes, max 99",
            id, len
        )));
    }
    out.push_str(id);
    out.push_str(&format!("{:02}", len));
    out.push_str(value);
    Ok(())
}

fn format_amount(minor: i64) -> Result<String> {
    let formatted = format!("{}.{:02}", minor / 100, minor % 100);
    if minor <= 0 || formatted.len() > MAX_AMOUNT_LEN {
        return Err(AppError::InvalidAmount(format!(
            "pix amount {} does not fit the {}-character amount field",
            minor, MAX_AMOUNT_LEN
        )));
    }
    Ok(formatted)
}

/// Payload fields must be plain ASCII; accents are dropped rather than transliterated.
fn sanitize(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == ' ' || *c == '-' || *c == '.')
        .collect::<String>()
        .trim()
        .to_string()
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

pub fn crc16_ccitt(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for byte in data {
        crc ^= (*byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}
