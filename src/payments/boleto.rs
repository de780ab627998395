use chrono::{DateTime, NaiveDate, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{AppError, Result};

const BANK_CODE: &str = "341";
const CURRENCY_CODE: char = '9';
/// The value field is ten digits of minor units.
pub const MAX_AMOUNT: i64 = 9_999_999_999;

/// Builds a 47-digit digitable line for a bank slip. The free field is derived
/// from the charge id; due-date factor and value occupy the tail as on a real slip.
pub fn digitable_line(charge_id: Uuid, amount: i64, due: DateTime<Utc>) -> Result<String> {
    if !(1..=MAX_AMOUNT).contains(&amount) {
        return Err(AppError::InvalidAmount(format!(
            "boleto amount {} does not fit the slip value field (max {})",
            amount, MAX_AMOUNT
        )));
    }
    let free = free_field(charge_id);

    let f1 = format!("{}{}{}", BANK_CODE, CURRENCY_CODE, &free[0..5]);
    let f2 = free[5..15].to_string();
    let f3 = free[15..25].to_string();
    let tail = format!("{:04}{:010}", due_factor(due), amount);
    let general_dv = mod11(&format!("{}{}{}{}", f1, f2, f3, tail));

    Ok(format!(
        "{}.{}{} {}.{}{} {}.{}{} {} {}",
        &f1[..5],
        &f1[5..],
        mod10(&f1),
        &f2[..5],
        &f2[5..],
        mod10(&f2),
        &f3[..5],
        &f3[5..],
        mod10(&f3),
        general_dv,
        tail
    ))
}

fn free_field(charge_id: Uuid) -> String {
    let digest = Sha256::digest(charge_id.as_bytes());
    digest.iter().map(|b| char::from(b'0' + b % 10)).take(25).collect()
}

/// Days since 1997-10-07, wrapping back to 1000 after 9999 as banks do.
fn due_factor(due: DateTime<Utc>) -> i64 {
    let base = NaiveDate::from_ymd_opt(1997, 10, 7).unwrap_or_default();
    let days = (due.date_naive() - base).num_days();
    if days > 9999 {
        (days - 10_000) % 9_000 + 1_000
    } else {
        days.max(0)
    }
}

fn mod10(digits: &str) -> u32 {
    let sum: u32 = digits
        .chars()
        .rev()
        .filter_map(|c| c.to_digit(10))
        .enumerate()
        .map(|(i, d)| {
            let v = if i % 2 == 0 { d * 2 } else { d };
            v / 10 + v % 10
        })
        .sum();
    (10 - sum % 10) % 10
}

fn mod11(digits: &str) -> u32 {
    let sum: u32 = digits
        .chars()
        .rev()
        .filter_map(|c| c.to_digit(10))
        .enumerate()
        .map(|(i, d)| d * (2 + (i as u32 % 8)))
        .sum();
    match 11 - sum % 11 {
        0 | 10 | 11 => 1,
        dv => dv,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn line_has_47_digits() {
        let due = Utc.with_ymd_and_hms(2026, 1, 10, 0, 0, 0).unwrap();
        let line = digitable_line(Uuid::new_v4(), 15000, due).unwrap();
        let digits: String = line.chars().filter(|c| c.is_ascii_digit()).collect();
        assert_eq!(digits.len(), 47);
        assert!(line.starts_with("3419"));
        assert!(line.ends_with("0000015000"));
    }

    #[test]
    fn oversized_amount_is_rejected() {
        let due = Utc.with_ymd_and_hms(2026, 1, 10, 0, 0, 0).unwrap();
        assert!(digitable_line(Uuid::new_v4(), MAX_AMOUNT, due).is_ok());
        assert!(matches!(
            digitable_line(Uuid::new_v4(), MAX_AMOUNT + 1, due),
            Err(AppError::InvalidAmount(_))
        ));
    }

    #[test]
    fn mod10_reference() {
        // Classic Luhn-style example used for slip field checks.
        assert_eq!(mod10("341911012"), 1);
    }

    #[test]
    fn due_factor_wraps() {
        let d = Utc.with_ymd_and_hms(2025, 2, 22, 0, 0, 0).unwrap();
        assert_eq!(due_factor(d), 1000);
    }
}
