use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::sync::Arc;

use super::rates::{RateSource, RateTable};
use crate::{
    domain::PaymentMethod,
    error::{AppError, Result},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeBreakdown {
    pub fee: i64,
    pub net_amount: i64,
}

/// Pure fee and conversion arithmetic over a [`RateTable`].
pub struct FeeEngine {
    table: Arc<RateTable>,
    rates: Arc<dyn RateSource>,
}

impl FeeEngine {
    pub fn new(table: Arc<RateTable>, rates: Arc<dyn RateSource>) -> Self {
        Self { table, rates }
    }

    /// `round(amount * percentage / 100 + fixed)` in minor units, ties to even.
    pub fn compute_fee(&self, amount: i64, method: PaymentMethod) -> Result<i64> {
        let schedule = self.table.fee_schedule(method)?;
        let raw = Decimal::from(amount) * schedule.percentage / Decimal::ONE_HUNDRED
            + Decimal::from(schedule.fixed);

        raw.round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven)
            .to_i64()
            .ok_or_else(|| AppError::InvalidAmount(format!("fee overflow for {}", amount)))
    }

    /// Fee and net amount for a new charge. Rejects amounts that cannot cover the fee.
    pub fn breakdown(&self, amount: i64, method: PaymentMethod) -> Result<FeeBreakdown> {
        if amount <= 0 {
            return Err(AppError::InvalidAmount(
                "amount must be greater than zero".to_string(),
            ));
        }

        let fee = self.compute_fee(amount, method)?;
        if fee >= amount {
            return Err(AppError::InvalidAmount(format!(
                "amount {} does not cover the {} fee of {}",
                amount, method, fee
            )));
        }

        Ok(FeeBreakdown {
            fee,
            net_amount: amount - fee,
        })
    }

    /// Converts a minor-unit fiat amount into the asset's units, rounded up to
    /// the asset's precision so the payer never under-sends.
    pub fn to_crypto_amount(
        &self,
        amount: i64,
        currency: &str,
        method: PaymentMethod,
    ) -> Result<Decimal> {
        let asset = self.table.asset(method)?;
        let rate = self.rates.rate(method, currency).ok_or_else(|| {
            AppError::UnsupportedMethod(format!("no {} rate for {}", method, currency))
        })?;
        if rate <= Decimal::ZERO {
            return Err(AppError::Config(format!("non-positive rate for {}", method)));
        }

        let fiat = Decimal::new(amount, 2);
        Ok((fiat / rate)
            .round_dp_with_strategy(asset.decimals, RoundingStrategy::AwayFromZero)
            .normalize())
    }
}
