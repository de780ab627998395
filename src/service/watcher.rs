use async_trait::async_trait;

use crate::{domain::Charge, error::Result};

/// Network-side view of a crypto deposit. Implementations report the current
/// confirmation depth of the charge's deposit, or `None` when nothing has been
/// seen yet. Depth reports are treated as monotonic by the state machine.
#[async_trait]
pub trait ConfirmationWatcher: Send + Sync {
    async fn confirmations(&self, charge: &Charge) -> Result<Option<u32>>;
}

/// Reports nothing; confirmations only arrive through the push endpoint.
pub struct PushOnlyWatcher;

#[async_trait]
impl ConfirmationWatcher for PushOnlyWatcher {
    async fn confirmations(&self, _charge: &Charge) -> Result<Option<u32>> {
        Ok(None)
    }
}

/// Pretends one block lands per poll. For demos and local development.
pub struct SimulatedWatcher;

#[async_trait]
impl ConfirmationWatcher for SimulatedWatcher {
    async fn confirmations(&self, charge: &Charge) -> Result<Option<u32>> {
        Ok(charge
            .crypto
            .as_ref()
            .map(|c| c.confirmations.saturating_add(1)))
    }
}
