//! Sweep for expired group orders.
//!
//! An expired order that gathered enough demand still fulfils at the best
//! tier it reached; one that did not transitions to `Expired` with no
//! settlement and no charge. The sweep is idempotent: terminal orders are
//! skipped, and an order whose commit loses a race is simply picked up by
//! the next pass.
use crate::catalog::Catalog;
use crate::clock::{Clock, TimeStamp};
use crate::error::EngineError;
use crate::group::OrderState;
use crate::registry::fulfil_order;
use crate::store::Ledger;
use chrono::Utc;
use std::sync::Arc;
use tracing::info;

/// What one sweep did: ids fulfilled at their best tier, ids expired
/// unfulfilled, and ids skipped because another writer got there first.
#[derive(Debug, Default)]
pub struct SweepOutcome {
    pub fulfilled: Vec<String>,
    pub expired: Vec<String>,
    pub contended: Vec<String>,
}

pub struct ExpiryScanner {
    ledger: Arc<Ledger>,
    catalog: Arc<dyn Catalog>,
    clock: Arc<dyn Clock>,
}

impl ExpiryScanner {
    pub fn new(ledger: Arc<Ledger>, catalog: Arc<dyn Catalog>, clock: Arc<dyn Clock>) -> Self {
        Self {
            ledger,
            catalog,
            clock,
        }
    }

    /// Scan every group order and close out the expired open ones.
    pub fn sweep(&self) -> Result<SweepOutcome, EngineError> {
        let now = self.clock.now();
        let mut outcome = SweepOutcome::default();

        for order in self.ledger.scan_group_orders()? {
            if order.state != OrderState::Open || !order.expired_by(&now) {
                continue;
            }
            match self.close_out_at(&order.id, &now) {
                Ok(Some(OrderState::Fulfilled)) => outcome.fulfilled.push(order.id),
                Ok(Some(OrderState::Expired)) => outcome.expired.push(order.id),
                Ok(_) => {}
                Err(EngineError::Contention) => outcome.contended.push(order.id),
                Err(other) => return Err(other),
            }
        }

        if !outcome.fulfilled.is_empty() || !outcome.expired.is_empty() {
            info!(
                fulfilled = outcome.fulfilled.len(),
                expired = outcome.expired.len(),
                "expiry sweep closed out group orders"
            );
        }
        Ok(outcome)
    }

    /// Lazy variant for a single order, e.g. on access to a record that
    /// looks expired. Returns the terminal state it applied, or `None`
    /// when there was nothing to do. Converges with [`Self::sweep`].
    pub fn close_out(&self, group_order_id: &str) -> Result<Option<OrderState>, EngineError> {
        let now = self.clock.now();
        self.close_out_at(group_order_id, &now)
    }

    fn close_out_at(
        &self,
        group_order_id: &str,
        now: &TimeStamp<Utc>,
    ) -> Result<Option<OrderState>, EngineError> {
        let mut txn = self.ledger.begin();
        let Some(mut order) = txn.read_group_order(group_order_id)? else {
            return Ok(None);
        };
        if order.state != OrderState::Open || !order.expired_by(now) {
            return Ok(None);
        }

        let lowest_tier_met = order
            .tiers
            .first()
            .is_some_and(|tier| order.current_quantity >= tier.threshold);

        if order.participants >= order.min_participants && lowest_tier_met {
            let base_price = self
                .catalog
                .base_price(&order.product_id)
                .ok_or_else(|| {
                    EngineError::NotFound(format!("base price for product {}", order.product_id))
                })?;
            let entries = self.ledger.read_participants(group_order_id)?;
            fulfil_order(&mut txn, &mut order, &entries, base_price)?;
        } else {
            order.transition(OrderState::Expired)?;
        }

        txn.write_group_order(&order)?;
        txn.commit()?;

        Ok(Some(order.state))
    }
}
