//! Registry API for group order lifecycle and membership operations.
//!
//! Every mutating operation is a single optimistic transaction scoped to
//! one group order: read, re-validate, buffer writes, commit. A commit that
//! loses a race surfaces [`EngineError::Contention`] and the caller decides
//! whether to retry; nothing is ever partially applied.
use crate::catalog::Catalog;
use crate::clock::Clock;
use crate::error::{EngineError, ValidationError};
use crate::group::{GroupOrder, OrderState, ParticipantEntry};
use crate::order::GroupOrderDraft;
use crate::settlement::{Settlement, settle};
use crate::store::{Ledger, LedgerTxn};
use std::sync::Arc;
use tracing::{debug, info};

/// Flip `order` to Fulfilled and write its settlement in the caller's
/// transaction. `order.current_quantity` must already reflect the entries.
pub(crate) fn fulfil_order(
    txn: &mut LedgerTxn<'_>,
    order: &mut GroupOrder,
    entries: &[ParticipantEntry],
    base_price: u64,
) -> Result<(), EngineError> {
    order.transition(OrderState::Fulfilled)?;
    let settlement = settle(order, entries, base_price);
    let digest = txn.write_settlement(&settlement)?;
    order.settlement = Some(digest);
    Ok(())
}

pub struct GroupOrderRegistry {
    ledger: Arc<Ledger>,
    catalog: Arc<dyn Catalog>,
    clock: Arc<dyn Clock>,
}

impl GroupOrderRegistry {
    pub fn new(ledger: Arc<Ledger>, catalog: Arc<dyn Catalog>, clock: Arc<dyn Clock>) -> Self {
        Self {
            ledger,
            catalog,
            clock,
        }
    }

    fn base_price(&self, product_id: &str) -> Result<u64, EngineError> {
        self.catalog
            .base_price(product_id)
            .ok_or_else(|| EngineError::NotFound(format!("base price for product {product_id}")))
    }

    /// Entries the settlement should cover, with `upsert` replacing any
    /// stored row for the same vendor (the store does not yet hold the
    /// write this transaction is about to commit).
    fn entries_with(
        &self,
        order_id: &str,
        upsert: &ParticipantEntry,
    ) -> Result<Vec<ParticipantEntry>, EngineError> {
        let mut entries = self.ledger.read_participants(order_id)?;
        entries.retain(|entry| entry.vendor_id != upsert.vendor_id);
        entries.push(upsert.clone());
        Ok(entries)
    }

    /// Validate a draft and persist it as a fresh `Open` group order.
    pub fn create(&self, draft: GroupOrderDraft) -> Result<GroupOrder, EngineError> {
        let now = self.clock.now();
        let order = draft.validate_and_build(now)?;

        let mut txn = self.ledger.begin();
        txn.write_group_order(&order)?;
        txn.commit()?;

        info!(group = %order.id, supplier = %order.supplier_id, "group order created");
        Ok(order)
    }

    /// Commit `quantity` units for `vendor_id`. Re-validates everything at
    /// call time and fulfils the order in the same commit once the target
    /// quantity or the participant cap is reached.
    pub fn join(
        &self,
        group_order_id: &str,
        vendor_id: &str,
        quantity: u64,
    ) -> Result<ParticipantEntry, EngineError> {
        if quantity == 0 {
            return Err(ValidationError::ZeroQuantity.into());
        }
        let now = self.clock.now();

        let mut txn = self.ledger.begin();
        let Some(mut order) = txn.read_group_order(group_order_id)? else {
            return Err(EngineError::NotFound(format!("group order {group_order_id}")));
        };
        if order.state != OrderState::Open {
            return Err(EngineError::GroupOrderClosed(order.state));
        }
        if order.expired_by(&now) {
            return Err(EngineError::GroupOrderExpired);
        }
        match txn.read_participant(group_order_id, vendor_id)? {
            Some(existing) if !existing.withdrawn => {
                return Err(ValidationError::DuplicateParticipant.into());
            }
            _ => {}
        }
        if order.participants + 1 > order.max_participants {
            return Err(EngineError::CapacityExceeded(order.max_participants));
        }

        let entry = ParticipantEntry::new(
            group_order_id.to_string(),
            vendor_id.to_string(),
            quantity,
            now,
        );
        order.current_quantity += quantity;
        order.participants += 1;

        if order.current_quantity >= order.target_quantity
            || order.participants == order.max_participants
        {
            let base_price = self.base_price(&order.product_id)?;
            let entries = self.entries_with(group_order_id, &entry)?;
            fulfil_order(&mut txn, &mut order, &entries, base_price)?;
        }

        txn.write_group_order(&order)?;
        txn.write_participant(&entry)?;
        txn.commit()?;

        debug!(group = %group_order_id, vendor = %vendor_id, quantity, "join committed");
        if order.state == OrderState::Fulfilled {
            info!(group = %group_order_id, quantity = order.current_quantity, "group order fulfilled");
        }
        Ok(entry)
    }

    /// Atomic replace-quantity variant of `join` for a vendor that already
    /// holds an active entry.
    pub fn update(
        &self,
        group_order_id: &str,
        vendor_id: &str,
        quantity: u64,
    ) -> Result<ParticipantEntry, EngineError> {
        if quantity == 0 {
            return Err(ValidationError::ZeroQuantity.into());
        }
        let now = self.clock.now();

        let mut txn = self.ledger.begin();
        let Some(mut order) = txn.read_group_order(group_order_id)? else {
            return Err(EngineError::NotFound(format!("group order {group_order_id}")));
        };
        if order.state != OrderState::Open {
            return Err(EngineError::GroupOrderClosed(order.state));
        }
        if order.expired_by(&now) {
            return Err(EngineError::GroupOrderExpired);
        }
        let Some(mut entry) = txn
            .read_participant(group_order_id, vendor_id)?
            .filter(|existing| !existing.withdrawn)
        else {
            return Err(EngineError::NotFound(format!(
                "active entry for vendor {vendor_id}"
            )));
        };

        order.current_quantity = order.current_quantity - entry.quantity + quantity;
        entry.quantity = quantity;

        if order.current_quantity >= order.target_quantity {
            let base_price = self.base_price(&order.product_id)?;
            let entries = self.entries_with(group_order_id, &entry)?;
            fulfil_order(&mut txn, &mut order, &entries, base_price)?;
        }

        txn.write_group_order(&order)?;
        txn.write_participant(&entry)?;
        txn.commit()?;

        debug!(group = %group_order_id, vendor = %vendor_id, quantity, "entry quantity replaced");
        Ok(entry)
    }

    /// Withdraw the vendor's entry. Forbidden once the order is terminal:
    /// a fulfilled group has already settled, an expired or cancelled one
    /// has nothing left to leave.
    pub fn leave(&self, group_order_id: &str, vendor_id: &str) -> Result<(), EngineError> {
        let mut txn = self.ledger.begin();
        let Some(mut order) = txn.read_group_order(group_order_id)? else {
            return Err(EngineError::NotFound(format!("group order {group_order_id}")));
        };
        if order.state != OrderState::Open {
            return Err(EngineError::GroupOrderClosed(order.state));
        }
        let Some(mut entry) = txn
            .read_participant(group_order_id, vendor_id)?
            .filter(|existing| !existing.withdrawn)
        else {
            return Err(EngineError::NotFound(format!(
                "active entry for vendor {vendor_id}"
            )));
        };

        entry.withdrawn = true;
        order.current_quantity -= entry.quantity;
        order.participants -= 1;

        txn.write_group_order(&order)?;
        txn.write_participant(&entry)?;
        txn.commit()?;

        debug!(group = %group_order_id, vendor = %vendor_id, "entry withdrawn");
        Ok(())
    }

    /// Cancel an open group order. Only the owning supplier may cancel;
    /// every entry is withdrawn in the same commit, there is no settlement.
    pub fn cancel(&self, group_order_id: &str, supplier_id: &str) -> Result<(), EngineError> {
        let mut txn = self.ledger.begin();
        let Some(mut order) = txn.read_group_order(group_order_id)? else {
            return Err(EngineError::NotFound(format!("group order {group_order_id}")));
        };
        if order.supplier_id != supplier_id {
            return Err(EngineError::Unauthorized);
        }
        if order.state != OrderState::Open {
            return Err(EngineError::GroupOrderClosed(order.state));
        }

        order.transition(OrderState::Cancelled)?;
        for mut entry in self.ledger.read_participants(group_order_id)? {
            if entry.withdrawn {
                continue;
            }
            entry.withdrawn = true;
            txn.write_participant(&entry)?;
        }
        order.current_quantity = 0;
        order.participants = 0;

        txn.write_group_order(&order)?;
        txn.commit()?;

        info!(group = %group_order_id, "group order cancelled");
        Ok(())
    }

    pub fn get_group_order(&self, group_order_id: &str) -> Result<GroupOrder, EngineError> {
        self.ledger
            .read_group_order(group_order_id)?
            .ok_or_else(|| EngineError::NotFound(format!("group order {group_order_id}")))
    }

    /// All entries for the group order, withdrawn ones included.
    pub fn list_participants(
        &self,
        group_order_id: &str,
    ) -> Result<Vec<ParticipantEntry>, EngineError> {
        // surface NotFound for an unknown order rather than an empty list
        let _ = self.get_group_order(group_order_id)?;
        Ok(self.ledger.read_participants(group_order_id)?)
    }

    /// The settlement of a fulfilled group order, `None` while open or
    /// closed without settlement.
    pub fn get_settlement(&self, group_order_id: &str) -> Result<Option<Settlement>, EngineError> {
        let order = self.get_group_order(group_order_id)?;
        match order.settlement {
            Some(digest) => Ok(self.ledger.read_settlement(&digest)?),
            None => Ok(None),
        }
    }
}
