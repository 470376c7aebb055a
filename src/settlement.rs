//! Settlement computation for fulfilled group orders.
//!
//! Everything here is a pure function of a group order snapshot, its
//! participant entries and the catalog base price. Persistence of the
//! resulting record is the store's concern.
use crate::group::{GroupOrder, ParticipantEntry};
use crate::order::DiscountTier;

/// Final per-participant pricing once a group order closes favourably.
/// Stored content-addressed; the fulfilled order references its digest.
#[derive(Debug, PartialEq, Eq, Clone, minicbor::Encode, minicbor::Decode)]
pub struct Settlement {
    #[n(0)]
    pub group_order_id: String,
    #[n(1)]
    pub base_price: u64, // minor currency units per unit of product
    #[n(2)]
    pub discount_percent: u8,
    #[n(3)]
    pub quantity: u64, // group total at fulfilment
    #[n(4)]
    pub lines: Vec<SettlementLine>,
}

#[derive(Debug, PartialEq, Eq, Clone, minicbor::Encode, minicbor::Decode)]
pub struct SettlementLine {
    #[n(0)]
    pub vendor_id: String,
    #[n(1)]
    pub quantity: u64,
    #[n(2)]
    pub final_unit_price: u64,
    #[n(3)]
    pub final_total: u64,
}

/// Highest tier whose threshold the committed quantity meets. Thresholds
/// are inclusive lower bounds; below the lowest tier there is no discount.
pub fn applicable_tier(tiers: &[DiscountTier], quantity: u64) -> Option<&DiscountTier> {
    tiers.iter().rev().find(|tier| quantity >= tier.threshold)
}

fn discounted_unit_price(base_price: u64, percent: u8) -> u64 {
    // u128 keeps the multiply exact for any u64 base price
    let keep = 100u128.saturating_sub(percent as u128);
    (base_price as u128 * keep / 100) as u64
}

/// Compute the settlement for `order` over its non-withdrawn entries.
pub fn settle(order: &GroupOrder, entries: &[ParticipantEntry], base_price: u64) -> Settlement {
    let discount_percent = applicable_tier(&order.tiers, order.current_quantity)
        .map(|tier| tier.percent)
        .unwrap_or(0);
    let final_unit_price = discounted_unit_price(base_price, discount_percent);

    let lines = entries
        .iter()
        .filter(|entry| !entry.withdrawn)
        .map(|entry| SettlementLine {
            vendor_id: entry.vendor_id.clone(),
            quantity: entry.quantity,
            final_unit_price,
            final_total: (final_unit_price as u128 * entry.quantity as u128) as u64,
        })
        .collect();

    Settlement {
        group_order_id: order.id.clone(),
        base_price,
        discount_percent,
        quantity: order.current_quantity,
        lines,
    }
}
