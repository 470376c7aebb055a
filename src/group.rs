//! Group order records, participant entries and lifecycle states
use crate::clock::TimeStamp;
use crate::error::EngineError;
use crate::order::DiscountTier;
use chrono::Utc;

#[derive(Debug, PartialEq, Eq, Clone, Copy, minicbor::Encode, minicbor::Decode)]
pub enum OrderState {
    #[n(0)]
    Open,
    #[n(1)]
    Fulfilled,
    #[n(2)]
    Expired,
    #[n(3)]
    Cancelled,
}

impl OrderState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, OrderState::Open)
    }
}

/// One aggregation unit: vendors pool quantity against `target_quantity`
/// to unlock a discount tier before `expires_at`.
#[derive(Debug, PartialEq, Eq, Clone, minicbor::Encode, minicbor::Decode)]
pub struct GroupOrder {
    #[n(0)]
    pub id: String, // uuid7, bech32 encoded
    #[n(1)]
    pub supplier_id: String,
    #[n(2)]
    pub product_id: String,
    #[n(3)]
    pub target_quantity: u64,
    #[n(4)]
    pub current_quantity: u64, // sum of active entry quantities
    #[n(5)]
    pub participants: u32, // count of active entries
    #[n(6)]
    pub min_participants: u32,
    #[n(7)]
    pub max_participants: u32,
    #[n(8)]
    pub tiers: Vec<DiscountTier>, // strictly ascending thresholds
    #[n(9)]
    pub created_at: TimeStamp<Utc>,
    #[n(10)]
    pub expires_at: TimeStamp<Utc>,
    #[n(11)]
    pub state: OrderState,
    #[n(12)]
    pub settlement: Option<String>, // sha256 of the settlement record
}

impl GroupOrder {
    /// Move to a terminal state. Terminal states are final, re-closing a
    /// closed order is an error, not a silent overwrite.
    pub fn transition(&mut self, next: OrderState) -> Result<(), EngineError> {
        if self.state.is_terminal() {
            return Err(EngineError::GroupOrderClosed(self.state));
        }
        self.state = next;
        Ok(())
    }

    pub fn expired_by(&self, now: &TimeStamp<Utc>) -> bool {
        self.expires_at <= *now
    }
}

/// One vendor's committed quantity within a group order. A vendor holds at
/// most one non-withdrawn entry per group order.
#[derive(Debug, PartialEq, Eq, Clone, minicbor::Encode, minicbor::Decode)]
pub struct ParticipantEntry {
    #[n(0)]
    pub group_order_id: String,
    #[n(1)]
    pub vendor_id: String,
    #[n(2)]
    pub quantity: u64,
    #[n(3)]
    pub joined_at: TimeStamp<Utc>,
    #[n(4)]
    pub withdrawn: bool,
}

impl ParticipantEntry {
    pub fn new(
        group_order_id: String,
        vendor_id: String,
        quantity: u64,
        joined_at: TimeStamp<Utc>,
    ) -> Self {
        Self {
            group_order_id,
            vendor_id,
            quantity,
            joined_at,
            withdrawn: false,
        }
    }
}
