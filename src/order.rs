//! Group order drafts and creation-time validation
use crate::clock::TimeStamp;
use crate::error::ValidationError;
use crate::group::{GroupOrder, OrderState};
use crate::utils;
use chrono::Utc;

/// One step of the discount function: committing at least `threshold`
/// units earns `percent` off the base price.
#[derive(Debug, PartialEq, Eq, Clone, Copy, minicbor::Encode, minicbor::Decode)]
pub struct DiscountTier {
    #[n(0)]
    pub threshold: u64,
    #[n(1)]
    pub percent: u8,
}

// used for constructing drafts before anything is persisted
#[derive(Default)]
pub struct GroupOrderDraft {
    supplier_id: Option<String>,
    product_id: Option<String>,
    target_quantity: u64,
    min_participants: u32,
    max_participants: u32,
    tiers: Vec<DiscountTier>,
    expires_at: Option<TimeStamp<Utc>>,
}

impl GroupOrderDraft {
    /// Construct a new builder object, this becomes the basis for a draft
    pub fn new() -> Self {
        Self::default()
    }
    pub fn supplier(mut self, supplier_id: &str) -> Self {
        self.supplier_id = Some(supplier_id.to_string());
        self
    }
    pub fn product(mut self, product_id: &str) -> Self {
        self.product_id = Some(product_id.to_string());
        self
    }
    pub fn target_quantity(mut self, quantity: u64) -> Self {
        self.target_quantity = quantity;
        self
    }
    pub fn participant_bounds(mut self, min: u32, max: u32) -> Self {
        self.min_participants = min;
        self.max_participants = max;
        self
    }
    pub fn tier(mut self, threshold: u64, percent: u8) -> Self {
        self.tiers.push(DiscountTier { threshold, percent });
        self
    }
    pub fn expires_at(mut self, deadline: TimeStamp<Utc>) -> Self {
        self.expires_at = Some(deadline);
        self
    }

    /// Checks every creation rule, then mints the `Open` record with a
    /// fresh id and zeroed aggregates.
    pub fn validate_and_build(&self, now: TimeStamp<Utc>) -> Result<GroupOrder, ValidationError> {
        let supplier_id = self
            .supplier_id
            .clone()
            .ok_or(ValidationError::MissingSupplier)?;
        let product_id = self
            .product_id
            .clone()
            .ok_or(ValidationError::MissingProduct)?;
        if self.target_quantity == 0 {
            return Err(ValidationError::NonPositiveTarget);
        }
        if self.min_participants < 1 {
            return Err(ValidationError::NoMinParticipants);
        }
        if self.max_participants < self.min_participants {
            return Err(ValidationError::ParticipantBoundsInverted {
                min: self.min_participants,
                max: self.max_participants,
            });
        }
        if self.tiers.is_empty() {
            return Err(ValidationError::NoTiers);
        }
        for pair in self.tiers.windows(2) {
            if pair[1].threshold <= pair[0].threshold {
                return Err(ValidationError::TiersNotAscending);
            }
        }
        for tier in &self.tiers {
            if tier.percent > 100 {
                return Err(ValidationError::PercentOutOfRange(tier.percent));
            }
        }
        let expires_at = self.expires_at.clone().ok_or(ValidationError::MissingExpiry)?;
        if expires_at <= now {
            return Err(ValidationError::ExpiryNotInFuture);
        }

        let id = utils::new_uuid_to_bech32("group_")
            .expect("failed to encode group id as bech32");

        Ok(GroupOrder {
            id,
            supplier_id,
            product_id,
            target_quantity: self.target_quantity,
            current_quantity: 0,
            participants: 0,
            min_participants: self.min_participants,
            max_participants: self.max_participants,
            tiers: self.tiers.clone(),
            created_at: now.clone(),
            expires_at,
            state: OrderState::Open,
            settlement: None,
        })
    }
}
