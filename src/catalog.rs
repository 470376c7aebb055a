//! Catalog collaborator supplying base prices at settlement time
use std::collections::HashMap;

/// Read-only price lookup for a product, in minor currency units. The
/// marketplace catalog sits behind this seam; the engine only asks for the
/// base price when a group order fulfils.
pub trait Catalog: Send + Sync {
    fn base_price(&self, product_id: &str) -> Option<u64>;
}

/// Fixed in-memory catalog for tests and embedding.
#[derive(Default)]
pub struct StaticCatalog {
    prices: HashMap<String, u64>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_price(mut self, product_id: &str, base_price: u64) -> Self {
        self.prices.insert(product_id.to_string(), base_price);
        self
    }
}

impl Catalog for StaticCatalog {
    fn base_price(&self, product_id: &str) -> Option<u64> {
        self.prices.get(product_id).copied()
    }
}
