use rand::Rng;

use crate::catalog::{EndpointCatalog, EndpointDescriptor};

/// Picks endpoints from a catalog according to their weights.
///
/// Weights are treated as cumulative thresholds in catalog order, and are not normalized. When a draw lands past the
/// total weight of the catalog, the first entry is returned.
#[derive(Clone, Debug)]
pub struct WeightedSelector {
    catalog: EndpointCatalog,
}

impl WeightedSelector {
    /// Creates a new `WeightedSelector` over the given catalog.
    pub fn new(catalog: EndpointCatalog) -> Self {
        Self { catalog }
    }

    /// Selects an endpoint for the given draw, where `r` is expected to be in `[0, 1)`.
    pub fn select_with(&self, r: f64) -> &EndpointDescriptor {
        let entries = self.catalog.entries();

        let mut cumulative_weight = 0.0;
        for entry in entries {
            cumulative_weight += entry.weight;
            if r <= cumulative_weight {
                return entry;
            }
        }

        // Catalogs are never empty.
        &entries[0]
    }

    /// Selects an endpoint using a uniform draw from `rng`.
    pub fn select<R>(&self, rng: &mut R) -> &EndpointDescriptor
    where
        R: Rng + ?Sized,
    {
        self.select_with(rng.random::<f64>())
    }
}
