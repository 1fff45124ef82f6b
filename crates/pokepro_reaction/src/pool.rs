//! Weighted pool of eligible response modules.

use pokepro_core::{PokeConfig, ResponseModule};
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use std::collections::BTreeMap;

/// Modules with a strictly positive weight, in declaration order.
#[derive(Debug, Clone)]
pub struct ResponsePool {
    modules: Vec<ResponseModule>,
    weights: Vec<u64>,
    index: Option<WeightedIndex<u64>>,
}

impl ResponsePool {
    /// Build from a module → weight mapping. Zero weights are excluded and
    /// iteration order is the module declaration order, independent of the
    /// order of `weights`. An empty result is logged once here.
    pub fn build<I>(weights: I) -> Self
    where
        I: IntoIterator<Item = (ResponseModule, u32)>,
    {
        let table: BTreeMap<ResponseModule, u32> = weights.into_iter().collect();
        let (modules, weights): (Vec<_>, Vec<_>) = table
            .into_iter()
            .filter(|(_, w)| *w > 0)
            .map(|(m, w)| (m, u64::from(w)))
            .unzip();

        let index = if weights.is_empty() {
            None
        } else {
            WeightedIndex::new(&weights).ok()
        };

        if index.is_none() {
            tracing::warn!("ResponsePool: every response module has weight 0, poke reactions are disabled");
            return Self::empty();
        }

        tracing::debug!(
            "ResponsePool: eligible modules {:?} with weights {:?}",
            modules,
            weights
        );
        Self {
            modules,
            weights,
            index,
        }
    }

    pub fn from_config(config: &PokeConfig) -> Self {
        Self::build(config.module_weights())
    }

    pub fn empty() -> Self {
        Self {
            modules: vec![],
            weights: vec![],
            index: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_none()
    }

    pub fn modules(&self) -> &[ResponseModule] {
        &self.modules
    }

    pub fn weights(&self) -> &[u64] {
        &self.weights
    }

    /// Probability that `select` returns `module`.
    pub fn probability(&self, module: ResponseModule) -> f64 {
        let total: u64 = self.weights.iter().sum();
        if total == 0 {
            return 0.0;
        }
        self.modules
            .iter()
            .position(|m| *m == module)
            .map(|i| self.weights[i] as f64 / total as f64)
            .unwrap_or(0.0)
    }

    /// Draw one module with probability proportional to its weight.
    ///
    /// # Panics
    ///
    /// Panics if the pool is empty. Callers check [`ResponsePool::is_empty`] first.
    pub fn select<R: Rng + ?Sized>(&self, rng: &mut R) -> ResponseModule {
        match &self.index {
            Some(index) => self.modules[index.sample(rng)],
            None => panic!("ResponsePool::select called on an empty pool"),
        }
    }
}
