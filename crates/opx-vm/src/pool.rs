//! # Evaluator Pool
//!
//! Round-robin pool serving concurrent read-only (`view`/simulated)
//! calls. Each call gets its own evaluator slot; writable execution
//! during block processing uses a dedicated evaluator owned by the
//! indexing worker and never goes through the pool.

use crate::errors::EvaluationError;
use crate::evaluator::ContractEvaluator;
use crate::params::{EvaluationParams, EvaluationResult};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Round-robin evaluator pool.
pub struct EvaluatorPool {
    evaluators: Vec<Arc<ContractEvaluator>>,
    next: AtomicUsize,
}

impl EvaluatorPool {
    /// Build a pool from pre-constructed evaluators.
    #[must_use]
    pub fn new(evaluators: Vec<Arc<ContractEvaluator>>) -> Self {
        assert!(!evaluators.is_empty(), "pool requires at least one evaluator");
        Self {
            evaluators,
            next: AtomicUsize::new(0),
        }
    }

    /// Number of slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.evaluators.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.evaluators.is_empty()
    }

    /// Pick the next evaluator round-robin.
    #[must_use]
    pub fn checkout(&self) -> Arc<ContractEvaluator> {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.evaluators.len();
        self.evaluators[index].clone()
    }

    /// Run a read-only call on the next slot.
    pub fn view(&self, params: &EvaluationParams) -> Result<EvaluationResult, EvaluationError> {
        self.checkout().execute(params)
    }
}
