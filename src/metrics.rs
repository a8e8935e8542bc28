use lazy_static::lazy_static;
use prometheus::core::Collector;
use prometheus::{Encoder, Registry, TextEncoder};
use tracing::warn;

use crate::errors::ServiceError;
use crate::services::{procurement, recalc};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
}

fn register(collector: Box<dyn Collector>) {
    if let Err(e) = REGISTRY.register(collector) {
        // repeat registration on re-init is not an error worth failing over
        warn!("Metric registration skipped: {}", e);
    }
}

/// Registers every counter with the shared registry. Callable more than
/// once; duplicates are ignored.
pub fn init() {
    register(Box::new(recalc::RECALC_RUNS.clone()));
    register(Box::new(recalc::RECALC_BUSY_REJECTIONS.clone()));
    register(Box::new(recalc::REQUIREMENTS_CALCULATED.clone()));
    register(Box::new(recalc::REQUIREMENTS_UNCHANGED.clone()));
    register(Box::new(recalc::REQUIREMENT_CONFLICTS.clone()));
    register(Box::new(recalc::REQUIREMENT_INVARIANT_VIOLATIONS.clone()));
    register(Box::new(recalc::REQUIREMENTS_SKIPPED.clone()));
    register(Box::new(procurement::ORDERS_CREATED.clone()));
    register(Box::new(procurement::ORDER_CREATION_FAILURES.clone()));
    register(Box::new(procurement::ORDERS_CANCELLED.clone()));
}

/// Prometheus text exposition of everything in the registry.
pub fn render() -> Result<String, ServiceError> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&REGISTRY.gather(), &mut buffer)
        .map_err(|e| ServiceError::InternalError(format!("Failed to encode metrics: {}", e)))?;
    String::from_utf8(buffer)
        .map_err(|e| ServiceError::InternalError(format!("Metrics are not valid UTF-8: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent_and_renders_counters() {
        init();
        init();

        let text = render().unwrap();
        assert!(text.contains("requirement_recalc_runs_total"));
        assert!(text.contains("requirements_calculated_total"));
        assert!(text.contains("purchase_orders_created_total"));
    }
}
