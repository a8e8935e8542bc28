use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

// Define the various events that can occur in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Requirement events
    RequirementRecalculated {
        requirement_id: Uuid,
        nomenclature_item_id: Uuid,
    },
    RequirementWrittenOff(Uuid),
    RequirementDeleted(Uuid),

    // Recalculation run events
    RecalculationCompleted {
        run_id: Uuid,
        calculated: u64,
        unchanged: u64,
        skipped: u64,
        conflicts: u64,
        invariant_violations: u64,
    },
    DemandSyncRequested {
        item_count: usize,
    },

    // Purchase order events
    PurchaseOrderCreated {
        purchase_order_id: Uuid,
        order_number: String,
        requirement_count: usize,
    },
    PurchaseOrderCancelled(Uuid),
}

// Function to process incoming events and distribute them to handlers.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        info!("Received event: {:?}", event);

        match event {
            Event::RequirementRecalculated {
                requirement_id,
                nomenclature_item_id,
            } => {
                info!(
                    "Requirement {} recalculated for item {}",
                    requirement_id, nomenclature_item_id
                );
            }
            Event::RequirementWrittenOff(requirement_id) => {
                info!("Requirement written off: {}", requirement_id);
            }
            Event::RequirementDeleted(requirement_id) => {
                info!("Requirement deleted: {}", requirement_id);
            }
            Event::RecalculationCompleted {
                run_id,
                calculated,
                unchanged,
                skipped,
                conflicts,
                invariant_violations,
            } => {
                if let Err(e) = handle_recalculation_completed(
                    run_id,
                    calculated,
                    unchanged,
                    skipped,
                    conflicts,
                    invariant_violations,
                )
                .await
                {
                    error!(
                        "Failed to handle recalculation completed event: run_id={}, error={}",
                        run_id, e
                    );
                }
            }
            Event::DemandSyncRequested { item_count } => {
                info!("Demand sync requested for {} items", item_count);
            }
            Event::PurchaseOrderCreated {
                purchase_order_id,
                order_number,
                requirement_count,
            } => {
                info!(
                    "Purchase order {} ({}) created covering {} requirements",
                    order_number, purchase_order_id, requirement_count
                );
            }
            Event::PurchaseOrderCancelled(purchase_order_id) => {
                info!("Purchase order cancelled: {}", purchase_order_id);
            }
        }
    }

    warn!("Event processing loop has ended");
}

// Handler functions for specific events
async fn handle_recalculation_completed(
    run_id: Uuid,
    calculated: u64,
    unchanged: u64,
    skipped: u64,
    conflicts: u64,
    invariant_violations: u64,
) -> Result<(), String> {
    info!(
        "Recalculation run {} finished: calculated={}, unchanged={}, skipped={}, conflicts={}",
        run_id, calculated, unchanged, skipped, conflicts
    );

    if conflicts > 0 {
        warn!(
            "Recalculation run {} hit {} unresolved version conflicts",
            run_id, conflicts
        );
    }

    if invariant_violations > 0 {
        warn!(
            "Recalculation run {} rejected {} results violating requirement invariants",
            run_id, invariant_violations
        );
    }

    Ok(())
}
