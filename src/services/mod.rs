// Recalculation pipeline
pub mod aggregator;
pub mod classifier;
pub mod depletion;
pub mod recalc;

// Requirement store and order linking
pub mod procurement;
pub mod requirements;

// Read views over the shared ERP schema
pub mod catalog;
pub mod demand;
pub mod inventory;
pub mod order_ledger;

// Purchasing seam
pub mod purchasing;
