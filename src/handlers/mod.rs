pub mod common;
pub mod purchase_orders;
pub mod requirements;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;
