pub mod aggregate;
pub mod engine;
pub mod error;
pub mod reconcile;

pub use aggregate::{derive_project_status, open_project};
pub use engine::{MilestoneEvent, advance, select_verification_method, validate_deliverables};
pub use error::LifecycleError;
pub use reconcile::{Reconciliation, reconcile};
