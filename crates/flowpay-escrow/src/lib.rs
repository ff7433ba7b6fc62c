pub mod config;
pub mod coordinator;
pub mod error;
pub mod locks;

pub use config::CoordinatorConfig;
pub use coordinator::{Activation, EscrowCoordinator, PartyProjects, Release};
pub use error::EscrowError;
pub use locks::{ProjectLocks, ProjectScope};
