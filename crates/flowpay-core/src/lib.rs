pub mod events;
pub mod models;
pub mod policy;
pub mod storage;

pub use events::{DomainEvent, DomainEventKind, EventSink, NoopEventSink};
pub use models::{
    Deliverable, DeliverableDraft, DeliverableKind, DeliverableStatus, Milestone, MilestoneDraft,
    MilestoneStatus, PaymentKind, PaymentRecord, PaymentStatus, Project, ProjectDraft,
    ProjectStatus, UnknownVariant, Verdict, VerificationMethod,
};
pub use policy::{EscrowPolicy, RejectionPolicy, ReviewMode};
pub use storage::LedgerStore;
