pub mod memory;
pub mod pg;

pub use memory::InMemoryLedgerStore;
pub use pg::PgLedgerStore;
