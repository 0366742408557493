//! Persistence layer: the collaborator traits and their backends.

pub mod libsql_backend;
pub mod memory;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use memory::MemoryStore;
pub use traits::{
    AdminDesk, BlockList, BlockedEntry, BroadcastRequest, BroadcastTarget, Contact, DayRecap,
    ExportReceipt, RegistrationStore, SenderTally, StoredRecord,
};
