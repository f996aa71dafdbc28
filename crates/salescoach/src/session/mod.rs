//! Session identity, persistence and history truncation.

mod in_memory;
mod manager;
mod postgres;
mod store;

pub use in_memory::MemorySessionStore;
pub use manager::{History, SessionManager, SessionView, HISTORY_TURNS};
pub use postgres::PgSessionStore;
pub use store::{NewAnalysis, NewLogEntry, SessionStore, StoreError};
