//! Unit-of-work layer
//!
//! Sessions, identity mapping, transactions and the shared lock table. A
//! session is the scope within which the identity map guarantees one node
//! instance per object id; transactions buffer mutations and apply them
//! atomically through the storage mapper.

pub mod facade;
pub mod identity;
pub mod locks;
pub mod transaction;

// Re-export main session types
pub use facade::{PersistenceFacade, Session};
pub use identity::IdentityMap;
pub use locks::{Lock, LockManager, LockMode, Principal};
pub use transaction::{Transaction, TxState};
