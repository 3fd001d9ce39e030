pub mod cache;
pub mod context;
pub mod controller;
pub mod epoch;
pub mod session;

// Re-export public items
pub use cache::{FileSessionCache, MemorySessionCache, SessionCache, SESSION_CACHE_KEY};
pub use context::AuthContext;
pub use controller::{ReconcileStats, SessionController};
pub use session::{CachedSession, Session, SessionStatus};
