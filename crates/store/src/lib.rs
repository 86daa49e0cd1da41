pub mod block_hash;
pub mod cursor;
pub mod event_log;
pub mod lock;

pub use block_hash::BlockHashStore;
pub use cursor::{Cursor, CursorStore};
pub use event_log::EventLogStore;
pub use lock::{lock_key, LockManager};
