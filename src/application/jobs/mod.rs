mod reap_expired_undo;

pub use reap_expired_undo::{DEFAULT_REAP_INTERVAL, run_undo_reaper};
