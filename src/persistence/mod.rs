pub mod sqlite_log;

pub use sqlite_log::{AuthLogRow, LogLevel, PersistenceLog, SystemLogRow};
