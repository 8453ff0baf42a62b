//! Shared helpers: database retry, monitored batch transactions, file moves

pub mod db_retry;
pub mod fs;
pub mod pool_monitor;

pub use db_retry::retry_on_lock;
pub use pool_monitor::{begin_monitored, MonitoredTransaction};
