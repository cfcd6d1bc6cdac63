// src/proc/mod.rs

pub mod kill;
pub mod lifecycle;
pub mod types;

pub use lifecycle::{spawn_instance, stop_instance, Instance};
pub use types::{LogEntry, ServiceStatus, ServiceSummary, StatusEvent, StreamKind};
