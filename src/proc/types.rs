// src/proc/types.rs

//! Status and log types shared between the lifecycle controller, the
//! supervisor, and subscribers.

use std::sync::Arc;
use std::time::SystemTime;

use serde::Serialize;

use crate::config::ServiceConfig;

/// Lifecycle state of one running instance.
///
/// `Stopped` and `Error` are terminal: a new instance must be created for
/// the service to run again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Starting,
    Running,
    Stopping,
    Stopped,
    Error,
}

impl ServiceStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ServiceStatus::Stopped | ServiceStatus::Error)
    }

    /// Starting or running, i.e. a state `start` must reject.
    pub fn is_active(self) -> bool {
        matches!(self, ServiceStatus::Starting | ServiceStatus::Running)
    }
}

/// Which output stream a log entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// One captured output line. Immutable once created; the text is opaque
/// (escape sequences and all) and never parsed by the supervisor.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    #[serde(skip)]
    pub timestamp: SystemTime,
    pub stream: StreamKind,
    pub data: String,
}

impl LogEntry {
    pub fn now(stream: StreamKind, data: String) -> Arc<Self> {
        Arc::new(Self {
            timestamp: SystemTime::now(),
            stream,
            data,
        })
    }
}

/// One item on the global status-change feed.
#[derive(Debug, Clone, Serialize)]
pub struct StatusEvent {
    pub service_id: String,
    pub status: ServiceStatus,
    pub pid: Option<u32>,
    pub error: Option<String>,
}

/// Config plus live state, as returned by the query surface.
///
/// `status` defaults to `Stopped` when the service has never been started.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceSummary {
    pub config: ServiceConfig,
    pub status: ServiceStatus,
    pub pid: Option<u32>,
    #[serde(skip)]
    pub started_at: Option<SystemTime>,
    pub last_error: Option<String>,
}

impl ServiceSummary {
    /// Summary for a service with no running instance.
    pub fn stopped(config: ServiceConfig) -> Self {
        Self {
            config,
            status: ServiceStatus::Stopped,
            pid: None,
            started_at: None,
            last_error: None,
        }
    }
}
