#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use procwatch::config::{ServiceConfig, SupervisorOptions};
use procwatch::registry::ServiceRegistry;
use procwatch::supervisor::Supervisor;

/// Builder for `ServiceConfig` to simplify test setup.
pub struct ServiceConfigBuilder {
    service: ServiceConfig,
}

impl ServiceConfigBuilder {
    pub fn new(id: &str, command: &str) -> Self {
        Self {
            service: ServiceConfig {
                id: id.to_string(),
                name: None,
                command: command.to_string(),
                dir: None,
                env: HashMap::new(),
                autostart: false,
            },
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.service.name = Some(name.to_string());
        self
    }

    pub fn dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.service.dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.service.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn autostart(mut self) -> Self {
        self.service.autostart = true;
        self
    }

    pub fn build(self) -> ServiceConfig {
        self.service
    }
}

/// Builder for a `Supervisor` over an in-memory service set.
///
/// Defaults to a short grace period so escalation tests don't wait the full
/// production five seconds.
pub struct SupervisorBuilder {
    services: Vec<ServiceConfig>,
    options: SupervisorOptions,
}

impl SupervisorBuilder {
    pub fn new() -> Self {
        Self {
            services: Vec::new(),
            options: SupervisorOptions {
                grace_period: Duration::from_millis(500),
                kill_confirm: Duration::from_secs(2),
                settle_delay: Duration::from_millis(50),
                ..SupervisorOptions::default()
            },
        }
    }

    pub fn with_service(mut self, service: ServiceConfig) -> Self {
        self.services.push(service);
        self
    }

    /// Shorthand for a service with just an id and a command.
    pub fn with_command(self, id: &str, command: &str) -> Self {
        let svc = ServiceConfigBuilder::new(id, command).build();
        self.with_service(svc)
    }

    pub fn grace_period(mut self, grace: Duration) -> Self {
        self.options.grace_period = grace;
        self
    }

    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.options.settle_delay = delay;
        self
    }

    pub fn log_buffer_capacity(mut self, capacity: usize) -> Self {
        self.options.log_buffer_capacity = capacity;
        self
    }

    pub fn build(self) -> Supervisor {
        Supervisor::new(ServiceRegistry::new(self.services), self.options)
    }
}

impl Default for SupervisorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
