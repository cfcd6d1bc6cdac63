// src/config/validate.rs

use std::collections::HashSet;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{ProcwatchError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = ProcwatchError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.config, raw.service))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_services(cfg)?;
    validate_global_config(cfg)?;
    validate_services(cfg)?;
    Ok(())
}

fn ensure_has_services(cfg: &RawConfigFile) -> Result<()> {
    if cfg.service.is_empty() {
        return Err(ProcwatchError::Config(
            "config must contain at least one [[service]] entry".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<()> {
    if cfg.config.log_buffer_capacity == 0 {
        return Err(ProcwatchError::Config(
            "[config].log_buffer_capacity must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_services(cfg: &RawConfigFile) -> Result<()> {
    let mut seen: HashSet<&str> = HashSet::new();

    for svc in cfg.service.iter() {
        if svc.id.trim().is_empty() {
            return Err(ProcwatchError::Config(
                "service with empty `id`".to_string(),
            ));
        }
        if svc.command.trim().is_empty() {
            return Err(ProcwatchError::Config(format!(
                "service '{}' has an empty `command`",
                svc.id
            )));
        }
        if !seen.insert(svc.id.as_str()) {
            return Err(ProcwatchError::Config(format!(
                "duplicate service id '{}'",
                svc.id
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::ServiceConfig;

    fn svc(id: &str, command: &str) -> ServiceConfig {
        ServiceConfig {
            id: id.to_string(),
            name: None,
            command: command.to_string(),
            dir: None,
            env: Default::default(),
            autostart: false,
        }
    }

    fn raw(services: Vec<ServiceConfig>) -> RawConfigFile {
        RawConfigFile {
            config: Default::default(),
            service: services,
        }
    }

    #[test]
    fn empty_service_list_is_rejected() {
        let err = ConfigFile::try_from(raw(vec![])).unwrap_err();
        assert!(matches!(err, ProcwatchError::Config(_)));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let err =
            ConfigFile::try_from(raw(vec![svc("a", "echo 1"), svc("a", "echo 2")])).unwrap_err();
        assert!(err.to_string().contains("duplicate service id 'a'"));
    }

    #[test]
    fn empty_command_is_rejected() {
        let err = ConfigFile::try_from(raw(vec![svc("a", "  ")])).unwrap_err();
        assert!(err.to_string().contains("empty `command`"));
    }

    #[test]
    fn valid_config_passes_and_preserves_order() {
        let cfg =
            ConfigFile::try_from(raw(vec![svc("b", "echo b"), svc("a", "echo a")])).unwrap();
        let ids: Vec<&str> = cfg.service.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn toml_service_array_parses_in_order() {
        let text = r#"
            [config]
            grace_period_secs = 1

            [[service]]
            id = "web"
            command = "npm run dev"
            autostart = true

            [[service]]
            id = "api"
            command = "cargo run"
            env = { RUST_LOG = "debug" }
        "#;
        let raw: RawConfigFile = toml::from_str(text).unwrap();
        let cfg = ConfigFile::try_from(raw).unwrap();

        assert_eq!(cfg.config.grace_period_secs, 1);
        assert_eq!(cfg.service[0].id, "web");
        assert!(cfg.service[0].autostart);
        assert_eq!(cfg.service[1].env.get("RUST_LOG").unwrap(), "debug");
    }
}
