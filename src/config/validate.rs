// src/config/validate.rs

use crate::config::model::{ConfigFile, HandlerSection, RawConfigFile};
use crate::errors::{EtlDagError, Result};
use crate::exec::template::{unknown_placeholders, PLACEHOLDERS};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::EtlDagError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.config, raw.handler))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_run_config(cfg)?;
    validate_handler(&cfg.handler)?;
    Ok(())
}

fn validate_run_config(cfg: &RawConfigFile) -> Result<()> {
    if cfg.config.workers == 0 {
        return Err(EtlDagError::ConfigError(
            "[config].workers must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.config.dag.trim().is_empty() {
        return Err(EtlDagError::ConfigError(
            "[config].dag must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_handler(handler: &HandlerSection) -> Result<()> {
    if let Some(cmd) = &handler.cmd {
        if cmd.trim().is_empty() {
            return Err(EtlDagError::ConfigError(
                "[handler].cmd must not be empty".to_string(),
            ));
        }
        check_template("[handler].cmd", cmd)?;
    }

    check_template("[handler].artifact", &handler.artifact)?;

    for (channel, cmd) in handler.channels.iter() {
        if channel.is_empty() || channel.contains("://") || channel.contains('/') {
            return Err(EtlDagError::ConfigError(format!(
                "[handler.channels] has invalid channel name '{}'",
                channel
            )));
        }
        if channel == "snapshot" {
            return Err(EtlDagError::ConfigError(
                "[handler.channels] cannot override 'snapshot': snapshots are external and never executed"
                    .to_string(),
            ));
        }
        check_template(&format!("[handler.channels].{channel}"), cmd)?;
    }

    Ok(())
}

fn check_template(field: &str, template: &str) -> Result<()> {
    let unknown = unknown_placeholders(template);
    if unknown.is_empty() {
        return Ok(());
    }
    Err(EtlDagError::ConfigError(format!(
        "{} uses unknown placeholder(s) {:?} (expected one of {:?})",
        field, unknown, PLACEHOLDERS
    )))
}
