//! # Configuration Validation
//!
//! Field rules come from the `validator` derives on the schema; this module adds
//! the rules that span several fields or that `validator` cannot express for
//! `Duration`.

use crate::{
    config::schema::{QuafkaConfig, ServerConfig},
    Error, Result,
};
use std::time::Duration;
use tracing::{debug, warn};
use validator::Validate;

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate a configuration.
    ///
    /// # Errors
    /// Returns a configuration error describing the first rule violated.
    pub fn validate(config: &QuafkaConfig) -> Result<()> {
        debug!("Starting configuration validation");

        config.validate().map_err(Error::from)?;

        Self::validate_server(&config.server)?;
        Self::validate_connection(config)?;
        Self::validate_reconnect(config)?;
        Self::validate_health(config)?;
        Self::validate_consumer(config)?;

        debug!("Configuration validation completed successfully");
        Ok(())
    }

    fn validate_server(server: &ServerConfig) -> Result<()> {
        if server.worker_threads > server.max_connections {
            warn!(
                "worker_threads ({}) exceeds max_connections ({}); extra workers stay idle",
                server.worker_threads, server.max_connections
            );
        }
        if server.port != 0 && server.port < 1024 {
            warn!("Using privileged port {} may require special permissions", server.port);
        }
        Ok(())
    }

    fn validate_connection(config: &QuafkaConfig) -> Result<()> {
        let conn = &config.connection;
        non_zero("connection.timeout", conn.timeout)?;
        if conn.initial_retry_delay > conn.max_retry_delay {
            return Err(Error::configuration(format!(
                "connection.initial_retry_delay ({:?}) must not exceed max_retry_delay ({:?})",
                conn.initial_retry_delay, conn.max_retry_delay
            )));
        }
        non_zero("pool.borrow_timeout", config.pool.borrow_timeout)
    }

    fn validate_reconnect(config: &QuafkaConfig) -> Result<()> {
        let reconnect = &config.reconnect;
        if reconnect.initial_backoff > reconnect.max_backoff {
            return Err(Error::configuration(format!(
                "reconnect.initial_backoff ({:?}) must not exceed max_backoff ({:?})",
                reconnect.initial_backoff, reconnect.max_backoff
            )));
        }
        Ok(())
    }

    fn validate_health(config: &QuafkaConfig) -> Result<()> {
        non_zero("health.check_interval", config.health.check_interval)?;
        non_zero("health.timeout", config.health.timeout)?;
        non_zero("load_balancer.probe_interval", config.load_balancer.probe_interval)
    }

    fn validate_consumer(config: &QuafkaConfig) -> Result<()> {
        non_zero("consumer.poll_timeout", config.consumer.poll_timeout)?;
        let partitions = config.topics.default_partitions;
        if let Some(p) = config.consumer.partitions.iter().find(|p| p.value() >= partitions) {
            warn!(
                "consumer partition {} is outside the default partition count {}",
                p, partitions
            );
        }
        Ok(())
    }
}

fn non_zero(name: &str, value: Duration) -> Result<()> {
    if value.is_zero() {
        return Err(Error::configuration(format!("{name} must be greater than zero")));
    }
    Ok(())
}
