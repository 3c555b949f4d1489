// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Stage Configuration
//!
//! Consumer and producer settings, loaded either from flat dotted properties or TOML.
//!
//! ```text
//! mq.consumer.queues = orders,invoices
//! mq.consumer.topics = prices
//! monitoring.events  = true
//! monitoring.meters  = false
//! ```
//!
//! Parsing never checks the queue/topic exclusivity; the reader enforces it on start.

use crate::error::{BridgeError, BridgeResult};
use crate::monitoring::MonitoringConfig;
use serde::Deserialize;
use std::collections::HashMap;

pub const CONSUMER_QUEUES_KEY: &str = "mq.consumer.queues";
pub const CONSUMER_TOPICS_KEY: &str = "mq.consumer.topics";
pub const MONITORING_EVENTS_KEY: &str = "monitoring.events";
pub const MONITORING_METERS_KEY: &str = "monitoring.meters";

/// Destinations a consumer stage subscribes to
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    pub queues: Vec<String>,
    pub topics: Vec<String>,
    pub monitoring: MonitoringConfig,
}

impl ConsumerConfig {
    pub fn from_properties(properties: &HashMap<String, String>) -> BridgeResult<Self> {
        Ok(Self {
            queues: properties
                .get(CONSUMER_QUEUES_KEY)
                .map(|value| split_names(value))
                .unwrap_or_default(),
            topics: properties
                .get(CONSUMER_TOPICS_KEY)
                .map(|value| split_names(value))
                .unwrap_or_default(),
            monitoring: monitoring_from_properties(properties)?,
        })
    }

    pub fn from_toml_str(content: &str) -> BridgeResult<Self> {
        toml::from_str(content).map_err(|e| {
            BridgeError::configuration(format!("Invalid consumer configuration: {}", e))
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProducerConfig {
    pub monitoring: MonitoringConfig,
}

impl ProducerConfig {
    pub fn from_properties(properties: &HashMap<String, String>) -> BridgeResult<Self> {
        Ok(Self {
            monitoring: monitoring_from_properties(properties)?,
        })
    }

    pub fn from_toml_str(content: &str) -> BridgeResult<Self> {
        toml::from_str(content).map_err(|e| {
            BridgeError::configuration(format!("Invalid producer configuration: {}", e))
        })
    }
}

fn split_names(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_flag(properties: &HashMap<String, String>, key: &str) -> BridgeResult<bool> {
    match properties.get(key) {
        None => Ok(false),
        Some(value) => value.trim().parse().map_err(|_| {
            BridgeError::configuration_with_key(
                format!("Invalid {} '{}': expected true or false", key, value),
                key,
            )
        }),
    }
}

fn monitoring_from_properties(properties: &HashMap<String, String>) -> BridgeResult<MonitoringConfig> {
    Ok(MonitoringConfig {
        events: parse_flag(properties, MONITORING_EVENTS_KEY)?,
        meters: parse_flag(properties, MONITORING_METERS_KEY)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(entries: &[(&str, &str)]) -> HashMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_consumer_from_properties() {
        let config = ConsumerConfig::from_properties(&props(&[
            (CONSUMER_QUEUES_KEY, "orders, invoices,,"),
            (MONITORING_EVENTS_KEY, "true"),
        ]))
        .unwrap();

        assert_eq!(config.queues, vec!["orders", "invoices"]);
        assert!(config.topics.is_empty());
        assert!(config.monitoring.events);
        assert!(!config.monitoring.meters);
    }

    #[test]
    fn test_both_kinds_parse_without_validation() {
        let config = ConsumerConfig::from_properties(&props(&[
            (CONSUMER_QUEUES_KEY, "orders"),
            (CONSUMER_TOPICS_KEY, "prices"),
        ]))
        .unwrap();

        assert_eq!(config.queues, vec!["orders"]);
        assert_eq!(config.topics, vec!["prices"]);
    }

    #[test]
    fn test_invalid_flag() {
        let error =
            ProducerConfig::from_properties(&props(&[(MONITORING_METERS_KEY, "yes")])).unwrap_err();
        match error {
            BridgeError::Configuration { config_key, .. } => {
                assert_eq!(config_key.as_deref(), Some(MONITORING_METERS_KEY))
            }
            other => panic!("expected configuration error, got {:?}", other),
        }
    }

    #[test]
    fn test_from_toml() {
        let config = ConsumerConfig::from_toml_str(
            r#"
            topics = ["prices"]

            [monitoring]
            meters = true
            "#,
        )
        .unwrap();

        assert_eq!(config.topics, vec!["prices"]);
        assert!(config.monitoring.meters);
        assert!(!config.monitoring.events);

        let producer = ProducerConfig::from_toml_str("").unwrap();
        assert_eq!(producer, ProducerConfig::default());
    }
}
