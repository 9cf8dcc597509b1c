use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::{Error, Result};

/// Broker settings for the MQTT side of the gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttSettings {
    /// Broker host name or address
    pub host: String,
    /// Broker port
    pub port: u16,
    /// Client identifier presented to the broker
    pub client_id: String,
    /// Prefix of outbound value topics
    pub topic_out: String,
    /// Prefix of inbound write-command topics
    pub topic_in: String,
    /// MQTT keep-alive interval
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub keep_alive: Duration,
}

impl Default for MqttSettings {
    fn default() -> Self {
        MqttSettings {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "bacnet-gateway".to_string(),
            topic_out: "bacnet-out".to_string(),
            topic_in: "bacnet-in".to_string(),
            keep_alive: Duration::from_secs(60),
        }
    }
}

/// Configuration for the gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Verbose logging of discovery and subscription traffic
    pub debug: bool,
    /// Messaging fabric settings
    pub mqtt: MqttSettings,
    /// Upper bound on a single network receive
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub receive_timeout: Duration,
    /// Period of the engine's transaction timers
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub engine_timer_interval: Duration,
    /// Period of the engine's datalink maintenance
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub maintenance_interval: Duration,
    /// Period of the subscription renewal sweep
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub renewal_interval: Duration,
    /// Subscriptions expiring within this margin are renewed
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub renewal_margin: Duration,
    /// Lifetime requested for every COV subscription
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub subscription_lifetime: Duration,
    /// Engine APDU timeout, one input of the Who-Is cadence
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub apdu_timeout: Duration,
    /// Engine APDU retries, the other input of the Who-Is cadence
    pub apdu_retries: u32,
    /// Re-issue a discovery step whose reply has not arrived within this time
    #[serde(serialize_with = "super::serde::serialize_opt_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_opt_duration")]
    pub step_timeout: Option<Duration>,
    /// Capacity of the inbound write-command queue
    pub command_queue_capacity: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            debug: false,
            mqtt: MqttSettings::default(),
            receive_timeout: Duration::from_millis(100),
            engine_timer_interval: Duration::from_millis(100),
            maintenance_interval: Duration::from_secs(1),
            renewal_interval: Duration::from_secs(5),
            renewal_margin: Duration::from_secs(60),
            subscription_lifetime: Duration::from_secs(300),
            apdu_timeout: Duration::from_millis(3000),
            apdu_retries: 3,
            step_timeout: Some(Duration::from_secs(30)),
            command_queue_capacity: 64,
        }
    }
}

impl BridgeConfig {
    /// Builds the configuration from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = BridgeConfig::default();

        config.debug = lookup("BACNET_DEBUG").is_some();
        if let Some(host) = lookup("MQTT_HOST") {
            config.mqtt.host = host;
        }
        if let Some(port) = parse_var(&lookup, "MQTT_PORT")? {
            config.mqtt.port = port;
        }
        if let Some(client_id) = lookup("MQTT_CLIENT_ID") {
            config.mqtt.client_id = client_id;
        }
        if let Some(prefix) = lookup("MQTT_TOPIC_OUT") {
            config.mqtt.topic_out = prefix.trim_end_matches('/').to_string();
        }
        if let Some(prefix) = lookup("MQTT_TOPIC_IN") {
            config.mqtt.topic_in = prefix.trim_end_matches('/').to_string();
        }
        if let Some(millis) = parse_var::<u64, _>(&lookup, "BACNET_APDU_TIMEOUT")? {
            config.apdu_timeout = Duration::from_millis(millis);
        }
        if let Some(retries) = parse_var(&lookup, "BACNET_APDU_RETRIES")? {
            config.apdu_retries = retries;
        }

        config.validate()?;
        Ok(config)
    }

    /// Interval between Who-Is broadcasts
    pub fn who_is_interval(&self) -> Duration {
        self.apdu_timeout * self.apdu_retries.max(1) * 10
    }

    /// Subscription lifetime in whole seconds, as sent on the wire
    pub fn lifetime_secs(&self) -> u32 {
        self.subscription_lifetime.as_secs().min(u32::MAX as u64) as u32
    }

    /// Checks the configuration for values the gateway cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.mqtt.topic_out.is_empty() || self.mqtt.topic_in.is_empty() {
            return Err(Error::config("topic prefixes must not be empty"));
        }
        let wildcard = |c: char| c == '+' || c == '#';
        if self.mqtt.topic_out.contains(wildcard) || self.mqtt.topic_in.contains(wildcard) {
            return Err(Error::config("topic prefixes must not contain wildcards"));
        }
        if self.renewal_interval.is_zero() || self.receive_timeout.is_zero() {
            return Err(Error::config("renewal interval and receive timeout must be non-zero"));
        }
        if self.subscription_lifetime <= self.renewal_margin {
            return Err(Error::config(
                "subscription lifetime must exceed the renewal margin",
            ));
        }
        if self.command_queue_capacity == 0 {
            return Err(Error::config("command queue capacity must be non-zero"));
        }
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::config(format!("{}={:?}: {}", key, raw, e))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::from_lookup(lookup_from(&[])).unwrap();
        assert!(!config.debug);
        assert_eq!(config.mqtt.host, "localhost");
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.lifetime_secs(), 300);
        assert_eq!(config.who_is_interval(), Duration::from_secs(90));
    }

    #[test]
    fn test_environment_overrides() {
        let config = BridgeConfig::from_lookup(lookup_from(&[
            ("BACNET_DEBUG", ""),
            ("MQTT_HOST", "192.168.1.105"),
            ("MQTT_PORT", "1884"),
            ("MQTT_TOPIC_OUT", "site/out/"),
            ("BACNET_APDU_TIMEOUT", "1000"),
            ("BACNET_APDU_RETRIES", "2"),
        ]))
        .unwrap();

        assert!(config.debug);
        assert_eq!(config.mqtt.host, "192.168.1.105");
        assert_eq!(config.mqtt.port, 1884);
        assert_eq!(config.mqtt.topic_out, "site/out");
        assert_eq!(config.mqtt.topic_in, "bacnet-in");
        assert_eq!(config.who_is_interval(), Duration::from_secs(20));
    }

    #[test]
    fn test_malformed_port() {
        let err = BridgeConfig::from_lookup(lookup_from(&[("MQTT_PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_wildcard_prefix_rejected() {
        let err = BridgeConfig::from_lookup(lookup_from(&[("MQTT_TOPIC_IN", "bacnet/#")])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_config_serialization() {
        let config = BridgeConfig::default();
        let serialized = serde_json::to_string(&config).unwrap();
        let deserialized: BridgeConfig = serde_json::from_str(&serialized).unwrap();

        assert_eq!(deserialized.renewal_margin, config.renewal_margin);
        assert_eq!(deserialized.step_timeout, config.step_timeout);
        assert_eq!(deserialized.mqtt.topic_in, config.mqtt.topic_in);
    }
}
