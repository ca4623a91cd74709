//! Pool and cluster configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

use crate::error::{HBaseError, Result};

/// Connection pool configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Connections opened when the pool is constructed.
    #[serde(default = "default_initial_size")]
    pub initial_size: usize,
    /// Maximum number of connections (idle + active).
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    /// Maximum idle connections kept on release. Defaults to `max_size`.
    #[serde(default)]
    pub max_idle: Option<usize>,
    /// How long `acquire` waits on a saturated pool. `None` waits forever.
    #[serde(with = "optional_secs", default = "default_acquire_timeout")]
    pub acquire_timeout: Option<Duration>,
    /// Interval between dead-connection scans.
    #[serde(with = "humantime_serde", default = "default_health_check_interval")]
    pub health_check_interval: Duration,
    /// Connect attempts before the factory error is surfaced.
    #[serde(default = "default_create_attempts")]
    pub create_attempts: u32,
    /// Delay between connect attempts.
    #[serde(with = "millis_serde", default = "default_create_retry_delay")]
    pub create_retry_delay: Duration,
}

fn default_initial_size() -> usize {
    20
}

fn default_max_size() -> usize {
    20
}

fn default_acquire_timeout() -> Option<Duration> {
    Some(Duration::from_secs(30))
}

fn default_health_check_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_create_attempts() -> u32 {
    5
}

fn default_create_retry_delay() -> Duration {
    Duration::from_millis(100)
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            initial_size: default_initial_size(),
            max_size: default_max_size(),
            max_idle: None,
            acquire_timeout: default_acquire_timeout(),
            health_check_interval: default_health_check_interval(),
            create_attempts: default_create_attempts(),
            create_retry_delay: default_create_retry_delay(),
        }
    }
}

impl PoolConfig {
    /// Create a configuration with the given initial and maximum sizes.
    pub fn new(initial_size: usize, max_size: usize) -> Self {
        Self {
            initial_size,
            max_size,
            ..Default::default()
        }
    }

    /// Create a builder.
    pub fn builder() -> PoolConfigBuilder {
        PoolConfigBuilder::new()
    }

    /// Load configuration from environment variables.
    ///
    /// Unset variables keep their defaults; unparsable ones are an error.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(size) = env_parse::<usize>("HBASE_POOL_INITIAL_SIZE")? {
            config.initial_size = size;
        }
        if let Some(size) = env_parse::<usize>("HBASE_POOL_MAX_SIZE")? {
            config.max_size = size;
        }
        if let Some(size) = env_parse::<usize>("HBASE_POOL_MAX_IDLE")? {
            config.max_idle = Some(size);
        }
        if let Some(secs) = env_parse::<u64>("HBASE_POOL_ACQUIRE_TIMEOUT")? {
            config.acquire_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(secs) = env_parse::<u64>("HBASE_POOL_HEALTH_CHECK_INTERVAL")? {
            config.health_check_interval = Duration::from_secs(secs);
        }
        if let Some(attempts) = env_parse::<u32>("HBASE_POOL_CREATE_ATTEMPTS")? {
            config.create_attempts = attempts;
        }
        if let Some(ms) = env_parse::<u64>("HBASE_POOL_CREATE_RETRY_DELAY_MS")? {
            config.create_retry_delay = Duration::from_millis(ms);
        }

        Ok(config)
    }

    /// Effective idle ceiling used on release.
    pub fn idle_ceiling(&self) -> usize {
        self.max_idle.unwrap_or(self.max_size).min(self.max_size)
    }

    /// Check the configuration and normalize what can be normalized.
    ///
    /// `initial_size` above `max_size` is clamped rather than rejected.
    pub fn validated(mut self) -> Result<Self> {
        if self.max_size == 0 {
            return Err(HBaseError::Config("max_size must be at least 1".into()));
        }
        if self.health_check_interval.is_zero() {
            return Err(HBaseError::Config(
                "health_check_interval must be greater than zero".into(),
            ));
        }
        if self.initial_size > self.max_size {
            warn!(
                initial_size = self.initial_size,
                max_size = self.max_size,
                "initial_size exceeds max_size, clamping"
            );
            self.initial_size = self.max_size;
        }
        Ok(self)
    }
}

/// Builder for pool configuration.
#[derive(Default)]
pub struct PoolConfigBuilder {
    config: PoolConfig,
}

impl PoolConfigBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            config: PoolConfig::default(),
        }
    }

    /// Set the initial pool size.
    pub fn initial_size(mut self, size: usize) -> Self {
        self.config.initial_size = size;
        self
    }

    /// Set the maximum pool size.
    pub fn max_size(mut self, size: usize) -> Self {
        self.config.max_size = size;
        self
    }

    /// Set the idle ceiling.
    pub fn max_idle(mut self, size: usize) -> Self {
        self.config.max_idle = Some(size);
        self
    }

    /// Set the acquire deadline.
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.config.acquire_timeout = Some(timeout);
        self
    }

    /// Wait indefinitely on a saturated pool.
    pub fn no_acquire_timeout(mut self) -> Self {
        self.config.acquire_timeout = None;
        self
    }

    /// Set the health check interval.
    pub fn health_check_interval(mut self, interval: Duration) -> Self {
        self.config.health_check_interval = interval;
        self
    }

    /// Set the connect retry budget.
    pub fn create_attempts(mut self, attempts: u32) -> Self {
        self.config.create_attempts = attempts;
        self
    }

    /// Set the delay between connect attempts.
    pub fn create_retry_delay(mut self, delay: Duration) -> Self {
        self.config.create_retry_delay = delay;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> PoolConfig {
        self.config
    }
}

/// HBase cluster settings handed to a concrete connection factory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HBaseConfig {
    /// ZooKeeper quorum (comma separated hosts).
    pub zookeeper_quorum: String,
    /// ZooKeeper client port.
    pub zookeeper_client_port: u16,
    /// Root znode for HBase.
    pub znode_parent: String,
    /// HBase master address.
    pub master: Option<String>,
}

impl Default for HBaseConfig {
    fn default() -> Self {
        Self {
            zookeeper_quorum: "localhost".to_string(),
            zookeeper_client_port: 2181,
            znode_parent: "/hbase".to_string(),
            master: None,
        }
    }
}

impl HBaseConfig {
    /// Create a configuration for the given quorum.
    pub fn new(zookeeper_quorum: impl Into<String>) -> Self {
        Self {
            zookeeper_quorum: zookeeper_quorum.into(),
            ..Default::default()
        }
    }

    /// Load cluster settings from environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(quorum) = std::env::var("HBASE_ZOOKEEPER_QUORUM") {
            config.zookeeper_quorum = quorum;
        }
        if let Some(port) = env_parse::<u16>("HBASE_ZOOKEEPER_CLIENT_PORT")? {
            config.zookeeper_client_port = port;
        }
        if let Ok(znode) = std::env::var("HBASE_ZNODE_PARENT") {
            config.znode_parent = znode;
        }
        if let Ok(master) = std::env::var("HBASE_MASTER") {
            config.master = Some(master);
        }

        Ok(config)
    }

    /// Set the ZooKeeper client port.
    pub fn zookeeper_client_port(mut self, port: u16) -> Self {
        self.zookeeper_client_port = port;
        self
    }

    /// Set the parent znode.
    pub fn znode_parent(mut self, znode: impl Into<String>) -> Self {
        self.znode_parent = znode.into();
        self
    }

    /// Set the master address.
    pub fn master(mut self, master: impl Into<String>) -> Self {
        self.master = Some(master.into());
        self
    }

    /// Client properties in the key format HBase clients expect.
    pub fn to_properties(&self) -> HashMap<String, String> {
        let mut props = HashMap::new();
        props.insert("hbase.zookeeper.quorum".to_string(), self.zookeeper_quorum.clone());
        props.insert(
            "hbase.zookeeper.property.clientPort".to_string(),
            self.zookeeper_client_port.to_string(),
        );
        props.insert("zookeeper.znode.parent".to_string(), self.znode_parent.clone());
        if let Some(master) = &self.master {
            props.insert("hbase.master".to_string(), master.clone());
        }
        props
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| HBaseError::Config(format!("Invalid {}: {:?}", key, value))),
        Err(_) => Ok(None),
    }
}

mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

mod optional_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.map(|d| d.as_secs()).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}

mod millis_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        u64::try_from(duration.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.initial_size, 20);
        assert_eq!(config.max_size, 20);
        assert_eq!(config.idle_ceiling(), 20);
        assert_eq!(config.create_attempts, 5);
        assert_eq!(config.create_retry_delay, Duration::from_millis(100));
        assert_eq!(config.health_check_interval, Duration::from_secs(10));
    }

    #[test]
    fn test_builder() {
        let config = PoolConfig::builder()
            .initial_size(2)
            .max_size(8)
            .max_idle(4)
            .no_acquire_timeout()
            .build();

        assert_eq!(config.initial_size, 2);
        assert_eq!(config.max_size, 8);
        assert_eq!(config.idle_ceiling(), 4);
        assert_eq!(config.acquire_timeout, None);
    }

    #[test]
    fn test_idle_ceiling_clamped_to_max_size() {
        let config = PoolConfig::builder().max_size(3).max_idle(10).build();
        assert_eq!(config.idle_ceiling(), 3);
    }

    #[test]
    fn test_validation() {
        assert!(matches!(
            PoolConfig::new(0, 0).validated(),
            Err(HBaseError::Config(_))
        ));

        let clamped = PoolConfig::new(5, 2).validated().unwrap();
        assert_eq!(clamped.initial_size, 2);

        let zero_interval = PoolConfig::builder()
            .health_check_interval(Duration::ZERO)
            .build();
        assert!(zero_interval.validated().is_err());
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: PoolConfig =
            serde_json::from_str(r#"{"initial_size": 1, "max_size": 4, "acquire_timeout": null}"#)
                .unwrap();
        assert_eq!(config.initial_size, 1);
        assert_eq!(config.max_size, 4);
        assert_eq!(config.acquire_timeout, None);
        assert_eq!(config.create_attempts, 5);
    }

    #[test]
    fn test_retry_delay_serializes_as_millis() {
        let config = PoolConfig::builder()
            .create_retry_delay(Duration::from_millis(250))
            .build();
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["create_retry_delay"], 250);

        let huge = PoolConfig::builder().create_retry_delay(Duration::MAX).build();
        let json = serde_json::to_value(&huge).unwrap();
        assert_eq!(json["create_retry_delay"], u64::MAX);
    }

    #[test]
    fn test_hbase_properties() {
        let config = HBaseConfig::new("zk1,zk2,zk3")
            .zookeeper_client_port(2182)
            .master("hmaster:16000");
        let props = config.to_properties();

        assert_eq!(props["hbase.zookeeper.quorum"], "zk1,zk2,zk3");
        assert_eq!(props["hbase.zookeeper.property.clientPort"], "2182");
        assert_eq!(props["zookeeper.znode.parent"], "/hbase");
        assert_eq!(props["hbase.master"], "hmaster:16000");
    }

    #[test]
    fn test_hbase_properties_without_master() {
        let props = HBaseConfig::default().to_properties();
        assert!(!props.contains_key("hbase.master"));
    }
}
