//! Connection profile and topic configuration for the TLS subscriber
//!
//! A [`ConnectionProfile`] is produced once at startup by a [`ProfileSource`]
//! and never mutated afterwards. Two sources exist: command-line flags
//! ([`crate::cli::SubscriberArgs`]) and compiled-in constants ([`StaticProfile`]).

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default broker host when none is supplied
pub const DEFAULT_BROKER_HOST: &str = "localhost";
/// Default broker port when none is supplied
pub const DEFAULT_BROKER_PORT: u16 = 1883;
/// CA certificate path used by the constant-sourced profile
pub const DEFAULT_CERTIFICATE_PATH: &str = "ssl_cert.crt";
/// Client identifier used by the constant-sourced profile
pub const STATIC_CLIENT_ID: &str = "static-subscriber";

/// Example device topics subscribed when no topics file is given
pub const DEVICE_TOPICS: [&str; 3] = [
    "topic/device/temperature",
    "topic/device/speed",
    "topic/device/pressure",
];

/// Highest QoS level defined by MQTT
pub const MAX_QOS: u8 = 2;

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read topics file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid QoS {qos} for topic '{topic}' (expected 0, 1 or 2)")]
    InvalidQos { topic: String, qos: u8 },
    #[error("Invalid topic filter: '{0}'")]
    InvalidTopic(String),
    #[error("Topic set is empty")]
    NoTopics,
}

/// Ordered mapping from topic filter to requested QoS level
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicSet {
    topics: BTreeMap<String, u8>,
}

#[derive(Debug, Deserialize)]
struct TopicsFile {
    #[serde(default)]
    topics: BTreeMap<String, u8>,
}

impl TopicSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The three example device topics, all at QoS 0
    pub fn device_defaults() -> Self {
        let mut set = Self::new();
        for topic in DEVICE_TOPICS {
            set.topics.insert(topic.to_string(), 0);
        }
        set
    }

    /// Load a topic set from a TOML file with a `[topics]` table
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let file: TopicsFile = toml::from_str(content)?;

        let mut set = Self::new();
        for (topic, qos) in file.topics {
            set.insert(topic, qos)?;
        }

        if set.is_empty() {
            return Err(ConfigError::NoTopics);
        }
        Ok(set)
    }

    /// Add or replace a topic, validating the filter syntax and QoS level
    pub fn insert(&mut self, topic: impl Into<String>, qos: u8) -> Result<(), ConfigError> {
        let topic = topic.into();
        if qos > MAX_QOS {
            return Err(ConfigError::InvalidQos { topic, qos });
        }
        if !is_valid_topic_filter(&topic) {
            return Err(ConfigError::InvalidTopic(topic));
        }
        self.topics.insert(topic, qos);
        Ok(())
    }

    pub fn get(&self, topic: &str) -> Option<u8> {
        self.topics.get(topic).copied()
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    /// Topics in sorted order with their QoS
    pub fn iter(&self) -> impl Iterator<Item = (&str, u8)> {
        self.topics.iter().map(|(topic, qos)| (topic.as_str(), *qos))
    }
}

impl fmt::Display for TopicSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (index, (topic, qos)) in self.iter().enumerate() {
            if index > 0 {
                write!(f, " ")?;
            }
            write!(f, "{topic}:{qos}")?;
        }
        write!(f, "]")
    }
}

/// Check MQTT topic filter syntax: non-empty, `+` occupies a whole level,
/// `#` occupies the whole last level.
pub fn is_valid_topic_filter(filter: &str) -> bool {
    if filter.is_empty() {
        return false;
    }

    let levels: Vec<&str> = filter.split('/').collect();
    let last = levels.len() - 1;
    levels.iter().enumerate().all(|(index, level)| {
        if level.contains('#') {
            *level == "#" && index == last
        } else if level.contains('+') {
            *level == "+"
        } else {
            true
        }
    })
}

/// Everything needed to open the broker session
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionProfile {
    pub broker_host: String,
    pub broker_port: u16,
    pub username: String,
    pub password: String,
    pub client_id: String,
    pub certificate_path: PathBuf,
    pub topics: TopicSet,
}

impl ConnectionProfile {
    /// `host:port` form of the broker address
    pub fn broker_address(&self) -> String {
        format!("{}:{}", self.broker_host, self.broker_port)
    }

    pub fn has_credentials(&self) -> bool {
        !self.username.is_empty()
    }
}

impl fmt::Debug for ConnectionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionProfile")
            .field("broker_host", &self.broker_host)
            .field("broker_port", &self.broker_port)
            .field("username", &self.username)
            .field("password", &if self.password.is_empty() { "" } else { "***" })
            .field("client_id", &self.client_id)
            .field("certificate_path", &self.certificate_path)
            .field("topics", &self.topics)
            .finish()
    }
}

/// A way of building the connection profile at startup
pub trait ProfileSource {
    fn load_profile(&self) -> Result<ConnectionProfile, ConfigError>;
}

/// Profile assembled from compiled-in constants
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticProfile {
    pub broker_host: &'static str,
    pub broker_port: u16,
    pub username: &'static str,
    pub password: &'static str,
    pub client_id: &'static str,
    pub certificate_path: &'static str,
}

impl Default for StaticProfile {
    fn default() -> Self {
        Self {
            broker_host: DEFAULT_BROKER_HOST,
            broker_port: DEFAULT_BROKER_PORT,
            username: "",
            password: "",
            client_id: STATIC_CLIENT_ID,
            certificate_path: DEFAULT_CERTIFICATE_PATH,
        }
    }
}

impl ProfileSource for StaticProfile {
    fn load_profile(&self) -> Result<ConnectionProfile, ConfigError> {
        Ok(ConnectionProfile {
            broker_host: self.broker_host.to_string(),
            broker_port: self.broker_port,
            username: self.username.to_string(),
            password: self.password.to_string(),
            client_id: self.client_id.to_string(),
            certificate_path: PathBuf::from(self.certificate_path),
            topics: TopicSet::device_defaults(),
        })
    }
}
