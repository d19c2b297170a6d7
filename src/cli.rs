//! Command-line flags for the flag-driven subscriber
//!
//! Flags keep their historical spellings (`-U`, `-P`, `-u`, `-p`, `-cid`,
//! `-cert`). The two multi-letter single-dash flags are rewritten to their
//! `--` forms before clap sees argv, see [`normalize_single_dash_flags`].

use crate::config::{
    ConfigError, ConnectionProfile, ProfileSource, TopicSet, DEFAULT_BROKER_HOST,
    DEFAULT_BROKER_PORT,
};
use clap::Parser;
use std::ffi::OsString;
use std::path::PathBuf;

/// Multi-letter flags that are accepted with a single leading dash
const SINGLE_DASH_LONG_FLAGS: [&str; 2] = ["cid", "cert"];

/// Flags whose value is the following argument, after normalization
const VALUE_FLAGS: [&str; 11] = [
    "-U",
    "-P",
    "-u",
    "-p",
    "--broker",
    "--port",
    "--username",
    "--password",
    "--cid",
    "--cert",
    "--topics",
];

/// MQTT subscriber that trusts a single CA over TLS
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "tls-subscriber")]
#[command(about = "Subscribe to MQTT topics over TLS and log every received message")]
#[command(version)]
pub struct SubscriberArgs {
    /// MQTT broker host
    #[arg(
        short = 'U',
        long = "broker",
        env = "MQTT_BROKER_HOST",
        default_value = DEFAULT_BROKER_HOST
    )]
    pub broker_host: String,

    /// MQTT broker port
    #[arg(
        short = 'P',
        long = "port",
        env = "MQTT_BROKER_PORT",
        default_value_t = DEFAULT_BROKER_PORT
    )]
    pub broker_port: u16,

    /// MQTT username
    #[arg(
        short = 'u',
        long = "username",
        env = "MQTT_USERNAME",
        allow_hyphen_values = true
    )]
    pub username: Option<String>,

    /// MQTT password
    #[arg(
        short = 'p',
        long = "password",
        env = "MQTT_PASSWORD",
        hide_env_values = true,
        allow_hyphen_values = true
    )]
    pub password: Option<String>,

    /// Client identifier (generated when empty)
    #[arg(long = "cid", env = "MQTT_CLIENT_ID", allow_hyphen_values = true)]
    pub client_id: Option<String>,

    /// Path to the PEM-encoded CA certificate that signs the broker certificate
    #[arg(long = "cert", env = "MQTT_CA_CERT", value_name = "FILE")]
    pub certificate_path: Option<PathBuf>,

    /// TOML file with a [topics] table replacing the default device topics
    #[arg(long = "topics", env = "MQTT_TOPICS_FILE", value_name = "FILE")]
    pub topics_file: Option<PathBuf>,
}

impl SubscriberArgs {
    /// Parse the process arguments, exiting with a usage error on failure
    pub fn parse_normalized() -> Self {
        Self::parse_from(normalize_single_dash_flags(std::env::args_os()))
    }

    pub fn try_parse_normalized<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        Self::try_parse_from(normalize_single_dash_flags(args))
    }
}

impl ProfileSource for SubscriberArgs {
    fn load_profile(&self) -> Result<ConnectionProfile, ConfigError> {
        let topics = match &self.topics_file {
            Some(path) => TopicSet::load_from_file(path)?,
            None => TopicSet::device_defaults(),
        };

        Ok(ConnectionProfile {
            broker_host: self.broker_host.clone(),
            broker_port: self.broker_port,
            username: self.username.clone().unwrap_or_default(),
            password: self.password.clone().unwrap_or_default(),
            client_id: self.client_id.clone().unwrap_or_default(),
            certificate_path: self.certificate_path.clone().unwrap_or_default(),
            topics,
        })
    }
}

/// Rewrite `-cid`/`-cert` (and their `=value` forms) to `--cid`/`--cert`.
///
/// The argument after a value-taking flag is its value and is never
/// rewritten, so `-p -cert` keeps `-cert` as the password. Everything after a
/// bare `--` passes through as well.
pub fn normalize_single_dash_flags<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let mut normalized = Vec::new();
    let mut value_expected = false;
    let mut options_ended = false;

    for arg in args.into_iter().map(Into::into) {
        if value_expected || options_ended {
            value_expected = false;
            normalized.push(arg);
            continue;
        }

        let arg = rewrite_single_dash_flag(arg);
        if let Some(text) = arg.to_str() {
            options_ended = text == "--";
            value_expected = VALUE_FLAGS.contains(&text);
        }
        normalized.push(arg);
    }
    normalized
}

fn rewrite_single_dash_flag(arg: OsString) -> OsString {
    let Some(text) = arg.to_str() else {
        return arg;
    };
    let Some(flag) = text.strip_prefix('-') else {
        return arg;
    };
    if flag.starts_with('-') {
        return arg;
    }

    let name = flag.split_once('=').map_or(flag, |(name, _)| name);
    if SINGLE_DASH_LONG_FLAGS.contains(&name) {
        OsString::from(format!("-{text}"))
    } else {
        arg
    }
}
