//! Process configuration
//!
//! Read once at startup from the command line and environment:
//!
//! | source              | setting                        | default        |
//! |---------------------|--------------------------------|----------------|
//! | first CLI argument  | bind address                   |                |
//! | `SERVER_ADDRESS`    | bind address                   | `0.0.0.0:8080` |
//! | `MAILBOX_CAPACITY`  | per-connection outbound queue  | 256            |
//! | `ROOM_INBOX_CAPACITY` | per-room command queue       | 256            |
//! | `ECHO_TO_SENDER`    | deliver chat back to sender    | `false`        |

use std::env;
use std::str::FromStr;

use tracing::warn;

use crate::room::{EchoPolicy, RoomConfig};

/// Default bind address
pub const DEFAULT_ADDR: &str = "0.0.0.0:8080";

/// Default outbound mailbox size per connection
pub const DEFAULT_MAILBOX_CAPACITY: usize = 256;

/// Default command queue size per room
pub const DEFAULT_ROOM_INBOX_CAPACITY: usize = 256;

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub addr: String,
    pub mailbox_capacity: usize,
    pub room: RoomConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            room: RoomConfig {
                inbox_capacity: DEFAULT_ROOM_INBOX_CAPACITY,
                echo: EchoPolicy::SkipSender,
            },
        }
    }
}

impl Config {
    /// Load from the process arguments and environment
    pub fn load() -> Self {
        Self::from_sources(env::args().nth(1), |key| env::var(key).ok())
    }

    /// Load from an explicit address argument and variable lookup
    pub fn from_sources<F>(arg_addr: Option<String>, var: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let addr = arg_addr
            .or_else(|| var("SERVER_ADDRESS"))
            .filter(|a| !a.is_empty())
            .unwrap_or(defaults.addr);

        let mailbox_capacity = parse_var(&var, "MAILBOX_CAPACITY", defaults.mailbox_capacity);
        let inbox_capacity = parse_var(&var, "ROOM_INBOX_CAPACITY", defaults.room.inbox_capacity);
        let echo = if parse_var(&var, "ECHO_TO_SENDER", false) {
            EchoPolicy::IncludeSender
        } else {
            EchoPolicy::SkipSender
        };

        Self {
            addr,
            mailbox_capacity,
            room: RoomConfig {
                inbox_capacity,
                echo,
            },
        }
    }
}

fn parse_var<F, T>(var: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Copy,
{
    match var(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Ignoring invalid {}={:?}", key, raw);
            default
        }),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_sources(None, vars(&[]));
        assert_eq!(config.addr, DEFAULT_ADDR);
        assert_eq!(config.mailbox_capacity, 256);
        assert_eq!(config.room.inbox_capacity, 256);
        assert_eq!(config.room.echo, EchoPolicy::SkipSender);
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::from_sources(
            None,
            vars(&[
                ("SERVER_ADDRESS", "127.0.0.1:9000"),
                ("MAILBOX_CAPACITY", "16"),
                ("ECHO_TO_SENDER", "true"),
            ]),
        );
        assert_eq!(config.addr, "127.0.0.1:9000");
        assert_eq!(config.mailbox_capacity, 16);
        assert_eq!(config.room.echo, EchoPolicy::IncludeSender);
    }

    #[test]
    fn test_argument_beats_env() {
        let config = Config::from_sources(
            Some("127.0.0.1:7000".to_string()),
            vars(&[("SERVER_ADDRESS", "127.0.0.1:9000")]),
        );
        assert_eq!(config.addr, "127.0.0.1:7000");
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = Config::from_sources(
            None,
            vars(&[("MAILBOX_CAPACITY", "lots"), ("ECHO_TO_SENDER", "maybe")]),
        );
        assert_eq!(config.mailbox_capacity, DEFAULT_MAILBOX_CAPACITY);
        assert_eq!(config.room.echo, EchoPolicy::SkipSender);
    }
}
