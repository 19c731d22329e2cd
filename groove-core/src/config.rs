use std::{env, str::FromStr};

use thiserror::Error;

/// The configuration of the consensus engine
#[derive(Debug, Clone)]
pub struct Config {
    /// Share of room members that must skip-vote before the playing item is evicted
    pub skip_ratio: f32,
    /// How many join codes to try before giving up on creating a room
    pub join_code_attempts: usize,
    /// How long a login session stays valid
    pub session_duration_in_days: i64,
    /// The longest room name that is accepted
    pub max_room_name_length: usize,
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{variable} must be {expected}, got {value:?}")]
    Invalid {
        variable: &'static str,
        expected: &'static str,
        value: String,
    },
}

impl Config {
    pub const SKIP_RATIO_VAR: &'static str = "GROOVE_SKIP_RATIO";
    pub const JOIN_CODE_ATTEMPTS_VAR: &'static str = "GROOVE_JOIN_CODE_ATTEMPTS";
    pub const SESSION_DAYS_VAR: &'static str = "GROOVE_SESSION_DAYS";

    /// Returns the default config with any overrides found in the environment applied.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [Config::from_env], but reads variables through the given function.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(Self::SKIP_RATIO_VAR) {
            let ratio: f32 = parse(Self::SKIP_RATIO_VAR, "a number in (0, 1]", &value)?;

            if !(ratio > 0. && ratio <= 1.) {
                return Err(ConfigError::Invalid {
                    variable: Self::SKIP_RATIO_VAR,
                    expected: "a number in (0, 1]",
                    value,
                });
            }

            config.skip_ratio = ratio;
        }

        if let Some(value) = lookup(Self::JOIN_CODE_ATTEMPTS_VAR) {
            config.join_code_attempts =
                parse(Self::JOIN_CODE_ATTEMPTS_VAR, "a positive integer", &value)?;
        }

        if let Some(value) = lookup(Self::SESSION_DAYS_VAR) {
            config.session_duration_in_days =
                parse(Self::SESSION_DAYS_VAR, "a positive integer", &value)?;
        }

        Ok(config)
    }
}

fn parse<T: FromStr>(
    variable: &'static str,
    expected: &'static str,
    value: &str,
) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        variable,
        expected,
        value: value.to_string(),
    })
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // Half the room has to agree
            skip_ratio: 0.5,
            // 32^6 codes, collisions are rare even with many active rooms
            join_code_attempts: 16,
            session_duration_in_days: 7,
            max_room_name_length: 64,
        }
    }
}

#[cfg(test)]
mod test {
    use super::{Config, ConfigError};

    #[test]
    fn overrides_from_lookup() {
        let config = Config::from_lookup(|name| match name {
            Config::SKIP_RATIO_VAR => Some("0.75".to_string()),
            Config::SESSION_DAYS_VAR => Some("30".to_string()),
            _ => None,
        })
        .unwrap();

        assert_eq!(config.skip_ratio, 0.75);
        assert_eq!(config.session_duration_in_days, 30);
        assert_eq!(config.join_code_attempts, 16);
    }

    #[test]
    fn rejects_out_of_range_ratio() {
        let result = Config::from_lookup(|name| {
            (name == Config::SKIP_RATIO_VAR).then(|| "1.5".to_string())
        });

        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn rejects_garbage() {
        let result = Config::from_lookup(|name| {
            (name == Config::JOIN_CODE_ATTEMPTS_VAR).then(|| "lots".to_string())
        });

        assert_eq!(
            result.unwrap_err(),
            ConfigError::Invalid {
                variable: Config::JOIN_CODE_ATTEMPTS_VAR,
                expected: "a positive integer",
                value: "lots".to_string(),
            }
        );
    }
}
