//! Training configuration.
//!
//! Values come from `SCALARGRAD_*` environment variables via [`from_env`],
//! falling back to [`Config::default`] for anything unset.

use thiserror::Error;

pub const ENV_PREFIX: &str = "SCALARGRAD_";
pub const ENV_SEED: &str = "SEED";
pub const ENV_LEARNING_RATE: &str = "LEARNING_RATE";
pub const ENV_NUM_STEPS: &str = "NUM_STEPS";
pub const ENV_LOG_EVERY: &str = "LOG_EVERY";
pub const ENV_DIMS: &str = "DIMS";

const DEFAULT_SEED: u64 = 3;
const DEFAULT_LEARNING_RATE: f64 = 0.1;
const DEFAULT_NUM_STEPS: usize = 300;
const DEFAULT_LOG_EVERY: usize = 50;
const DEFAULT_DIMS: [usize; 3] = [3, 4, 1];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("environment variable {key}: {message}")]
    EnvVar { key: String, message: String },

    #[error("cannot parse {key}={value:?}: {message}")]
    Parse {
        key: String,
        value: String,
        message: String,
    },

    #[error("config validation: {0}")]
    Validation(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// Seed for weight initialization.
    pub seed: u64,
    pub learning_rate: f64,
    pub num_steps: usize,
    /// Log the loss every this many steps (0 = never).
    pub log_every: usize,
    /// Layer dimensions, input width first.
    pub dims: Vec<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            learning_rate: DEFAULT_LEARNING_RATE,
            num_steps: DEFAULT_NUM_STEPS,
            log_every: DEFAULT_LOG_EVERY,
            dims: DEFAULT_DIMS.to_vec(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(ConfigError::Validation(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if self.dims.len() < 2 {
            return Err(ConfigError::Validation(
                "dims needs an input and at least one layer".to_string(),
            ));
        }
        if self.dims.contains(&0) {
            return Err(ConfigError::Validation(
                "dims must all be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[must_use]
pub fn env_key(suffix: &str) -> String {
    format!("{ENV_PREFIX}{suffix}")
}

fn env_string(key: &str) -> Result<Option<String>, ConfigError> {
    match std::env::var(key) {
        Ok(s) => Ok(Some(s)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(ConfigError::EnvVar {
            key: key.to_string(),
            message: e.to_string(),
        }),
    }
}

fn env_parsed<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let Some(s) = env_string(key)? else {
        return Ok(None);
    };
    s.parse().map(Some).map_err(|e: T::Err| ConfigError::Parse {
        key: key.to_string(),
        message: e.to_string(),
        value: s.clone(),
    })
}

/// Parses a comma separated dimension list such as `3,4,1`.
pub fn parse_dims(key: &str, value: &str) -> Result<Vec<usize>, ConfigError> {
    value
        .split(',')
        .map(|part| {
            part.trim().parse().map_err(|e: std::num::ParseIntError| ConfigError::Parse {
                key: key.to_string(),
                value: value.to_string(),
                message: e.to_string(),
            })
        })
        .collect()
}

pub fn from_env() -> Result<Config, ConfigError> {
    let default = Config::default();

    let seed = env_parsed(&env_key(ENV_SEED))?.unwrap_or(default.seed);
    let learning_rate =
        env_parsed(&env_key(ENV_LEARNING_RATE))?.unwrap_or(default.learning_rate);
    let num_steps = env_parsed(&env_key(ENV_NUM_STEPS))?.unwrap_or(default.num_steps);
    let log_every = env_parsed(&env_key(ENV_LOG_EVERY))?.unwrap_or(default.log_every);
    let dims_key = env_key(ENV_DIMS);
    let dims = match env_string(&dims_key)? {
        Some(value) => parse_dims(&dims_key, &value)?,
        None => default.dims,
    };

    Ok(Config {
        seed,
        learning_rate,
        num_steps,
        log_every,
        dims,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn lock() -> std::sync::MutexGuard<'static, ()> {
        ENV_LOCK
            .get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    #[test]
    fn default_config_is_valid() {
        let cfg = Config::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.dims, vec![3, 4, 1]);
        assert_eq!(cfg.num_steps, 300);
        assert_eq!(cfg.learning_rate, 0.1);
    }

    #[test]
    fn validate_rejects_bad_values() {
        for cfg in [
            Config {
                learning_rate: 0.0,
                ..Config::default()
            },
            Config {
                learning_rate: f64::NAN,
                ..Config::default()
            },
            Config {
                dims: vec![3],
                ..Config::default()
            },
            Config {
                dims: vec![3, 0, 1],
                ..Config::default()
            },
        ] {
            assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));
        }
    }

    #[test]
    fn parse_dims_accepts_spaces() {
        assert_eq!(parse_dims("K", "3, 4,1").unwrap(), vec![3, 4, 1]);
        assert!(matches!(
            parse_dims("K", "3,x"),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn from_env_falls_back_to_defaults() {
        let _g = lock();
        for suffix in [ENV_SEED, ENV_LEARNING_RATE, ENV_NUM_STEPS, ENV_LOG_EVERY, ENV_DIMS] {
            std::env::remove_var(env_key(suffix));
        }
        assert_eq!(from_env().unwrap(), Config::default());
    }

    #[test]
    fn from_env_overrides_with_env_vars() {
        let _g = lock();
        std::env::set_var(env_key(ENV_NUM_STEPS), "12");
        std::env::set_var(env_key(ENV_DIMS), "2,8,8,1");
        let cfg = from_env();
        std::env::remove_var(env_key(ENV_NUM_STEPS));
        std::env::remove_var(env_key(ENV_DIMS));

        let cfg = cfg.unwrap();
        assert_eq!(cfg.num_steps, 12);
        assert_eq!(cfg.dims, vec![2, 8, 8, 1]);
    }

    #[test]
    fn from_env_returns_error_on_invalid_parse() {
        let _g = lock();
        let key = env_key(ENV_SEED);
        std::env::set_var(&key, "not_a_number");
        let res = from_env();
        std::env::remove_var(&key);
        assert!(matches!(res, Err(ConfigError::Parse { .. })));
    }
}
