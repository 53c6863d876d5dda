//! Environment-driven configuration.

use mealflow_core::ActorId;
use thiserror::Error;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// `MEALFLOW_ADMINS` contained something that is not a numeric id.
    #[error("invalid admin id in MEALFLOW_ADMINS: {0}")]
    InvalidAdminId(String),

    /// `MEALFLOW_SEARCH_RADIUS_KM` was not a positive number.
    #[error("invalid MEALFLOW_SEARCH_RADIUS_KM: {0}")]
    InvalidRadius(String),
}

/// Assistant configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Actors allowed to create vendors directly and approve
    /// registrations.
    pub admins: Vec<ActorId>,
    /// Default radius for proximity search, in kilometres.
    pub search_radius_km: f64,
    /// Log filter directive, e.g. `info` or `mealflow_assistant=debug`.
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            admins: Vec::new(),
            search_radius_km: 10.0,
            log_filter: "info".to_string(),
        }
    }
}

impl Config {
    /// Loads configuration from the process environment.
    ///
    /// - `MEALFLOW_ADMINS`: comma-separated actor ids (optional)
    /// - `MEALFLOW_SEARCH_RADIUS_KM`: positive number (default 10)
    /// - `MEALFLOW_LOG`: log filter directive (default `info`)
    ///
    /// # Errors
    ///
    /// [`ConfigError`] when a variable is present but malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(raw) = get("MEALFLOW_ADMINS") {
            config.admins = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| {
                    s.parse::<i64>()
                        .map(ActorId)
                        .map_err(|_| ConfigError::InvalidAdminId(s.to_string()))
                })
                .collect::<Result<_, _>>()?;
        }

        if let Some(raw) = get("MEALFLOW_SEARCH_RADIUS_KM") {
            let radius: f64 = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidRadius(raw.clone()))?;
            if !radius.is_finite() || radius <= 0.0 {
                return Err(ConfigError::InvalidRadius(raw));
            }
            config.search_radius_km = radius;
        }

        if let Some(filter) = get("MEALFLOW_LOG") {
            config.log_filter = filter;
        }

        Ok(config)
    }

    /// Whether `actor` may create vendors and approve registrations.
    #[must_use]
    pub fn is_admin(&self, actor: ActorId) -> bool {
        self.admins.contains(&actor)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can unwrap
mod tests {
    use super::*;

    fn lookup<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| (*v).to_string())
        }
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = Config::from_lookup(|_| None).unwrap();
        assert!(config.admins.is_empty());
        assert!((config.search_radius_km - 10.0).abs() < f64::EPSILON);
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn admin_list_parses_and_gates() {
        let config = Config::from_lookup(lookup(&[("MEALFLOW_ADMINS", "1, 42,7")])).unwrap();
        assert!(config.is_admin(ActorId(42)));
        assert!(!config.is_admin(ActorId(2)));
    }

    #[test]
    fn malformed_values_are_rejected() {
        let err = Config::from_lookup(lookup(&[("MEALFLOW_ADMINS", "1,bob")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidAdminId(s) if s == "bob"));

        let err =
            Config::from_lookup(lookup(&[("MEALFLOW_SEARCH_RADIUS_KM", "-4")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRadius(_)));
    }
}
