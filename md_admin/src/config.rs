//! Admin tool configuration.
//!
//! Consolidates all environment variable reads and provides validated configuration.

use matchday::{ActorId, PointsTable, db::DatabaseConfig};

/// Complete admin configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct AdminConfig {
    /// Database configuration
    pub database: DatabaseConfig,
    /// Identity checked against the `admins` table
    pub actor: ActorId,
    /// Ranking points awarded on completion
    pub points: PointsTable,
}

impl AdminConfig {
    /// Load configuration from environment variables
    ///
    /// # Arguments
    ///
    /// * `database_url_override` - Optional database URL override (from CLI args)
    /// * `actor_override` - Optional actor id override (from CLI args)
    ///
    /// # Errors
    ///
    /// Returns error if `MD_ACTOR_ID` is missing or not a number
    pub fn from_env(
        database_url_override: Option<String>,
        actor_override: Option<ActorId>,
    ) -> Result<Self, ConfigError> {
        let mut database = DatabaseConfig::from_env();
        if let Some(url) = database_url_override {
            database.database_url = url;
        }

        let actor = match actor_override {
            Some(actor) => actor,
            None => {
                let raw = std::env::var("MD_ACTOR_ID").map_err(|_| ConfigError::MissingRequired {
                    var: "MD_ACTOR_ID".to_string(),
                    hint: "Set it to your user id from the admins table, or pass --actor".to_string(),
                })?;
                raw.parse().map_err(|_| ConfigError::Invalid {
                    var: "MD_ACTOR_ID".to_string(),
                    reason: format!("'{raw}' is not an integer"),
                })?
            }
        };

        Ok(AdminConfig {
            database,
            actor,
            points: PointsTable::from_env(),
        })
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.actor <= 0 {
            return Err(ConfigError::Invalid {
                var: "MD_ACTOR_ID".to_string(),
                reason: "Must be a positive user id".to_string(),
            });
        }

        if !self.database.database_url.starts_with("postgres://")
            && !self.database.database_url.starts_with("postgresql://")
        {
            return Err(ConfigError::Invalid {
                var: "DATABASE_URL".to_string(),
                reason: "Must be a postgres:// connection string".to_string(),
            });
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigError::Invalid {
                var: "DB_MIN_CONNECTIONS".to_string(),
                reason: format!(
                    "Cannot exceed max connections ({})",
                    self.database.max_connections
                ),
            });
        }

        let points = &self.points;
        if points.winner < points.runner_up || points.runner_up < points.semi_finalist {
            return Err(ConfigError::Invalid {
                var: "MD_POINTS_WINNER".to_string(),
                reason: format!(
                    "Points must not increase with lower places (winner {}, runner-up {}, semi-finalist {})",
                    points.winner, points.runner_up, points.semi_finalist
                ),
            });
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}\nHint: {hint}")]
    MissingRequired { var: String, hint: String },

    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AdminConfig {
        AdminConfig {
            database: DatabaseConfig::development(),
            actor: 7,
            points: PointsTable::default(),
        }
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::MissingRequired {
            var: "MD_ACTOR_ID".to_string(),
            hint: "Use --actor".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("MD_ACTOR_ID"));
        assert!(msg.contains("Use --actor"));
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn test_actor_override_skips_env() {
        let loaded = AdminConfig::from_env(Some("postgres://localhost/md".to_string()), Some(3))
            .unwrap();
        assert_eq!(loaded.actor, 3);
        assert_eq!(loaded.database.database_url, "postgres://localhost/md");
    }

    #[test]
    fn test_config_validation_actor() {
        let mut bad = config();
        bad.actor = 0;
        assert!(matches!(bad.validate().unwrap_err(), ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_config_validation_points_order() {
        let mut bad = config();
        bad.points.runner_up = 20;
        let err = bad.validate().unwrap_err();
        assert!(err.to_string().contains("MD_POINTS_WINNER"));
    }

    #[test]
    fn test_config_validation_database_url() {
        let mut bad = config();
        bad.database.database_url = "mysql://localhost/md".to_string();
        assert!(matches!(bad.validate().unwrap_err(), ConfigError::Invalid { .. }));
    }
}
