use super::parsing::{
    env_flag, env_optional, env_or_default, env_parse, env_positive_i64, parse_cors_origins,
    parse_environment,
};
use super::types::{
    ApiSettings, AttemptSettings, ConfigError, CorsSettings, DatabaseSettings, FinalizeSettings,
    LeaderboardSettings, RedisSettings, RuntimeSettings, ServerHost, ServerPort, ServerSettings,
    Settings, TelemetrySettings,
};

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("TESTPREP_HOST", "0.0.0.0");
        let port = env_or_default("TESTPREP_PORT", "8000");

        let environment = parse_environment(
            env_optional("TESTPREP_ENV").or_else(|| env_optional("ENVIRONMENT")),
        );
        let strict_config = env_flag("TESTPREP_STRICT_CONFIG") || environment.is_production();

        let api = ApiSettings {
            project_name: env_or_default("PROJECT_NAME", "Testprep API"),
            version: env_or_default("VERSION", env!("CARGO_PKG_VERSION")),
            api_v1_str: env_or_default("API_V1_STR", "/api/v1"),
        };
        let cors =
            CorsSettings { origins: parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"))? };

        let database = DatabaseSettings {
            postgres_server: env_or_default("POSTGRES_SERVER", "localhost"),
            postgres_port: env_parse("POSTGRES_PORT", "5432")?,
            postgres_user: env_or_default("POSTGRES_USER", "testprep"),
            postgres_password: env_or_default("POSTGRES_PASSWORD", ""),
            postgres_db: env_or_default("POSTGRES_DB", "testprep_db"),
            database_url: env_optional("DATABASE_URL"),
        };

        let redis = RedisSettings {
            host: env_or_default("REDIS_HOST", "localhost"),
            port: env_parse("REDIS_PORT", "6379")?,
            db: env_parse("REDIS_DB", "0")?,
            password: env_or_default("REDIS_PASSWORD", ""),
        };

        let finalize = FinalizeSettings {
            grace_period_minutes: env_parse("FINALIZE_GRACE_PERIOD_MINUTES", "5")?,
            lock_ttl_seconds: env_parse("FINALIZE_LOCK_TTL_SECONDS", "60")?,
            poll_interval_seconds: env_parse("FINALIZE_POLL_INTERVAL_SECONDS", "5")?,
            max_retries: env_parse("FINALIZE_MAX_RETRIES", "5")?,
            retry_backoff_seconds: env_parse("FINALIZE_RETRY_BACKOFF_SECONDS", "30")?,
            stale_after_seconds: env_parse("FINALIZE_STALE_AFTER_SECONDS", "600")?,
            worker_concurrency: env_parse("FINALIZE_WORKER_CONCURRENCY", "2")?,
        };

        let attempt = AttemptSettings {
            start_delay_seconds: env_parse("ATTEMPT_START_DELAY_SECONDS", "60")?,
            end_slack_seconds: env_parse("ATTEMPT_END_SLACK_SECONDS", "30")?,
        };

        let leaderboard = LeaderboardSettings {
            default_limit: env_positive_i64("LEADERBOARD_DEFAULT_LIMIT", "100")?,
            max_limit: env_positive_i64("LEADERBOARD_MAX_LIMIT", "500")?,
        };

        let telemetry = TelemetrySettings {
            log_level: env_or_default("LOG_LEVEL", "info"),
            json: env_flag("LOG_JSON"),
            prometheus_enabled: env_flag("PROMETHEUS_ENABLED"),
        };

        let settings = Self {
            server: ServerSettings {
                host: ServerHost::parse(host)?,
                port: ServerPort::parse(port)?,
            },
            runtime: RuntimeSettings { environment, strict_config },
            api,
            cors,
            database,
            redis,
            finalize,
            attempt,
            leaderboard,
            telemetry,
        };

        settings.validate()?;
        Ok(settings)
    }

    pub(crate) fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host.0, self.server.port.0)
    }

    pub(crate) fn server_host(&self) -> &str {
        &self.server.host.0
    }

    pub(crate) fn server_port(&self) -> u16 {
        self.server.port.0
    }

    pub(crate) fn api(&self) -> &ApiSettings {
        &self.api
    }

    pub(crate) fn cors(&self) -> &CorsSettings {
        &self.cors
    }

    pub(crate) fn database(&self) -> &DatabaseSettings {
        &self.database
    }

    pub(crate) fn redis(&self) -> &RedisSettings {
        &self.redis
    }

    pub(crate) fn finalize(&self) -> &FinalizeSettings {
        &self.finalize
    }

    pub(crate) fn attempt(&self) -> &AttemptSettings {
        &self.attempt
    }

    pub(crate) fn leaderboard(&self) -> &LeaderboardSettings {
        &self.leaderboard
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.finalize.lock_ttl_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "FINALIZE_LOCK_TTL_SECONDS",
                value: "0".to_string(),
            });
        }

        if self.finalize.poll_interval_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "FINALIZE_POLL_INTERVAL_SECONDS",
                value: "0".to_string(),
            });
        }

        if self.finalize.worker_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                field: "FINALIZE_WORKER_CONCURRENCY",
                value: "0".to_string(),
            });
        }

        if self.leaderboard.default_limit > self.leaderboard.max_limit {
            return Err(ConfigError::InvalidValue {
                field: "LEADERBOARD_DEFAULT_LIMIT",
                value: self.leaderboard.default_limit.to_string(),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.database.database_url.is_none() && self.database.postgres_password.is_empty() {
            return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
        }

        Ok(())
    }
}
