use super::parsing::{
    env_optional, env_or_default, parse_bool, parse_cors_origins, parse_environment, parse_f64,
    parse_u16, parse_u32, parse_u64, parse_usize,
};
use super::types::{
    AiSettings, ApiSettings, ConfigError, CorsSettings, DatabaseSettings, EvaluationSettings,
    RuntimeSettings, ServerHost, ServerPort, ServerSettings, Settings, TelemetrySettings,
};
use crate::tasks::evaluation::EvaluationPolicy;

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("EVALUATOR_HOST", "0.0.0.0");
        let port = env_or_default("EVALUATOR_PORT", "8000");

        let environment = parse_environment(
            env_optional("EVALUATOR_ENV").or_else(|| env_optional("ENVIRONMENT")),
        );
        let strict_config = env_optional("EVALUATOR_STRICT_CONFIG")
            .map(|value| parse_bool(&value))
            .unwrap_or(false)
            || environment.is_production();

        let project_name = env_or_default("PROJECT_NAME", "AI Answer Evaluator");
        let version = env_or_default("VERSION", env!("CARGO_PKG_VERSION"));

        let cors_origins = parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"))?;

        let postgres_server = env_or_default("POSTGRES_SERVER", "localhost");
        let postgres_port = parse_u16("POSTGRES_PORT", env_or_default("POSTGRES_PORT", "5432"))?;
        let postgres_user = env_or_default("POSTGRES_USER", "evaluator");
        let postgres_password = env_or_default("POSTGRES_PASSWORD", "");
        let postgres_db = env_or_default("POSTGRES_DB", "answer_evaluator");
        let database_url = env_optional("DATABASE_URL");
        let max_connections = parse_u32(
            "DATABASE_MAX_CONNECTIONS",
            env_or_default("DATABASE_MAX_CONNECTIONS", "10"),
        )?;

        let openai_api_key = env_or_default("OPENAI_API_KEY", "");
        let openai_base_url = env_or_default("OPENAI_BASE_URL", "https://api.openai.com/v1");
        let ai_model = env_or_default("AI_MODEL", "gpt-4o-mini");
        let ai_max_tokens = parse_u32("AI_MAX_TOKENS", env_or_default("AI_MAX_TOKENS", "256"))?;
        let ai_temperature =
            parse_f64("AI_TEMPERATURE", env_or_default("AI_TEMPERATURE", "0.2"))?;
        let ai_request_timeout =
            parse_u64("AI_REQUEST_TIMEOUT", env_or_default("AI_REQUEST_TIMEOUT", "60"))?;

        let max_attempts = parse_u32(
            "EVALUATION_MAX_ATTEMPTS",
            env_or_default("EVALUATION_MAX_ATTEMPTS", "3"),
        )?;
        let backoff_base_ms = parse_u64(
            "EVALUATION_BACKOFF_BASE_MS",
            env_or_default("EVALUATION_BACKOFF_BASE_MS", "2000"),
        )?;
        let concurrency = parse_usize(
            "EVALUATION_CONCURRENCY",
            env_or_default("EVALUATION_CONCURRENCY", "4"),
        )?;
        let claim_lease_seconds = parse_u64(
            "EVALUATION_CLAIM_LEASE_SECONDS",
            env_or_default("EVALUATION_CLAIM_LEASE_SECONDS", "0"),
        )?;
        let shutdown_grace_seconds = parse_u64(
            "EVALUATION_SHUTDOWN_GRACE_SECONDS",
            env_or_default("EVALUATION_SHUTDOWN_GRACE_SECONDS", "30"),
        )?;

        let log_level = env_or_default("EVALUATOR_LOG_LEVEL", "info");
        let json = env_optional("EVALUATOR_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            server: ServerSettings {
                host: ServerHost::parse(host)?,
                port: ServerPort::parse(port)?,
            },
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings { project_name, version },
            cors: CorsSettings { origins: cors_origins },
            database: DatabaseSettings {
                postgres_server,
                postgres_port,
                postgres_user,
                postgres_password,
                postgres_db,
                database_url,
                max_connections,
            },
            ai: AiSettings {
                openai_api_key,
                openai_base_url,
                ai_model,
                ai_max_tokens,
                ai_temperature,
                ai_request_timeout,
            },
            evaluation: EvaluationSettings {
                max_attempts,
                backoff_base_ms,
                concurrency,
                claim_lease_seconds,
                shutdown_grace_seconds,
            },
            telemetry: TelemetrySettings { log_level, json, prometheus_enabled },
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

    pub(crate) fn ai(&self) -> &AiSettings {
        &self.ai
    }

    pub(crate) fn evaluation(&self) -> &EvaluationSettings {
        &self.evaluation
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.database.max_connections == 0 {
            return Err(ConfigError::InvalidValue {
                field: "DATABASE_MAX_CONNECTIONS",
                value: "0".to_string(),
            });
        }

        if self.evaluation.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "EVALUATION_MAX_ATTEMPTS",
                value: "0".to_string(),
            });
        }

        if self.evaluation.concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                field: "EVALUATION_CONCURRENCY",
                value: "0".to_string(),
            });
        }

        if self.ai.ai_request_timeout == 0 {
            return Err(ConfigError::InvalidValue {
                field: "AI_REQUEST_TIMEOUT",
                value: "0".to_string(),
            });
        }

        if let Some(lease) = self.evaluation.claim_lease() {
            let worst_case = EvaluationPolicy::from_settings(self).worst_case_answer_time();
            if lease <= worst_case {
                return Err(ConfigError::InvalidValue {
                    field: "EVALUATION_CLAIM_LEASE_SECONDS",
                    value: format!(
                        "{} (must exceed {}s, the longest one answer can take)",
                        lease.as_secs(),
                        worst_case.as_secs_f64()
                    ),
                });
            }
        }

        if !(0.0..=2.0).contains(&self.ai.ai_temperature) {
            return Err(ConfigError::InvalidValue {
                field: "AI_TEMPERATURE",
                value: self.ai.ai_temperature.to_string(),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.database.database_url.is_none() && self.database.postgres_password.is_empty() {
            return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
        }
        if self.ai.openai_api_key.is_empty() {
            return Err(ConfigError::MissingSecret("OPENAI_API_KEY"));
        }

        Ok(())
    }
}
