use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::fmt;
use std::str::FromStr;

const DEV_JWT_SECRET: &str = "dev-only-insecure-jwt-secret-change-me";

#[derive(Debug, Clone, Deserialize)]
pub struct CrmConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub recurring: RecurringConfig,
    pub rate_limit: RateLimitConfig,
    pub allowed_origins: Vec<String>,
    pub static_dir: Option<String>,
    /// Account created or promoted to admin at startup.
    pub admin: Option<AdminSeed>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Dev),
            "prod" | "production" => Ok(Environment::Prod),
            other => Err(format!("Unknown ENVIRONMENT '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// `postgres://…` selects PostgreSQL, anything else SQLite.
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub expiry_hours: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecurringConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    pub max_number_attempts: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub requests: u32,
    pub auth_requests: u32,
    pub window_seconds: u64,
}

#[derive(Clone, Deserialize)]
pub struct AdminSeed {
    pub email: String,
    pub password: String,
    pub name: String,
}

impl fmt::Debug for AdminSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminSeed")
            .field("email", &self.email)
            .field("password", &"***")
            .field("name", &self.name)
            .finish()
    }
}

impl CrmConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let mut common_config = core_config::Config::load()?;
        if let Ok(port) = env::var("PORT") {
            common_config.port = parse_value("PORT", &port)?;
        }

        let environment: Environment = env::var("ENVIRONMENT")
            .unwrap_or_else(|_| "dev".to_string())
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let config = CrmConfig {
            common: common_config,
            environment,
            service_name: get_env("SERVICE_NAME", Some("crm-service"), false)?,
            log_level: get_env("LOG_LEVEL", Some("info"), false)?,
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
            database: DatabaseConfig {
                url: get_env("DATABASE_URL", Some("sqlite://crm.sqlite?mode=rwc"), is_prod)?,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", "10")?,
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", "1")?,
            },
            jwt: JwtConfig {
                secret: get_env("JWT_SECRET", Some(DEV_JWT_SECRET), is_prod)?,
                expiry_hours: parse_env("JWT_EXPIRY_HOURS", "168")?,
            },
            recurring: RecurringConfig {
                enabled: parse_env("RECURRING_ENABLED", "true")?,
                interval_secs: parse_env("RECURRING_INTERVAL_SECS", "3600")?,
                max_number_attempts: parse_env("INVOICE_NUMBER_MAX_ATTEMPTS", "5")?,
            },
            rate_limit: RateLimitConfig {
                requests: parse_env("RATE_LIMIT_REQUESTS", "1000")?,
                auth_requests: parse_env("AUTH_RATE_LIMIT_REQUESTS", "100")?,
                window_seconds: parse_env("RATE_LIMIT_WINDOW_SECONDS", "900")?,
            },
            allowed_origins: split_list(&get_env("ALLOWED_ORIGINS", Some(""), false)?),
            static_dir: env::var("STATIC_DIR").ok().filter(|s| !s.is_empty()),
            admin: admin_seed(
                non_empty_env("ADMIN_EMAIL"),
                non_empty_env("ADMIN_PASSWORD"),
                non_empty_env("ADMIN_NAME"),
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.jwt.expiry_hours <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_EXPIRY_HOURS must be positive"
            )));
        }

        if self.recurring.interval_secs == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "RECURRING_INTERVAL_SECS must be positive"
            )));
        }

        if self.recurring.max_number_attempts == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "INVOICE_NUMBER_MAX_ATTEMPTS must be at least 1"
            )));
        }

        if self.rate_limit.requests == 0 || self.rate_limit.auth_requests == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "Rate limits must be greater than 0"
            )));
        }

        if self.database.max_connections == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "DATABASE_MAX_CONNECTIONS must be greater than 0"
            )));
        }

        if let Some(admin) = &self.admin {
            if admin.password.len() < 8 {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "ADMIN_PASSWORD must be at least 8 characters"
                )));
            }
        }

        if self.environment == Environment::Prod {
            if self.jwt.secret == DEV_JWT_SECRET || self.jwt.secret.len() < 32 {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "JWT_SECRET must be set to at least 32 characters in production"
                )));
            }

            if self.allowed_origins.iter().any(|o| o == "*") {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Wildcard CORS origin not allowed in production"
                )));
            }
        }

        Ok(())
    }

    pub fn is_prod(&self) -> bool {
        self.environment == Environment::Prod
    }
}

fn get_env(key: &str, default: Option<&str>, required: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if required {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

fn parse_env<T>(key: &str, default: &str) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = get_env(key, Some(default), false)?;
    parse_value(key, &raw)
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e: T::Err| AppError::ConfigError(anyhow::anyhow!("Invalid {}: {}", key, e)))
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.trim().is_empty())
}

fn admin_seed(
    email: Option<String>,
    password: Option<String>,
    name: Option<String>,
) -> Result<Option<AdminSeed>, AppError> {
    let Some(email) = email else {
        return Ok(None);
    };
    let password = password.ok_or_else(|| {
        AppError::ConfigError(anyhow::anyhow!(
            "ADMIN_PASSWORD is required when ADMIN_EMAIL is set"
        ))
    })?;
    Ok(Some(AdminSeed {
        email: email.trim().to_string(),
        password,
        name: name.unwrap_or_else(|| "Administrator".to_string()),
    }))
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
