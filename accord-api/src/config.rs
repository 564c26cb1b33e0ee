/// Configuration management for the API server
///
/// Configuration comes from environment variables, with a `.env` file loaded
/// first when present.
///
/// # Environment Variables
///
/// - `API_HOST`: host to bind to (default: 0.0.0.0)
/// - `API_PORT`: port to bind to (default: 8080)
/// - `CORS_ORIGINS`: comma-separated allowed origins (default: `*`)
/// - `PRODUCTION`: enables HSTS (default: false)
/// - `DATABASE_URL`: PostgreSQL connection string (required)
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: 10)
/// - `DATABASE_TRANSACTIONS`: `auto` or `disabled` (default: auto)
/// - `JWT_SECRET`: HS256 signing key, at least 32 characters (required)
/// - `PUBLIC_BASE_URL`: base of links sent by email (default: http://localhost:8080)
/// - `EMAIL_API_URL`, `EMAIL_API_KEY`: email provider; mail is only logged
///   when either is missing
/// - `EMAIL_FROM`: sender address (default: no-reply@accord.local)
/// - `RUST_LOG`, `LOG_FORMAT`: read by the binary for logging
///
/// # Example
///
/// ```no_run
/// use accord_api::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.bind_address());
/// # Ok(())
/// # }
/// ```

use accord_shared::db::account_store::TransactionMode;
use std::collections::HashMap;
use std::env;

/// Complete application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub email: EmailConfig,
}

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,

    /// Port to bind to
    pub port: u16,

    /// Allowed CORS origins (`*` allows any)
    pub cors_origins: Vec<String>,

    /// Production mode adds HSTS
    pub production: bool,

    /// Public URL of this server, used in emailed links
    pub public_base_url: String,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in pool
    pub max_connections: u32,

    /// Whether account deletion may use transactions
    pub transactions: TransactionMode,
}

/// JWT configuration
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Secret key for JWT signing
    ///
    /// Generate with: `openssl rand -hex 32`
    pub secret: String,
}

/// Email delivery configuration
#[derive(Debug, Clone)]
pub struct EmailConfig {
    /// Provider endpoint
    pub api_url: Option<String>,

    /// Provider API key
    pub api_key: Option<String>,

    /// Sender address
    pub from: String,
}

impl EmailConfig {
    /// Endpoint and key when both are set
    pub fn provider(&self) -> Option<(&str, &str)> {
        match (&self.api_url, &self.api_key) {
            (Some(url), Some(key)) => Some((url.as_str(), key.as_str())),
            _ => None,
        }
    }
}

impl Config {
    /// Loads configuration from the process environment
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a value does
    /// not parse.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_vars(&env::vars().collect())
    }

    /// Loads configuration from an explicit variable map
    pub fn from_vars(vars: &HashMap<String, String>) -> anyhow::Result<Self> {
        let get = |name: &str| vars.get(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let get_or = |name: &str, default: &str| get(name).unwrap_or_else(|| default.to_string());

        let port = get_or("API_PORT", "8080")
            .parse::<u16>()
            .map_err(|e| anyhow::anyhow!("API_PORT is not a valid port: {}", e))?;

        let cors_origins = get_or("CORS_ORIGINS", "*")
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        let production = matches!(
            get_or("PRODUCTION", "false").to_ascii_lowercase().as_str(),
            "1" | "true" | "yes"
        );

        let database_url = get("DATABASE_URL")
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL environment variable is required"))?;

        let max_connections = get_or("DATABASE_MAX_CONNECTIONS", "10")
            .parse::<u32>()
            .map_err(|e| anyhow::anyhow!("DATABASE_MAX_CONNECTIONS is not a number: {}", e))?;

        let transactions = get_or("DATABASE_TRANSACTIONS", "auto")
            .parse::<TransactionMode>()
            .map_err(|e| anyhow::anyhow!("DATABASE_TRANSACTIONS: {}", e))?;

        let jwt_secret = get("JWT_SECRET")
            .ok_or_else(|| anyhow::anyhow!("JWT_SECRET environment variable is required"))?;

        if jwt_secret.len() < 32 {
            anyhow::bail!("JWT_SECRET must be at least 32 characters long");
        }

        let public_base_url = get_or("PUBLIC_BASE_URL", "http://localhost:8080")
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            api: ApiConfig {
                host: get_or("API_HOST", "0.0.0.0"),
                port,
                cors_origins,
                production,
                public_base_url,
            },
            database: DatabaseConfig {
                url: database_url,
                max_connections,
                transactions,
            },
            jwt: JwtConfig { secret: jwt_secret },
            email: EmailConfig {
                api_url: get("EMAIL_API_URL"),
                api_key: get("EMAIL_API_KEY"),
                from: get_or("EMAIL_FROM", "no-reply@accord.local"),
            },
        })
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }

    /// Link a new user follows to verify their email
    pub fn verification_url(&self, token: &str) -> String {
        format!("{}/v1/auth/verify?token={}", self.api.public_base_url, token)
    }
}
