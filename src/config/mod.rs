use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub api: ApiConfig,
    pub security: SecurityConfig,
    pub access: AccessConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub enable_rate_limiting: bool,
    pub enable_request_logging: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub jwt_secret: String,
    pub jwt_expiry_hours: u64,
    pub enable_audit_logging: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessConfig {
    /// Expand organization memberships to their descendants when resolving
    /// practice access. Disabling restricts users to direct memberships.
    pub expand_hierarchy: bool,
    /// Emit a warning when an organization-scope user resolves to zero
    /// practice uids (the fail-closed branch).
    pub warn_on_empty_access: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // API overrides
        if let Ok(v) = env::var("API_ENABLE_RATE_LIMITING") {
            self.api.enable_rate_limiting = v.parse().unwrap_or(self.api.enable_rate_limiting);
        }
        if let Ok(v) = env::var("API_ENABLE_REQUEST_LOGGING") {
            self.api.enable_request_logging = v.parse().unwrap_or(self.api.enable_request_logging);
        }

        // Security overrides
        if let Ok(v) = env::var("SECURITY_JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        if let Ok(v) = env::var("SECURITY_JWT_EXPIRY_HOURS") {
            self.security.jwt_expiry_hours = v.parse().unwrap_or(self.security.jwt_expiry_hours);
        }
        if let Ok(v) = env::var("SECURITY_ENABLE_AUDIT_LOGGING") {
            self.security.enable_audit_logging = v.parse().unwrap_or(self.security.enable_audit_logging);
        }

        // Access overrides
        if let Ok(v) = env::var("ACCESS_EXPAND_HIERARCHY") {
            self.access.expand_hierarchy = v.parse().unwrap_or(self.access.expand_hierarchy);
        }
        if let Ok(v) = env::var("ACCESS_WARN_ON_EMPTY_ACCESS") {
            self.access.warn_on_empty_access = v.parse().unwrap_or(self.access.warn_on_empty_access);
        }

        self
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            api: ApiConfig {
                enable_rate_limiting: false,
                enable_request_logging: true,
            },
            security: SecurityConfig {
                jwt_secret: "development-only-secret".to_string(),
                jwt_expiry_hours: 24 * 7, // 1 week
                enable_audit_logging: false,
            },
            access: AccessConfig {
                expand_hierarchy: true,
                warn_on_empty_access: true,
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            api: ApiConfig {
                enable_rate_limiting: true,
                enable_request_logging: true,
            },
            security: SecurityConfig {
                jwt_secret: String::new(), // must come from SECURITY_JWT_SECRET
                jwt_expiry_hours: 24,
                enable_audit_logging: true,
            },
            access: AccessConfig {
                expand_hierarchy: true,
                warn_on_empty_access: true,
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            api: ApiConfig {
                enable_rate_limiting: true,
                enable_request_logging: false,
            },
            security: SecurityConfig {
                jwt_secret: String::new(), // must come from SECURITY_JWT_SECRET
                jwt_expiry_hours: 4,
                enable_audit_logging: true,
            },
            access: AccessConfig {
                expand_hierarchy: true,
                warn_on_empty_access: true,
            },
        }
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}
