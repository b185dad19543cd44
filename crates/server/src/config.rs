use std::env;

const DEFAULT_MAX_UPLOAD_BYTES: u64 = 20 * 1024 * 1024;

#[derive(Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub storage_path: String,
    pub jwt_secret: String,
    /// Raw integer byte count only; expressions in the environment are rejected.
    pub max_upload_bytes: u64,
    pub access_token_minutes: i64,
    pub refresh_token_days: i64,
    pub frontend_base_url: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./data/siteforge.db?mode=rwc".to_string()),
            storage_path: env::var("STORAGE_PATH").unwrap_or_else(|_| "./data/sites".to_string()),
            jwt_secret: env::var("JWT_SECRET")
                .unwrap_or_else(|_| "development-secret-change-in-production".to_string()),
            max_upload_bytes: env::var("MAX_UPLOAD_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            access_token_minutes: env::var("ACCESS_TOKEN_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
            refresh_token_days: env::var("REFRESH_TOKEN_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(7),
            frontend_base_url: env::var("FRONTEND_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
        }
    }
}

#[cfg(test)]
impl Default for Config {
    fn default() -> Self {
        Self {
            port: 0,
            database_url: "sqlite::memory:".to_string(),
            storage_path: String::new(),
            jwt_secret: "test-secret".to_string(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            access_token_minutes: 60,
            refresh_token_days: 7,
            frontend_base_url: "http://localhost:5173".to_string(),
        }
    }
}
