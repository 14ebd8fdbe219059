// src/config.rs

use std::env;
use std::time::Duration;

use dotenvy::dotenv;

/// Number of violations that forces automatic submission.
pub const MAX_WARNINGS: u32 = 3;

/// How long a transient warning stays on screen before the session
/// reverts to the active phase.
pub const WARNING_DISPLAY: Duration = Duration::from_secs(4);

/// Grace period between crossing the warning threshold and invoking
/// the submission coordinator.
pub const ESCALATION_GRACE: Duration = Duration::from_secs(2);

/// How long the post-submission confirmation is shown before the
/// restricted window is closed (or the UI navigates away).
pub const POST_SUBMIT_DELAY: Duration = Duration::from_secs(4);

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    /// Token lifetime in seconds.
    pub jwt_expiration: u64,
    pub rust_log: String,
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");

        let jwt_secret = env::var("JWT_SECRET").expect("JWT_SECRET must be set");

        let jwt_expiration = env::var("JWT_EXPIRATION")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3600);

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let admin_username = env::var("ADMIN_USERNAME").ok();
        let admin_password = env::var("ADMIN_PASSWORD").ok();

        Self {
            database_url,
            jwt_secret,
            jwt_expiration,
            rust_log,
            admin_username,
            admin_password,
        }
    }
}
