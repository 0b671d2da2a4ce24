use super::*;

/// Application id of the Bright app, accepted by the Glowmarkt API
pub const DEFAULT_APPLICATION_ID: &str = "b0f1b774-a586-4f72-9edd-27ead8aa7a8d";

/// Production Glowmarkt API
pub const DEFAULT_BASE_URL: &str = "https://api.glowmarkt.com/api/v0-1";

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            application_id: DEFAULT_APPLICATION_ID.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            file: "/tmp/glowdcc.log".to_string(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 8089,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            account: AccountConfig::default(),
            logging: LoggingConfig::default(),
            web: WebConfig::default(),
            poll_interval_secs: 300,
            timezone: "Europe/London".to_string(),
        }
    }
}
