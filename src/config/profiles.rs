use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    Development,
    Staging,
    Production,
}

impl Profile {
    pub fn from_env() -> Self {
        Self::parse(std::env::var("APP_PROFILE").ok().as_deref())
    }

    /// Unknown or missing values fall back to development.
    pub fn parse(value: Option<&str>) -> Self {
        value
            .and_then(|s| match s.to_lowercase().as_str() {
                "development" | "dev" => Some(Self::Development),
                "staging" | "stage" => Some(Self::Staging),
                "production" | "prod" => Some(Self::Production),
                _ => None,
            })
            .unwrap_or(Self::Development)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProfileDefaults {
    pub server_port: u16,
    pub database_max_connections: u32,
    pub paystack_base_url: String,
    /// Development may run without a gateway key; every other profile must set one.
    pub paystack_secret_key: Option<String>,
    pub site_url: String,
    pub rate_limit_per_minute: u32,
    pub transfers_enabled: bool,
    pub promotion_sweep_schedule: String,
    pub cors_allowed_origins: Option<String>,
}

impl ProfileDefaults {
    pub fn for_profile(profile: Profile) -> Self {
        match profile {
            Profile::Development => Self {
                server_port: 3000,
                database_max_connections: 5,
                paystack_base_url: "https://api.paystack.co".to_string(),
                paystack_secret_key: Some(String::new()),
                site_url: "http://localhost:5173".to_string(),
                rate_limit_per_minute: 600,
                transfers_enabled: false,
                promotion_sweep_schedule: "0 */5 * * * *".to_string(),
                cors_allowed_origins: None,
            },
            Profile::Staging => Self {
                server_port: 8080,
                database_max_connections: 10,
                paystack_base_url: "https://api.paystack.co".to_string(),
                paystack_secret_key: None,
                site_url: "https://staging.example.com".to_string(),
                rate_limit_per_minute: 120,
                transfers_enabled: false,
                promotion_sweep_schedule: "0 */5 * * * *".to_string(),
                cors_allowed_origins: Some("https://staging.example.com".to_string()),
            },
            Profile::Production => Self {
                server_port: 8080,
                database_max_connections: 20,
                paystack_base_url: "https://api.paystack.co".to_string(),
                paystack_secret_key: None,
                site_url: "https://app.example.com".to_string(),
                rate_limit_per_minute: 60,
                transfers_enabled: true,
                promotion_sweep_schedule: "0 */5 * * * *".to_string(),
                cors_allowed_origins: Some("https://app.example.com".to_string()),
            },
        }
    }
}
