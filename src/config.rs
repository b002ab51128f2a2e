use anyhow::Result;

// ============================================================================
// Configuration Constants
// ============================================================================

// Default port values
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_METRICS_PORT: u16 = 8081;

// Default sovereignty values
const DEFAULT_RETENTION_DAYS: i64 = 30;

/// Minimum length for the feed auth secret
const MIN_AUTH_SECRET_LEN: usize = 32;

/// Sample ISO 3166-1 alpha-2 allow-list for sovereign deployments
pub const ALLOWED_COUNTRY_CODES: &[&str] = &[
    "CA", "US", "GB", "FR", "DE", "AU", "NZ", "JP", "KR", "IN", "BR", "MX",
];

// ============================================================================
// Configuration Structures
// ============================================================================

/// Privacy posture for a sovereign deployment
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PrivacyMode {
    Strict,
    #[default]
    Balanced,
    Minimal,
}

impl std::str::FromStr for PrivacyMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "balanced" => Ok(Self::Balanced),
            "minimal" => Ok(Self::Minimal),
            _ => anyhow::bail!(
                "Invalid privacy mode: {}. Must be 'strict', 'balanced' or 'minimal'",
                s
            ),
        }
    }
}

impl std::fmt::Display for PrivacyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Strict => "strict",
            Self::Balanced => "balanced",
            Self::Minimal => "minimal",
        };
        f.write_str(s)
    }
}

/// Jurisdiction settings for the filtered feed
#[derive(Clone, Debug, Default)]
pub struct SovereignConfig {
    pub enabled: bool,
    /// ISO 3166-1 alpha-2 jurisdiction code
    pub country_code: String,
    pub data_retention_days: i64,
    pub privacy_mode: PrivacyMode,
    /// Optional JSON file of operator-asserted subject classifications
    pub overrides_path: Option<String>,
}

impl SovereignConfig {
    /// Checks the jurisdiction settings.
    ///
    /// A disabled config is always valid regardless of the other fields, so
    /// stale residual settings can never block startup. An enabled config
    /// requires a two-letter, allow-listed country code (case-insensitive).
    pub fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        if self.country_code.is_empty() {
            anyhow::bail!("country code is required when sovereignty is enabled");
        }

        if self.country_code.len() != 2 || !self.country_code.chars().all(|c| c.is_ascii_alphabetic())
        {
            anyhow::bail!(
                "country code must be 2 letters (ISO 3166-1 alpha-2), got {:?}",
                self.country_code
            );
        }

        let upper = self.country_code.to_uppercase();
        if !ALLOWED_COUNTRY_CODES.contains(&upper.as_str()) {
            anyhow::bail!("country code {:?} is not in the allowed set", upper);
        }

        Ok(())
    }

    /// Jurisdiction code normalized for metric labels and logging
    pub fn jurisdiction(&self) -> String {
        self.country_code.to_uppercase()
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    /// Feed listener port (both subscription surfaces)
    pub port: u16,
    /// Observability listener port (/health, /metrics)
    pub metrics_port: u16,
    /// Optional upstream firehose URL to rebroadcast from
    pub upstream_url: Option<String>,
    /// Shared secret for sovereign-feed bearer credentials
    pub feed_auth_secret: String,
    pub feed_auth_issuer: String,
    pub sovereign: SovereignConfig,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let sovereign_enabled = std::env::var("SOVEREIGN_ENABLED")
            .unwrap_or_else(|_| "false".to_string())
            .parse()
            .unwrap_or(false);

        Ok(Self {
            port: std::env::var("RELAY_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            metrics_port: std::env::var("RELAY_METRICS_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_METRICS_PORT),
            upstream_url: std::env::var("RELAY_UPSTREAM_URL").ok(),
            feed_auth_secret: {
                let secret = std::env::var("FEED_AUTH_SECRET").unwrap_or_default();
                if sovereign_enabled && secret.len() < MIN_AUTH_SECRET_LEN {
                    anyhow::bail!(
                        "FEED_AUTH_SECRET must be at least {} characters when sovereignty is enabled. \
                         Generate one with: openssl rand -base64 32",
                        MIN_AUTH_SECRET_LEN
                    );
                }
                secret
            },
            feed_auth_issuer: std::env::var("FEED_AUTH_ISSUER")
                .unwrap_or_else(|_| "sovereign-relay".to_string()),
            sovereign: SovereignConfig {
                enabled: sovereign_enabled,
                country_code: std::env::var("SOVEREIGN_COUNTRY_CODE").unwrap_or_default(),
                data_retention_days: std::env::var("SOVEREIGN_RETENTION_DAYS")
                    .ok()
                    .and_then(|d| d.parse().ok())
                    .unwrap_or(DEFAULT_RETENTION_DAYS),
                privacy_mode: std::env::var("SOVEREIGN_PRIVACY_MODE")
                    .unwrap_or_else(|_| "balanced".to_string())
                    .parse()
                    .unwrap_or_default(),
                overrides_path: std::env::var("SOVEREIGN_OVERRIDES_PATH").ok(),
            },
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}
