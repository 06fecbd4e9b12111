use std::env;
use std::str::FromStr;
use tracing::warn;

/// Which backing store the scheduling engine talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Supabase,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "in_memory" | "in-memory" => Ok(StoreBackend::Memory),
            "supabase" | "postgres" => Ok(StoreBackend::Supabase),
            other => Err(format!("unknown store backend '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulingConfig {
    pub default_timezone: String,
    pub slot_granularity_minutes: i64,
    pub default_session_minutes: i64,
    pub max_session_minutes: i64,
    pub max_slot_range_days: i64,
    pub booking_timeout_ms: u64,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            default_timezone: "UTC".to_string(),
            slot_granularity_minutes: 30,
            default_session_minutes: 50,
            max_session_minutes: 240,
            max_slot_range_days: 31,
            booking_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub store_backend: StoreBackend,
    pub server_port: u16,
    pub scheduling: SchedulingConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let supabase_url = env::var("SUPABASE_URL")
            .unwrap_or_else(|_| {
                warn!("SUPABASE_URL not set, using empty value");
                String::new()
            });
        let supabase_anon_key = env::var("SUPABASE_ANON_PUBLIC_KEY")
            .unwrap_or_else(|_| {
                warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                String::new()
            });
        let supabase_jwt_secret = env::var("SUPABASE_JWT_SECRET")
            .unwrap_or_else(|_| {
                warn!("SUPABASE_JWT_SECRET not set, using empty value");
                String::new()
            });

        let store_backend = match env::var("SCHEDULING_STORE") {
            Ok(raw) => raw.parse().unwrap_or_else(|e| {
                warn!("{}, falling back to in-memory store", e);
                StoreBackend::Memory
            }),
            Err(_) if !supabase_url.is_empty() => StoreBackend::Supabase,
            Err(_) => {
                warn!("SCHEDULING_STORE not set and Supabase not configured, using in-memory store");
                StoreBackend::Memory
            }
        };

        let defaults = SchedulingConfig::default();
        let scheduling = SchedulingConfig {
            default_timezone: env::var("DEFAULT_TIMEZONE")
                .unwrap_or_else(|_| defaults.default_timezone.clone()),
            slot_granularity_minutes: parse_env("SLOT_GRANULARITY_MINUTES", defaults.slot_granularity_minutes),
            default_session_minutes: parse_env("DEFAULT_SESSION_MINUTES", defaults.default_session_minutes),
            max_session_minutes: parse_env("MAX_SESSION_MINUTES", defaults.max_session_minutes),
            max_slot_range_days: parse_env("MAX_SLOT_RANGE_DAYS", defaults.max_slot_range_days),
            booking_timeout_ms: parse_env("BOOKING_TIMEOUT_MS", defaults.booking_timeout_ms),
        };

        let config = Self {
            supabase_url,
            supabase_anon_key,
            supabase_jwt_secret,
            store_backend,
            server_port: parse_env("SERVER_PORT", 3000),
            scheduling,
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }
}

fn parse_env<T: FromStr + Copy + std::fmt::Display>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using default {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}
