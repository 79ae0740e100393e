use std::env;
use std::str::FromStr;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub port: u16,
    pub booking_lock_ttl_seconds: i64,
    pub lock_sweep_interval_seconds: u64,
    pub service_cache_ttl_seconds: i64,
    /// Offset of the clinic's operating calendar from UTC, used to decide "today".
    pub clinic_utc_offset_minutes: i32,
    pub min_booking_notice_minutes: i64,
    pub notification_webhook_url: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            supabase_jwt_secret: String::new(),
            port: 3000,
            booking_lock_ttl_seconds: 300,
            lock_sweep_interval_seconds: 60,
            service_cache_ttl_seconds: 300,
            clinic_utc_offset_minutes: 0,
            min_booking_notice_minutes: 0,
            notification_webhook_url: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            port: parse_or_default("PORT", defaults.port),
            booking_lock_ttl_seconds: parse_or_default(
                "BOOKING_LOCK_TTL_SECONDS",
                defaults.booking_lock_ttl_seconds,
            ),
            lock_sweep_interval_seconds: parse_or_default(
                "LOCK_SWEEP_INTERVAL_SECONDS",
                defaults.lock_sweep_interval_seconds,
            ),
            service_cache_ttl_seconds: parse_or_default(
                "SERVICE_CACHE_TTL_SECONDS",
                defaults.service_cache_ttl_seconds,
            ),
            clinic_utc_offset_minutes: parse_or_default(
                "CLINIC_UTC_OFFSET_MINUTES",
                defaults.clinic_utc_offset_minutes,
            ),
            min_booking_notice_minutes: parse_or_default(
                "MIN_BOOKING_NOTICE_MINUTES",
                defaults.min_booking_notice_minutes,
            ),
            notification_webhook_url: env::var("NOTIFICATION_WEBHOOK_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),
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

    pub fn is_notification_configured(&self) -> bool {
        self.notification_webhook_url.is_some()
    }
}

fn parse_or_default<T>(key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display + Copy,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using default {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_use_five_minute_lock_ttl() {
        let config = AppConfig::default();
        assert_eq!(config.booking_lock_ttl_seconds, 300);
        assert_eq!(config.port, 3000);
        assert!(!config.is_configured());
        assert!(!config.is_notification_configured());
    }

    #[test]
    fn parse_or_default_falls_back_on_garbage() {
        env::set_var("SHARED_CONFIG_TEST_GARBAGE", "not-a-number");
        let value: u64 = parse_or_default("SHARED_CONFIG_TEST_GARBAGE", 42);
        assert_eq!(value, 42);

        env::set_var("SHARED_CONFIG_TEST_NUMBER", " 17 ");
        let value: u64 = parse_or_default("SHARED_CONFIG_TEST_NUMBER", 42);
        assert_eq!(value, 17);
    }
}
