//! Engine configuration
//!
//! All options can be supplied programmatically or loaded from the
//! environment via [`AuthConfig::from_env`]. Durations are configured in
//! whole seconds.

use std::env;

use time::Duration;

use crate::error::{AuthError, AuthResult};

/// Default session length for a freshly issued or rotated token.
pub const DEFAULT_TOKEN_LIFESPAN: Duration = Duration::days(14);

/// Default reuse-window length: how long the immediately preceding token is
/// still accepted after a rotation, so concurrent requests racing the
/// rotation do not spuriously fail.
pub const DEFAULT_BATCH_REQUEST_BUFFER_THROTTLE: Duration = Duration::seconds(5);

/// Default ceiling on concurrent device sessions per account.
/// Prevents session accumulation and limits attack surface.
pub const DEFAULT_MAX_NUMBER_OF_DEVICES: usize = 10;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// How long a newly issued or rotated token stays valid.
    pub token_lifespan: Duration,
    /// Length of the post-rotation reuse window.
    pub batch_request_buffer_throttle: Duration,
    /// Maximum concurrent device sessions per account.
    pub max_number_of_devices: usize,
    /// When true, a credential change collapses the token set to the single
    /// session that performed the change.
    pub remove_tokens_after_credential_change: bool,
    /// Wire names used when rendering and reading the auth header set.
    pub header_names: HeaderNames,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_lifespan: DEFAULT_TOKEN_LIFESPAN,
            batch_request_buffer_throttle: DEFAULT_BATCH_REQUEST_BUFFER_THROTTLE,
            max_number_of_devices: DEFAULT_MAX_NUMBER_OF_DEVICES,
            remove_tokens_after_credential_change: false,
            header_names: HeaderNames::default(),
        }
    }
}

impl AuthConfig {
    /// Load configuration from the environment, falling back to defaults
    /// for anything unset.
    ///
    /// Recognized variables:
    /// - `KEYWHEEL_TOKEN_LIFESPAN_SECS`
    /// - `KEYWHEEL_BATCH_REQUEST_BUFFER_THROTTLE_SECS`
    /// - `KEYWHEEL_MAX_NUMBER_OF_DEVICES`
    /// - `KEYWHEEL_REMOVE_TOKENS_AFTER_CREDENTIAL_CHANGE`
    /// - `KEYWHEEL_HEADER_{ACCESS_TOKEN,TOKEN_TYPE,CLIENT,EXPIRY,PROVIDER,UID}`
    pub fn from_env() -> AuthResult<Self> {
        let config = Self {
            token_lifespan: env_duration_secs("KEYWHEEL_TOKEN_LIFESPAN_SECS", DEFAULT_TOKEN_LIFESPAN)?,
            batch_request_buffer_throttle: env_duration_secs(
                "KEYWHEEL_BATCH_REQUEST_BUFFER_THROTTLE_SECS",
                DEFAULT_BATCH_REQUEST_BUFFER_THROTTLE,
            )?,
            max_number_of_devices: env_usize(
                "KEYWHEEL_MAX_NUMBER_OF_DEVICES",
                DEFAULT_MAX_NUMBER_OF_DEVICES,
            )?,
            remove_tokens_after_credential_change: env_bool(
                "KEYWHEEL_REMOVE_TOKENS_AFTER_CREDENTIAL_CHANGE",
                false,
            )?,
            header_names: HeaderNames::from_env(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the engine cannot honor.
    pub fn validate(&self) -> AuthResult<()> {
        if self.token_lifespan <= Duration::ZERO {
            return Err(AuthError::InvalidConfig(
                "token_lifespan must be positive".into(),
            ));
        }
        if self.batch_request_buffer_throttle <= Duration::ZERO {
            return Err(AuthError::InvalidConfig(
                "batch_request_buffer_throttle must be positive".into(),
            ));
        }
        if self.max_number_of_devices == 0 {
            return Err(AuthError::InvalidConfig(
                "max_number_of_devices must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Configurable wire names for the auth header set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderNames {
    pub access_token: String,
    pub token_type: String,
    pub client: String,
    pub expiry: String,
    pub provider: String,
    pub uid: String,
}

impl Default for HeaderNames {
    fn default() -> Self {
        Self {
            access_token: "access-token".into(),
            token_type: "token-type".into(),
            client: "client".into(),
            expiry: "expiry".into(),
            provider: "provider".into(),
            uid: "uid".into(),
        }
    }
}

impl HeaderNames {
    fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            access_token: env_string("KEYWHEEL_HEADER_ACCESS_TOKEN", defaults.access_token),
            token_type: env_string("KEYWHEEL_HEADER_TOKEN_TYPE", defaults.token_type),
            client: env_string("KEYWHEEL_HEADER_CLIENT", defaults.client),
            expiry: env_string("KEYWHEEL_HEADER_EXPIRY", defaults.expiry),
            provider: env_string("KEYWHEEL_HEADER_PROVIDER", defaults.provider),
            uid: env_string("KEYWHEEL_HEADER_UID", defaults.uid),
        }
    }
}

fn env_duration_secs(key: &str, default: Duration) -> AuthResult<Duration> {
    match env::var(key) {
        Ok(raw) => {
            let secs: i64 = raw
                .parse()
                .map_err(|_| AuthError::InvalidConfig(format!("{key} must be whole seconds, got {raw:?}")))?;
            Ok(Duration::seconds(secs))
        }
        Err(_) => Ok(default),
    }
}

fn env_usize(key: &str, default: usize) -> AuthResult<usize> {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| AuthError::InvalidConfig(format!("{key} must be an integer, got {raw:?}"))),
        Err(_) => Ok(default),
    }
}

fn env_bool(key: &str, default: bool) -> AuthResult<bool> {
    match env::var(key) {
        Ok(raw) => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" => Ok(false),
            _ => Err(AuthError::InvalidConfig(format!(
                "{key} must be a boolean, got {raw:?}"
            ))),
        },
        Err(_) => Ok(default),
    }
}

fn env_string(key: &str, default: String) -> String {
    env::var(key).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for key in [
            "KEYWHEEL_TOKEN_LIFESPAN_SECS",
            "KEYWHEEL_BATCH_REQUEST_BUFFER_THROTTLE_SECS",
            "KEYWHEEL_MAX_NUMBER_OF_DEVICES",
            "KEYWHEEL_REMOVE_TOKENS_AFTER_CREDENTIAL_CHANGE",
            "KEYWHEEL_HEADER_ACCESS_TOKEN",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn defaults_when_env_unset() {
        clear_env();
        let config = AuthConfig::from_env().unwrap();
        assert_eq!(config.token_lifespan, Duration::days(14));
        assert_eq!(config.batch_request_buffer_throttle, Duration::seconds(5));
        assert_eq!(config.max_number_of_devices, 10);
        assert!(!config.remove_tokens_after_credential_change);
        assert_eq!(config.header_names, HeaderNames::default());
    }

    #[test]
    #[serial]
    fn env_overrides_are_honored() {
        clear_env();
        std::env::set_var("KEYWHEEL_TOKEN_LIFESPAN_SECS", "3600");
        std::env::set_var("KEYWHEEL_MAX_NUMBER_OF_DEVICES", "3");
        std::env::set_var("KEYWHEEL_REMOVE_TOKENS_AFTER_CREDENTIAL_CHANGE", "true");
        std::env::set_var("KEYWHEEL_HEADER_ACCESS_TOKEN", "x-session-token");

        let config = AuthConfig::from_env().unwrap();
        assert_eq!(config.token_lifespan, Duration::seconds(3600));
        assert_eq!(config.max_number_of_devices, 3);
        assert!(config.remove_tokens_after_credential_change);
        assert_eq!(config.header_names.access_token, "x-session-token");
        clear_env();
    }

    #[test]
    #[serial]
    fn unparsable_env_value_is_rejected() {
        clear_env();
        std::env::set_var("KEYWHEEL_TOKEN_LIFESPAN_SECS", "two weeks");
        let result = AuthConfig::from_env();
        assert!(matches!(result, Err(AuthError::InvalidConfig(_))));
        clear_env();
    }

    #[test]
    fn zero_device_ceiling_is_rejected() {
        let config = AuthConfig {
            max_number_of_devices: 0,
            ..AuthConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(AuthError::InvalidConfig(_))
        ));
    }

    #[test]
    fn negative_lifespan_is_rejected() {
        let config = AuthConfig {
            token_lifespan: Duration::seconds(-1),
            ..AuthConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
