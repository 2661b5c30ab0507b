//! Audit configuration from environment variables.
//!
//! Every variable is optional and every parse failure falls back to the
//! default - a bad value can disable a feature but never abort the
//! forwarder. Variables:
//!
//! - `CSNAT_AUDIT_INTERVAL` - challenge period (`500ms`, `5s`, `2m`);
//!   unset/invalid/zero disables challenges.
//! - `CSNAT_AUDIT_LOG` - verbose audit logging.
//! - `CSNAT_SEU_ENABLE` - enable the SEU injector.
//! - `CSNAT_SEU_LOG` - SEU logging; unset follows `CSNAT_AUDIT_LOG`.
//! - `CSNAT_SEU_RATE_PER_BIT_PER_DAY` - Poisson rate, default `1.51e-7`.
//! - `CSNAT_SEU_PREFIX` - injection scope, default `/minindn`.
//!
//! The tag key override (`CSNAT_BLS_SK_HEX`) is read by [`crate::tag`]
//! at first use, not here.

use crate::name::Name;
use std::time::Duration;
use tracing::debug;

pub const ENV_AUDIT_INTERVAL: &str = "CSNAT_AUDIT_INTERVAL";
pub const ENV_AUDIT_LOG: &str = "CSNAT_AUDIT_LOG";
pub const ENV_SEU_ENABLE: &str = "CSNAT_SEU_ENABLE";
pub const ENV_SEU_LOG: &str = "CSNAT_SEU_LOG";
pub const ENV_SEU_RATE: &str = "CSNAT_SEU_RATE_PER_BIT_PER_DAY";
pub const ENV_SEU_PREFIX: &str = "CSNAT_SEU_PREFIX";

/// Default SEU rate, per bit per day.
pub const DEFAULT_SEU_RATE_PER_BIT_PER_DAY: f64 = 1.51e-7;

/// Default SEU scope: user data only, keeping the local management and
/// control planes out of the blast radius.
pub const DEFAULT_SEU_PREFIX: &str = "/minindn";

/// SEU injector configuration.
#[derive(Clone, Debug)]
pub struct SeuConfig {
    pub enabled: bool,
    pub log: bool,
    pub rate_per_bit_per_day: f64,
    pub prefix: Name,
}

impl Default for SeuConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            log: false,
            rate_per_bit_per_day: DEFAULT_SEU_RATE_PER_BIT_PER_DAY,
            prefix: DEFAULT_SEU_PREFIX.parse().expect("default prefix parses"),
        }
    }
}

/// Complete audit subsystem configuration.
#[derive(Clone, Debug)]
pub struct AuditConfig {
    /// Challenge period; `None` disables the challenger.
    pub challenge_interval: Option<Duration>,

    /// Verbose audit logging (cycle summaries, challenge ticks).
    pub audit_log: bool,

    pub seu: SeuConfig,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            challenge_interval: None,
            audit_log: false,
            seu: SeuConfig::default(),
        }
    }
}

impl AuditConfig {
    /// Load configuration from the environment. Infallible: anything
    /// unset or unparseable keeps its default.
    pub fn from_env() -> Self {
        let audit_log = env_bool(ENV_AUDIT_LOG).unwrap_or(false);

        let seu = SeuConfig {
            enabled: env_bool(ENV_SEU_ENABLE).unwrap_or(false),
            log: env_bool(ENV_SEU_LOG).unwrap_or(audit_log),
            rate_per_bit_per_day: env_rate(ENV_SEU_RATE),
            prefix: env_prefix(ENV_SEU_PREFIX),
        };

        Self {
            challenge_interval: env_duration(ENV_AUDIT_INTERVAL),
            audit_log,
            seu,
        }
    }
}

/// Parse a duration of the `Ns`/`Nms`/`Nm` form. Returns `None` for
/// anything invalid or non-positive.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    let (value, unit) = s.split_at(s.find(|c: char| c.is_ascii_alphabetic())?);
    let value: f64 = value.parse().ok()?;
    if !value.is_finite() || value <= 0.0 {
        return None;
    }
    let secs = match unit {
        "ns" => value * 1e-9,
        "us" => value * 1e-6,
        "ms" => value * 1e-3,
        "s" => value,
        "m" => value * 60.0,
        "h" => value * 3600.0,
        _ => return None,
    };
    Some(Duration::from_secs_f64(secs))
}

/// Accepted true spellings: `1/true/TRUE/yes/YES/on/ON`. Anything else
/// is false.
pub fn parse_bool(s: &str) -> bool {
    matches!(s, "1" | "true" | "TRUE" | "yes" | "YES" | "on" | "ON")
}

fn env_bool(var: &str) -> Option<bool> {
    std::env::var(var).ok().map(|v| parse_bool(&v))
}

fn env_duration(var: &str) -> Option<Duration> {
    let raw = std::env::var(var).ok()?;
    let parsed = parse_duration(&raw);
    if parsed.is_none() && !raw.is_empty() {
        debug!(var, value = %raw, "ignoring invalid duration");
    }
    parsed
}

fn env_rate(var: &str) -> f64 {
    let Ok(raw) = std::env::var(var) else {
        return DEFAULT_SEU_RATE_PER_BIT_PER_DAY;
    };
    match raw.parse::<f64>() {
        Ok(r) if r.is_finite() && r > 0.0 => r,
        _ => {
            debug!(var, value = %raw, "ignoring invalid rate");
            DEFAULT_SEU_RATE_PER_BIT_PER_DAY
        }
    }
}

fn env_prefix(var: &str) -> Name {
    let fallback = || DEFAULT_SEU_PREFIX.parse().expect("default prefix parses");
    let Ok(raw) = std::env::var(var) else {
        return fallback();
    };
    match raw.parse() {
        Ok(name) => name,
        Err(_) => {
            debug!(var, value = %raw, "ignoring invalid prefix");
            fallback()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_parse_with_units() {
        assert_eq!(parse_duration("5s"), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration("250ms"), Some(Duration::from_millis(250)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("1h"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_duration("1.5s"), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn invalid_durations_rejected() {
        for bad in ["", "5", "s", "-1s", "0s", "5 parsecs", "NaNs"] {
            assert_eq!(parse_duration(bad), None, "{bad:?} should not parse");
        }
    }

    #[test]
    fn bool_spellings() {
        for yes in ["1", "true", "TRUE", "yes", "YES", "on", "ON"] {
            assert!(parse_bool(yes));
        }
        for no in ["0", "false", "True", "off", "", "2"] {
            assert!(!parse_bool(no));
        }
    }

    #[test]
    fn default_config_disables_everything() {
        let cfg = AuditConfig::default();
        assert!(cfg.challenge_interval.is_none());
        assert!(!cfg.audit_log);
        assert!(!cfg.seu.enabled);
        assert_eq!(cfg.seu.rate_per_bit_per_day, DEFAULT_SEU_RATE_PER_BIT_PER_DAY);
        assert_eq!(cfg.seu.prefix.to_string(), "/minindn");
    }
}
