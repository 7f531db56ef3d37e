use std::str::FromStr;
use std::time;

use url::Url;

/// A duration read from the environment as an integer number of milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvMsDuration(pub time::Duration);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseEnvMsDurationError;

impl FromStr for EnvMsDuration {
    type Err = ParseEnvMsDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ms = s.parse::<u64>().map_err(|_| ParseEnvMsDurationError)?;

        Ok(EnvMsDuration(time::Duration::from_millis(ms)))
    }
}

/// Resolve an optional duration setting, treating absent and zero alike.
pub fn duration_or(value: Option<EnvMsDuration>, default: time::Duration) -> time::Duration {
    match value {
        Some(EnvMsDuration(duration)) if !duration.is_zero() => duration,
        _ => default,
    }
}

/// Render a connection string for logs with its password masked.
/// Strings that do not parse as URLs (e.g. key/value DSNs) are not echoed at all.
pub fn redacted_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) => {
            if url.password().is_some() {
                // Only fails for cannot-be-a-base URLs, which carry no password anyway.
                _ = url.set_password(Some("***"));
            }
            url.to_string()
        }
        Err(_) => "<unparseable connection string>".to_owned(),
    }
}
