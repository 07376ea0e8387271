use std::env;
use std::fmt;

/// Scenario knobs for the simulated platform
#[derive(Clone)]
pub struct SimConfig {
    pub token: String,
    pub refresh_token: Option<String>,
    pub deny_permission: bool,
    pub fail_registration: bool,
    pub show_in_foreground: bool,
    pub json_logs: bool,
}

impl SimConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(SimConfig {
            token: env::var("SIM_TOKEN").unwrap_or_else(|_| "sim-device-token-0001".to_string()),
            refresh_token: env::var("SIM_REFRESH_TOKEN")
                .ok()
                .filter(|token| !token.is_empty()),
            deny_permission: flag("SIM_DENY_PERMISSION")?,
            fail_registration: flag("SIM_FAIL_REGISTRATION")?,
            show_in_foreground: flag("SIM_SHOW_IN_FOREGROUND")?,
            json_logs: env::var("LOG_FORMAT")
                .map(|format| format.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        })
    }
}

// Tokens stay out of logs
impl fmt::Debug for SimConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimConfig")
            .field("refresh", &self.refresh_token.is_some())
            .field("deny_permission", &self.deny_permission)
            .field("fail_registration", &self.fail_registration)
            .field("show_in_foreground", &self.show_in_foreground)
            .field("json_logs", &self.json_logs)
            .finish_non_exhaustive()
    }
}

fn flag(key: &str) -> anyhow::Result<bool> {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" | "" => Ok(false),
            other => anyhow::bail!("{} must be a boolean, got {:?}", key, other),
        },
        Err(_) => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_omits_tokens() {
        let config = SimConfig {
            token: "secret-device-token-0001".to_string(),
            refresh_token: Some("secret-refresh-token-0002".to_string()),
            deny_permission: false,
            fail_registration: false,
            show_in_foreground: true,
            json_logs: false,
        };

        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("refresh: true"));
    }
}
