// Startup configuration, read from the environment (and `.env` via dotenv).
//
// Only the model key and the WhatsApp credentials are required. Google and
// Linear are optional: when their credentials are missing the matching tools
// are not registered.

use crate::core::ai::ai_service::DEFAULT_SYSTEM_PROMPT;
use crate::core::ai::{AiConfig, TurnPolicy};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Missing {0} environment variable")]
    Missing(&'static str),

    #[error("Invalid value '{value}' for {name}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhatsAppConfig {
    pub access_token: String,
    pub phone_number_id: String,
    pub verify_token: String,
    pub api_version: String,
}

/// Which Google credentials were supplied.
#[derive(Debug, Clone, PartialEq)]
pub enum GoogleCredentials {
    RefreshToken {
        client_id: String,
        client_secret: String,
        refresh_token: String,
    },
    ServiceAccountFile(String),
    ServiceAccountJson(String),
}

#[derive(Debug, Clone)]
pub struct BotConfig {
    pub gemini_api_key: String,
    pub ai: AiConfig,
    pub system_prompt: String,
    pub policy: TurnPolicy,
    pub whatsapp: WhatsAppConfig,
    pub port: u16,
    /// Sender ids or display names allowed to talk to the bot. Empty allows
    /// everyone.
    pub allowed_senders: Vec<String>,
    pub allow_group_messages: bool,
    pub google: Option<GoogleCredentials>,
    pub linear_api_key: Option<String>,
}

impl BotConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from any variable source. Blank values count
    /// as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let defaults = AiConfig::default();
        let ai = AiConfig {
            model: env.get("AI_MODEL").unwrap_or(defaults.model),
            temperature: env.parse("AI_TEMPERATURE")?.unwrap_or(defaults.temperature),
            max_tokens: env.parse("AI_MAX_TOKENS")?,
            top_p: env.parse("AI_TOP_P")?.or(defaults.top_p),
            reasoning_enabled: env.parse("AI_REASONING_ENABLED")?,
            reasoning_effort: env.get("AI_REASONING_EFFORT"),
        };

        let policy_defaults = TurnPolicy::default();
        let policy = TurnPolicy {
            max_tool_iterations: env
                .parse("AI_MAX_TOOL_ITERATIONS")?
                .unwrap_or(policy_defaults.max_tool_iterations),
            max_history: env
                .parse("AI_MAX_HISTORY")?
                .unwrap_or(policy_defaults.max_history),
            model_timeout: env
                .secs("AI_MODEL_TIMEOUT_SECS")?
                .unwrap_or(policy_defaults.model_timeout),
            tool_timeout: env
                .secs("AI_TOOL_TIMEOUT_SECS")?
                .unwrap_or(policy_defaults.tool_timeout),
            turn_timeout: env
                .secs("AI_TURN_TIMEOUT_SECS")?
                .unwrap_or(policy_defaults.turn_timeout),
        };
        if policy.max_history == 0 {
            return Err(ConfigError::Invalid {
                name: "AI_MAX_HISTORY",
                value: "0".to_string(),
                reason: "must keep at least one turn".to_string(),
            });
        }

        let whatsapp = WhatsAppConfig {
            access_token: env.require("WHATSAPP_TOKEN")?,
            phone_number_id: env.require("PHONE_NUMBER_ID")?,
            verify_token: env.require("VERIFY_TOKEN")?,
            api_version: env
                .get("WHATSAPP_API_VERSION")
                .unwrap_or_else(|| "v18.0".to_string()),
        };

        let allowed_senders = env
            .get("ALLOWED_SENDERS")
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            gemini_api_key: env.require("GEMINI_API_KEY")?,
            ai,
            system_prompt: system_prompt(&env),
            policy,
            whatsapp,
            port: env.parse("PORT")?.unwrap_or(3000),
            allowed_senders,
            allow_group_messages: env.parse("ALLOW_GROUP_MESSAGES")?.unwrap_or(false),
            google: google_credentials(&env),
            linear_api_key: env.get("LINEAR_API_KEY"),
        })
    }
}

/// `AI_SYSTEM_PROMPT_FILE` wins over `AI_SYSTEM_PROMPT`; an unreadable file
/// falls back to the built-in prompt.
fn system_prompt<F: Fn(&str) -> Option<String>>(env: &Env<F>) -> String {
    if let Some(path) = env.get("AI_SYSTEM_PROMPT_FILE") {
        return std::fs::read_to_string(&path).unwrap_or_else(|e| {
            tracing::warn!("Failed to read system prompt file at {}: {}", path, e);
            DEFAULT_SYSTEM_PROMPT.to_string()
        });
    }
    env.get("AI_SYSTEM_PROMPT")
        .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string())
}

/// Refresh-token credentials take precedence over a service account.
fn google_credentials<F: Fn(&str) -> Option<String>>(env: &Env<F>) -> Option<GoogleCredentials> {
    if let (Some(client_id), Some(client_secret), Some(refresh_token)) = (
        env.get("GOOGLE_CLIENT_ID"),
        env.get("GOOGLE_CLIENT_SECRET"),
        env.get("GOOGLE_REFRESH_TOKEN"),
    ) {
        return Some(GoogleCredentials::RefreshToken {
            client_id,
            client_secret,
            refresh_token,
        });
    }
    if let Some(path) = env.get("GOOGLE_SERVICE_ACCOUNT_KEY") {
        return Some(GoogleCredentials::ServiceAccountFile(path));
    }
    env.get("GOOGLE_SERVICE_ACCOUNT_JSON")
        .map(GoogleCredentials::ServiceAccountJson)
}

struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn get(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn require(&self, name: &'static str) -> Result<String, ConfigError> {
        self.get(name).ok_or(ConfigError::Missing(name))
    }

    fn parse<T>(&self, name: &'static str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(name) {
            None => Ok(None),
            Some(value) => value
                .parse()
                .map(Some)
                .map_err(|e: T::Err| ConfigError::Invalid {
                    name,
                    reason: e.to_string(),
                    value,
                }),
        }
    }

    fn secs(&self, name: &'static str) -> Result<Option<Duration>, ConfigError> {
        Ok(self.parse::<u64>(name)?.map(Duration::from_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    const REQUIRED: &[(&str, &str)] = &[
        ("GEMINI_API_KEY", "gem-key"),
        ("WHATSAPP_TOKEN", "wa-token"),
        ("PHONE_NUMBER_ID", "12345"),
        ("VERIFY_TOKEN", "verify-me"),
    ];

    fn from_vars(vars: &[(&str, &str)]) -> Result<BotConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        BotConfig::from_lookup(move |name| map.get(name).cloned())
    }

    fn load(extra: &[(&str, &str)]) -> Result<BotConfig, ConfigError> {
        let vars: Vec<(&str, &str)> = REQUIRED.iter().chain(extra.iter()).copied().collect();
        from_vars(&vars)
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();

        assert_eq!(config.ai.model, "gemini-2.5-flash");
        assert_eq!(config.policy.max_tool_iterations, 5);
        assert_eq!(config.policy.max_history, 40);
        assert_eq!(config.policy.tool_timeout, Duration::from_secs(30));
        assert_eq!(config.whatsapp.api_version, "v18.0");
        assert_eq!(config.port, 3000);
        assert!(config.allowed_senders.is_empty());
        assert!(!config.allow_group_messages);
        assert!(config.google.is_none());
        assert!(config.linear_api_key.is_none());
        assert_eq!(config.system_prompt, DEFAULT_SYSTEM_PROMPT);
    }

    #[test]
    fn test_missing_required() {
        let err = from_vars(&[("GEMINI_API_KEY", "k")]).unwrap_err();
        assert_eq!(err, ConfigError::Missing("WHATSAPP_TOKEN"));

        // Blank counts as missing
        let err = from_vars(&[
            ("GEMINI_API_KEY", "  "),
            ("WHATSAPP_TOKEN", "t"),
            ("PHONE_NUMBER_ID", "1"),
            ("VERIFY_TOKEN", "v"),
        ])
        .unwrap_err();
        assert_eq!(err, ConfigError::Missing("GEMINI_API_KEY"));
    }

    #[test]
    fn test_invalid_number() {
        let err = load(&[("AI_MAX_TOOL_ITERATIONS", "lots")]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid { name: "AI_MAX_TOOL_ITERATIONS", .. }
        ));
    }

    #[test]
    fn test_overrides_and_lists() {
        let config = load(&[
            ("AI_MAX_TOOL_ITERATIONS", "3"),
            ("AI_TURN_TIMEOUT_SECS", "90"),
            ("ALLOWED_SENDERS", "15551234567, Ana ,,"),
            ("ALLOW_GROUP_MESSAGES", "true"),
            ("LINEAR_API_KEY", "lin_api"),
        ])
        .unwrap();

        assert_eq!(config.policy.max_tool_iterations, 3);
        assert_eq!(config.policy.turn_timeout, Duration::from_secs(90));
        assert_eq!(config.allowed_senders, vec!["15551234567", "Ana"]);
        assert!(config.allow_group_messages);
        assert_eq!(config.linear_api_key.as_deref(), Some("lin_api"));
    }

    #[test]
    fn test_google_credentials_precedence() {
        let config = load(&[
            ("GOOGLE_CLIENT_ID", "id"),
            ("GOOGLE_CLIENT_SECRET", "secret"),
            ("GOOGLE_REFRESH_TOKEN", "refresh"),
            ("GOOGLE_SERVICE_ACCOUNT_JSON", "{}"),
        ])
        .unwrap();
        assert!(matches!(
            config.google,
            Some(GoogleCredentials::RefreshToken { .. })
        ));

        // Incomplete OAuth credentials fall through to the service account
        let config = load(&[
            ("GOOGLE_CLIENT_ID", "id"),
            ("GOOGLE_SERVICE_ACCOUNT_KEY", "/etc/sa.json"),
        ])
        .unwrap();
        assert_eq!(
            config.google,
            Some(GoogleCredentials::ServiceAccountFile("/etc/sa.json".to_string()))
        );
    }

    #[test]
    fn test_system_prompt_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "You are the ops assistant.").unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let config = load(&[
            ("AI_SYSTEM_PROMPT", "inline prompt"),
            ("AI_SYSTEM_PROMPT_FILE", path.as_str()),
        ])
        .unwrap();
        assert_eq!(config.system_prompt, "You are the ops assistant.");

        let config = load(&[("AI_SYSTEM_PROMPT_FILE", "/nonexistent/prompt.txt")]).unwrap();
        assert_eq!(config.system_prompt, DEFAULT_SYSTEM_PROMPT);
    }
}
