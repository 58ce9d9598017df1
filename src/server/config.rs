//! Server configuration: environment-driven knobs plus CLI flags (spec §4.9,
//! §6), mirroring the teacher's `Cli` struct / `clap::Parser` convention.

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "chatterlang-serve")]
#[command(about = "Hosts a ChatterLang script as a session-isolated streaming HTTP service")]
pub struct ServerArgs {
    /// Path to a ChatterLang script file used as the server-level template.
    /// Every session compiles its own isolated graph from this source.
    #[arg(short, long)]
    pub script: Option<String>,

    /// Inline ChatterLang script source, used when `--script` is absent.
    #[arg(long)]
    pub script_source: Option<String>,

    /// TCP port to listen on.
    #[arg(short, long, default_value_t = 8000)]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    pub log_level: String,
}

/// Environment-driven server configuration (spec §6's "Environment-driven
/// knobs"), read once at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub cors_allowed_origins: Vec<String>,
    pub api_key: Option<String>,
    pub session_ttl_seconds: u64,
    pub default_llm_model: Option<String>,
    pub default_llm_source: Option<String>,
    pub llm_base_url: Option<String>,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            cors_allowed_origins: std::env::var("CORS_ALLOWED_ORIGINS")
                .ok()
                .map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
                .unwrap_or_default(),
            api_key: std::env::var("TALKPIPE_API_KEY").ok().filter(|s| !s.is_empty()),
            session_ttl_seconds: std::env::var("SESSION_TTL_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(24 * 60 * 60),
            default_llm_model: std::env::var("DEFAULT_LLM_MODEL").ok(),
            default_llm_source: std::env::var("DEFAULT_LLM_SOURCE").ok(),
            llm_base_url: std::env::var("LLM_BASE_URL").ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ttl_is_24_hours_when_unset() {
        std::env::remove_var("SESSION_TTL_SECONDS");
        assert_eq!(ServerConfig::from_env().session_ttl_seconds, 24 * 60 * 60);
    }
}
