// Configuration module for livescope
// Reads from environment variables with sensible defaults

use std::env;
use std::sync::OnceLock;
use tracing::warn;

/// Global configuration instance
static CONFIG: OnceLock<Config> = OnceLock::new();

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Tracked source extensions, without the dot (LIVESCOPE_EXTENSIONS)
    pub extensions: Vec<String>,

    /// Maximum recursion depth for function expansion (LIVESCOPE_MAX_DEPTH)
    pub max_depth: usize,

    /// Out-of-process compiler service request timeout (LIVESCOPE_REQUEST_TIMEOUT_MS)
    pub request_timeout_ms: u64,

    /// Language server command line (LIVESCOPE_LSP_COMMAND)
    pub lsp_command: Vec<String>,

    /// Route re-analysis debounce window (LIVESCOPE_DEBOUNCE_MS)
    pub debounce_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            extensions: vec!["ts".to_string(), "tsx".to_string()],
            max_depth: 8,
            request_timeout_ms: 5_000,
            lsp_command: vec![
                "typescript-language-server".to_string(),
                "--stdio".to_string(),
            ],
            debounce_ms: 50,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Self {
        let mut config = Config::default();

        if let Ok(val) = env::var("LIVESCOPE_EXTENSIONS") {
            let parsed = parse_list(&val, ',');
            if parsed.is_empty() {
                warn!(
                    "Invalid LIVESCOPE_EXTENSIONS value: {val:?}, using default: {}",
                    config.extensions.join(",")
                );
            } else {
                config.extensions = parsed
                    .into_iter()
                    .map(|ext| ext.trim_start_matches('.').to_string())
                    .collect();
            }
        }

        if let Ok(val) = env::var("LIVESCOPE_MAX_DEPTH") {
            if let Ok(parsed) = val.parse() {
                config.max_depth = parsed;
            } else {
                warn!(
                    "Invalid LIVESCOPE_MAX_DEPTH value: {val}, using default: {}",
                    config.max_depth
                );
            }
        }

        if let Ok(val) = env::var("LIVESCOPE_REQUEST_TIMEOUT_MS") {
            match val.parse::<u64>() {
                Ok(parsed) if parsed > 0 => config.request_timeout_ms = parsed,
                _ => warn!(
                    "Invalid LIVESCOPE_REQUEST_TIMEOUT_MS value: {val}, using default: {}",
                    config.request_timeout_ms
                ),
            }
        }

        if let Ok(val) = env::var("LIVESCOPE_LSP_COMMAND") {
            let parsed = parse_list(&val, ' ');
            if parsed.is_empty() {
                warn!(
                    "Invalid LIVESCOPE_LSP_COMMAND value: {val:?}, using default: {}",
                    config.lsp_command.join(" ")
                );
            } else {
                config.lsp_command = parsed;
            }
        }

        if let Ok(val) = env::var("LIVESCOPE_DEBOUNCE_MS") {
            if let Ok(parsed) = val.parse() {
                config.debounce_ms = parsed;
            } else {
                warn!(
                    "Invalid LIVESCOPE_DEBOUNCE_MS value: {val}, using default: {}",
                    config.debounce_ms
                );
            }
        }

        config
    }

    /// Get the global configuration instance
    pub fn get() -> &'static Config {
        CONFIG.get_or_init(Config::from_env)
    }
}

fn parse_list(raw: &str, separator: char) -> Vec<String> {
    raw.split(separator)
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.extensions, vec!["ts", "tsx"]);
        assert_eq!(config.max_depth, 8);
        assert_eq!(config.request_timeout_ms, 5_000);
        assert_eq!(config.lsp_command[0], "typescript-language-server");
        assert_eq!(config.debounce_ms, 50);
    }

    #[test]
    fn parse_list_drops_empty_items() {
        assert_eq!(parse_list(" ts, ,tsx ,", ','), vec!["ts", "tsx"]);
        assert_eq!(
            parse_list("tsserver  --stdio", ' '),
            vec!["tsserver", "--stdio"]
        );
        assert!(parse_list("  ", ',').is_empty());
    }
}
