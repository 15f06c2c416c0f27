//! Stream plumbing configuration

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result as AnyResult};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StreamKind};
use crate::transform::{RuleSet, Transformation, DEFAULT_LOOKBACK};

/// One substitution as written in a config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConfig {
    pub pattern: String,

    #[serde(default)]
    pub replacement: String,

    /// Treat `pattern` and `replacement` as plain text.
    #[serde(default)]
    pub literal: bool,
}

impl RuleConfig {
    pub fn compile(&self) -> Result<Transformation> {
        if self.literal {
            Transformation::literal(&self.pattern, &self.replacement)
        } else {
            Transformation::new(&self.pattern, self.replacement.as_bytes())
        }
    }
}

/// Top-level configuration for a [`StreamHub`](crate::StreamHub).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Rules applied to bytes written into the process
    #[serde(default)]
    pub stdin: Vec<RuleConfig>,

    #[serde(default)]
    pub stdout: Vec<RuleConfig>,

    #[serde(default)]
    pub stderr: Vec<RuleConfig>,

    /// Bytes held back between writes to catch matches split across chunks
    #[serde(default = "default_lookback")]
    pub lookback: usize,

    /// Buffer size of each consumer pipe
    #[serde(default = "default_pipe_capacity")]
    pub pipe_capacity: usize,

    /// Read size of the copy tasks
    #[serde(default = "default_copy_buffer_size")]
    pub copy_buffer_size: usize,

    /// How long to wait for the copies before aborting the process I/O
    #[serde(default, with = "humantime_serde")]
    pub wait_timeout: Option<Duration>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            stdin: Vec::new(),
            stdout: Vec::new(),
            stderr: Vec::new(),
            lookback: default_lookback(),
            pipe_capacity: default_pipe_capacity(),
            copy_buffer_size: default_copy_buffer_size(),
            wait_timeout: None,
        }
    }
}

impl StreamConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Load from a `.toml`, `.yml` or `.yaml` file.
    pub fn load(path: &Path) -> AnyResult<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read stream config {}", path.display()))?;

        let config = match path.extension().and_then(|ext| ext.to_str()) {
            Some("yml") | Some("yaml") => Self::from_yaml_str(&content),
            Some("toml") => Self::from_toml_str(&content),
            other => anyhow::bail!(
                "Unsupported stream config format {:?} for {}",
                other.unwrap_or(""),
                path.display()
            ),
        };
        config.with_context(|| format!("Failed to parse stream config {}", path.display()))
    }

    /// Compile every rule list. The first invalid pattern aborts the compile.
    pub fn compile(&self) -> Result<(HubOptions, StreamRules)> {
        let options = HubOptions {
            lookback: self.lookback,
            pipe_capacity: self.pipe_capacity,
            copy_buffer_size: self.copy_buffer_size,
        };
        let rules = StreamRules {
            stdin: compile_rules(&self.stdin)?,
            stdout: compile_rules(&self.stdout)?,
            stderr: compile_rules(&self.stderr)?,
        };
        Ok((options, rules))
    }
}

fn compile_rules(rules: &[RuleConfig]) -> Result<RuleSet> {
    rules
        .iter()
        .map(RuleConfig::compile)
        .collect::<Result<Vec<_>>>()
        .map(RuleSet::new)
}

fn default_lookback() -> usize {
    DEFAULT_LOOKBACK
}

fn default_pipe_capacity() -> usize {
    64 * 1024
}

fn default_copy_buffer_size() -> usize {
    32 * 1024
}

/// Sizing of a hub's pipes, buffers and transform lookback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubOptions {
    pub lookback: usize,
    pub pipe_capacity: usize,
    pub copy_buffer_size: usize,
}

impl Default for HubOptions {
    fn default() -> Self {
        Self {
            lookback: default_lookback(),
            pipe_capacity: default_pipe_capacity(),
            copy_buffer_size: default_copy_buffer_size(),
        }
    }
}

/// Rule set per stream direction. All empty by default.
#[derive(Debug, Clone, Default)]
pub struct StreamRules {
    pub stdin: RuleSet,
    pub stdout: RuleSet,
    pub stderr: RuleSet,
}

impl StreamRules {
    /// The same rules on stdout and stderr, none on stdin.
    pub fn outbound(rules: RuleSet) -> Self {
        Self {
            stdin: RuleSet::empty(),
            stdout: rules.clone(),
            stderr: rules,
        }
    }

    pub fn for_kind(&self, kind: StreamKind) -> &RuleSet {
        match kind {
            StreamKind::Stdin => &self.stdin,
            StreamKind::Stdout => &self.stdout,
            StreamKind::Stderr => &self.stderr,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StreamError;
    use std::io::Write;
    use tempfile::{Builder, NamedTempFile};

    const TOML_CONFIG: &str = r#"
lookback = 256
wait_timeout = "10s"

[[stdout]]
pattern = "password=\\S+"
replacement = "password=***"

[[stderr]]
pattern = "$HOME"
replacement = "~"
literal = true
"#;

    fn temp_file(suffix: &str, content: &[u8]) -> NamedTempFile {
        let mut file = Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = StreamConfig::from_toml_str("").unwrap();
        assert_eq!(config, StreamConfig::default());
        assert_eq!(config.lookback, 100);
        assert_eq!(config.pipe_capacity, 64 * 1024);
        assert_eq!(config.copy_buffer_size, 32 * 1024);
        assert!(config.wait_timeout.is_none());
    }

    #[test]
    fn test_parse_toml() {
        let config = StreamConfig::from_toml_str(TOML_CONFIG).unwrap();
        assert_eq!(config.lookback, 256);
        assert_eq!(config.wait_timeout, Some(Duration::from_secs(10)));
        assert_eq!(config.stdout.len(), 1);
        assert!(config.stderr[0].literal);
        assert!(config.stdin.is_empty());
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
copy_buffer_size: 4096
wait_timeout: 1m 30s
stdout:
  - pattern: "token [a-f0-9]+"
    replacement: "token <hidden>"
"#;
        let config = StreamConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.copy_buffer_size, 4096);
        assert_eq!(config.wait_timeout, Some(Duration::from_secs(90)));
        assert_eq!(config.stdout[0].replacement, "token <hidden>");
    }

    #[test]
    fn test_compile_applies_rules_per_direction() {
        let config = StreamConfig::from_toml_str(TOML_CONFIG).unwrap();
        let (options, rules) = config.compile().unwrap();

        assert_eq!(options.lookback, 256);
        assert!(rules.stdin.is_empty());
        assert_eq!(
            rules.stdout.apply(b"login password=hunter2 ok"),
            b"login password=*** ok"
        );
        assert_eq!(rules.for_kind(StreamKind::Stderr).apply(b"$HOME/bin"), b"~/bin");
    }

    #[test]
    fn test_compile_reports_invalid_pattern() {
        let config = StreamConfig {
            stdout: vec![RuleConfig {
                pattern: "([".to_string(),
                replacement: String::new(),
                literal: false,
            }],
            ..Default::default()
        };
        assert!(matches!(
            config.compile(),
            Err(StreamError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_load_picks_format_from_extension() {
        let toml_file = temp_file(".toml", TOML_CONFIG.as_bytes());
        let config = StreamConfig::load(toml_file.path()).unwrap();
        assert_eq!(config.lookback, 256);

        let yaml_file = temp_file(".yaml", b"lookback: 12\n");
        assert_eq!(StreamConfig::load(yaml_file.path()).unwrap().lookback, 12);
    }

    #[test]
    fn test_load_rejects_unknown_extension_and_bad_content() {
        let json_file = temp_file(".json", b"{}");
        let err = StreamConfig::load(json_file.path()).unwrap_err();
        assert!(err.to_string().contains("Unsupported stream config format"));

        let broken = temp_file(".toml", b"lookback = \"many\"");
        let err = StreamConfig::load(broken.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse stream config"));

        let missing = StreamConfig::load(Path::new("/nonexistent/streams.toml")).unwrap_err();
        assert!(err_chain_contains(&missing, "Failed to read stream config"));
    }

    fn err_chain_contains(err: &anyhow::Error, needle: &str) -> bool {
        err.chain().any(|cause| cause.to_string().contains(needle))
    }
}
