//! Configuration file handling.
//!
//! Loads `.reviewgate.toml` and merges command-line overrides into it.
//! Every field has a default, so an empty or partial file is valid.

use crate::agents::AiSettings;
use crate::models::ThresholdConfig;
use crate::orchestrator::{DispatchSettings, TaskTimeouts};
use crate::report::EmailSettings;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = ".reviewgate.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    /// Decision gates.
    #[serde(default)]
    pub thresholds: ThresholdConfig,

    #[serde(default)]
    pub timeouts: TimeoutConfig,

    #[serde(default)]
    pub ai: AiConfig,

    #[serde(default)]
    pub github: GitHubConfig,

    #[serde(default)]
    pub scanner: ScannerConfig,

    #[serde(default)]
    pub report: ReportConfig,

    /// Email notification; disabled when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<EmailSettings>,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Report output path. Defaults to `review_report.<ext>` for the
    /// configured report format.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,

    #[serde(default)]
    pub verbose: bool,

    /// Files analyzed concurrently within one task kind.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Exit with code 2 when the verdict is not auto-approve.
    #[serde(default)]
    pub strict_exit: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: None,
            verbose: false,
            concurrency: default_concurrency(),
            strict_exit: false,
        }
    }
}

fn default_concurrency() -> usize {
    4
}

/// Per-task and global timeouts, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_security_timeout")]
    pub security: u64,
    #[serde(default = "default_analysis_timeout")]
    pub quality: u64,
    #[serde(default = "default_analysis_timeout")]
    pub coverage: u64,
    #[serde(default = "default_ai_timeout")]
    pub ai_review: u64,
    #[serde(default = "default_documentation_timeout")]
    pub documentation: u64,
    /// Deadline for the whole dispatch, both waves included.
    #[serde(default = "default_global_timeout")]
    pub global_seconds: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            security: default_security_timeout(),
            quality: default_analysis_timeout(),
            coverage: default_analysis_timeout(),
            ai_review: default_ai_timeout(),
            documentation: default_documentation_timeout(),
            global_seconds: default_global_timeout(),
        }
    }
}

fn default_security_timeout() -> u64 {
    30
}

fn default_analysis_timeout() -> u64 {
    60
}

fn default_ai_timeout() -> u64 {
    180
}

fn default_documentation_timeout() -> u64 {
    30
}

fn default_global_timeout() -> u64 {
    300
}

/// AI reviewer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    /// Use the deterministic offline reviewer instead of Ollama.
    #[serde(default)]
    pub offline: bool,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// HTTP request timeout in seconds.
    #[serde(default = "default_ai_timeout")]
    pub timeout_seconds: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            offline: false,
            model: default_model(),
            ollama_url: default_ollama_url(),
            temperature: default_temperature(),
            timeout_seconds: default_ai_timeout(),
        }
    }
}

fn default_model() -> String {
    "llama3.2:latest".to_string()
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_temperature() -> f32 {
    0.1
}

/// GitHub API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Normally supplied through `GITHUB_TOKEN`.
    #[serde(default, skip_serializing)]
    pub token: Option<String>,

    #[serde(default = "default_github_timeout")]
    pub timeout_seconds: u64,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            token: None,
            timeout_seconds: default_github_timeout(),
        }
    }
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_github_timeout() -> u64 {
    30
}

/// File selection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Maximum files per review.
    #[serde(default = "default_max_files")]
    pub max_files: usize,

    /// File extensions to include.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Directory or file names to exclude.
    #[serde(default = "default_excludes")]
    pub excludes: Vec<String>,

    /// Maximum file size in bytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: usize,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            max_files: default_max_files(),
            extensions: default_extensions(),
            excludes: default_excludes(),
            max_file_size: default_max_file_size(),
        }
    }
}

fn default_max_files() -> usize {
    50
}

fn default_extensions() -> Vec<String> {
    vec![
        "py", "rs", "js", "ts", "jsx", "tsx", "go", "java", "c", "cpp", "h", "hpp", "cs", "rb",
        "php", "swift", "kt", "scala",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_excludes() -> Vec<String> {
    vec![
        ".git",
        "target",
        "node_modules",
        "vendor",
        "dist",
        "build",
        "__pycache__",
        ".venv",
        "venv",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_max_file_size() -> usize {
    512 * 1024
}

/// Report file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Markdown,
    Json,
}

impl ReportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ReportFormat::Markdown => "md",
            ReportFormat::Json => "json",
        }
    }
}

/// Report output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(default)]
    pub format: ReportFormat,

    /// Print the summary to the terminal.
    #[serde(default = "default_true")]
    pub console: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            format: ReportFormat::default(),
            console: true,
        }
    }
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load `.reviewgate.toml` from `dir`.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default(dir: &Path) -> Result<Option<Self>> {
        let default_path = dir.join(CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(&default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Resolve the configuration for a run: the explicit path if given,
    /// else `.reviewgate.toml` in `dir`, else defaults.
    ///
    /// A config file that exists but does not parse is an error.
    pub fn discover(explicit: Option<&Path>, dir: &Path) -> Result<Self> {
        if let Some(path) = explicit {
            info!("Loading config from: {}", path.display());
            return Self::load(path);
        }

        match Self::load_default(dir).with_context(|| format!("Invalid {}", CONFIG_FILE))? {
            Some(config) => {
                info!("Loaded default config from {}", CONFIG_FILE);
                Ok(config)
            }
            None => {
                debug!("No config file found, using defaults");
                Ok(Config::default())
            }
        }
    }

    /// Merge command-line overrides. Only values given on the command line
    /// (or through their environment variables) replace file settings.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref output) = args.output {
            self.general.output = Some(output.display().to_string());
        }
        if let Some(format) = args.format {
            self.report.format = format;
        }
        if let Some(concurrency) = args.concurrency {
            self.general.concurrency = concurrency;
        }
        if args.verbose {
            self.general.verbose = true;
        }
        if args.strict_exit {
            self.general.strict_exit = true;
        }
        if args.quiet {
            self.report.console = false;
        }

        let overrides = [
            (&mut self.thresholds.security, args.security_threshold),
            (&mut self.thresholds.quality, args.quality_threshold),
            (&mut self.thresholds.coverage, args.coverage_threshold),
            (&mut self.thresholds.ai_confidence, args.ai_confidence_threshold),
            (&mut self.thresholds.documentation, args.documentation_threshold),
        ];
        for (slot, value) in overrides {
            if let Some(value) = value {
                *slot = value;
            }
        }

        if let Some(ref model) = args.model {
            self.ai.model = model.clone();
        }
        if let Some(ref url) = args.ollama_url {
            self.ai.ollama_url = url.clone();
        }
        if args.offline_ai {
            self.ai.offline = true;
        }

        if args.github_token.is_some() {
            self.github.token = args.github_token.clone();
        }
        if let (Some(email), Some(password)) = (self.email.as_mut(), args.smtp_password.as_ref()) {
            email.password = Some(password.clone());
        }
    }

    /// Reject values the pipeline cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.general.concurrency == 0 {
            bail!("Concurrency must be at least 1");
        }
        if self.scanner.max_files == 0 {
            bail!("Max files must be at least 1");
        }

        let t = &self.thresholds;
        for (name, value, max) in [
            ("security", t.security, 10.0),
            ("quality", t.quality, 10.0),
            ("coverage", t.coverage, 100.0),
            ("ai_confidence", t.ai_confidence, 1.0),
            ("documentation", t.documentation, 100.0),
        ] {
            if !(0.0..=max).contains(&value) {
                bail!("Threshold '{}' must be between 0 and {}, got {}", name, max, value);
            }
        }

        let timeouts = &self.timeouts;
        if [
            timeouts.security,
            timeouts.quality,
            timeouts.coverage,
            timeouts.ai_review,
            timeouts.documentation,
            timeouts.global_seconds,
        ]
        .contains(&0)
        {
            bail!("Timeouts must be at least 1 second");
        }

        if !self.ai.offline
            && !self.ai.ollama_url.starts_with("http://")
            && !self.ai.ollama_url.starts_with("https://")
        {
            bail!("Ollama URL must start with 'http://' or 'https://'");
        }
        if !(0.0..=1.0).contains(&self.ai.temperature) {
            bail!("Temperature must be between 0.0 and 1.0");
        }

        Ok(())
    }

    /// Dispatcher settings derived from `[general]` and `[timeouts]`.
    pub fn dispatch_settings(&self, show_progress: bool) -> DispatchSettings {
        let t = &self.timeouts;
        DispatchSettings {
            concurrency: self.general.concurrency,
            timeouts: TaskTimeouts {
                security: Duration::from_secs(t.security),
                quality: Duration::from_secs(t.quality),
                coverage: Duration::from_secs(t.coverage),
                ai_review: Duration::from_secs(t.ai_review),
                documentation: Duration::from_secs(t.documentation),
            },
            global_timeout: Duration::from_secs(t.global_seconds),
            show_progress,
        }
    }

    /// Where the report file is written.
    pub fn output_path(&self) -> String {
        self.general
            .output
            .clone()
            .unwrap_or_else(|| format!("review_report.{}", self.report.format.extension()))
    }

    pub fn ai_settings(&self) -> AiSettings {
        AiSettings {
            ollama_url: self.ai.ollama_url.clone(),
            model: self.ai.model.clone(),
            temperature: self.ai.temperature,
            timeout_seconds: self.ai.timeout_seconds,
        }
    }

    /// Generate the default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.ai.model, "llama3.2:latest");
        assert_eq!(config.thresholds.security, 8.0);
        assert_eq!(config.timeouts.global_seconds, 300);
        assert!(config.scanner.extensions.contains(&"py".to_string()));
        assert!(config.email.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[general]
output = "gate.md"
concurrency = 8

[thresholds]
coverage = 60.0

[timeouts]
ai_review = 90
global_seconds = 120

[ai]
offline = true

[report]
format = "json"

[email]
smtp_host = "smtp.example.com"
from = "gate@example.com"
to = ["lead@example.com"]
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.output_path(), "gate.md");
        assert_eq!(config.general.concurrency, 8);
        assert_eq!(config.thresholds.coverage, 60.0);
        assert_eq!(config.thresholds.quality, 7.0);
        assert_eq!(config.timeouts.ai_review, 90);
        assert_eq!(config.timeouts.security, 30);
        assert!(config.ai.offline);
        assert_eq!(config.report.format, ReportFormat::Json);

        let email = config.email.unwrap();
        assert_eq!(email.smtp_port, 587);
        assert_eq!(email.to, vec!["lead@example.com"]);
    }

    #[test]
    fn test_default_output_follows_format() {
        let mut config = Config::default();
        assert_eq!(config.output_path(), "review_report.md");

        config.report.format = ReportFormat::Json;
        assert_eq!(config.output_path(), "review_report.json");

        config.general.output = Some("gate.txt".to_string());
        assert_eq!(config.output_path(), "gate.txt");
    }

    #[test]
    fn test_dispatch_settings_from_timeouts() {
        let mut config = Config::default();
        config.timeouts.coverage = 5;
        config.general.concurrency = 2;

        let settings = config.dispatch_settings(false);
        assert_eq!(settings.concurrency, 2);
        assert_eq!(settings.timeouts.coverage, Duration::from_secs(5));
        assert_eq!(settings.timeouts.ai_review, Duration::from_secs(180));
        assert_eq!(settings.global_timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.thresholds.ai_confidence = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.timeouts.quality = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.ai.ollama_url = "localhost:11434".to_string();
        assert!(config.validate().is_err());
        config.ai.offline = true;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "[thresholds]\nsecurity = 9.0\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.thresholds.security, 9.0);

        std::fs::write(&path, "[thresholds\n").unwrap();
        let err = Config::load(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_discover_falls_back_to_defaults_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::discover(None, dir.path()).unwrap();
        assert_eq!(config.thresholds, ThresholdConfig::default());
    }

    #[test]
    fn test_discover_reads_file_in_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "[thresholds]\nsecurity = 9.5\ncoverage = 95.0\n",
        )
        .unwrap();

        let config = Config::discover(None, dir.path()).unwrap();
        assert_eq!(config.thresholds.security, 9.5);
        assert_eq!(config.thresholds.coverage, 95.0);
    }

    #[test]
    fn test_discover_rejects_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "[thresholds]\nsecurity = 9.5\ncoverage = 95.0\nquality = \"oops\"\n",
        )
        .unwrap();

        let err = Config::discover(None, dir.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("Invalid .reviewgate.toml"));
    }

    #[test]
    fn test_discover_explicit_path_wins() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "[thresholds]\nsecurity = 9.5\n").unwrap();
        let explicit = dir.path().join("gate.toml");
        std::fs::write(&explicit, "[thresholds]\nsecurity = 6.0\n").unwrap();

        let config = Config::discover(Some(&explicit), dir.path()).unwrap();
        assert_eq!(config.thresholds.security, 6.0);
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[thresholds]"));
        assert!(toml_str.contains("[timeouts]"));
        assert!(!toml_str.contains("token"));

        let reparsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(reparsed.thresholds, ThresholdConfig::default());
    }
}
