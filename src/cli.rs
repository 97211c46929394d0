//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::config::ReportFormat;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// ReviewGate - parallel code review gate
///
/// Runs security, quality, coverage, documentation and AI review analyses
/// over a change concurrently, then decides: auto-approve, human review or
/// critical escalation.
///
/// Examples:
///   reviewgate pr https://github.com/owner/repo 42
///   reviewgate files src/ --format json -o review.json
///   reviewgate branch --repo . --base main --head feature/login
///   reviewgate demo --self-test
///   reviewgate init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Path to configuration file
    ///
    /// If not specified, looks for .reviewgate.toml in the current directory
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Output file path for the report
    #[arg(short, long, value_name = "FILE", global = true)]
    pub output: Option<PathBuf>,

    /// Report format (markdown, json)
    #[arg(long, value_name = "FORMAT", global = true)]
    pub format: Option<ReportFormat>,

    /// Enable verbose logging output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Number of files analyzed concurrently per task kind
    #[arg(long, value_name = "NUM", global = true)]
    pub concurrency: Option<usize>,

    /// Minimum security score (0-10)
    #[arg(long, value_name = "SCORE", global = true)]
    pub security_threshold: Option<f64>,

    /// Minimum quality score (0-10)
    #[arg(long, value_name = "SCORE", global = true)]
    pub quality_threshold: Option<f64>,

    /// Minimum test coverage percentage
    #[arg(long, value_name = "PERCENT", global = true)]
    pub coverage_threshold: Option<f64>,

    /// Minimum AI review confidence (0-1)
    #[arg(long, value_name = "CONFIDENCE", global = true)]
    pub ai_confidence_threshold: Option<f64>,

    /// Minimum documentation coverage percentage
    #[arg(long, value_name = "PERCENT", global = true)]
    pub documentation_threshold: Option<f64>,

    /// Ollama model used for the AI review
    #[arg(short, long, env = "REVIEWGATE_MODEL", global = true)]
    pub model: Option<String>,

    /// Ollama API endpoint URL
    #[arg(long, env = "OLLAMA_URL", global = true)]
    pub ollama_url: Option<String>,

    /// Use the offline AI reviewer (no model calls)
    #[arg(long, global = true)]
    pub offline_ai: bool,

    /// Exit with code 2 unless the verdict is auto-approve
    ///
    /// Useful for CI pipelines.
    #[arg(long, global = true)]
    pub strict_exit: bool,

    /// GitHub token for the pr command
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true, global = true)]
    pub github_token: Option<String>,

    /// SMTP password for email notification
    #[arg(long, env = "SMTP_PASSWORD", hide_env_values = true, global = true)]
    pub smtp_password: Option<String>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Review the changed files of a GitHub pull request
    Pr {
        /// Repository URL (https://github.com/owner/repo)
        repo: String,
        /// Pull request number
        number: u64,
    },

    /// Review local files and directories
    Files {
        /// Files or directories to review
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Review the changes of one branch against another
    Branch {
        /// Local repository path or clone URL
        #[arg(long, default_value = ".")]
        repo: String,
        /// Branch the changes are merged into
        #[arg(long, default_value = "main")]
        base: String,
        /// Branch carrying the changes
        #[arg(long)]
        head: String,
    },

    /// Review the bundled sample file
    Demo {
        /// Run the built-in decision scenarios instead
        #[arg(long)]
        self_test: bool,
    },

    /// Generate a default .reviewgate.toml configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if matches!(self.command, Command::InitConfig { .. }) {
            return Ok(());
        }

        match &self.command {
            Command::Pr { repo, number } => {
                if !repo.starts_with("https://") && !repo.starts_with("git@") {
                    return Err("Repository URL must start with 'https://' or 'git@'".to_string());
                }
                if *number == 0 {
                    return Err("Pull request number must be at least 1".to_string());
                }
            }
            Command::Files { paths } => {
                if let Some(missing) = paths.iter().find(|p| !p.exists()) {
                    return Err(format!("Path does not exist: {}", missing.display()));
                }
            }
            Command::Branch { base, head, .. } => {
                if base == head {
                    return Err("Base and head branches must differ".to_string());
                }
            }
            Command::Demo { .. } | Command::InitConfig { .. } => {}
        }

        // Validate Ollama URL format
        if let Some(ref url) = self.ollama_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("Ollama URL must start with 'http://' or 'https://'".to_string());
            }
        }

        // Validate concurrency
        if self.concurrency == Some(0) {
            return Err("Concurrency must be at least 1".to_string());
        }

        // Validate threshold ranges
        for (name, value, max) in [
            ("security", self.security_threshold, 10.0),
            ("quality", self.quality_threshold, 10.0),
            ("coverage", self.coverage_threshold, 100.0),
            ("AI confidence", self.ai_confidence_threshold, 1.0),
            ("documentation", self.documentation_threshold, 100.0),
        ] {
            if let Some(value) = value {
                if !(0.0..=max).contains(&value) {
                    return Err(format!(
                        "The {} threshold must be between 0 and {}",
                        name, max
                    ));
                }
            }
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args(command: Command) -> Args {
        Args {
            command,
            config: None,
            output: None,
            format: None,
            verbose: false,
            quiet: false,
            concurrency: None,
            security_threshold: None,
            quality_threshold: None,
            coverage_threshold: None,
            ai_confidence_threshold: None,
            documentation_threshold: None,
            model: None,
            ollama_url: None,
            offline_ai: false,
            strict_exit: false,
            github_token: None,
            smtp_password: None,
        }
    }

    fn pr() -> Command {
        Command::Pr {
            repo: "https://github.com/test/repo".to_string(),
            number: 7,
        }
    }

    #[test]
    fn test_parse_subcommand_with_global_flags() {
        let args = Args::try_parse_from([
            "reviewgate",
            "branch",
            "--head",
            "feature",
            "--strict-exit",
            "--coverage-threshold",
            "65",
            "--format",
            "json",
        ])
        .unwrap();

        assert_eq!(
            args.command,
            Command::Branch {
                repo: ".".to_string(),
                base: "main".to_string(),
                head: "feature".to_string(),
            }
        );
        assert!(args.strict_exit);
        assert_eq!(args.coverage_threshold, Some(65.0));
        assert_eq!(args.format, Some(ReportFormat::Json));
    }

    #[test]
    fn test_parse_demo_self_test() {
        let args = Args::try_parse_from(["reviewgate", "demo", "--self-test"]).unwrap();
        assert_eq!(args.command, Command::Demo { self_test: true });
    }

    #[test]
    fn test_validation_invalid_url() {
        let args = make_args(Command::Pr {
            repo: "invalid-url".to_string(),
            number: 1,
        });
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_threshold_range() {
        let mut args = make_args(pr());
        args.ai_confidence_threshold = Some(80.0);
        assert!(args.validate().is_err());

        args.ai_confidence_threshold = Some(0.8);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_missing_path() {
        let args = make_args(Command::Files {
            paths: vec![PathBuf::from("/no/such/path/here.py")],
        });
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args(pr());
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args(Command::Demo { self_test: false });
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }
}
