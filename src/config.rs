//! Configuration Loader
//! - CLI argument parsing with clap
//! - Reads `jasmine-runner.toml` for extra source roots, suffixes and
//!   environment variables exposed to scripts as `process.env`

use crate::discovery::default_suffixes;
use crate::runner::RunOptions;
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Default config file name, looked up in the test root
pub const CONFIG_FILE_NAME: &str = "jasmine-runner.toml";

// =============================================================================
// CLI Configuration
// =============================================================================

/// Output format for run results
#[derive(ValueEnum, Clone, Debug, Default, PartialEq)]
pub enum OutputFormat {
    /// Human-readable report (to stdout)
    #[default]
    Human,
    /// Machine-readable NDJSON (to stdout)
    Json,
}

/// jasmine-runner - run Jasmine-style JavaScript specs
#[derive(Parser, Debug)]
#[command(name = "jasmine-runner", version, about = "Run Jasmine-style JavaScript specs")]
pub struct Cli {
    /// Directory scanned recursively for *.test.js and *.spec.js files
    pub test_root: PathBuf,

    /// Source roots searched by require(), in order (first match wins)
    pub source_roots: Vec<PathBuf>,

    /// Output format (also: JASMINE_RUNNER_FORMAT env var)
    #[arg(long, value_enum, default_value_t = OutputFormat::Human, env = "JASMINE_RUNNER_FORMAT")]
    pub format: OutputFormat,

    /// Path to generate JUnit XML report (also: JASMINE_RUNNER_JUNIT_XML env var)
    #[arg(long, env = "JASMINE_RUNNER_JUNIT_XML")]
    pub junit_xml: Option<PathBuf>,

    /// Config file (default: <TEST_ROOT>/jasmine-runner.toml if present)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Disable ANSI colours in the human report
    #[arg(long)]
    pub no_color: bool,

    /// List discovered test files without running them
    #[arg(long)]
    pub list: bool,

    /// Watch for changes and re-run specs automatically
    #[arg(long, short = 'w')]
    pub watch: bool,
}

// =============================================================================
// Config File
// =============================================================================

#[derive(Deserialize, Default, Debug)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub runner: RunnerSection,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

#[derive(Deserialize, Default, Debug)]
#[serde(deny_unknown_fields)]
pub struct RunnerSection {
    /// Extra source roots, relative to the config file's directory
    #[serde(default)]
    pub source_roots: Vec<PathBuf>,
    /// Replaces the default test file suffixes when set
    pub suffixes: Option<Vec<String>>,
}

impl FileConfig {
    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }
}

/// Load the config file at `path`.
///
/// A missing file yields the defaults; an unreadable or malformed one is an error.
pub fn load_file_config(path: &Path) -> Result<FileConfig> {
    if !path.exists() {
        return Ok(FileConfig::default());
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let config = FileConfig::parse(&contents)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    tracing::debug!(path = %path.display(), "loaded config file");
    Ok(config)
}

/// Merge CLI arguments and the config file into the options for one run.
pub fn resolve_options(cli: &Cli) -> Result<RunOptions> {
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| cli.test_root.join(CONFIG_FILE_NAME));

    if cli.config.is_some() && !config_path.exists() {
        anyhow::bail!("config file {} does not exist", config_path.display());
    }

    let file = load_file_config(&config_path)?;
    let config_dir = config_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();

    // CLI roots first: order decides resolution
    let mut source_roots = cli.source_roots.clone();
    source_roots.extend(file.runner.source_roots.iter().map(|p| config_dir.join(p)));

    let suffixes = match file.runner.suffixes {
        Some(s) if !s.is_empty() => s,
        Some(_) => anyhow::bail!("{}: [runner].suffixes must not be empty", config_path.display()),
        None => default_suffixes(),
    };

    Ok(RunOptions {
        test_root: cli.test_root.clone(),
        source_roots,
        suffixes,
        env: file.env,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["jasmine-runner"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_parse_full_config() {
        let config = FileConfig::parse(
            r#"
[runner]
source_roots = ["../scripts", "lib"]
suffixes = ["_spec.js"]

[env]
OPENIDM_URL = "http://localhost:8080"
"#,
        )
        .unwrap();
        assert_eq!(config.runner.source_roots.len(), 2);
        assert_eq!(config.runner.suffixes, Some(vec!["_spec.js".to_string()]));
        assert_eq!(
            config.env.get("OPENIDM_URL").map(String::as_str),
            Some("http://localhost:8080")
        );
    }

    #[test]
    fn test_parse_empty_config() {
        let config = FileConfig::parse("").unwrap();
        assert!(config.runner.source_roots.is_empty());
        assert!(config.runner.suffixes.is_none());
        assert!(config.env.is_empty());
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(FileConfig::parse("[runner]\nsource_root = []\n").is_err());
    }

    #[test]
    fn test_missing_config_file_is_default() {
        let temp = TempDir::new().unwrap();
        let config = load_file_config(&temp.path().join(CONFIG_FILE_NAME)).unwrap();
        assert!(config.env.is_empty());
    }

    #[test]
    fn test_resolve_options_defaults() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().to_string_lossy().to_string();
        let options = resolve_options(&cli(&[&root, "/src/a", "/src/b"])).unwrap();

        assert_eq!(options.test_root, temp.path());
        assert_eq!(
            options.source_roots,
            vec![PathBuf::from("/src/a"), PathBuf::from("/src/b")]
        );
        assert_eq!(options.suffixes, default_suffixes());
    }

    #[test]
    fn test_config_roots_appended_after_cli_roots() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join(CONFIG_FILE_NAME),
            "[runner]\nsource_roots = [\"lib\"]\n[env]\nMODE = \"test\"\n",
        )
        .unwrap();

        let root = temp.path().to_string_lossy().to_string();
        let options = resolve_options(&cli(&[&root, "/src/a"])).unwrap();
        assert_eq!(
            options.source_roots,
            vec![PathBuf::from("/src/a"), temp.path().join("lib")]
        );
        assert_eq!(options.env.get("MODE").map(String::as_str), Some("test"));
    }

    #[test]
    fn test_explicit_missing_config_is_error() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().to_string_lossy().to_string();
        let result = resolve_options(&cli(&[&root, "--config", "/no/such/file.toml"]));
        assert!(result.is_err());
    }

    #[test]
    fn test_malformed_config_is_error() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(CONFIG_FILE_NAME), "[runner\n").unwrap();
        let root = temp.path().to_string_lossy().to_string();
        assert!(resolve_options(&cli(&[&root])).is_err());
    }

    #[test]
    fn test_empty_suffixes_rejected() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(CONFIG_FILE_NAME), "[runner]\nsuffixes = []\n").unwrap();
        let root = temp.path().to_string_lossy().to_string();
        assert!(resolve_options(&cli(&[&root])).is_err());
    }
}
