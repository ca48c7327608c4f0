//! # CLI Module
//!
//! This module provides the command-line interface for forestcarbon, including:
//! - Argument parsing with clap
//! - Configuration file loading (JSON/YAML)
//! - Environment variable support with the FORESTCARBON_ prefix
//! - Layering of file configuration and command-line overrides
//! - Subcommands for running, validating and inspecting a pipeline

use crate::datasets::PerCapitaPolicy;
use crate::input::{ConfigError, PipelineConfig, TierLocations};
use crate::merge::JoinMode;
use crate::mount::Tier;
use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::{Path, PathBuf};

/// Batch pipeline merging forest coverage and CO2 emission datasets
#[derive(Parser, Debug)]
#[command(name = "forestcarbon")]
#[command(about = "Clean, reshape and merge forest area and CO2 emission datasets")]
#[command(version)]
#[command(long_about = "
forestcarbon moves four country-level datasets through three storage tiers:
raw CSV files, structured Parquet tables with normalized column names, and
a curated Parquet table joining forest area (km² and %) with CO2 emissions
per country and year.

Each tier is a local directory or an S3 location (s3://bucket/prefix).
Every run rewrites every table.

EXAMPLES:
  # Run with the default tier locations
  forestcarbon run

  # Run against local directories
  forestcarbon run --raw ./bronze --structured ./silver --curated ./gold

  # Keep forest rows without emission data
  forestcarbon run --join-mode left

  # Check configuration and raw files without writing anything
  forestcarbon run --config pipeline.yaml --dry-run

  # Generate a configuration template
  forestcarbon template s3 --format yaml > pipeline.yaml

  # Generate completions
  forestcarbon completions bash > ~/.bash_completion.d/forestcarbon
")]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet mode - suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Configuration file path (JSON or YAML)
    #[arg(short, long, global = true, env = "FORESTCARBON_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the pipeline
    #[command(long_about = "
Run every stage of the pipeline: load the raw CSV files, write the
structured tables, clean and reshape them, join them and write the curated
table.

Tier locations and policies come from the configuration file when given,
and are overridden by the options below or their environment variables.

EXAMPLES:
  forestcarbon run --raw s3://tp-bronze --structured s3://tp-silver --curated s3://tp-gold
  forestcarbon run --window 2000:2020 --per-capita keep
  forestcarbon run --dry-run
")]
    Run {
        #[command(flatten)]
        overrides: RunOverrides,

        /// Dry run - validate configuration and raw files without processing
        #[arg(long, env = "FORESTCARBON_DRY_RUN")]
        dry_run: bool,
    },

    /// Validate a configuration file
    #[command(long_about = "
Validate a configuration file without processing.

EXAMPLES:
  forestcarbon validate pipeline.json
  forestcarbon validate pipeline.yaml --detailed
  forestcarbon validate --config pipeline.yaml --check-inputs
")]
    Validate {
        /// Configuration file to validate
        config_file: Option<PathBuf>,

        /// Show the resolved configuration
        #[arg(long)]
        detailed: bool,

        /// Also check that every raw file exists
        #[arg(long)]
        check_inputs: bool,
    },

    /// Generate configuration templates
    #[command(long_about = "
Generate a configuration file template.

Available templates:
• default: tiers mounted under /mnt
• local: relative local directories
• s3: S3 buckets

EXAMPLES:
  forestcarbon template default
  forestcarbon template local --format yaml -o pipeline.yaml
")]
    Template {
        /// Template type to generate
        #[arg(value_enum, default_value_t = TemplateType::Default)]
        template_type: TemplateType,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = ConfigFormat::Json)]
        format: ConfigFormat,

        /// Output file path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List the files stored in a tier
    List {
        /// Tier to list
        #[arg(value_enum, default_value_t = TierArg::Raw)]
        tier: TierArg,

        #[command(flatten)]
        overrides: TierOverrides,
    },

    /// Generate shell completions
    #[command(long_about = "
Generate shell completion scripts for bash, zsh, fish and PowerShell.

INSTALLATION:
  # Bash
  forestcarbon completions bash > ~/.bash_completion.d/forestcarbon

  # Zsh
  forestcarbon completions zsh > ~/.zsh/completions/_forestcarbon

  # Fish
  forestcarbon completions fish > ~/.config/fish/completions/forestcarbon.fish
")]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,

        /// Output file path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Tier location overrides shared by `run` and `list`
#[derive(clap::Args, Debug, Clone, Default, PartialEq)]
pub struct TierOverrides {
    /// Raw tier root (local directory or s3://bucket/prefix)
    #[arg(long, env = "FORESTCARBON_RAW")]
    pub raw: Option<String>,

    /// Structured tier root
    #[arg(long, env = "FORESTCARBON_STRUCTURED")]
    pub structured: Option<String>,

    /// Curated tier root
    #[arg(long, env = "FORESTCARBON_CURATED")]
    pub curated: Option<String>,
}

/// Overrides accepted by `run`
#[derive(clap::Args, Debug, Clone, Default, PartialEq)]
pub struct RunOverrides {
    #[command(flatten)]
    pub tiers: TierOverrides,

    /// Analysis window: start:end (inclusive)
    #[arg(long, env = "FORESTCARBON_WINDOW", value_parser = parse_window)]
    pub window: Option<WindowArg>,

    /// How unmatched rows are treated by the merge
    #[arg(long, value_enum, env = "FORESTCARBON_JOIN_MODE")]
    pub join_mode: Option<JoinMode>,

    /// When the per-capita emission column is dropped
    #[arg(long, value_enum, env = "FORESTCARBON_PER_CAPITA")]
    pub per_capita: Option<PerCapitaPolicy>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TemplateType {
    /// Tiers mounted under /mnt
    Default,
    /// Local directories under ./data
    Local,
    /// S3 buckets
    S3,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigFormat {
    /// JSON configuration format
    Json,
    /// YAML configuration format
    Yaml,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TierArg {
    Raw,
    Structured,
    Curated,
}

impl From<TierArg> for Tier {
    fn from(arg: TierArg) -> Self {
        match arg {
            TierArg::Raw => Tier::Raw,
            TierArg::Structured => Tier::Structured,
            TierArg::Curated => Tier::Curated,
        }
    }
}

/// Analysis window argument from command line
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindowArg {
    pub start: i32,
    pub end: i32,
}

/// Parse analysis window from command line argument
/// Format: start:end
pub fn parse_window(s: &str) -> Result<WindowArg, String> {
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 2 {
        return Err("Window must be in format 'start:end'".to_string());
    }

    let start = parts[0]
        .trim()
        .parse::<i32>()
        .map_err(|_| "Invalid start year in window")?;
    let end = parts[1]
        .trim()
        .parse::<i32>()
        .map_err(|_| "Invalid end year in window")?;

    if start > end {
        return Err("Start year must not be after end year".to_string());
    }

    Ok(WindowArg { start, end })
}

impl TierOverrides {
    pub fn apply(&self, tiers: &mut TierLocations) {
        if let Some(raw) = &self.raw {
            tiers.raw = raw.clone();
        }
        if let Some(structured) = &self.structured {
            tiers.structured = structured.clone();
        }
        if let Some(curated) = &self.curated {
            tiers.curated = curated.clone();
        }
    }
}

impl RunOverrides {
    pub fn apply(&self, config: &mut PipelineConfig) {
        self.tiers.apply(&mut config.tiers);

        if let Some(window) = self.window {
            config.window.start = window.start;
            config.window.end = window.end;
        }
        if let Some(join_mode) = self.join_mode {
            config.join_mode = join_mode;
        }
        if let Some(per_capita) = self.per_capita {
            config.per_capita = per_capita;
        }
    }
}

/// Loads the configuration file when given, the defaults otherwise
pub fn load_config(path: Option<&Path>) -> Result<PipelineConfig, ConfigError> {
    match path {
        Some(path) => PipelineConfig::from_file(path),
        None => Ok(PipelineConfig::default()),
    }
}

/// Resolves the configuration of a run.
/// Priority: CLI arguments > Environment variables > file > defaults
pub fn resolve_config(
    path: Option<&Path>,
    overrides: &RunOverrides,
) -> Result<PipelineConfig, ConfigError> {
    let mut config = load_config(path)?;
    overrides.apply(&mut config);
    Ok(config)
}

/// Configuration produced by `template`
pub fn generate_template(template_type: TemplateType) -> PipelineConfig {
    let mut config = PipelineConfig::default();

    match template_type {
        TemplateType::Default => {}
        TemplateType::Local => {
            config.tiers = TierLocations {
                raw: "./data/bronze".to_string(),
                structured: "./data/silver".to_string(),
                curated: "./data/gold".to_string(),
            };
        }
        TemplateType::S3 => {
            config.tiers = TierLocations {
                raw: "s3://tp-bronze".to_string(),
                structured: "s3://tp-silver".to_string(),
                curated: "s3://tp-gold".to_string(),
            };
        }
    }

    config
}

pub fn render_template(
    template_type: TemplateType,
    format: ConfigFormat,
) -> Result<String, ConfigError> {
    let config = generate_template(template_type);
    match format {
        ConfigFormat::Json => config.to_json(),
        ConfigFormat::Yaml => config.to_yaml(),
    }
}
