//! # CLI Integration Tests
//!
//! This module provides tests for the command-line interface, covering
//! argument parsing of every subcommand and configuration resolution.

#[cfg(test)]
mod tests {
    use clap::Parser;
    use std::path::PathBuf;
    use std::sync::Mutex;

    use crate::cli::{Cli, Commands, ConfigFormat, TemplateType, TierArg, WindowArg, resolve_config};
    use crate::datasets::PerCapitaPolicy;
    use crate::merge::JoinMode;

    // Global mutex to ensure environment variable tests run sequentially
    static ENV_TEST_MUTEX: Mutex<()> = Mutex::new(());

    const ENV_VARS: [&str; 8] = [
        "FORESTCARBON_CONFIG",
        "FORESTCARBON_RAW",
        "FORESTCARBON_STRUCTURED",
        "FORESTCARBON_CURATED",
        "FORESTCARBON_WINDOW",
        "FORESTCARBON_JOIN_MODE",
        "FORESTCARBON_PER_CAPITA",
        "FORESTCARBON_DRY_RUN",
    ];

    /// Test basic CLI argument parsing
    #[test]
    fn test_cli_help() {
        let result = Cli::try_parse_from(["forestcarbon", "--help"]);
        assert!(result.is_err()); // --help causes early exit with "error"

        let error = result.unwrap_err();
        assert!(error.to_string().contains("three storage tiers"));

        let short = Cli::try_parse_from(["forestcarbon", "-h"]).unwrap_err();
        assert!(short.to_string().contains("forest area and CO2 emission"));
    }

    /// Test version argument
    #[test]
    fn test_cli_version() {
        let result = Cli::try_parse_from(["forestcarbon", "--version"]);
        assert!(result.is_err()); // --version causes early exit
    }

    /// Test global flags
    #[test]
    fn test_cli_global_flags() {
        let _guard = ENV_TEST_MUTEX.lock().unwrap();

        let cli = Cli::parse_from([
            "forestcarbon",
            "--verbose",
            "--config",
            "/path/to/pipeline.json",
            "template",
        ]);

        assert!(cli.verbose);
        assert!(!cli.quiet);
        assert_eq!(cli.config, Some(PathBuf::from("/path/to/pipeline.json")));
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        let result = Cli::try_parse_from(["forestcarbon", "-v", "-q", "run"]);
        assert!(result.is_err());
    }

    /// Test run command argument parsing
    #[test]
    fn test_run_command_with_overrides() {
        let _guard = ENV_TEST_MUTEX.lock().unwrap();

        let cli = Cli::parse_from([
            "forestcarbon",
            "run",
            "--raw",
            "s3://tp-bronze",
            "--curated",
            "./gold",
            "--window",
            "2000:2010",
            "--join-mode",
            "left",
            "--per-capita",
            "drop-before-null-check",
            "--dry-run",
        ]);

        if let Commands::Run { overrides, dry_run } = &cli.command {
            assert_eq!(overrides.tiers.raw, Some("s3://tp-bronze".to_string()));
            assert_eq!(overrides.tiers.structured, None);
            assert_eq!(overrides.tiers.curated, Some("./gold".to_string()));
            assert_eq!(
                overrides.window,
                Some(WindowArg {
                    start: 2000,
                    end: 2010
                })
            );
            assert_eq!(overrides.join_mode, Some(JoinMode::Left));
            assert_eq!(
                overrides.per_capita,
                Some(PerCapitaPolicy::DropBeforeNullCheck)
            );
            assert!(*dry_run);
        } else {
            panic!("Expected Run command");
        }
    }

    #[test]
    fn test_run_command_rejects_bad_values() {
        assert!(Cli::try_parse_from(["forestcarbon", "run", "--window", "2021:1990"]).is_err());
        assert!(Cli::try_parse_from(["forestcarbon", "run", "--join-mode", "outer"]).is_err());
        assert!(Cli::try_parse_from(["forestcarbon", "run", "--per-capita", "never"]).is_err());
    }

    /// Test validate command
    #[test]
    fn test_validate_command() {
        let cli = Cli::parse_from([
            "forestcarbon",
            "validate",
            "pipeline.yaml",
            "--detailed",
            "--check-inputs",
        ]);

        if let Commands::Validate {
            config_file,
            detailed,
            check_inputs,
        } = &cli.command
        {
            assert_eq!(config_file, &Some(PathBuf::from("pipeline.yaml")));
            assert!(*detailed);
            assert!(*check_inputs);
        } else {
            panic!("Expected Validate command");
        }
    }

    /// Test template command
    #[test]
    fn test_template_command() {
        let cli = Cli::parse_from([
            "forestcarbon",
            "template",
            "s3",
            "--format",
            "yaml",
            "-o",
            "pipeline.yaml",
        ]);

        if let Commands::Template {
            template_type,
            format,
            output,
        } = &cli.command
        {
            assert_eq!(*template_type, TemplateType::S3);
            assert_eq!(*format, ConfigFormat::Yaml);
            assert_eq!(output, &Some(PathBuf::from("pipeline.yaml")));
        } else {
            panic!("Expected Template command");
        }

        let cli = Cli::parse_from(["forestcarbon", "template"]);
        if let Commands::Template {
            template_type,
            format,
            output,
        } = &cli.command
        {
            assert_eq!(*template_type, TemplateType::Default);
            assert_eq!(*format, ConfigFormat::Json);
            assert!(output.is_none());
        } else {
            panic!("Expected Template command");
        }
    }

    /// Test list command
    #[test]
    fn test_list_command() {
        let _guard = ENV_TEST_MUTEX.lock().unwrap();

        let cli = Cli::parse_from(["forestcarbon", "list", "curated", "--curated", "./gold"]);

        if let Commands::List { tier, overrides } = &cli.command {
            assert_eq!(*tier, TierArg::Curated);
            assert_eq!(overrides.curated, Some("./gold".to_string()));
        } else {
            panic!("Expected List command");
        }
    }

    /// Test completions command
    #[test]
    fn test_completions_command() {
        let cli = Cli::parse_from(["forestcarbon", "completions", "bash"]);

        if let Commands::Completions { shell, output } = &cli.command {
            assert_eq!(*shell, clap_complete::Shell::Bash);
            assert!(output.is_none());
        } else {
            panic!("Expected Completions command");
        }
    }

    /// Test invalid commands
    #[test]
    fn test_invalid_commands() {
        let result = Cli::try_parse_from(["forestcarbon", "invalid-command"]);
        assert!(result.is_err());

        let result = Cli::try_parse_from(["forestcarbon", "completions"]);
        assert!(result.is_err());
    }

    /// Test environment variables feed the run overrides, and CLI arguments win
    #[test]
    fn test_environment_variable_overrides() {
        // Acquire mutex to ensure exclusive access to environment variables
        let _guard = ENV_TEST_MUTEX.lock().unwrap();

        use std::env;

        // Save existing environment state
        let original: Vec<Option<String>> = ENV_VARS.iter().map(|v| env::var(v).ok()).collect();

        unsafe {
            for var in ENV_VARS {
                env::remove_var(var);
            }
            env::set_var("FORESTCARBON_RAW", "s3://env-bronze");
            env::set_var("FORESTCARBON_STRUCTURED", "s3://env-silver");
            env::set_var("FORESTCARBON_JOIN_MODE", "left");
        }

        let cli = Cli::parse_from([
            "forestcarbon",
            "run",
            "--structured",
            "s3://cli-silver",
        ]);

        let config = match &cli.command {
            Commands::Run { overrides, .. } => resolve_config(None, overrides).unwrap(),
            _ => panic!("Expected Run command"),
        };

        // Cleanup and restore original state
        unsafe {
            for var in ENV_VARS {
                env::remove_var(var);
            }
            for (var, value) in ENV_VARS.iter().zip(original.iter()) {
                if let Some(val) = value {
                    env::set_var(var, val);
                }
            }
        }

        assert_eq!(config.tiers.raw, "s3://env-bronze");
        assert_eq!(config.tiers.structured, "s3://cli-silver");
        assert_eq!(config.tiers.curated, "/mnt/tp-gold");
        assert_eq!(config.join_mode, JoinMode::Left);
    }

    /// Test that a configuration file sits below command-line overrides
    #[test]
    fn test_config_file_with_overrides() -> Result<(), Box<dyn std::error::Error>> {
        let _guard = ENV_TEST_MUTEX.lock().unwrap();

        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("pipeline.json");
        std::fs::write(
            &path,
            r#"{ "tiers": { "raw": "./file-bronze", "curated": "./file-gold" }, "per_capita": "keep" }"#,
        )?;

        let path_arg = path.to_string_lossy().to_string();
        let cli = Cli::parse_from([
            "forestcarbon",
            "--config",
            path_arg.as_str(),
            "run",
            "--raw",
            "./cli-bronze",
        ]);

        let config = match &cli.command {
            Commands::Run { overrides, .. } => resolve_config(cli.config.as_deref(), overrides)?,
            _ => panic!("Expected Run command"),
        };

        assert_eq!(config.tiers.raw, "./cli-bronze");
        assert_eq!(config.tiers.curated, "./file-gold");
        assert_eq!(config.tiers.structured, "/mnt/tp-silver");
        assert_eq!(config.per_capita, PerCapitaPolicy::Keep);

        Ok(())
    }
}
