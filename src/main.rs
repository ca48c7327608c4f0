use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use forestcarbon::cli::{
    Cli, Commands, RunOverrides, TierOverrides, load_config, render_template, resolve_config,
};
use forestcarbon::input::PipelineConfig;
use forestcarbon::log::{config_echo, show_farewell_with_timing, show_greeting, show_report};
use forestcarbon::mount::Tier;
use forestcarbon::{check_inputs, list_tier, run_pipeline};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match &cli.command {
        Commands::Run { overrides, dry_run } => {
            run(cli.config.as_deref(), overrides, *dry_run, cli.quiet).await
        }
        Commands::Validate {
            config_file,
            detailed,
            check_inputs,
        } => {
            let path = config_file.as_deref().or(cli.config.as_deref());
            validate(path, *detailed, *check_inputs, cli.quiet).await
        }
        Commands::Template {
            template_type,
            format,
            output,
        } => {
            let rendered = render_template(*template_type, *format)?;
            write_output(output.as_ref(), &rendered)
        }
        Commands::List { tier, overrides } => {
            list(cli.config.as_deref(), (*tier).into(), overrides).await
        }
        Commands::Completions { shell, output } => {
            let mut buffer = Vec::new();
            clap_complete::generate(*shell, &mut Cli::command(), "forestcarbon", &mut buffer);
            write_output(output.as_ref(), &String::from_utf8_lossy(&buffer))
        }
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    let default_level = if verbose {
        "debug"
    } else if quiet {
        "error"
    } else {
        "info"
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_secs()
        .init();
}

fn spinner(quiet: bool, message: &str) -> Option<ProgressBar> {
    if quiet {
        return None;
    }

    let pb = ProgressBar::new_spinner();
    if let Ok(style) =
        ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")
    {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    Some(pb)
}

async fn run(
    config_path: Option<&Path>,
    overrides: &RunOverrides,
    dry_run: bool,
    quiet: bool,
) -> Result<()> {
    let start_time = Instant::now();

    if !quiet {
        let source = config_path
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "defaults".to_string());
        show_greeting(&source);
    }

    let config = resolve_config(config_path, overrides).context("Failed to load configuration")?;
    if !quiet {
        config_echo(&config);
    }

    if dry_run {
        let inputs = check_inputs(&config)
            .await
            .context("Dry run failed")?;
        for (kind, path) in inputs {
            info!("{} found at {}", kind, path);
        }
        info!("Dry run complete, nothing written");
        return Ok(());
    }

    let progress = spinner(quiet, "Running pipeline...");
    let result = run_pipeline(&config).await;
    if let Some(pb) = &progress {
        pb.finish_and_clear();
    }

    let report = result.context("Pipeline run failed")?;
    debug!("{:?}", report);

    if !quiet {
        show_report(&report);
        show_farewell_with_timing(start_time.elapsed());
    }

    Ok(())
}

async fn validate(
    config_path: Option<&Path>,
    detailed: bool,
    inputs: bool,
    quiet: bool,
) -> Result<()> {
    let config = load_config(config_path).context("Failed to load configuration")?;
    config.validate().context("Configuration is invalid")?;

    if inputs {
        check_inputs(&config)
            .await
            .context("Raw input check failed")?;
    }

    if detailed {
        print_resolved(&config)?;
    }

    if !quiet {
        println!("Configuration is valid");
    }

    Ok(())
}

fn print_resolved(config: &PipelineConfig) -> Result<()> {
    println!("{}", config.to_yaml()?);
    Ok(())
}

async fn list(config_path: Option<&Path>, tier: Tier, overrides: &TierOverrides) -> Result<()> {
    let mut config = load_config(config_path).context("Failed to load configuration")?;
    overrides.apply(&mut config.tiers);

    let files = list_tier(&config, tier)
        .await
        .with_context(|| format!("Failed to list {} tier", tier))?;

    for file in files {
        println!("{}", file);
    }

    Ok(())
}

fn write_output(output: Option<&PathBuf>, content: &str) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Wrote {}", path.display());
        }
        None => print!("{}", content),
    }

    Ok(())
}
