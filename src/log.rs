use crate::PipelineReport;
use crate::datasets::DatasetKind;
use crate::input::PipelineConfig;
use std::time::Duration;

pub fn show_greeting(config_source: &str) {
    println!("=== Forest & CO2 Emission Pipeline ===");
    println!("Loading configuration from: {}", config_source);
}

pub fn config_echo(config: &PipelineConfig) {
    println!("\nConfiguration:");
    println!("  Raw tier: {}", config.tiers.raw);
    println!("  Structured tier: {}", config.tiers.structured);
    println!("  Curated tier: {}", config.tiers.curated);
    println!(
        "  Analysis window: {} - {}",
        config.window.start, config.window.end
    );
    println!("  Join mode: {:?}", config.join_mode);
    println!("  Per-capita policy: {:?}", config.per_capita);

    for kind in DatasetKind::ALL {
        let dataset = config.datasets.get(kind);
        println!("    {}: {} -> {}", kind, dataset.raw_key, dataset.table);
    }
}

pub fn show_report(report: &PipelineReport) {
    println!("\nRaw files: {}", report.raw_files.len());

    println!("Structured tables:");
    for table in &report.structured {
        println!(
            "  {}: {} rows x {} columns",
            table.table, table.rows, table.columns
        );
    }

    println!(
        "Curated table {}: {} rows x {} columns",
        report.curated.table, report.curated.rows, report.curated.columns
    );
    println!("  Written to: {}", report.curated.path);
}

pub fn show_farewell_with_timing(elapsed: Duration) {
    println!(
        "\n=== Pipeline completed successfully in {:.2?}! ===",
        elapsed
    );
}
