use anyhow::{Context, Result};
use std::env;
use std::fs::File;
use std::path::Path;
use tracing_subscriber::EnvFilter;

use world_ev_data::{Config, Pipeline, QualityEngine, SourceType, VERSION};

fn main() -> Result<()> {
    // A missing .env file is fine
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    let config = Config::from_env().context("Failed to read configuration")?;

    match args.get(1).map(String::as_str) {
        Some("kba") => run_kba(&config)?,
        Some("merge") => run_merge(&config)?,
        Some("check") => run_check(&config)?,
        _ => {
            print_usage();
            std::process::exit(1);
        }
    }

    Ok(())
}

fn print_usage() {
    eprintln!("world-ev-data {}", VERSION);
    eprintln!();
    eprintln!("Usage:");
    eprintln!("   world-ev-data kba     Aggregate KBA FZ 28 monthly files into one CSV");
    eprintln!("   world-ev-data merge   Merge all sources into one canonical CSV");
    eprintln!("   world-ev-data check   Run quality checks on every source");
    eprintln!();
    eprintln!("Data directory: $EV_DATA_DIR (default: data)");
}

fn run_kba(config: &Config) -> Result<()> {
    println!("🇩🇪 KBA FZ 28 - monthly new registrations");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let pipeline = Pipeline::new(config.clone());

    println!("\n📂 Reading monthly files...");
    let table = pipeline.kba_table().context("KBA aggregation failed")?;
    println!("✓ Aggregated {} months", table.len());

    let out = config.cache_dir.join("fz28_aggregated.csv");
    write_with(&out, |file| table.write_csv(file))?;
    println!("💾 Wrote {}", out.display());

    Ok(())
}

fn run_merge(config: &Config) -> Result<()> {
    println!("🔀 Merging all sources");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let pipeline = Pipeline::new(config.clone());

    println!("\n📂 Loading sources...");
    let report = pipeline
        .merge_sources(&SourceType::ALL)
        .context("Merge failed; coverage would be incomplete")?;
    println!("✓ {}", report.summary());

    for conflict in report.conflicts.iter().take(10) {
        println!(
            "   ⚠️  {} {} {}: kept {} ({}), {} reports {}",
            conflict.entity,
            conflict.period,
            conflict.metric.name(),
            conflict.kept_value,
            conflict.kept_source,
            conflict.other_source,
            conflict.other_value
        );
    }
    if report.conflicts.len() > 10 {
        println!("   ... and {} more conflicts", report.conflicts.len() - 10);
    }

    let out = config.cache_dir.join("merged.csv");
    write_with(&out, |file| report.merged.write_csv(file))?;
    println!("\n💾 Wrote {}", out.display());

    Ok(())
}

fn run_check(config: &Config) -> Result<()> {
    println!("✅ Quality checks");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let pipeline = Pipeline::new(config.clone());
    let engine = QualityEngine::new();
    let checks = pipeline.check_sources(&engine, &SourceType::ALL);

    for report in &checks.reports {
        let icon = if report.has_critical_issues() { "❌" } else { "✓" };
        println!("{} {}", icon, report.summary());
        for issue in report.issues.iter().take(5) {
            println!("   {:?} {} {}: {}", issue.severity, issue.entity, issue.field, issue.issue);
        }
    }
    for (source, e) in &checks.failures {
        println!("❌ {}: {}", source.name(), e);
    }

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("{}", engine.batch_summary(&checks.reports).summary());

    if !checks.all_loaded() {
        anyhow::bail!(
            "{} of {} sources could not be loaded",
            checks.failures.len(),
            SourceType::ALL.len()
        );
    }

    Ok(())
}

fn write_with<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(File) -> world_ev_data::Result<()>,
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    write(file).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
