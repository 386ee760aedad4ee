use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use invoice_validator::{
    cli::{Args, Commands, Config, Verbosity},
    document::{load_raw_text, DocumentKind},
    logging::init_logging,
    streaming::OllamaClient,
    ComplianceEngine, ParsedInvoice, PipelineOrchestrator, PipelineState, RunSummary,
};
use std::path::Path;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let verbosity = args.verbosity();

    if let Commands::Config { init: true, force } = &args.command {
        let path = Config::init_file(args.config.clone(), *force)?;
        println!("{} Wrote default configuration to {}", "✓".green(), path.display());
        return Ok(());
    }

    let mut config = Config::load(args.config.clone()).context("Failed to load configuration")?;

    if let Commands::Validate {
        backend,
        model,
        threshold,
        output_dir,
        ..
    } = &args.command
    {
        if let Some(backend) = backend {
            config.llm.backend = *backend;
        }
        if let Some(model) = model {
            config.llm.model = model.clone();
        }
        if let Some(threshold) = threshold {
            config.pipeline.confidence_threshold = *threshold;
        }
        if let Some(dir) = output_dir {
            config.paths.reports_dir = dir.to_string_lossy().into_owned();
        }
        config.validate()?;
    }

    let progress_bar = matches!(args.command, Commands::Validate { .. }) && verbosity.show_progress();
    let log_path = init_logging(&config.log_dir(), verbosity, progress_bar)?;
    info!(log = %log_path.display(), verbosity = verbosity.as_str(), "Logging initialised");

    match &args.command {
        Commands::Validate { file, .. } => {
            let ok = run_validate(&config, file, verbosity).await?;
            if !ok {
                std::process::exit(1);
            }
        }
        Commands::Check { file } => {
            run_check(file)?;
        }
        Commands::Config { .. } => {
            show_config(&config, args.config.as_deref())?;
        }
        Commands::Doctor => {
            run_doctor(&config).await?;
        }
    }

    Ok(())
}

/// Stream a full pipeline run to the terminal; `false` when the run failed
async fn run_validate(config: &Config, file: &Path, verbosity: Verbosity) -> Result<bool> {
    let kind = DocumentKind::from_path(file)?;
    kind.ensure_backend(config.llm.backend)?;
    let raw = load_raw_text(file).await?;

    if verbosity != Verbosity::Quiet {
        println!(
            "{} {} ({}, backend: {})",
            "📄 Validating".bold(),
            file.display(),
            kind,
            config.llm.backend
        );
    }

    let orchestrator = PipelineOrchestrator::from_config(config)?;
    let (mut rx, handle) = orchestrator.spawn_with_handle(raw);

    let pb = if verbosity.show_progress() {
        let pb = ProgressBar::new(100);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos:>3}% {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        Some(pb)
    } else {
        None
    };

    let mut printed = 0usize;
    let mut final_report: Option<String> = None;

    while let Some(event) = rx.recv().await {
        let lines: Vec<&str> = event.log.lines().collect();
        for line in lines.iter().skip(printed) {
            if let Some(pb) = &pb {
                if verbosity.show_events() || !is_step_line(line) {
                    pb.println(colorize_line(line));
                }
            }
        }
        printed = lines.len();

        if let Some(pb) = &pb {
            pb.set_position((event.progress * 100.0).round() as u64);
            pb.set_message(strip_timestamp(event.latest_line()).to_string());
        }
        if event.report.is_some() {
            final_report = event.report;
        }
    }

    if let Some(pb) = &pb {
        pb.finish_and_clear();
    }

    let summary = handle.await.context("Pipeline task panicked")??;

    if let Some(report) = &final_report {
        println!("\n{}", report);
    }
    print_summary(&summary, verbosity);

    Ok(summary.succeeded())
}

fn print_summary(summary: &RunSummary, verbosity: Verbosity) {
    if let Some((kind, message)) = &summary.failure {
        eprintln!("{} {:?}: {}", "✗ Run failed".red().bold(), kind, message);
        return;
    }
    if verbosity == Verbosity::Quiet {
        return;
    }

    let route = if summary.visited(PipelineState::ReportingLowConfidence) {
        "data quality report".yellow()
    } else {
        "full validation".green()
    };
    println!("{} {}", "✓ Completed:".green().bold(), route);
    if let Some(confidence) = summary.confidence {
        println!("  Parse confidence: {}%", confidence);
    }
    if let Some(path) = &summary.report_path {
        println!("  Report: {}", path.display());
    }
    println!("  Run ID: {}", summary.run_id);
}

/// Rule engine only, on an already-structured invoice
fn run_check(file: &Path) -> Result<()> {
    let contents = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let invoice = ParsedInvoice::from_json_str(&contents)?;
    let report = ComplianceEngine::new().evaluate(&invoice);

    println!("{}", report.to_json_pretty());

    let score = report.overall_compliance_score;
    let line = format!(
        "Compliance score: {}% ({} of {} checks failed)",
        score,
        report.failed_checks(),
        report.total_checks()
    );
    if report.failed_checks() == 0 {
        println!("{}", line.green());
    } else {
        println!("{}", line.yellow());
    }
    Ok(())
}

fn show_config(config: &Config, path: Option<&Path>) -> Result<()> {
    println!("\n╔═══════════════════════════════════════════════════════╗");
    println!("║ Invoice Validator Configuration                       ║");
    println!("╚═══════════════════════════════════════════════════════╝\n");

    match path.map(Path::to_path_buf).or_else(Config::default_path) {
        Some(p) if p.exists() => println!("Source: {}\n", p.display()),
        _ => println!("Source: built-in defaults\n"),
    }

    print!("{}", config.to_toml()?);
    println!();
    Ok(())
}

async fn run_doctor(config: &Config) -> Result<()> {
    let client = OllamaClient::with_config(&config.ollama_url(), &config.llm.model)?;

    println!("\nChecking Ollama at {}...\n", client.base_url());

    match client.health_check().await {
        Ok(true) => println!("{} Ollama API reachable", "✓".green()),
        Ok(false) | Err(_) => {
            println!("{} Ollama API not reachable", "✗".red());
            eprintln!("\nIs Ollama running? Start with: ollama serve");
            warn!(url = %client.base_url(), "Ollama health check failed");
            std::process::exit(1);
        }
    }

    let models = client.list_models().await?;
    if models.is_empty() {
        println!("{} No models installed", "⚠".yellow());
        println!("\nPull a model with:");
        println!("  ollama pull {}", client.model());
    } else {
        let configured = models.iter().any(|m| m == client.model());
        if configured {
            println!("{} Model {} available", "✓".green(), client.model());
        } else {
            println!("{} Model {} not installed", "⚠".yellow(), client.model());
        }
        println!("\nAvailable models:");
        for model in models {
            println!("  • {}", model);
        }
    }
    println!();

    Ok(())
}

fn strip_timestamp(line: &str) -> &str {
    match line.find("] ") {
        Some(idx) if line.starts_with('[') => &line[idx + 2..],
        _ => line,
    }
}

fn is_step_line(line: &str) -> bool {
    let body = strip_timestamp(line);
    body.starts_with("🔄") || body.starts_with("📝 Output")
}

fn colorize_line(line: &str) -> String {
    let body = strip_timestamp(line);
    if body.starts_with("❌") {
        line.red().to_string()
    } else if body.starts_with("⚠") {
        line.yellow().to_string()
    } else if body.starts_with("✅") || body.starts_with("🎉") {
        line.green().to_string()
    } else if is_step_line(line) {
        line.dimmed().to_string()
    } else {
        line.to_string()
    }
}
