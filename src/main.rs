use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thesis_examer::{
    config::api_key_var,
    llm::registry_from_config,
    structure::{estimate_minutes, outline},
    AnalysisMode, AnalysisOrchestrator, Backend, BackendId, CompletionGateway, CompletionRequest,
    Config, FallbackTable, ReportFormat, Reporter, StructureExtractor,
};

#[derive(Parser)]
#[command(name = "thesis-examer")]
#[command(about = "Section-by-section LLM review of LaTeX theses")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a LaTeX document
    Analyze {
        /// LaTeX source file
        input: PathBuf,

        /// Configuration file path
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output directory for reports (defaults to analysis.output_directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Segmentation preset
        #[arg(long, value_enum)]
        mode: Option<AnalysisMode>,

        /// Minimum word count for a unit to be analyzed
        #[arg(long)]
        min_words: Option<usize>,

        /// Do not switch to another backend when the routed one fails
        #[arg(long)]
        no_fallback: bool,

        /// Skip the final outline review
        #[arg(long)]
        no_outline: bool,

        /// Report format to export
        #[arg(long, value_enum, default_value = "all")]
        format: ReportFormat,
    },
    /// List the units a run would analyze, without calling any backend
    Outline {
        /// LaTeX source file
        input: PathBuf,

        /// Configuration file path
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Segmentation preset
        #[arg(long, value_enum)]
        mode: Option<AnalysisMode>,

        /// Minimum word count for a unit to be analyzed
        #[arg(long)]
        min_words: Option<usize>,
    },
    /// Check credentials and probe every configured backend once
    Diagnose {
        /// Configuration file path
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Generate a default configuration file
    Config {
        /// Output path for the config file (defaults to ~/.thesis-examer.toml)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    match cli.command {
        Commands::Analyze {
            input,
            config,
            output,
            mode,
            min_words,
            no_fallback,
            no_outline,
            format,
        } => {
            let mut config = Config::load_from(config.as_deref())?;
            apply_segmentation_overrides(&mut config, mode, min_words);
            if no_fallback {
                config.retry.fallback_enabled = false;
            }
            if no_outline {
                config.analysis.outline_review = false;
            }
            analyze_document(&input, config, output, format).await?;
        }
        Commands::Outline {
            input,
            config,
            mode,
            min_words,
        } => {
            let mut config = Config::load_from(config.as_deref())?;
            apply_segmentation_overrides(&mut config, mode, min_words);
            show_outline(&input, &config)?;
        }
        Commands::Diagnose { config } => {
            let config = Config::load_from(config.as_deref())?;
            diagnose(&config).await?;
        }
        Commands::Config { output } => {
            generate_config(output)?;
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) -> anyhow::Result<()> {
    let directive = if verbose {
        "thesis_examer=debug"
    } else {
        "thesis_examer=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(directive.parse()?),
        )
        .with_target(false)
        .init();
    Ok(())
}

/// A mode given on the command line replaces the configured preset, including any
/// explicit level list.
fn apply_segmentation_overrides(
    config: &mut Config,
    mode: Option<AnalysisMode>,
    min_words: Option<usize>,
) {
    if let Some(mode) = mode {
        config.segmentation.mode = mode;
        config.segmentation.levels = None;
        config.segmentation.min_words = None;
    }
    if let Some(min_words) = min_words {
        config.segmentation.min_words = Some(min_words);
    }
}

async fn analyze_document(
    input: &Path,
    config: Config,
    output: Option<PathBuf>,
    format: ReportFormat,
) -> anyhow::Result<()> {
    println!("🚀 Starting Thesis Examer Analysis");
    println!("==================================");

    let start_time = Instant::now();
    let output_path = output.unwrap_or_else(|| config.analysis.output_directory.clone());

    println!("📄 Document: {}", input.display());
    println!("📤 Output directory: {}", output_path.display());
    println!(
        "🧩 Mode: {} ({})",
        config.segmentation.mode,
        config.segmentation.mode.description()
    );

    let document = thesis_examer::read_document(input)?;
    let extractor = StructureExtractor::new()?;
    let units = extractor.extract(&document, &config.segmentation_params());

    if units.is_empty() {
        println!("⚠️  No structural unit passed the segmentation filter, nothing to analyze.");
        return Ok(());
    }

    let policy = config.retry_policy();
    let registry = registry_from_config(&config.llm, policy.timeout)?;
    if registry.is_empty() {
        let vars: Vec<&str> = BackendId::ALL.into_iter().map(api_key_var).collect();
        anyhow::bail!(
            "no backend has credentials; set one of {} or add api_key to the config",
            vars.join(", ")
        );
    }

    let tasks = config.task_config(&registry);
    let (low, high) = estimate_minutes(units.len());
    println!("🤖 Backends available: {:?}", registry.available());
    println!("📋 Routing:");
    for (task, backend) in tasks.iter() {
        println!("   - {}: {}", task, backend);
    }
    println!(
        "⏱️  {} units to analyze, estimated {}-{} minutes",
        units.len(),
        low,
        high
    );

    let gateway = CompletionGateway::new(registry, FallbackTable::default(), policy);
    let orchestrator = AnalysisOrchestrator::new(gateway, config.llm.max_tokens)
        .with_outline_review(config.analysis.outline_review);
    let stats = orchestrator.run(&units, &tasks, &document).await?;

    let summary = stats.summary();
    println!("\n📈 Run statistics:");
    println!("   Units analyzed: {}", summary.units_analyzed);
    println!(
        "   Calls: {} (errors: {}, fallbacks: {})",
        summary.total_calls, summary.total_errors, summary.total_fallbacks
    );
    println!("   Success rate: {:.1}%", summary.success_rate);
    println!("   Mean latency: {:.2}s", summary.mean_latency_secs);
    for backend in &summary.backends {
        println!(
            "   - {}: {} ok, {} errors, {:.2}s mean",
            backend.backend, backend.successful_calls, backend.errors, backend.mean_latency_secs
        );
    }

    println!("\n📊 Generating reports...");
    let reporter = Reporter::new();
    let report = reporter.generate_report(&stats, input, config.segmentation.mode, &tasks);
    let exported_files = reporter.export_report(&report, &output_path, format)?;

    println!(
        "\n✅ Analysis completed in {:.2} min",
        start_time.elapsed().as_secs_f64() / 60.0
    );
    println!("📁 Reports exported to:");
    for file in exported_files {
        println!("   - {}", file.display());
    }

    Ok(())
}

fn show_outline(input: &Path, config: &Config) -> anyhow::Result<()> {
    let document = thesis_examer::read_document(input)?;
    let extractor = StructureExtractor::new()?;
    let params = config.segmentation_params();
    let units = extractor.extract(&document, &params);

    println!("📄 {} ({} words)", input.display(), extractor.count_words(&document));
    println!(
        "🧩 Levels: {:?}, minimum {} words",
        params.allowed_levels, params.min_words
    );
    println!();

    if units.is_empty() {
        println!("No structural unit passed the segmentation filter.");
        return Ok(());
    }

    print!("{}", outline(&units));
    let (low, high) = estimate_minutes(units.len());
    println!("\n⏱️  {} units, estimated {}-{} minutes", units.len(), low, high);
    Ok(())
}

async fn diagnose(config: &Config) -> anyhow::Result<()> {
    println!("🩺 Backend diagnostics");
    println!("======================");

    for id in BackendId::ALL {
        let provider = config.llm.provider(id);
        let status = if provider.api_key.is_some() { "set" } else { "missing" };
        println!(
            "🔑 {} ({}): {} [{}]",
            id,
            provider.model,
            status,
            api_key_var(id)
        );
    }

    let timeout = Duration::from_secs(config.retry.timeout_seconds);
    let registry = registry_from_config(&config.llm, timeout)?;
    if registry.is_empty() {
        println!("\n❌ No backend has credentials.");
        return Ok(());
    }

    let probe = CompletionRequest {
        system_prompt: "You are a connectivity check.".to_string(),
        user_prompt: "Reply with the single word OK.".to_string(),
        temperature: 0.0,
        max_tokens: 16,
    };

    println!();
    for id in registry.available() {
        let Some(backend) = registry.get(id) else {
            continue;
        };
        let started = Instant::now();
        match tokio::time::timeout(timeout, backend.complete(&probe)).await {
            Ok(Ok(text)) => println!(
                "✅ {}: responded in {:.2}s ({})",
                id,
                started.elapsed().as_secs_f64(),
                text.trim()
            ),
            Ok(Err(e)) => println!("❌ {}: {}", id, e),
            Err(_) => println!("❌ {}: no response within {}s", id, timeout.as_secs()),
        }
    }

    Ok(())
}

fn generate_config(output_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config_path = output_path.unwrap_or_else(|| {
        Config::default_config_path().unwrap_or_else(|_| PathBuf::from("thesis-examer.toml"))
    });

    println!("📝 Generating configuration file: {}", config_path.display());
    std::fs::write(&config_path, Config::create_documented_config())?;

    println!("✅ Configuration file created successfully!");
    println!("💡 Edit the file to customize segmentation, retries and task routing.");
    println!();
    println!("🔧 API keys can also come from the environment:");
    for id in BackendId::ALL {
        println!("  • {}: {}", id, api_key_var(id));
    }

    Ok(())
}
