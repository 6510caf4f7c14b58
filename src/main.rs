//! IndicOCR command line front end

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use indic_ocr::benchmark::{self, report, BenchmarkHarness, HttpOcrClient};
use indic_ocr::config::{self, parse_language_list, AppConfig};
use indic_ocr::storage::{self, ResultDocument};
use indic_ocr::vision::{ModelManager, ModelInstancePool, PaddleModelLoader};
use indic_ocr::{ArtifactMode, BatchOrchestrator, RecognitionService};

/// IndicOCR - Indic-script document text recognition
#[derive(Parser, Debug)]
#[command(name = "indic-ocr")]
#[command(about = "Text recognition for Hindi, Marathi, Telugu and Tamil document images")]
struct Cli {
    /// Configuration file (defaults to config.toml in the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List supported languages
    Languages,

    /// Load model instances ahead of time
    Preload {
        /// Language codes (defaults to the configured preload set)
        languages: Vec<String>,
    },

    /// Recognize a single image and print the result
    Recognize {
        image: PathBuf,

        #[arg(short, long)]
        lang: String,

        /// Do not write result artifacts
        #[arg(long)]
        no_save: bool,

        /// Do not draw the annotated image
        #[arg(long)]
        no_annotate: bool,
    },

    /// Recognize every image in a folder and print the manifest
    Batch {
        folder: PathBuf,

        #[arg(short, long)]
        lang: String,

        /// Include images in sub-directories
        #[arg(short, long)]
        recursive: bool,

        #[arg(long)]
        no_save: bool,

        #[arg(long)]
        no_annotate: bool,
    },

    /// Benchmark a running service against the labeled datasets
    Benchmark {
        /// Images sampled per language
        #[arg(short = 'n', long)]
        sample_size: Option<usize>,

        /// Comma-separated language codes
        #[arg(short, long)]
        languages: Option<String>,

        #[arg(long)]
        seed: Option<u64>,

        #[arg(long)]
        api_url: Option<String>,

        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Root the dataset directories are resolved against
        #[arg(long)]
        input_base: Option<PathBuf>,

        /// User tag embedded in the run id
        #[arg(short, long)]
        user: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = resolve_config(cli.config.as_deref())?;
    init_logging(&config.logging.level);

    match cli.command {
        Command::Languages => list_languages(&config),
        Command::Preload { languages } => preload(&config, languages).await,
        Command::Recognize {
            image,
            lang,
            no_save,
            no_annotate,
        } => recognize(&config, &image, &lang, ArtifactMode::from_flags(!no_save, !no_annotate)).await,
        Command::Batch {
            folder,
            lang,
            recursive,
            no_save,
            no_annotate,
        } => {
            batch(
                &config,
                &folder,
                &lang,
                recursive,
                ArtifactMode::from_flags(!no_save, !no_annotate),
            )
            .await
        }
        Command::Benchmark {
            sample_size,
            languages,
            seed,
            api_url,
            output_dir,
            input_base,
            user,
        } => {
            let mut config = config;
            let settings = &mut config.benchmark;
            if let Some(n) = sample_size {
                settings.sample_size = n;
            }
            if let Some(list) = languages {
                settings.languages = parse_language_list(&list);
            }
            if let Some(seed) = seed {
                settings.seed = seed;
            }
            if let Some(url) = api_url {
                settings.api_url = url;
            }
            if let Some(dir) = output_dir {
                settings.output_dir = Some(dir);
            }
            if let Some(user) = user {
                settings.user = user;
            }
            if let Some(base) = input_base {
                config.paths.input_base = base;
            }
            run_benchmark(&config).await
        }
    }
}

/// `--config` file, else the platform config file, else defaults; then
/// environment overrides
fn resolve_config(explicit: Option<&Path>) -> Result<AppConfig> {
    let mut config = match explicit {
        Some(path) => config::load_config(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => {
            let default_path = storage::get_config_dir().ok().map(|dir| dir.join("config.toml"));
            match default_path.filter(|p| p.is_file()) {
                Some(path) => config::load_config(&path)
                    .with_context(|| format!("Failed to load config from {:?}", path))?,
                None => AppConfig::default(),
            }
        }
    };
    config.apply_env_overrides();
    Ok(config)
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("{},ort=warn,reqwest=warn,hyper=warn", level)))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn build_pool(config: &AppConfig) -> Result<Arc<ModelInstancePool>> {
    let manager = match &config.paths.models_dir {
        Some(dir) => ModelManager::with_dir(dir.clone())?,
        None => ModelManager::new()?,
    };
    info!("Model directory: {:?}", manager.models_dir());

    let loader = PaddleModelLoader::new(manager, config.models.clone(), config.service.intra_threads);
    Ok(Arc::new(ModelInstancePool::new(config.language_table(), Arc::new(loader))))
}

/// Pool with the configured preload set already loaded
async fn build_service(config: &AppConfig) -> Result<Arc<RecognitionService>> {
    let pool = build_pool(config)?;
    if !config.service.preload_languages.is_empty() {
        let codes = config.service.preload_languages.clone();
        let loading = Arc::clone(&pool);
        tokio::task::spawn_blocking(move || loading.preload(&codes)).await?;
    }
    Ok(Arc::new(RecognitionService::new(pool, config)))
}

fn list_languages(config: &AppConfig) -> Result<()> {
    println!("Supported languages:");
    for (code, binding) in config.language_table() {
        println!(
            "  {:<4} {:<10} script: {:<12} model: {}",
            code, binding.name, binding.script, binding.model_family
        );
    }
    Ok(())
}

async fn preload(config: &AppConfig, languages: Vec<String>) -> Result<()> {
    let codes = if languages.is_empty() {
        config.service.preload_languages.clone()
    } else {
        languages
    };
    if codes.is_empty() {
        warn!("No languages to preload");
        return Ok(());
    }

    let pool = build_pool(config)?;
    let outcomes = tokio::task::spawn_blocking(move || pool.preload(&codes)).await?;

    let mut failed = 0;
    for (code, outcome) in &outcomes {
        match outcome {
            Ok(()) => println!("  {:<4} loaded", code),
            Err(e) => {
                failed += 1;
                println!("  {:<4} failed: {}", code, e);
            }
        }
    }
    if failed > 0 {
        anyhow::bail!("{} of {} languages failed to load", failed, outcomes.len());
    }
    Ok(())
}

async fn recognize(config: &AppConfig, image: &Path, lang: &str, artifacts: ArtifactMode) -> Result<()> {
    let service = build_service(config).await?;
    let outcome = service.recognize_path(image, lang, artifacts).await?;

    let filename = image
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let document = ResultDocument {
        filename: &filename,
        language: lang,
        processing_time_seconds: outcome.result.processing_time_seconds,
        results: &outcome.result.regions,
        full_text: &outcome.result.full_text,
    };
    println!("{}", serde_json::to_string_pretty(&document)?);

    if let Some(dir) = &outcome.output_dir {
        info!("Results saved to {:?}", dir);
    }
    Ok(())
}

async fn batch(
    config: &AppConfig,
    folder: &Path,
    lang: &str,
    recursive: bool,
    artifacts: ArtifactMode,
) -> Result<()> {
    let service = build_service(config).await?;
    let orchestrator = BatchOrchestrator::new(service);
    let manifest = orchestrator.run(folder, lang, recursive, artifacts).await?;

    println!("{}", serde_json::to_string_pretty(&manifest)?);
    Ok(())
}

async fn run_benchmark(config: &AppConfig) -> Result<()> {
    let settings = &config.benchmark;
    if settings.languages.is_empty() {
        anyhow::bail!("No languages selected for benchmarking");
    }

    let datasets: BTreeMap<String, Vec<PathBuf>> = settings
        .datasets
        .iter()
        .map(|(code, dirs)| {
            let resolved = dirs.iter().map(|d| config.paths.input_base.join(d)).collect();
            (code.clone(), resolved)
        })
        .collect();

    let client = HttpOcrClient::new(&settings.api_url, Duration::from_secs(settings.request_timeout_secs))?;
    info!("Benchmarking against {}", client.endpoint());

    let harness = BenchmarkHarness::new(client, benchmark::make_run_id(&settings.user), datasets);
    let result = harness
        .run(&settings.languages, settings.sample_size, settings.seed)
        .await;

    let output_dir = settings
        .output_dir
        .clone()
        .unwrap_or_else(|| config.paths.output_base.join("benchmarks"));
    let (details_path, summary_path) = report::report_paths(&output_dir, harness.run_id());
    report::write_details_csv(&details_path, &result.records)?;
    report::write_summary_csv(&summary_path, &result.summaries)?;

    print!("{}", report::format_summary_table(&result.summaries));
    println!("Details: {}", details_path.display());
    println!("Summary: {}", summary_path.display());
    Ok(())
}
