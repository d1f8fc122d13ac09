//! promptloom - prompt composition engine for text-to-image services
//!
//! Composes prompts from fragment libraries and drives a Stable Diffusion
//! WebUI style API in batches.

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use promptloom::artifact::ArtifactStore;
use promptloom::config::{LibraryValidator, ValidationReport};
use promptloom::generator::{GenerateOptions, GenerationSummary, Generator};
use promptloom::library::{LibraryFile, LibraryLocator, PromptSet, TierPath};
use promptloom::prompt::{compose_negative, CompositionResult, PromptComposer, Sanitizer};
use promptloom::{GeneratorConfig, IntoLoomError, WebUiBackend};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "promptloom")]
#[command(version)]
#[command(about = "Compose prompts from fragment libraries and batch-generate images", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Project directory (defaults to current directory)
    #[arg(short, long, global = true, default_value = ".")]
    project: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone)]
struct TierArgs {
    /// Style directory under prompts/
    #[arg(long)]
    style: String,

    /// Category directory under the style
    #[arg(long, default_value = "")]
    category: String,

    /// Subcategory directory under the category
    #[arg(long, default_value = "")]
    subcategory: String,
}

impl TierArgs {
    fn tier(&self) -> TierPath {
        TierPath::new(&self.style, &self.category, &self.subcategory)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Generate images through the backend
    Generate {
        #[command(flatten)]
        tier: TierArgs,

        /// Number of original images
        #[arg(short, long)]
        count: Option<u32>,

        /// Variants per original image (same seed and base prompts)
        #[arg(long)]
        another_versions: Option<u32>,

        /// Backend base URL
        #[arg(long, env = "PROMPTLOOM_URL")]
        url: Option<String>,

        /// Model checkpoint to request
        #[arg(long)]
        checkpoint: Option<String>,

        /// Image width
        #[arg(long)]
        width: Option<u32>,

        /// Image height
        #[arg(long)]
        height: Option<u32>,

        /// Enable the high-resolution pass
        #[arg(long)]
        enable_hr: bool,

        /// Include positive_selfie.json
        #[arg(long)]
        selfie: bool,

        /// Seed for prompt sampling (reproducible runs)
        #[arg(long)]
        seed_rng: Option<u64>,

        /// Compose and print prompts without calling the backend
        #[arg(long)]
        dry_run: bool,

        /// Output the run summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Compose and print a single prompt
    Compose {
        #[command(flatten)]
        tier: TierArgs,

        /// Include positive_selfie.json
        #[arg(long)]
        selfie: bool,

        /// Seed for prompt sampling
        #[arg(long)]
        seed_rng: Option<u64>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate every tier of the fragment library
    Validate {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show configuration file paths
    Paths,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose {
        "promptloom=debug,warn"
    } else {
        "promptloom=info,warn"
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Resolve project path
    let project_path = cli.project.canonicalize().unwrap_or(cli.project.clone());

    if !project_path.exists() {
        eprintln!(
            "{} Project directory does not exist: {}",
            "Error:".red().bold(),
            project_path.display()
        );
        std::process::exit(1);
    }

    if let Err(e) = run(cli.command, &project_path).await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(e.exit_code());
    }
}

async fn run(command: Commands, project_path: &Path) -> promptloom::Result<()> {
    match command {
        Commands::Generate {
            tier,
            count,
            another_versions,
            url,
            checkpoint,
            width,
            height,
            enable_hr,
            selfie,
            seed_rng,
            dry_run,
            json,
        } => {
            let mut config = GeneratorConfig::load(project_path)?;
            if let Some(count) = count {
                config.batch_count = count;
            }
            if let Some(n) = another_versions {
                config.another_version_count = n;
            }
            if let Some(url) = url {
                config.url = url;
            }
            if checkpoint.is_some() {
                config.checkpoint = checkpoint;
            }
            if let Some(width) = width {
                config.width = width;
            }
            if let Some(height) = height {
                config.height = height;
            }
            config.enable_hr |= enable_hr;
            config.selfie |= selfie;
            config.validate()?;

            let tier = tier.tier();
            let prompts = PromptSet::load(&config.prompts_root(project_path), &tier, config.selfie)?;
            let backend = WebUiBackend::with_timeout(
                config.url.clone(),
                Duration::from_secs(config.timeout_secs),
            )
            .into_loom_backend()?;
            let store = ArtifactStore::new(config.output_root(project_path));

            let generator = Generator::new(prompts, config, Box::new(backend), store);
            let options = GenerateOptions {
                tier,
                rng_seed: seed_rng,
                dry_run,
                show_progress: !json,
            };
            let summary = generator.run(&options).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_summary(&summary, dry_run);
            }
        }

        Commands::Compose {
            tier,
            selfie,
            seed_rng,
            json,
        } => {
            let config = GeneratorConfig::load(project_path)?;
            config.validate()?;
            let tier = tier.tier();
            let prompts = PromptSet::load(
                &config.prompts_root(project_path),
                &tier,
                selfie || config.selfie,
            )?;
            let seed_policy = config.seed_policy(prompts.seed_policy.clone());

            let mut rng = match seed_rng {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            let positive =
                PromptComposer::new(&prompts.positive, &prompts.cancel_pairs, &seed_policy)
                    .with_sanitizer(config.sanitizer.clone())
                    .compose(&mut rng)?;
            let sanitizer = Sanitizer::new(config.sanitizer.clone());
            let negative = compose_negative(&prompts.negative, &sanitizer, None, &mut rng)?;

            if json {
                let output = serde_json::json!({
                    "tier": tier.to_string(),
                    "positive": positive,
                    "negative": negative,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                print_composition(&positive, &negative);
            }
        }

        Commands::Validate { json } => {
            let config = GeneratorConfig::load(project_path)?;
            let mut report = LibraryValidator::new(config.prompts_root(project_path)).validate();
            if let Err(e) = config.validate() {
                report.errors.insert(0, e.to_string());
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_validation(&report);
            }

            if !report.is_valid() {
                std::process::exit(report.exit_code());
            }
        }

        Commands::Config { action } => match action {
            ConfigAction::Show { json } => {
                let config = GeneratorConfig::load(project_path)?;

                if json {
                    println!("{}", serde_json::to_string_pretty(&config)?);
                } else {
                    println!("\n{} Generator Configuration", "Config:".cyan().bold());
                    println!("{}", "─".repeat(40));
                    println!("   Backend URL: {}", config.url);
                    println!(
                        "   Checkpoint: {}",
                        config.checkpoint.as_deref().unwrap_or("(service default)")
                    );
                    println!("   Prompts: {}", config.prompts_dir.display());
                    println!("   Output: {}", config.output_dir.display());
                    println!(
                        "   Batches: {} (+{} variant(s) each)",
                        config.batch_count, config.another_version_count
                    );
                    println!(
                        "   Image: {}x{}, {} steps, cfg {}, {}{}",
                        config.width,
                        config.height,
                        config.steps,
                        config.cfg_scale,
                        config.sampler_name,
                        if config.enable_hr { ", hires" } else { "" }
                    );
                    println!(
                        "   Prompt budget: {} chars total, {} per fragment",
                        config.sanitizer.max_total_length, config.sanitizer.max_fragment_length
                    );
                    println!(
                        "   Retries: {} attempt(s), timeout {}s",
                        config.retry.max_attempts, config.timeout_secs
                    );
                }
            }

            ConfigAction::Paths => {
                let config = GeneratorConfig::load(project_path)?;
                let prompts_root = config.prompts_root(project_path);

                println!("\n{} Configuration Paths", "Config:".cyan().bold());
                println!("{}", "─".repeat(40));
                println!(
                    "   Settings: {}",
                    GeneratorConfig::settings_path(project_path).display()
                );
                println!("   Prompts: {}", prompts_root.display());
                println!("   Output: {}", config.output_root(project_path).display());

                let root_tier = LibraryLocator::new(&prompts_root, TierPath::default());
                for file in LibraryFile::ALL {
                    let status = match root_tier.locate(file) {
                        Some(_) => "found".green(),
                        None if file.is_required() => "missing".red(),
                        None => "absent".dimmed(),
                    };
                    println!("   {:<28} {}", file.file_name(), status);
                }
            }
        },
    }

    Ok(())
}

fn print_composition(positive: &CompositionResult, negative: &CompositionResult) {
    println!("\n{} Composition", "Prompt:".cyan().bold());
    println!("{}", "─".repeat(60));
    if let Some(seed) = positive.seed {
        println!("   Seed: {}", seed);
    }
    println!("   {} {}", "Positive:".green(), positive.assembled_text);
    println!("   {} {}", "Negative:".red(), negative.assembled_text);
    for removal in &positive.removed_by_conflict {
        println!(
            "   {} '{}' removed by '{}'",
            "Cancelled:".yellow(),
            removal.removed,
            removal.trigger
        );
    }
}

fn print_summary(summary: &GenerationSummary, dry_run: bool) {
    if dry_run {
        for composed in &summary.composed {
            println!(
                "\n{} #{:05} seed {}",
                "Dry run:".cyan().bold(),
                composed.image_number,
                composed.request.seed
            );
            println!("   {} {}", "Positive:".green(), composed.request.prompt);
            println!("   {} {}", "Negative:".red(), composed.request.negative_prompt);
        }
        return;
    }

    println!(
        "\n{} {} batch(es), {} image(s) saved (run {})",
        "Done:".green().bold(),
        summary.batches,
        summary.saved.len(),
        summary.run_id
    );
    for path in &summary.saved {
        println!("   {}", path.display());
    }
}

fn print_validation(report: &ValidationReport) {
    println!("\n{} {}", "Library:".cyan().bold(), report.root.display());
    println!("{}", "─".repeat(60));
    for tier in &report.tiers {
        let label = if tier.tier.is_empty() { "<root>" } else { tier.tier.as_str() };
        if tier.is_valid() {
            println!(
                "{} {} ({} positive, {} negative collections, {} fragments, {} cancel pairs)",
                "OK".green(),
                label,
                tier.positive_collections,
                tier.negative_collections,
                tier.fragments,
                tier.cancel_pairs
            );
        } else {
            println!("{} {}", "FAIL".red(), label);
        }
    }
    for warning in &report.warnings {
        println!("{} {}", "Warning:".yellow(), warning);
    }
    for error in &report.errors {
        eprintln!("{} {}", "Error:".red(), error);
    }
    println!("\n{}", report.summary());
}

