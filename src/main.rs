//! CLI entry point for the product discovery engine.
//!
//! Provides commands for building the catalog index, searching it and
//! maintaining it. Main components: Cli parser, Commands enum, and a tokio
//! runtime driving the search service.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use seekstyle::display::{product_table, results_table, stats_table};
use seekstyle::embedding::{CachedEmbedder, Embedder, HashingEmbedder, parse_model_name};
use seekstyle::{
    Availability, CombinedQuery, DiscoveryService, EngineError, Feedback, ProductPatch,
    ProductRecord, SearchFilters, SearchResponse, Settings, VectorIndex,
};
use tracing::info;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Content-based product discovery
#[derive(Parser)]
#[command(
    name = "seekstyle",
    version = env!("CARGO_PKG_VERSION"),
    about = "Content-based product discovery",
    long_about = "Index a product catalog and search it by text, image or social link.",
    next_line_help = true,
    styles = clap_cargo_style()
)]
struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true, env = "SEEKSTYLE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
enum Commands {
    /// Initialize project
    #[command(about = "Set up .seekstyle directory with default configuration")]
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Embed and index a catalog file
    #[command(about = "Add products from a JSON array of product records")]
    Index {
        /// Catalog JSON file
        catalog: PathBuf,
    },

    /// Search the catalog
    #[command(
        about = "Search by text, images and/or a social link",
        after_help = "Examples:\n  seekstyle search --text \"black midi dress\" --max-price 120\n  seekstyle search --image look.jpg --style minimalist --limit 5\n  seekstyle search --social https://pinterest.com/pin/linen-summer-outfit/ --like p12"
    )]
    Search {
        #[arg(long)]
        text: Option<String>,

        /// Image file; repeat for several images
        #[arg(long = "image", value_name = "PATH")]
        images: Vec<PathBuf>,

        /// Pinterest, Instagram, TikTok or Tumblr link
        #[arg(long, value_name = "URL")]
        social: Option<String>,

        #[command(flatten)]
        filters: FilterArgs,

        #[arg(short, long)]
        limit: Option<usize>,

        /// User id for personalization
        #[arg(short, long)]
        user: Option<String>,

        /// Refine toward this product; repeatable
        #[arg(long = "like", value_name = "ID")]
        liked: Vec<String>,

        /// Refine away from this product; repeatable
        #[arg(long = "dislike", value_name = "ID")]
        disliked: Vec<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Products similar to a catalog product
    #[command(about = "Find products similar to a product")]
    Similar {
        id: String,

        #[arg(short, long)]
        limit: Option<usize>,

        #[arg(short, long)]
        user: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Show one product
    #[command(about = "Show the stored record of a product")]
    Get {
        id: String,

        #[arg(long)]
        json: bool,
    },

    /// Patch product metadata
    #[command(about = "Apply a JSON metadata patch to a product")]
    Update {
        id: String,

        /// JSON object with the fields to change
        patch: PathBuf,
    },

    /// Remove products
    #[command(about = "Remove products from the index")]
    Remove {
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Reclaim removed slots
    #[command(about = "Rewrite the index without tombstones")]
    Compact,

    /// Index counters
    #[command(about = "Show index statistics")]
    Stats {
        #[arg(long)]
        json: bool,
    },

    /// Show configuration
    #[command(about = "Display active settings")]
    Config,
}

/// Structured filters shared by search commands.
#[derive(clap::Args, Debug, Default)]
struct FilterArgs {
    #[arg(long)]
    min_price: Option<f64>,

    #[arg(long)]
    max_price: Option<f64>,

    #[arg(long = "brand")]
    brands: Vec<String>,

    #[arg(long = "category")]
    categories: Vec<String>,

    #[arg(long = "color")]
    colors: Vec<String>,

    #[arg(long = "style")]
    styles: Vec<String>,

    /// in_stock, low_stock or out_of_stock
    #[arg(long)]
    availability: Option<Availability>,
}

impl FilterArgs {
    fn into_filters(self) -> SearchFilters {
        let non_empty = |values: Vec<String>| (!values.is_empty()).then_some(values);
        SearchFilters {
            price_min: self.min_price,
            price_max: self.max_price,
            brands: non_empty(self.brands),
            categories: non_empty(self.categories),
            colors: non_empty(self.colors),
            styles: non_empty(self.styles),
            availability: self.availability,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            if let Some(engine) = e.downcast_ref::<EngineError>() {
                eprintln!("Code: {}", engine.status_code());
                for suggestion in engine.recovery_suggestions() {
                    eprintln!("  - {suggestion}");
                }
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    if let Commands::Init { force } = &cli.command {
        let path = Settings::init_config_file(*force).map_err(|e| anyhow!("{e}"))?;
        println!("Created configuration file at: {}", path.display());
        println!("Edit this file to customize your settings.");
        return Ok(());
    }

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path)
            .map_err(|e| anyhow!("configuration error loading {}: {e}", path.display()))?,
        None => Settings::load().map_err(|e| anyhow!("configuration error: {e}"))?,
    };
    seekstyle::logging::init(&settings);

    if let Commands::Config = &cli.command {
        println!("Current Configuration:");
        println!("{}", "=".repeat(50));
        println!("{}", toml::to_string_pretty(&settings)?);
        return Ok(());
    }

    let dimension = settings.vector_dimension()?;
    let index = Arc::new(
        VectorIndex::open(&settings.index_path, dimension)?
            .with_candidate_multiplier(settings.vector.candidate_multiplier),
    );

    match cli.command {
        Commands::Init { .. } | Commands::Config => Ok(()),

        Commands::Index { catalog } => {
            let products = read_json::<Vec<ProductRecord>>(&catalog)?;
            let count = products.len();
            let service = build_service(&settings, index)?;
            service.ingest(products).await?;
            info!(count, "Indexed catalog");
            println!("Indexed {count} products from {}", catalog.display());
            println!("{}", stats_table(&service.index().stats()));
            Ok(())
        }

        Commands::Search {
            text,
            images,
            social,
            filters,
            limit,
            user,
            liked,
            disliked,
            json,
        } => {
            let mut query = CombinedQuery {
                text,
                social_url: social,
                filters: filters.into_filters(),
                limit,
                user_id: user,
                ..Default::default()
            };
            for path in images {
                let bytes = std::fs::read(&path)
                    .with_context(|| format!("failed to read image {}", path.display()))?;
                query = query.with_image(bytes);
            }

            let service = build_service(&settings, index)?;
            let mut response = service.combined_search(query).await?;
            let feedback = Feedback {
                liked_products: liked,
                disliked_products: disliked,
            };
            if !feedback.is_empty() {
                response = service.refine_search(&response.search_id, &feedback).await?;
            }
            print_response(&response, json)
        }

        Commands::Similar {
            id,
            limit,
            user,
            json,
        } => {
            let service = build_service(&settings, index)?;
            let response = service
                .similar_products(&id, limit, user.as_deref())
                .await?;
            print_response(&response, json)
        }

        Commands::Get { id, json } => {
            let product = index.get(&id).ok_or_else(|| EngineError::not_found(&id))?;
            if json {
                println!("{}", serde_json::to_string_pretty(product.as_ref())?);
            } else {
                println!("{}", product_table(&product));
            }
            Ok(())
        }

        Commands::Update { id, patch } => {
            let patch = read_json::<ProductPatch>(&patch)?;
            if patch.is_empty() {
                println!("Patch is empty, nothing to update");
                return Ok(());
            }
            let updated = index.update(&id, patch)?;
            println!("{}", product_table(&updated));
            Ok(())
        }

        Commands::Remove { ids } => {
            for id in ids {
                if index.remove(&id)? {
                    println!("Removed {id}");
                } else {
                    println!("Not indexed: {id}");
                }
            }
            Ok(())
        }

        Commands::Compact => {
            let reclaimed = index.compact()?;
            println!("Reclaimed {reclaimed} slots");
            println!("{}", stats_table(&index.stats()));
            Ok(())
        }

        Commands::Stats { json } => {
            let stats = index.stats();
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("{}", stats_table(&stats));
            }
            Ok(())
        }
    }
}

fn build_service(settings: &Settings, index: Arc<VectorIndex>) -> Result<DiscoveryService> {
    let embedder = Arc::new(CachedEmbedder::new(build_embedder(settings)?));
    Ok(DiscoveryService::builder(index, embedder)
        .options(settings.service_options())
        .build()?)
}

fn build_embedder(settings: &Settings) -> Result<Arc<dyn Embedder>> {
    match parse_model_name(&settings.embedding.model)? {
        #[cfg(feature = "clip")]
        "clip" => {
            let cache_dir = settings
                .embedding
                .cache_dir
                .clone()
                .or_else(|| dirs::cache_dir().map(|dir| dir.join("seekstyle").join("models")))
                .unwrap_or_else(|| PathBuf::from(".seekstyle/models"));
            Ok(Arc::new(seekstyle::embedding::ClipEmbedder::new(
                cache_dir, true,
            )?))
        }
        _ => Ok(Arc::new(HashingEmbedder::new(settings.vector_dimension()?))),
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("invalid JSON in {}", path.display()))
}

fn print_response(response: &SearchResponse, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(response)?);
        return Ok(());
    }

    println!("{}", results_table(response));
    println!(
        "{} results in {:.1} ms (search id: {}{})",
        response.total_count,
        response.search_time_ms,
        response.search_id,
        if response.cached { ", cached" } else { "" }
    );
    for stage in &response.degraded {
        eprintln!("Warning: {} degraded: {}", stage.stage, stage.reason);
    }
    Ok(())
}
