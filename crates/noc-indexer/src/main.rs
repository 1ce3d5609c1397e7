//! Offline index build: taxonomy CSV in, persisted embedding index out.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;
use tracing::info;

use noc_common::index::IndexBuilder;
use noc_common::logging::{init_tracing_subscriber, install_tracing_panic_hook};
use noc_common::{create_embedder, EmbedderConfig, IndexStore, ListFieldPolicy, TaxonomyStore};

#[derive(Debug, Parser)]
#[command(name = "noc-indexer", about = "Build the taxonomy embedding index")]
struct Cli {
    /// Taxonomy CSV to index
    #[arg(long, env = "NOC_TAXONOMY_CSV", default_value = "noc_data_full.csv")]
    csv: PathBuf,

    /// Output directory for the persisted index
    #[arg(long, env = "NOC_INDEX_DIR", default_value = "noc_index")]
    out: PathBuf,

    /// Texts per embedding request
    #[arg(long, env = "NOC_EMBED_BATCH_SIZE", default_value_t = 32)]
    batch_size: usize,

    /// Treat malformed list fields as empty instead of failing
    #[arg(long, env = "NOC_LENIENT_LISTS", default_value = "false")]
    lenient_lists: bool,
}

fn main() -> anyhow::Result<()> {
    dotenv().ok();
    init_tracing_subscriber("noc-indexer");
    install_tracing_panic_hook("noc-indexer");

    let cli = Cli::parse();
    let policy = if cli.lenient_lists {
        ListFieldPolicy::Lenient
    } else {
        ListFieldPolicy::Strict
    };

    let embedder =
        create_embedder(&EmbedderConfig::from_env()).context("failed to create embedder")?;

    let store = TaxonomyStore::load_csv(&cli.csv, policy)
        .with_context(|| format!("failed to load taxonomy from {}", cli.csv.display()))?;
    info!(entities = store.len(), "taxonomy loaded");

    let index = IndexBuilder::new(embedder.as_ref())
        .with_batch_size(cli.batch_size)
        .build(&store)
        .context("index build failed; nothing was persisted")?;

    IndexStore::new(&cli.out)
        .persist(&index)
        .with_context(|| format!("failed to persist index to {}", cli.out.display()))?;

    info!(
        entities = index.manifest.entity_count,
        duties = index.manifest.duty_count,
        dimension = index.manifest.dimension,
        model = %index.manifest.model_version,
        out = %cli.out.display(),
        "index build complete"
    );

    Ok(())
}
