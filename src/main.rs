//! Book Indexer CLI
//!
//! Converts positioned-fragment documents to paginated markdown and
//! builds a navigable section index over it.

use anyhow::{Context, Result};
use book_indexer::{
    config::Config,
    document::{slug_from_name, SourceDocument},
    llm::{LlmClient, LlmFallback, NoFallback},
    markdown::MarkdownEmitter,
    meta::{load_meta, LayoutModel},
    persistence::{
        index_exists, index_size, load_index, write_emitted, IndexStore, DEFAULT_INDEX_FILENAME, FULL_MARKDOWN_FILENAME,
    },
    resolver::IndexResolver,
    search::{find_section, format_toc, search_content, search_titles, section_text},
    tree::{Diagnostic, Index},
    BookIndexError,
};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use walkdir::WalkDir;

/// Book Indexer - layout classification and hierarchical section indexing
#[derive(Parser)]
#[command(name = "book-indexer")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a YAML config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a fragments JSON file to paginated markdown and index it
    Convert {
        /// Path to the fragments JSON file
        input: PathBuf,

        /// Output directory (defaults to ./output/<document slug>)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Structural metadata JSON (`table_of_contents` entries)
        #[arg(long)]
        meta: Option<PathBuf>,
    },

    /// Build the section index of a document folder, or refresh a stale one
    Index {
        /// Document folder containing the markdown (and optional *_meta.json)
        folder: PathBuf,

        /// Rebuild even if a current index exists
        #[arg(long)]
        force: bool,

        /// Structural metadata JSON, overriding the one found in the folder
        #[arg(long)]
        meta: Option<PathBuf>,
    },

    /// Print the table of contents
    Toc {
        folder: PathBuf,

        /// Maximum nesting depth
        #[arg(short, long, default_value_t = 2)]
        depth: usize,
    },

    /// Search section titles, or section text with --content
    Search {
        folder: PathBuf,

        query: String,

        #[arg(long)]
        content: bool,
    },

    /// Print the text of a section by id or title
    Read { folder: PathBuf, section: String },

    /// Display the section tree
    Show {
        folder: PathBuf,

        /// Output as JSON instead of formatted tree
        #[arg(long)]
        json: bool,
    },

    /// Show information about an index
    Info { folder: PathBuf },

    /// Test LLM connection
    Test,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load_from_file(path).context("Failed to load configuration")?,
        None => Config::load().context("Failed to load configuration")?,
    };

    match cli.command {
        Commands::Convert { input, output, meta } => cmd_convert(&config, input, output, meta).await,
        Commands::Index { folder, force, meta } => cmd_index(&config, folder, force, meta).await,
        Commands::Toc { folder, depth } => {
            let index = ensure_index(&config, &folder).await?;
            for line in format_toc(&index, depth) {
                println!("{}", line);
            }
            Ok(())
        }
        Commands::Search { folder, query, content } => cmd_search(&config, folder, query, content).await,
        Commands::Read { folder, section } => cmd_read(&config, folder, section).await,
        Commands::Show { folder, json } => {
            let index = ensure_index(&config, &folder).await?;
            if json {
                println!("{}", index.to_json().context("Failed to serialize index")?);
            } else {
                println!("{}", index.format());
            }
            Ok(())
        }
        Commands::Info { folder } => cmd_info(folder),
        Commands::Test => cmd_test(&config).await,
    }
}

/// Markdown file of a document folder: `full.md` if present, else the
/// largest `.md` file outside `chapters/`.
fn find_markdown(folder: &Path) -> book_indexer::Result<PathBuf> {
    let full = folder.join(FULL_MARKDOWN_FILENAME);
    if full.is_file() {
        return Ok(full);
    }
    WalkDir::new(folder)
        .max_depth(2)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && e.path().extension().is_some_and(|x| x == "md"))
        .filter(|e| !e.path().components().any(|c| c.as_os_str() == "chapters"))
        .max_by_key(|e| e.metadata().map(|m| m.len()).unwrap_or(0))
        .map(|e| e.into_path())
        .ok_or_else(|| BookIndexError::MarkdownNotFound(folder.to_path_buf()))
}

fn find_meta(folder: &Path) -> Option<PathBuf> {
    WalkDir::new(folder)
        .max_depth(2)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .find(|p| p.is_file() && p.to_string_lossy().ends_with("_meta.json"))
}

fn resolver(config: &Config) -> book_indexer::Result<IndexResolver> {
    let resolver = IndexResolver::new(config.index.clone());
    if !config.llm_enabled() {
        log::debug!("LLM not configured, fallback disabled");
        return Ok(resolver.with_fallback(Arc::new(NoFallback)));
    }
    let client = LlmClient::new(config.llm.clone())?;
    Ok(resolver.with_fallback(Arc::new(LlmFallback::new(client))))
}

/// Resolve the folder's markdown. `page_width` is known only when the
/// fragments were just converted.
async fn build_index(
    config: &Config,
    folder: &Path,
    meta: Option<PathBuf>,
    page_width: Option<f64>,
    extra: Vec<Diagnostic>,
) -> book_indexer::Result<Index> {
    let markdown = find_markdown(folder)?;
    let text = std::fs::read_to_string(&markdown).map_err(|e| BookIndexError::io(&markdown, e))?;

    let layout = match meta.or_else(|| find_meta(folder)) {
        Some(path) => {
            log::info!("using structural metadata {}", path.display());
            LayoutModel::build(load_meta(&path)?, page_width, &config.layout)
        }
        None => LayoutModel::default(),
    };

    let name = folder
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    let mut index = resolver(config)?.resolve(&name, &text, &layout).await;
    index.diagnostics.extend(extra);
    Ok(index)
}

/// Load the folder's index, building it first if missing or stale.
async fn ensure_index(config: &Config, folder: &Path) -> Result<Arc<Index>> {
    let store = IndexStore::new(folder.join(DEFAULT_INDEX_FILENAME));
    store
        .load_or_build(|| build_index(config, folder, None, None, Vec::new()))
        .await
        .context("Failed to load or build index")
}

async fn cmd_convert(config: &Config, input: PathBuf, output: Option<PathBuf>, meta: Option<PathBuf>) -> Result<()> {
    let start = Instant::now();
    let document = SourceDocument::from_json_file(&input).context("Failed to load document")?;
    println!(
        "Converting: {} ({} pages, {} fragments)",
        document.name,
        document.page_count(),
        document.fragment_count()
    );

    let emitted = MarkdownEmitter::new(&config.layout).emit(&document);
    let folder = output.unwrap_or_else(|| PathBuf::from("output").join(slug_from_name(&document.name)));
    let full = write_emitted(&emitted, &folder).context("Failed to write markdown")?;
    println!("  Markdown:   {} ({} lines)", full.display(), emitted.line_count());
    println!("  Chapters:   {}", emitted.chapters.len());

    let skipped = emitted
        .diagnostics
        .iter()
        .map(|detail| Diagnostic::SkippedFragment { detail: detail.clone() })
        .collect();
    let page_width = document.page_width();
    let store = IndexStore::new(folder.join(DEFAULT_INDEX_FILENAME));
    let index = store
        .rebuild(|| build_index(config, &folder, meta, page_width, skipped))
        .await
        .context("Failed to build index")?;

    print_summary(&index);
    println!("  Time:       {:.2?}", start.elapsed());
    Ok(())
}

async fn cmd_index(config: &Config, folder: PathBuf, force: bool, meta: Option<PathBuf>) -> Result<()> {
    let start = Instant::now();
    let store = IndexStore::new(folder.join(DEFAULT_INDEX_FILENAME));
    let index = if force || meta.is_some() {
        store.rebuild(|| build_index(config, &folder, meta, None, Vec::new())).await
    } else {
        store.load_or_build(|| build_index(config, &folder, None, None, Vec::new())).await
    }
    .context("Failed to build index")?;

    print_summary(&index);
    println!("  Time:       {:.2?}", start.elapsed());
    println!("\nIndex saved to: {}", store.path().display());
    Ok(())
}

fn print_summary(index: &Index) {
    println!("\nSection Index:");
    println!("  Source:     {:?}", index.source);
    println!("  Sections:   {}", index.node_count());
    println!("  Unresolved: {}", index.unresolved.len());
    println!("  Max depth:  {}", index.max_depth());
    if let Some(offset) = index.offset {
        println!("  Offset:     {:+}", offset);
    }
}

async fn cmd_search(config: &Config, folder: PathBuf, query: String, content: bool) -> Result<()> {
    let index = ensure_index(config, &folder).await?;

    if content {
        let text = std::fs::read_to_string(find_markdown(&folder)?).context("Failed to read markdown")?;
        let hits = search_content(&index, &text, &query);
        if hits.is_empty() {
            println!("No sections mention \"{}\".", query);
        }
        for node in hits {
            println!("{} [p.{}, lines {}-{}] ({})", node.title, node.page_start, node.line_start, node.line_end, node.id);
        }
        return Ok(());
    }

    let hits = search_titles(&index, &query);
    if hits.is_empty() {
        println!("No titles match \"{}\".", query);
    }
    for hit in hits {
        let page = hit.page.map_or_else(|| "?".to_string(), |p| p.to_string());
        let id = hit.node_id.as_deref().unwrap_or("heading");
        println!("{} [p.{}, lines {}-{}] ({})", hit.title, page, hit.line_start, hit.line_end, id);
    }
    Ok(())
}

async fn cmd_read(config: &Config, folder: PathBuf, section: String) -> Result<()> {
    let index = ensure_index(config, &folder).await?;
    let node = find_section(&index, &section).with_context(|| format!("No section matches '{}'", section))?;
    let text = std::fs::read_to_string(find_markdown(&folder)?).context("Failed to read markdown")?;
    println!("{}", section_text(node, &text));
    Ok(())
}

fn cmd_info(folder: PathBuf) -> Result<()> {
    let path = folder.join(DEFAULT_INDEX_FILENAME);
    if !index_exists(&path) {
        println!("No index at {}. Run `book-indexer index {}` first.", path.display(), folder.display());
        return Ok(());
    }
    let index = load_index(&path).context("Failed to load index")?;
    let size = index_size(&path)?;

    println!("Section Index Information");
    println!("{}", "─".repeat(40));
    println!("  Document:     {}", index.name);
    println!("  Version:      {}{}", index.version, if index.is_current() { "" } else { " (stale)" });
    println!("  Pages:        {}", index.page_count);
    println!("  Lines:        {}", index.line_count);
    println!("  Sections:     {}", index.node_count());
    println!("  Unresolved:   {}", index.unresolved.len());
    println!("  Headings:     {}", index.headings.len());
    println!("  Annotations:  {}", index.annotations.len());
    println!("  File size:    {:.1} KB", size as f64 / 1024.0);
    println!("  Index path:   {}", path.display());
    for diagnostic in &index.diagnostics {
        println!("  - {:?}", diagnostic);
    }
    Ok(())
}

async fn cmd_test(config: &Config) -> Result<()> {
    println!("Testing LLM connection...\n");

    println!("Configuration:");
    println!("  API Base:  {}", config.llm.api_base);
    println!("  Model:     {}", config.llm.model);
    println!("  API Key:   {}...", config.llm.api_key.chars().take(8).collect::<String>());
    println!();

    if let Err(e) = config.validate() {
        println!("Configuration error: {}", e);
        return Ok(());
    }

    let client = LlmClient::new(config.llm.clone())?;
    println!("Sending test request...");
    match client.test_connection().await {
        Ok(()) => println!("Connection successful!"),
        Err(e) => println!("Connection failed: {}", e),
    }
    Ok(())
}
