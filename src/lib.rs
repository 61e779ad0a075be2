//! Book Indexer - layout classification and section indexing for
//! page-structured documents.
//!
//! A document arrives as positioned text fragments per page. It is turned
//! into paginated markdown (page markers, headings, marginal notes, tables,
//! equations and diagram placeholders), and a hierarchical section index is
//! resolved over that markdown so any section maps to a page range and a
//! line range.
//!
//! # Overview
//!
//! 1. **Layout**: fragments are grouped into lines, classified by role and
//!    rendered as markdown by [`markdown::MarkdownEmitter`].
//! 2. **Calibration**: printed page labels are related to physical pages
//!    through a heading anchor or a metadata vote.
//! 3. **Resolution**: contents entries, metadata sections or headings are
//!    placed on heading lines by [`resolver::IndexResolver`], escalating to a
//!    [`llm::SectionFallback`] when placement looks unreliable.
//! 4. **Lookup**: [`search`] lists, searches and reads sections.
//!
//! # Quick Start
//!
//! ```no_run
//! use book_indexer::{
//!     config::Config,
//!     meta::LayoutModel,
//!     persistence::IndexStore,
//!     resolver::IndexResolver,
//!     search::{find_section, section_text},
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let text = std::fs::read_to_string("output/book/full.md")?;
//!
//!     let resolver = IndexResolver::new(config.index.clone());
//!     let store = IndexStore::new("output/book/section_index.json");
//!     let index = store
//!         .load_or_build(|| async { Ok(resolver.resolve("book", &text, &LayoutModel::default()).await) })
//!         .await?;
//!
//!     println!("{}", index.format());
//!     if let Some(node) = find_section(&index, "Introduction") {
//!         println!("{}", section_text(node, &text));
//!     }
//!     Ok(())
//! }
//! ```

pub mod calibrate;
pub mod chapters;
pub mod config;
pub mod document;
pub mod error;
pub mod layout;
pub mod llm;
pub mod markdown;
pub mod meta;
pub mod persistence;
pub mod resolver;
pub mod search;
pub mod text;
pub mod toc;
pub mod tree;
pub mod view;

// Re-export commonly used types
pub use config::Config;
pub use document::SourceDocument;
pub use error::{BookIndexError, Result};
pub use markdown::{EmittedDocument, MarkdownEmitter};
pub use meta::LayoutModel;
pub use persistence::{load_index, save_index, IndexStore};
pub use resolver::IndexResolver;
pub use tree::{Index, IndexNode};
