//! medrag - question answering over medical documents with cited sources.
//!
//! Documents (PDF, text, markdown) are split into overlapping segments,
//! tagged with their source file, estimated page and position, embedded,
//! and stored in a vector store plus a [Tantivy](https://github.com/quickwit-oss/tantivy)
//! BM25 index. Questions retrieve the closest segments, optionally
//! re-rank them lexically, and hand them to a language model that writes
//! the answer. Every answer carries the provenance of its best segment.
//!
//! # Quick start
//!
//! ```no_run
//! use medrag::{ConfigDb, DataDir, Pipeline, QueryOutcome, QueryParams};
//! use medrag::config::{Overrides, Settings};
//!
//! let data_dir = DataDir::resolve(None).unwrap();
//! let config_db = ConfigDb::open(&data_dir.config_db()).unwrap();
//! let settings =
//!     Settings::resolve(data_dir, &config_db, &Overrides::default()).unwrap();
//! let pipeline = Pipeline::open(&settings).unwrap();
//!
//! let report = pipeline.ingest("guidelines/diabetes.pdf".as_ref());
//! println!("{}", report.message());
//!
//! let params = QueryParams::new("What are the symptoms of diabetes?");
//! match pipeline.answer(&params) {
//!     QueryOutcome::Answered(answer) => {
//!         println!("{} (from {})", answer.answer, answer.doc);
//!     }
//!     QueryOutcome::Failed { error } => eprintln!("{error}"),
//! }
//! ```

pub mod chunking;
pub mod cli;
pub mod config;
pub mod config_db;
pub mod data_dir;
pub mod document;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod ingestion;
pub mod loader;
pub mod local_store;
pub mod mcp;
pub mod model_manager;
pub mod pipeline;
pub mod qdrant;
pub mod query;
pub mod reranker;
pub mod tantivy_index;
pub mod vector_store;
pub mod walker;

pub use config_db::ConfigDb;
pub use data_dir::DataDir;
pub use error::{Error, Result};
pub use ingestion::IngestReport;
pub use local_store::LocalStore;
pub use pipeline::Pipeline;
pub use query::{Answer, QueryOutcome, QueryParams};
pub use tantivy_index::LexicalIndex;
