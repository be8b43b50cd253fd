use std::{collections::HashMap, path::Path, sync::Mutex};

use tantivy::{
    Index,
    IndexReader,
    IndexWriter,
    TantivyDocument,
    Term,
    collector::TopDocs,
    doc,
    query::{BooleanQuery, ConstScoreQuery, Occur, QueryParser, TermSetQuery},
    schema::*,
    tokenizer::{
        LowerCaser,
        RemoveLongFilter,
        SimpleTokenizer,
        Stemmer,
        TextAnalyzer,
    },
};

use crate::{
    document::Segment,
    error::{Error, Result},
};

/// Field names used in the schema.
pub mod fields {
    pub const SEGMENT_ID: &str = "segment_id";
    pub const SOURCE: &str = "source";
    pub const BODY: &str = "body";
}

const WRITER_MEMORY_BUDGET: usize = 15_000_000;

/// Corpus-wide BM25 index over every stored segment.
///
/// Kept alongside the vector store so lexical re-ranking can score
/// retrieved segments with term statistics from the whole corpus.
///
/// A writer is only created for the duration of a write, so any number of
/// indexes (in this or other processes) may be open on one directory.
pub struct LexicalIndex {
    index: Index,
    reader: IndexReader,
    write_lock: Mutex<()>,
    fields: SchemaFields,
}

/// Resolved field handles for the schema.
#[derive(Clone, Copy)]
struct SchemaFields {
    segment_id: Field,
    source: Field,
    body: Field,
}

fn build_schema() -> (Schema, SchemaFields) {
    let mut builder = Schema::builder();

    let segment_id = builder.add_text_field(fields::SEGMENT_ID, STRING | STORED);
    let source = builder.add_text_field(fields::SOURCE, STRING | STORED);

    let body_opts = TextOptions::default().set_indexing_options(
        TextFieldIndexing::default()
            .set_tokenizer("en_stem")
            .set_index_option(IndexRecordOption::WithFreqsAndPositions),
    );
    let body = builder.add_text_field(fields::BODY, body_opts);

    let schema = builder.build();
    (
        schema,
        SchemaFields {
            segment_id,
            source,
            body,
        },
    )
}

fn register_tokenizers(index: &Index) {
    let en_stem = TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(RemoveLongFilter::limit(40))
        .filter(LowerCaser)
        .filter(Stemmer::new(tantivy::tokenizer::Language::English))
        .build();
    index.tokenizers().register("en_stem", en_stem);
}

impl LexicalIndex {
    /// Open or create a lexical index at the given directory.
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let (schema, fields) = build_schema();

        let mmap_dir = tantivy::directory::MmapDirectory::open(dir)
            .map_err(|e| tantivy::TantivyError::SystemError(e.to_string()))?;
        let index = if Index::exists(&mmap_dir)
            .map_err(|e| tantivy::TantivyError::SystemError(e.to_string()))?
        {
            Index::open(mmap_dir)?
        } else {
            Index::create(mmap_dir, schema, tantivy::IndexSettings::default())?
        };

        Self::from_index(index, fields)
    }

    /// Create an in-memory index (for testing).
    pub fn open_in_ram() -> Result<Self> {
        let (schema, fields) = build_schema();
        Self::from_index(Index::create_in_ram(schema), fields)
    }

    fn from_index(index: Index, fields: SchemaFields) -> Result<Self> {
        register_tokenizers(&index);
        let reader = index.reader()?;

        Ok(Self {
            index,
            reader,
            write_lock: Mutex::new(()),
            fields,
        })
    }

    /// Run `f` with a fresh writer, then commit and release it.
    fn with_writer<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut IndexWriter) -> Result<()>,
    {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| Error::Config("lexical index lock poisoned".into()))?;

        let mut writer: IndexWriter = self.index.writer(WRITER_MEMORY_BUDGET)?;
        f(&mut writer)?;
        writer.commit()?;
        writer.wait_merging_threads()?;
        Ok(())
    }

    /// Append segments and commit.
    pub fn add_segments(&self, segments: &[Segment]) -> Result<()> {
        if segments.is_empty() {
            return Ok(());
        }

        let f = self.fields;
        self.with_writer(|writer| {
            for segment in segments {
                writer.add_document(doc!(
                    f.segment_id => segment.id.as_str(),
                    f.source => segment.metadata.source.as_str(),
                    f.body => segment.text.as_str(),
                ))?;
            }
            Ok(())
        })
    }

    /// Remove every segment and commit.
    pub fn clear(&self) -> Result<()> {
        self.with_writer(|writer| {
            writer.delete_all_documents()?;
            Ok(())
        })
    }

    pub fn num_segments(&self) -> Result<u64> {
        self.reader.reload()?;
        Ok(self.reader.searcher().num_docs())
    }

    /// BM25 scores of `query_str` for the given segment ids.
    ///
    /// Term statistics come from the whole index; only the listed segments
    /// are scored. Segments that match no query term are absent from the
    /// returned map.
    pub fn score_segments(
        &self,
        query_str: &str,
        segment_ids: &[&str],
    ) -> Result<HashMap<String, f32>> {
        if segment_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let f = self.fields;
        self.reader.reload()?;
        let searcher = self.reader.searcher();

        let parser = QueryParser::for_index(&self.index, vec![f.body]);
        let (text_query, _errors) = parser.parse_query_lenient(query_str);

        let id_terms = segment_ids
            .iter()
            .map(|id| Term::from_field_text(f.segment_id, id));
        let id_filter = ConstScoreQuery::new(
            Box::new(TermSetQuery::new(id_terms)),
            0.0,
        );

        let query = BooleanQuery::new(vec![
            (Occur::Must, text_query),
            (Occur::Must, Box::new(id_filter)),
        ]);

        let top_docs =
            searcher.search(&query, &TopDocs::with_limit(segment_ids.len()))?;

        let mut scores = HashMap::with_capacity(top_docs.len());
        for (score, doc_address) in top_docs {
            let doc: TantivyDocument = searcher.doc(doc_address)?;
            let id = doc
                .get_first(f.segment_id)
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            scores
                .entry(id)
                .and_modify(|s: &mut f32| *s = s.max(score))
                .or_insert(score);
        }

        Ok(scores)
    }
}

impl std::fmt::Debug for LexicalIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LexicalIndex").finish_non_exhaustive()
    }
}
