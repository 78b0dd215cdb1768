//! Stages 1 and 2 of the pipeline: turn raw chapter files into a paragraph
//! dataset, then turn a chapter (or each of its paragraphs) into a search
//! query.

pub mod normalize;
pub mod preprocess;
pub mod query;

pub use preprocess::preprocess_chapters;
pub use query::{
    build_chapter_query, extract_keywords, list_chapters, paragraph_query, read_query,
    resolve_chapter, write_query, ChapterQuery, ChapterSummary, QueryError, QueryMode,
    DEFAULT_KEYWORD_TERMS, DEFAULT_PARAGRAPH_TERMS,
};
