//! In-process knowledge base for style guidance.
//!
//! Documents are split into overlapping chunks, embedded as hashed
//! bag-of-words vectors, and ranked by cosine similarity. The base is built
//! once per session; until then retrieval reports that it is not initialized.

use std::sync::{Arc, OnceLock};

/// Chunk size in characters
pub const CHUNK_SIZE: usize = 1000;
/// Characters shared by consecutive chunks
pub const CHUNK_OVERLAP: usize = 200;
/// Embedding dimensionality
pub const EMBEDDING_DIMS: usize = 256;
/// Chunks returned per query
pub const TOP_K: usize = 3;

/// A document to index, labelled with where it came from
#[derive(Debug, Clone)]
pub struct Document {
    pub text: String,
    pub source: String,
}

impl Document {
    pub fn new(text: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source: source.into(),
        }
    }
}

#[derive(Debug)]
struct Chunk {
    text: String,
    source: String,
    vector: Vec<f32>,
}

/// Read-only index over document chunks
#[derive(Debug)]
pub struct Retriever {
    chunks: Vec<Chunk>,
    top_k: usize,
}

impl Retriever {
    pub fn build(documents: &[Document], top_k: usize) -> Self {
        let chunks = documents
            .iter()
            .flat_map(|doc| {
                chunk_text(&doc.text, CHUNK_SIZE, CHUNK_OVERLAP)
                    .into_iter()
                    .map(|text| Chunk {
                        vector: embed(&text),
                        text,
                        source: doc.source.clone(),
                    })
            })
            .collect();
        Self { chunks, top_k }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Best matches first; ties keep indexing order.
    fn search(&self, query: &str) -> Vec<&Chunk> {
        let query_vector = embed(query);
        let mut scored: Vec<(f32, &Chunk)> = self
            .chunks
            .iter()
            .map(|c| (cosine_similarity(&query_vector, &c.vector), c))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored
            .into_iter()
            .take(self.top_k)
            .map(|(_, c)| c)
            .collect()
    }
}

/// Shared handle to the session's knowledge base.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeBase {
    inner: Arc<OnceLock<Retriever>>,
}

impl KnowledgeBase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.get().is_some()
    }

    /// Index `documents`. Returns a human-readable status line.
    pub fn init(&self, documents: Vec<Document>) -> String {
        if documents.is_empty() {
            return "Warning: No documents provided for initialization.".to_string();
        }
        if self.is_initialized() {
            return "Error initializing knowledge base: it is already initialized.".to_string();
        }

        let retriever = Retriever::build(&documents, TOP_K);
        if retriever.is_empty() {
            return "Error initializing knowledge base: the documents contain no text.".to_string();
        }
        let count = retriever.len();
        match self.inner.set(retriever) {
            Ok(()) => {
                tracing::debug!(
                    chunks = count,
                    documents = documents.len(),
                    "knowledge base ready"
                );
                format!("Knowledge base successfully initialized. {} chunks indexed.", count)
            }
            Err(_) => "Error initializing knowledge base: it is already initialized.".to_string(),
        }
    }

    /// Top chunks for `query`, each labelled with its source.
    pub fn retrieve(&self, query: &str) -> Result<String, String> {
        let retriever = self.inner.get().ok_or_else(|| {
            "Knowledge base not initialized. Please ensure it is initialized before retrieval."
                .to_string()
        })?;

        let results: Vec<String> = retriever
            .search(query)
            .into_iter()
            .enumerate()
            .map(|(i, c)| format!("Source {} ({}): {}", i + 1, c.source, c.text.trim()))
            .collect();

        Ok(format!("Retrieved Information:\n{}", results.join("\n---\n")))
    }
}

/// Split text into chunks of at most `chunk_size` characters (plus up to 100
/// more to finish a line), each starting `chunk_size - overlap` after the last.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    if text.trim().is_empty() {
        return vec![];
    }

    let chars: Vec<char> = text.chars().collect();
    let total_chars = chars.len();
    if total_chars <= chunk_size {
        return vec![text.to_string()];
    }

    let step = chunk_size.saturating_sub(overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        let mut end = (start + chunk_size).min(total_chars);

        // Extend to the next newline if one is close
        if end < total_chars {
            let search_limit = (end + 100).min(total_chars);
            if let Some(newline_pos) = chars[end..search_limit].iter().position(|&c| c == '\n') {
                end += newline_pos + 1;
            }
        }

        chunks.push(chars[start..end].iter().collect());
        if end >= total_chars {
            break;
        }
        start += step;
    }

    chunks
}

/// Hashed bag-of-words vector over lowercase alphanumeric tokens.
pub fn embed(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; EMBEDDING_DIMS];
    for token in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        let index = (fnv1a(&token.to_lowercase()) % EMBEDDING_DIMS as u64) as usize;
        vector[index] += 1.0;
    }
    vector
}

fn fnv1a(s: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in s.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// Cosine similarity in [-1, 1]; 0.0 when either vector is empty or zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }
    (dot / denom) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retrieve_before_init_is_an_error() {
        let kb = KnowledgeBase::new();
        let err = kb.retrieve("README style guidelines").unwrap_err();
        assert!(err.starts_with("Knowledge base not initialized"));
    }

    #[test]
    fn test_init_reports_chunk_count_once() {
        let kb = KnowledgeBase::new();
        let status = kb.init(vec![Document::new("# Guide\nUse headings.", "guide")]);
        assert_eq!(status, "Knowledge base successfully initialized. 1 chunks indexed.");
        assert!(kb.is_initialized());

        let again = kb.init(vec![Document::new("more", "other")]);
        assert!(again.starts_with("Error initializing knowledge base"));
    }

    #[test]
    fn test_init_without_documents_warns() {
        let kb = KnowledgeBase::new();
        assert_eq!(
            kb.init(vec![]),
            "Warning: No documents provided for initialization."
        );
        assert!(!kb.is_initialized());
        assert!(kb.init(vec![Document::new("   ", "blank")]).starts_with("Error"));
    }

    #[test]
    fn test_retrieve_ranks_relevant_chunk_first() {
        let kb = KnowledgeBase::new();
        kb.init(vec![
            Document::new("Cooking pasta requires boiling salted water.", "recipes"),
            Document::new(
                "README style guidelines: every README needs Setup and Usage sections.",
                "style",
            ),
            Document::new("The weather today is sunny.", "weather"),
        ]);

        let out = kb.retrieve("README style guidelines").unwrap();
        assert!(out.starts_with("Retrieved Information:\nSource 1 (style): README style"));
        assert_eq!(out.matches("\n---\n").count(), 2);
    }

    #[test]
    fn test_handle_clones_share_state() {
        let kb = KnowledgeBase::new();
        let clone = kb.clone();
        kb.init(vec![Document::new("shared", "s")]);
        assert!(clone.retrieve("shared").is_ok());
    }

    #[test]
    fn test_chunk_text_overlaps() {
        let text = "a".repeat(2500);
        let chunks = chunk_text(&text, 1000, 200);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 1000);
        // starts at 0, 800, 1600
        assert_eq!(chunks[2].len(), 900);
        assert!(chunk_text("", 1000, 200).is_empty());
        assert_eq!(chunk_text("short", 1000, 200), vec!["short"]);
    }

    #[test]
    fn test_chunk_text_extends_to_newline() {
        let text = format!("{}\n{}", "x".repeat(1010), "y".repeat(500));
        let chunks = chunk_text(&text, 1000, 200);
        assert!(chunks[0].ends_with('\n'));
        assert_eq!(chunks[0].len(), 1011);
    }

    #[test]
    fn test_cosine_similarity() {
        let a = embed("setup usage components");
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&a, &vec![0.0; EMBEDDING_DIMS]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(embed("Setup SETUP setup").iter().sum::<f32>(), 3.0);
    }
}
