use std::time::Instant;
use tracing::debug;

use crate::embedding::{embed_or_zero, Embedder};
use crate::index::VectorIndex;
use crate::text::remove_stop_words;
use crate::vector_ops::is_zero_vector;

/// Story text in, ranked context documents out.
pub struct Retriever<'a> {
    embedder: &'a dyn Embedder,
    index: &'a VectorIndex,
    top_k: usize,
    strip_stop_words: bool,
}

impl<'a> Retriever<'a> {
    pub fn new(
        embedder: &'a dyn Embedder,
        index: &'a VectorIndex,
        top_k: usize,
        strip_stop_words: bool,
    ) -> Self {
        Self {
            embedder,
            index,
            top_k,
            strip_stop_words,
        }
    }

    /// Stored documents nearest to `story_text`, closest first. An embedding
    /// failure degrades to the zero vector and is still searched.
    pub fn retrieve(&self, story_text: &str) -> Vec<String> {
        let start = Instant::now();

        let query_text = if self.strip_stop_words {
            remove_stop_words(story_text)
        } else {
            story_text.to_string()
        };

        let embedding = embed_or_zero(self.embedder, &query_text);
        if is_zero_vector(&embedding) {
            debug!("Searching with an all-zero query vector");
        }
        let docs = self.index.search(&embedding, self.top_k);

        debug!(
            "Retrieved {} of top {} context documents in {:?}",
            docs.len(),
            self.top_k,
            start.elapsed()
        );
        if let Some(first) = docs.first() {
            debug!("First context preview: {}", preview(first, 200));
        }
        docs
    }
}

pub(crate) fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Number;
    use crate::error::{RagError, Result};
    use crate::index::IndexPaths;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Embeds by counting a few keywords; remembers what it was asked.
    struct KeywordEmbedder {
        seen: Mutex<Vec<String>>,
    }

    impl KeywordEmbedder {
        fn new() -> Self {
            Self {
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl Embedder for KeywordEmbedder {
        fn dimension(&self) -> usize {
            3
        }
        fn embed_chunks(&self, text: &str) -> Result<Vec<Vec<Number>>> {
            self.seen.lock().unwrap().push(text.to_string());
            let lower = text.to_lowercase();
            let count = |w: &str| lower.matches(w).count() as Number;
            Ok(vec![vec![count("login"), count("payment"), count("report")]])
        }
    }

    struct Offline;

    impl Embedder for Offline {
        fn dimension(&self) -> usize {
            3
        }
        fn embed_chunks(&self, _text: &str) -> Result<Vec<Vec<Number>>> {
            Err(RagError::Upstream("offline".to_string()))
        }
    }

    fn corpus(dir: &TempDir) -> VectorIndex {
        let paths = IndexPaths::new(dir.path().join("i.index"), dir.path().join("m.json"));
        let mut index = VectorIndex::open(paths, 3).unwrap();
        index.add(&[1.0, 0.0, 0.0], "login case").unwrap();
        index.add(&[0.0, 1.0, 0.0], "payment case").unwrap();
        index.add(&[0.0, 0.0, 1.0], "report case").unwrap();
        index.add(&[0.0, 0.0, 0.0], "generic case").unwrap();
        index
    }

    #[test]
    fn returns_nearest_documents_verbatim() {
        let dir = TempDir::new().unwrap();
        let index = corpus(&dir);
        let embedder = KeywordEmbedder::new();
        let retriever = Retriever::new(&embedder, &index, 2, false);
        let docs = retriever.retrieve("Payment page should accept a card");
        assert_eq!(docs[0], "payment case");
        assert_eq!(docs.len(), 2);
    }

    #[test]
    fn strips_stop_words_before_embedding() {
        let dir = TempDir::new().unwrap();
        let index = corpus(&dir);
        let embedder = KeywordEmbedder::new();
        Retriever::new(&embedder, &index, 1, true).retrieve("The login is to the portal");
        assert_eq!(embedder.seen.lock().unwrap()[0], "login portal");
    }

    #[test]
    fn embedding_failure_still_searches_with_zero_vector() {
        let dir = TempDir::new().unwrap();
        let index = corpus(&dir);
        let docs = Retriever::new(&Offline, &index, 1, true).retrieve("anything");
        assert_eq!(docs, vec!["generic case"]);
    }

    #[test]
    fn empty_index_gives_no_context() {
        let dir = TempDir::new().unwrap();
        let paths = IndexPaths::new(dir.path().join("i.index"), dir.path().join("m.json"));
        let index = VectorIndex::open(paths, 3).unwrap();
        let embedder = KeywordEmbedder::new();
        assert!(Retriever::new(&embedder, &index, 5, true)
            .retrieve("login")
            .is_empty());
    }

    #[test]
    fn preview_cuts_on_char_boundary() {
        assert_eq!(preview("héllo", 2), "hé...");
        assert_eq!(preview("hi", 5), "hi");
    }
}
