//! BM25-weighted sparse vectors for hybrid search, generated alongside the
//! dense embedding for each chunk.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};

const VOCAB_SIZE: u32 = 1 << 18;
const MIN_TOKEN_LEN: usize = 2;
const K1: f64 = 1.2;
const B: f64 = 0.75;

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}

/// Tokenize: lowercase, split on non-word boundaries, drop tokens shorter
/// than two characters.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '_')
        .map(|t| t.to_lowercase())
        .filter(|t| t.chars().count() >= MIN_TOKEN_LEN)
        .collect()
}

/// Stable index for a token in the fixed-size vocabulary space.
pub fn token_index(token: &str) -> u32 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    token.hash(&mut hasher);
    (hasher.finish() % VOCAB_SIZE as u64) as u32
}

/// BM25 document-frequency statistics, trained once over a corpus and then
/// reused to weight every document's sparse vector. Until `train` is called,
/// idf defaults to 1.0 for every token (an untrained floor, not a real
/// ranking signal).
#[derive(Debug, Clone, Default)]
pub struct Bm25Index {
    doc_freq: HashMap<String, u32>,
    doc_count: u32,
    avg_doc_len: f64,
    trained: bool,
}

impl Bm25Index {
    pub fn new() -> Self {
        Self::default()
    }

    /// Train document-frequency and average-length statistics over a corpus.
    /// Safe to call repeatedly; each call replaces prior statistics.
    pub fn train<'a, I: IntoIterator<Item = &'a str>>(&mut self, corpus: I) {
        let mut doc_freq: HashMap<String, u32> = HashMap::new();
        let mut total_len = 0u64;
        let mut doc_count = 0u32;

        for doc in corpus {
            let tokens = tokenize(doc);
            total_len += tokens.len() as u64;
            doc_count += 1;
            let unique: std::collections::HashSet<&String> = tokens.iter().collect();
            for token in unique {
                *doc_freq.entry(token.clone()).or_insert(0) += 1;
            }
        }

        self.doc_freq = doc_freq;
        self.doc_count = doc_count;
        self.avg_doc_len = if doc_count > 0 { total_len as f64 / doc_count as f64 } else { 0.0 };
        self.trained = doc_count > 0;
    }

    fn idf(&self, token: &str) -> f64 {
        if !self.trained {
            return 1.0;
        }
        let df = *self.doc_freq.get(token).unwrap_or(&0) as f64;
        let n = self.doc_count as f64;
        (((n - df + 0.5) / (df + 0.5)) + 1.0).ln()
    }

    /// Produce a BM25-weighted sparse vector for one document's text.
    pub fn vectorize(&self, text: &str) -> SparseVector {
        let tokens = tokenize(text);
        let doc_len = tokens.len() as f64;
        let avg_len = if self.trained && self.avg_doc_len > 0.0 { self.avg_doc_len } else { doc_len.max(1.0) };

        let mut term_freq: HashMap<String, u32> = HashMap::new();
        for token in &tokens {
            *term_freq.entry(token.clone()).or_insert(0) += 1;
        }

        let mut weights: HashMap<u32, f32> = HashMap::new();
        for (token, tf) in term_freq {
            let tf = tf as f64;
            let idf = self.idf(&token);
            let denom = tf + K1 * (1.0 - B + B * (doc_len / avg_len));
            let weight = idf * ((tf * (K1 + 1.0)) / denom.max(f64::EPSILON));
            let index = token_index(&token);
            let entry = weights.entry(index).or_insert(0.0);
            *entry += weight as f32;
        }

        let mut indices: Vec<u32> = weights.keys().copied().collect();
        indices.sort_unstable();
        let values: Vec<f32> = indices.iter().map(|i| weights[i]).collect();
        SparseVector { indices, values }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_drops_short_tokens_and_lowercases() {
        let tokens = tokenize("Fn Add(a: i32, b: i32) -> i32");
        assert!(tokens.contains(&"fn".to_string()));
        assert!(tokens.contains(&"add".to_string()));
        assert!(!tokens.contains(&"a".to_string()));
    }

    #[test]
    fn token_index_is_stable() {
        assert_eq!(token_index("function"), token_index("function"));
    }

    #[test]
    fn untrained_index_still_produces_nonempty_vector() {
        let index = Bm25Index::new();
        let vec = index.vectorize("fn parse_request(body: &str) -> Result<Request>");
        assert!(!vec.indices.is_empty());
        assert_eq!(vec.indices.len(), vec.values.len());
    }

    #[test]
    fn rare_terms_get_higher_weight_after_training() {
        let mut index = Bm25Index::new();
        index.train(vec!["fn handler() {}", "fn handler() {}", "fn special_unique_term() {}"]);
        let common = index.vectorize("fn handler() {}");
        let rare = index.vectorize("fn special_unique_term() {}");
        let common_weight = common.values.iter().cloned().fold(0.0_f32, f32::max);
        let rare_weight = rare.values.iter().cloned().fold(0.0_f32, f32::max);
        assert!(rare_weight > common_weight);
    }

    #[test]
    fn indices_are_sorted() {
        let index = Bm25Index::new();
        let vec = index.vectorize("one two three four five six seven eight nine ten");
        let mut sorted = vec.indices.clone();
        sorted.sort_unstable();
        assert_eq!(vec.indices, sorted);
    }
}
