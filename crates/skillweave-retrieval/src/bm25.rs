//! BM25 lexical index

use std::collections::{HashMap, HashSet};

/// BM25 saturation parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm25Params {
    /// Term-frequency saturation
    pub k1: f64,
    /// Length normalization strength
    pub b: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.5, b: 0.75 }
    }
}

/// Smoothed inverse document frequency: `ln((N - df + 0.5) / (df + 0.5) + 1)`
#[inline]
#[must_use]
pub fn idf(corpus_size: usize, doc_freq: usize) -> f64 {
    let n = corpus_size as f64;
    let df = doc_freq as f64;
    ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
}

/// Inverted statistics over a fixed, pre-tokenized corpus
#[derive(Debug, Clone)]
pub struct LexicalIndex {
    params: Bm25Params,
    term_freqs: Vec<HashMap<String, u32>>,
    doc_lens: Vec<usize>,
    avg_doc_len: f64,
    idf: HashMap<String, f64>,
}

impl LexicalIndex {
    /// Build the index; idf is computed once here
    pub fn build(tokenized_corpus: &[Vec<String>], params: Bm25Params) -> Self {
        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        let mut term_freqs = Vec::with_capacity(tokenized_corpus.len());
        let mut doc_lens = Vec::with_capacity(tokenized_corpus.len());

        for tokens in tokenized_corpus {
            doc_lens.push(tokens.len());

            let unique: HashSet<&String> = tokens.iter().collect();
            for token in unique {
                *doc_freq.entry(token.clone()).or_default() += 1;
            }

            let mut freqs: HashMap<String, u32> = HashMap::new();
            for token in tokens {
                *freqs.entry(token.clone()).or_default() += 1;
            }
            term_freqs.push(freqs);
        }

        let total_len: usize = doc_lens.iter().sum();
        let avg_doc_len = if doc_lens.is_empty() {
            0.0
        } else {
            total_len as f64 / doc_lens.len() as f64
        };

        let corpus_size = tokenized_corpus.len();
        let idf_table = doc_freq
            .into_iter()
            .map(|(term, df)| (term, idf(corpus_size, df)))
            .collect();

        Self {
            params,
            term_freqs,
            doc_lens,
            avg_doc_len,
            idf: idf_table,
        }
    }

    /// Number of indexed documents
    pub fn len(&self) -> usize {
        self.doc_lens.len()
    }

    /// Whether the index holds no documents
    pub fn is_empty(&self) -> bool {
        self.doc_lens.is_empty()
    }

    /// Score every document against the query tokens.
    ///
    /// Repeated query tokens count once per occurrence; tokens outside the
    /// vocabulary contribute nothing.
    pub fn score(&self, query_tokens: &[String]) -> Vec<f64> {
        let mut scores = vec![0.0; self.len()];
        if self.avg_doc_len <= 0.0 {
            return scores;
        }
        let Bm25Params { k1, b } = self.params;

        for token in query_tokens {
            let Some(&term_idf) = self.idf.get(token) else {
                continue;
            };
            for (index, freqs) in self.term_freqs.iter().enumerate() {
                let Some(&tf) = freqs.get(token) else {
                    continue;
                };
                let tf = f64::from(tf);
                let norm = 1.0 - b + b * (self.doc_lens[index] as f64 / self.avg_doc_len);
                scores[index] += term_idf * (tf * (k1 + 1.0)) / (tf + k1 * norm);
            }
        }
        scores
    }
}
