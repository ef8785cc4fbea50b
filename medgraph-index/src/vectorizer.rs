// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! TF-IDF Vectorization
//!
//! Builds one sparse vector per entity over a vocabulary fitted once per
//! build.
//!
//! ## Weighting
//!
//! idf(t) = ln((1 + N) / (1 + df(t))) + 1
//!
//! Where:
//! - N = number of documents (entities), empty ones included
//! - df(t) = number of documents containing t
//!
//! A document vector is raw term count × idf, L2-normalised. Terms are
//! sorted lexicographically, so the same corpus always yields the same axis.

use crate::error::{IndexError, IndexResult};
use crate::tokenizer::Tokenizer;
use medgraph_core::{Entity, VectorizerConfig};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Sparse vector with strictly increasing indices
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    indices: Vec<u32>,
    values: Vec<f64>,
}

impl SparseVector {
    /// Zero vector
    pub fn zero() -> Self {
        Self::default()
    }

    /// Build from unsorted `(index, value)` pairs. Duplicate indices are
    /// summed and zero entries dropped.
    pub fn from_pairs(mut pairs: Vec<(u32, f64)>) -> Self {
        pairs.sort_by_key(|(i, _)| *i);
        let mut indices = Vec::with_capacity(pairs.len());
        let mut values: Vec<f64> = Vec::with_capacity(pairs.len());
        for (i, v) in pairs {
            if indices.last() == Some(&i) {
                if let Some(last) = values.last_mut() {
                    *last += v;
                }
            } else {
                indices.push(i);
                values.push(v);
            }
        }

        let mut vector = Self { indices, values };
        vector.prune_zeros();
        vector
    }

    fn prune_zeros(&mut self) {
        if self.values.iter().all(|v| *v != 0.0) {
            return;
        }
        let (indices, values) = self
            .indices
            .iter()
            .zip(self.values.iter())
            .filter(|(_, v)| **v != 0.0)
            .map(|(i, v)| (*i, *v))
            .unzip();
        self.indices = indices;
        self.values = values;
    }

    pub fn is_zero(&self) -> bool {
        self.indices.is_empty()
    }

    /// Number of non-zero entries
    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, f64)> + '_ {
        self.indices.iter().copied().zip(self.values.iter().copied())
    }

    pub fn get(&self, index: u32) -> f64 {
        match self.indices.binary_search(&index) {
            Ok(pos) => self.values[pos],
            Err(_) => 0.0,
        }
    }

    pub fn norm(&self) -> f64 {
        self.values.iter().map(|v| v * v).sum::<f64>().sqrt()
    }

    /// Scale to unit length; the zero vector stays zero
    pub fn normalize(&mut self) {
        let norm = self.norm();
        if norm > 0.0 {
            for v in &mut self.values {
                *v /= norm;
            }
        }
    }

    /// Dot product by merge join over the sorted indices
    pub fn dot(&self, other: &SparseVector) -> f64 {
        let (mut i, mut j) = (0, 0);
        let mut sum = 0.0;
        while i < self.indices.len() && j < other.indices.len() {
            match self.indices[i].cmp(&other.indices[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    sum += self.values[i] * other.values[j];
                    i += 1;
                    j += 1;
                }
            }
        }
        sum
    }

    /// Cosine similarity; 0 when either side is the zero vector
    pub fn cosine(&self, other: &SparseVector) -> f64 {
        let denom = self.norm() * other.norm();
        if denom == 0.0 {
            return 0.0;
        }
        self.dot(other) / denom
    }

    /// Element-wise sum
    pub fn add(&mut self, other: &SparseVector) {
        if other.is_zero() {
            return;
        }
        let mut pairs: Vec<(u32, f64)> = self.iter().collect();
        pairs.extend(other.iter());
        *self = Self::from_pairs(pairs);
    }
}

#[derive(Serialize, Deserialize)]
struct VocabularyEntries {
    document_count: usize,
    terms: Vec<String>,
    idf: Vec<f64>,
}

/// Fitted term axis with smoothed IDF weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "VocabularyEntries", into = "VocabularyEntries")]
pub struct Vocabulary {
    document_count: usize,
    terms: Vec<String>,
    idf: Vec<f64>,
    index: HashMap<String, u32>,
}

impl TryFrom<VocabularyEntries> for Vocabulary {
    type Error = String;

    fn try_from(entries: VocabularyEntries) -> Result<Self, Self::Error> {
        if entries.terms.len() != entries.idf.len() {
            return Err(format!(
                "vocabulary has {} terms but {} idf weights",
                entries.terms.len(),
                entries.idf.len()
            ));
        }
        Ok(Self::from_parts(entries.document_count, entries.terms, entries.idf))
    }
}

impl From<Vocabulary> for VocabularyEntries {
    fn from(vocab: Vocabulary) -> Self {
        Self {
            document_count: vocab.document_count,
            terms: vocab.terms,
            idf: vocab.idf,
        }
    }
}

impl Vocabulary {
    fn from_parts(document_count: usize, terms: Vec<String>, idf: Vec<f64>) -> Self {
        let index = terms
            .iter()
            .enumerate()
            .map(|(i, t)| (t.clone(), i as u32))
            .collect();
        Self {
            document_count,
            terms,
            idf,
            index,
        }
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Number of documents the vocabulary was fitted on
    pub fn document_count(&self) -> usize {
        self.document_count
    }

    pub fn index_of(&self, term: &str) -> Option<u32> {
        self.index.get(term).copied()
    }

    pub fn term(&self, index: u32) -> Option<&str> {
        self.terms.get(index as usize).map(String::as_str)
    }

    pub fn idf(&self, index: u32) -> Option<f64> {
        self.idf.get(index as usize).copied()
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }
}

/// Text for one entity as fed to the vectorizer
pub fn document_text(entity: &Entity, config: &VectorizerConfig) -> String {
    let mut parts: Vec<&str> = Vec::with_capacity(3);
    if config.include_name {
        parts.push(&entity.name);
    }
    if config.include_type {
        parts.push(entity.entity_type.as_str());
    }
    parts.push(&entity.context);
    parts.join(" ")
}

/// TF-IDF vectorizer
#[derive(Debug, Clone)]
pub struct TextVectorizer {
    config: VectorizerConfig,
    tokenizer: Tokenizer,
    vocabulary: Option<Vocabulary>,
}

impl TextVectorizer {
    /// Create an unfitted vectorizer
    pub fn new(config: VectorizerConfig) -> Self {
        let tokenizer = Tokenizer::new(config.ngram_max);
        Self {
            config,
            tokenizer,
            vocabulary: None,
        }
    }

    /// Restore a fitted vectorizer from a stored vocabulary
    pub fn with_vocabulary(config: VectorizerConfig, vocabulary: Vocabulary) -> Self {
        let mut vectorizer = Self::new(config);
        vectorizer.vocabulary = Some(vocabulary);
        vectorizer
    }

    pub fn config(&self) -> &VectorizerConfig {
        &self.config
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    pub fn vocabulary(&self) -> Option<&Vocabulary> {
        self.vocabulary.as_ref()
    }

    /// Fit the vocabulary on `documents` and return one vector per document.
    ///
    /// Fails with `InsufficientData` when fewer than two documents end up
    /// with a non-zero vector.
    pub fn fit_transform(&mut self, documents: &[String]) -> IndexResult<Vec<SparseVector>> {
        if self.config.min_df == 0 {
            return Err(IndexError::InvalidConfiguration(
                "min_df must be >= 1".to_string(),
            ));
        }
        if !(self.config.max_df_ratio > 0.0 && self.config.max_df_ratio <= 1.0) {
            return Err(IndexError::InvalidConfiguration(format!(
                "max_df_ratio must be in (0, 1], got {}",
                self.config.max_df_ratio
            )));
        }

        let n = documents.len();
        let counted: Vec<BTreeMap<String, usize>> = documents
            .iter()
            .map(|doc| {
                let mut counts = BTreeMap::new();
                for term in self.tokenizer.terms(doc) {
                    *counts.entry(term).or_insert(0) += 1;
                }
                counts
            })
            .collect();

        // Document and corpus frequency per term, ordered by term
        let mut df: BTreeMap<&str, usize> = BTreeMap::new();
        let mut tf: BTreeMap<&str, usize> = BTreeMap::new();
        for counts in &counted {
            for (term, count) in counts {
                *df.entry(term.as_str()).or_insert(0) += 1;
                *tf.entry(term.as_str()).or_insert(0) += count;
            }
        }

        let max_df = self.config.max_df_ratio * n as f64;
        let mut kept: Vec<&str> = df
            .iter()
            .filter(|&(_, &d)| d >= self.config.min_df && d as f64 <= max_df)
            .map(|(t, _)| *t)
            .collect();

        if let Some(limit) = self.config.max_features {
            if kept.len() > limit {
                kept.sort_by(|a, b| tf[b].cmp(&tf[a]).then_with(|| a.cmp(b)));
                kept.truncate(limit);
                kept.sort_unstable();
            }
        }

        let idf: Vec<f64> = kept
            .iter()
            .map(|t| ((1.0 + n as f64) / (1.0 + df[t] as f64)).ln() + 1.0)
            .collect();
        let terms: Vec<String> = kept.iter().map(|t| t.to_string()).collect();
        let vocabulary = Vocabulary::from_parts(n, terms, idf);

        let vectors: Vec<SparseVector> = counted
            .iter()
            .map(|counts| Self::weigh(&vocabulary, counts))
            .collect();

        let found = vectors.iter().filter(|v| !v.is_zero()).count();
        tracing::debug!(
            documents = n,
            vocabulary = vocabulary.len(),
            non_empty = found,
            "Fitted TF-IDF vocabulary"
        );
        if found < 2 {
            return Err(IndexError::InsufficientData { found });
        }

        self.vocabulary = Some(vocabulary);
        Ok(vectors)
    }

    /// Vectorize text against the fitted vocabulary.
    ///
    /// Unknown terms contribute nothing; an unfitted vectorizer yields the
    /// zero vector.
    pub fn transform(&self, text: &str) -> SparseVector {
        let Some(vocabulary) = &self.vocabulary else {
            return SparseVector::zero();
        };
        let mut counts = BTreeMap::new();
        for term in self.tokenizer.terms(text) {
            *counts.entry(term).or_insert(0) += 1;
        }
        Self::weigh(vocabulary, &counts)
    }

    fn weigh(vocabulary: &Vocabulary, counts: &BTreeMap<String, usize>) -> SparseVector {
        let pairs: Vec<(u32, f64)> = counts
            .iter()
            .filter_map(|(term, &count)| {
                let idx = vocabulary.index_of(term)?;
                let idf = vocabulary.idf(idx)?;
                Some((idx, count as f64 * idf))
            })
            .collect();
        let mut vector = SparseVector::from_pairs(pairs);
        vector.normalize();
        vector
    }
}
