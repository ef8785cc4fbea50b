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

//! Specialty labelling and community themes.
//!
//! Keyword matching against `name + context` of each member:
//! - multi-word keywords match as a substring of the lower-cased text
//! - single-word keywords match a token exactly, or as a token prefix when
//!   the keyword has four or more characters ("fracture" hits "fractures")
//!
//! A (member, keyword) pair counts once.

use crate::tokenizer::Tokenizer;
use medgraph_core::{Entity, SpecialtyConfig, SpecialtyTaxonomy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Shortest single-word keyword that also matches as a token prefix
const PREFIX_MATCH_MIN_LEN: usize = 4;

/// Per-specialty evidence for one community
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialtyScore {
    /// Total (member, keyword) hits
    pub hits: usize,
    /// CONDITION/MEDICATION members with at least one hit
    pub primary_members: usize,
}

/// Classifier result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialtyAssignment {
    pub specialty: String,
    pub hits: usize,
}

/// Keyword-overlap specialty classifier
#[derive(Debug, Clone)]
pub struct SpecialtyClassifier {
    taxonomy: SpecialtyTaxonomy,
    min_hits: usize,
    fallback_label: String,
    theme_size: usize,
    tokenizer: Tokenizer,
}

impl SpecialtyClassifier {
    pub fn new(taxonomy: SpecialtyTaxonomy, config: &SpecialtyConfig) -> Self {
        Self {
            taxonomy,
            min_hits: config.min_hits.max(1),
            fallback_label: config.fallback_label.clone(),
            theme_size: config.theme_size,
            tokenizer: Tokenizer::default(),
        }
    }

    pub fn taxonomy(&self) -> &SpecialtyTaxonomy {
        &self.taxonomy
    }

    pub fn fallback_label(&self) -> &str {
        &self.fallback_label
    }

    /// Hit counts for every specialty with at least one hit, by name
    pub fn score(&self, members: &[&Entity]) -> BTreeMap<String, SpecialtyScore> {
        let mut scores: BTreeMap<String, SpecialtyScore> = BTreeMap::new();

        for member in members {
            let text = format!("{} {}", member.name, member.context).to_lowercase();
            let tokens = self.tokenizer.raw_tokens(&text);

            for (specialty, keywords) in self.taxonomy.iter() {
                let hits = keywords
                    .iter()
                    .filter(|kw| keyword_hits(kw, &text, &tokens))
                    .count();
                if hits == 0 {
                    continue;
                }
                let score = scores.entry(specialty.to_string()).or_default();
                score.hits += hits;
                if member.entity_type.is_primary() {
                    score.primary_members += 1;
                }
            }
        }

        scores
    }

    /// Best specialty for a community.
    ///
    /// Highest hit count wins; ties go to the specialty with more
    /// CONDITION/MEDICATION members hitting it, then to the first name.
    pub fn classify(&self, members: &[&Entity]) -> SpecialtyAssignment {
        let scores = self.score(members);

        let mut best: Option<(&String, &SpecialtyScore)> = None;
        for (name, score) in &scores {
            let better = match best {
                None => true,
                Some((_, b)) => {
                    score.hits > b.hits
                        || (score.hits == b.hits && score.primary_members > b.primary_members)
                }
            };
            if better {
                best = Some((name, score));
            }
        }

        match best {
            Some((name, score)) if score.hits >= self.min_hits => SpecialtyAssignment {
                specialty: name.clone(),
                hits: score.hits,
            },
            _ => SpecialtyAssignment {
                specialty: self.fallback_label.clone(),
                hits: best.map(|(_, s)| s.hits).unwrap_or(0),
            },
        }
    }

    /// Most frequent non-stop-word terms across member contexts, ties broken
    /// lexicographically.
    pub fn theme(&self, members: &[&Entity]) -> Vec<String> {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for member in members {
            for token in self.tokenizer.tokens(&member.context) {
                *counts.entry(token).or_insert(0) += 1;
            }
        }

        let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked
            .into_iter()
            .take(self.theme_size)
            .map(|(term, _)| term)
            .collect()
    }
}

fn keyword_hits(keyword: &str, text: &str, tokens: &[String]) -> bool {
    if keyword.contains(char::is_whitespace) {
        return text.contains(keyword);
    }
    tokens.iter().any(|t| {
        t == keyword || (keyword.chars().count() >= PREFIX_MATCH_MIN_LEN && t.starts_with(keyword))
    })
}
