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

//! Text tokenization shared by vectorization, theming and query matching.

use regex::Regex;
use std::collections::HashSet;

/// Tokens are runs of two or more word characters.
const TOKEN_PATTERN: &str = r"\b\w\w+\b";

/// English function words excluded from vectors and themes.
const ENGLISH_STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "almost", "alone", "along",
    "already", "also", "although", "always", "am", "among", "an", "and", "another", "any",
    "anyhow", "anyone", "anything", "anyway", "anywhere", "are", "around", "as", "at", "be",
    "became", "because", "become", "becomes", "been", "before", "being", "below", "beside",
    "besides", "between", "beyond", "both", "but", "by", "can", "cannot", "could", "did", "do",
    "does", "doing", "done", "down", "due", "during", "each", "eg", "either", "else",
    "elsewhere", "enough", "etc", "even", "ever", "every", "everyone", "everything", "except",
    "few", "for", "former", "formerly", "from", "further", "had", "has", "have", "having", "he",
    "hence", "her", "here", "hers", "herself", "him", "himself", "his", "how", "however", "i",
    "ie", "if", "in", "indeed", "into", "is", "it", "its", "itself", "just", "last", "latter",
    "least", "less", "many", "may", "me", "meanwhile", "might", "more", "moreover", "most",
    "mostly", "much", "must", "my", "myself", "neither", "never", "nevertheless", "next", "no",
    "nobody", "none", "nor", "not", "nothing", "now", "of", "off", "often", "on", "once", "one",
    "only", "onto", "or", "other", "others", "otherwise", "our", "ours", "ourselves", "out",
    "over", "own", "per", "perhaps", "please", "rather", "re", "same", "seem", "seemed",
    "seeming", "seems", "several", "she", "should", "since", "so", "some", "somehow", "someone",
    "something", "sometime", "sometimes", "somewhere", "still", "such", "than", "that", "the",
    "their", "theirs", "them", "themselves", "then", "thence", "there", "thereafter", "thereby",
    "therefore", "therein", "these", "they", "this", "those", "though", "through", "throughout",
    "thus", "to", "together", "too", "toward", "towards", "under", "until", "up", "upon", "us",
    "very", "via", "was", "we", "well", "were", "what", "whatever", "when", "whence", "whenever",
    "where", "whereas", "whether", "which", "while", "who", "whoever", "whole", "whom", "whose",
    "why", "will", "with", "within", "without", "would", "yet", "you", "your", "yours",
    "yourself", "yourselves",
];

/// Lower-casing regex tokenizer with stop-word removal and optional n-grams.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    token_re: Regex,
    stopwords: HashSet<&'static str>,
    ngram_max: usize,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new(1)
    }
}

impl Tokenizer {
    /// Create a tokenizer emitting n-grams up to `ngram_max` (minimum 1).
    pub fn new(ngram_max: usize) -> Self {
        Self {
            token_re: Regex::new(TOKEN_PATTERN).unwrap(),
            stopwords: ENGLISH_STOP_WORDS.iter().copied().collect(),
            ngram_max: ngram_max.max(1),
        }
    }

    pub fn ngram_max(&self) -> usize {
        self.ngram_max
    }

    pub fn is_stop_word(&self, word: &str) -> bool {
        self.stopwords.contains(word)
    }

    /// All lower-cased tokens, stop words included.
    pub fn raw_tokens(&self, text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        self.token_re
            .find_iter(&lowered)
            .map(|m| m.as_str().to_string())
            .collect()
    }

    /// Lower-cased tokens with stop words removed.
    pub fn tokens(&self, text: &str) -> Vec<String> {
        let mut tokens = self.raw_tokens(text);
        tokens.retain(|t| !self.is_stop_word(t));
        tokens
    }

    /// Vocabulary terms: unigrams followed by n-grams of adjacent kept tokens.
    pub fn terms(&self, text: &str) -> Vec<String> {
        let tokens = self.tokens(text);
        if self.ngram_max == 1 || tokens.len() < 2 {
            return tokens;
        }

        let mut terms = tokens.clone();
        for n in 2..=self.ngram_max {
            if n > tokens.len() {
                break;
            }
            terms.extend(tokens.windows(n).map(|w| w.join(" ")));
        }
        terms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_lowercase_and_filter() {
        let tokenizer = Tokenizer::default();
        assert_eq!(
            tokenizer.tokens("What treats Liver disease, e.g. in a patient?"),
            vec!["treats", "liver", "disease", "patient"]
        );
    }

    #[test]
    fn test_single_characters_dropped() {
        let tokenizer = Tokenizer::default();
        assert_eq!(tokenizer.raw_tokens("a b 5 mg"), vec!["mg"]);
    }

    #[test]
    fn test_bigrams_from_adjacent_kept_tokens() {
        let tokenizer = Tokenizer::new(2);
        assert_eq!(
            tokenizer.terms("ejection fraction of the heart"),
            vec![
                "ejection",
                "fraction",
                "heart",
                "ejection fraction",
                "fraction heart"
            ]
        );
    }

    #[test]
    fn test_empty_text() {
        let tokenizer = Tokenizer::new(3);
        assert!(tokenizer.terms("").is_empty());
        assert!(tokenizer.terms("the of and").is_empty());
    }
}
