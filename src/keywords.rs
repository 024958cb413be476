//! Frequency-based keyword extraction.
//!
//! Tokens are lowercased words of three or more characters that are not
//! purely numeric and not stop words. Keywords rank by descending frequency;
//! equal counts keep the order in which the words first appeared.

use std::collections::{HashMap, HashSet};

const STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "also", "always", "am", "an",
    "and", "any", "app", "apps", "are", "aren't", "as", "at", "be", "because", "been", "before",
    "being", "below", "between", "both", "but", "by", "can", "can't", "cannot", "could",
    "couldn't", "did", "didn't", "do", "does", "doesn't", "doing", "don't", "down", "during",
    "each", "even", "ever", "every", "few", "for", "from", "further", "get", "gets", "got",
    "had", "hadn't", "has", "hasn't", "have", "haven't", "having", "he", "her", "here", "hers",
    "herself", "him", "himself", "his", "how", "i", "i'm", "i've", "if", "in", "into", "is",
    "isn't", "it", "it's", "its", "itself", "just", "let's", "like", "me", "more", "most",
    "much", "must", "my", "myself", "no", "nor", "not", "now", "of", "off", "on", "once",
    "one", "only", "or", "other", "our", "ours", "ourselves", "out", "over", "own", "really",
    "same", "she", "should", "so", "some", "still", "such", "than", "that", "that's", "the",
    "their", "theirs", "them", "themselves", "then", "there", "these", "they", "this", "those",
    "through", "time", "to", "too", "under", "until", "up", "use", "using", "very", "was",
    "wasn't", "way", "we", "were", "weren't", "what", "when", "where", "which", "while", "who",
    "whom", "why", "will", "with", "won't", "would", "wouldn't", "you", "your", "yours",
    "yourself", "yourselves",
];

const MIN_TOKEN_CHARS: usize = 3;

/// Keyword extractor with the built-in stop words plus any extras.
#[derive(Debug, Clone)]
pub struct KeywordExtractor {
    stop_words: HashSet<String>,
}

impl Default for KeywordExtractor {
    fn default() -> Self {
        Self::new(&[])
    }
}

impl KeywordExtractor {
    pub fn new(extra_stop_words: &[String]) -> Self {
        let stop_words = STOP_WORDS
            .iter()
            .map(|w| w.to_string())
            .chain(extra_stop_words.iter().map(|w| w.trim().to_lowercase()))
            .collect();
        Self { stop_words }
    }

    /// Lowercased candidate tokens of `text`, in order.
    pub fn tokens<'a>(&'a self, text: &'a str) -> impl Iterator<Item = String> + 'a {
        text.split(|c: char| !(c.is_alphanumeric() || c == '\''))
            .map(|t| t.trim_matches('\'').to_lowercase())
            .filter(move |t| {
                t.chars().count() >= MIN_TOKEN_CHARS
                    && !t.chars().all(|c| c.is_numeric())
                    && !self.stop_words.contains(t)
            })
    }

    /// The `top_n` most frequent keywords across `texts`.
    pub fn top_keywords<S: AsRef<str>>(&self, texts: &[S], top_n: usize) -> Vec<String> {
        // word -> (count, first position)
        let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
        let mut position = 0usize;

        for text in texts {
            for token in self.tokens(text.as_ref()) {
                counts
                    .entry(token)
                    .and_modify(|(n, _)| *n += 1)
                    .or_insert((1, position));
                position += 1;
            }
        }

        let mut ranked: Vec<(String, usize, usize)> = counts
            .into_iter()
            .map(|(word, (n, first))| (word, n, first))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));

        ranked
            .into_iter()
            .take(top_n)
            .map(|(word, _, _)| word)
            .collect()
    }
}
