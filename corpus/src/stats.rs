use crate::vocab::Vocabulary;
use serde::Serialize;

const MOST_COMMON: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorpusStatistics {
    pub num_docs: u64,
    pub num_words: u64,
    pub unique_words: usize,
    pub words_per_doc: f64,
    /// Top tokens by corpus frequency; ties keep id order.
    pub most_common: Vec<(String, u64)>,
    /// Tokens seen exactly once across the corpus.
    pub rare_words: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WordStatistics {
    pub corpus_count: u64,
    pub doc_count: u64,
}

impl Vocabulary {
    pub fn statistics(&self) -> CorpusStatistics {
        let mut by_freq: Vec<(&str, u64)> =
            self.iter().map(|(id, token)| (token, self.corpus_frequency(id).unwrap_or(0))).collect();
        let rare_words = by_freq.iter().filter(|(_, cf)| *cf == 1).map(|(t, _)| t.to_string()).collect();
        // stable sort keeps id order among equal frequencies
        by_freq.sort_by(|a, b| b.1.cmp(&a.1));
        let most_common = by_freq.into_iter().take(MOST_COMMON).map(|(t, cf)| (t.to_string(), cf)).collect();

        let words_per_doc = if self.num_docs() > 0 { self.num_positions() as f64 / self.num_docs() as f64 } else { 0.0 };
        CorpusStatistics {
            num_docs: self.num_docs(),
            num_words: self.num_positions(),
            unique_words: self.len(),
            words_per_doc,
            most_common,
            rare_words,
        }
    }

    pub fn word_statistics(&self, token: &str) -> Option<WordStatistics> {
        let id = self.id(token)?;
        Some(WordStatistics {
            corpus_count: self.corpus_frequency(id)?,
            doc_count: self.doc_frequency(id)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_vocabulary() {
        let s = Vocabulary::new().statistics();
        assert_eq!(s.num_docs, 0);
        assert_eq!(s.num_words, 0);
        assert_eq!(s.unique_words, 0);
        assert_eq!(s.words_per_doc, 0.0);
        assert!(s.most_common.is_empty());
        assert!(s.rare_words.is_empty());
    }

    #[test]
    fn forest_corpus() {
        let words = ["the", "quick", "brown", "fox", "jumps", "over", "lazy", "dog", "in", "forest"];
        let mut v = Vocabulary::new();
        v.add(words);
        for start in 0..words.len() {
            v.add(&words[start..]);
        }
        v.add(["rare", "words"]);

        let s = v.statistics();
        assert_eq!(s.num_docs, 12);
        assert_eq!(s.num_words, 67);
        assert_eq!(s.unique_words, 12);
        assert!((s.words_per_doc - 67.0 / 12.0).abs() < 1e-12);
        let expected: Vec<(String, u64)> = [
            ("forest", 11), ("in", 10), ("dog", 9), ("lazy", 8), ("over", 7),
            ("jumps", 6), ("fox", 5), ("brown", 4), ("quick", 3), ("the", 2),
        ]
        .iter()
        .map(|&(t, c)| (t.to_string(), c))
        .collect();
        assert_eq!(s.most_common, expected);
        assert_eq!(s.rare_words, vec!["rare".to_string(), "words".to_string()]);
    }

    #[test]
    fn ties_keep_first_seen_order() {
        let mut v = Vocabulary::new();
        v.add(["b", "a", "c", "c"]);
        let s = v.statistics();
        assert_eq!(s.most_common[0], ("c".to_string(), 2));
        assert_eq!(s.most_common[1], ("b".to_string(), 1));
        assert_eq!(s.most_common[2], ("a".to_string(), 1));
    }

    #[test]
    fn word_statistics() {
        let mut v = Vocabulary::new();
        v.add(["the", "quick", "brown", "fox", "jumps", "over", "the"]);
        v.add(["lazy", "dog"]);
        assert_eq!(v.word_statistics("the"), Some(WordStatistics { corpus_count: 2, doc_count: 1 }));
        assert_eq!(v.word_statistics("dog"), Some(WordStatistics { corpus_count: 1, doc_count: 1 }));
        assert_eq!(v.word_statistics("cat"), None);
    }
}
