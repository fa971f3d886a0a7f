use crate::error::FormatError;
use crate::{DocVector, TermId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::Deref;
use std::sync::Arc;

/// Bidirectional token/id table with corpus and document frequencies.
///
/// Ids are handed out from a monotonic counter the first time a token is seen
/// and are never reassigned or removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Vocabulary {
    token_to_id: HashMap<String, TermId>,
    tokens: Vec<String>,
    cfs: Vec<u64>,
    dfs: Vec<u64>,
    num_docs: u64,
    num_positions: u64,
}

/// On-disk shape of a vocabulary. The token map is rebuilt from `tokens` on load.
#[derive(Serialize, Deserialize)]
pub(crate) struct VocabularyRecord {
    pub tokens: Vec<String>,
    pub cfs: Vec<u64>,
    pub dfs: Vec<u64>,
    pub num_docs: u64,
    pub num_positions: u64,
}

impl Vocabulary {
    pub fn new() -> Self { Self::default() }

    /// Absorb one document, growing the vocabulary as needed, and return its vector.
    pub fn add<I, S>(&mut self, tokens: I) -> DocVector
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut counts: HashMap<TermId, u32> = HashMap::new();
        let mut positions = 0u64;
        for token in tokens {
            let token = token.as_ref();
            let id = match self.token_to_id.get(token) {
                Some(&id) => id,
                None => self.assign(token),
            };
            *counts.entry(id).or_insert(0) += 1;
            positions += 1;
        }

        let mut vector: DocVector = counts.into_iter().collect();
        vector.sort_unstable_by_key(|&(id, _)| id);
        for &(id, count) in &vector {
            self.cfs[id as usize] += u64::from(count);
            self.dfs[id as usize] += 1;
        }
        self.num_docs += 1;
        self.num_positions += positions;
        vector
    }

    /// Convert tokens to a vector without touching any state. Unknown tokens are dropped.
    pub fn vectorize<I, S>(&self, tokens: I) -> DocVector
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut counts: HashMap<TermId, u32> = HashMap::new();
        for token in tokens {
            if let Some(&id) = self.token_to_id.get(token.as_ref()) {
                *counts.entry(id).or_insert(0) += 1;
            }
        }
        let mut vector: DocVector = counts.into_iter().collect();
        vector.sort_unstable_by_key(|&(id, _)| id);
        vector
    }

    fn assign(&mut self, token: &str) -> TermId {
        let id = self.tokens.len() as TermId;
        self.token_to_id.insert(token.to_owned(), id);
        self.tokens.push(token.to_owned());
        self.cfs.push(0);
        self.dfs.push(0);
        id
    }

    /// Read-only copy isolated from further mutation of `self`.
    pub fn snapshot(&self) -> VocabularySnapshot { VocabularySnapshot(Arc::new(self.clone())) }

    pub fn id(&self, token: &str) -> Option<TermId> { self.token_to_id.get(token).copied() }
    pub fn token(&self, id: TermId) -> Option<&str> { self.tokens.get(id as usize).map(String::as_str) }
    pub fn corpus_frequency(&self, id: TermId) -> Option<u64> { self.cfs.get(id as usize).copied() }
    pub fn doc_frequency(&self, id: TermId) -> Option<u64> { self.dfs.get(id as usize).copied() }
    pub fn token_to_id(&self) -> &HashMap<String, TermId> { &self.token_to_id }
    pub fn num_docs(&self) -> u64 { self.num_docs }
    pub fn num_positions(&self) -> u64 { self.num_positions }
    pub fn len(&self) -> usize { self.tokens.len() }
    pub fn is_empty(&self) -> bool { self.tokens.is_empty() }

    /// Tokens in id order.
    pub fn iter(&self) -> impl Iterator<Item = (TermId, &str)> + '_ {
        self.tokens.iter().enumerate().map(|(id, t)| (id as TermId, t.as_str()))
    }

    pub(crate) fn to_record(&self) -> VocabularyRecord {
        VocabularyRecord {
            tokens: self.tokens.clone(),
            cfs: self.cfs.clone(),
            dfs: self.dfs.clone(),
            num_docs: self.num_docs,
            num_positions: self.num_positions,
        }
    }

    pub(crate) fn from_record(record: VocabularyRecord) -> Result<Self, FormatError> {
        let VocabularyRecord { tokens, cfs, dfs, num_docs, num_positions } = record;
        if cfs.len() != tokens.len() || dfs.len() != tokens.len() {
            return Err(FormatError::Invalid(format!(
                "frequency tables ({} cfs, {} dfs) do not match {} tokens",
                cfs.len(),
                dfs.len(),
                tokens.len()
            )));
        }
        let mut token_to_id = HashMap::with_capacity(tokens.len());
        for (id, token) in tokens.iter().enumerate() {
            if token_to_id.insert(token.clone(), id as TermId).is_some() {
                return Err(FormatError::Invalid(format!("duplicate token {token:?}")));
            }
        }
        Ok(Self { token_to_id, tokens, cfs, dfs, num_docs, num_positions })
    }
}

/// Shared immutable view of a vocabulary. Cloning is cheap.
#[derive(Debug, Clone, Default)]
pub struct VocabularySnapshot(Arc<Vocabulary>);

impl Deref for VocabularySnapshot {
    type Target = Vocabulary;
    fn deref(&self) -> &Vocabulary { &self.0 }
}

impl From<Vocabulary> for VocabularySnapshot {
    fn from(vocab: Vocabulary) -> Self { Self(Arc::new(vocab)) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn single_document() {
        let mut v = Vocabulary::new();
        let vec = v.add(["hello", "world"]);
        assert_eq!(vec, vec![(0, 1), (1, 1)]);
        assert_eq!(v.len(), 2);
        assert_eq!(v.num_docs(), 1);
        assert_eq!(v.num_positions(), 2);
    }

    #[test]
    fn frequencies_across_documents() {
        let mut v = Vocabulary::new();
        v.add(["hello", "world"]);
        v.add(["hello"]);
        let last = v.add(["world", "world"]);
        assert_eq!(last, vec![(1, 2)]);

        let hello = v.id("hello").unwrap();
        let world = v.id("world").unwrap();
        assert_eq!(v.corpus_frequency(hello), Some(2));
        assert_eq!(v.corpus_frequency(world), Some(3));
        assert_eq!(v.doc_frequency(hello), Some(2));
        assert_eq!(v.doc_frequency(world), Some(2));
        assert_eq!(v.num_docs(), 3);
        assert_eq!(v.num_positions(), 5);
    }

    #[test]
    fn empty_document_still_counts() {
        let mut v = Vocabulary::new();
        let vec = v.add(Vec::<String>::new());
        assert!(vec.is_empty());
        assert_eq!(v.num_docs(), 1);
        assert!(v.is_empty());
    }

    #[test]
    fn first_seen_wins() {
        let mut v = Vocabulary::new();
        v.add(["zebra", "apple", "zebra"]);
        assert_eq!(v.id("zebra"), Some(0));
        assert_eq!(v.id("apple"), Some(1));
        assert_eq!(v.token(1), Some("apple"));
    }

    #[test]
    fn vectorize_does_not_grow() {
        let mut v = Vocabulary::new();
        v.add(["a", "b"]);
        let before = v.clone();
        assert_eq!(v.vectorize(["b", "b", "c"]), vec![(1, 2)]);
        assert_eq!(v, before);
    }

    #[test]
    fn snapshot_is_isolated() {
        let mut v = Vocabulary::new();
        v.add(["a"]);
        let snap = v.snapshot();
        v.add(["b"]);
        assert_eq!(snap.len(), 1);
        assert_eq!(snap.num_docs(), 1);
        assert_eq!(v.len(), 2);
    }

    #[test]
    fn record_rejects_mismatched_tables() {
        let record = VocabularyRecord { tokens: vec!["a".into()], cfs: vec![], dfs: vec![1], num_docs: 1, num_positions: 1 };
        assert!(Vocabulary::from_record(record).is_err());
    }

    proptest! {
        #[test]
        fn counters_stay_consistent(docs in prop::collection::vec(prop::collection::vec("[a-e]", 0..8), 0..20)) {
            let mut v = Vocabulary::new();
            let mut first_ids = HashMap::new();
            for doc in &docs {
                let vector = v.add(doc);
                prop_assert!(vector.windows(2).all(|w| w[0].0 < w[1].0));
                prop_assert!(vector.iter().all(|&(_, c)| c >= 1));
                for token in doc {
                    let id = v.id(token).unwrap();
                    prop_assert_eq!(*first_ids.entry(token.clone()).or_insert(id), id);
                }
            }
            let total: u64 = (0..v.len() as TermId).filter_map(|id| v.corpus_frequency(id)).sum();
            prop_assert_eq!(total, v.num_positions());
            prop_assert_eq!(v.num_docs(), docs.len() as u64);
            for id in 0..v.len() as TermId {
                prop_assert!(v.doc_frequency(id).unwrap() <= v.num_docs());
            }
            let restored = Vocabulary::from_record(v.to_record()).unwrap();
            prop_assert_eq!(restored, v);
        }
    }
}
