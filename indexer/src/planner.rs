//! Two-phase search planner
//!
//! Phase 1 runs bitmap algebra on the coarse layers to find candidate block
//! heights. It may admit false positives but never drops a block holding a
//! match. Phase 2 resolves each candidate block through the fine index.

use log::{debug, warn};
use std::sync::Arc;

use medchain_index_core::models::buckets::MAX_SEARCH_AGE;
use medchain_index_core::models::domains;
use medchain_index_core::models::IndexedAttribute;
use medchain_index_core::utils::{age_buckets_for_range, hash_bucket, intersect_ids, scratch_id, set_bit_offsets};

use crate::error::{IndexerError, Result};
use crate::keys::KeyLayout;
use crate::store::IndexStore;

/// A structured attribute search
///
/// Ages of zero or less mean "not given". Empty strings mean "no predicate".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchRequest {
    /// Domain identifier, required
    pub domain_id: String,
    /// Lower age bound
    pub age_start: i64,
    /// Upper age bound
    pub age_end: i64,
    /// Disease code
    pub disease_code: String,
    /// Patient name
    pub name: String,
    /// Patient gender
    pub gender: String,
    /// Hospital name
    pub hospital: String,
    /// Department name
    pub department: String,
    /// Uploader identifier
    pub uid: String,
}

impl SearchRequest {
    /// Create a request for a domain identifier
    pub fn new(domain_id: impl Into<String>) -> Self {
        Self {
            domain_id: domain_id.into(),
            ..Default::default()
        }
    }

    /// Create a request for a bare domain name
    pub fn for_domain_name(name: &str) -> Self {
        Self::new(domains::domain_id_for(name))
    }

    /// Set the age bounds
    pub fn with_age(mut self, start: i64, end: i64) -> Self {
        self.age_start = start;
        self.age_end = end;
        self
    }

    /// Set an equality predicate on a string attribute
    pub fn with(mut self, attribute: IndexedAttribute, value: impl Into<String>) -> Self {
        let value = value.into();
        match attribute {
            IndexedAttribute::DiseaseCode => self.disease_code = value,
            IndexedAttribute::Name => self.name = value,
            IndexedAttribute::Gender => self.gender = value,
            IndexedAttribute::Hospital => self.hospital = value,
            IndexedAttribute::Department => self.department = value,
            IndexedAttribute::Uid => self.uid = value,
            IndexedAttribute::DomainId => self.domain_id = value,
            IndexedAttribute::Age => {
                if let Ok(age) = value.trim().parse() {
                    self.age_start = age;
                    self.age_end = age;
                }
            }
        }
        self
    }

    /// Inclusive age range after normalization, if any.
    ///
    /// Only a start means an exact age, only an end means `[0, end]`, and
    /// reversed bounds are swapped.
    pub fn age_range(&self) -> Option<(i64, i64)> {
        match (self.age_start > 0, self.age_end > 0) {
            (false, false) => None,
            (true, false) => Some((self.age_start, self.age_start)),
            (false, true) => Some((0, self.age_end)),
            (true, true) => Some((self.age_start.min(self.age_end), self.age_start.max(self.age_end))),
        }
    }

    /// Trimmed copy with normalized age bounds
    pub fn normalized(&self) -> Self {
        let (age_start, age_end) = self.age_range().unwrap_or((0, 0));
        Self {
            domain_id: self.domain_id.trim().to_string(),
            age_start,
            age_end,
            disease_code: self.disease_code.trim().to_string(),
            name: self.name.trim().to_string(),
            gender: self.gender.trim().to_string(),
            hospital: self.hospital.trim().to_string(),
            department: self.department.trim().to_string(),
            uid: self.uid.trim().to_string(),
        }
    }

    /// Non-empty equality predicates, excluding the domain
    pub fn equality_predicates(&self) -> Vec<(IndexedAttribute, &str)> {
        [
            (IndexedAttribute::DiseaseCode, self.disease_code.as_str()),
            (IndexedAttribute::Name, self.name.as_str()),
            (IndexedAttribute::Gender, self.gender.as_str()),
            (IndexedAttribute::Hospital, self.hospital.as_str()),
            (IndexedAttribute::Department, self.department.as_str()),
            (IndexedAttribute::Uid, self.uid.as_str()),
        ]
        .into_iter()
        .filter(|(_, value)| !value.is_empty())
        .collect()
    }
}

/// Executes searches against the index layers
pub struct SearchPlanner {
    store: Arc<dyn IndexStore>,
    keys: KeyLayout,
}

impl SearchPlanner {
    /// Create a new planner
    pub fn new(store: Arc<dyn IndexStore>, keys: KeyLayout) -> Self {
        Self { store, keys }
    }

    /// Find the transaction ids matching a request
    pub async fn search(&self, request: &SearchRequest) -> Result<Vec<String>> {
        let request = request.normalized();
        let heights = self.candidate_blocks(&request).await?;
        debug!("Phase 1 produced {} candidate blocks", heights.len());

        let mut tx_ids = Vec::new();
        for height in heights {
            tx_ids.extend(self.resolve_block(&request, height).await?);
        }
        Ok(tx_ids)
    }

    /// Phase 1: candidate block heights, ascending.
    ///
    /// Scratch keys are removed before returning, on success and on error.
    pub async fn candidate_blocks(&self, request: &SearchRequest) -> Result<Vec<u64>> {
        let request = request.normalized();
        if request.domain_id.is_empty() {
            return Err(IndexerError::InvalidRequest("domain identifier is required".to_string()));
        }
        if let Some((_, end)) = request.age_range() {
            if end > MAX_SEARCH_AGE {
                return Err(IndexerError::InvalidRequest(format!(
                    "age bound {} exceeds the maximum of {}",
                    end, MAX_SEARCH_AGE
                )));
            }
        }

        let search_id = scratch_id();
        let mut scratch = Vec::new();
        let result = self.bitmap_phase(&request, &search_id, &mut scratch).await;

        if !scratch.is_empty() {
            if let Err(e) = self.store.del(&scratch).await {
                warn!("Failed to delete scratch keys of search {}: {}", search_id, e);
            }
        }
        result
    }

    async fn bitmap_phase(&self, request: &SearchRequest, search_id: &str, scratch: &mut Vec<String>) -> Result<Vec<u64>> {
        let domain_key = self.keys.domain(&request.domain_id);

        let (mut current, from_domain) = match request.age_range() {
            Some((start, end)) => {
                let dest = self.keys.scratch(search_id, "age");
                let sources: Vec<String> = age_buckets_for_range(start, end)
                    .map(|bucket| self.keys.bucket(IndexedAttribute::Age, bucket))
                    .collect();
                scratch.push(dest.clone());
                self.store.bitop_or(&dest, &sources).await?;
                (dest, false)
            }
            None => (domain_key.clone(), true),
        };

        for (step, (attribute, value)) in request.equality_predicates().into_iter().enumerate() {
            let dest = self.keys.scratch(search_id, &format!("and{}", step));
            let bucket = self.keys.bucket(attribute, hash_bucket(value));
            scratch.push(dest.clone());
            self.store.bitop_and(&dest, &[current.clone(), bucket]).await?;

            if current != domain_key {
                self.store.del(&[current.clone()]).await?;
                scratch.retain(|key| *key != current);
            }
            current = dest;
        }

        if !from_domain {
            let dest = self.keys.scratch(search_id, "final");
            scratch.push(dest.clone());
            self.store.bitop_and(&dest, &[current, domain_key]).await?;
            current = dest;
        }

        let bitmap = self.store.get_bitmap(&current).await?;
        Ok(set_bit_offsets(&bitmap))
    }

    async fn lookup(&self, height: u64, attribute: IndexedAttribute, value: &str) -> Result<Option<Vec<String>>> {
        let key = self.keys.block_hash(height, attribute);
        match self.store.hget(&key, value).await? {
            None => Ok(None),
            Some(encoded) => match serde_json::from_str(&encoded) {
                Ok(tx_ids) => Ok(Some(tx_ids)),
                Err(e) => {
                    warn!("Malformed fine index entry {} field {}: {}", key, value, e);
                    Ok(None)
                }
            },
        }
    }

    /// Phase 2: exact matches inside one candidate block
    async fn resolve_block(&self, request: &SearchRequest, height: u64) -> Result<Vec<String>> {
        let mut lists: Vec<Vec<String>> = Vec::new();

        if let Some((start, end)) = request.age_range() {
            let members = self
                .store
                .zrange_by_score(&self.keys.block_age_zset(height), start, end)
                .await?;
            if members.is_empty() {
                return Ok(Vec::new());
            }
            lists.push(members);
        }

        let mut predicates = request.equality_predicates();
        predicates.push((IndexedAttribute::DomainId, request.domain_id.as_str()));

        for (attribute, value) in predicates {
            match self.lookup(height, attribute, value).await? {
                Some(tx_ids) => lists.push(tx_ids),
                // A missing value rules out the whole block
                None => return Ok(Vec::new()),
            }
        }

        let mut lists = lists.into_iter();
        let first = match lists.next() {
            Some(first) => first,
            None => return Ok(Vec::new()),
        };
        Ok(lists.fold(first, |acc, next| intersect_ids(&next, &acc)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::IndexBuilder;
    use crate::store::{MemoryStore, WriteBatch};
    use medchain_index_core::models::{Block, Transaction, TxParameter};
    use proptest::prelude::*;
    use rstest::rstest;

    #[derive(Debug, Clone)]
    struct Rec {
        tx_id: String,
        domain: String,
        age: i64,
        gender: String,
        disease: String,
        uid: String,
        name: String,
        hospital: String,
    }

    impl Rec {
        fn tx(&self) -> Transaction {
            Transaction::new(
                self.tx_id.clone(),
                vec![
                    TxParameter::new("domainID", self.domain.clone()),
                    TxParameter::new("age", self.age.to_string()),
                    TxParameter::new("gender", self.gender.clone()),
                    TxParameter::new("diseaseCode", self.disease.clone()),
                    TxParameter::new("uId", self.uid.clone()),
                    TxParameter::new("name", self.name.clone()),
                    TxParameter::new("hospital", self.hospital.clone()),
                ],
            )
        }

        fn matches(&self, request: &SearchRequest) -> bool {
            let request = request.normalized();
            request.domain_id == self.domain
                && request
                    .age_range()
                    .map_or(true, |(start, end)| (start..=end).contains(&self.age))
                && (request.gender.is_empty() || request.gender == self.gender)
                && (request.disease_code.is_empty() || request.disease_code == self.disease)
                && (request.uid.is_empty() || request.uid == self.uid)
                && (request.name.is_empty() || request.name == self.name)
                && (request.hospital.is_empty() || request.hospital == self.hospital)
        }

        fn with_owner(mut self, uid: &str, name: &str, hospital: &str) -> Self {
            self.uid = uid.to_string();
            self.name = name.to_string();
            self.hospital = hospital.to_string();
            self
        }
    }

    fn rec(tx_id: &str, domain: &str, age: i64, gender: &str, disease: &str) -> Rec {
        Rec {
            tx_id: tx_id.to_string(),
            domain: domain.to_string(),
            age,
            gender: gender.to_string(),
            disease: disease.to_string(),
            uid: String::new(),
            name: String::new(),
            hospital: String::new(),
        }
    }

    async fn indexed(blocks: &[Vec<Rec>]) -> (Arc<MemoryStore>, SearchPlanner) {
        let store = Arc::new(MemoryStore::new());
        let builder = IndexBuilder::new(store.clone(), KeyLayout::default());
        for (height, recs) in blocks.iter().enumerate() {
            let block = Block::new(height as u64, recs.iter().map(Rec::tx).collect());
            builder.index_block(&block).await.unwrap();
        }
        let planner = SearchPlanner::new(store.clone(), KeyLayout::default());
        (store, planner)
    }

    #[rstest]
    #[case(0, 0, None)]
    #[case(-3, 0, None)]
    #[case(25, 0, Some((25, 25)))]
    #[case(0, 40, Some((0, 40)))]
    #[case(-5, 40, Some((0, 40)))]
    #[case(50, 30, Some((30, 50)))]
    #[case(30, 50, Some((30, 50)))]
    fn test_age_normalization(#[case] start: i64, #[case] end: i64, #[case] expected: Option<(i64, i64)>) {
        let req = SearchRequest::new("DOMAIN_a").with_age(start, end);
        assert_eq!(req.age_range(), expected);

        let normalized = req.normalized();
        assert_eq!((normalized.age_start, normalized.age_end), expected.unwrap_or((0, 0)));
    }

    #[test]
    fn test_request_builders() {
        let req = SearchRequest::for_domain_name(" clinicA ")
            .with(IndexedAttribute::Gender, " F ")
            .with(IndexedAttribute::Name, "");
        assert_eq!(req.domain_id, "DOMAIN_clinicA");

        let normalized = req.normalized();
        assert_eq!(normalized.equality_predicates(), vec![(IndexedAttribute::Gender, "F")]);
    }

    #[tokio::test]
    async fn test_domain_and_age_scenario() {
        let (store, planner) = indexed(&[vec![rec("tx-alice", "DOMAIN_clinicA", 34, "F", "")]]).await;

        let request = SearchRequest::new("DOMAIN_clinicA").with_age(30, 40);
        assert_eq!(planner.search(&request).await.unwrap(), vec!["tx-alice"]);

        // Scratch keys never outlive the search
        assert!(store.keys_with_prefix("tmp:search:").await.is_empty());
    }

    #[tokio::test]
    async fn test_phase_two_discards_false_positives() {
        // Both records share the age bucket and block; only one matches exactly
        let (_, planner) = indexed(&[
            vec![
                rec("t1", "DOMAIN_a", 31, "F", "C01"),
                rec("t2", "DOMAIN_b", 35, "M", "C02"),
            ],
            vec![rec("t3", "DOMAIN_a", 38, "M", "C01")],
        ])
        .await;

        let request = SearchRequest::new("DOMAIN_a").with_age(33, 39);
        assert_eq!(planner.search(&request).await.unwrap(), vec!["t3"]);

        let request = SearchRequest::new("DOMAIN_a").with(IndexedAttribute::DiseaseCode, "C01");
        assert_eq!(planner.search(&request).await.unwrap(), vec!["t1", "t3"]);

        let request = SearchRequest::new("DOMAIN_b").with(IndexedAttribute::Gender, "F");
        assert!(planner.search(&request).await.unwrap().is_empty());

        let request = SearchRequest::new("DOMAIN_missing");
        assert!(planner.search(&request).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_domain_rejected() {
        let (_, planner) = indexed(&[]).await;
        let err = planner.search(&SearchRequest::new("  ")).await.unwrap_err();
        assert!(matches!(err, IndexerError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_owner_predicates() {
        let (_, planner) = indexed(&[
            vec![
                rec("t1", "DOMAIN_a", 34, "F", "C01").with_owner("u7", "Alice", "General"),
                rec("t2", "DOMAIN_a", 36, "F", "C01").with_owner("u9", "Dana", "General"),
            ],
            vec![rec("t3", "DOMAIN_a", 52, "M", "J45").with_owner("u7", "Bob", "St. Mary")],
        ])
        .await;

        let request = SearchRequest::new("DOMAIN_a").with(IndexedAttribute::Uid, "u7");
        assert_eq!(planner.search(&request).await.unwrap(), vec!["t1", "t3"]);

        let request = request.with_age(30, 40);
        assert_eq!(planner.search(&request).await.unwrap(), vec!["t1"]);

        let request = SearchRequest::new("DOMAIN_a").with(IndexedAttribute::Uid, "u8");
        assert!(planner.search(&request).await.unwrap().is_empty());

        let request = SearchRequest::new("DOMAIN_a")
            .with(IndexedAttribute::Hospital, "General")
            .with(IndexedAttribute::Name, "Dana");
        assert_eq!(planner.search(&request).await.unwrap(), vec!["t2"]);
    }

    #[tokio::test]
    async fn test_oversized_age_range_rejected() {
        let (store, planner) = indexed(&[vec![rec("t1", "DOMAIN_a", 34, "F", "")]]).await;

        for (start, end) in [(1, i64::MAX), (1, 1_000_000_000), (i64::MAX, 0), (MAX_SEARCH_AGE + 1, 5)] {
            let request = SearchRequest::new("DOMAIN_a").with_age(start, end);
            let err = planner.search(&request).await.unwrap_err();
            assert!(matches!(err, IndexerError::InvalidRequest(_)));
        }
        assert!(store.keys_with_prefix("tmp:search:").await.is_empty());

        let request = SearchRequest::new("DOMAIN_a").with_age(1, MAX_SEARCH_AGE);
        assert_eq!(planner.search(&request).await.unwrap(), vec!["t1"]);
    }

    #[tokio::test]
    async fn test_scratch_keys_removed_on_error() {
        let (store, planner) = indexed(&[vec![rec("t1", "DOMAIN_a", 34, "F", "")]]).await;

        // A hash under the domain key makes the final AND fail
        let mut batch = WriteBatch::new();
        batch.hset("idx:domain:DOMAIN_broken", "x", "y");
        store.apply(&batch).await.unwrap();

        let request = SearchRequest::new("DOMAIN_broken").with_age(30, 40);
        assert!(planner.search(&request).await.is_err());
        assert!(store.keys_with_prefix("tmp:search:").await.is_empty());
    }

    fn rec_strategy() -> impl Strategy<Value = Rec> {
        (
            prop::sample::select(vec!["DOMAIN_a", "DOMAIN_b"]),
            0i64..100,
            prop::sample::select(vec!["", "F", "M"]),
            prop::sample::select(vec!["", "C01", "C02", "J45"]),
            prop::sample::select(vec!["", "u1", "u2"]),
            prop::sample::select(vec!["", "Alice", "Bob"]),
            prop::sample::select(vec!["", "General", "St. Mary"]),
        )
            .prop_map(|(d, a, g, c, u, n, h)| rec("", d, a, g, c).with_owner(u, n, h))
    }

    fn request_strategy() -> impl Strategy<Value = SearchRequest> {
        (
            prop::sample::select(vec!["DOMAIN_a", "DOMAIN_b"]),
            -5i64..100,
            -5i64..100,
            prop::sample::select(vec!["", "F", "M"]),
            prop::sample::select(vec!["", "C01", "C02", "J45"]),
            prop::sample::select(vec!["", "", "u1", "u2"]),
            prop::sample::select(vec!["", "", "Alice", "Bob"]),
            prop::sample::select(vec!["", "", "General", "St. Mary"]),
        )
            .prop_map(|(d, s, e, g, c, u, n, h)| {
                SearchRequest::new(d)
                    .with_age(s, e)
                    .with(IndexedAttribute::Gender, g)
                    .with(IndexedAttribute::DiseaseCode, c)
                    .with(IndexedAttribute::Uid, u)
                    .with(IndexedAttribute::Name, n)
                    .with(IndexedAttribute::Hospital, h)
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        #[test]
        fn prop_search_equals_ground_truth(
            blocks in prop::collection::vec(prop::collection::vec(rec_strategy(), 0..5), 1..8),
            request in request_strategy(),
        ) {
            let blocks: Vec<Vec<Rec>> = blocks
                .into_iter()
                .enumerate()
                .map(|(h, recs)| {
                    recs.into_iter()
                        .enumerate()
                        .map(|(i, r)| Rec { tx_id: format!("t{}_{}", h, i), ..r })
                        .collect()
                })
                .collect();

            let runtime = tokio::runtime::Runtime::new().unwrap();
            let (found, candidates) = runtime.block_on(async {
                let (_, planner) = indexed(&blocks).await;
                let found = planner.search(&request).await.unwrap();
                let candidates = planner.candidate_blocks(&request).await.unwrap();
                (found, candidates)
            });

            let mut expected: Vec<String> = Vec::new();
            for (height, recs) in blocks.iter().enumerate() {
                for r in recs.iter().filter(|r| r.matches(&request)) {
                    // No false negatives in phase 1
                    prop_assert!(candidates.contains(&(height as u64)));
                    expected.push(r.tx_id.clone());
                }
            }

            let mut found = found;
            found.sort();
            expected.sort();
            prop_assert_eq!(found, expected);
        }
    }
}
