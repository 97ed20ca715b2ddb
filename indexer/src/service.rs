//! Index service
//!
//! The read-path entry point handed to request handlers. It is constructed
//! once at startup and shared by reference.

use log::{debug, info};
use std::collections::HashMap;
use std::sync::Arc;

use medchain_index_core::models::{Condition, QueryItem};
use medchain_index_core::query::{self, QueryResult, SINGLE_SUCCESS_MESSAGE};
use medchain_index_core::MedicalRecord;

use crate::builder::IndexBuilder;
use crate::config::ListenerConfig;
use crate::error::{IndexerError, Result};
use crate::extractor::extract_record;
use crate::keys::KeyLayout;
use crate::ledger::LedgerClient;
use crate::listener::BlockListener;
use crate::payload::{BlobStore, PayloadDecryptor};
use crate::planner::{SearchPlanner, SearchRequest};
use crate::store::IndexStore;

/// Search, locator lookup and tabular queries over one index
pub struct IndexService {
    store: Arc<dyn IndexStore>,
    keys: KeyLayout,
    planner: SearchPlanner,
    ledger: Arc<dyn LedgerClient>,
    blobs: Arc<dyn BlobStore>,
    decryptor: Arc<dyn PayloadDecryptor>,
}

impl IndexService {
    /// Create a new service
    pub fn new(
        store: Arc<dyn IndexStore>,
        keys: KeyLayout,
        ledger: Arc<dyn LedgerClient>,
        blobs: Arc<dyn BlobStore>,
        decryptor: Arc<dyn PayloadDecryptor>,
    ) -> Self {
        Self {
            planner: SearchPlanner::new(store.clone(), keys.clone()),
            store,
            keys,
            ledger,
            blobs,
            decryptor,
        }
    }

    /// Index builder writing to this service's store
    pub fn builder(&self) -> IndexBuilder {
        IndexBuilder::new(self.store.clone(), self.keys.clone())
    }

    /// Block listener feeding this service's index
    pub fn block_listener(&self, config: ListenerConfig) -> BlockListener {
        BlockListener::new(self.ledger.clone(), Arc::new(self.builder()), config)
    }

    /// Transaction ids matching a structured search
    pub async fn search(&self, request: &SearchRequest) -> Result<Vec<String>> {
        self.planner.search(request).await
    }

    /// Re-extract the record of a committed transaction
    pub async fn record_for_tx(&self, tx_id: &str) -> Result<MedicalRecord> {
        let tx = self
            .ledger
            .get_transaction(tx_id)
            .await?
            .ok_or_else(|| IndexerError::Ledger(format!("transaction {} not found", tx_id)))?;
        Ok(extract_record(&tx)?)
    }

    /// Blob locator of the payload a transaction points to
    pub async fn pos_for_tx(&self, tx_id: &str) -> Result<String> {
        let record = self.record_for_tx(tx_id).await?;
        if record.pos.is_empty() {
            return Err(IndexerError::Extraction(format!("transaction {} has no blob locator", tx_id)));
        }
        Ok(record.pos)
    }

    /// Run a tabular query over already decrypted payloads
    pub fn run_query(&self, item: &QueryItem, payloads: &HashMap<String, String>) -> QueryResult {
        query::run(item, payloads)
    }

    /// Run a tabular query given as JSON text
    pub fn run_query_json(&self, text: &str, payloads: &HashMap<String, String>) -> QueryResult {
        query::run_query_json(text, payloads)
    }

    /// Search, fetch and decrypt the matching payloads, then filter their rows
    /// with the same predicates.
    pub async fn query_by_fields(&self, request: &SearchRequest) -> Result<QueryResult> {
        let request = request.normalized();
        let tx_ids = self.search(&request).await?;

        // Locator and envelope per distinct payload, in first-seen order
        let mut payload_refs: Vec<(String, String)> = Vec::new();
        for tx_id in &tx_ids {
            let record = self.record_for_tx(tx_id).await?;
            if record.pos.is_empty() {
                return Err(IndexerError::Extraction(format!("transaction {} has no blob locator", tx_id)));
            }
            if !payload_refs.iter().any(|(pos, _)| *pos == record.pos) {
                payload_refs.push((record.pos, record.envelope));
            }
        }

        if payload_refs.is_empty() {
            info!("No payloads match the search in {}", request.domain_id);
            return Ok(QueryResult::success(Vec::new(), SINGLE_SUCCESS_MESSAGE));
        }

        let mut payloads = HashMap::with_capacity(payload_refs.len());
        for (pos, envelope) in &payload_refs {
            let ciphertext = self.blobs.fetch(pos).await?;
            let text = self.decryptor.decrypt(&ciphertext, envelope).await?;
            debug!("Decrypted payload {} ({} bytes)", pos, text.len());
            payloads.insert(pos.clone(), text);
        }

        let positions: Vec<String> = payload_refs.into_iter().map(|(pos, _)| pos).collect();
        let item = fields_query(&request, positions);
        Ok(query::run(&item, &payloads))
    }
}

/// Single-dataset query over `positions` carrying the request's predicates
fn fields_query(request: &SearchRequest, positions: Vec<String>) -> QueryItem {
    let pos = positions.first().cloned().unwrap_or_default();
    let condition = |field: &str, compare: &str, val: &str, kind: &str| Condition::new(field, &pos, compare, val, kind);

    let age_start = request.age_start.to_string();
    let age_end = request.age_end.to_string();
    let group = vec![
        condition("name", "eq", &request.name, "string"),
        condition("age", "ge", &age_start, "int"),
        condition("age", "le", &age_end, "int"),
        condition("gender", "eq", &request.gender, "string"),
        condition("hospital", "eq", &request.hospital, "string"),
        condition("department", "eq", &request.department, "string"),
        condition("diseaseCode", "eq", &request.disease_code, "string"),
    ];

    QueryItem {
        query_concat_type: "single".to_string(),
        query_conditions: vec![group],
        return_field: vec![format!("{}_*", pos)],
        file_pos: vec![positions],
        joint_conditions: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MockLedgerClient;
    use crate::payload::{MemoryBlobStore, PlaintextDecryptor};
    use crate::store::MemoryStore;
    use medchain_index_core::models::{Block, Transaction, TxParameter};

    const TABLE_A: &str = "name age gender hospital department diseaseCode\n\
                           Alice 34 F General Cardiology I10\n\
                           Bob 61 M General Cardiology I10";
    const TABLE_B: &str = "name age gender hospital department diseaseCode\n\
                           Carol 38 F General Oncology C50";

    fn tx(tx_id: &str, age: &str, gender: &str, pos: &str) -> Transaction {
        Transaction::new(
            tx_id,
            vec![
                TxParameter::new("domainID", "DOMAIN_clinicA"),
                TxParameter::new("age", age),
                TxParameter::new("gender", gender),
                TxParameter::new("pos", pos),
                TxParameter::new("envelop", "sealed-key"),
            ],
        )
    }

    fn ledger_with(transactions: Vec<Transaction>) -> MockLedgerClient {
        let by_id: HashMap<String, Transaction> = transactions.into_iter().map(|t| (t.tx_id.clone(), t)).collect();
        let mut ledger = MockLedgerClient::new();
        ledger
            .expect_get_transaction()
            .returning(move |tx_id| Ok(by_id.get(tx_id).cloned()));
        ledger
    }

    async fn service() -> IndexService {
        let transactions = vec![
            tx("tx1", "34", "F", "QmA"),
            tx("tx2", "61", "M", "QmA"),
            tx("tx3", "38", "F", "QmB"),
        ];
        let block = Block::new(4, transactions.clone());

        let blobs = MemoryBlobStore::new();
        blobs.insert("QmA", TABLE_A).await;
        blobs.insert("QmB", TABLE_B).await;

        let service = IndexService::new(
            Arc::new(MemoryStore::new()),
            KeyLayout::default(),
            Arc::new(ledger_with(transactions)),
            Arc::new(blobs),
            Arc::new(PlaintextDecryptor),
        );
        service.builder().index_block(&block).await.unwrap();
        service
    }

    #[tokio::test]
    async fn test_search_and_pos_for_tx() {
        let service = service().await;

        let request = SearchRequest::for_domain_name("clinicA").with_age(30, 40);
        let mut tx_ids = service.search(&request).await.unwrap();
        tx_ids.sort();
        assert_eq!(tx_ids, vec!["tx1".to_string(), "tx3".to_string()]);

        assert_eq!(service.pos_for_tx("tx3").await.unwrap(), "QmB");
        let err = service.pos_for_tx("tx404").await.unwrap_err();
        assert!(matches!(err, IndexerError::Ledger(_)));
    }

    #[tokio::test]
    async fn test_query_by_fields() {
        let service = service().await;

        let request = SearchRequest::for_domain_name("clinicA").with_age(30, 40);
        let result = service.query_by_fields(&request).await.unwrap();

        // Bob shares a payload with Alice but falls outside the age range
        assert_eq!(result.counts, 2);
        let names: Vec<&str> = result.data.iter().map(|row| row["name"].as_str()).collect();
        assert_eq!(names, vec!["Alice", "Carol"]);
        assert_eq!(result.data[0]["diseaseCode"], "I10");
        assert_eq!(result.message, SINGLE_SUCCESS_MESSAGE);
    }

    #[tokio::test]
    async fn test_query_by_fields_without_matches() {
        let service = service().await;

        let request = SearchRequest::for_domain_name("clinicB");
        let result = service.query_by_fields(&request).await.unwrap();
        assert_eq!(result.counts, 0);
        assert!(result.data.is_empty());
    }

    #[tokio::test]
    async fn test_query_by_fields_missing_blob() {
        let transactions = vec![tx("tx1", "34", "F", "QmGone")];
        let service = IndexService::new(
            Arc::new(MemoryStore::new()),
            KeyLayout::default(),
            Arc::new(ledger_with(transactions.clone())),
            Arc::new(MemoryBlobStore::new()),
            Arc::new(PlaintextDecryptor),
        );
        service.builder().index_block(&Block::new(0, transactions)).await.unwrap();

        let err = service
            .query_by_fields(&SearchRequest::for_domain_name("clinicA"))
            .await
            .unwrap_err();
        assert!(matches!(err, IndexerError::Payload(_)));
    }

    #[test]
    fn test_fields_query_shape() {
        let request = SearchRequest::for_domain_name("clinicA")
            .with_age(30, 0)
            .normalized();
        let item = fields_query(&request, vec!["QmA".to_string(), "QmB".to_string()]);

        assert_eq!(item.query_concat_type, "single");
        assert_eq!(item.file_pos, vec![vec!["QmA".to_string(), "QmB".to_string()]]);
        assert_eq!(item.return_field, vec!["QmA_*".to_string()]);

        let group = &item.query_conditions[0];
        assert_eq!(group.len(), 7);
        assert!(group.iter().all(|c| c.pos == "QmA"));
        // Only a start bound means an exact age
        assert_eq!(group[1].val, "30");
        assert_eq!(group[2].val, "30");
        assert_eq!(group[1].kind, "int");
    }

    #[test]
    fn test_run_query_json_error_envelope() {
        let service = IndexService::new(
            Arc::new(MemoryStore::new()),
            KeyLayout::default(),
            Arc::new(MockLedgerClient::new()),
            Arc::new(MemoryBlobStore::new()),
            Arc::new(PlaintextDecryptor),
        );
        let result = service.run_query_json("{not json", &HashMap::new());
        assert_eq!(result.counts, -1);
        assert!(result.is_error());
    }
}
