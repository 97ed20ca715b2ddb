//! Record extraction from ledger transactions
//!
//! A medical transaction carries its record in one of three shapes, tried in
//! this order:
//!
//! 1. an envelope parameter (`envelopJsonStr`, or `envelop` holding a JSON
//!    object) with every record field,
//! 2. a `medical_data` or `metadata` parameter holding `{txId, metadata}`,
//! 3. individually named flat parameters.
//!
//! Every shape must yield a `DOMAIN_`-prefixed domain identifier.

use serde::Deserialize;
use thiserror::Error;

use medchain_index_core::models::{parse_age, MedicalRecord, RecordFields, Transaction};

use crate::error::IndexerError;

/// Structured record parameter names
const RECORD_PARAMS: [&str; 2] = ["medical_data", "metadata"];

/// Why a transaction was not turned into a record
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    /// The transaction carries no parameters
    #[error("transaction {0} has no parameters")]
    NoParameters(String),

    /// The envelope parameter is not valid record JSON
    #[error("failed to parse envelope of transaction {tx_id}: {reason}")]
    MalformedEnvelope {
        /// Transaction identifier
        tx_id: String,
        /// Decoder message
        reason: String,
    },

    /// The structured record parameter is not valid record JSON
    #[error("failed to parse record parameter of transaction {tx_id}: {reason}")]
    MalformedRecord {
        /// Transaction identifier
        tx_id: String,
        /// Decoder message
        reason: String,
    },

    /// No shape produced a domain identifier
    #[error("no medical data found in transaction {0}")]
    NoRecord(String),

    /// The record has an empty or out-of-scope domain identifier
    #[error("{0}")]
    OutOfScope(String),
}

impl From<ExtractionError> for IndexerError {
    fn from(err: ExtractionError) -> Self {
        IndexerError::Extraction(err.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct StructuredRecord {
    #[serde(rename = "txId", default)]
    tx_id: String,

    #[serde(default)]
    metadata: RecordFields,
}

fn validated(record: MedicalRecord) -> Result<MedicalRecord, ExtractionError> {
    record
        .validate()
        .map_err(|e| ExtractionError::OutOfScope(e.to_string()))?;
    Ok(record)
}

fn envelope_param(tx: &Transaction) -> Option<&str> {
    tx.parameters.iter().find_map(|p| match p.key.as_str() {
        "envelopJsonStr" => Some(p.value.as_str()),
        // A flat record also uses `envelop` for the opaque key envelope
        "envelop" if p.value.trim_start().starts_with('{') => Some(p.value.as_str()),
        _ => None,
    })
}

fn from_envelope(tx: &Transaction, text: &str) -> Result<MedicalRecord, ExtractionError> {
    let fields: RecordFields = serde_json::from_str(text).map_err(|e| ExtractionError::MalformedEnvelope {
        tx_id: tx.tx_id.clone(),
        reason: e.to_string(),
    })?;
    validated(MedicalRecord::from_fields(tx.tx_id.clone(), fields))
}

fn from_structured(tx: &Transaction, text: &str) -> Result<MedicalRecord, ExtractionError> {
    let record: StructuredRecord = serde_json::from_str(text).map_err(|e| ExtractionError::MalformedRecord {
        tx_id: tx.tx_id.clone(),
        reason: e.to_string(),
    })?;
    let tx_id = if record.tx_id.is_empty() {
        tx.tx_id.clone()
    } else {
        record.tx_id
    };
    validated(MedicalRecord::from_fields(tx_id, record.metadata))
}

fn from_flat(tx: &Transaction) -> Result<MedicalRecord, ExtractionError> {
    let mut fields = RecordFields::default();
    for param in &tx.parameters {
        let value = param.value.clone();
        match param.key.as_str() {
            "domainID" => fields.domain_id = value,
            // Unparsable ages leave the field at zero
            "age" => fields.age = parse_age(&value).unwrap_or(0),
            "diseaseCode" => fields.disease_code = value,
            "gender" => fields.gender = value,
            "name" => fields.name = value,
            "uId" => fields.uid = value,
            "pos" => fields.pos = value,
            "envelop" => fields.envelope = value,
            "hospital" => fields.hospital = value,
            "department" => fields.department = value,
            "timeStamp" => fields.timestamp_raw = value,
            _ => {}
        }
    }

    if fields.domain_id.is_empty() {
        return Err(ExtractionError::NoRecord(tx.tx_id.clone()));
    }
    validated(MedicalRecord::from_fields(tx.tx_id.clone(), fields))
}

/// Extract the medical record carried by a transaction
pub fn extract_record(tx: &Transaction) -> Result<MedicalRecord, ExtractionError> {
    if tx.is_empty() {
        return Err(ExtractionError::NoParameters(tx.tx_id.clone()));
    }

    if let Some(text) = envelope_param(tx) {
        return from_envelope(tx, text);
    }
    if let Some(text) = tx.param_any(&RECORD_PARAMS) {
        return from_structured(tx, text);
    }
    from_flat(tx)
}

/// Whether a transaction carries an in-scope medical record
pub fn is_medical_transaction(tx: &Transaction) -> bool {
    extract_record(tx).is_ok()
}
