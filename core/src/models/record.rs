//! Medical record representation
//!
//! A medical record is the normalized view of one ledger transaction that
//! carries domain-scoped patient metadata.

use serde::{Deserialize, Serialize};

use super::domains;
use crate::error::{CoreError, Result};

/// Record fields as they appear in the on-ledger JSON payloads
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordFields {
    /// Uploader identifier
    #[serde(rename = "uId")]
    pub uid: String,

    /// Raw timestamp string as written on the ledger
    #[serde(rename = "timeStamp")]
    pub timestamp_raw: String,

    /// Blob locator of the encrypted payload
    pub pos: String,

    /// Opaque key envelope
    #[serde(rename = "envelop")]
    pub envelope: String,

    /// Patient name
    pub name: String,

    /// Patient age; accepts a number or a numeric string
    #[serde(deserialize_with = "lenient_age")]
    pub age: i64,

    /// Patient gender
    pub gender: String,

    /// Hospital name
    pub hospital: String,

    /// Department name
    pub department: String,

    /// Disease code
    #[serde(rename = "diseaseCode")]
    pub disease_code: String,

    /// Domain identifier, always `DOMAIN_`-prefixed when in scope
    #[serde(rename = "domainID")]
    pub domain_id: String,
}

fn lenient_age<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawAge {
        Int(i64),
        Text(String),
        Null(Option<()>),
    }

    match RawAge::deserialize(deserializer)? {
        RawAge::Int(age) => Ok(age),
        RawAge::Text(text) => parse_age(&text).map_err(serde::de::Error::custom),
        RawAge::Null(_) => Ok(0),
    }
}

/// Parse an age written as text
pub fn parse_age(text: &str) -> std::result::Result<i64, std::num::ParseIntError> {
    text.trim().parse()
}

/// A medical record extracted from one committed transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedicalRecord {
    /// Transaction identifier
    pub tx_id: String,

    /// Domain identifier
    pub domain_id: String,

    /// Uploader identifier
    pub uid: String,

    /// Raw timestamp string
    pub timestamp_raw: String,

    /// Blob locator
    pub pos: String,

    /// Opaque key envelope
    pub envelope: String,

    /// Patient name
    pub name: String,

    /// Patient age
    pub age: i64,

    /// Patient gender
    pub gender: String,

    /// Hospital name
    pub hospital: String,

    /// Department name
    pub department: String,

    /// Disease code
    pub disease_code: String,
}

impl MedicalRecord {
    /// Create a record from its transaction id and payload fields
    pub fn from_fields(tx_id: impl Into<String>, fields: RecordFields) -> Self {
        MedicalRecord {
            tx_id: tx_id.into(),
            domain_id: fields.domain_id,
            uid: fields.uid,
            timestamp_raw: fields.timestamp_raw,
            pos: fields.pos,
            envelope: fields.envelope,
            name: fields.name,
            age: fields.age,
            gender: fields.gender,
            hospital: fields.hospital,
            department: fields.department,
            disease_code: fields.disease_code,
        }
    }

    /// Check the record invariants: a non-empty, correctly prefixed domain
    pub fn validate(&self) -> Result<()> {
        if self.domain_id.is_empty() {
            return Err(CoreError::InvalidRecord(format!(
                "domain identifier is empty in tx {}",
                self.tx_id
            )));
        }
        if !domains::is_in_scope(&self.domain_id) {
            return Err(CoreError::InvalidRecord(format!(
                "domain identifier {} of tx {} lacks the {} prefix",
                self.domain_id,
                self.tx_id,
                domains::DOMAIN_PREFIX
            )));
        }
        Ok(())
    }

    /// Value of a string attribute; `Age` yields its decimal rendering
    pub fn attribute_value(&self, attribute: IndexedAttribute) -> String {
        match attribute {
            IndexedAttribute::Age => self.age.to_string(),
            IndexedAttribute::DiseaseCode => self.disease_code.clone(),
            IndexedAttribute::Name => self.name.clone(),
            IndexedAttribute::Gender => self.gender.clone(),
            IndexedAttribute::Hospital => self.hospital.clone(),
            IndexedAttribute::Department => self.department.clone(),
            IndexedAttribute::Uid => self.uid.clone(),
            IndexedAttribute::DomainId => self.domain_id.clone(),
        }
    }
}

/// Attributes covered by the bucket bitmaps and the block-local fine index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IndexedAttribute {
    /// Numeric age, range-bucketed
    Age,
    /// Disease code
    DiseaseCode,
    /// Patient name
    Name,
    /// Patient gender
    Gender,
    /// Hospital name
    Hospital,
    /// Department name
    Department,
    /// Uploader identifier
    Uid,
    /// Domain identifier
    DomainId,
}

/// String attributes, hash-bucketed and indexed by exact value
pub const STRING_ATTRIBUTES: [IndexedAttribute; 7] = [
    IndexedAttribute::DiseaseCode,
    IndexedAttribute::Name,
    IndexedAttribute::Gender,
    IndexedAttribute::Hospital,
    IndexedAttribute::Department,
    IndexedAttribute::Uid,
    IndexedAttribute::DomainId,
];

impl IndexedAttribute {
    /// Name used inside persisted index keys
    pub fn key_name(&self) -> &'static str {
        match self {
            IndexedAttribute::Age => "age",
            IndexedAttribute::DiseaseCode => "disease",
            IndexedAttribute::Name => "name",
            IndexedAttribute::Gender => "gender",
            IndexedAttribute::Hospital => "hospital",
            IndexedAttribute::Department => "department",
            IndexedAttribute::Uid => "uid",
            IndexedAttribute::DomainId => "domainID",
        }
    }

    /// Whether the attribute is bucketed by numeric range
    pub fn is_numeric(&self) -> bool {
        matches!(self, IndexedAttribute::Age)
    }
}

impl std::fmt::Display for IndexedAttribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key_name())
    }
}
