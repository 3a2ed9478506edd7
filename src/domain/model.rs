use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 來源 API 的記錄主鍵
pub type Identifier = u64;

/// Record as returned by the source detail endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord {
    pub data: Map<String, Value>,
}

impl RawRecord {
    pub fn new(data: Map<String, Value>) -> Self {
        Self { data }
    }

    pub fn id(&self) -> Option<Identifier> {
        self.data.get("id").and_then(Value::as_u64)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }
}

/// Record after `friends`/`born_at` normalization, ready for the sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransformedRecord {
    pub data: Map<String, Value>,
}

impl TransformedRecord {
    pub fn id(&self) -> Option<Identifier> {
        self.data.get("id").and_then(Value::as_u64)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }

    /// `friends` 轉換後一定是字串陣列，其他情況回傳 None
    pub fn friends(&self) -> Option<Vec<&str>> {
        self.data
            .get("friends")?
            .as_array()?
            .iter()
            .map(Value::as_str)
            .collect()
    }

    pub fn born_at(&self) -> Option<&str> {
        self.data.get("born_at").and_then(Value::as_str)
    }

    pub fn into_raw(self) -> RawRecord {
        RawRecord { data: self.data }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordStub {
    pub id: Option<Identifier>,
}

/// One page of the listing endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ListingPage {
    pub items: Vec<RecordStub>,
    #[serde(default)]
    pub total_pages: Option<u64>,
}

impl ListingPage {
    pub fn identifiers(&self) -> impl Iterator<Item = Identifier> + '_ {
        self.items.iter().filter_map(|item| item.id)
    }
}

/// 寫入 RecordStore 的原始與轉換後資料
#[derive(Debug, Clone, Serialize)]
pub struct PersistablePair {
    pub raw: RawRecord,
    pub transformed: TransformedRecord,
}

impl PersistablePair {
    pub fn id(&self) -> Option<Identifier> {
        self.raw.id()
    }
}

/// Audit event emitted once per record-level failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorRecord {
    pub endpoint: String,
    pub error_kind: String,
    pub message: String,
    pub http_status: Option<u16>,
    pub retry_attempt: u32,
    pub occurred_at: DateTime<Utc>,
}
