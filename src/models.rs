// =============================================================================
// models.rs — THE FINE PRINT, TYPED
// =============================================================================
//
// Read-only snapshots of what the ToS;DR catalog tells us about services,
// cases and points. Nothing here owns a socket or a file handle, and nothing
// is mutated after it has been parsed.
//
// Two wire quirks are absorbed here so nobody downstream has to care:
//
// 1. Timestamps arrive either as a plain string or as an object
//    `{ timezone, pgsql, unix }`. Both become a `DateTime<Utc>`, and in the
//    object form `pgsql` wins over `unix` whenever both are present.
// 2. Ratings arrive as a string, as `{ "human": "Grade B", ... }`, or as
//    null. All three become `Option<String>`.
//
// The created/updated pair is one embedded `Timestamps` struct, flattened
// into every record that carries it.
// =============================================================================

use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ClientError;
use crate::html_table::Row;

/// Column headers of the edit site's case table, mapped onto CasePoint fields.
pub const SERVICE_COLUMN: &str = "Service";
pub const TITLE_COLUMN: &str = "Title";
pub const STATUS_COLUMN: &str = "Status";

/// Number of records per catalog page. Fixed upstream, never computed.
pub const PAGE_SIZE: usize = 100;

// =============================================================================
// Timestamps
// =============================================================================

/// Tracking timestamps shared by every record that has a lifecycle upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamps {
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireTimestamp {
    Text(String),
    Unix(i64),
    Object {
        #[serde(default)]
        pgsql: Option<String>,
        #[serde(default)]
        unix: Option<i64>,
    },
}

/// Formats accepted after RFC 3339. `%#z` takes `+00`, `+0000` and `+00:00`,
/// which covers what Postgres hands back.
const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f%#z",
    "%Y-%m-%dT%H:%M:%S%.f%#z",
    "%Y-%m-%d %H:%M:%S%#z",
];

/// Parse a timezone-aware timestamp string into UTC.
///
/// Strings without an offset are rejected: a naive timestamp can't be pinned
/// to an instant, and guessing would silently shift records by hours.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in TIMESTAMP_FORMATS {
        if let Ok(dt) = DateTime::<FixedOffset>::parse_from_str(raw, format) {
            return Ok(dt.with_timezone(&Utc));
        }
    }
    Err(format!("not a timezone-aware timestamp: {raw:?}"))
}

fn unix_timestamp(secs: i64) -> Result<DateTime<Utc>, String> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| format!("unix timestamp out of range: {secs}"))
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let parsed = match WireTimestamp::deserialize(deserializer)? {
        WireTimestamp::Text(raw) => parse_timestamp(&raw),
        WireTimestamp::Unix(secs) => unix_timestamp(secs),
        WireTimestamp::Object {
            pgsql: Some(raw), ..
        } => parse_timestamp(&raw),
        WireTimestamp::Object {
            pgsql: None,
            unix: Some(secs),
        } => unix_timestamp(secs),
        WireTimestamp::Object {
            pgsql: None,
            unix: None,
        } => Err("timestamp object has neither pgsql nor unix".to_string()),
    };
    parsed.map_err(serde::de::Error::custom)
}

// =============================================================================
// Ratings
// =============================================================================

#[derive(Deserialize)]
#[serde(untagged)]
enum WireRating {
    Text(String),
    Object {
        #[serde(default)]
        human: Option<String>,
    },
}

fn deserialize_rating<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<WireRating>::deserialize(deserializer)? {
        Some(WireRating::Text(text)) => Some(text),
        Some(WireRating::Object { human }) => human,
        None => None,
    })
}

// =============================================================================
// Records
// =============================================================================

/// A service as it appears in the paginated catalog listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceMetadata {
    pub id: u64,
    pub name: String,
    #[serde(default, deserialize_with = "deserialize_rating")]
    pub rating: Option<String>,
    #[serde(flatten)]
    pub timestamps: Timestamps,
}

/// A document attached to a service (privacy policy, terms, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: u64,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub xpath: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(flatten)]
    pub timestamps: Timestamps,
}

/// One reviewed statement about a service. Embedded in its Service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub id: u64,
    pub title: String,
    pub status: String,
    pub analysis: String,
    #[serde(default)]
    pub case_id: Option<u64>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub document_id: Option<u64>,
    #[serde(flatten)]
    pub timestamps: Timestamps,
}

/// Full service record, points included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: u64,
    pub name: String,
    #[serde(default, deserialize_with = "deserialize_rating")]
    pub rating: Option<String>,
    pub points: Vec<Point>,
    pub urls: Vec<String>,
    #[serde(default)]
    pub documents: Option<Vec<Document>>,
    #[serde(flatten)]
    pub timestamps: Timestamps,
}

/// A case: the reusable verdict that points get filed under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Case {
    pub id: u64,
    pub title: String,
    pub description: String,
    #[serde(default, alias = "classification", deserialize_with = "deserialize_rating")]
    pub rating: Option<String>,
    #[serde(flatten)]
    pub timestamps: Timestamps,
}

/// A point scraped from a case page on the edit site. No numeric id exists
/// for these; they're identified by the case they were found under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CasePoint {
    pub case_id: u64,
    pub service_name: String,
    pub quote: String,
    pub status: String,
}

impl CasePoint {
    /// Build a CasePoint from one extracted table row.
    ///
    /// Missing columns are a validation error. Cell text is trimmed here;
    /// the extractor hands back whatever whitespace the HTML carried.
    pub fn from_row(case_id: u64, row: &Row) -> Result<Self, ClientError> {
        let cell = |column: &str| -> Result<String, ClientError> {
            row.get(column)
                .map(|text| text.trim().to_string())
                .ok_or_else(|| {
                    ClientError::Validation(format!(
                        "case {case_id}: row is missing the {column:?} column"
                    ))
                })
        };

        Ok(Self {
            case_id,
            service_name: cell(SERVICE_COLUMN)?,
            quote: cell(TITLE_COLUMN)?,
            status: cell(STATUS_COLUMN)?,
        })
    }
}

// =============================================================================
// Wire envelopes
// =============================================================================

/// Pagination metadata carried under `parameters._page`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    /// Total number of records across all pages.
    pub total: u64,
    /// 1-based index of this page.
    pub current: u32,
    pub start: u32,
    /// Index of the last page.
    pub end: u32,
}

impl PageInfo {
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.end < 1 {
            return Err(ClientError::Validation(format!(
                "page info has end = {}, expected at least 1",
                self.end
            )));
        }
        if self.current > self.end {
            return Err(ClientError::Validation(format!(
                "page info has current = {} past end = {}",
                self.current, self.end
            )));
        }
        Ok(())
    }
}

/// `{ "parameters": { ... } }`, the single-resource envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    pub parameters: T,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PageParameters<T> {
    #[serde(rename = "_page")]
    pub page_info: PageInfo,
    /// The listing key differs per resource; the alias table covers each.
    #[serde(alias = "services", alias = "cases")]
    pub items: Vec<T>,
}

/// `{ "parameters": { "_page": {...}, "services" | "cases": [...] } }`
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    pub parameters: PageParameters<T>,
}

pub type ServicePage = Page<ServiceMetadata>;
pub type CasePage = Page<Case>;

impl<T> Page<T> {
    pub fn page_info(&self) -> &PageInfo {
        &self.parameters.page_info
    }

    pub fn items(&self) -> &[T] {
        &self.parameters.items
    }

    pub fn into_items(self) -> Vec<T> {
        self.parameters.items
    }

    pub fn total_resource_count(&self) -> u64 {
        self.parameters.page_info.total
    }

    pub fn total_page_count(&self) -> u32 {
        self.parameters.page_info.end
    }

    pub fn current_page(&self) -> u32 {
        self.parameters.page_info.current
    }
}

/// Decode a single-resource envelope into its record.
pub fn parse_single<T: DeserializeOwned>(body: &str) -> Result<T, ClientError> {
    let envelope: Envelope<T> = serde_json::from_str(body)?;
    Ok(envelope.parameters)
}

/// Decode and validate a page envelope.
pub fn parse_page<T: DeserializeOwned>(body: &str) -> Result<Page<T>, ClientError> {
    let page: Page<T> = serde_json::from_str(body)?;
    page.page_info().validate()?;
    Ok(page)
}
