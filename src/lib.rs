//! Rate-limited harvesting of ToS;DR terms-of-service summaries.
//!
//! [`TosdrClient`] pages through the public catalog API (services, cases);
//! [`EditSiteClient`] scrapes case points out of the edit site's HTML tables.
//! Both fan requests out concurrently on the calling task behind one shared
//! [`RateLimiter`] per client, retry HTTP 429 with exponential backoff, and
//! treat batch results as best-effort: a failed page or item is logged and
//! left out rather than failing the whole batch.
//!
//! Results can be persisted with [`artifact::write_ndjson_gz`].

pub mod artifact;
pub mod clients;
pub mod config;
pub mod error;
pub mod html_table;
pub mod metrics;
pub mod models;
pub mod operation;
pub mod rate_limiter;
pub mod retry;

pub use clients::{BaseClient, EditSiteClient, TosdrClient};
pub use config::Config;
pub use error::{ArtifactError, ClientError, HtmlTableError};
pub use models::{Case, CasePoint, Document, Point, Service, ServiceMetadata, Timestamps};
pub use operation::{Method, Operation, RequestOverrides};
pub use rate_limiter::RateLimiter;
