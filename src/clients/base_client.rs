// =============================================================================
// clients/base_client.rs — THE ENGINE ROOM
// =============================================================================
//
// Every upstream client is a thin layer over this one. It owns:
//
// - the base URL and default timeout that operations are merged against
// - one RateLimiter, shared by every request the client ever sends
// - the backoff policy for HTTP 429
// - a set of metrics counters
//
// and it provides the three shapes of remote call we need:
//
// 1. request / request_blocking: one operation, one response. Errors go
//    straight back to the caller. No limiter, no retry.
// 2. get_all: fetch page 1 up front to learn how many pages exist, then fan
//    pages 2..=N out concurrently and stitch everything back in page order.
//    Only a page-1 failure is fatal; later pages are best-effort.
// 3. fan_out / get_many: one request per key, all concurrent, all queueing on
//    the same limiter. Failed keys are logged and left out.
//
// Concurrency here is cooperative: a batch is a single join_all over many
// futures on the calling task. The network is the only thing anyone waits
// on. Results come back in request order no matter who finishes first,
// because join_all indexes by position, not completion.
// =============================================================================

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use futures::future::join_all;
use serde::de::DeserializeOwned;
use tracing::{debug, error, info};
use url::Url;
use uuid::Uuid;

use crate::config::Config;
use crate::error::ClientError;
use crate::metrics::ClientMetrics;
use crate::models::{parse_page, parse_single};
use crate::operation::{Operation, RequestOverrides, RequestParams};
use crate::rate_limiter::RateLimiter;
use crate::retry::{retry_rate_limited, BackoffPolicy};

pub struct BaseClient {
    /// Human-readable upstream name for logs ("tosdr-api", "edit-site").
    name: &'static str,
    base_url: Url,
    default_timeout: Duration,
    user_agent: String,
    limiter: RateLimiter,
    backoff: BackoffPolicy,
    metrics: ClientMetrics,
}

impl BaseClient {
    pub fn new(
        name: &'static str,
        base_url: &str,
        rate_window: Duration,
        config: &Config,
    ) -> Result<Self, ClientError> {
        let base_url = Url::parse(base_url)?;
        info!(
            name = name,
            base_url = %base_url,
            timeout_secs = config.request_timeout.as_secs_f64(),
            "Client initialized"
        );

        Ok(Self {
            name,
            base_url,
            default_timeout: config.request_timeout,
            user_agent: config.user_agent.clone(),
            limiter: RateLimiter::new(name, rate_window),
            backoff: BackoffPolicy::from_config(config),
            metrics: ClientMetrics::new(),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn metrics(&self) -> &ClientMetrics {
        &self.metrics
    }

    /// Merge client defaults, the operation and per-call overrides.
    pub fn build_request_params(
        &self,
        operation: &Operation,
        overrides: RequestOverrides,
    ) -> Result<RequestParams, ClientError> {
        RequestParams::build(&self.base_url, self.default_timeout, operation, overrides)
    }

    /// A fresh async connection pool. Batches open one and drop it when done.
    pub fn session(&self) -> Result<reqwest::Client, ClientError> {
        Ok(reqwest::Client::builder()
            .user_agent(self.user_agent.as_str())
            .build()?)
    }

    /// Send one operation over the async transport.
    ///
    /// Without a session an ad-hoc connection is used; with one, the caller's
    /// pool and cookies are reused. With `raise_for_status` set (the default)
    /// any 4xx/5xx becomes `ClientError::HttpStatus`; otherwise the error
    /// response is handed back for the caller to inspect.
    pub async fn request(
        &self,
        operation: &Operation,
        session: Option<&reqwest::Client>,
        overrides: RequestOverrides,
    ) -> Result<reqwest::Response, ClientError> {
        let params = self.build_request_params(operation, overrides)?;
        let ad_hoc;
        let session = match session {
            Some(session) => session,
            None => {
                ad_hoc = self.session()?;
                &ad_hoc
            }
        };

        debug!(name = self.name, method = %params.method, url = %params.url, "Sending request");
        self.metrics.increment_requests();
        let response = params.to_async(session).send().await?;

        let status = response.status();
        if params.raise_for_status && (status.is_client_error() || status.is_server_error()) {
            return Err(ClientError::HttpStatus {
                status: status.as_u16(),
                url: response.url().to_string(),
            });
        }
        Ok(response)
    }

    /// Send one operation over the blocking transport. Same merge rules and
    /// status handling as `request`. Must not be called from inside an async
    /// runtime thread; use `spawn_blocking` there.
    pub fn request_blocking(
        &self,
        operation: &Operation,
        session: Option<&reqwest::blocking::Client>,
        overrides: RequestOverrides,
    ) -> Result<reqwest::blocking::Response, ClientError> {
        let params = self.build_request_params(operation, overrides)?;
        let ad_hoc;
        let session = match session {
            Some(session) => session,
            None => {
                ad_hoc = reqwest::blocking::Client::builder()
                    .user_agent(self.user_agent.as_str())
                    .build()?;
                &ad_hoc
            }
        };

        debug!(name = self.name, method = %params.method, url = %params.url, "Sending blocking request");
        self.metrics.increment_requests();
        let response = params.to_blocking(session).send()?;

        let status = response.status();
        if params.raise_for_status && (status.is_client_error() || status.is_server_error()) {
            return Err(ClientError::HttpStatus {
                status: status.as_u16(),
                url: response.url().to_string(),
            });
        }
        Ok(response)
    }

    /// Single-item fetch: wait for a permit, send once, return the body.
    /// Every error propagates; nothing is retried.
    pub async fn fetch_text(&self, operation: &Operation) -> Result<String, ClientError> {
        self.limiter.acquire().await;
        let response = self
            .request(operation, None, RequestOverrides::default())
            .await?;
        Ok(response.text().await?)
    }

    /// Batch-path fetch: every attempt waits for a permit, and a 429 is
    /// retried with backoff. Any other failure gives up at once.
    pub async fn send_limited(
        &self,
        session: &reqwest::Client,
        operation: &Operation,
        what: &str,
    ) -> Result<String, ClientError> {
        retry_rate_limited(&self.backoff, &self.metrics, what, |_attempt| async move {
            self.limiter.acquire().await;
            let response = match self
                .request(operation, Some(session), RequestOverrides::default())
                .await
            {
                Ok(response) => response,
                Err(err) => {
                    if err.is_rate_limited() {
                        self.metrics.increment_rate_limited();
                    }
                    return Err(err);
                }
            };
            Ok(response.text().await?)
        })
        .await
    }

    /// Run `fetch` once per key, concurrently, and keep what succeeded.
    ///
    /// All fetches share one connection pool (opened here, dropped on return)
    /// and this client's limiter. A failed key is logged and omitted; the
    /// batch itself only fails if the pool can't be built. Output order
    /// follows `keys`, minus the omissions.
    pub async fn fan_out<K, T, F, Fut>(
        &self,
        what: &'static str,
        keys: Vec<K>,
        fetch: F,
    ) -> Result<Vec<T>, ClientError>
    where
        K: Display + Clone,
        F: Fn(reqwest::Client, K) -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let batch_id = Uuid::new_v4();
        let session = self.session()?;

        info!(
            batch_id = %batch_id,
            name = self.name,
            what = what,
            requests = keys.len(),
            "Batch started"
        );

        let outcomes = join_all(keys.iter().cloned().map(|key| fetch(session.clone(), key))).await;

        let mut succeeded = Vec::with_capacity(outcomes.len());
        let mut failed = 0usize;
        for (key, outcome) in keys.iter().zip(outcomes) {
            match outcome {
                Ok(value) => succeeded.push(value),
                Err(err) => {
                    failed += 1;
                    self.metrics.increment_failed_items();
                    error!(
                        batch_id = %batch_id,
                        name = self.name,
                        what = what,
                        key = %key,
                        error = %err,
                        "Failed to query {} {}; leaving it out of the batch",
                        what,
                        key
                    );
                }
            }
        }

        info!(
            batch_id = %batch_id,
            name = self.name,
            what = what,
            succeeded = succeeded.len(),
            failed = failed,
            metrics = ?self.metrics.snapshot(),
            limiter = ?self.limiter.snapshot(),
            "Batch complete"
        );

        Ok(succeeded)
    }

    /// Fetch every page of a paginated listing.
    ///
    /// Page 1 is fetched on its own first; its failure is the caller's
    /// failure, since without it we don't know how many pages there are.
    /// Pages 2..=N then go out concurrently; a page that fails contributes
    /// nothing. Items come back as page 1, then pages 2..=N in index order.
    pub async fn get_all<T, F>(&self, what: &'static str, page_op: F) -> Result<Vec<T>, ClientError>
    where
        T: DeserializeOwned,
        F: Fn(u32) -> Result<Operation, ClientError>,
    {
        let first_body = self.fetch_text(&page_op(1)?).await?;
        let first = parse_page::<T>(&first_body)?;
        let total_pages = first.total_page_count();
        let mut items = first.into_items();

        info!(
            name = self.name,
            what = what,
            total_pages = total_pages,
            first_page_items = items.len(),
            "Fetched page 1"
        );

        if total_pages <= 1 {
            self.metrics.add_records_parsed(items.len());
            return Ok(items);
        }

        let page_op = &page_op;
        let remaining = self
            .fan_out(what, (2..=total_pages).collect(), |session, page| async move {
                let operation = page_op(page)?;
                let body = self
                    .send_limited(&session, &operation, &format!("{what} {page}"))
                    .await?;
                Ok::<_, ClientError>(parse_page::<T>(&body)?.into_items())
            })
            .await?;

        items.extend(remaining.into_iter().flatten());
        self.metrics.add_records_parsed(items.len());
        Ok(items)
    }

    /// Fetch many single-resource envelopes by id, best effort.
    pub async fn get_many<T, F>(
        &self,
        what: &'static str,
        ids: &[u64],
        op_for: F,
    ) -> Result<Vec<T>, ClientError>
    where
        T: DeserializeOwned,
        F: Fn(u64) -> Result<Operation, ClientError>,
    {
        let op_for = &op_for;
        let records = self
            .fan_out(what, ids.to_vec(), |session, id| async move {
                let operation = op_for(id)?;
                let body = self
                    .send_limited(&session, &operation, &format!("{what} {id}"))
                    .await?;
                parse_single::<T>(&body)
            })
            .await?;

        self.metrics.add_records_parsed(records.len());
        Ok(records)
    }
}
