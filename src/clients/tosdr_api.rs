// =============================================================================
// clients/tosdr_api.rs — THE CATALOG
// =============================================================================
//
// api.tosdr.org serves two resources, each two ways:
//
//   GET /service/v1?service={id}   one full Service, points and all
//   GET /service/v1?page={n}       a page of ServiceMetadata (100 per page)
//   GET /case/v1?case={id}         one Case
//   GET /case/v1?page={n}          a page of Cases
//
// Everything comes wrapped in `{ "parameters": ... }`. Paged responses add a
// `_page` block telling us how many pages there are; BaseClient::get_all
// takes it from there.
// =============================================================================

use crate::clients::base_client::BaseClient;
use crate::config::Config;
use crate::error::ClientError;
use crate::models::{parse_page, parse_single, Case, CasePage, Service, ServiceMetadata, ServicePage};
use crate::operation::Operation;

const SERVICE_PATH: &str = "/service/v1";
const CASE_PATH: &str = "/case/v1";

pub struct TosdrClient {
    base: BaseClient,
}

impl TosdrClient {
    pub fn new(config: &Config) -> Result<Self, ClientError> {
        Ok(Self {
            base: BaseClient::new(
                "tosdr-api",
                &config.api_base_url,
                config.api_rate_window,
                config,
            )?,
        })
    }

    pub fn base(&self) -> &BaseClient {
        &self.base
    }

    pub fn service_op(id: u64) -> Result<Operation, ClientError> {
        Ok(Operation::get(SERVICE_PATH)?.with_param("service", id))
    }

    pub fn service_page_op(page: u32) -> Result<Operation, ClientError> {
        Ok(Operation::get(SERVICE_PATH)?.with_param("page", page))
    }

    pub fn case_op(id: u64) -> Result<Operation, ClientError> {
        Ok(Operation::get(CASE_PATH)?.with_param("case", id))
    }

    pub fn case_page_op(page: u32) -> Result<Operation, ClientError> {
        Ok(Operation::get(CASE_PATH)?.with_param("page", page))
    }

    // =========================================================================
    // Services
    // =========================================================================

    pub async fn get_service(&self, id: u64) -> Result<Service, ClientError> {
        let body = self.base.fetch_text(&Self::service_op(id)?).await?;
        let service = parse_single(&body)?;
        self.base.metrics().add_records_parsed(1);
        Ok(service)
    }

    pub async fn get_service_page(&self, page: u32) -> Result<ServicePage, ClientError> {
        let body = self.base.fetch_text(&Self::service_page_op(page)?).await?;
        parse_page(&body)
    }

    /// Every service in the catalog, metadata only, in page order.
    pub async fn get_all_services_metadata(&self) -> Result<Vec<ServiceMetadata>, ClientError> {
        self.base.get_all("service page", Self::service_page_op).await
    }

    /// Full records for `ids`. Ids that fail are logged and left out.
    pub async fn get_services(&self, ids: &[u64]) -> Result<Vec<Service>, ClientError> {
        self.base.get_many("service", ids, Self::service_op).await
    }

    // =========================================================================
    // Cases
    // =========================================================================

    pub async fn get_case(&self, id: u64) -> Result<Case, ClientError> {
        let body = self.base.fetch_text(&Self::case_op(id)?).await?;
        let case = parse_single(&body)?;
        self.base.metrics().add_records_parsed(1);
        Ok(case)
    }

    pub async fn get_case_page(&self, page: u32) -> Result<CasePage, ClientError> {
        let body = self.base.fetch_text(&Self::case_page_op(page)?).await?;
        parse_page(&body)
    }

    pub async fn get_all_cases(&self) -> Result<Vec<Case>, ClientError> {
        self.base.get_all("case page", Self::case_page_op).await
    }

    pub async fn get_cases(&self, ids: &[u64]) -> Result<Vec<Case>, ClientError> {
        self.base.get_many("case", ids, Self::case_op).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::collections::HashSet;
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::models::PAGE_SIZE;

    const STAMP: &str = "2020-01-01T00:00:00+00:00";

    fn client(server: &MockServer) -> TosdrClient {
        client_with_window(server, Duration::from_millis(1))
    }

    fn client_with_window(server: &MockServer, window: Duration) -> TosdrClient {
        let config = Config {
            api_base_url: server.uri(),
            api_rate_window: window,
            backoff_base: Duration::from_millis(1),
            backoff_max: Duration::from_millis(5),
            ..Config::default()
        };
        TosdrClient::new(&config).unwrap()
    }

    fn service_meta(id: u64) -> Value {
        json!({
            "id": id,
            "name": format!("service-{id}"),
            "rating": {"human": "Grade B"},
            "created_at": {"timezone": "UTC", "pgsql": STAMP, "unix": 1577836800},
            "updated_at": STAMP,
        })
    }

    fn service(id: u64) -> Value {
        json!({
            "parameters": {
                "id": id,
                "name": format!("service-{id}"),
                "rating": "B",
                "urls": [format!("service-{id}.example")],
                "points": [],
                "created_at": STAMP,
                "updated_at": STAMP,
            }
        })
    }

    fn case(id: u64) -> Value {
        json!({
            "id": id,
            "title": format!("case-{id}"),
            "description": "something about cookies",
            "classification": {"human": "bad"},
            "created_at": STAMP,
            "updated_at": STAMP,
        })
    }

    /// Page `page` of an `end`-page listing holding `total` services.
    fn service_page(page: u32, end: u32, total: u64) -> Value {
        let first = u64::from(page - 1) * PAGE_SIZE as u64 + 1;
        let last = (first + PAGE_SIZE as u64 - 1).min(total);
        json!({
            "parameters": {
                "_page": {"total": total, "current": page, "start": 1, "end": end},
                "services": (first..=last).map(service_meta).collect::<Vec<_>>(),
            }
        })
    }

    async fn mount_page(server: &MockServer, resource: &str, page: u32, response: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(path(resource))
            .and(query_param("page", page.to_string()))
            .respond_with(response)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_get_service_unwraps_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(SERVICE_PATH))
            .and(query_param("service", "222"))
            .respond_with(ResponseTemplate::new(200).set_body_json(service(222)))
            .mount(&server)
            .await;

        let service = client(&server).get_service(222).await.unwrap();
        assert_eq!(service.id, 222);
        assert_eq!(service.rating.as_deref(), Some("B"));
        assert_eq!(service.urls, vec!["service-222.example"]);
    }

    #[tokio::test]
    async fn test_get_service_propagates_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(SERVICE_PATH))
            .and(query_param("service", "1"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(SERVICE_PATH))
            .and(query_param("service", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"parameters": {"id": 2}})))
            .mount(&server)
            .await;

        let client = client(&server);
        assert_eq!(client.get_service(1).await.unwrap_err().status(), Some(404));
        assert!(matches!(
            client.get_service(2).await.unwrap_err(),
            ClientError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn test_get_all_returns_every_item_in_page_order() {
        let server = MockServer::start().await;
        let (end, total) = (3, 237);
        for page in 1..=end {
            mount_page(
                &server,
                SERVICE_PATH,
                page,
                ResponseTemplate::new(200).set_body_json(service_page(page, end, total)),
            )
            .await;
        }

        let client = client(&server);
        let services = client.get_all_services_metadata().await.unwrap();

        assert_eq!(services.len(), PAGE_SIZE * 2 + 37);
        let ids: Vec<u64> = services.iter().map(|s| s.id).collect();
        assert_eq!(ids, (1..=total).collect::<Vec<_>>());
        assert_eq!(ids.iter().collect::<HashSet<_>>().len(), ids.len());
        assert_eq!(client.base().metrics().snapshot().records_parsed, total);
    }

    #[tokio::test]
    async fn test_get_all_single_page_makes_one_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(SERVICE_PATH))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(service_page(1, 1, 42)))
            .expect(1)
            .mount(&server)
            .await;

        let services = client(&server).get_all_services_metadata().await.unwrap();
        assert_eq!(services.len(), 42);
    }

    #[tokio::test]
    async fn test_get_all_omits_failed_page() {
        let server = MockServer::start().await;
        let (end, total) = (3, 250);
        mount_page(&server, SERVICE_PATH, 1, ResponseTemplate::new(200).set_body_json(service_page(1, end, total))).await;
        mount_page(&server, SERVICE_PATH, 2, ResponseTemplate::new(500)).await;
        mount_page(&server, SERVICE_PATH, 3, ResponseTemplate::new(200).set_body_json(service_page(3, end, total))).await;

        let client = client(&server);
        let services = client.get_all_services_metadata().await.unwrap();

        assert_eq!(services.len(), 150);
        assert_eq!(services[99].id, 100);
        assert_eq!(services[100].id, 201);
        assert_eq!(client.base().metrics().snapshot().failed_items, 1);
    }

    #[tokio::test]
    async fn test_get_all_first_page_failure_propagates() {
        let server = MockServer::start().await;
        mount_page(&server, SERVICE_PATH, 1, ResponseTemplate::new(503)).await;

        let err = client(&server).get_all_services_metadata().await.unwrap_err();
        assert_eq!(err.status(), Some(503));
    }

    #[tokio::test]
    async fn test_get_services_retries_429_and_skips_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(SERVICE_PATH))
            .and(query_param("service", "1"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(2)
            .with_priority(1)
            .mount(&server)
            .await;
        for id in [1u64, 2] {
            Mock::given(method("GET"))
                .and(path(SERVICE_PATH))
                .and(query_param("service", id.to_string()))
                .respond_with(ResponseTemplate::new(200).set_body_json(service(id)))
                .mount(&server)
                .await;
        }
        Mock::given(method("GET"))
            .and(path(SERVICE_PATH))
            .and(query_param("service", "3"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server);
        let services = client.get_services(&[1, 2, 3]).await.unwrap();

        let ids: Vec<u64> = services.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![1, 2]);

        let snap = client.base().metrics().snapshot();
        assert_eq!(snap.rate_limited_responses, 2);
        assert_eq!(snap.retries, 2);
        assert_eq!(snap.failed_items, 1);
        assert_eq!(snap.requests_sent, 5);
        // retries queue for a permit like everyone else
        assert_eq!(client.base().limiter().snapshot().permits_granted, 5);
    }

    #[tokio::test]
    async fn test_persistent_429_gives_up_after_max_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(CASE_PATH))
            .and(query_param("case", "7"))
            .respond_with(ResponseTemplate::new(429))
            .expect(10)
            .mount(&server)
            .await;

        let client = client(&server);
        let cases = client.get_cases(&[7]).await.unwrap();

        assert!(cases.is_empty());
        assert_eq!(client.base().metrics().snapshot().retries, 9);
    }

    #[tokio::test]
    async fn test_cases_single_and_paged() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(CASE_PATH))
            .and(query_param("case", "175"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"parameters": case(175)})))
            .mount(&server)
            .await;
        for page in 1..=2u32 {
            let ids = if page == 1 { 1..=100u64 } else { 101..=103u64 };
            mount_page(
                &server,
                CASE_PATH,
                page,
                ResponseTemplate::new(200).set_body_json(json!({
                    "parameters": {
                        "_page": {"total": 103, "current": page, "start": 1, "end": 2},
                        "cases": ids.map(case).collect::<Vec<_>>(),
                    }
                })),
            )
            .await;
        }

        let client = client(&server);
        let single = client.get_case(175).await.unwrap();
        assert_eq!(single.rating.as_deref(), Some("bad"));

        let page = client.get_case_page(2).await.unwrap();
        assert_eq!(page.current_page(), 2);
        assert_eq!(page.items().len(), 3);

        let all = client.get_all_cases().await.unwrap();
        assert_eq!(all.len(), 103);
        assert_eq!(all.last().map(|c| c.id), Some(103));
    }

    // Slack for the limiter's own clock against std's.
    const SLACK: Duration = Duration::from_millis(5);

    #[tokio::test]
    async fn test_get_services_waits_on_shared_limiter() {
        let server = MockServer::start().await;
        let ids = [11u64, 12, 13, 14];
        for id in ids {
            Mock::given(method("GET"))
                .and(path(SERVICE_PATH))
                .and(query_param("service", id.to_string()))
                .respond_with(ResponseTemplate::new(200).set_body_json(service(id)))
                .mount(&server)
                .await;
        }

        let window = Duration::from_millis(100);
        let client = client_with_window(&server, window);
        let start = std::time::Instant::now();
        let services = client.get_services(&ids).await.unwrap();

        assert_eq!(services.len(), ids.len());
        assert!(start.elapsed() + SLACK >= window * (ids.len() as u32 - 1));
        let limiter = client.base().limiter().snapshot();
        assert_eq!(limiter.permits_granted, ids.len() as u64);
        assert!(limiter.total_wait_ms > 0);
    }

    #[tokio::test]
    async fn test_get_all_pages_wait_on_shared_limiter() {
        let server = MockServer::start().await;
        let (end, total) = (3, 210);
        for page in 1..=end {
            mount_page(
                &server,
                SERVICE_PATH,
                page,
                ResponseTemplate::new(200).set_body_json(service_page(page, end, total)),
            )
            .await;
        }

        let window = Duration::from_millis(100);
        let client = client_with_window(&server, window);
        let start = std::time::Instant::now();
        let services = client.get_all_services_metadata().await.unwrap();

        assert_eq!(services.len(), 210);
        // page 1, then pages 2 and 3 one window apart each
        assert!(start.elapsed() + SLACK >= window * 2);
        assert_eq!(client.base().limiter().snapshot().permits_granted, 3);
    }
}
