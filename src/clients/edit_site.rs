// =============================================================================
// clients/edit_site.rs — SCRAPING THE CURATORS' DESK
// =============================================================================
//
// The catalog API knows about cases but not which services each case has
// been filed against. The edit site does: GET /cases/{id} renders a table
// of Service | Title | Status, one row per point. We fetch it, pull the
// table apart and tag every row with the case it came from.
//
// The edit site is slower and more fragile than the API, so its limiter
// runs on its own window.
// =============================================================================

use crate::clients::base_client::BaseClient;
use crate::config::Config;
use crate::error::ClientError;
use crate::html_table::extract_rows;
use crate::models::CasePoint;
use crate::operation::Operation;

pub struct EditSiteClient {
    base: BaseClient,
}

impl EditSiteClient {
    pub fn new(config: &Config) -> Result<Self, ClientError> {
        Ok(Self {
            base: BaseClient::new(
                "edit-site",
                &config.edit_site_base_url,
                config.edit_site_rate_window,
                config,
            )?,
        })
    }

    pub fn base(&self) -> &BaseClient {
        &self.base
    }

    pub fn case_points_op(case_id: u64) -> Result<Operation, ClientError> {
        Operation::get(format!("/cases/{case_id}"))
    }

    /// Points filed under one case. Fetch and parse errors both propagate.
    pub async fn get_case_points(&self, case_id: u64) -> Result<Vec<CasePoint>, ClientError> {
        let markup = self.base.fetch_text(&Self::case_points_op(case_id)?).await?;
        let points = parse_case_points(case_id, &markup)?;
        self.base.metrics().add_records_parsed(points.len());
        Ok(points)
    }

    /// Points for many cases, flattened in case order. A case whose page
    /// can't be fetched or parsed contributes nothing.
    pub async fn get_case_points_many(
        &self,
        case_ids: &[u64],
    ) -> Result<Vec<CasePoint>, ClientError> {
        let per_case = self
            .base
            .fan_out("case points", case_ids.to_vec(), |session, case_id| async move {
                let operation = Self::case_points_op(case_id)?;
                let markup = self
                    .base
                    .send_limited(&session, &operation, &format!("case {case_id}"))
                    .await?;
                parse_case_points(case_id, &markup)
            })
            .await?;

        let points: Vec<CasePoint> = per_case.into_iter().flatten().collect();
        self.base.metrics().add_records_parsed(points.len());
        Ok(points)
    }
}

/// Every row of the page's table, as CasePoints tagged with `case_id`.
/// All-or-nothing: one bad row fails the whole page.
pub fn parse_case_points(case_id: u64, markup: &str) -> Result<Vec<CasePoint>, ClientError> {
    extract_rows(markup)?
        .map(|row| CasePoint::from_row(case_id, &row?))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::error::HtmlTableError;

    fn case_page(rows: &[(&str, &str, &str)]) -> String {
        let body: String = rows
            .iter()
            .map(|(service, title, status)| {
                format!(
                    "<tr><td><a href=\"/services/1\">{service}</a></td><td>\n  {title}\n</td><td>{status}</td></tr>"
                )
            })
            .collect();
        format!(
            "<html><body><h1>Case</h1><table class=\"table\">\
             <thead><tr><th>Service</th><th>Title</th><th>Status</th></tr></thead>\
             <tbody>{body}</tbody></table></body></html>"
        )
    }

    fn client(server: &MockServer) -> EditSiteClient {
        let config = Config {
            edit_site_base_url: server.uri(),
            edit_site_rate_window: Duration::from_millis(1),
            backoff_base: Duration::from_millis(1),
            backoff_max: Duration::from_millis(5),
            ..Config::default()
        };
        EditSiteClient::new(&config).unwrap()
    }

    async fn mount_case(server: &MockServer, case_id: u64, response: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(path(format!("/cases/{case_id}")))
            .respond_with(response)
            .mount(server)
            .await;
    }

    #[test]
    fn test_parse_case_points_tags_and_trims() {
        let markup = case_page(&[
            ("DuckDuckGo", "No tracking", "approved"),
            ("Example", "Sells your data", "pending"),
        ]);
        let points = parse_case_points(175, &markup).unwrap();

        assert_eq!(points.len(), 2);
        assert!(points.iter().all(|p| p.case_id == 175));
        assert_eq!(points[0].service_name, "DuckDuckGo");
        assert_eq!(points[0].quote, "No tracking");
        assert_eq!(points[1].status, "pending");
    }

    #[test]
    fn test_parse_case_points_rejects_pages_without_table() {
        let err = parse_case_points(1, "<html><body><p>Not found</p></body></html>").unwrap_err();
        assert!(matches!(
            err,
            ClientError::Table(HtmlTableError::TagNotFound { .. })
        ));
    }

    #[test]
    fn test_parse_case_points_wrong_headers_is_validation_error() {
        let markup = "<table><thead><tr><th>Name</th><th>Verdict</th></tr></thead>\
                      <tbody><tr><td>a</td><td>b</td></tr></tbody></table>";
        assert!(matches!(
            parse_case_points(1, markup).unwrap_err(),
            ClientError::Validation(_)
        ));
    }

    #[test]
    fn test_parse_case_points_empty_case() {
        assert!(parse_case_points(9, &case_page(&[])).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_case_points_propagates_parse_failure() {
        let server = MockServer::start().await;
        mount_case(&server, 5, ResponseTemplate::new(200).set_body_string("<p>maintenance</p>")).await;

        let err = client(&server).get_case_points(5).await.unwrap_err();
        assert!(matches!(err, ClientError::Table(_)));
    }

    #[tokio::test]
    async fn test_get_case_points_many_flattens_and_skips_bad_pages() {
        let server = MockServer::start().await;
        mount_case(
            &server,
            1,
            ResponseTemplate::new(200).set_body_string(case_page(&[
                ("A", "first", "approved"),
                ("B", "second", "declined"),
            ])),
        )
        .await;
        mount_case(&server, 2, ResponseTemplate::new(200).set_body_string("<p>no table here</p>")).await;
        mount_case(&server, 3, ResponseTemplate::new(404)).await;
        mount_case(
            &server,
            4,
            ResponseTemplate::new(200).set_body_string(case_page(&[("C", "third", "approved")])),
        )
        .await;

        let client = client(&server);
        let points = client.get_case_points_many(&[1, 2, 3, 4]).await.unwrap();

        let got: Vec<(u64, &str)> = points
            .iter()
            .map(|p| (p.case_id, p.service_name.as_str()))
            .collect();
        assert_eq!(got, vec![(1, "A"), (1, "B"), (4, "C")]);

        let snap = client.base().metrics().snapshot();
        assert_eq!(snap.failed_items, 2);
        assert_eq!(snap.records_parsed, 3);
    }
}
