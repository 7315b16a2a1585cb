// =============================================================================
// clients/mod.rs — WHO WE TALK TO
// =============================================================================
//
// Two upstreams, two clients, one engine underneath:
//
// - tosdr_api: the JSON catalog (services, cases). One request per 1.5 s.
// - edit_site: the curators' web app, scraped for case points. One per 0.5 s.
//
// Both are thin wrappers over BaseClient, which owns the limiter, the retry
// policy and the fan-out machinery. The two clients never share a limiter;
// they're different hosts with different patience.
// =============================================================================

pub mod base_client;
pub mod edit_site;
pub mod tosdr_api;

pub use base_client::BaseClient;
pub use edit_site::EditSiteClient;
pub use tosdr_api::TosdrClient;
