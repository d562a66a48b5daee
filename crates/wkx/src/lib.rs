//! 📊 wkx — analytics reports for wiki dashboards, normalised and permission-safe.
//!
//! The analytics backend returns report JSON in whatever shape the query
//! parameters put it in. This crate coerces it into one shape, drops rows the
//! reader is not allowed to see, and applies the caller's field filters.
//!
//! Entry points:
//! - [`normalisers::MostViewedNormaliser`] / [`normalisers::VisitsNormaliser`] for library use
//! - [`run`] for the whole fetch → normalise flow driven by [`app_config::AppConfig`]

use anyhow::{Context, Result};
use tracing::info;

pub mod app_config;
pub mod client;
pub mod common;
pub mod error;
pub mod filter;
pub mod normalisers;
pub mod permissions;
pub mod references;
pub mod shape;

use crate::app_config::AppConfig;
use crate::client::{MatomoClient, ReportFetcher, ReportQuery};
use crate::common::{FilterSpec, NormalisedResult};
use crate::normalisers::{Normaliser, NormaliserKind, ReportNormaliser};
use crate::permissions::Principal;

/// 📥 Where the raw payload comes from.
#[derive(Debug, Clone)]
pub enum ReportSource {
    /// Already have the JSON (a file, a cache upstream, a test).
    Inline(String),
    /// Ask the analytics server.
    Remote(ReportQuery),
}

/// 🎯 One normalisation job: which pipeline, which payload, which filters, for whom.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub kind: NormaliserKind,
    pub source: ReportSource,
    pub filters: FilterSpec,
    pub principal: Principal,
}

/// 🚀 Fetch (if remote) and normalise one report, with collaborators built from config.
///
/// Inline payloads never build an HTTP client. No network, no TLS stack, no waiting.
pub async fn run(app_config: AppConfig, request: RunRequest) -> Result<NormalisedResult> {
    let raw_payload = match &request.source {
        ReportSource::Inline(raw) => raw.clone(),
        ReportSource::Remote(query) => {
            // 📡 only now does anybody need to talk to the analytics server
            let client = MatomoClient::new(&app_config.analytics)?;
            fetch_report(&client, query).await?
        }
    };
    normalise_payload(&app_config, request, &raw_payload)
}

/// 🚀 Same as [`run`], with the fetcher supplied by the caller.
pub async fn run_with(fetcher: &dyn ReportFetcher, app_config: &AppConfig, request: RunRequest) -> Result<NormalisedResult> {
    let raw_payload = match &request.source {
        ReportSource::Inline(raw) => raw.clone(),
        ReportSource::Remote(query) => fetch_report(fetcher, query).await?,
    };
    normalise_payload(app_config, request, &raw_payload)
}

async fn fetch_report(fetcher: &dyn ReportFetcher, query: &ReportQuery) -> Result<String> {
    fetcher
        .fetch(query)
        .await
        .with_context(|| format!("💀 Fetching '{}' from the analytics server failed", query.method))
}

fn normalise_payload(app_config: &AppConfig, request: RunRequest, raw_payload: &str) -> Result<NormalisedResult> {
    let normaliser = Normaliser::from_config(request.kind, app_config, request.principal)
        .context("💀 Could not wire up the normaliser from configuration")?;

    // -- an empty filter map is the same as no filters; say so explicitly
    let filters = (!request.filters.is_empty()).then_some(&request.filters);
    let the_result = normaliser
        .normalise_data(raw_payload, filters)
        .with_context(|| format!("💀 The {} report could not be normalised", request.kind))?;

    info!(kind = %request.kind, rows = the_result.len(), "✅ Report normalised");
    Ok(the_result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_config::AnalyticsConfig;
    use serde_json::json;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn the_config(address: &str) -> AppConfig {
        let mut config = AppConfig {
            analytics: AnalyticsConfig {
                request_address: address.to_string(),
                site_id: "1".to_string(),
                auth_token: String::new(),
            },
            ..AppConfig::default()
        };
        config.wiki.base_url = Some("http://localhost:8080/".to_string());
        config.permissions.guest_deny = vec!["xwiki:Admin.".to_string()];
        config
    }

    #[tokio::test]
    async fn the_one_where_the_whole_pipeline_runs_end_to_end() -> Result<()> {
        let the_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("method", "Actions.getPageUrls"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "2024-01-01": [
                    {"label": "/xwiki/bin/view/Admin/Users", "nb_hits": 27},
                    {"label": "/xwiki/bin/view/Main/", "nb_hits": 27},
                    {"label": "/xwiki/bin/view/Sandbox/", "nb_hits": 3},
                ]
            })))
            .mount(&the_server)
            .await;

        let the_request = RunRequest {
            kind: NormaliserKind::MostViewed,
            source: ReportSource::Remote(ReportQuery::new("Actions.getPageUrls").param("flat", "1")),
            filters: FilterSpec::from([("nb_hits".to_string(), "27".to_string())]),
            principal: Principal::Guest,
        };

        let the_result = run(the_config(&the_server.uri()), the_request).await?;
        assert_eq!(the_result.into_value(), json!([{"label": "/xwiki/bin/view/Main/", "nb_hits": 27}]));
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_inline_payloads_never_touch_the_network() -> Result<()> {
        // 📡 no request_address at all: a remote fetch would bail, an inline one never asks
        let the_request = RunRequest {
            kind: NormaliserKind::Visits,
            source: ReportSource::Inline(r#"{"nb_visits":12}"#.to_string()),
            filters: FilterSpec::new(),
            principal: Principal::Guest,
        };

        let the_result = run(AppConfig::default(), the_request).await?;
        assert_eq!(the_result.into_value(), json!({"nb_visits": 12}));
        Ok(())
    }

    /// 📟 Counts calls, answers nothing useful. Inline runs must leave it at zero.
    #[derive(Default)]
    struct CountingFetcher(std::sync::atomic::AtomicUsize);

    #[async_trait::async_trait]
    impl ReportFetcher for CountingFetcher {
        async fn fetch(&self, _query: &ReportQuery) -> Result<String> {
            self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok("[]".to_string())
        }
    }

    #[tokio::test]
    async fn the_one_where_only_remote_sources_knock_on_the_fetcher() -> Result<()> {
        let the_fetcher = CountingFetcher::default();
        let the_inline = RunRequest {
            kind: NormaliserKind::Visits,
            source: ReportSource::Inline(r#"[{"nb_visits":1}]"#.to_string()),
            filters: FilterSpec::new(),
            principal: Principal::Guest,
        };
        run_with(&the_fetcher, &AppConfig::default(), the_inline).await?;
        assert_eq!(the_fetcher.0.load(std::sync::atomic::Ordering::SeqCst), 0);

        let the_remote = RunRequest {
            kind: NormaliserKind::Visits,
            source: ReportSource::Remote(ReportQuery::new("VisitsSummary.get")),
            filters: FilterSpec::new(),
            principal: Principal::Guest,
        };
        let the_result = run_with(&the_fetcher, &AppConfig::default(), the_remote).await?;
        assert_eq!(the_fetcher.0.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert!(the_result.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_bad_payload_says_which_report_broke() {
        let the_request = RunRequest {
            kind: NormaliserKind::MostViewed,
            source: ReportSource::Inline("{broken".to_string()),
            filters: FilterSpec::new(),
            principal: Principal::Guest,
        };

        let the_err = run(AppConfig::default(), the_request)
            .await
            .expect_err("💀 broken JSON should not normalise");
        assert!(the_err.to_string().contains("most-viewed"));
        assert!(the_err.chain().any(|cause| cause.to_string().contains("not valid JSON")));
    }
}
