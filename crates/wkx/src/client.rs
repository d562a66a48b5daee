//! 📡 Client — asking the analytics server for a report and getting raw JSON back.
//!
//! 🎬 COLD OPEN — INT. DASHBOARD MACRO — RENDER TIME
//!
//! The dashboard wants numbers. The numbers live on another server, behind an
//! `index.php`, a `module=API`, a site id and a token. This module knocks on
//! that door, once, and hands whatever comes back to the normalisers.
//!
//! ## Knowledge Graph 🧠
//! - Trait: [`ReportFetcher`] — raw payload in, no opinions about its shape.
//! - Impl: [`MatomoClient`] — `GET {address}index.php?module=API&format=JSON&idSite=..&token_auth=..&method=..`
//! - No retries. No cache. One request, one answer, or one error with context.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, trace};
use url::Url;

use crate::app_config::ConfigurationProvider;

/// 📋 Which report, with which knobs. `method` is the API method name,
/// e.g. `Actions.getPageUrls`; `params` go on the query string verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportQuery {
    pub method: String,
    pub params: Vec<(String, String)>,
}

impl ReportQuery {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            params: Vec::new(),
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }
}

/// 🚰 Something that can produce a raw report payload.
#[async_trait]
pub trait ReportFetcher: Send + Sync {
    async fn fetch(&self, query: &ReportQuery) -> Result<String>;
}

/// 📡 reqwest-backed fetcher for the analytics HTTP API.
#[derive(Debug, Clone)]
pub struct MatomoClient {
    client: reqwest::Client,
    request_address: String,
    site_id: String,
    auth_token: String,
}

impl MatomoClient {
    /// 🚀 Build the client from the three analytics settings.
    ///
    /// 10s to connect, 30s for the whole request. Analytics servers can be slow,
    /// dashboards can't wait forever.
    pub fn new(config: &dyn ConfigurationProvider) -> Result<Self> {
        // ⏱️ same timeouts everywhere: patient enough for a slow server, not for a dead one
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .context("💀 The HTTP client refused to be born. Probably a TLS stack having a bad day.")?;

        // -- snapshot the settings now; the provider doesn't have to outlive us
        Ok(Self {
            client,
            request_address: config.request_address().to_string(),
            site_id: config.site_id().to_string(),
            auth_token: config.auth_token().to_string(),
        })
    }

    /// 🔗 The full request URL for `query`. A configured address may or may not
    /// already end in `index.php`, may or may not end in `/`. Both work.
    pub(crate) fn endpoint(&self, query: &ReportQuery) -> Result<Url> {
        // 🔍 whitespace from a sloppy env var is not an address
        let the_address = self.request_address.trim();
        if the_address.is_empty() {
            anyhow::bail!(
                "💀 No analytics request address configured. Set analytics.request_address (or WKX_ANALYTICS__REQUEST_ADDRESS)."
            );
        }

        let base = Url::parse(the_address)
            .with_context(|| format!("💀 analytics.request_address '{the_address}' is not a valid URL"))?;
        // 🔗 already pointing at index.php? Perfect. Otherwise we add it ourselves.
        let mut url = if base.path().ends_with("index.php") {
            base
        } else {
            // -- Url::join replaces the last segment unless the path ends in '/'. Ask me how I know.
            let with_slash = if base.path().ends_with('/') {
                base
            } else {
                Url::parse(&format!("{base}/")).context("💀 Could not append '/' to the analytics address")?
            };
            with_slash
                .join("index.php")
                .context("💀 Could not build the index.php endpoint from the analytics address")?
        };

        // 📋 query string, in a fixed order so logs and mocks line up
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("module", "API")
                .append_pair("format", "JSON")
                .append_pair("idSite", &self.site_id)
                .append_pair("method", &query.method);
            // 🔑 anonymous access is a thing; an empty token_auth= is just noise
            if !self.auth_token.is_empty() {
                pairs.append_pair("token_auth", &self.auth_token);
            }
            // -- caller's knobs go last, verbatim, percent-encoded by the url crate
            for (key, value) in &query.params {
                pairs.append_pair(key, value);
            }
        }

        Ok(url)
    }
}

#[async_trait]
impl ReportFetcher for MatomoClient {
    async fn fetch(&self, query: &ReportQuery) -> Result<String> {
        let url = self.endpoint(query)?;
        debug!(method = %query.method, "📡 Fetching analytics report");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("💀 The request for '{}' never reached the analytics server.", query.method))?;

        // 📬 grab the status before text() eats the response
        let status = response.status();
        let body = response
            .text()
            .await
            .context("💀 The analytics server answered, but the body got lost on the way.")?;

        if !status.is_success() {
            anyhow::bail!(
                "💀 The analytics server said '{}' to '{}'. The body of the response read: '{}'.",
                status,
                query.method,
                body
            );
        }

        // -- the API reports its own failures as 200 + {"result":"error"}
        if let Ok(Value::Object(envelope)) = serde_json::from_str::<Value>(&body) {
            if envelope.get("result").and_then(Value::as_str) == Some("error") {
                let message = envelope.get("message").and_then(Value::as_str).unwrap_or("no message");
                anyhow::bail!("💀 The analytics API rejected '{}': {}", query.method, message);
            }
        }

        trace!(bytes = body.len(), "📦 Report payload received");
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_config::AnalyticsConfig;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(address: &str) -> AnalyticsConfig {
        AnalyticsConfig {
            request_address: address.to_string(),
            site_id: "1".to_string(),
            auth_token: "tok3n".to_string(),
        }
    }

    #[test]
    fn the_one_where_every_address_flavour_ends_at_index_php() -> Result<()> {
        let the_query = ReportQuery::new("Actions.getPageUrls").param("period", "day");
        for the_address in [
            "https://stats.example.com",
            "https://stats.example.com/",
            "https://stats.example.com/index.php",
        ] {
            let the_url = MatomoClient::new(&config(the_address))?.endpoint(&the_query)?;
            assert_eq!(the_url.path(), "/index.php", "address '{the_address}'");
            assert_eq!(
                the_url.query(),
                Some("module=API&format=JSON&idSite=1&method=Actions.getPageUrls&token_auth=tok3n&period=day")
            );
        }
        Ok(())
    }

    #[test]
    fn the_one_where_a_subdirectory_install_keeps_its_path() -> Result<()> {
        let the_url = MatomoClient::new(&config("https://example.com/matomo"))?.endpoint(&ReportQuery::new("VisitsSummary.get"))?;
        assert_eq!(the_url.path(), "/matomo/index.php");
        Ok(())
    }

    #[test]
    fn the_one_where_no_address_means_no_request() -> Result<()> {
        let the_client = MatomoClient::new(&AnalyticsConfig::default())?;
        assert!(the_client.endpoint(&ReportQuery::new("VisitsSummary.get")).is_err());
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_the_report_comes_home() -> Result<()> {
        let the_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/index.php"))
            .and(query_param("module", "API"))
            .and(query_param("format", "JSON"))
            .and(query_param("idSite", "1"))
            .and(query_param("token_auth", "tok3n"))
            .and(query_param("method", "Actions.getPageUrls"))
            .and(query_param("flat", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"[{"label":"/a","nb_hits":5}]"#))
            .expect(1)
            .mount(&the_server)
            .await;

        let the_client = MatomoClient::new(&config(&the_server.uri()))?;
        let the_body = the_client
            .fetch(&ReportQuery::new("Actions.getPageUrls").param("flat", "1"))
            .await?;

        assert_eq!(the_body, r#"[{"label":"/a","nb_hits":5}]"#);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_500_is_an_error_with_the_body_attached() -> Result<()> {
        let the_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("database on fire"))
            .mount(&the_server)
            .await;

        let the_client = MatomoClient::new(&config(&the_server.uri()))?;
        let the_err = the_client
            .fetch(&ReportQuery::new("VisitsSummary.get"))
            .await
            .expect_err("💀 a 500 should not be a report");
        assert!(the_err.to_string().contains("database on fire"));
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_polite_200_still_carries_bad_news() -> Result<()> {
        let the_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"result":"error","message":"You can't access this resource"}"#),
            )
            .mount(&the_server)
            .await;

        let the_client = MatomoClient::new(&config(&the_server.uri()))?;
        let the_err = the_client
            .fetch(&ReportQuery::new("VisitsSummary.get"))
            .await
            .expect_err("💀 an API error envelope should not be a report");
        assert!(the_err.to_string().contains("You can't access this resource"));
        Ok(())
    }
}
