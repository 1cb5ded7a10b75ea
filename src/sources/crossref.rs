//! CrossRef registry implementation.
//!
//! BibTeX comes from DOI content negotiation against the DOI resolver;
//! title search uses the CrossRef REST API.

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use serde::Deserialize;
use std::sync::Arc;

use crate::config::ResolverConfig;
use crate::sources::{BibliographicRegistry, SourceError, WorkSummary};
use crate::utils::{status_error, HttpClient};

/// Rows requested from a title search
const SEARCH_ROWS: usize = 5;

/// CrossRef registry
///
/// Stateless apart from the shared HTTP client; cheap to clone.
#[derive(Debug, Clone)]
pub struct CrossRefSource {
    client: Arc<HttpClient>,
    api_base: String,
    doi_base: String,
    mailto: Option<String>,
}

impl CrossRefSource {
    pub fn new(config: &ResolverConfig) -> Result<Self, SourceError> {
        let user_agent = match &config.mailto {
            Some(mailto) => format!(
                "{}/{} (mailto:{})",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION"),
                mailto
            ),
            None => format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        };
        Ok(Self {
            client: Arc::new(HttpClient::with_user_agent(&user_agent)?),
            api_base: config.crossref_base_url.trim_end_matches('/').to_string(),
            doi_base: config.doi_base_url.trim_end_matches('/').to_string(),
            mailto: config.mailto.clone(),
        })
    }

    fn search_url(&self, title: &str, author: Option<&str>) -> String {
        let mut url = format!(
            "{}/works?query.bibliographic={}&rows={}",
            self.api_base,
            urlencoding::encode(title),
            SEARCH_ROWS
        );
        if let Some(author) = author.filter(|a| !a.trim().is_empty()) {
            url.push_str(&format!("&query.author={}", urlencoding::encode(author)));
        }
        if let Some(mailto) = &self.mailto {
            url.push_str(&format!("&mailto={}", urlencoding::encode(mailto)));
        }
        url
    }
}

#[async_trait]
impl BibliographicRegistry for CrossRefSource {
    fn id(&self) -> &str {
        "crossref"
    }

    async fn bibtex_by_doi(&self, doi: &str) -> Result<Option<String>, SourceError> {
        // DOI suffixes may contain `/`, which must stay unescaped in the path
        let url = format!("{}/{}", self.doi_base, doi);
        tracing::debug!("Fetching BibTeX for DOI {}", doi);

        let response = self
            .client
            .get(&url)
            .header(ACCEPT, "application/x-bibtex")
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(status_error(response, "DOI resolver").await);
        }

        let body = response.text().await?;
        if body.contains("DOI Not Found") || !body.trim_start().starts_with('@') {
            tracing::debug!("DOI resolver has no BibTeX for {}", doi);
            return Ok(None);
        }
        Ok(Some(body))
    }

    async fn search_title(
        &self,
        title: &str,
        author: Option<&str>,
    ) -> Result<Vec<WorkSummary>, SourceError> {
        let url = self.search_url(title, author);
        tracing::debug!("Searching CrossRef: {}", url);

        let response = self.client.get(&url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(status_error(response, "CrossRef").await);
        }

        let data: CRResponse = response
            .json()
            .await
            .map_err(|e| SourceError::Parse(format!("Failed to parse CrossRef JSON: {}", e)))?;

        Ok(data
            .message
            .items
            .into_iter()
            .filter_map(CRItem::into_summary)
            .collect())
    }
}

// ===== CrossRef API Types =====

#[derive(Debug, Deserialize)]
struct CRResponse {
    message: CRMessage,
}

#[derive(Debug, Deserialize)]
struct CRMessage {
    #[serde(default)]
    items: Vec<CRItem>,
}

#[derive(Debug, Deserialize)]
struct CRAuthor {
    given: Option<String>,
    family: Option<String>,
    name: Option<String>,
}

impl CRAuthor {
    fn display(&self) -> Option<String> {
        match (&self.family, &self.given) {
            (Some(family), Some(given)) => Some(format!("{}, {}", family, given)),
            (Some(family), None) => Some(family.clone()),
            (None, _) => self.name.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CRItem {
    #[serde(default)]
    title: Vec<String>,
    #[serde(rename = "DOI")]
    doi: Option<String>,
    #[serde(rename = "URL")]
    url: Option<String>,
    #[serde(default)]
    author: Vec<CRAuthor>,
    #[serde(rename = "type")]
    work_type: Option<String>,
    #[serde(rename = "container-title", default)]
    container_title: Vec<String>,
    publisher: Option<String>,
    volume: Option<String>,
    issue: Option<String>,
    page: Option<String>,
    issued: Option<CRDate>,
    #[serde(rename = "published-print")]
    published_print: Option<CRDate>,
}

impl CRItem {
    fn into_summary(self) -> Option<WorkSummary> {
        let title = self.title.into_iter().next()?.trim().to_string();
        if title.is_empty() {
            return None;
        }
        let year = self
            .issued
            .as_ref()
            .and_then(CRDate::year)
            .or_else(|| self.published_print.as_ref().and_then(CRDate::year));

        Some(WorkSummary {
            title,
            doi: self.doi.map(|d| d.to_lowercase()),
            authors: self.author.iter().filter_map(CRAuthor::display).collect(),
            year,
            work_type: self.work_type,
            container_title: self.container_title.into_iter().next(),
            publisher: self.publisher,
            volume: self.volume,
            issue: self.issue,
            pages: self.page,
            url: self.url,
        })
    }
}

#[derive(Debug, Deserialize)]
struct CRDate {
    #[serde(rename = "date-parts", default)]
    date_parts: Vec<Vec<Option<i32>>>,
}

impl CRDate {
    fn year(&self) -> Option<i32> {
        self.date_parts.first()?.first().copied().flatten()
    }
}
