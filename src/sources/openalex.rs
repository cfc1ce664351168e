//! Broader metadata index client (source B): OpenAlex's works search,
//! paced by [`super::rate_limit::LeakyBucket`] and subject to §4.3's query
//! condensation (conjunctive title-and-abstract search).

use super::{condense_query, RawRecord, SearchSource, SourceError};
use crate::model::SourceTag;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use super::rate_limit::LeakyBucket;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    results: Vec<Work>,
}

#[derive(Debug, Deserialize)]
struct Work {
    id: String,
    title: Option<String>,
    doi: Option<String>,
    publication_date: Option<String>,
    authorships: Vec<Authorship>,
    #[serde(default)]
    open_access: Option<OpenAccess>,
}

#[derive(Debug, Deserialize)]
struct Authorship {
    author: AuthorName,
}

#[derive(Debug, Deserialize)]
struct AuthorName {
    display_name: String,
}

#[derive(Debug, Deserialize)]
struct OpenAccess {
    oa_url: Option<String>,
}

pub struct OpenAlexClient {
    http: reqwest::Client,
    bucket: Arc<LeakyBucket>,
    contact_email: Option<String>,
}

impl OpenAlexClient {
    pub fn new(bucket: Arc<LeakyBucket>, contact_email: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            bucket,
            contact_email,
        }
    }

    fn parse_work(work: Work) -> RawRecord {
        let landing_url = work.id.clone();
        RawRecord {
            title: work.title.unwrap_or_default(),
            authors: work.authorships.into_iter().map(|a| a.author.display_name).collect(),
            published: work
                .publication_date
                .as_deref()
                .and_then(|d| chrono::NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| chrono::DateTime::from_naive_utc_and_offset(dt, chrono::Utc)),
            source_id: work.id,
            landing_url,
            pdf_url: work.open_access.and_then(|oa| oa.oa_url),
            doi: work.doi,
            source: SourceTag::Openalex,
            abstract_text: String::new(),
        }
    }
}

#[async_trait]
impl SearchSource for OpenAlexClient {
    fn name(&self) -> &'static str {
        "openalex"
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<RawRecord>, SourceError> {
        let condensed = condense_query(query, 4);
        self.bucket.acquire().await;

        let mut request = self.http.get("https://api.openalex.org/works").query(&[
            ("search", condensed.as_str()),
            ("per_page", &max_results.to_string()),
        ]);
        if let Some(email) = &self.contact_email {
            request = request.query(&[("mailto", email.as_str())]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SourceError::Transient(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SourceError::Permanent(format!(
                "openalex returned {}",
                response.status()
            )));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| SourceError::Permanent(e.to_string()))?;

        Ok(parsed.results.into_iter().map(Self::parse_work).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_work_falls_back_to_empty_title() {
        let work = Work {
            id: "W123".into(),
            title: None,
            doi: None,
            publication_date: None,
            authorships: vec![],
            open_access: None,
        };
        let record = OpenAlexClient::parse_work(work);
        assert_eq!(record.title, "");
        assert_eq!(record.source, SourceTag::Openalex);
    }
}
