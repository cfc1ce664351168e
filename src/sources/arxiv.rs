//! Primary academic index client (source A): arXiv's Atom feed API, parsed
//! with `quick-xml`, paced by [`super::rate_limit::TrailingDelayLimiter`].

use super::{RawRecord, SearchSource, SourceError};
use crate::model::SourceTag;
use async_trait::async_trait;
use quick_xml::de::from_str;
use serde::Deserialize;
use std::sync::Arc;

use super::rate_limit::TrailingDelayLimiter;

#[derive(Debug, Deserialize)]
struct Feed {
    #[serde(rename = "entry", default)]
    entries: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    id: String,
    title: String,
    summary: String,
    #[serde(rename = "author", default)]
    authors: Vec<Author>,
    published: Option<String>,
    #[serde(rename = "link", default)]
    links: Vec<Link>,
}

#[derive(Debug, Deserialize)]
struct Author {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Link {
    #[serde(rename = "@href")]
    href: String,
    #[serde(rename = "@title", default)]
    title: Option<String>,
}

pub struct ArxivClient {
    http: reqwest::Client,
    limiter: Arc<TrailingDelayLimiter>,
}

impl ArxivClient {
    pub fn new(limiter: Arc<TrailingDelayLimiter>) -> Self {
        Self {
            http: reqwest::Client::new(),
            limiter,
        }
    }

    fn parse_entry(entry: Entry) -> RawRecord {
        let arxiv_id = entry
            .id
            .rsplit('/')
            .next()
            .unwrap_or(&entry.id)
            .to_string();
        let pdf_url = entry
            .links
            .iter()
            .find(|l| l.title.as_deref() == Some("pdf"))
            .map(|l| l.href.clone());

        RawRecord {
            title: entry.title.split_whitespace().collect::<Vec<_>>().join(" "),
            authors: entry.authors.into_iter().map(|a| a.name).collect(),
            published: entry
                .published
                .as_deref()
                .and_then(|p| chrono::DateTime::parse_from_rfc3339(p).ok())
                .map(|dt| dt.with_timezone(&chrono::Utc)),
            source_id: arxiv_id,
            landing_url: entry.id,
            pdf_url,
            doi: None,
            source: SourceTag::Arxiv,
            abstract_text: entry.summary.trim().to_string(),
        }
    }
}

#[async_trait]
impl SearchSource for ArxivClient {
    fn name(&self) -> &'static str {
        "arxiv"
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<RawRecord>, SourceError> {
        let http = &self.http;
        let url = format!(
            "http://export.arxiv.org/api/query?search_query=all:{}&max_results={}",
            urlencoding_query(query),
            max_results
        );

        let body = self
            .limiter
            .run(|| async {
                http.get(&url)
                    .send()
                    .await
                    .map_err(|e| SourceError::Transient(e.to_string()))?
                    .text()
                    .await
                    .map_err(|e| SourceError::Transient(e.to_string()))
            })
            .await?;

        let feed: Feed = from_str(&body).map_err(|e| SourceError::Permanent(e.to_string()))?;
        Ok(feed.entries.into_iter().map(Self::parse_entry).collect())
    }
}

fn urlencoding_query(query: &str) -> String {
    url::form_urlencoded::byte_serialize(query.as_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <entry>
    <id>http://arxiv.org/abs/1706.03762v5</id>
    <title>Attention Is All You Need</title>
    <summary>The dominant sequence transduction models...</summary>
    <published>2017-06-12T17:57:34Z</published>
    <author><name>Ashish Vaswani</name></author>
    <link href="http://arxiv.org/pdf/1706.03762v5" title="pdf" rel="related"/>
  </entry>
</feed>
"#;

    #[test]
    fn parses_a_sample_atom_entry() {
        let feed: Feed = from_str(SAMPLE_FEED).unwrap();
        assert_eq!(feed.entries.len(), 1);
        let record = ArxivClient::parse_entry(feed.entries.into_iter().next().unwrap());
        assert_eq!(record.title, "Attention Is All You Need");
        assert_eq!(record.source_id, "1706.03762v5");
        assert_eq!(record.pdf_url.as_deref(), Some("http://arxiv.org/pdf/1706.03762v5"));
    }
}
