//! Ambient export helpers for the report's References section:
//! author-list formatting, and CSL-JSON / BibTeX bibliography generation.

use crate::model::Paper;
use serde_json::json;

/// `"A"` / `"A and B"` / `"A et al."`, the academic convention for
/// collapsing author lists in progress narration and the References section.
pub fn format_authors(authors: &[String]) -> String {
    match authors.len() {
        0 => "Unknown".to_string(),
        1 => authors[0].clone(),
        2 => format!("{} and {}", authors[0], authors[1]),
        _ => format!("{} et al.", authors[0]),
    }
}

/// Splits `"Given Family"` into `(family, given)` for CSL-JSON's author
/// object shape; a bare single-token name has no given name.
fn split_family_given(author: &str) -> (String, String) {
    let parts: Vec<&str> = author.split_whitespace().collect();
    match parts.split_last() {
        Some((family, given)) if !given.is_empty() => (family.to_string(), given.join(" ")),
        Some((family, _)) => (family.to_string(), String::new()),
        None => (author.to_string(), String::new()),
    }
}

/// CSL-JSON bibliography for the papers referenced by a completed report,
/// suitable for Pandoc citation processing.
pub fn to_csl_json(papers: &[&Paper]) -> String {
    let entries: Vec<_> = papers
        .iter()
        .map(|paper| {
            let authors: Vec<_> = paper
                .authors
                .iter()
                .map(|a| {
                    let (family, given) = split_family_given(a);
                    if given.is_empty() {
                        json!({ "family": family })
                    } else {
                        json!({ "family": family, "given": given })
                    }
                })
                .collect();
            let mut entry = json!({
                "id": paper.citation_key(),
                "type": "article",
                "author": authors,
                "title": paper.title,
            });
            if let Some(published) = paper.published {
                entry["issued"] = json!({ "date-parts": [[published.format("%Y").to_string().parse::<i32>().unwrap_or(0)]] });
            }
            let url = paper.pdf_url.clone().unwrap_or_else(|| paper.landing_url.clone());
            if !url.is_empty() {
                entry["URL"] = json!(url);
            }
            entry
        })
        .collect();
    serde_json::to_string_pretty(&entries).unwrap_or_else(|_| "[]".to_string())
}

/// BibTeX `@article` entries for the same paper set, the plain-text sibling
/// of [`to_csl_json`].
pub fn to_bibtex(papers: &[&Paper]) -> String {
    papers
        .iter()
        .map(|paper| {
            let authors = paper.authors.join(" and ");
            let year = paper.published.map(|d| d.format("%Y").to_string()).unwrap_or_default();
            let url = paper.pdf_url.clone().unwrap_or_else(|| paper.landing_url.clone());
            format!(
                "@article{{{key},\n  title = {{{title}}},\n  author = {{{authors}}},\n  year = {{{year}}},\n  url = {{{url}}}\n}}",
                key = paper.citation_key(),
                title = paper.title,
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
