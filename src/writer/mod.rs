//! Grounded writer (§4.11): assembles the final Markdown report from
//! claims only — no unbacked prose.

pub mod export;

use crate::gaps::GapDirection;
use crate::ids::{PaperId, SpanId};
use crate::model::{Claim, EvidenceSpan, Paper, Report};
use std::collections::HashMap;

pub const INSUFFICIENT_EVIDENCE: &str = "(insufficient evidence)";

pub struct GroundedWriter;

pub struct ReportInputs<'a> {
    pub topic: &'a str,
    pub themes: &'a [String],
    pub claims_by_theme: &'a HashMap<String, Vec<Claim>>,
    pub papers: &'a HashMap<PaperId, Paper>,
    pub spans: &'a HashMap<SpanId, EvidenceSpan>,
    pub comparative_pairs: &'a [(String, String)],
    pub limitations_summary: &'a str,
    pub gaps: &'a [GapDirection],
    pub language: String,
}

impl ReportInputs<'_> {
    /// Resolves a claim back to the paper(s) its evidence spans come from,
    /// via the span id's embedded `paper_id` prefix (§3).
    fn papers_for_claim(&self, claim: &Claim) -> Vec<&Paper> {
        let mut ids: Vec<&PaperId> = claim
            .evidence_span_ids
            .iter()
            .filter_map(|span_id| self.spans.get(span_id))
            .map(|span| &span.paper_id)
            .collect();
        ids.sort_by_key(|id| id.as_str().to_string());
        ids.dedup();
        ids.into_iter().filter_map(|id| self.papers.get(id)).collect()
    }
}

impl GroundedWriter {
    /// Renders the fixed section skeleton of §4.11. Every factual sentence
    /// comes from a `Claim`; themes with no claims get the explicit
    /// "(insufficient evidence)" placeholder rather than invented prose.
    pub fn write(inputs: &ReportInputs<'_>) -> Report {
        let mut body = String::new();
        body.push_str(&format!("# Research Report: {}\n\n", inputs.topic));

        body.push_str("## Scope & Search Strategy\n\n");
        body.push_str(&format!(
            "This report covers {} theme(s) derived from the collected corpus.\n\n",
            inputs.themes.len()
        ));

        body.push_str("## Theme Map\n\n");
        for theme in inputs.themes {
            body.push_str(&format!("- {theme}\n"));
        }
        body.push('\n');

        body.push_str("## Per-theme Synthesis\n\n");
        let mut all_claims: Vec<&Claim> = Vec::new();
        for theme in inputs.themes {
            body.push_str(&format!("### {theme}\n\n"));
            match inputs.claims_by_theme.get(theme) {
                Some(claims) if !claims.is_empty() => {
                    for claim in claims {
                        body.push_str(&format!("{} [C{}]\n\n", claim.claim_text, claim.id));
                        all_claims.push(claim);
                    }
                }
                _ => body.push_str(&format!("{INSUFFICIENT_EVIDENCE}\n\n")),
            }
        }
        let all_claim_ids: Vec<_> = all_claims.iter().map(|c| c.id.clone()).collect();

        body.push_str("## Comparative Table\n\n");
        if inputs.comparative_pairs.is_empty() {
            body.push_str(&format!("{INSUFFICIENT_EVIDENCE}\n\n"));
        } else {
            body.push_str("| Theme | Dataset / Metric | Summary |\n|---|---|---|\n");
            for theme in inputs.themes {
                for (dataset, metric) in inputs.comparative_pairs {
                    let claims_for_cell: Vec<&Claim> = inputs
                        .claims_by_theme
                        .get(theme)
                        .map(|claims| claims.iter().collect())
                        .unwrap_or_default();
                    if claims_for_cell.is_empty() {
                        continue;
                    }
                    let summary = claims_for_cell
                        .iter()
                        .map(|c| format!("{} [C{}]", c.claim_text, c.id))
                        .collect::<Vec<_>>()
                        .join("; ");
                    body.push_str(&format!("| {theme} | {dataset} / {metric} | {summary} |\n"));
                }
            }
            body.push('\n');
        }

        body.push_str("## Limitations\n\n");
        if inputs.limitations_summary.trim().is_empty() {
            body.push_str(&format!("{INSUFFICIENT_EVIDENCE}\n\n"));
        } else {
            body.push_str(inputs.limitations_summary);
            body.push_str("\n\n");
        }

        body.push_str("## Future Directions\n\n");
        if inputs.gaps.is_empty() {
            body.push_str(&format!("{INSUFFICIENT_EVIDENCE}\n\n"));
        } else {
            for gap in inputs.gaps {
                body.push_str(&format!("- {}\n", gap.text));
            }
            body.push('\n');
        }

        // §4.11: "the References section maps claim-ids back to paper
        // titles, authors, and source URLs", resolved via each claim's
        // evidence spans.
        body.push_str("## References\n\n");
        for claim in &all_claims {
            let papers = inputs.papers_for_claim(claim);
            if papers.is_empty() {
                body.push_str(&format!("- [C{}] {INSUFFICIENT_EVIDENCE}\n", claim.id));
                continue;
            }
            for paper in papers {
                let url = paper.pdf_url.as_deref().unwrap_or(&paper.landing_url);
                body.push_str(&format!(
                    "- [C{}] {} — {} ({url})\n",
                    claim.id,
                    paper.title,
                    export::format_authors(&paper.authors)
                ));
            }
        }

        Report {
            content: body,
            referenced_claim_ids: all_claim_ids,
            language: inputs.language.clone(),
            created_at: chrono::Utc::now(),
        }
    }

    /// Reports containing only scope and a note of insufficient evidence —
    /// the path taken when every paper was excluded at screening (§8
    /// boundary case).
    pub fn write_insufficient_evidence(topic: &str, language: String) -> Report {
        let body = format!(
            "# Research Report: {topic}\n\n## Scope & Search Strategy\n\nNo papers survived screening.\n\n{INSUFFICIENT_EVIDENCE}\n"
        );
        Report {
            content: body,
            referenced_claim_ids: Vec::new(),
            language,
            created_at: chrono::Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_theme_gets_insufficient_evidence_placeholder() {
        let papers = HashMap::new();
        let spans = HashMap::new();
        let claims_by_theme = HashMap::new();
        let inputs = ReportInputs {
            topic: "transformers",
            themes: &["theme_1".to_string()],
            claims_by_theme: &claims_by_theme,
            papers: &papers,
            spans: &spans,
            comparative_pairs: &[],
            limitations_summary: "",
            gaps: &[],
            language: "en".to_string(),
        };
        let report = GroundedWriter::write(&inputs);
        assert!(report.content.contains(INSUFFICIENT_EVIDENCE));
    }

    #[test]
    fn claims_render_as_bracketed_citations_that_resolve() {
        let claim = Claim::new("A finding.".into(), vec![]);
        let mut claims_by_theme = HashMap::new();
        claims_by_theme.insert("theme_1".to_string(), vec![claim]);
        let papers = HashMap::new();
        let spans = HashMap::new();
        let inputs = ReportInputs {
            topic: "transformers",
            themes: &["theme_1".to_string()],
            claims_by_theme: &claims_by_theme,
            papers: &papers,
            spans: &spans,
            comparative_pairs: &[],
            limitations_summary: "",
            gaps: &[],
            language: "en".to_string(),
        };
        let report = GroundedWriter::write(&inputs);
        assert!(report.all_citations_resolve());
    }

    #[test]
    fn references_section_resolves_claim_to_paper_title_and_authors() {
        use crate::ids::PaperId;
        use crate::model::{EvidenceSpan, FieldTag, Locator, PaperStatus, SourceTag};

        let paper_id = PaperId::from_raw("paper_1");
        let span = EvidenceSpan::new(
            paper_id.clone(),
            FieldTag::Result,
            "we observe a four point improvement",
            Locator::default(),
            0.9,
            "https://arxiv.org/abs/1".into(),
        );
        let claim = Claim::new("The method improves accuracy.".into(), vec![span.span_id.clone()]);

        let paper = Paper {
            id: paper_id.clone(),
            title: "A Study of Widgets".into(),
            authors: vec!["Ada Lovelace".into()],
            published: None,
            source: SourceTag::Arxiv,
            arxiv_id: None,
            doi: None,
            abstract_text: String::new(),
            pdf_url: None,
            landing_url: "https://arxiv.org/abs/1".into(),
            status: PaperStatus::Raw,
            relevance_score: None,
            metadata_hash: "h".into(),
            pdf_hash: None,
            page_map: None,
            pdf_skipped: false,
        };

        let mut papers = HashMap::new();
        papers.insert(paper_id, paper);
        let mut spans = HashMap::new();
        spans.insert(span.span_id.clone(), span);
        let mut claims_by_theme = HashMap::new();
        claims_by_theme.insert("theme_1".to_string(), vec![claim]);

        let inputs = ReportInputs {
            topic: "transformers",
            themes: &["theme_1".to_string()],
            claims_by_theme: &claims_by_theme,
            papers: &papers,
            spans: &spans,
            comparative_pairs: &[],
            limitations_summary: "",
            gaps: &[],
            language: "en".to_string(),
        };
        let report = GroundedWriter::write(&inputs);
        assert!(report.content.contains("A Study of Widgets"));
        assert!(report.content.contains("Ada Lovelace"));
        assert!(report.content.contains("https://arxiv.org/abs/1"));
    }
}
