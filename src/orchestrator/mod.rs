//! Pipeline orchestrator (§4.1): phase sequencing, checkpoints, gates,
//! cancellation, driving a session from `IDLE` to `COMPLETE`/`FAILED`.

pub mod checkpoint;
pub mod phases;

use crate::audit::CitationAuditor;
use crate::cache::Cache;
use crate::claims::ClaimGenerator;
use crate::clustering::taxonomy::TaxonomyBuilder;
use crate::clustering::Clusterer;
use crate::config::{Mode, PipelineOptions};
use crate::embedding::Embedder;
use crate::error::{PipelineError, Result};
use crate::events::{Event, EventBus};
use crate::extraction::{EvidenceExtractor, ExtractionOutcome};
use crate::gaps::GapMiner;
use crate::gate::{GateDecision, GateManager};
use crate::ids::{CardId, PaperId, SessionId};
use crate::llm::LlmClient;
use crate::model::session::GateKind;
use crate::model::{Claim, Paper, PaperStatus, Phase, Report, Session, SourceTag, StudyCard};
use crate::pdf::loader::{LoadedPdf, PdfLoader};
use crate::pdf::PdfFetcher;
use crate::planner::executor::PlanExecutor;
use crate::planner::{mode as plan_mode, PlanGenerator};
use crate::registry::PaperRegistry;
use crate::repository::Repository;
use crate::screening::Screener;
use crate::sources::RawRecord;
use crate::writer::{GroundedWriter, ReportInputs};
use checkpoint::{Checkpoint, CheckpointStore};
use dashmap::DashMap;
use md5::{Digest, Md5};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub struct PipelineDeps {
    pub repository: Arc<dyn Repository>,
    pub cache: Arc<dyn Cache>,
    pub llm: Arc<dyn LlmClient>,
    pub embedder: Arc<dyn Embedder>,
    pub pdf_loader: Arc<PdfLoader>,
    pub pdf_fetcher: Arc<dyn PdfFetcher>,
    pub plan_executor: Arc<PlanExecutor>,
}

/// Cooperative cancellation handle (§4.1, §5): safe to clone and hand to a
/// session's caller; `cancel()` is idempotent.
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct PipelineOrchestrator {
    registry: PaperRegistry,
    deps: PipelineDeps,
    checkpoints: CheckpointStore,
    event_buses: DashMap<SessionId, Arc<EventBus>>,
    plan_generator: PlanGenerator,
    gate_manager: GateManager,
    /// Senders for gates currently awaiting an external decision, keyed by
    /// session (§4.13). `decide_gate` is the only way one is ever removed
    /// and fulfilled before the gate's own timeout.
    pending_gates: DashMap<SessionId, tokio::sync::oneshot::Sender<GateDecision>>,
}

impl PipelineOrchestrator {
    pub fn new(registry: PaperRegistry, deps: PipelineDeps, options: &PipelineOptions) -> Self {
        let cache = deps.cache.clone();
        let llm = deps.llm.clone();
        Self {
            registry,
            checkpoints: CheckpointStore::new(cache),
            event_buses: DashMap::new(),
            plan_generator: PlanGenerator::new(llm, crate::planner::tool_registry::ToolRegistry::with_defaults()),
            gate_manager: GateManager::new(options.gate_timeout_seconds, options.gate_auto_approve),
            pending_gates: DashMap::new(),
            deps,
        }
    }

    pub fn event_bus(&self, session_id: &SessionId) -> Option<Arc<EventBus>> {
        self.event_buses.get(session_id).map(|e| e.clone())
    }

    /// Delivers an externally-sourced gate decision to the session's
    /// currently-awaiting gate, if any. Returns `false` if no gate is
    /// pending for this session (already timed out, already decided, or
    /// never raised).
    pub fn decide_gate(&self, session_id: &SessionId, decision: GateDecision) -> bool {
        match self.pending_gates.remove(session_id) {
            Some((_, tx)) => tx.send(decision).is_ok(),
            None => false,
        }
    }

    /// `run(topic, options) -> session_id` (§4.1).
    pub async fn run(
        &self,
        topic: String,
        options: PipelineOptions,
        cancellation: CancellationToken,
    ) -> Result<SessionId> {
        let mode: Mode = plan_mode::infer_mode(&topic, options.mode).into();
        let session_id = SessionId::new();
        let mut session = Session::new(session_id.clone(), topic, options.output_language.clone(), mode, chrono::Utc::now());
        let bus = Arc::new(EventBus::new(session_id.clone()));
        self.event_buses.insert(session_id.clone(), bus.clone());

        let result = self.drive(&mut session, &options, &bus, &cancellation).await;

        match &result {
            Ok(()) => bus.publish(Event::Complete),
            Err(err) => {
                if err.is_cancellation() {
                    session.cancel();
                } else {
                    session.fail(err.to_string());
                }
                bus.publish(Event::Error { message: err.to_string() });
            }
        }
        self.deps.repository.put_session(&session).await?;
        bus.publish(Event::Done {
            state: format!("{:?}", session.phase),
        });

        result.map(|_| session_id)
    }

    /// `resume(session_id) -> ()` (§4.1): reconstructs from the latest
    /// checkpoint and continues from the next phase. Checkpoints are
    /// advisory — a missing or corrupt one falls back to the phase the
    /// persisted session itself recorded.
    pub async fn resume(&self, session_id: SessionId, cancellation: CancellationToken) -> Result<()> {
        let mut session = self
            .deps
            .repository
            .get_session(&session_id)
            .await?
            .ok_or_else(|| PipelineError::Repository(format!("no session {session_id}")))?;

        let bus = self
            .event_buses
            .entry(session_id.clone())
            .or_insert_with(|| Arc::new(EventBus::new(session_id.clone())))
            .clone();

        let options = PipelineOptions {
            mode: Some(session.mode),
            ..Default::default()
        };

        let resume_phase = session
            .phase
            .next_in(Phase::sequence_for(session.mode))
            .unwrap_or(session.phase);

        let result = self
            .drive_from(&mut session, resume_phase, &options, &bus, &cancellation)
            .await;

        match &result {
            Ok(()) => bus.publish(Event::Complete),
            Err(err) => {
                if err.is_cancellation() {
                    session.cancel();
                } else {
                    session.fail(err.to_string());
                }
                bus.publish(Event::Error { message: err.to_string() });
            }
        }
        self.deps.repository.put_session(&session).await?;
        bus.publish(Event::Done {
            state: format!("{:?}", session.phase),
        });
        Ok(())
    }

    async fn drive(
        &self,
        session: &mut Session,
        options: &PipelineOptions,
        bus: &EventBus,
        cancellation: &CancellationToken,
    ) -> Result<()> {
        let first = Phase::sequence_for(session.mode)[1];
        self.drive_from(session, first, options, bus, cancellation).await
    }

    /// Drives `session` from `start_phase` through `COMPLETE` (or until a
    /// gate pauses it, a cancellation lands, or a phase fails).
    async fn drive_from(
        &self,
        session: &mut Session,
        start_phase: Phase,
        options: &PipelineOptions,
        bus: &EventBus,
        cancellation: &CancellationToken,
    ) -> Result<()> {
        let sequence = Phase::sequence_for(session.mode);
        let mut phase = start_phase;
        loop {
            if cancellation.is_cancelled() {
                self.checkpoints
                    .write(&session.id, session.phase, &CheckpointStore::cancelled_checkpoint())
                    .await;
                return Err(PipelineError::Cancelled(session.phase));
            }

            let from = session.phase;
            self.run_phase(session, phase, options, bus, cancellation).await?;
            session.advance_to(phase);
            bus.publish(Event::StateChange { from, to: phase });

            if phase == Phase::Complete {
                session.complete();
                return Ok(());
            }
            match phase.next_in(sequence) {
                Some(next) => phase = next,
                None => return Ok(()),
            }
        }
    }

    async fn run_phase(
        &self,
        session: &mut Session,
        phase: Phase,
        options: &PipelineOptions,
        bus: &EventBus,
        cancellation: &CancellationToken,
    ) -> Result<()> {
        match phase {
            Phase::Idle => Ok(()),
            Phase::Planning => self.run_planning(session, bus).await,
            Phase::Collection => self.run_collection(session, options, bus).await,
            Phase::Dedup => self.run_dedup(session, options).await,
            Phase::Persist => self.run_persist(session).await,
            Phase::Screening => self.run_screening(session, options, bus).await,
            Phase::GatePdf => self.run_gate_pdf(session, options, bus).await,
            Phase::PdfLoading => self.run_pdf_loading(session, cancellation, bus).await,
            Phase::EvidenceExtraction => self.run_evidence_extraction(session, options, bus).await,
            Phase::Clustering => self.run_clustering(session, options).await,
            Phase::Taxonomy => self.run_taxonomy(session, bus).await,
            Phase::ClaimGeneration => self.run_claim_generation(session, bus).await,
            Phase::GapMining => self.run_gap_mining(session, bus).await,
            Phase::GroundedWriting => self.run_grounded_writing(session, options).await,
            Phase::CitationAudit => self.run_citation_audit(session, options).await,
            Phase::Publish => self.run_publish(session).await,
            Phase::Complete | Phase::Failed => Ok(()),
        }
    }

    async fn run_planning(&self, session: &mut Session, bus: &EventBus) -> Result<()> {
        let mode = match session.mode {
            Mode::Quick => plan_mode::Mode::Quick,
            Mode::Full => plan_mode::Mode::Full,
        };
        let plan = self.plan_generator.generate(&session.topic, mode).await;
        bus.publish(Event::Plan { plan: plan.clone() });
        session.plan = Some(plan);
        Ok(())
    }

    async fn run_collection(&self, session: &mut Session, options: &PipelineOptions, bus: &EventBus) -> Result<()> {
        let Some(plan) = &mut session.plan else {
            return Ok(());
        };
        let mut steps = plan.steps.clone();
        let records = self
            .deps
            .plan_executor
            .run_research_steps(&mut steps, options.max_papers_total)
            .await;
        session.plan = Some(crate::model::Plan { steps });

        let paper_ids: Vec<PaperId> = records
            .into_iter()
            .map(|record| self.registry.put(record_to_paper(record)))
            .collect();

        bus.publish(Event::PapersCollected {
            papers: paper_ids.clone(),
            count: paper_ids.len(),
        });
        session.paper_ids = paper_ids;
        Ok(())
    }

    async fn run_dedup(&self, session: &mut Session, options: &PipelineOptions) -> Result<()> {
        let papers = self.registry.get_many(&session.paper_ids);
        let mut unique = crate::dedup::Deduplicator::dedup(papers);

        unique.sort_by(|a, b| {
            b.relevance_score
                .unwrap_or(0.0)
                .partial_cmp(&a.relevance_score.unwrap_or(0.0))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        unique.truncate(options.max_papers_total);

        session.paper_ids = unique.iter().map(|p| p.id.clone()).collect();

        if phases::empty_corpus_is_fatal(session) {
            return Err(PipelineError::Repository("empty_corpus".to_string()));
        }
        Ok(())
    }

    async fn run_persist(&self, session: &mut Session) -> Result<()> {
        self.deps.repository.put_session(session).await?;
        for paper_id in &session.paper_ids {
            self.deps.repository.put_paper_ref(&session.id, paper_id).await?;
        }
        self.checkpoints
            .write(
                &session.id,
                Phase::Persist,
                &Checkpoint {
                    paper_ids: session.paper_ids.clone(),
                    ..Default::default()
                },
            )
            .await;
        Ok(())
    }

    async fn run_screening(&self, session: &mut Session, options: &PipelineOptions, bus: &EventBus) -> Result<()> {
        let papers = self.registry.get_many(&session.paper_ids);
        // Screener is wired via LLM at construction time by the caller in
        // `main.rs`; orchestrated phases reach for it indirectly through
        // `Screener::new` here so every call gets fresh batching options.
        let screener = Screener::new(self.deps.llm.clone(), options.screening_batch_size);
        let records = screener.screen(&session.topic, &papers).await;

        let mut included = 0usize;
        let mut excluded = 0usize;
        let mut reasons: HashMap<String, usize> = HashMap::new();
        for record in &records {
            self.deps.repository.put_screening_record(&session.id, record).await?;
            if record.include() {
                included += 1;
                let score = record.relevance_score;
                self.registry.update(&record.paper_id, |p| {
                    p.status = PaperStatus::Screened;
                    p.relevance_score = Some(score);
                });
            } else {
                excluded += 1;
            }
            *reasons.entry(format!("{:?}", record.reason_code)).or_insert(0) += 1;
        }
        bus.publish(Event::ScreeningSummary {
            included,
            excluded,
            reasons: serde_json::to_value(&reasons).unwrap_or(serde_json::Value::Null),
        });
        Ok(())
    }

    /// Raises one gate (§4.13): parks a `pending_approval` on the session,
    /// publishes `approval_required`, and blocks on the decision (or its
    /// timeout). The caller interprets the returned `GateDecision`.
    async fn raise_gate(&self, session: &mut Session, bus: &EventBus, gate: GateKind, context: serde_json::Value) -> GateDecision {
        session.pending_approval = Some(crate::model::session::PendingApproval {
            gate,
            context: context.clone(),
            raised_at: chrono::Utc::now(),
        });

        let (tx, rx) = tokio::sync::oneshot::channel();
        self.pending_gates.insert(session.id.clone(), tx);
        bus.publish(Event::ApprovalRequired {
            gate: self.gate_manager.context_for(gate, context),
        });

        let decision = self.gate_manager.await_decision(rx).await;
        self.pending_gates.remove(&session.id);
        session.pending_approval = None;
        decision
    }

    /// The papers included at screening (§4.5 selection policy: tier ∈
    /// {core, background}), as registry records rather than ids, for the
    /// gate predicates that need relevance or URLs.
    async fn included_papers(&self, session: &Session) -> Result<Vec<Paper>> {
        let records = self.deps.repository.list_screening_records(&session.id).await?;
        let included_ids: HashSet<PaperId> = records.iter().filter(|r| r.include()).map(|r| r.paper_id.clone()).collect();
        Ok(self
            .registry
            .get_many(&session.paper_ids)
            .into_iter()
            .filter(|p| included_ids.contains(&p.id))
            .collect())
    }

    /// Hosts reached by an included paper's landing or PDF URL that aren't
    /// among the pipeline's own known-safe source hosts (§4.13 `external_crawl`).
    fn unsafe_hosts(papers: &[Paper]) -> Vec<String> {
        let mut hosts = HashSet::new();
        for paper in papers {
            for url_str in [Some(&paper.landing_url), paper.pdf_url.as_ref()].into_iter().flatten() {
                if let Ok(parsed) = url::Url::parse(url_str) {
                    if let Some(host) = parsed.host_str() {
                        if !crate::gate::KNOWN_SAFE_HOSTS.contains(&host) {
                            hosts.insert(host.to_string());
                        }
                    }
                }
            }
        }
        hosts.into_iter().collect()
    }

    /// Phase-wise projected token use across the remaining LLM-calling
    /// phases (§4.13 `token_budget` context: "phase-wise projection"),
    /// estimated from the text each included paper will be fed through.
    fn project_remaining_token_use(papers: &[Paper]) -> (u64, serde_json::Value) {
        const CLAIM_GENERATION_TOKENS_PER_PAPER: u64 = 400;
        const CITATION_AUDIT_TOKENS_PER_PAPER: u64 = 250;

        let evidence_extraction: u64 = papers
            .iter()
            .map(|p| crate::llm::estimate_tokens(&p.abstract_text) * 2)
            .sum();
        let claim_generation = (papers.len() as u64) * CLAIM_GENERATION_TOKENS_PER_PAPER;
        let citation_audit = (papers.len() as u64) * CITATION_AUDIT_TOKENS_PER_PAPER;
        let total = evidence_extraction + claim_generation + citation_audit;
        let projection = serde_json::json!({
            "evidence_extraction": evidence_extraction,
            "claim_generation": claim_generation,
            "citation_audit": citation_audit,
        });
        (total, projection)
    }

    /// §4.13: evaluates all three gate predicates after screening —
    /// `pdf_download`, `external_crawl`, `token_budget` — raising each that
    /// triggers and honoring approve/skip/cancel before the pipeline moves
    /// on to downloading PDFs.
    async fn run_gate_pdf(&self, session: &mut Session, options: &PipelineOptions, bus: &EventBus) -> Result<()> {
        let mut included = self.included_papers(session).await?;

        if self
            .gate_manager
            .pdf_download_triggered(included.len(), 1, options.max_pdf_download as u64)
        {
            let context = serde_json::json!({
                "included_count": included.len(),
                "threshold": options.max_pdf_download,
                "example_urls": included.iter().filter_map(|p| p.pdf_url.clone()).take(5).collect::<Vec<_>>(),
            });
            match self.raise_gate(session, bus, GateKind::PdfDownload, context).await {
                GateDecision::Approve => {}
                GateDecision::Skip => {
                    // Top-N by relevance downloaded, rest marked `pdf_skipped`
                    // rather than dropped from the session (S5(b)).
                    included.sort_by(|a, b| {
                        b.relevance_score
                            .unwrap_or(0.0)
                            .partial_cmp(&a.relevance_score.unwrap_or(0.0))
                            .unwrap_or(std::cmp::Ordering::Equal)
                    });
                    let skipped: Vec<PaperId> = included.iter().skip(options.max_pdf_download).map(|p| p.id.clone()).collect();
                    for paper_id in &skipped {
                        self.registry.update(paper_id, |p| p.pdf_skipped = true);
                    }
                    if !skipped.is_empty() {
                        bus.publish(Event::Progress {
                            phase: Phase::GatePdf,
                            phase_index: phase_index(Phase::GatePdf),
                            current: 0,
                            total: included.len(),
                            message: format!("{} papers marked pdf_skipped past the download threshold", skipped.len()),
                            warn: true,
                            slow: false,
                        });
                    }
                }
                GateDecision::Cancel => return Err(PipelineError::Cancelled(Phase::GatePdf)),
            }
        }

        let unsafe_hosts = Self::unsafe_hosts(&included);
        if self.gate_manager.external_crawl_triggered(&unsafe_hosts, crate::gate::KNOWN_SAFE_HOSTS) {
            let context = serde_json::json!({ "hosts": unsafe_hosts });
            match self.raise_gate(session, bus, GateKind::ExternalCrawl, context).await {
                GateDecision::Approve => {}
                GateDecision::Skip => {
                    // Degrade: don't crawl the unsafe hosts, fall back to
                    // the abstract for those papers (§4.6 abstract fallback).
                    let mut skipped_count = 0usize;
                    for paper in &included {
                        let crosses_unsafe_host = [Some(&paper.landing_url), paper.pdf_url.as_ref()]
                            .into_iter()
                            .flatten()
                            .filter_map(|u| url::Url::parse(u).ok())
                            .any(|u| u.host_str().is_some_and(|h| unsafe_hosts.iter().any(|unsafe_host| unsafe_host == h)));
                        if crosses_unsafe_host {
                            self.registry.update(&paper.id, |p| p.pdf_skipped = true);
                            skipped_count += 1;
                        }
                    }
                    if skipped_count > 0 {
                        bus.publish(Event::Progress {
                            phase: Phase::GatePdf,
                            phase_index: phase_index(Phase::GatePdf),
                            current: 0,
                            total: included.len(),
                            message: format!("{skipped_count} papers marked pdf_skipped (unsafe host)"),
                            warn: true,
                            slow: false,
                        });
                    }
                }
                GateDecision::Cancel => return Err(PipelineError::Cancelled(Phase::GatePdf)),
            }
        }

        let (projected, phase_projection) = Self::project_remaining_token_use(&included);
        if self.gate_manager.token_budget_triggered(projected, options.token_budget) {
            let context = serde_json::json!({
                "projected_total": projected,
                "token_budget": options.token_budget,
                "phase_projection": phase_projection,
            });
            match self.raise_gate(session, bus, GateKind::TokenBudget, context).await {
                GateDecision::Approve => {}
                GateDecision::Skip => {
                    // Degrade: drop the lowest-relevance included papers
                    // until the projection fits the remaining budget; papers
                    // excluded at screening are untouched either way.
                    included.sort_by(|a, b| {
                        b.relevance_score
                            .unwrap_or(0.0)
                            .partial_cmp(&a.relevance_score.unwrap_or(0.0))
                            .unwrap_or(std::cmp::Ordering::Equal)
                    });
                    let original_ids: HashSet<PaperId> = included.iter().map(|p| p.id.clone()).collect();
                    let mut kept_ids: HashSet<PaperId> = HashSet::new();
                    let mut running_total = 0u64;
                    for paper in &included {
                        let cost = crate::llm::estimate_tokens(&paper.abstract_text) * 2 + 650;
                        if running_total + cost > options.token_budget {
                            continue;
                        }
                        running_total += cost;
                        kept_ids.insert(paper.id.clone());
                    }
                    let dropped_ids: HashSet<PaperId> = original_ids.difference(&kept_ids).cloned().collect();
                    if !dropped_ids.is_empty() {
                        session.paper_ids.retain(|id| !dropped_ids.contains(id));
                        bus.publish(Event::Progress {
                            phase: Phase::GatePdf,
                            phase_index: phase_index(Phase::GatePdf),
                            current: 0,
                            total: original_ids.len(),
                            message: format!("{} papers dropped to fit the token budget", dropped_ids.len()),
                            warn: true,
                            slow: false,
                        });
                    }
                }
                GateDecision::Cancel => return Err(PipelineError::Cancelled(Phase::GatePdf)),
            }
        }
        Ok(())
    }

    async fn run_pdf_loading(&self, session: &mut Session, cancellation: &CancellationToken, bus: &EventBus) -> Result<()> {
        let total = session.paper_ids.len();
        for (current, paper_id) in session.paper_ids.clone().into_iter().enumerate() {
            if cancellation.is_cancelled() {
                return Err(PipelineError::Cancelled(Phase::PdfLoading));
            }
            let Some(paper) = self.registry.get(&paper_id) else { continue };
            if paper.pdf_skipped {
                // Gate-skipped (§4.13 pdf_download/external_crawl): never
                // downloaded; extraction falls back to the abstract.
                continue;
            }
            let Some(pdf_url) = &paper.pdf_url else { continue };

            match self.deps.pdf_loader.load(pdf_url).await {
                Some(loaded) => {
                    self.registry.update(&paper_id, |p| {
                        p.status = PaperStatus::Fulltext;
                        p.pdf_hash = Some(loaded.pdf_hash.clone());
                        p.page_map = Some(loaded.page_map.clone());
                    });
                }
                None => {
                    // On fetch/parse failure the paper simply stays without a
                    // page map; extraction later falls back to the abstract
                    // (§4.6), but the phase continues rather than fails (§7).
                    bus.publish(Event::Progress {
                        phase: Phase::PdfLoading,
                        phase_index: phase_index(Phase::PdfLoading),
                        current,
                        total,
                        message: format!("pdf unavailable for {}", paper.title),
                        warn: true,
                        slow: false,
                    });
                }
            }
        }
        Ok(())
    }

    /// Looks up the full text produced by `PdfLoading` for `pdf_url`, via
    /// the same `pdf:<url>` cache entry `PdfLoader::load` already populated
    /// (§4.4, §4.6) — avoids re-fetching or re-parsing the PDF.
    async fn load_cached_pdf(&self, pdf_url: &str) -> Option<LoadedPdf> {
        let cached = self.deps.cache.get(&crate::cache::pdf_pages_key(pdf_url)).await?;
        serde_json::from_slice(&cached).ok()
    }

    /// The text an extraction call would run against for `paper`: the full
    /// text if a page map was already loaded, else the abstract (§4.7).
    async fn extraction_source_text(&self, paper: &Paper) -> (String, Option<LoadedPdf>) {
        let loaded = match &paper.pdf_url {
            Some(pdf_url) if paper.page_map.is_some() => self.load_cached_pdf(pdf_url).await,
            _ => None,
        };
        let text = match &loaded {
            Some(loaded) => loaded.full_text.clone(),
            None => paper.abstract_text.clone(),
        };
        (text, loaded)
    }

    /// Runs one paper through the extractor and persists the result (§4.7).
    /// Token accounting for the call is the caller's responsibility.
    async fn extract_one(
        &self,
        session: &Session,
        bus: &EventBus,
        extractor: &EvidenceExtractor,
        paper: &Paper,
        source_text: &str,
        loaded: Option<&LoadedPdf>,
        current: usize,
        total: usize,
    ) -> Result<()> {
        let source_url = paper.pdf_url.clone().unwrap_or_else(|| paper.landing_url.clone());
        let page_map = loaded.map(|l| l.page_map.as_slice());

        match extractor.extract(paper.id.clone(), source_text, page_map, &source_url).await {
            ExtractionOutcome::Extracted { card, spans } => {
                bus.publish(Event::Evidence {
                    paper_title: paper.title.clone(),
                    spans_count: spans.len(),
                    sample_snippet: spans.first().map(|s| s.snippet.clone()).unwrap_or_default(),
                });
                for span in &spans {
                    self.deps.repository.put_evidence_span(&session.id, span).await?;
                }
                self.deps.repository.put_study_card(&session.id, &card).await?;
                self.registry.update(&paper.id, |p| p.status = PaperStatus::Extracted);
            }
            ExtractionOutcome::Failed => {
                // §4.7: excluded from downstream synthesis; the phase continues.
                bus.publish(Event::Progress {
                    phase: Phase::EvidenceExtraction,
                    phase_index: phase_index(Phase::EvidenceExtraction),
                    current,
                    total,
                    message: format!("extraction failed for {}", paper.title),
                    warn: true,
                    slow: false,
                });
            }
        }
        Ok(())
    }

    /// §5: "an extraction task that would exceed the remaining budget is
    /// deferred to the next round and, if still over, the session triggers
    /// the `token_budget` gate." Each call is metered against a per-session
    /// running counter before it's made.
    async fn run_evidence_extraction(&self, session: &mut Session, options: &PipelineOptions, bus: &EventBus) -> Result<()> {
        let extractor = EvidenceExtractor::new(self.deps.llm.clone());
        let total = session.paper_ids.len();
        let mut deferred: Vec<PaperId> = Vec::new();

        for (current, paper_id) in session.paper_ids.clone().into_iter().enumerate() {
            let Some(paper) = self.registry.get(&paper_id) else { continue };
            let (source_text, loaded) = self.extraction_source_text(&paper).await;
            let estimated = crate::llm::estimate_tokens(&source_text) * 2;

            if session.token_usage.saturating_add(estimated) > options.token_budget {
                deferred.push(paper_id.clone());
                bus.publish(Event::Progress {
                    phase: Phase::EvidenceExtraction,
                    phase_index: phase_index(Phase::EvidenceExtraction),
                    current,
                    total,
                    message: format!("deferring extraction for {} (token budget)", paper.title),
                    warn: true,
                    slow: false,
                });
                continue;
            }
            session.token_usage += estimated;
            self.extract_one(session, bus, &extractor, &paper, &source_text, loaded.as_ref(), current, total)
                .await?;
        }

        if deferred.is_empty() {
            return Ok(());
        }

        let mut still_over = Vec::new();
        for paper_id in &deferred {
            let Some(paper) = self.registry.get(paper_id) else { continue };
            let (source_text, loaded) = self.extraction_source_text(&paper).await;
            let estimated = crate::llm::estimate_tokens(&source_text) * 2;
            if session.token_usage.saturating_add(estimated) > options.token_budget {
                still_over.push((paper, source_text, loaded));
                continue;
            }
            session.token_usage += estimated;
            self.extract_one(session, bus, &extractor, &paper, &source_text, loaded.as_ref(), total, total)
                .await?;
        }

        if still_over.is_empty() {
            return Ok(());
        }

        let context = serde_json::json!({
            "deferred_count": still_over.len(),
            "token_usage": session.token_usage,
            "token_budget": options.token_budget,
        });
        match self.raise_gate(session, bus, GateKind::TokenBudget, context).await {
            GateDecision::Approve => {
                for (paper, source_text, loaded) in &still_over {
                    let estimated = crate::llm::estimate_tokens(source_text) * 2;
                    session.token_usage += estimated;
                    self.extract_one(session, bus, &extractor, paper, source_text, loaded.as_ref(), total, total)
                        .await?;
                }
            }
            GateDecision::Skip => {
                for (paper, ..) in &still_over {
                    bus.publish(Event::Progress {
                        phase: Phase::EvidenceExtraction,
                        phase_index: phase_index(Phase::EvidenceExtraction),
                        current: total,
                        total,
                        message: format!("extraction skipped for {} (token budget exhausted)", paper.title),
                        warn: true,
                        slow: false,
                    });
                }
            }
            GateDecision::Cancel => return Err(PipelineError::Cancelled(Phase::EvidenceExtraction)),
        }
        Ok(())
    }

    async fn run_clustering(&self, session: &mut Session, options: &PipelineOptions) -> Result<()> {
        let cards = self.deps.repository.list_study_cards(&session.id).await?;
        let card_pairs: Vec<(CardId, StudyCard)> = cards
            .into_iter()
            .map(|card| (CardId::from_raw(card.paper_id.as_str()), card))
            .collect();
        let clusterer = Clusterer::new(self.deps.embedder.clone(), options.min_cluster_size);
        let themes = clusterer.cluster(&card_pairs).await;

        self.checkpoints
            .write(
                &session.id,
                Phase::Clustering,
                &Checkpoint {
                    paper_ids: session.paper_ids.clone(),
                    ..Default::default()
                },
            )
            .await;
        let _ = themes;
        Ok(())
    }

    async fn run_taxonomy(&self, session: &mut Session, bus: &EventBus) -> Result<()> {
        // Recomputed here and again in `run_grounded_writing` (same
        // re-derivation convention as `cluster_cards`); this phase's own
        // purpose is to publish the matrix consumers watch for.
        let (cards, themes) = self.cluster_cards(session).await?;
        let cards_by_id: HashMap<CardId, StudyCard> = cards
            .into_iter()
            .map(|card| (CardId::from_raw(card.paper_id.as_str()), card))
            .collect();
        let matrix = TaxonomyBuilder::build(&themes, &cards_by_id);
        bus.publish(Event::Taxonomy {
            matrix: serde_json::to_value(&matrix).unwrap_or(serde_json::Value::Null),
        });
        Ok(())
    }

    async fn run_claim_generation(&self, session: &mut Session, bus: &EventBus) -> Result<()> {
        let cards = self.deps.repository.list_study_cards(&session.id).await?;
        let spans = self.deps.repository.list_evidence_spans(&session.id).await?;
        let known_span_ids: HashSet<_> = spans.iter().map(|s| s.span_id.clone()).collect();

        let card_pairs: Vec<(CardId, StudyCard)> = cards
            .iter()
            .cloned()
            .map(|card| (CardId::from_raw(card.paper_id.as_str()), card))
            .collect();
        let clusterer = Clusterer::new(self.deps.embedder.clone(), crate::clustering::MIN_CLUSTER_SIZE);
        let themes = clusterer.cluster(&card_pairs).await;

        let generator = ClaimGenerator::new(self.deps.llm.clone());
        let mut generated_ids = Vec::new();
        for theme in &themes {
            let theme_cards: Vec<StudyCard> = theme
                .card_ids
                .iter()
                .filter_map(|id| cards.iter().find(|c| c.paper_id.as_str() == id.as_str()).cloned())
                .collect();
            let claims = generator.generate_for_theme(&theme.name, &theme_cards, &known_span_ids).await;
            for claim in &claims {
                self.deps.repository.put_claim(&session.id, claim).await?;
                generated_ids.push(claim.id.clone());
            }
        }
        bus.publish(Event::Claims { claims: generated_ids });
        Ok(())
    }

    /// Builds the theme clustering (§4.8) from the session's current study
    /// cards. Recomputed fresh rather than threaded from `Clustering`
    /// through in-memory state, matching the orchestrator's convention of
    /// re-deriving per-phase inputs from the repository (§5 "it does not
    /// share mutable state between phases except through persisted
    /// artifacts").
    async fn cluster_cards(&self, session: &Session) -> Result<(Vec<StudyCard>, Vec<crate::clustering::ClusteredTheme>)> {
        let cards = self.deps.repository.list_study_cards(&session.id).await?;
        let card_pairs: Vec<(CardId, StudyCard)> = cards
            .iter()
            .cloned()
            .map(|card| (CardId::from_raw(card.paper_id.as_str()), card))
            .collect();
        let clusterer = Clusterer::new(self.deps.embedder.clone(), crate::clustering::MIN_CLUSTER_SIZE);
        let themes = clusterer.cluster(&card_pairs).await;
        Ok((cards, themes))
    }

    /// Mined again in `run_grounded_writing`, which needs the directions
    /// alongside claims and themes together (same recomputation convention
    /// as `cluster_cards`); this phase's own purpose is to publish them.
    async fn run_gap_mining(&self, session: &mut Session, bus: &EventBus) -> Result<()> {
        let (cards, themes) = self.cluster_cards(session).await?;
        let spans = self.deps.repository.list_evidence_spans(&session.id).await?;
        let gaps = Self::mine_gaps(&themes, &cards, &spans);
        bus.publish(Event::GapMining {
            gaps: serde_json::to_value(&gaps).unwrap_or(serde_json::Value::Null),
        });
        Ok(())
    }

    /// §4.10: merges all three gap sources (limitation frequency, taxonomy
    /// holes, cross-card contradictions) and ranks them.
    fn mine_gaps(
        themes: &[crate::clustering::ClusteredTheme],
        cards: &[StudyCard],
        spans: &[crate::model::EvidenceSpan],
    ) -> Vec<crate::gaps::GapDirection> {
        let cards_by_id: HashMap<CardId, StudyCard> = cards
            .iter()
            .cloned()
            .map(|card| (CardId::from_raw(card.paper_id.as_str()), card))
            .collect();
        let theme_sizes = crate::clustering::theme_card_counts(themes);
        let theme_by_card: HashMap<CardId, String> = themes
            .iter()
            .flat_map(|t| t.card_ids.iter().map(|id| (id.clone(), t.name.clone())))
            .collect();
        let cluster_size_by_card: HashMap<CardId, usize> = themes
            .iter()
            .flat_map(|t| t.card_ids.iter().map(|id| (id.clone(), t.card_ids.len())))
            .collect();

        let limitation_spans: Vec<(CardId, crate::model::EvidenceSpan)> = spans
            .iter()
            .filter(|s| s.field_tag == crate::model::FieldTag::Limitation)
            .map(|s| (CardId::from_raw(s.paper_id.as_str()), s.clone()))
            .collect();
        let mut gaps = GapMiner::from_limitations(&limitation_spans, &cluster_size_by_card);

        let matrix = TaxonomyBuilder::build(themes, &cards_by_id);
        let theme_card_counts: std::collections::BTreeMap<String, usize> =
            theme_sizes.iter().map(|(k, v)| (k.clone(), *v)).collect();
        let holes = matrix.holes(&theme_card_counts);
        let mut anchor_span_by_theme: HashMap<String, crate::ids::SpanId> = HashMap::new();
        for (card_id, span) in &limitation_spans {
            if let Some(theme) = theme_by_card.get(card_id) {
                anchor_span_by_theme.entry(theme.clone()).or_insert_with(|| span.span_id.clone());
            }
        }
        gaps.extend(GapMiner::from_holes(&holes, &anchor_span_by_theme));

        let directions = TaxonomyBuilder::infer_directions(&cards_by_id);
        let contradictions = TaxonomyBuilder::contradictions(themes, &directions);
        let mut anchor_span_by_card: HashMap<CardId, crate::ids::SpanId> = HashMap::new();
        for span in spans {
            anchor_span_by_card
                .entry(CardId::from_raw(span.paper_id.as_str()))
                .or_insert_with(|| span.span_id.clone());
        }
        gaps.extend(GapMiner::from_contradictions(&contradictions, &anchor_span_by_card));

        GapMiner::rank_and_truncate(gaps)
    }

    /// Assembles and persists the report (§4.11, §4.12). `claims_override`
    /// lets `run_citation_audit` regenerate the report from the post-repair
    /// claim set — the repository has no delete, so dropped claims would
    /// otherwise still show up in a `list_claims`-sourced report.
    async fn write_report(
        &self,
        session: &Session,
        options: &PipelineOptions,
        claims_override: Option<Vec<Claim>>,
    ) -> Result<Report> {
        let claims = match claims_override {
            Some(claims) => claims,
            None => self.deps.repository.list_claims(&session.id).await?,
        };
        let (cards, themes) = self.cluster_cards(session).await?;
        let spans = self.deps.repository.list_evidence_spans(&session.id).await?;
        let gaps = Self::mine_gaps(&themes, &cards, &spans);
        let papers: HashMap<PaperId, Paper> = self
            .registry
            .get_many(&session.paper_ids)
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect();

        let mut claims_by_theme: HashMap<String, Vec<Claim>> = HashMap::new();
        for claim in claims {
            claims_by_theme
                .entry(claim.theme_id.clone().unwrap_or_else(|| "miscellaneous".to_string()))
                .or_default()
                .push(claim);
        }
        let themes: Vec<String> = claims_by_theme.keys().cloned().collect();

        let dimensions = TaxonomyBuilder::dimensions(&cards);
        let comparative_pairs: Vec<(String, String)> = dimensions
            .iter()
            .cloned()
            .zip(dimensions.iter().cloned().skip(1))
            .collect();

        let limitation_summary = spans
            .iter()
            .filter(|s| s.field_tag == crate::model::FieldTag::Limitation)
            .map(|s| s.snippet.clone())
            .collect::<Vec<_>>()
            .join(" ");
        let spans_by_id: HashMap<_, _> = spans.into_iter().map(|s| (s.span_id.clone(), s)).collect();

        let report = if themes.is_empty() {
            GroundedWriter::write_insufficient_evidence(&session.topic, options.output_language.clone())
        } else {
            GroundedWriter::write(&ReportInputs {
                topic: &session.topic,
                themes: &themes,
                claims_by_theme: &claims_by_theme,
                papers: &papers,
                spans: &spans_by_id,
                comparative_pairs: &comparative_pairs,
                limitations_summary: &limitation_summary,
                gaps: &gaps,
                language: options.output_language.clone(),
            })
        };

        self.deps.repository.put_report(&session.id, &report).await?;
        Ok(report)
    }

    async fn run_grounded_writing(&self, session: &mut Session, options: &PipelineOptions) -> Result<()> {
        self.write_report(session, options, None).await?;
        Ok(())
    }

    async fn run_citation_audit(&self, session: &mut Session, options: &PipelineOptions) -> Result<()> {
        let claims = self.deps.repository.list_claims(&session.id).await?;
        if claims.is_empty() {
            return Ok(());
        }
        let spans = self.deps.repository.list_evidence_spans(&session.id).await?;
        let spans_by_id: HashMap<_, _> = spans.into_iter().map(|s| (s.span_id.clone(), s)).collect();

        let auditor = CitationAuditor::new(self.deps.llm.clone(), options.audit_pass_rate_floor);
        let sampled = auditor.sample(&claims);
        let sampled_ids: HashSet<_> = sampled.iter().map(|c| c.id.clone()).collect();
        let unsampled: Vec<Claim> = claims.iter().filter(|c| !sampled_ids.contains(&c.id)).cloned().collect();

        let mut audited = Vec::with_capacity(sampled.len());
        for claim in sampled {
            let supporting: Vec<_> = claim
                .evidence_span_ids
                .iter()
                .filter_map(|id| spans_by_id.get(id).cloned())
                .collect();
            let result = auditor.judge_and_repair(claim, &supporting).await;
            if !result.dropped {
                self.deps.repository.put_claim(&session.id, &result.claim).await?;
            }
            audited.push(result);
        }

        if auditor.floor_unmet(&audited) {
            return Err(PipelineError::Repository("audit_floor_unmet".to_string()));
        }

        // §4.12: the report already persisted in `GroundedWriting` must be
        // regenerated from the post-repair claim set, excluding anything the
        // auditor dropped.
        let mut surviving: Vec<Claim> = audited
            .into_iter()
            .filter(|a| !a.dropped)
            .map(|a| a.claim)
            .collect();
        surviving.extend(unsampled);
        self.write_report(session, options, Some(surviving)).await?;
        Ok(())
    }

    async fn run_publish(&self, session: &mut Session) -> Result<()> {
        self.deps.repository.check_referential_integrity(&session.id).await?;
        Ok(())
    }
}

fn record_to_paper(record: RawRecord) -> Paper {
    let first_author = record.authors.first().cloned().unwrap_or_default();
    let metadata_hash = format!(
        "{:x}",
        Md5::digest(format!("{}|{}", record.title.to_lowercase(), first_author.to_lowercase()).as_bytes())
    );
    Paper {
        id: PaperId::new(),
        title: record.title,
        authors: record.authors,
        published: record.published,
        source: record.source,
        arxiv_id: if record.source == SourceTag::Arxiv {
            Some(record.source_id)
        } else {
            None
        },
        doi: record.doi,
        abstract_text: record.abstract_text,
        pdf_url: record.pdf_url,
        landing_url: record.landing_url,
        status: PaperStatus::Raw,
        relevance_score: None,
        metadata_hash,
        pdf_hash: None,
        page_map: None,
        pdf_skipped: false,
    }
}

fn phase_index(phase: Phase) -> usize {
    Phase::FULL_SEQUENCE.iter().position(|p| *p == phase).unwrap_or(0)
}
