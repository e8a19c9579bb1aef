use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use briefing_models::{
    Brief, BriefConfig, EarningsForecast, EarningsPoint, FallbackReason, IssueKind,
    MarketSnapshot, Narrative, NewsDigest, NewsItem, PipelineConfig, Query, RetrievalResult,
    RetrievalSummary, Stage, StageIssue, StageReport, StageStatus, Symbol, SymbolStatus,
    BRIEF_SCHEMA_VERSION,
};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::charts::ChartBuilder;
use crate::earnings::{EarningsPredictor, MIN_HISTORY};
use crate::embedding::EmbeddingModel;
use crate::error::{with_timeout, AgentError, OrchestrationError};
use crate::llm::LanguageModel;
use crate::market_data::{MarketDataClient, MarketDataSource};
use crate::narrative::{fallback_narrative, NarrativeGenerator, NarrativeInput};
use crate::news::{NewsClient, NewsOutcome, NewsSource};
use crate::risk::RiskAnalyzer;
use crate::symbols::SymbolExtractor;
use crate::vector_index::VectorIndex;

/// External collaborators, injected explicitly.
#[derive(Clone)]
pub struct Providers {
    pub market_data: Arc<dyn MarketDataSource>,
    pub news: Arc<dyn NewsSource>,
    pub embedder: Arc<dyn EmbeddingModel>,
    pub llm: Arc<dyn LanguageModel>,
}

/// Everything fetched for one symbol during fan-out.
struct SymbolFetch {
    snapshot: Result<MarketSnapshot, AgentError>,
    earnings: Result<Vec<EarningsPoint>, AgentError>,
    news: NewsOutcome,
    elapsed: Duration,
}

/// The orchestrator routes a query through the agents and assembles a Brief.
pub struct Orchestrator {
    extractor: SymbolExtractor,
    market: MarketDataClient,
    news: NewsClient,
    embedder: Arc<dyn EmbeddingModel>,
    narrator: NarrativeGenerator,
    risk: RiskAnalyzer,
    predictor: EarningsPredictor,
    pipeline: PipelineConfig,
    stage_timeout: Duration,
}

impl Orchestrator {
    pub fn new(config: &BriefConfig, providers: Providers) -> Self {
        let pipeline = config.pipeline.clone();
        let stage_timeout = Duration::from_secs(pipeline.stage_timeout_seconds);

        Self {
            extractor: SymbolExtractor::new(&config.symbols),
            market: MarketDataClient::new(providers.market_data, stage_timeout, pipeline.history_days),
            news: NewsClient::new(
                providers.news,
                stage_timeout,
                config.providers.news.max_articles,
            ),
            embedder: providers.embedder,
            narrator: NarrativeGenerator::new(
                providers.llm,
                Duration::from_secs(pipeline.narrative_timeout_seconds),
                pipeline.max_prompt_chars,
            ),
            risk: RiskAnalyzer::new(&config.symbols.categories, &config.portfolio),
            predictor: EarningsPredictor::new(pipeline.forecast_horizon),
            pipeline,
            stage_timeout,
        }
    }

    /// Override per-call and narrative timeouts, mainly for sub-second tests.
    pub fn with_timeouts(mut self, stage: Duration, narrative: Duration) -> Self {
        self.market = self.market.with_timeout(stage);
        self.news = self.news.with_timeout(stage);
        self.narrator = self.narrator.with_timeout(narrative);
        self.stage_timeout = stage;
        self
    }

    pub fn extractor(&self) -> &SymbolExtractor {
        &self.extractor
    }

    pub async fn handle(&self, query: &Query) -> Result<Brief, OrchestrationError> {
        self.handle_with_cancellation(query, CancellationToken::new())
            .await
    }

    /// Like [`handle`](Self::handle), but abandons every in-flight call as
    /// soon as `cancel` fires.
    pub async fn handle_with_cancellation(
        &self,
        query: &Query,
        cancel: CancellationToken,
    ) -> Result<Brief, OrchestrationError> {
        let (stage_tx, stage_rx) = watch::channel(Stage::SymbolExtraction);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                let stage = *stage_rx.borrow();
                warn!(query_id = %query.id, stage = %stage, "Brief cancelled");
                Err(OrchestrationError::Cancelled { stage })
            }
            result = self.run(query, &stage_tx) => result,
        }
    }

    /// News for one symbol, including which path was taken.
    pub async fn debug_news(&self, symbol: &Symbol) -> NewsDigest {
        let name = self.extractor.display_name(symbol);
        let (snapshot, articles) =
            tokio::join!(self.market.snapshot(symbol), self.news.articles(symbol));
        self.news
            .resolve(symbol, &name, articles, snapshot.as_ref().ok())
            .digest
    }

    async fn run(
        &self,
        query: &Query,
        stage: &watch::Sender<Stage>,
    ) -> Result<Brief, OrchestrationError> {
        let start = Instant::now();
        info!(query_id = %query.id, "Starting brief");

        // 1. Symbol extraction
        let symbols = self.extractor.extract(query);
        if symbols.is_empty() {
            warn!(query_id = %query.id, "No symbols found in query");
            return Err(OrchestrationError::SymbolExtraction(query.text.clone()));
        }
        let names = self.extractor.display_names(&symbols);
        info!(query_id = %query.id, symbols = ?symbols, "Symbols resolved");

        // 2. Fan-out per symbol
        stage.send_replace(Stage::MarketData);
        let fetches = self.fan_out(&symbols, &names).await;

        let mut issues: Vec<StageIssue> = Vec::new();
        let mut snapshots: Vec<MarketSnapshot> = Vec::new();
        let mut missing_market_data: Vec<Symbol> = Vec::new();
        let mut news_items: Vec<NewsItem> = Vec::new();
        let mut histories: Vec<(Symbol, Vec<EarningsPoint>)> = Vec::new();
        let mut symbol_status: Vec<SymbolStatus> = Vec::new();
        let mut provider_news = 0usize;

        for (symbol, fetch) in symbols.iter().zip(fetches) {
            let market_status = match fetch.snapshot {
                Ok(snapshot) => {
                    snapshots.push(snapshot);
                    StageStatus::Ok
                }
                Err(e) => {
                    let quota = self.market.is_quota_error(&e);
                    issues.push(stage_issue(Stage::MarketData, Some(symbol), &e, quota, "quote"));
                    missing_market_data.push(symbol.clone());
                    StageStatus::Failed
                }
            };

            let earnings_status = match fetch.earnings {
                Ok(points) if points.len() >= MIN_HISTORY => {
                    histories.push((symbol.clone(), points));
                    StageStatus::Ok
                }
                Ok(points) => {
                    issues.push(StageIssue {
                        stage: Stage::Prediction,
                        symbol: Some(symbol.clone()),
                        kind: IssueKind::Empty,
                        detail: format!("{} earnings points, need {MIN_HISTORY}", points.len()),
                    });
                    StageStatus::Degraded
                }
                Err(e) => {
                    let quota = self.market.is_quota_error(&e);
                    issues.push(stage_issue(Stage::MarketData, Some(symbol), &e, quota, "earnings"));
                    StageStatus::Failed
                }
            };

            let NewsOutcome { digest, issue } = fetch.news;
            let news_status = if digest.is_fallback() {
                StageStatus::Failed
            } else {
                provider_news += 1;
                StageStatus::Ok
            };
            issues.extend(issue);
            news_items.extend(digest.items);

            let status = SymbolStatus::new(symbol.clone(), market_status, news_status, earnings_status);
            if status.overall != StageStatus::Ok {
                warn!(symbol = %symbol, status = ?status.overall, elapsed_ms = fetch.elapsed.as_millis(), "Symbol degraded");
            }
            symbol_status.push(status);
        }

        let mut stages = StageReport {
            market_data: StageStatus::from_counts(snapshots.len(), symbols.len()),
            news: StageStatus::from_counts(provider_news, symbols.len()),
            ..StageReport::default()
        };

        // 3. Retrieval confidence gating
        stage.send_replace(Stage::Retrieval);
        let (retrieval, retrieval_status) =
            self.retrieve(&query.text, &news_items, &mut issues).await;
        stages.retrieval = retrieval_status;

        // 4. Analysis and prediction
        stage.send_replace(Stage::Analysis);
        let (risk, holding_issues) = self.risk.assess(&snapshots, &query.holdings);
        if !holding_issues.is_empty() {
            stages.analysis = StageStatus::Degraded;
            issues.extend(holding_issues);
        }
        if risk.is_empty() {
            stages.analysis = StageStatus::Failed;
            issues.push(StageIssue {
                stage: Stage::Analysis,
                symbol: None,
                kind: IssueKind::Empty,
                detail: "no market data to analyze".to_string(),
            });
        }

        stage.send_replace(Stage::Prediction);
        let forecasts: Vec<EarningsForecast> = histories
            .iter()
            .map(|(symbol, points)| self.predictor.forecast(symbol, points))
            .collect();
        let insufficient_history: Vec<Symbol> = symbols
            .iter()
            .filter(|s| !histories.iter().any(|(h, _)| h == *s))
            .cloned()
            .collect();
        stages.prediction = StageStatus::from_counts(forecasts.len(), symbols.len());

        // 5. Narrative
        stage.send_replace(Stage::Narrative);
        let input = NarrativeInput {
            query: &query.text,
            symbols: &symbols,
            names: &names,
            context: &retrieval.results,
            risk: &risk,
            forecasts: &forecasts,
            missing_market_data: &missing_market_data,
            insufficient_history: &insufficient_history,
        };

        let gate = if retrieval.low_confidence {
            Some(FallbackReason::LowRetrievalConfidence)
        } else if provider_news == 0 {
            Some(FallbackReason::NewsUnavailable)
        } else if snapshots.is_empty() {
            Some(FallbackReason::MarketDataUnavailable)
        } else {
            None
        };

        let narrative = match gate {
            Some(reason) => {
                info!(query_id = %query.id, reason = ?reason, "Skipping language model, using template");
                Narrative::Fallback {
                    text: fallback_narrative(&input, reason),
                    reason,
                }
            }
            None => {
                let narrative = self.narrator.generate(&input).await;
                if let Some(kind) = narrative.fallback_reason().and_then(model_issue_kind) {
                    issues.push(StageIssue {
                        stage: Stage::Narrative,
                        symbol: None,
                        kind,
                        detail: narrative
                            .fallback_reason()
                            .map(|r| r.describe().to_string())
                            .unwrap_or_default(),
                    });
                }
                narrative
            }
        };
        if narrative.is_fallback() {
            stages.narrative = StageStatus::Degraded;
        }

        // 6. Assembly
        let charts = ChartBuilder::build(&snapshots, &forecasts, &risk);
        let brief = Brief {
            id: Uuid::new_v4(),
            schema_version: BRIEF_SCHEMA_VERSION,
            query_id: query.id,
            query: query.text.clone(),
            symbols,
            narrative,
            risk,
            forecasts,
            charts,
            symbol_status,
            stages,
            retrieval,
            issues,
            insufficient_history,
            generated_at: chrono::Utc::now(),
            processing_time_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            query_id = %query.id,
            symbols = brief.symbols.len(),
            fallback = brief.narrative.is_fallback(),
            issues = brief.issues.len(),
            elapsed_ms = brief.processing_time_ms,
            "Brief complete"
        );

        Ok(brief)
    }

    /// One task per symbol. Results come back in `symbols` order.
    async fn fan_out(
        &self,
        symbols: &[Symbol],
        names: &BTreeMap<Symbol, String>,
    ) -> Vec<SymbolFetch> {
        let mut tasks = JoinSet::new();

        for (idx, symbol) in symbols.iter().enumerate() {
            let market = self.market.clone();
            let news = self.news.clone();
            let symbol = symbol.clone();
            let name = display_name(names, &symbol);

            tasks.spawn(async move {
                let task_start = Instant::now();
                let (snapshot, earnings, articles) = tokio::join!(
                    market.snapshot(&symbol),
                    market.earnings(&symbol),
                    news.articles(&symbol),
                );
                let outcome = news.resolve(&symbol, &name, articles, snapshot.as_ref().ok());
                (
                    idx,
                    SymbolFetch {
                        snapshot,
                        earnings,
                        news: outcome,
                        elapsed: task_start.elapsed(),
                    },
                )
            });
        }

        let mut slots: Vec<Option<SymbolFetch>> = symbols.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, fetch)) => {
                    info!(
                        symbol = %symbols[idx],
                        market_data = fetch.snapshot.is_ok(),
                        news_path = ?fetch.news.digest.path,
                        elapsed_ms = fetch.elapsed.as_millis(),
                        "Symbol fetch finished"
                    );
                    slots[idx] = Some(fetch);
                }
                Err(e) => {
                    error!(error = %e, "Symbol task panicked");
                }
            }
        }

        symbols
            .iter()
            .zip(slots)
            .map(|(symbol, slot)| slot.unwrap_or_else(|| self.aborted_fetch(symbol, names)))
            .collect()
    }

    fn aborted_fetch(&self, symbol: &Symbol, names: &BTreeMap<Symbol, String>) -> SymbolFetch {
        let reason = || AgentError::Task(format!("fetch task for {symbol} did not complete"));
        SymbolFetch {
            snapshot: Err(reason()),
            earnings: Err(reason()),
            news: self
                .news
                .resolve(symbol, &display_name(names, symbol), Err(reason()), None),
            elapsed: Duration::ZERO,
        }
    }

    async fn retrieve(
        &self,
        query_text: &str,
        items: &[NewsItem],
        issues: &mut Vec<StageIssue>,
    ) -> (RetrievalSummary, StageStatus) {
        let threshold = self.pipeline.confidence_threshold;
        let mut index = VectorIndex::new(Arc::clone(&self.embedder));

        let results: Result<Vec<RetrievalResult>, AgentError> = async {
            with_timeout(self.stage_timeout, index.insert(items)).await?;
            with_timeout(
                self.stage_timeout,
                index.query(query_text, self.pipeline.retrieval_k),
            )
            .await
        }
        .await;

        match results {
            Ok(results) => {
                let summary = RetrievalSummary::from_results(results, threshold);
                info!(
                    chunks = items.len(),
                    confidence = summary.confidence,
                    low_confidence = summary.low_confidence,
                    "Retrieval complete"
                );
                let status = if summary.low_confidence {
                    StageStatus::Degraded
                } else {
                    StageStatus::Ok
                };
                (summary, status)
            }
            Err(e) => {
                let quota = self.embedder.is_quota_error(&e);
                warn!(error = %e, "Retrieval failed");
                issues.push(stage_issue(Stage::Retrieval, None, &e, quota, "embedding"));
                (
                    RetrievalSummary::from_results(Vec::new(), threshold),
                    StageStatus::Failed,
                )
            }
        }
    }
}

fn display_name(names: &BTreeMap<Symbol, String>, symbol: &Symbol) -> String {
    names
        .get(symbol)
        .cloned()
        .unwrap_or_else(|| symbol.to_string())
}

fn stage_issue(
    stage: Stage,
    symbol: Option<&Symbol>,
    err: &AgentError,
    is_quota: bool,
    what: &str,
) -> StageIssue {
    StageIssue {
        stage,
        symbol: symbol.cloned(),
        kind: err.issue_kind(is_quota),
        detail: format!("{what}: {err}"),
    }
}

/// Issue kind for a fallback caused by the language model itself.
fn model_issue_kind(reason: FallbackReason) -> Option<IssueKind> {
    match reason {
        FallbackReason::QuotaExceeded => Some(IssueKind::QuotaExceeded),
        FallbackReason::Timeout => Some(IssueKind::Timeout),
        FallbackReason::EmptyResponse => Some(IssueKind::Empty),
        FallbackReason::GenerationFailed => Some(IssueKind::Failed),
        FallbackReason::LowRetrievalConfidence
        | FallbackReason::NewsUnavailable
        | FallbackReason::MarketDataUnavailable => None,
    }
}
