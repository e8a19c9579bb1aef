//! End-to-end brief scenarios.
//!
//! Each test wires scripted providers into a real `Orchestrator` and checks
//! the assembled `Brief`: narrative provenance, stage flags, issues, risk
//! weights and forecasts.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use briefing_agents::test_support::{
    ScriptedEmbedder, ScriptedLanguageModel, StaticMarketData, StaticNews,
};
use briefing_agents::{OrchestrationError, Orchestrator, Providers};
use briefing_models::{
    BriefConfig, FallbackReason, ForecastStatus, IssueKind, Narrative, Query, Stage, StageStatus,
    Symbol,
};
use rust_decimal_macros::dec;
use tokio_util::sync::CancellationToken;

fn sym(raw: &str) -> Symbol {
    Symbol::parse(raw).unwrap()
}

fn two_symbol_market() -> StaticMarketData {
    StaticMarketData::new()
        .with_quote("AAPL", dec!(190), &[dec!(180), dec!(185), dec!(190)])
        .with_quote("MSFT", dec!(410), &[dec!(400), dec!(405), dec!(410)])
        .with_earnings("AAPL", &[(2020, 57.4), (2021, 94.7), (2022, 99.8), (2023, 97.0)])
        .with_earnings("MSFT", &[(2020, 44.3), (2021, 61.3), (2022, 72.7), (2023, 72.4)])
}

fn two_symbol_news() -> StaticNews {
    StaticNews::new()
        .with_article("AAPL", "Apple beats on services", "Services revenue hit a record.")
        .with_article("MSFT", "Microsoft cloud growth", "Azure grew 29% year over year.")
}

struct Harness {
    orchestrator: Orchestrator,
    llm: Arc<ScriptedLanguageModel>,
}

fn harness(
    market: StaticMarketData,
    news: StaticNews,
    similarity: f32,
    llm: ScriptedLanguageModel,
) -> Harness {
    let llm = Arc::new(llm);
    let providers = Providers {
        market_data: Arc::new(market),
        news: Arc::new(news),
        embedder: Arc::new(ScriptedEmbedder::with_similarity(similarity)),
        llm: llm.clone(),
    };
    Harness {
        orchestrator: Orchestrator::new(&BriefConfig::default(), providers),
        llm,
    }
}

#[tokio::test]
async fn two_symbols_produce_generated_brief() {
    let h = harness(
        two_symbol_market(),
        two_symbol_news(),
        0.8,
        ScriptedLanguageModel::reply("Tech exposure is concentrated in two megacaps."),
    );

    let brief = h
        .orchestrator
        .handle(&Query::new("Compare AAPL and MSFT earnings"))
        .await
        .unwrap();

    assert_eq!(brief.symbols, vec![sym("AAPL"), sym("MSFT")]);
    assert_eq!(
        brief.narrative,
        Narrative::Generated {
            text: "Tech exposure is concentrated in two megacaps.".to_string()
        }
    );
    assert_eq!(h.llm.call_count(), 1);

    assert_eq!(brief.risk.positions.len(), 2);
    assert!(brief.risk.is_normalized());
    assert!((brief.risk.exposure_by_category["technology"] - 1.0).abs() < 1e-9);

    assert_eq!(brief.forecasts.len(), 2);
    for forecast in &brief.forecasts {
        assert_eq!(forecast.status, ForecastStatus::Ok);
        assert_eq!(forecast.predicted.len(), 2);
        assert_eq!(forecast.predicted[0].period, 2024);
    }

    assert!(!brief.retrieval.low_confidence);
    assert!((brief.retrieval.confidence - 0.8).abs() < 1e-4);
    assert!(brief.issues.is_empty());
    assert!(brief.symbol_status.iter().all(|s| s.overall == StageStatus::Ok));
    assert!(!brief.charts.is_empty());
}

#[tokio::test]
async fn quota_exhaustion_falls_back_to_template() {
    let h = harness(
        two_symbol_market(),
        two_symbol_news(),
        0.8,
        ScriptedLanguageModel::quota_exceeded(),
    );

    let brief = h
        .orchestrator
        .handle(&Query::new("Compare AAPL and MSFT"))
        .await
        .unwrap();

    assert_eq!(brief.narrative.fallback_reason(), Some(FallbackReason::QuotaExceeded));
    let text = brief.narrative.text();
    assert!(text.contains("AAPL"));
    assert!(text.contains("MSFT"));
    assert!(text.contains("quota"));
    assert_eq!(brief.stages.narrative, StageStatus::Degraded);
    assert!(brief
        .issues
        .iter()
        .any(|i| i.stage == Stage::Narrative && i.kind == IssueKind::QuotaExceeded));
}

#[tokio::test]
async fn query_without_symbols_is_rejected() {
    let h = harness(
        two_symbol_market(),
        two_symbol_news(),
        0.8,
        ScriptedLanguageModel::reply("unused"),
    );

    let err = h
        .orchestrator
        .handle(&Query::new("hello there"))
        .await
        .unwrap_err();

    assert!(matches!(err, OrchestrationError::SymbolExtraction(_)));
    assert_eq!(err.stage(), Stage::SymbolExtraction);
    assert_eq!(h.llm.call_count(), 0);
}

#[tokio::test]
async fn one_market_data_failure_renormalizes_weights() {
    let h = harness(
        two_symbol_market().with_failure("MSFT"),
        two_symbol_news(),
        0.8,
        ScriptedLanguageModel::reply("Apple carries the whole book."),
    );

    let brief = h
        .orchestrator
        .handle(&Query::new("AAPL vs MSFT risk"))
        .await
        .unwrap();

    assert_eq!(brief.risk.positions.len(), 1);
    assert_eq!(brief.risk.weight_of(&sym("AAPL")), Some(1.0));
    assert_eq!(brief.risk.weight_of(&sym("MSFT")), None);
    assert_eq!(brief.stages.market_data, StageStatus::Degraded);

    let msft = brief
        .symbol_status
        .iter()
        .find(|s| s.symbol == sym("MSFT"))
        .unwrap();
    assert_eq!(msft.market_data, StageStatus::Failed);
    assert_eq!(msft.overall, StageStatus::Degraded);

    assert!(brief
        .issues
        .iter()
        .any(|i| i.stage == Stage::MarketData && i.symbol == Some(sym("MSFT"))));
    // The narrative still runs with partial data.
    assert!(!brief.narrative.is_fallback());
}

#[tokio::test]
async fn low_retrieval_confidence_skips_language_model() {
    let h = harness(
        two_symbol_market(),
        two_symbol_news(),
        0.3,
        ScriptedLanguageModel::reply("unused"),
    );

    let brief = h
        .orchestrator
        .handle(&Query::new("AAPL outlook"))
        .await
        .unwrap();

    assert!(brief.retrieval.low_confidence);
    assert_eq!(brief.stages.retrieval, StageStatus::Degraded);
    assert_eq!(
        brief.narrative.fallback_reason(),
        Some(FallbackReason::LowRetrievalConfidence)
    );
    assert_eq!(h.llm.call_count(), 0);
    // Gate-driven fallbacks are not model issues.
    assert!(brief.issues.iter().all(|i| i.stage != Stage::Narrative));
}

#[tokio::test]
async fn missing_news_uses_statistics_and_template() {
    let h = harness(
        two_symbol_market(),
        StaticNews::new(),
        0.9,
        ScriptedLanguageModel::reply("unused"),
    );

    let brief = h
        .orchestrator
        .handle(&Query::new("How are AAPL and MSFT trading?"))
        .await
        .unwrap();

    assert_eq!(brief.stages.news, StageStatus::Failed);
    assert_eq!(
        brief.narrative.fallback_reason(),
        Some(FallbackReason::NewsUnavailable)
    );
    assert_eq!(h.llm.call_count(), 0);
    assert!(brief
        .retrieval
        .results
        .iter()
        .all(|r| r.source.is_fallback));
    assert_eq!(
        brief
            .issues
            .iter()
            .filter(|i| i.stage == Stage::News && i.kind == IssueKind::Empty)
            .count(),
        2
    );
}

#[tokio::test]
async fn news_quota_is_classified_per_symbol() {
    let h = harness(
        two_symbol_market(),
        StaticNews::new().quota_exhausted(),
        0.9,
        ScriptedLanguageModel::reply("unused"),
    );

    let brief = h
        .orchestrator
        .handle(&Query::new("AAPL"))
        .await
        .unwrap();

    let issue = brief.issues.iter().find(|i| i.stage == Stage::News).unwrap();
    assert_eq!(issue.kind, IssueKind::QuotaExceeded);
    assert_eq!(issue.symbol, Some(sym("AAPL")));
}

#[tokio::test]
async fn all_market_data_failing_still_returns_brief() {
    let h = harness(
        StaticMarketData::new(),
        two_symbol_news(),
        0.9,
        ScriptedLanguageModel::reply("unused"),
    );

    let brief = h
        .orchestrator
        .handle(&Query::new("AAPL and MSFT exposure"))
        .await
        .unwrap();

    assert!(brief.risk.is_empty());
    assert_eq!(brief.stages.market_data, StageStatus::Failed);
    assert_eq!(brief.stages.analysis, StageStatus::Failed);
    assert_eq!(
        brief.narrative.fallback_reason(),
        Some(FallbackReason::MarketDataUnavailable)
    );
    assert!(brief
        .narrative
        .text()
        .contains("market data unavailable for AAPL, MSFT"));
    assert_eq!(h.llm.call_count(), 0);
}

#[tokio::test]
async fn slow_language_model_times_out() {
    let llm = Arc::new(ScriptedLanguageModel::slow(Duration::from_millis(500)));
    let providers = Providers {
        market_data: Arc::new(two_symbol_market()),
        news: Arc::new(two_symbol_news()),
        embedder: Arc::new(ScriptedEmbedder::with_similarity(0.8)),
        llm: llm.clone(),
    };
    let orchestrator = Orchestrator::new(&BriefConfig::default(), providers)
        .with_timeouts(Duration::from_secs(2), Duration::from_millis(50));

    let brief = orchestrator.handle(&Query::new("AAPL")).await.unwrap();

    assert_eq!(brief.narrative.fallback_reason(), Some(FallbackReason::Timeout));
    assert!(brief
        .issues
        .iter()
        .any(|i| i.stage == Stage::Narrative && i.kind == IssueKind::Timeout));
    assert_eq!(llm.call_count(), 1);
}

#[tokio::test]
async fn slow_market_data_times_out_per_symbol() {
    let providers = Providers {
        market_data: Arc::new(two_symbol_market().with_delay(Duration::from_millis(500))),
        news: Arc::new(two_symbol_news()),
        embedder: Arc::new(ScriptedEmbedder::with_similarity(0.8)),
        llm: Arc::new(ScriptedLanguageModel::reply("unused")),
    };
    let orchestrator = Orchestrator::new(&BriefConfig::default(), providers)
        .with_timeouts(Duration::from_millis(50), Duration::from_secs(1));

    let brief = orchestrator.handle(&Query::new("AAPL")).await.unwrap();

    assert_eq!(brief.stages.market_data, StageStatus::Failed);
    assert!(brief
        .issues
        .iter()
        .any(|i| i.stage == Stage::MarketData && i.kind == IssueKind::Timeout));
}

#[tokio::test]
async fn cancellation_reports_current_stage() {
    let h = harness(
        two_symbol_market().with_delay(Duration::from_secs(5)),
        two_symbol_news(),
        0.8,
        ScriptedLanguageModel::reply("unused"),
    );
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = h
        .orchestrator
        .handle_with_cancellation(&Query::new("AAPL"), cancel)
        .await
        .unwrap_err();

    match err {
        OrchestrationError::Cancelled { stage } => assert_eq!(stage, Stage::MarketData),
        other => panic!("expected cancellation, got {other:?}"),
    }
    assert_eq!(h.llm.call_count(), 0);
}

#[tokio::test]
async fn short_earnings_history_is_flagged() {
    let market = StaticMarketData::new()
        .with_quote("NVDA", dec!(120), &[dec!(110), dec!(120)])
        .with_earnings("NVDA", &[(2023, 29.8)]);
    let news = StaticNews::new().with_article("NVDA", "Nvidia datacenter demand", "Orders up.");
    let h = harness(market, news, 0.8, ScriptedLanguageModel::reply("Nvidia note."));

    let brief = h
        .orchestrator
        .handle(&Query::new("NVDA earnings outlook"))
        .await
        .unwrap();

    assert!(brief.forecasts.is_empty());
    assert_eq!(brief.insufficient_history, vec![sym("NVDA")]);
    assert_eq!(brief.stages.prediction, StageStatus::Failed);
    assert!(brief
        .issues
        .iter()
        .any(|i| i.stage == Stage::Prediction && i.kind == IssueKind::Empty));
    assert_eq!(brief.symbol_status[0].earnings, StageStatus::Degraded);
}

#[tokio::test]
async fn forecasts_are_repeatable() {
    let h = harness(
        two_symbol_market(),
        two_symbol_news(),
        0.8,
        ScriptedLanguageModel::reply("ok"),
    );
    let query = Query::new("AAPL MSFT");

    let first = h.orchestrator.handle(&query).await.unwrap();
    let second = h.orchestrator.handle(&query).await.unwrap();

    assert_eq!(first.forecasts, second.forecasts);
    assert_eq!(first.risk, second.risk);
    assert_ne!(first.id, second.id);
    assert_eq!(first.query_id, second.query_id);
}

#[tokio::test]
async fn explicit_symbols_and_holdings_drive_weights() {
    let market = StaticMarketData::new()
        .with_quote("AAPL", dec!(100), &[dec!(100)])
        .with_quote("MSFT", dec!(100), &[dec!(100)]);
    let h = harness(market, two_symbol_news(), 0.8, ScriptedLanguageModel::reply("ok"));

    let query = Query::new("what's my exposure?")
        .with_symbols(["msft", "aapl"])
        .with_holdings(BTreeMap::from([
            ("AAPL".to_string(), dec!(3)),
            ("MSFT".to_string(), dec!(1)),
        ]));
    let brief = h.orchestrator.handle(&query).await.unwrap();

    assert_eq!(brief.symbols, vec![sym("MSFT"), sym("AAPL")]);
    assert_eq!(brief.risk.weight_of(&sym("AAPL")), Some(0.75));
    assert_eq!(brief.risk.weight_of(&sym("MSFT")), Some(0.25));
}

#[tokio::test]
async fn unusable_holdings_are_reported_not_fatal() {
    let market = StaticMarketData::new()
        .with_quote("AAPL", dec!(190), &[dec!(190)])
        .with_quote("MSFT", dec!(100), &[dec!(100)]);
    let h = harness(market, two_symbol_news(), 0.8, ScriptedLanguageModel::reply("ok"));

    let query = Query::new("what's my exposure?")
        .with_symbols(["AAPL", "MSFT"])
        .with_holdings(BTreeMap::from([
            ("AAPL".to_string(), dec!(1000000000000000000000000000)),
            ("MSFT".to_string(), dec!(-3)),
        ]));
    let brief = h.orchestrator.handle(&query).await.unwrap();

    assert_eq!(brief.stages.analysis, StageStatus::Degraded);
    assert!(brief.risk.is_normalized());
    for position in &brief.risk.positions {
        assert_eq!(position.units, dec!(1));
        assert!((0.0..=1.0).contains(&position.weight));
    }
    let flagged: Vec<_> = brief
        .issues
        .iter()
        .filter(|i| i.stage == Stage::Analysis)
        .filter_map(|i| i.symbol.clone())
        .collect();
    assert_eq!(flagged.len(), 2);
    assert!(flagged.contains(&sym("AAPL")));
    assert!(flagged.contains(&sym("MSFT")));
}

#[tokio::test]
async fn company_names_resolve_to_tickers() {
    let h = harness(
        two_symbol_market(),
        two_symbol_news(),
        0.8,
        ScriptedLanguageModel::reply("ok"),
    );

    let brief = h
        .orchestrator
        .handle(&Query::new("How exposed are we to Apple?"))
        .await
        .unwrap();

    assert_eq!(brief.symbols, vec![sym("AAPL")]);
    let prompt = h.llm.last_prompt().unwrap();
    assert!(prompt.contains("AAPL"));
}
