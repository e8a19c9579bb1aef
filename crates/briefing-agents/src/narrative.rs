use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use briefing_models::{
    EarningsForecast, FallbackReason, Narrative, RetrievalResult, RiskReport, Symbol,
};
use tracing::{info, warn};

use crate::error::AgentError;
use crate::llm::LanguageModel;
use crate::prompts::{build_narrative_prompt, narrative_system_prompt};

/// Everything the narrative is written from.
#[derive(Debug, Clone, Copy)]
pub struct NarrativeInput<'a> {
    pub query: &'a str,
    /// Resolved symbols in extraction order.
    pub symbols: &'a [Symbol],
    pub names: &'a BTreeMap<Symbol, String>,
    pub context: &'a [RetrievalResult],
    pub risk: &'a RiskReport,
    pub forecasts: &'a [EarningsForecast],
    pub missing_market_data: &'a [Symbol],
    pub insufficient_history: &'a [Symbol],
}

impl NarrativeInput<'_> {
    pub fn name(&self, symbol: &Symbol) -> String {
        self.names
            .get(symbol)
            .cloned()
            .unwrap_or_else(|| symbol.to_string())
    }
}

/// Wraps the language model. Never fails: every error becomes a
/// `Narrative::Fallback` with the matching reason.
pub struct NarrativeGenerator {
    model: Arc<dyn LanguageModel>,
    timeout: Duration,
    max_prompt_chars: usize,
}

impl NarrativeGenerator {
    pub fn new(model: Arc<dyn LanguageModel>, timeout: Duration, max_prompt_chars: usize) -> Self {
        Self {
            model,
            timeout,
            max_prompt_chars,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn generate(&self, input: &NarrativeInput<'_>) -> Narrative {
        let start = Instant::now();
        let prompt = build_narrative_prompt(input, self.max_prompt_chars);
        let system_prompt = narrative_system_prompt();

        let result = tokio::time::timeout(
            self.timeout,
            self.model.complete(&system_prompt, &prompt),
        )
        .await
        .unwrap_or_else(|_| Err(AgentError::Timeout(self.timeout.as_secs())));

        match result {
            Ok(text) if !text.trim().is_empty() => {
                info!(
                    model = self.model.name(),
                    chars = text.len(),
                    elapsed_ms = start.elapsed().as_millis(),
                    "Narrative generated"
                );
                Narrative::Generated {
                    text: text.trim().to_string(),
                }
            }
            Ok(_) => self.fallback(input, FallbackReason::EmptyResponse, "empty completion"),
            Err(e) => {
                let reason = if self.model.is_quota_error(&e) {
                    FallbackReason::QuotaExceeded
                } else if e.is_timeout() {
                    FallbackReason::Timeout
                } else if matches!(e, AgentError::EmptyResponse(_)) {
                    FallbackReason::EmptyResponse
                } else {
                    FallbackReason::GenerationFailed
                };
                self.fallback(input, reason, &e.to_string())
            }
        }
    }

    fn fallback(&self, input: &NarrativeInput<'_>, reason: FallbackReason, detail: &str) -> Narrative {
        warn!(model = self.model.name(), reason = ?reason, error = %detail, "Narrative fell back to template");
        Narrative::Fallback {
            text: fallback_narrative(input, reason),
            reason,
        }
    }
}

/// Deterministic template brief. Mentions every resolved symbol.
pub fn fallback_narrative(input: &NarrativeInput<'_>, reason: FallbackReason) -> String {
    let mut text = String::new();
    let _ = writeln!(text, "Market Brief for: {}\n", input.query.trim());

    let covered: Vec<String> = input
        .symbols
        .iter()
        .map(|s| format!("{} ({s})", input.name(s)))
        .collect();
    let _ = writeln!(text, "Analysis of {}.\n", covered.join(", "));

    text.push_str("Portfolio Exposure:\n");
    if input.risk.is_empty() {
        text.push_str("- No market data was available, so exposure could not be computed.\n");
    }
    for position in &input.risk.positions {
        let _ = writeln!(
            text,
            "- {} ({}): {:.1}% (${:.2}) at ${:.2}",
            input.name(&position.symbol),
            position.symbol,
            position.weight * 100.0,
            position.market_value,
            position.price
        );
    }
    for (category, weight) in &input.risk.exposure_by_category {
        let _ = writeln!(text, "  {category}: {:.1}% of exposure", weight * 100.0);
    }

    text.push_str("\nEarnings Outlook:\n");
    for forecast in input.forecasts.iter().filter(|f| f.is_ok()) {
        if let (Some(next), Some(growth)) = (forecast.predicted.first(), forecast.growth_rates.first()) {
            let tier = forecast
                .confidence
                .map(|c| format!("{c:?}").to_lowercase())
                .unwrap_or_else(|| "unknown".to_string());
            let _ = writeln!(
                text,
                "- {} ({}): {} projected at {:.2} ({growth:+.1}%), {tier} confidence",
                input.name(&forecast.symbol),
                forecast.symbol,
                next.period,
                next.value
            );
        }
    }
    for symbol in input.insufficient_history {
        let _ = writeln!(
            text,
            "- {} ({symbol}): insufficient earnings history for a forecast",
            input.name(symbol)
        );
    }

    if !input.missing_market_data.is_empty() {
        let gaps: Vec<String> = input
            .missing_market_data
            .iter()
            .map(|s| s.to_string())
            .collect();
        let _ = writeln!(text, "\nData gaps: market data unavailable for {}.", gaps.join(", "));
    }

    let _ = write!(
        text,
        "\nThis brief was generated from a template because {}.",
        reason.describe()
    );
    text
}
