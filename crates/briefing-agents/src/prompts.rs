use std::fmt::Write;

use crate::narrative::NarrativeInput;

/// Longest single context chunk included in a prompt.
const MAX_CHUNK_CHARS: usize = 800;

pub fn narrative_system_prompt() -> String {
    "You are a market analyst writing a short morning brief for a portfolio manager.\n\n\
     ## INPUT\n\n\
     The user message contains the manager's question, portfolio exposure by symbol, \
     an earnings outlook per symbol and retrieved news context.\n\n\
     ## RULES\n\n\
     - Answer the question directly in two to four short paragraphs.\n\
     - Cite exposure as percentages and earnings changes as given. Do not invent figures.\n\
     - Mention every symbol listed under PORTFOLIO EXPOSURE.\n\
     - If a section says data is unavailable, say so plainly.\n\
     - Plain text only. No markdown headings, no JSON."
        .to_string()
}

/// User prompt for the narrative call, at most `max_chars` characters.
///
/// Question, exposure and outlook are always included. Context chunks are
/// added in rank order while they fit.
pub fn build_narrative_prompt(input: &NarrativeInput<'_>, max_chars: usize) -> String {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "QUESTION: {}\n", input.query.trim());

    prompt.push_str("PORTFOLIO EXPOSURE:\n");
    if input.risk.is_empty() {
        prompt.push_str("- market data unavailable for all symbols\n");
    }
    for position in &input.risk.positions {
        let _ = writeln!(
            prompt,
            "- {} ({}): {:.1}% of portfolio, ${:.2} market value, price ${:.2}, category {}",
            input.name(&position.symbol),
            position.symbol,
            position.weight * 100.0,
            position.market_value,
            position.price,
            position.category
        );
    }
    for symbol in input.missing_market_data {
        let _ = writeln!(prompt, "- {} ({symbol}): market data unavailable", input.name(symbol));
    }
    for (category, weight) in &input.risk.exposure_by_category {
        let _ = writeln!(prompt, "  {category}: {:.1}%", weight * 100.0);
    }

    prompt.push_str("\nEARNINGS OUTLOOK:\n");
    for forecast in input.forecasts.iter().filter(|f| f.is_ok()) {
        let projections: Vec<String> = forecast
            .predicted
            .iter()
            .zip(&forecast.growth_rates)
            .map(|(p, g)| format!("{}: {:.2} ({g:+.1}%)", p.period, p.value))
            .collect();
        let _ = writeln!(
            prompt,
            "- {} ({}): {}",
            input.name(&forecast.symbol),
            forecast.symbol,
            projections.join(", ")
        );
    }
    for symbol in input.insufficient_history {
        let _ = writeln!(prompt, "- {} ({symbol}): insufficient earnings history", input.name(symbol));
    }

    prompt.push_str("\nNEWS CONTEXT:\n");
    for result in input.context {
        let chunk = truncate_chars(&result.chunk, MAX_CHUNK_CHARS);
        let entry = format!(
            "- [{} | relevance {:.2}] {}\n",
            result.source.symbol,
            result.score,
            chunk.replace('\n', " ")
        );
        if prompt.chars().count() + entry.chars().count() > max_chars {
            break;
        }
        prompt.push_str(&entry);
    }

    truncate_chars(&prompt, max_chars).to_string()
}

/// Prefix of `s` with at most `max` characters, cut on a char boundary.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
