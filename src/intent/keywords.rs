//! Keyword fallback for intent classification
//!
//! Always available and deterministic. Each intent has a phrase list per
//! language; the longest matching phrase wins and ties go to the intent
//! listed first in [`INTENT_PRIORITY`].

use once_cell::sync::Lazy;
use regex::Regex;

use super::{Intent, IntentParams};
use crate::evidence::Plot;
use crate::language::Language;

/// Tie-break order when two intents match equally long phrases
pub const INTENT_PRIORITY: [Intent; 4] = [
    Intent::HealthCheck,
    Intent::IrrigationAdvice,
    Intent::WeeklySummary,
    Intent::Alert,
];

struct KeywordTable {
    intent: Intent,
    english: &'static [&'static str],
    telugu: &'static [&'static str],
}

static TABLES: [KeywordTable; 4] = [
    KeywordTable {
        intent: Intent::HealthCheck,
        english: &[
            "health", "healthy", "status", "check", "show", "ndvi", "satellite", "report",
            "how is", "how's", "condition", "crop look",
        ],
        telugu: &["ఆరోగ్యం", "స్థితి", "చూపించు", "ఎలా ఉంది", "రిపోర్ట్", "ఉపగ్రహ", "చిత్రం"],
    },
    KeywordTable {
        intent: Intent::IrrigationAdvice,
        english: &[
            "water", "watering", "irrigate", "irrigation", "need water", "should i water",
            "when to water", "due",
        ],
        telugu: &["నీరు", "నీళ్ళు", "నీటి", "పారుదల", "నీరు కావాలా", "అవసరమా", "నీరు పెట్టాలా"],
    },
    KeywordTable {
        intent: Intent::WeeklySummary,
        english: &["weekly", "week", "summary", "trend", "this week", "weekly summary"],
        telugu: &["వారం", "వారపు", "సారాంశం", "వారపు సారాంశం"],
    },
    KeywordTable {
        intent: Intent::Alert,
        english: &["alert", "alerts", "warning", "drop", "problem", "urgent", "anything wrong"],
        telugu: &["హెచ్చరిక", "సమస్య", "అత్యవసరం"],
    },
];

static DAYS_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{1,2})\s*(?:days?|రోజు|రోజులు|రోజుల)").expect("valid days pattern")
});

/// Substring match that, for ASCII phrases, also requires word boundaries
pub fn contains_phrase(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    if !needle.is_ascii() {
        return haystack.contains(needle);
    }
    haystack.match_indices(needle).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + needle.len()..].chars().next();
        !before.is_some_and(|c| c.is_alphanumeric()) && !after.is_some_and(|c| c.is_alphanumeric())
    })
}

fn longest_match(text: &str, phrases: &[&str]) -> usize {
    phrases
        .iter()
        .filter(|p| contains_phrase(text, p))
        .map(|p| p.chars().count())
        .max()
        .unwrap_or(0)
}

fn best_intent(text: &str, language: Language) -> Option<Intent> {
    let mut best: Option<(Intent, usize)> = None;
    for intent in INTENT_PRIORITY {
        let Some(table) = TABLES.iter().find(|t| t.intent == intent) else {
            continue;
        };
        let phrases = match language {
            Language::Secondary => table.telugu,
            _ => table.english,
        };
        let len = longest_match(text, phrases);
        // Strictly longer only, so earlier intents keep ties
        if len > 0 && best.map_or(true, |(_, b)| len > b) {
            best = Some((intent, len));
        }
    }
    best.map(|(intent, _)| intent)
}

/// Classifies by keyword. Looks in the detected language's table first and
/// falls back to the other table, since farmers mix scripts.
pub fn classify(text: &str, language: Language) -> Intent {
    let lower = text.to_lowercase();
    let first = language.outbound();
    best_intent(&lower, first)
        .or_else(|| best_intent(&lower, first.counterpart()))
        .unwrap_or(Intent::Unknown)
}

/// Pulls the plot and the day window out of free text
pub fn extract_params(text: &str, plots: &[Plot]) -> IntentParams {
    let lower = text.to_lowercase();

    let plot = plots
        .iter()
        .filter_map(|plot| {
            plot.names()
                .iter()
                .filter(|name| contains_phrase(&lower, name))
                .map(|name| name.chars().count())
                .max()
                .map(|len| (plot, len))
        })
        .max_by_key(|(_, len)| *len)
        .map(|(plot, _)| plot.id.clone());

    let days = DAYS_PATTERN
        .captures(&lower)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .filter(|d| *d > 0);

    IntentParams { plot, days }
}
