//! Fixed bilingual messages
//!
//! Everything here is written in both languages up front so it can be sent
//! even when no translator is reachable.

use serde::{Deserialize, Serialize};

use crate::evidence::{EvidenceSource, Plot};
use crate::language::Language;

/// A message in both languages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BilingualText {
    /// English
    pub primary: String,
    /// Telugu
    pub secondary: String,
}

impl BilingualText {
    pub fn new(primary: impl Into<String>, secondary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            secondary: secondary.into(),
        }
    }

    pub fn get(&self, language: Language) -> &str {
        match language.outbound() {
            Language::Secondary => &self.secondary,
            _ => &self.primary,
        }
    }

    /// The detected language first, then the other one
    pub fn ordered(&self, language: Language) -> (&str, &str) {
        let first = language.outbound();
        (self.get(first), self.get(first.counterpart()))
    }
}

fn source_name(source: EvidenceSource) -> BilingualText {
    match source {
        EvidenceSource::Satellite => BilingualText::new("satellite imagery", "ఉపగ్రహ చిత్రం"),
        EvidenceSource::Weather => BilingualText::new("weather forecast", "వాతావరణ సూచన"),
        EvidenceSource::History => BilingualText::new("irrigation history", "నీటి పారుదల చరిత్ర"),
    }
}

pub fn didnt_understand() -> BilingualText {
    BilingualText::new(
        "Sorry, I didn't understand your message. You can ask about crop health, \
         irrigation advice or the weekly summary for a plot.",
        "క్షమించండి, మీ సందేశం నాకు అర్థం కాలేదు. మీరు ఒక పొలం యొక్క పంట ఆరోగ్యం, \
         నీటి పారుదల సలహా లేదా వారపు సారాంశం గురించి అడగవచ్చు.",
    )
}

pub fn which_plot(plots: &[Plot]) -> BilingualText {
    let english: Vec<&str> = plots.iter().map(|p| p.name_english.as_str()).collect();
    let telugu: Vec<&str> = plots.iter().map(|p| p.name_telugu.as_str()).collect();
    BilingualText::new(
        format!("Which plot do you mean? ({})", english.join(" / ")),
        format!("మీరు ఏ పొలం గురించి అడుగుతున్నారు? ({})", telugu.join(" / ")),
    )
}

pub fn unknown_plot(name: &str) -> BilingualText {
    BilingualText::new(
        format!("I could not find a plot called '{}'.", name),
        format!("'{}' అనే పొలం కనబడలేదు.", name),
    )
}

pub fn degraded() -> BilingualText {
    BilingualText::new(
        "Sorry, I could not prepare your advisory right now. Please try again in a little while.",
        "క్షమించండి, ప్రస్తుతం మీ సలహాను సిద్ధం చేయలేకపోయాను. కొద్దిసేపటి తర్వాత మళ్ళీ ప్రయత్నించండి.",
    )
}

pub fn no_plots() -> BilingualText {
    BilingualText::new(
        "No plots are registered yet.",
        "ఇంకా ఏ పొలాలు నమోదు కాలేదు.",
    )
}

pub fn missing_source_question(plot: &Plot, source: EvidenceSource) -> BilingualText {
    let name = source_name(source);
    BilingualText::new(
        format!(
            "I need your help with {}: there is no recent {} for this plot. \
             How does the crop look today, and when did you last irrigate?",
            plot.name_english, name.primary
        ),
        format!(
            "{} గురించి మీ సహాయం కావాలి: ఈ పొలానికి ఇటీవలి {} అందుబాటులో లేదు. \
             ఈ రోజు పంట ఎలా ఉంది, చివరిసారి ఎప్పుడు నీరు పెట్టారు?",
            plot.name_telugu, name.secondary
        ),
    )
}

pub fn stale_source_question(plot: &Plot, source: EvidenceSource, hours: f64) -> BilingualText {
    let name = source_name(source);
    let days = (hours / 24.0).round().max(1.0) as u32;
    BilingualText::new(
        format!(
            "The {} for {} is {} day(s) old, so I am not sure about it. \
             Has anything changed in the field recently?",
            name.primary, plot.name_english, days
        ),
        format!(
            "{} కోసం {} {} రోజుల పాతది, అందుకే నాకు ఖచ్చితంగా తెలియదు. \
             ఇటీవల పొలంలో ఏమైనా మార్పు వచ్చిందా?",
            plot.name_telugu, name.secondary, days
        ),
    )
}

pub fn low_confidence_question(plot: &Plot, confidence: f64) -> BilingualText {
    let pct = (confidence * 100.0).round() as u32;
    BilingualText::new(
        format!(
            "I am only {}% sure about {}. Could you check the plot and tell me \
             whether the leaves look dry or yellow?",
            pct, plot.name_english
        ),
        format!(
            "{} గురించి నాకు {}% మాత్రమే నమ్మకం ఉంది. దయచేసి పొలాన్ని చూసి \
             ఆకులు ఎండిపోయినట్లు లేదా పసుపు రంగులో ఉన్నాయా చెప్పండి?",
            plot.name_telugu, pct
        ),
    )
}

pub fn translation_unavailable_note() -> &'static str {
    "(అనువాదం అందుబాటులో లేదు)"
}
