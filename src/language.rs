//! Language Classifier
//!
//! Decides whether a farmer's message is in the primary language (English,
//! Latin script) or the secondary language (Telugu script). Script ranges are
//! counted character by character; nothing probabilistic is involved.

use serde::{Deserialize, Serialize};

/// Telugu Unicode block
const TELUGU_RANGE: std::ops::RangeInclusive<char> = '\u{0C00}'..='\u{0C7F}';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    /// English
    Primary,
    /// Telugu
    Secondary,
    Unknown,
}

impl Language {
    /// Language used for outbound text. UNKNOWN falls back to PRIMARY.
    pub fn outbound(self) -> Language {
        match self {
            Language::Unknown => Language::Primary,
            other => other,
        }
    }

    /// The other half of a bilingual pair
    pub fn counterpart(self) -> Language {
        match self.outbound() {
            Language::Secondary => Language::Primary,
            _ => Language::Secondary,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Language::Primary => "english",
            Language::Secondary => "telugu",
            Language::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-script character counts for a piece of text
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScriptCounts {
    pub primary: usize,
    pub secondary: usize,
}

impl ScriptCounts {
    pub fn of(text: &str) -> Self {
        let mut counts = ScriptCounts::default();
        for c in text.chars() {
            if TELUGU_RANGE.contains(&c) {
                // Combining vowel signs and the virama belong to the script too
                counts.secondary += 1;
            } else if c.is_alphabetic() && is_latin(c) {
                counts.primary += 1;
            }
        }
        counts
    }

    pub fn classifiable(&self) -> usize {
        self.primary + self.secondary
    }
}

fn is_latin(c: char) -> bool {
    c.is_ascii_alphabetic() || ('\u{00C0}'..='\u{024F}').contains(&c)
}

#[derive(Debug, Clone, Copy)]
pub struct LanguageClassifier {
    min_classifiable_chars: usize,
}

impl Default for LanguageClassifier {
    fn default() -> Self {
        Self::new(1)
    }
}

impl LanguageClassifier {
    pub fn new(min_classifiable_chars: usize) -> Self {
        Self {
            min_classifiable_chars: min_classifiable_chars.max(1),
        }
    }

    pub fn classify(&self, text: &str) -> Language {
        let counts = ScriptCounts::of(text);
        if counts.classifiable() < self.min_classifiable_chars {
            return Language::Unknown;
        }
        // A farmer who types any Telugu at all reads Telugu
        if counts.secondary > 0 {
            Language::Secondary
        } else {
            Language::Primary
        }
    }

    /// Language most of the text is written in. Used for composed bodies,
    /// where a quoted Telugu plot name must not flip an English paragraph.
    pub fn dominant(&self, text: &str) -> Language {
        let counts = ScriptCounts::of(text);
        if counts.classifiable() < self.min_classifiable_chars {
            return Language::Unknown;
        }
        if counts.secondary >= counts.primary {
            Language::Secondary
        } else {
            Language::Primary
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_english_is_primary() {
        let classifier = LanguageClassifier::default();
        assert_eq!(classifier.classify("Show status"), Language::Primary);
        assert_eq!(classifier.classify("a"), Language::Primary);
        assert_eq!(classifier.classify("Is Thurpu plot healthy?"), Language::Primary);
    }

    #[test]
    fn test_telugu_is_secondary() {
        let classifier = LanguageClassifier::default();
        assert_eq!(classifier.classify("తూర్పు పొలం"), Language::Secondary);
    }

    #[test]
    fn test_dominant_follows_the_majority_script() {
        let classifier = LanguageClassifier::default();
        assert_eq!(
            classifier.dominant("Irrigate తూర్పు today; the crop looks stressed."),
            Language::Primary
        );
        assert_eq!(classifier.dominant("తూర్పు పొలం NDVI 0.48"), Language::Secondary);
        assert_eq!(classifier.dominant("42 %"), Language::Unknown);
    }

    #[test]
    fn test_mixed_script_is_secondary() {
        let classifier = LanguageClassifier::default();
        assert_eq!(classifier.classify("Thurpu polam చూపించు"), Language::Secondary);
    }

    #[test]
    fn test_unclassifiable_is_unknown() {
        let classifier = LanguageClassifier::default();
        assert_eq!(classifier.classify(""), Language::Unknown);
        assert_eq!(classifier.classify("123 ?!"), Language::Unknown);
        assert_eq!(classifier.classify("🌾🌾"), Language::Unknown);
    }

    #[test]
    fn test_threshold_applies() {
        let classifier = LanguageClassifier::new(4);
        assert_eq!(classifier.classify("ok"), Language::Unknown);
        assert_eq!(classifier.classify("okay"), Language::Primary);
    }

    #[test]
    fn test_unknown_defaults_to_primary_outbound() {
        assert_eq!(Language::Unknown.outbound(), Language::Primary);
        assert_eq!(Language::Secondary.outbound(), Language::Secondary);
        assert_eq!(Language::Unknown.counterpart(), Language::Secondary);
        assert_eq!(Language::Secondary.counterpart(), Language::Primary);
    }

    #[test]
    fn test_primary_words_never_unknown() {
        let classifier = LanguageClassifier::default();
        for text in ["water", "Munnagi", "help me", "NDVI report please", "x y z"] {
            assert_eq!(classifier.classify(text), Language::Primary, "{}", text);
        }
    }
}
