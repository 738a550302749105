use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref LATIN_REGEX: Regex = Regex::new(r"[a-zA-Z]").unwrap();
    static ref VIETNAMESE_REGEX: Regex = Regex::new(
        r"(?i)[àáạảãâầấậẩẫăằắặẳẵèéẹẻẽêềếệểễìíịỉĩòóọỏõôồốộổỗơờớợởỡùúụủũưừứựửữỳýỵỷỹđ]"
    )
    .unwrap();
    static ref SENTENCE_BREAK_REGEX: Regex = Regex::new(r"[.!?]+").unwrap();
}

/// Percentage of Vietnamese-diacritic vs Latin letters in a text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageRatio {
    pub vi: u32,
    pub en: u32,
}

impl Default for LanguageRatio {
    fn default() -> Self {
        Self { vi: 50, en: 50 }
    }
}

pub fn calculate_language_ratio(content: &str) -> LanguageRatio {
    let english = LATIN_REGEX.find_iter(content).count();
    let vietnamese = VIETNAMESE_REGEX.find_iter(content).count();

    let total = english + vietnamese;
    if total == 0 {
        return LanguageRatio::default();
    }

    // Shares are rounded independently, so they may not add up to exactly 100.
    let share = |count: usize| (count as f64 / total as f64 * 100.0).round_ties_even() as u32;

    LanguageRatio {
        vi: share(vietnamese),
        en: share(english),
    }
}

/// Coarse readability bucket from average sentence length (higher is easier).
///
/// This is a rough heuristic, not a validated readability formula:
/// fewer than 10 words per sentence scores 85, fewer than 15 scores 70,
/// fewer than 20 scores 55 and anything longer scores 40.
pub fn calculate_readability_score(content: &str) -> u8 {
    let words = word_count(content);
    let sentences = SENTENCE_BREAK_REGEX
        .split(content)
        .filter(|fragment| !fragment.trim().is_empty())
        .count();

    if sentences == 0 {
        return 70;
    }

    let avg_words_per_sentence = words as f64 / sentences as f64;

    if avg_words_per_sentence < 10.0 {
        85
    } else if avg_words_per_sentence < 15.0 {
        70
    } else if avg_words_per_sentence < 20.0 {
        55
    } else {
        40
    }
}

pub fn word_count(content: &str) -> usize {
    content.split_whitespace().count()
}
