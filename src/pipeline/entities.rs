//! Heuristic extraction of comparable values from paragraphs.
//!
//! Durations, percentages, currency amounts and liability regimes are
//! matched in English and Russian and normalized so that equal values
//! compare equal regardless of wording.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::data::ContradictionType;
use crate::document::Paragraph;

/// A normalized value found in a paragraph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    /// Paragraph the value appears in.
    pub paragraph_id: String,
    /// Bucket the value is compared in.
    pub kind: ContradictionType,
    /// Normalized value, e.g. `30 days`, `10 business days`, `5%`, `1000000 RUB`, `99.50 USD`.
    pub value: String,
    /// Text around the match.
    pub context: String,
}

/// Finds comparable values in a paragraph.
pub trait EntityExtractor: Send + Sync {
    /// Returns the values found in `paragraph`, in text order per kind.
    fn extract(&self, paragraph: &Paragraph) -> Vec<Entity>;
}

static DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(\d{1,4})\s*(?:\([^)]{1,40}\)\s*)?(?:(business|working|banking|рабоч\w*|банковск\w*)\s+|(?:calendar|календарн\w*)\s+)?(days?|дн(?:я|ей)|день|weeks?|недел[ьяи]|months?|месяц(?:а|ев)?)\b",
    )
    .unwrap()
});

static PERCENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d{1,3}(?:[.,]\d{1,2})?)\s*(?:%|percent\b|per\s+cent\b|процент\w*)").unwrap()
});

/// Amounts with the currency written before (`$1,500.50`) or after (`1 000 руб.`).
static CURRENCY: LazyLock<Regex> = LazyLock::new(|| {
    let amount = r"(\d{1,3}(?:[ \u{a0}]\d{3})+|\d{1,3}(?:,\d{3})+|\d+)(?:[.,](\d{1,2}))?";
    Regex::new(&format!(
        r"(?i)(?:(?P<prefix>[$€₽£])\s?{amount}|{amount}\s*(?P<suffix>rub(?:les?)?\b|руб\w*|₽|usd\b|us\s+dollars?\b|dollars?\b|долл\w*|\$|eur\b|euros?\b|евро\b|€|gbp\b|£))"
    ))
    .unwrap()
});

static LIABILITY_EXCLUDED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:shall\s+not\s+be\s+liable|not\s+be\s+held\s+liable|no\s+liability|exclud\w*\s+(?:all\s+)?liability|liability\s+is\s+excluded|освобожда\w*\s+от\s+ответственности|не\s+нес[её]т\s+ответственност\w*)",
    )
    .unwrap()
});

static LIABILITY_LIMITED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:liability\s+(?:is|shall\s+be)\s+limited|limited\s+to\s+direct\s+damages?|liability\s+shall\s+not\s+exceed|ограничен\w*\s+(?:размером\s+)?ответственност\w*|ответственност\w*\s+ограничива\w*|ответственност\w*\s+не\s+может\s+превышать)",
    )
    .unwrap()
});

static LIABILITY_FULL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:full\s+liability|liable\s+in\s+full|fully\s+liable|полн\w*\s+(?:материальн\w*\s+)?ответственност\w*|ответственност\w*\s+в\s+полном\s+объ[её]ме)",
    )
    .unwrap()
});

/// Regex-based [`EntityExtractor`].
#[derive(Debug, Clone)]
pub struct RegexEntityExtractor {
    context_window_chars: usize,
}

impl RegexEntityExtractor {
    /// Creates an extractor keeping `context_window_chars` on each side of a match.
    pub fn new(context_window_chars: usize) -> Self {
        Self {
            context_window_chars,
        }
    }

    fn entity(
        &self,
        paragraph: &Paragraph,
        kind: ContradictionType,
        value: String,
        start: usize,
        end: usize,
    ) -> Entity {
        Entity {
            paragraph_id: paragraph.id.clone(),
            kind,
            value,
            context: context_window(&paragraph.text, start, end, self.context_window_chars),
        }
    }
}

impl EntityExtractor for RegexEntityExtractor {
    fn extract(&self, paragraph: &Paragraph) -> Vec<Entity> {
        let text = &paragraph.text;
        let mut found = Vec::new();

        for caps in DURATION.captures_iter(text) {
            if let (Some(m), Some(value)) = (caps.get(0), normalize_duration(&caps)) {
                found.push(self.entity(paragraph, ContradictionType::Temporal, value, m.start(), m.end()));
            }
        }

        for caps in CURRENCY.captures_iter(text) {
            if let (Some(m), Some(value)) = (caps.get(0), normalize_amount(&caps)) {
                found.push(self.entity(paragraph, ContradictionType::Financial, value, m.start(), m.end()));
            }
        }

        for caps in PERCENT.captures_iter(text) {
            if let (Some(m), Some(value)) = (caps.get(0), normalize_percent(&caps)) {
                found.push(self.entity(
                    paragraph,
                    ContradictionType::Quantitative,
                    value,
                    m.start(),
                    m.end(),
                ));
            }
        }

        for (regime, pattern) in [
            ("excluded", &LIABILITY_EXCLUDED),
            ("limited", &LIABILITY_LIMITED),
            ("full", &LIABILITY_FULL),
        ] {
            if let Some(m) = pattern.find(text) {
                found.push(self.entity(
                    paragraph,
                    ContradictionType::Legal,
                    regime.to_string(),
                    m.start(),
                    m.end(),
                ));
            }
        }

        let mut seen = HashSet::new();
        found.retain(|e| seen.insert((e.kind, e.value.clone())));
        found
    }
}

fn normalize_duration(caps: &Captures<'_>) -> Option<String> {
    let count: u32 = caps.get(1)?.as_str().parse().ok()?;
    let unit = caps.get(3)?.as_str().to_lowercase();
    let days = if unit.starts_with("week") || unit.starts_with("недел") {
        count.checked_mul(7)?
    } else if unit.starts_with("month") || unit.starts_with("месяц") {
        count.checked_mul(30)?
    } else {
        count
    };
    if caps.get(2).is_some() {
        Some(format!("{days} business days"))
    } else {
        Some(format!("{days} days"))
    }
}

fn normalize_percent(caps: &Captures<'_>) -> Option<String> {
    let number: f64 = caps.get(1)?.as_str().replace(',', ".").parse().ok()?;
    Some(format!("{number}%"))
}

fn normalize_amount(caps: &Captures<'_>) -> Option<String> {
    // groups 2 and 3 belong to the prefixed form, 4 and 5 to the suffixed one
    let (whole, fraction, symbol) = match caps.name("prefix") {
        Some(prefix) => (caps.get(2)?, caps.get(3), prefix),
        None => (caps.get(4)?, caps.get(5), caps.name("suffix")?),
    };
    let digits: String = whole.as_str().chars().filter(char::is_ascii_digit).collect();
    let amount: u64 = digits.parse().ok()?;
    let cents = match fraction.map(|f| f.as_str()) {
        Some(f) if f.len() == 1 => f.parse::<u32>().ok()? * 10,
        Some(f) => f.parse::<u32>().ok()?,
        None => 0,
    };

    let symbol = symbol.as_str().to_lowercase();
    let currency = if symbol.starts_with("rub") || symbol.starts_with("руб") || symbol == "₽" {
        "RUB"
    } else if symbol.contains("usd") || symbol.contains("dollar") || symbol.starts_with("долл") || symbol == "$" {
        "USD"
    } else if symbol == "gbp" || symbol == "£" {
        "GBP"
    } else {
        "EUR"
    };

    if cents == 0 {
        Some(format!("{amount} {currency}"))
    } else {
        Some(format!("{amount}.{cents:02} {currency}"))
    }
}

/// Returns up to `window` characters on each side of `start..end`, whitespace-collapsed.
fn context_window(text: &str, start: usize, end: usize, window: usize) -> String {
    let from = if window == 0 {
        start
    } else {
        text[..start]
            .char_indices()
            .rev()
            .nth(window - 1)
            .map_or(0, |(i, _)| i)
    };
    let to = text[end..]
        .char_indices()
        .nth(window)
        .map_or(text.len(), |(i, _)| end + i);
    text[from..to].split_whitespace().collect::<Vec<_>>().join(" ")
}
