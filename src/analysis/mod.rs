//! Short market commentary attached to news alerts.
//!
//! Every delivered item carries an analysis line in the recipient's
//! language, and the "price impact" button asks for a growth / decline
//! estimate. [`HeuristicAnalyst`] works offline from title keywords;
//! [`OpenAiAnalyst`] asks a chat model and falls back to the heuristic.

mod openai;

use async_trait::async_trait;

use crate::news::NewsItem;
use crate::store::Language;

pub use openai::{AnalysisError, OPENAI_ENDPOINT, OpenAiAnalyst};

/// Direction a headline points to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Positive,
    Negative,
    Neutral,
}

const NEGATIVE_WORDS: &[&str] = &["down", "fall", "falls", "falling", "fell", "negative"];
const POSITIVE_WORDS: &[&str] = &["up", "rise", "rises", "rising", "rose", "positive"];

impl Trend {
    /// Classifies a headline by whole-word keyword match. Negative wins ties.
    pub fn from_headline(headline: &str) -> Self {
        let lower = headline.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        if words.iter().any(|w| NEGATIVE_WORDS.contains(w)) {
            Self::Negative
        } else if words.iter().any(|w| POSITIVE_WORDS.contains(w)) {
            Self::Positive
        } else {
            Self::Neutral
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            Self::Positive => "📈",
            Self::Negative => "📉",
            Self::Neutral => "📊",
        }
    }

    /// One-line trend summary, e.g. "📈 Trend: Positive".
    pub fn summary(self, lang: Language) -> String {
        let label = match (self, lang) {
            (Self::Positive, Language::En) => "Trend: Positive",
            (Self::Negative, Language::En) => "Trend: Negative",
            (Self::Neutral, Language::En) => "Trend: Neutral",
            (Self::Positive, Language::Ru) => "Тренд: Положительный",
            (Self::Negative, Language::Ru) => "Тренд: Отрицательный",
            (Self::Neutral, Language::Ru) => "Тренд: Нейтральный",
        };
        format!("{} {}", self.emoji(), label)
    }

    /// Expected effect on the TON price.
    pub fn price_impact(self, lang: Language) -> String {
        match (self, lang) {
            (Self::Positive, Language::En) => {
                "📈 Likely Growth - This news may cause TON price to rise".to_owned()
            }
            (Self::Negative, Language::En) => {
                "📉 Likely Decline - This news may cause TON price to fall".to_owned()
            }
            (Self::Neutral, Language::En) => {
                "↔️ Neutral Impact - Minimal effect on TON price".to_owned()
            }
            (Self::Positive, Language::Ru) => {
                "📈 Вероятный рост - Эта новость может привести к росту цены TON".to_owned()
            }
            (Self::Negative, Language::Ru) => {
                "📉 Вероятный спад - Эта новость может привести к падению цены TON".to_owned()
            }
            (Self::Neutral, Language::Ru) => {
                "↔️ Нейтральное влияние - Минимальное влияние на цену TON".to_owned()
            }
        }
    }
}

/// Produces commentary for a news item. Implementations never fail; they
/// degrade to a neutral line instead.
#[async_trait]
pub trait Analyst: Send + Sync {
    /// Short analysis shown under every alert.
    async fn summary(&self, item: &NewsItem, lang: Language) -> String;

    /// Growth / decline estimate shown on demand.
    async fn price_impact(&self, item: &NewsItem, lang: Language) -> String;
}

/// Keyword-based analyst that needs no network access.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicAnalyst;

#[async_trait]
impl Analyst for HeuristicAnalyst {
    async fn summary(&self, item: &NewsItem, lang: Language) -> String {
        Trend::from_headline(item.title()).summary(lang)
    }

    async fn price_impact(&self, item: &NewsItem, lang: Language) -> String {
        Trend::from_headline(item.title()).price_impact(lang)
    }
}
