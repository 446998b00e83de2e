//! Localized message templates.
//!
//! Every user-facing text is produced here as Telegram HTML. Dynamic parts
//! (titles, bodies, analysis lines, links) are escaped before they are
//! interpolated.

use chrono::{DateTime, Utc};

use crate::commands::CallbackAction;
use crate::news::NO_DESCRIPTION;
use crate::price::PriceQuote;
use crate::store::Language;
use crate::telegram::{InlineKeyboardButton, InlineKeyboardMarkup};
use crate::translate::Translation;

/// A message ready to be sent or edited in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub text: String,
    pub keyboard: Option<InlineKeyboardMarkup>,
}

impl RenderedMessage {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: None,
        }
    }

    #[must_use]
    pub fn with_keyboard(mut self, keyboard: InlineKeyboardMarkup) -> Self {
        self.keyboard = Some(keyboard);
        self
    }
}

fn escape(text: &str) -> String {
    html_escape::encode_text(text).into_owned()
}

fn button(text: &str, action: CallbackAction) -> InlineKeyboardButton {
    InlineKeyboardButton::callback(text, action.as_data())
}

fn news_body(translation: &Translation, link: Option<&str>, analysis: &str, header: &str) -> String {
    let (analysis_label, read_more) = match translation.language {
        Language::En => ("<b>Analysis:</b>", "Read full article"),
        Language::Ru => ("<b>📊 АНАЛИЗ:</b>", "Читать полностью"),
    };

    let body = if translation.body.trim().is_empty() {
        NO_DESCRIPTION
    } else {
        translation.body.as_str()
    };

    let mut text = format!(
        "📰 <b>{header}</b>\n\n<b>{}</b>\n\n{}\n\n{analysis_label}\n{}",
        escape(&translation.title),
        escape(body),
        escape(analysis),
    );

    if let Some(link) = link {
        text.push_str(&format!(
            "\n\n🔗 <a href=\"{}\">{read_more}</a>",
            html_escape::encode_double_quoted_attribute(link)
        ));
    }
    text
}

fn language_switch_row() -> Vec<InlineKeyboardButton> {
    vec![
        button("🇬🇧 English", CallbackAction::SwitchLanguage(Language::En)),
        button("🇷🇺 Русский", CallbackAction::SwitchLanguage(Language::Ru)),
    ]
}

/// Alert pushed to recipients when a new item is delivered.
pub fn news_alert(
    translation: &Translation,
    link: Option<&str>,
    analysis: &str,
    now: DateTime<Utc>,
) -> RenderedMessage {
    let (header, impact) = match translation.language {
        Language::En => ("TON NEWS", "📊 Price Analysis"),
        Language::Ru => ("НОВОСТЬ О TON", "📊 Анализ цены"),
    };

    let mut text = news_body(translation, link, analysis, header);
    text.push_str(&format!("\n\n⏰ {}", now.format("%d.%m %H:%M")));

    RenderedMessage::plain(text).with_keyboard(InlineKeyboardMarkup::new(vec![
        vec![button(impact, CallbackAction::PriceImpact)],
        language_switch_row(),
    ]))
}

/// Answer to `/lastnews` and the language switch buttons.
pub fn latest_news(
    translation: &Translation,
    link: Option<&str>,
    analysis: &str,
    with_language_switch: bool,
) -> RenderedMessage {
    let header = match translation.language {
        Language::En => "TON NEWS",
        Language::Ru => "ПОСЛЕДНЯЯ НОВОСТЬ",
    };

    let message = RenderedMessage::plain(news_body(translation, link, analysis, header));
    if with_language_switch {
        message.with_keyboard(InlineKeyboardMarkup::new(vec![language_switch_row()]))
    } else {
        message
    }
}

pub fn no_news(lang: Language) -> RenderedMessage {
    RenderedMessage::plain(match lang {
        Language::En => "😴 <b>No news yet</b>\n\nBot monitors 24/7!",
        Language::Ru => "😴 <b>Новостей пока нет</b>\n\nБот мониторит 24/7!",
    })
}

/// Language picker shown on `/start`.
pub fn welcome() -> RenderedMessage {
    RenderedMessage::plain("🚀 <b>TON NEWS BOT</b>\n\nВыберите язык / Choose language:").with_keyboard(
        InlineKeyboardMarkup::new(vec![
            vec![button("🇷🇺 Русский", CallbackAction::SetLanguage(Language::Ru))],
            vec![button("🇬🇧 English", CallbackAction::SetLanguage(Language::En))],
        ]),
    )
}

/// Main menu shown after a language was picked.
pub fn language_selected(lang: Language) -> RenderedMessage {
    let (text, latest, price, help) = match lang {
        Language::En => (
            "🚀 <b>TON NEWS BOT</b>\n\nAll news in English now!\n\n\
             <b>What I do:</b>\n📰 Monitor TON news\n💰 Show real-time price\n\
             📊 Analyze market impact\n🔔 No duplicates!",
            "📰 Latest news",
            "💰 TON Price",
            "❓ Help",
        ),
        Language::Ru => (
            "🚀 <b>TON NEWS BOT</b>\n\nВсе новости теперь на русском!\n\n\
             <b>Что я делаю:</b>\n📰 Мониторю новости о TON\n💰 Показываю курс в реальном времени\n\
             📊 Анализирую влияние на цену\n🔔 Без дубликатов!",
            "📰 Последняя новость",
            "💰 Курс TON",
            "❓ Помощь",
        ),
    };

    RenderedMessage::plain(text).with_keyboard(InlineKeyboardMarkup::new(vec![
        vec![button(latest, CallbackAction::LastNews)],
        vec![button(price, CallbackAction::Price)],
        vec![button(help, CallbackAction::Help)],
    ]))
}

/// Toast shown after a language switch button.
pub fn language_changed_notice(lang: Language) -> &'static str {
    match lang {
        Language::En => "Language changed to English",
        Language::Ru => "Язык изменен на русский",
    }
}

pub fn invalid_language(code: &str, lang: Language) -> RenderedMessage {
    let code = escape(code);
    RenderedMessage::plain(match lang {
        Language::En => format!("❌ Unsupported language <code>{code}</code>. Use /lang ru or /lang en."),
        Language::Ru => format!("❌ Язык <code>{code}</code> не поддерживается. Используйте /lang ru или /lang en."),
    })
}

pub fn help(lang: Language) -> RenderedMessage {
    RenderedMessage::plain(match lang {
        Language::En => {
            "❓ <b>HELP</b>\n\n/start - Menu\n/lastnews - Latest news\n/ton - TON price\n/lang ru|en - Language"
        }
        Language::Ru => {
            "❓ <b>СПРАВКА</b>\n\n/start - Меню\n/lastnews - Последняя новость\n/ton - Курс TON\n/lang ru|en - Язык"
        }
    })
}

pub fn price(quote: &PriceQuote, lang: Language) -> RenderedMessage {
    let (header, day, refresh, news) = match lang {
        Language::En => ("TON PRICE (Binance)", "24h", "🔄 Update", "📰 News"),
        Language::Ru => ("КУРС TON (Binance)", "24ч", "🔄 Обновить", "📰 Новости"),
    };

    let text = format!(
        "💰 <b>{header}</b>\n\n💵 <b>USD:</b> ${:.4}\n₽ <b>RUB:</b> {:.2}₽\n\n{} <b>{day}:</b> {:.2}%",
        quote.price_usd,
        quote.price_rub,
        quote.trend_emoji(),
        quote.change_24h,
    );

    RenderedMessage::plain(text).with_keyboard(InlineKeyboardMarkup::new(vec![
        vec![button(refresh, CallbackAction::PriceRefresh)],
        vec![button(news, CallbackAction::LastNews)],
    ]))
}

pub fn price_error(lang: Language) -> RenderedMessage {
    RenderedMessage::plain(match lang {
        Language::En => "❌ Price error",
        Language::Ru => "❌ Ошибка получения цены",
    })
}

pub fn price_impact(analysis: &str, lang: Language) -> RenderedMessage {
    let analysis = escape(analysis);
    RenderedMessage::plain(match lang {
        Language::En => format!(
            "💹 <b>TON PRICE IMPACT ANALYSIS</b>\n\n📈 <b>News Impact:</b>\n{analysis}\n\n\
             <b>How this affects TON:</b>\nThis analysis predicts the potential short-term price \
             movement based on the news sentiment and market relevance."
        ),
        Language::Ru => format!(
            "💹 <b>АНАЛИЗ ВЛИЯНИЯ НА ЦЕНУ TON</b>\n\n📈 <b>Влияние новости:</b>\n{analysis}\n\n\
             <b>Как это влияет на TON:</b>\nЭтот анализ предсказывает возможное краткосрочное \
             движение цены на основе тональности новости и её значимости для рынка."
        ),
    })
}

pub fn analysis_ready_notice(lang: Language) -> &'static str {
    match lang {
        Language::En => "Analysis ready ✅",
        Language::Ru => "Анализ готов ✅",
    }
}
