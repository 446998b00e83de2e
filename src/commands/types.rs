//! Command and callback types.

use std::fmt;

use crate::render::RenderedMessage;
use crate::store::Language;
use crate::telegram::BotCommandInfo;

/// Slash commands understood by the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    /// Show the language picker.
    Start,

    /// Show the most recently delivered item.
    LastNews,

    /// Show the TON price.
    Price,

    /// Show help information.
    Help,

    /// Set the language, or show the picker when no code is given.
    Language(Option<String>),
}

impl BotCommand {
    /// Parses a command from a message text.
    ///
    /// Accepts the `/command@botname` form used in groups; when
    /// `bot_username` is given, commands addressed to other bots are ignored.
    /// Returns `None` if the message is not a known command.
    #[must_use]
    pub fn parse(text: &str, bot_username: Option<&str>) -> Option<Self> {
        let text = text.trim();
        let after_slash = text.strip_prefix('/')?;

        let (head, args) = match after_slash.split_once(char::is_whitespace) {
            Some((head, args)) => (head, Some(args.trim())),
            None => (after_slash, None),
        };

        let cmd = match head.split_once('@') {
            Some((cmd, target)) => {
                if let Some(me) = bot_username
                    && !target.eq_ignore_ascii_case(me)
                {
                    return None;
                }
                cmd
            }
            None => head,
        };

        match cmd.to_lowercase().as_str() {
            "start" => Some(Self::Start),
            "lastnews" | "last" | "news" => Some(Self::LastNews),
            "ton" | "price" => Some(Self::Price),
            "help" => Some(Self::Help),
            "lang" | "language" => Some(Self::Language(
                args.filter(|a| !a.is_empty()).map(str::to_owned),
            )),
            _ => None,
        }
    }

    /// Returns the command name as it appears in help.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::LastNews => "lastnews",
            Self::Price => "ton",
            Self::Help => "help",
            Self::Language(_) => "lang",
        }
    }

    /// Commands registered with `setMyCommands`.
    #[must_use]
    pub fn all_commands() -> Vec<BotCommandInfo> {
        [
            ("start", "Menu"),
            ("lastnews", "Latest news"),
            ("ton", "TON price"),
            ("lang", "Language (ru, en)"),
            ("help", "Help"),
        ]
        .into_iter()
        .map(|(command, description)| BotCommandInfo {
            command: command.to_owned(),
            description: description.to_owned(),
        })
        .collect()
    }
}

impl fmt::Display for BotCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Language(Some(code)) => write!(f, "/lang {code}"),
            _ => write!(f, "/{}", self.name()),
        }
    }
}

/// Inline keyboard button actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    /// Language picked from the `/start` menu.
    SetLanguage(Language),
    /// Language switched under a news message.
    SwitchLanguage(Language),
    LastNews,
    Price,
    PriceRefresh,
    Help,
    PriceImpact,
}

impl CallbackAction {
    #[must_use]
    pub fn parse(data: &str) -> Option<Self> {
        match data {
            "set_lang_ru" => Some(Self::SetLanguage(Language::Ru)),
            "set_lang_en" => Some(Self::SetLanguage(Language::En)),
            "lang_ru" => Some(Self::SwitchLanguage(Language::Ru)),
            "lang_en" => Some(Self::SwitchLanguage(Language::En)),
            "lastnews" => Some(Self::LastNews),
            "price" => Some(Self::Price),
            "price_refresh" => Some(Self::PriceRefresh),
            "help" => Some(Self::Help),
            "price_impact" => Some(Self::PriceImpact),
            _ => None,
        }
    }

    /// Callback data sent with the button.
    #[must_use]
    pub const fn as_data(self) -> &'static str {
        match self {
            Self::SetLanguage(Language::Ru) => "set_lang_ru",
            Self::SetLanguage(Language::En) => "set_lang_en",
            Self::SwitchLanguage(Language::Ru) => "lang_ru",
            Self::SwitchLanguage(Language::En) => "lang_en",
            Self::LastNews => "lastnews",
            Self::Price => "price",
            Self::PriceRefresh => "price_refresh",
            Self::Help => "help",
            Self::PriceImpact => "price_impact",
        }
    }
}

/// Result of command or callback execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// Whether the command was successful.
    pub success: bool,

    /// Message to send (commands) or to edit in place (callbacks).
    pub message: RenderedMessage,

    /// Short toast for callback queries.
    pub notice: Option<String>,
}

impl CommandResult {
    #[must_use]
    pub fn success(message: RenderedMessage) -> Self {
        Self {
            success: true,
            message,
            notice: None,
        }
    }

    #[must_use]
    pub fn error(message: RenderedMessage) -> Self {
        Self {
            success: false,
            message,
            notice: None,
        }
    }

    #[must_use]
    pub fn with_notice(mut self, notice: impl Into<String>) -> Self {
        self.notice = Some(notice.into());
        self
    }
}
