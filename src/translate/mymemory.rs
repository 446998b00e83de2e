//! MyMemory translation API client.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::{TranslateError, Translator};
use crate::news::truncate_chars;
use crate::store::Language;

/// Public MyMemory endpoint.
pub const MYMEMORY_ENDPOINT: &str = "https://api.mymemory.translated.net/get";

/// MyMemory rejects longer queries on the anonymous tier.
pub const MAX_QUERY_CHARS: usize = 500;

/// Translator backed by the free MyMemory API.
#[derive(Debug, Clone)]
pub struct MyMemoryTranslator {
    client: reqwest::Client,
    endpoint: String,
}

impl MyMemoryTranslator {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_endpoint(client, MYMEMORY_ENDPOINT)
    }

    pub fn with_endpoint(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl Translator for MyMemoryTranslator {
    async fn translate(
        &self,
        text: &str,
        from: Language,
        to: Language,
    ) -> Result<String, TranslateError> {
        let query = truncate_chars(text, MAX_QUERY_CHARS);
        let langpair = format!("{}|{}", from.code(), to.code());

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query.as_str()), ("langpair", langpair.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TranslateError::Status(status.as_u16()));
        }

        let body: Value = response.json().await?;
        let translated = parse_response(&body)?;
        debug!("Translated {} chars {}", query.chars().count(), langpair);
        Ok(translated)
    }
}

/// Extracts the translated text from a MyMemory response body.
fn parse_response(body: &Value) -> Result<String, TranslateError> {
    // responseStatus is sometimes a number and sometimes a string
    let status = match &body["responseStatus"] {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .ok_or_else(|| TranslateError::Malformed("missing responseStatus".to_owned()))?;

    if status != 200 {
        let message = body["responseDetails"]
            .as_str()
            .unwrap_or("unknown error")
            .to_owned();
        return Err(TranslateError::Service { status, message });
    }

    body["responseData"]["translatedText"]
        .as_str()
        .map(|t| html_escape::decode_html_entities(t).into_owned())
        .ok_or_else(|| TranslateError::Malformed("missing responseData.translatedText".to_owned()))
}
