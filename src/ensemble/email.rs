//! Building analysis requests from incoming mail.
//!
//! Mail transport is someone else's job: callers hand over either an
//! already-decoded [`IncomingEmail`] or the raw RFC 822 bytes.

use mail_parser::MessageParser;
use serde::Deserialize;
use uuid::Uuid;

use super::types::AnalysisRequest;
use crate::error::Error;

/// An email as delivered by the surrounding application.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IncomingEmail {
    /// Caller's id for the email; becomes the correlation id.
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub subject: Option<String>,
    pub sender: String,
    #[serde(default)]
    pub body_text: Option<String>,
    #[serde(default)]
    pub body_html: Option<String>,
}

impl IncomingEmail {
    /// Plain-text body, falling back to the HTML body with tags removed.
    pub fn body(&self) -> String {
        match (&self.body_text, &self.body_html) {
            (Some(text), _) if !text.trim().is_empty() => text.clone(),
            (_, Some(html)) => strip_html(html),
            _ => String::new(),
        }
    }

    pub fn into_request(self) -> AnalysisRequest {
        let body = self.body();
        let request = AnalysisRequest::new(self.subject, self.sender, &body);
        match self.id {
            Some(id) => request.with_correlation_id(id),
            None => request,
        }
    }
}

/// Parse a raw RFC 822 message into a request.
pub fn request_from_rfc822(raw: &[u8]) -> Result<AnalysisRequest, Error> {
    let parsed = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| Error::Intake("not a parseable RFC 822 message".into()))?;

    let sender = parsed
        .from()
        .and_then(|addr| addr.first())
        .and_then(|a| a.address())
        .map(|s| s.to_string())
        .ok_or_else(|| Error::Intake("message has no From address".into()))?;

    let email = IncomingEmail {
        id: None,
        subject: parsed.subject().map(str::to_string),
        sender,
        body_text: parsed.body_text(0).map(|t| t.into_owned()),
        body_html: parsed.body_html(0).map(|h| h.into_owned()),
    };
    Ok(email.into_request())
}

/// Remove HTML tags, decode the common entities and collapse whitespace.
pub fn strip_html(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => {
                in_tag = true;
                text.push(' ');
            }
            '>' => in_tag = false,
            _ if !in_tag => text.push(ch),
            _ => {}
        }
    }

    let text = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
