//! The pairing deep link: the URL the desktop renders (as a QR code or
//! clickable link) and the mobile peer parses on load.
//!
//! The link carries five query parameters: `sessionId`, `challenge`,
//! `userIdentifier`, `mode`, and `requireLocation`. The mobile peer parses
//! them and immediately registers into the session.
//!
//! Encoding is plain percent-encoding of non-unreserved characters (RFC 3986
//! §2.3); the parameter values here are short identifiers and an email
//! address, so no URL crate is warranted.

use std::fmt::Write as _;

use thiserror::Error;

use crate::domain::session::SessionMode;

/// Errors raised while parsing a pairing link.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeepLinkError {
    #[error("missing query parameter '{0}'")]
    MissingParam(&'static str),
    #[error("invalid session mode '{0}'")]
    InvalidMode(String),
    #[error("invalid requireLocation value '{0}'")]
    InvalidRequireLocation(String),
    #[error("malformed percent-encoding in '{0}'")]
    InvalidEncoding(String),
    #[error("link has no query string")]
    NoQuery,
}

/// The parameter set carried by a pairing link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingLink {
    pub session_id: String,
    pub challenge: String,
    pub user_identifier: String,
    pub mode: SessionMode,
    pub require_location: bool,
}

impl PairingLink {
    /// Renders the link against a base URL (e.g.
    /// `https://gate.lab.example/mobile-auth`).
    pub fn to_url(&self, base_url: &str) -> String {
        let mut url = String::with_capacity(base_url.len() + 96);
        url.push_str(base_url);
        url.push('?');
        push_param(&mut url, "sessionId", &self.session_id, true);
        push_param(&mut url, "challenge", &self.challenge, false);
        push_param(&mut url, "userIdentifier", &self.user_identifier, false);
        push_param(&mut url, "mode", &self.mode.to_string(), false);
        push_param(
            &mut url,
            "requireLocation",
            if self.require_location { "true" } else { "false" },
            false,
        );
        url
    }

    /// Parses a full pairing URL (or just its query string).
    ///
    /// # Errors
    ///
    /// [`DeepLinkError`] when a required parameter is missing or malformed.
    pub fn parse(url: &str) -> Result<Self, DeepLinkError> {
        let query = url.split_once('?').map(|(_, q)| q).unwrap_or(url);
        if query.is_empty() {
            return Err(DeepLinkError::NoQuery);
        }

        let mut session_id = None;
        let mut challenge = None;
        let mut user_identifier = None;
        let mut mode = None;
        let mut require_location = None;

        for pair in query.split('&') {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let value = percent_decode(value)?;
            match key {
                "sessionId" => session_id = Some(value),
                "challenge" => challenge = Some(value),
                "userIdentifier" => user_identifier = Some(value),
                "mode" => mode = Some(value),
                "requireLocation" => require_location = Some(value),
                // Unknown parameters are tolerated for forward compatibility.
                _ => {}
            }
        }

        let mode_raw = mode.ok_or(DeepLinkError::MissingParam("mode"))?;
        let mode = mode_raw
            .parse::<SessionMode>()
            .map_err(|_| DeepLinkError::InvalidMode(mode_raw))?;

        let require_raw =
            require_location.ok_or(DeepLinkError::MissingParam("requireLocation"))?;
        let require_location = match require_raw.as_str() {
            "true" => true,
            "false" => false,
            other => return Err(DeepLinkError::InvalidRequireLocation(other.to_string())),
        };

        Ok(Self {
            session_id: session_id.ok_or(DeepLinkError::MissingParam("sessionId"))?,
            challenge: challenge.ok_or(DeepLinkError::MissingParam("challenge"))?,
            user_identifier: user_identifier
                .ok_or(DeepLinkError::MissingParam("userIdentifier"))?,
            mode,
            require_location,
        })
    }
}

fn push_param(url: &mut String, key: &str, value: &str, first: bool) {
    if !first {
        url.push('&');
    }
    url.push_str(key);
    url.push('=');
    url.push_str(&percent_encode(value));
}

/// Percent-encodes everything outside the RFC 3986 unreserved set.
fn percent_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            other => {
                let _ = write!(out, "%{other:02X}");
            }
        }
    }
    out
}

fn percent_decode(input: &str) -> Result<String, DeepLinkError> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let hex = bytes
                    .get(i + 1..i + 3)
                    .and_then(|h| std::str::from_utf8(h).ok())
                    .and_then(|h| u8::from_str_radix(h, 16).ok())
                    .ok_or_else(|| DeepLinkError::InvalidEncoding(input.to_string()))?;
                out.push(hex);
                i += 3;
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            other => {
                out.push(other);
                i += 1;
            }
        }
    }
    String::from_utf8(out).map_err(|_| DeepLinkError::InvalidEncoding(input.to_string()))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
