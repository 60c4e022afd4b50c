//! Continuation tokens and the sessions that remember them.

use std::fmt;

use uuid::Uuid;

/// Length of every progress token.
pub const TOKEN_LEN: usize = 32;

/// Opaque 32-character token addressing one in-flight submission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgressToken(String);

impl ProgressToken {
    /// Mint a fresh random token.
    ///
    /// # Examples
    /// ```
    /// use wayfare_submission::{ProgressToken, TOKEN_LEN};
    ///
    /// let token = ProgressToken::mint();
    /// assert_eq!(token.as_str().len(), TOKEN_LEN);
    /// assert_eq!(ProgressToken::parse(token.as_str()), Some(token));
    /// ```
    pub fn mint() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Accept `raw` if it has the token shape. No storage lookup happens.
    pub fn parse(raw: &str) -> Option<Self> {
        (raw.chars().count() == TOKEN_LEN).then(|| Self(raw.to_owned()))
    }

    /// Token text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProgressToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-caller memory of the tokens it was handed.
///
/// A caller may have several submissions in flight.
pub trait ProgressSession {
    /// Remember `token`.
    fn remember(&mut self, token: &ProgressToken);

    /// Whether `token` was remembered and not yet forgotten.
    fn contains(&self, token: &str) -> bool;

    /// Forget `token`; unknown tokens are ignored.
    fn forget(&mut self, token: &str);
}

/// Session held in memory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemorySession {
    tokens: Vec<String>,
}

impl MemorySession {
    /// Tokens currently remembered, oldest first.
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }
}

impl ProgressSession for MemorySession {
    fn remember(&mut self, token: &ProgressToken) {
        if !self.contains(token.as_str()) {
            self.tokens.push(token.as_str().to_owned());
        }
    }

    fn contains(&self, token: &str) -> bool {
        self.tokens.iter().any(|known| known == token)
    }

    fn forget(&mut self, token: &str) {
        self.tokens.retain(|known| known != token);
    }
}

/// HTTP method of a wizard request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMethod {
    /// Page load.
    Get,
    /// Form submission.
    Post,
}

/// The parts of a wizard request that identify the submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepRequest<'a> {
    /// Request method.
    pub method: RequestMethod,
    /// Token taken from the URL.
    pub url_token: Option<&'a str>,
    /// Token posted in the form body, if the form carries one.
    pub posted_token: Option<&'a str>,
}

impl<'a> StepRequest<'a> {
    /// A page load for `token`.
    pub fn get(token: &'a str) -> Self {
        Self {
            method: RequestMethod::Get,
            url_token: Some(token),
            posted_token: None,
        }
    }

    /// A form post whose body repeats `token`.
    pub fn post(token: &'a str) -> Self {
        Self {
            method: RequestMethod::Post,
            url_token: Some(token),
            posted_token: Some(token),
        }
    }

    /// Replace the posted token.
    #[must_use]
    pub fn with_posted_token(mut self, posted: Option<&'a str>) -> Self {
        self.posted_token = posted;
        self
    }

    /// The URL token, if it disagrees with nothing else in the request.
    pub(crate) fn consistent_token(&self) -> Option<&'a str> {
        let url_token = self.url_token?;
        match (self.method, self.posted_token) {
            (RequestMethod::Post, Some(posted)) if posted != url_token => None,
            _ => Some(url_token),
        }
    }
}
