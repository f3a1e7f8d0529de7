//! # Filter
//!
//! Module dedicated to message filtering. A virtual folder only
//! mirrors the source messages its pattern matches. The pattern is
//! tested against the [`Envelope`] and/or the text body of candidate
//! [`Message`]s, depending on the [`SearchScope`].
//!
//! Matching logic lives behind the [`FilterStrategy`] trait. The
//! default strategy is the [`GlobFilter`], but a custom
//! [`FilterBuilder`] can be given to the engine.

mod envelope;
mod glob;

use std::{fmt, sync::Arc};

use once_cell::unsync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{AnyResult, Result};

#[doc(inline)]
pub use self::{envelope::Envelope, glob::GlobFilter};

/// The parts of a message a filter pattern is tested against.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SearchScope {
    /// Only the envelope fields.
    #[default]
    Headers,
    /// Only the text body.
    Body,
    /// The envelope fields first, then the text body.
    Both,
}

impl SearchScope {
    pub fn includes_headers(&self) -> bool {
        matches!(self, Self::Headers | Self::Both)
    }

    pub fn includes_body(&self) -> bool {
        matches!(self, Self::Body | Self::Both)
    }
}

impl From<SearchScope> for u8 {
    fn from(scope: SearchScope) -> Self {
        match scope {
            SearchScope::Headers => 0,
            SearchScope::Body => 1,
            SearchScope::Both => 2,
        }
    }
}

impl From<u8> for SearchScope {
    fn from(scope: u8) -> Self {
        match scope {
            0 => Self::Headers,
            1 => Self::Body,
            2 => Self::Both,
            scope => {
                warn!(scope, "unknown search scope, falling back to headers");
                Self::Headers
            }
        }
    }
}

impl fmt::Display for SearchScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Headers => write!(f, "headers"),
            Self::Body => write!(f, "body"),
            Self::Both => write!(f, "headers and body"),
        }
    }
}

/// The message filtering strategy.
pub trait FilterStrategy {
    /// Returns `true` if the given message should be mirrored.
    fn matches(&self, msg: &Message) -> bool;
}

/// The filter builder.
///
/// Builds the strategy of a virtual folder from its pattern and its
/// search scope. It is called once per sync pass.
pub type FilterBuilder = Arc<dyn Fn(&str, SearchScope) -> Result<Box<dyn FilterStrategy>>>;

/// Returns the default filter builder, based on [`GlobFilter`].
pub fn default_filter_builder() -> FilterBuilder {
    Arc::new(|pattern: &str, scope: SearchScope| {
        let filter: Box<dyn FilterStrategy> = Box::new(GlobFilter::build(pattern, scope)?);
        Ok(filter)
    })
}

/// Alias for the raw message loader of a [`Message`].
pub type RawMessageLoader<'a> = Box<dyn Fn() -> AnyResult<Option<Vec<u8>>> + 'a>;

/// A filter candidate.
///
/// The envelope is parsed eagerly from the message headers. The full
/// message is only loaded the first time the body is needed, then
/// cached.
pub struct Message<'a> {
    envelope: Envelope,
    raw: OnceCell<Option<Vec<u8>>>,
    body: OnceCell<Option<String>>,
    loader: RawMessageLoader<'a>,
}

impl<'a> Message<'a> {
    /// Creates a candidate from its envelope and a loader of the
    /// full raw message.
    pub fn new(envelope: Envelope, loader: impl Fn() -> AnyResult<Option<Vec<u8>>> + 'a) -> Self {
        Self {
            envelope,
            raw: OnceCell::new(),
            body: OnceCell::new(),
            loader: Box::new(loader),
        }
    }

    /// Creates a candidate from an already loaded raw message.
    pub fn from_raw(raw: impl Into<Vec<u8>>) -> Self {
        let raw = raw.into();
        let envelope = Envelope::from_bytes(&raw);
        let msg = Self::new(envelope, || Ok(None));
        let _ = msg.raw.set(Some(raw));
        msg
    }

    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    /// Returns the full raw message, loading it on first call.
    ///
    /// A failed load is logged and cached as `None`.
    pub fn raw(&self) -> Option<&[u8]> {
        self.raw
            .get_or_init(|| match (self.loader)() {
                Ok(raw) => raw,
                Err(err) => {
                    debug!("cannot load message for filtering: {err}");
                    None
                }
            })
            .as_deref()
    }

    /// Returns the raw message only if it was already loaded.
    pub fn raw_if_loaded(&self) -> Option<&[u8]> {
        self.raw.get().and_then(Option::as_deref)
    }

    /// Returns the text body of the message, loading it on first
    /// call.
    pub fn body(&self) -> Option<&str> {
        self.body
            .get_or_init(|| self.raw().and_then(envelope::parse_text_body))
            .as_deref()
    }
}

impl fmt::Debug for Message<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("envelope", &self.envelope)
            .field("body_loaded", &self.body.get().is_some())
            .finish()
    }
}
