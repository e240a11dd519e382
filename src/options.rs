//! Listener option records and their normalisation.
//!
//! Callers may pass a bare capture flag, a full [`ListenerOptions`] record, or
//! nothing at all. [`normalize`] folds the three shapes into one record; a
//! record passes through by reference so later readers see the caller's own
//! `signal`.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cancellation::{same_signal, SignalRef};
use crate::error::ListenError;

/// Canonical listener options.
///
/// The `signal` is never (de)serialised; it is attached in code with
/// [`ListenerOptions::with_signal`].
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerOptions {
    pub capture: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passive: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub once: Option<bool>,
    #[serde(skip)]
    pub signal: Option<SignalRef>,
}

impl ListenerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an options record from YAML (JSON is accepted as well).
    pub fn from_yaml(source: &str) -> Result<Self, ListenError> {
        Ok(serde_yaml::from_str(source)?)
    }

    pub fn with_capture(mut self, capture: bool) -> Self {
        self.capture = capture;
        self
    }

    pub fn with_passive(mut self, passive: bool) -> Self {
        self.passive = Some(passive);
        self
    }

    pub fn with_once(mut self, once: bool) -> Self {
        self.once = Some(once);
        self
    }

    pub fn with_signal(mut self, signal: SignalRef) -> Self {
        self.signal = Some(signal);
        self
    }

    pub fn is_once(&self) -> bool {
        self.once.unwrap_or(false)
    }

    /// True when a signal is attached and has already fired.
    pub fn is_aborted(&self) -> bool {
        self.signal.as_ref().is_some_and(|signal| signal.aborted())
    }

    /// Copy of these options with the signal and `once` removed.
    pub(crate) fn for_interceptor(&self) -> Self {
        Self {
            capture: self.capture,
            passive: self.passive,
            once: None,
            signal: None,
        }
    }
}

impl PartialEq for ListenerOptions {
    fn eq(&self, other: &Self) -> bool {
        let signals_match = match (&self.signal, &other.signal) {
            (Some(a), Some(b)) => same_signal(a, b),
            (None, None) => true,
            _ => false,
        };
        signals_match
            && self.capture == other.capture
            && self.passive == other.passive
            && self.once == other.once
    }
}

impl fmt::Debug for ListenerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerOptions")
            .field("capture", &self.capture)
            .field("passive", &self.passive)
            .field("once", &self.once)
            .field("signal", &self.signal.as_ref().map(|signal| signal.aborted()))
            .finish()
    }
}

/// The three accepted shapes of a listener options argument.
#[derive(Debug, Clone, Copy, Default)]
pub enum OptionsArg<'a> {
    Flag(bool),
    Record(&'a ListenerOptions),
    #[default]
    Absent,
}

impl From<bool> for OptionsArg<'_> {
    fn from(capture: bool) -> Self {
        OptionsArg::Flag(capture)
    }
}

impl<'a> From<&'a ListenerOptions> for OptionsArg<'a> {
    fn from(record: &'a ListenerOptions) -> Self {
        OptionsArg::Record(record)
    }
}

impl<'a> From<Option<&'a ListenerOptions>> for OptionsArg<'a> {
    fn from(record: Option<&'a ListenerOptions>) -> Self {
        record.map_or(OptionsArg::Absent, OptionsArg::Record)
    }
}

impl From<()> for OptionsArg<'_> {
    fn from(_: ()) -> Self {
        OptionsArg::Absent
    }
}

/// Fold any accepted options shape into a [`ListenerOptions`] record.
pub fn normalize<'a>(options: impl Into<OptionsArg<'a>>) -> Cow<'a, ListenerOptions> {
    match options.into() {
        OptionsArg::Flag(true) => Cow::Owned(ListenerOptions::new().with_capture(true)),
        OptionsArg::Record(record) => Cow::Borrowed(record),
        OptionsArg::Flag(false) | OptionsArg::Absent => Cow::Owned(ListenerOptions::new()),
    }
}
