//! Predicate language for routing bus messages.
//!
//! A [`TypePredicate`] tests a message's tag and status against declarative
//! patterns. Patterns are plain data evaluated by a pure match function —
//! no per-call closures — which keeps routing tables inspectable and
//! trivially testable.
//!
//! Tag patterns support exact members and prefix members: a requested tag
//! containing the `...` sentinel matches any tag starting with the part
//! before the sentinel, e.g. `"MARKER..."` matches `"MARKER_TRACK"`.

use crate::bus::message::{Message, Status};

/// Sentinel marking a tag pattern member as a prefix match.
pub const PREFIX_SENTINEL: &str = "...";

/// Tag constraint of a predicate.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TagPattern {
    /// No constraint: every tag passes.
    #[default]
    Any,
    /// Passes when the tag equals an exact member or starts with a prefix
    /// member.
    OneOf {
        exact: Vec<String>,
        prefixes: Vec<String>,
    },
}

impl TagPattern {
    /// Build a pattern from requested tags, splitting prefix members out by
    /// the `...` sentinel.
    pub fn of<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut exact = Vec::new();
        let mut prefixes = Vec::new();
        for tag in tags {
            let tag = tag.into();
            match tag.find(PREFIX_SENTINEL) {
                Some(pos) => prefixes.push(tag[..pos].to_string()),
                None => exact.push(tag),
            }
        }
        TagPattern::OneOf { exact, prefixes }
    }

    /// Whether `tag` passes this pattern.
    pub fn matches(&self, tag: &str) -> bool {
        match self {
            TagPattern::Any => true,
            TagPattern::OneOf { exact, prefixes } => {
                exact.iter().any(|t| t == tag)
                    || prefixes.iter().any(|p| tag.starts_with(p.as_str()))
            }
        }
    }
}

/// Status constraint of a predicate.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StatusPattern {
    /// No constraint: every status passes.
    #[default]
    Any,
    /// Passes when the status equals one of the members.
    OneOf(Vec<Status>),
}

impl StatusPattern {
    /// Whether `status` passes this pattern.
    pub fn matches(&self, status: Status) -> bool {
        match self {
            StatusPattern::Any => true,
            StatusPattern::OneOf(set) => set.contains(&status),
        }
    }
}

/// Combined tag + status message test.
///
/// A message passes iff its tag passes the tag pattern AND its status
/// passes the status pattern; an unconstrained side always passes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TypePredicate {
    pub tag: TagPattern,
    pub status: StatusPattern,
}

impl TypePredicate {
    /// Predicate with no constraints at all.
    pub fn any() -> Self {
        Self::default()
    }

    /// Predicate matching a single tag (exact, or prefix with `...`).
    pub fn tag(tag: impl Into<String>) -> Self {
        Self {
            tag: TagPattern::of([tag.into()]),
            status: StatusPattern::Any,
        }
    }

    /// Predicate matching any of the given tags.
    pub fn tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tag: TagPattern::of(tags),
            status: StatusPattern::Any,
        }
    }

    /// Constrain the status to a single value.
    pub fn with_status(mut self, status: Status) -> Self {
        self.status = StatusPattern::OneOf(vec![status]);
        self
    }

    /// Constrain the status to a set of values.
    pub fn with_statuses(mut self, statuses: impl IntoIterator<Item = Status>) -> Self {
        self.status = StatusPattern::OneOf(statuses.into_iter().collect());
        self
    }

    /// Predicate on status only.
    pub fn status(status: Status) -> Self {
        Self {
            tag: TagPattern::Any,
            status: StatusPattern::OneOf(vec![status]),
        }
    }

    /// Whether `message` passes this predicate.
    pub fn matches(&self, message: &Message) -> bool {
        self.tag.matches(&message.tag) && self.status.matches(message.status)
    }
}
