#![forbid(unsafe_code)]

//! Property paths shared by both path dialects.
//!
//! Two spellings address the same location:
//!
//! | Dialect | Example | Numeric segment |
//! |---------|---------|-----------------|
//! | source (options object) | `list.0.name` | `.N` |
//! | host (observer keys, commit payload keys) | `list[0].name` | `[N]` |
//!
//! [`Path::parse`] accepts either spelling (and mixtures of both) and yields
//! the same segment list, so rewriting is parse-then-render.
//!
//! # Grammar
//!
//! Segments are `[A-Za-z0-9_]+` separated by `.`; indices are `.N` or `[N]`.
//! Anything else (including empty segments, unbalanced brackets and
//! non-numeric bracket contents) is a [`Error::PathSyntax`]. Keeping the
//! character set this small lets a path string double as a map key and as a
//! host observer declaration without escaping.
//!
//! # Reads and writes
//!
//! - [`resolve`] / [`resolve_in`] never fail: a missing key, a `null` or a
//!   primitive in the middle of the path yields `None` ("undefined").
//! - [`snapshot_at`] returns a detached copy of the value at a path.
//! - [`assign`] writes through a path, creating only the containers that are
//!   missing along it. It refuses to pad an array by more than
//!   [`MAX_ARRAY_GROWTH`] slots and leaves the state untouched when it does.

use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// One step of a [`Path`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// Named field.
    Key(String),
    /// Array position (`.N` or `[N]`).
    Index(usize),
}

impl Segment {
    /// Field name used when the segment is applied to an object.
    #[must_use]
    pub fn as_key(&self) -> String {
        match self {
            Self::Key(key) => key.clone(),
            Self::Index(index) => index.to_string(),
        }
    }
}

/// A parsed, non-empty property path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Path {
    segments: Vec<Segment>,
}

/// Largest index [`Path::parse`] accepts.
pub const MAX_INDEX: usize = u32::MAX as usize;

/// How far past its current length [`assign`] may pad an array.
pub const MAX_ARRAY_GROWTH: usize = 1 << 16;

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn parse_index(input: &str, digits: &str) -> Result<usize> {
    digits
        .parse::<u32>()
        .map(|index| index as usize)
        .map_err(|_| Error::path_syntax(input, "index out of range"))
}

impl Path {
    /// Parse a path written in either dialect.
    pub fn parse(input: &str) -> Result<Self> {
        if input.is_empty() {
            return Err(Error::path_syntax(input, "empty path"));
        }
        if input
            .bytes()
            .any(|b| !(is_word_byte(b) || matches!(b, b'.' | b'[' | b']')))
        {
            return Err(Error::path_syntax(input, "unexpected character"));
        }

        let bytes = input.as_bytes();
        let mut segments = Vec::new();
        let mut pos = 0;
        // True right after a '.', where a word segment is mandatory.
        let mut after_dot = false;

        while pos < bytes.len() {
            if bytes[pos] == b'[' {
                if after_dot {
                    return Err(Error::path_syntax(input, "bracket after '.'"));
                }
                let start = pos + 1;
                let mut end = start;
                while end < bytes.len() && bytes[end].is_ascii_digit() {
                    end += 1;
                }
                if end == start || end >= bytes.len() || bytes[end] != b']' {
                    return Err(Error::path_syntax(input, "malformed index"));
                }
                let index = parse_index(input, &input[start..end])?;
                segments.push(Segment::Index(index));
                pos = end + 1;
            } else {
                let start = pos;
                while pos < bytes.len() && is_word_byte(bytes[pos]) {
                    pos += 1;
                }
                if pos == start {
                    return Err(Error::path_syntax(input, "empty segment"));
                }
                let word = &input[start..pos];
                let numeric = word.bytes().all(|b| b.is_ascii_digit());
                if numeric && !segments.is_empty() {
                    let index = parse_index(input, word)?;
                    segments.push(Segment::Index(index));
                } else {
                    segments.push(Segment::Key(word.to_owned()));
                }
            }
            after_dot = false;

            if pos < bytes.len() {
                match bytes[pos] {
                    b'.' => {
                        pos += 1;
                        after_dot = true;
                        if pos == bytes.len() {
                            return Err(Error::path_syntax(input, "trailing '.'"));
                        }
                    }
                    b'[' => {}
                    _ => return Err(Error::path_syntax(input, "unbalanced bracket")),
                }
            }
        }

        Ok(Self { segments })
    }

    /// Build a path from already validated segments.
    ///
    /// Returns `None` for an empty segment list.
    #[must_use]
    pub fn from_segments(segments: Vec<Segment>) -> Option<Self> {
        if segments.is_empty() {
            None
        } else {
            Some(Self { segments })
        }
    }

    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// First segment; a top-level state field.
    #[must_use]
    pub fn root(&self) -> &Segment {
        &self.segments[0]
    }

    /// Whether `self` equals `other` or is one of its ancestors.
    #[must_use]
    pub fn is_prefix_of(&self, other: &Path) -> bool {
        self.segments.len() <= other.segments.len()
            && self
                .segments
                .iter()
                .zip(&other.segments)
                .all(|(a, b)| a == b)
    }

    /// Render in host dialect: `a[0].b`.
    #[must_use]
    pub fn to_host(&self) -> String {
        let mut out = String::new();
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Key(key) => {
                    if i > 0 {
                        out.push('.');
                    }
                    out.push_str(key);
                }
                Segment::Index(index) => {
                    out.push('[');
                    out.push_str(&index.to_string());
                    out.push(']');
                }
            }
        }
        out
    }

    /// Render in source dialect: `a.0.b`.
    #[must_use]
    pub fn to_source(&self) -> String {
        let parts: Vec<String> = self.segments.iter().map(Segment::as_key).collect();
        parts.join(".")
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_host())
    }
}

impl FromStr for Path {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Rewrite a source-dialect path into the host dialect (`a.0.b` → `a[0].b`).
pub fn rewrite(source: &str) -> Result<String> {
    Path::parse(source).map(|path| path.to_host())
}

fn step<'v>(node: &'v Value, segment: &Segment) -> Option<&'v Value> {
    match (node, segment) {
        (Value::Object(map), Segment::Key(key)) => map.get(key),
        (Value::Object(map), Segment::Index(index)) => map.get(&index.to_string()),
        (Value::Array(items), Segment::Index(index)) => items.get(*index),
        _ => None,
    }
}

/// Guarded read starting at an arbitrary value.
#[must_use]
pub fn resolve<'v>(root: &'v Value, path: &Path) -> Option<&'v Value> {
    path.segments
        .iter()
        .try_fold(root, |node, segment| step(node, segment))
}

/// Guarded read starting at a state map.
#[must_use]
pub fn resolve_in<'v>(root: &'v Map<String, Value>, path: &Path) -> Option<&'v Value> {
    let (first, rest) = path.segments.split_first()?;
    let top = root.get(&first.as_key())?;
    rest.iter().try_fold(top, |node, segment| step(node, segment))
}

/// Detached copy of the value at `path`.
///
/// The returned value shares nothing with `root`; later writes to the state
/// tree cannot change it. This is what watchers keep as their old value.
#[must_use]
pub fn snapshot_at(root: &Map<String, Value>, path: &Path) -> Option<Value> {
    resolve_in(root, path).cloned()
}

/// Write `value` at `path`, creating missing containers along the way.
///
/// Key segments turn a non-object node into an empty object; index segments
/// turn a non-container node into an array padded with `null`. Existing
/// siblings are left untouched. Fails without writing anything when an index
/// lies more than [`MAX_ARRAY_GROWTH`] slots past the end of its array.
pub fn assign(root: &mut Map<String, Value>, path: &Path, value: Value) -> Result<()> {
    check_growth(root, path)?;
    let Some((first, rest)) = path.segments.split_first() else {
        return Ok(());
    };
    let key = first.as_key();
    if rest.is_empty() {
        root.insert(key, value);
        return Ok(());
    }
    let slot = root.entry(key).or_insert(Value::Null);
    assign_value(slot, rest, value);
    Ok(())
}

/// Read-only walk mirroring [`assign_value`]'s container choices.
fn check_growth(root: &Map<String, Value>, path: &Path) -> Result<()> {
    let Some((first, rest)) = path.segments.split_first() else {
        return Ok(());
    };
    let mut node = root.get(&first.as_key());
    for segment in rest {
        if let Segment::Index(index) = segment {
            let len = match node {
                Some(Value::Object(_)) => None,
                Some(Value::Array(items)) => Some(items.len()),
                _ => Some(0),
            };
            if let Some(len) = len.filter(|len| *index > len.saturating_add(MAX_ARRAY_GROWTH)) {
                return Err(Error::invalid(format!(
                    "index {index} in {path} pads an array of length {len} past {MAX_ARRAY_GROWTH} slots"
                )));
            }
        }
        node = node.and_then(|n| step(n, segment));
    }
    Ok(())
}

fn assign_value(node: &mut Value, segments: &[Segment], value: Value) {
    let Some((segment, rest)) = segments.split_first() else {
        *node = value;
        return;
    };
    let child = match segment {
        Segment::Key(key) => {
            if !node.is_object() {
                *node = Value::Object(Map::new());
            }
            match node {
                Value::Object(map) => map.entry(key.clone()).or_insert(Value::Null),
                _ => return,
            }
        }
        Segment::Index(index) => {
            if !node.is_object() && !node.is_array() {
                *node = Value::Array(Vec::new());
            }
            match node {
                Value::Object(map) => map.entry(index.to_string()).or_insert(Value::Null),
                Value::Array(items) => {
                    let Some(needed) = index.checked_add(1) else {
                        return;
                    };
                    if items.len() < needed {
                        items.resize(needed, Value::Null);
                    }
                    &mut items[*index]
                }
                _ => return,
            }
        }
    };
    assign_value(child, rest, value);
}

/// Host observer declaration key.
///
/// Observer keys use the host dialect plus a `**` wildcard: `**` alone
/// matches every change, `path.**` matches changes at or under `path`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ObserverPattern {
    /// `**`
    Any,
    /// `path`: fires when `path` or one of its ancestors is assigned.
    Exact(Path),
    /// `path.**`: additionally fires when a descendant is assigned.
    Subtree(Path),
}

impl ObserverPattern {
    pub fn parse(key: &str) -> Result<Self> {
        if key == "**" {
            return Ok(Self::Any);
        }
        match key.strip_suffix(".**") {
            Some(base) => Path::parse(base).map(Self::Subtree),
            None => Path::parse(key).map(Self::Exact),
        }
    }

    /// Declaration key understood by the host.
    #[must_use]
    pub fn key(&self) -> String {
        match self {
            Self::Any => "**".to_owned(),
            Self::Exact(path) => path.to_host(),
            Self::Subtree(path) => format!("{}.**", path.to_host()),
        }
    }

    /// Whether an assignment at `changed` triggers this observer.
    #[must_use]
    pub fn matches(&self, changed: &Path) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(path) => changed.is_prefix_of(path),
            Self::Subtree(path) => changed.is_prefix_of(path) || path.is_prefix_of(changed),
        }
    }

    /// Observed location; `None` for the catch-all wildcard.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Any => None,
            Self::Exact(path) | Self::Subtree(path) => Some(path),
        }
    }
}
