//! Structured version identities parsed from raw version strings
//!
//! Parsing never fails. Whatever text an application or a remote source reports
//! is turned into a [`VersionIdentity`]:
//!
//! - `"3.1.2"` -> numeric segments `3`, `1`, `2`
//! - `"v4.1.0"` -> leading `v` dropped before a digit
//! - `"2.0.0-beta.2"` -> pre-release suffix `beta.2`
//! - `"2.0b3"`, `"2.0 Beta 3"` -> pre-release suffix `b3` / `Beta 3` (well-known
//!   marker after a number)
//! - `"5.1.2 (5102)"`, `"1.0.0+20240101"` -> build annotation `5102` / `20240101`
//! - `"2024.01.15"` -> date-based, carries an epoch hint
//! - `"latest"` -> alphabetic-only, comparable only for equality
//! - `""` -> no segments, lowest possible version

use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

/// Pre-release marker words recognised after a number (`1.0rc1`, `2.0 beta`).
/// A `-` delimited suffix (`1.0-anything`) is always a pre-release.
const PRE_RELEASE_MARKERS: &[&str] = &[
    "alpha", "beta", "b", "rc", "pre", "preview", "dev", "ea", "canary", "nightly",
];

/// Years accepted as the leading component of a date-based version
const DATE_YEAR_RANGE: std::ops::RangeInclusive<i32> = 1990..=2999;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    Numeric,
    Alphabetic,
    Separator,
}

/// One token of a version string
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Segment {
    kind: SegmentKind,
    /// Original text, leading zeros included
    text: String,
    /// Integer value for numeric segments (saturates on overflow; ordering
    /// uses the digits themselves)
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<u64>,
}

impl Segment {
    fn numeric(text: &str) -> Self {
        Self {
            kind: SegmentKind::Numeric,
            text: text.to_string(),
            value: Some(text.parse().unwrap_or(u64::MAX)),
        }
    }

    fn alphabetic(text: &str) -> Self {
        Self {
            kind: SegmentKind::Alphabetic,
            text: text.to_string(),
            value: None,
        }
    }

    fn separator(text: &str) -> Self {
        Self {
            kind: SegmentKind::Separator,
            text: text.to_string(),
            value: None,
        }
    }

    pub fn kind(&self) -> SegmentKind {
        self.kind
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn value(&self) -> Option<u64> {
        self.value
    }

    /// Separators only delimit; they never take part in ordering
    pub fn is_significant(&self) -> bool {
        self.kind != SegmentKind::Separator
    }
}

/// Parsed, comparable form of a raw version string
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct VersionIdentity {
    raw: String,
    segments: Vec<Segment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pre_release: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    build: Option<String>,
    /// Days since 0001-01-01 when the version reads as YYYY.MM.DD
    #[serde(skip_serializing_if = "Option::is_none")]
    epoch_days: Option<i32>,
}

impl VersionIdentity {
    /// Parse a raw version string. Total and deterministic.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        let (rest, build) = split_build(trimmed);
        let rest = strip_v_prefix(rest);
        let (core, pre_release) = split_pre_release(rest);

        let mut segments = tokenize(core);
        if !core.is_empty() && !segments.iter().any(Segment::is_significant) {
            // Nothing but punctuation: keep the text as one opaque token so
            // equality still works.
            segments = vec![Segment::alphabetic(core)];
        }

        let epoch_days = date_epoch(&segments);

        Self {
            raw: raw.to_string(),
            segments,
            pre_release: pre_release.map(str::to_string),
            build: build.map(str::to_string),
            epoch_days,
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Numeric and alphabetic segments, in order
    pub fn significant(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter().filter(|s| s.is_significant())
    }

    pub fn pre_release(&self) -> Option<&str> {
        self.pre_release.as_deref()
    }

    pub fn build(&self) -> Option<&str> {
        self.build.as_deref()
    }

    pub fn epoch_days(&self) -> Option<i32> {
        self.epoch_days
    }

    pub fn is_date_based(&self) -> bool {
        self.epoch_days.is_some()
    }

    /// No segments and no suffix: the lowest possible version
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty() && self.pre_release.is_none()
    }

    /// Has segments but not a single numeric one ("latest", "current")
    pub fn is_alphabetic_only(&self) -> bool {
        let mut significant = self.significant().peekable();
        significant.peek().is_some()
            && significant.all(|s| s.kind() == SegmentKind::Alphabetic)
    }

    /// Only numeric segments and no pre-release suffix
    pub fn is_numeric_only(&self) -> bool {
        self.pre_release.is_none() && self.significant().all(|s| s.kind() == SegmentKind::Numeric)
    }

    /// Case-folded significant text, used for equality of non-orderable identities
    pub(crate) fn folded_text(&self) -> String {
        let mut parts: Vec<String> = self
            .significant()
            .map(|s| s.text().to_ascii_lowercase())
            .collect();
        if let Some(pre) = &self.pre_release {
            parts.push(pre.to_ascii_lowercase());
        }
        parts.join(".")
    }
}

impl fmt::Display for VersionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Parse a raw version string into a [`VersionIdentity`]
pub fn parse(raw: &str) -> VersionIdentity {
    VersionIdentity::parse(raw)
}

/// Split a run of text into digit, letter and separator segments
pub(crate) fn tokenize(text: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut start = 0;
    let mut current: Option<SegmentKind> = None;

    for (i, c) in text.char_indices() {
        let kind = classify(c);
        match current {
            Some(k) if k == kind => {}
            Some(k) => {
                segments.push(make_segment(k, &text[start..i]));
                start = i;
                current = Some(kind);
            }
            None => current = Some(kind),
        }
    }

    if let Some(k) = current {
        segments.push(make_segment(k, &text[start..]));
    }

    segments
}

fn classify(c: char) -> SegmentKind {
    if c.is_ascii_digit() {
        SegmentKind::Numeric
    } else if c.is_alphabetic() {
        SegmentKind::Alphabetic
    } else {
        SegmentKind::Separator
    }
}

fn make_segment(kind: SegmentKind, text: &str) -> Segment {
    match kind {
        SegmentKind::Numeric => Segment::numeric(text),
        SegmentKind::Alphabetic => Segment::alphabetic(text),
        SegmentKind::Separator => Segment::separator(text),
    }
}

/// Detach a build annotation: trailing `(1234)` or `+build` metadata
fn split_build(text: &str) -> (&str, Option<&str>) {
    if text.ends_with(')') {
        if let Some(open) = text.rfind('(') {
            let before = text[..open].trim_end();
            let inner = text[open + 1..text.len() - 1].trim();
            if !before.is_empty() {
                return (before, (!inner.is_empty()).then_some(inner));
            }
        }
    }

    match text.find('+') {
        Some(i) if i > 0 => {
            let meta = text[i + 1..].trim();
            (text[..i].trim_end(), (!meta.is_empty()).then_some(meta))
        }
        _ => (text, None),
    }
}

fn strip_v_prefix(text: &str) -> &str {
    let mut chars = text.chars();
    match (chars.next(), chars.next()) {
        (Some('v' | 'V'), Some(d)) if d.is_ascii_digit() => &text[1..],
        _ => text,
    }
}

/// Detach a pre-release suffix.
///
/// `-` followed by a letter always starts a suffix (`2.0.0-beta`); a `-`
/// followed by a digit is an ordinary separator (`2024-01-15`). Otherwise a
/// well-known marker word that follows a number starts the suffix, whether
/// glued to it or after a separator (`1.0rc1`, `2.0 Beta 3`, `2.0_rc1`).
fn split_pre_release(text: &str) -> (&str, Option<&str>) {
    for (i, c) in text.char_indices() {
        if c == '-' && i > 0 {
            let next = text[i + 1..].chars().next();
            if next.is_some_and(char::is_alphabetic) {
                return (&text[..i], Some(&text[i + 1..]));
            }
        }
    }

    let mut seen_digit = false;
    let mut previous: Option<char> = None;
    for (i, c) in text.char_indices() {
        let word_start = c.is_alphabetic() && !previous.is_some_and(char::is_alphabetic);
        if word_start && seen_digit && starts_with_marker(&text[i..]) {
            let core = text[..i].trim_end_matches(|c: char| !c.is_alphanumeric());
            return (core, Some(&text[i..]));
        }
        seen_digit |= c.is_ascii_digit();
        previous = Some(c);
    }

    (text, None)
}

fn starts_with_marker(text: &str) -> bool {
    let end = text
        .find(|c: char| !c.is_alphabetic())
        .unwrap_or(text.len());
    PRE_RELEASE_MARKERS.contains(&text[..end].to_ascii_lowercase().as_str())
}

/// Epoch hint for YYYY.MM.DD versions
fn date_epoch(segments: &[Segment]) -> Option<i32> {
    let numeric: Vec<&Segment> = segments
        .iter()
        .filter(|s| s.is_significant())
        .take(3)
        .collect();

    if numeric.iter().any(|s| s.kind() != SegmentKind::Numeric) {
        return None;
    }

    let [year, month, day] = numeric.as_slice() else {
        return None;
    };
    if year.text().len() != 4 {
        return None;
    }

    let date = NaiveDate::from_ymd_opt(
        i32::try_from(year.value()?).ok()?,
        u32::try_from(month.value()?).ok()?,
        u32::try_from(day.value()?).ok()?,
    )?;

    DATE_YEAR_RANGE
        .contains(&date.year())
        .then(|| date.num_days_from_ce())
}
