//! Ordering of version identities that may follow different schemes

use std::cmp::Ordering;

use serde::Serialize;

use crate::version::identity::{Segment, SegmentKind, VersionIdentity, tokenize};

/// Result of comparing two version identities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Less,
    Equal,
    Greater,
    /// The identities follow schemes that cannot be ordered against each other
    Incomparable,
}

impl Comparison {
    pub fn reverse(self) -> Self {
        match self {
            Comparison::Less => Comparison::Greater,
            Comparison::Greater => Comparison::Less,
            other => other,
        }
    }
}

impl From<Ordering> for Comparison {
    fn from(ordering: Ordering) -> Self {
        match ordering {
            Ordering::Less => Comparison::Less,
            Ordering::Equal => Comparison::Equal,
            Ordering::Greater => Comparison::Greater,
        }
    }
}

/// Compare two version identities.
///
/// Rules, in order:
/// - an empty identity is lower than anything else
/// - alphabetic-only identities ("latest") are only ever Equal or Incomparable
/// - date-based identities compare by their epoch hint first
/// - significant segments compare position by position; a missing segment
///   and a numeric `0` are the same zero slot, lower than any number or
///   letters, so "1.2" == "1.2.0" and "1.0" < "1a"
/// - a non-zero number against letters at the deciding position is Incomparable
/// - with equal prefixes, a pre-release suffix sorts before the release
pub fn compare(a: &VersionIdentity, b: &VersionIdentity) -> Comparison {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => return Comparison::Equal,
        (true, false) => return Comparison::Less,
        (false, true) => return Comparison::Greater,
        (false, false) => {}
    }

    if a.is_alphabetic_only() || b.is_alphabetic_only() {
        return if a.folded_text() == b.folded_text() {
            Comparison::Equal
        } else {
            Comparison::Incomparable
        };
    }

    if let (Some(x), Some(y)) = (a.epoch_days(), b.epoch_days()) {
        if x != y {
            return x.cmp(&y).into();
        }
    }

    let a_segments: Vec<&Segment> = a.significant().collect();
    let b_segments: Vec<&Segment> = b.significant().collect();

    match compare_core(&a_segments, &b_segments) {
        Comparison::Equal => {}
        decided => return decided,
    }

    match (a.pre_release(), b.pre_release()) {
        (None, None) => Comparison::Equal,
        (Some(_), None) => Comparison::Less,
        (None, Some(_)) => Comparison::Greater,
        (Some(x), Some(y)) => compare_pre_release(x, y).into(),
    }
}

fn compare_core(a: &[&Segment], b: &[&Segment]) -> Comparison {
    for i in 0..a.len().max(b.len()) {
        let ordering = match (Slot::of(a.get(i)), Slot::of(b.get(i))) {
            (Slot::Zero, Slot::Zero) => Ordering::Equal,
            (Slot::Zero, _) => Ordering::Less,
            (_, Slot::Zero) => Ordering::Greater,
            (Slot::Number(x), Slot::Number(y)) => compare_digits(x, y),
            (Slot::Letters(x), Slot::Letters(y)) => compare_letters(x, y),
            _ => return Comparison::Incomparable,
        };

        if ordering != Ordering::Equal {
            return ordering.into();
        }
    }

    Comparison::Equal
}

/// One position of the core. A missing segment reads as `0` for numbers and
/// `""` for letters; both collapse into `Zero` so padding never changes the
/// kind seen at a position.
enum Slot<'a> {
    Zero,
    Number(&'a str),
    Letters(&'a str),
}

impl<'a> Slot<'a> {
    fn of(segment: Option<&&'a Segment>) -> Self {
        match segment {
            None => Slot::Zero,
            Some(s) if s.kind() == SegmentKind::Numeric => {
                if s.text().bytes().all(|b| b == b'0') {
                    Slot::Zero
                } else {
                    Slot::Number(s.text())
                }
            }
            Some(s) => Slot::Letters(s.text()),
        }
    }
}

/// Compare digit runs by integer value without overflowing
fn compare_digits(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn compare_letters(a: &str, b: &str) -> Ordering {
    a.to_ascii_lowercase().cmp(&b.to_ascii_lowercase())
}

/// Pre-release suffixes follow semver precedence: numeric identifiers sort
/// below alphabetic ones and a longer suffix wins when the shorter one is a
/// prefix of it ("beta" < "beta.2").
fn compare_pre_release(a: &str, b: &str) -> Ordering {
    let a_tokens = tokenize(a);
    let b_tokens = tokenize(b);
    let mut a_iter = a_tokens.iter().filter(|s| s.is_significant());
    let mut b_iter = b_tokens.iter().filter(|s| s.is_significant());

    loop {
        let ordering = match (a_iter.next(), b_iter.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => match (x.kind(), y.kind()) {
                (SegmentKind::Numeric, SegmentKind::Numeric) => compare_digits(x.text(), y.text()),
                (SegmentKind::Numeric, _) => Ordering::Less,
                (_, SegmentKind::Numeric) => Ordering::Greater,
                _ => compare_letters(x.text(), y.text()),
            },
        };

        if ordering != Ordering::Equal {
            return ordering;
        }
    }
}

impl VersionIdentity {
    /// Compare this identity against another
    pub fn compare_to(&self, other: &VersionIdentity) -> Comparison {
        compare(self, other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::identity::parse;
    use rstest::rstest;

    fn cmp(a: &str, b: &str) -> Comparison {
        compare(&parse(a), &parse(b))
    }

    /// Versions covering the schemes seen in the wild: plain numeric, padded,
    /// build numbers, pre-releases, tags, dates and mixed letters and numbers.
    const CORPUS: &[&str] = &[
        "",
        "0.9",
        "1",
        "1.0",
        "1.0.0",
        "1.0.1",
        "1.0.10",
        "1.0.9",
        "1.2",
        "1.2.0",
        "1.10",
        "2.0.0-alpha",
        "2.0.0-alpha.1",
        "2.0.0-beta",
        "2.0.0-beta.2",
        "2.0.0-beta.11",
        "2.0.0-rc.1",
        "2.0b3",
        "2.0 Beta 3",
        "2.0.beta3",
        "2.0_rc1",
        "1.0-beta",
        "1a",
        "1.a",
        "1.0.a",
        "1.0.x",
        "1.2.3a",
        "1.10b",
        "12",
        "build 12",
        "Version 7",
        "2.0",
        "2.0.0",
        "v2.0.1",
        "3.1.2",
        "3.1.2 (3120)",
        "3.2.0",
        "10.0.19045",
        "2023.12.31",
        "2024.01.15",
        "2024.1.16",
        "20240201",
        "latest",
        "current",
    ];

    fn numeric_only_corpus() -> Vec<VersionIdentity> {
        CORPUS
            .iter()
            .map(|raw| parse(raw))
            .filter(|identity| identity.is_numeric_only() && !identity.is_empty())
            .collect()
    }

    #[rstest]
    #[case("1.2", "1.2.0", Comparison::Equal)]
    #[case("1", "1.0.0", Comparison::Equal)]
    #[case("3.1.2", "3.1.2", Comparison::Equal)]
    #[case("3.1.2", "3.2.0", Comparison::Less)]
    #[case("3.2.0", "3.1.2", Comparison::Greater)]
    #[case("1.9", "1.10", Comparison::Less)]
    #[case("1.02", "1.2", Comparison::Equal)]
    #[case("v4.1.0", "4.1.0", Comparison::Equal)]
    #[case("2.0.0-beta", "2.0.0", Comparison::Less)]
    #[case("2.0.0", "2.0.0-rc.1", Comparison::Greater)]
    #[case("2.0.0-alpha", "2.0.0-beta", Comparison::Less)]
    #[case("2.0.0-beta.2", "2.0.0-beta.11", Comparison::Less)]
    #[case("2.0.0-beta", "2.0.0-beta.1", Comparison::Less)]
    #[case("2.0.0-beta", "2.0.0-beta1", Comparison::Less)]
    #[case("2.0b3", "2.0", Comparison::Less)]
    #[case("1.9.9", "2.0.0-beta", Comparison::Less)]
    #[case("5.1.2 (5102)", "5.1.2", Comparison::Equal)]
    #[case("5.1.2 (5102)", "5.1.2 (5200)", Comparison::Equal)]
    #[case("2024.01.15", "2024.1.16", Comparison::Less)]
    #[case("2024.02.01", "2024.01.15", Comparison::Greater)]
    #[case("2024.01.15", "2024.01.15-beta", Comparison::Greater)]
    #[case("1.0", "latest", Comparison::Incomparable)]
    #[case("latest", "latest", Comparison::Equal)]
    #[case("Latest", "latest", Comparison::Equal)]
    #[case("latest", "current", Comparison::Incomparable)]
    #[case("", "", Comparison::Equal)]
    #[case("", "0.0.1", Comparison::Less)]
    #[case("", "latest", Comparison::Less)]
    #[case("1.0.0", "1.0.x", Comparison::Less)]
    #[case("build 12", "12", Comparison::Incomparable)]
    #[case("1.0", "1.0.a", Comparison::Less)]
    #[case("1.0", "1a", Comparison::Less)]
    #[case("1.0-beta", "1a", Comparison::Less)]
    #[case("1.00", "1", Comparison::Equal)]
    #[case("1.0.a", "1.a", Comparison::Less)]
    #[case("1.2.3a", "1.2.3.4", Comparison::Incomparable)]
    #[case("2.0 Beta 3", "2.0", Comparison::Less)]
    #[case("2.0.beta3", "2.0-beta.3", Comparison::Equal)]
    #[case("2.0_rc1", "2.0.beta3", Comparison::Greater)]
    #[case("99999999999999999999999", "99999999999999999999998", Comparison::Greater)]
    fn compare_returns_expected(#[case] a: &str, #[case] b: &str, #[case] expected: Comparison) {
        assert_eq!(cmp(a, b), expected, "compare({a:?}, {b:?})");
    }

    #[test]
    fn compare_zero_pad_equivalence() {
        assert_eq!(cmp("1.2", "1.2.0"), Comparison::Equal);
    }

    #[test]
    fn compare_pre_release_precedes_release() {
        assert_eq!(cmp("2.0.0-beta", "2.0.0"), Comparison::Less);
    }

    #[test]
    fn compare_numeric_against_alphabetic_is_incomparable() {
        assert_eq!(cmp("1.0", "latest"), Comparison::Incomparable);
    }

    #[test]
    fn compare_is_total_on_numeric_only_identities() {
        let corpus = numeric_only_corpus();
        assert!(corpus.len() > 10);
        for a in &corpus {
            for b in &corpus {
                assert_ne!(
                    compare(a, b),
                    Comparison::Incomparable,
                    "compare({}, {})",
                    a,
                    b
                );
            }
        }
    }

    #[test]
    fn compare_is_reflexive() {
        for raw in CORPUS {
            let identity = parse(raw);
            assert_eq!(compare(&identity, &identity), Comparison::Equal, "{raw:?}");
        }
    }

    #[test]
    fn compare_is_antisymmetric() {
        let corpus: Vec<VersionIdentity> = CORPUS.iter().map(|raw| parse(raw)).collect();
        for a in &corpus {
            for b in &corpus {
                assert_eq!(
                    compare(a, b),
                    compare(b, a).reverse(),
                    "compare({:?}, {:?})",
                    a.raw(),
                    b.raw()
                );
            }
        }
    }

    #[test]
    fn compare_is_transitive() {
        let corpus: Vec<VersionIdentity> = CORPUS.iter().map(|raw| parse(raw)).collect();
        for a in &corpus {
            for b in &corpus {
                if compare(a, b) != Comparison::Less {
                    continue;
                }
                for c in &corpus {
                    if compare(b, c) == Comparison::Less {
                        assert_eq!(
                            compare(a, c),
                            Comparison::Less,
                            "{:?} < {:?} < {:?}",
                            a.raw(),
                            b.raw(),
                            c.raw()
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn compare_to_delegates_to_compare() {
        let a = parse("1.0");
        let b = parse("1.1");
        assert_eq!(a.compare_to(&b), Comparison::Less);
    }
}
