//! Ordered substitution rules and the whole-buffer transformer

use std::borrow::Cow;
use std::sync::Arc;

use regex::bytes::Regex;

use crate::error::{Result, StreamError};

/// A single substitution: every leftmost non-overlapping match of `pattern`
/// is replaced by `replacement`.
///
/// Replacements expand `$1` / `${name}` capture references, the same way
/// `Regex::replace_all` does. Literal rules escape both sides.
#[derive(Debug, Clone)]
pub struct Transformation {
    pattern: Regex,
    replacement: Vec<u8>,
    max_match_len: Option<usize>,
}

impl Transformation {
    /// Compile a regex rule.
    ///
    /// Patterns that match the empty string (`x*`, `a?`, `(foo)?`) are
    /// rejected with [`StreamError::EmptyMatch`]; see [`from_regex`].
    ///
    /// [`from_regex`]: Transformation::from_regex
    pub fn new(pattern: &str, replacement: impl Into<Vec<u8>>) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(|source| StreamError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        Self::from_regex(regex, replacement)
    }

    /// Build a rule from an already compiled pattern.
    ///
    /// Patterns that can match the empty string are rejected: an empty match
    /// sitting on a chunk boundary would be reported twice by a streaming scan.
    pub fn from_regex(pattern: Regex, replacement: impl Into<Vec<u8>>) -> Result<Self> {
        if pattern.is_match(b"") {
            return Err(StreamError::EmptyMatch(pattern.as_str().to_string()));
        }
        Ok(Self {
            pattern,
            replacement: replacement.into(),
            max_match_len: None,
        })
    }

    /// Plain text search and replace, no metacharacters and no `$` expansion.
    pub fn literal(search: &str, replacement: &str) -> Result<Self> {
        let mut rule = Self::new(&regex::escape(search), replacement.replace('$', "$$"))?;
        rule.max_match_len = Some(search.len());
        Ok(rule)
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn replacement(&self) -> &[u8] {
        &self.replacement
    }

    /// Longest span this rule can match, when it is known (literal rules).
    pub fn max_match_len(&self) -> Option<usize> {
        self.max_match_len
    }

    /// Replace every match in `input`.
    pub fn replace_all<'h>(&self, input: &'h [u8]) -> Cow<'h, [u8]> {
        self.pattern.replace_all(input, self.replacement.as_slice())
    }

    /// Replace the matches of `haystack[start..]` that start before
    /// `boundary` and append the committed region to `out`.
    ///
    /// `haystack[..start]` is already committed and only serves as left
    /// context for look-behind assertions. Unless `boundary` is the end of
    /// `haystack`, a match running up to the very end is not trusted: the
    /// bytes after it are still unknown.
    ///
    /// Returns the end of the committed region: normally at least
    /// `boundary`, more when the last committed match runs past it, less
    /// when an untrusted match starts before it. Bytes after that point are
    /// untouched and must be offered again together with whatever follows.
    pub(crate) fn replace_committed(
        &self,
        haystack: &[u8],
        start: usize,
        boundary: usize,
        out: &mut Vec<u8>,
    ) -> usize {
        let boundary = boundary.clamp(start, haystack.len());
        let at_end = boundary == haystack.len();
        let mut cursor = start;
        let mut search_from = start;
        let mut committed = None;

        while search_from <= haystack.len() {
            let Some(caps) = self.pattern.captures_at(haystack, search_from) else {
                break;
            };
            let Some(found) = caps.get(0) else {
                break;
            };
            if found.start() >= boundary {
                break;
            }
            // Zero-width hits (`\b` alone) are skipped.
            if found.is_empty() {
                search_from = found.end() + 1;
                continue;
            }
            if found.end() == haystack.len() && !at_end {
                committed = Some(found.start());
                break;
            }
            out.extend_from_slice(&haystack[cursor..found.start()]);
            caps.expand(&self.replacement, out);
            cursor = found.end();
            search_from = cursor;
        }

        let committed = committed.unwrap_or_else(|| boundary.max(cursor));
        out.extend_from_slice(&haystack[cursor..committed]);
        committed
    }
}

/// An ordered, cheaply cloneable list of transformations.
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Arc<[Transformation]>,
}

impl RuleSet {
    pub fn new(rules: Vec<Transformation>) -> Self {
        Self {
            rules: Arc::from(rules),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Transformation> {
        self.rules.iter()
    }

    pub fn as_slice(&self) -> &[Transformation] {
        &self.rules
    }

    /// The longest known match span across all rules.
    pub fn lookback_hint(&self) -> Option<usize> {
        self.rules.iter().filter_map(|r| r.max_match_len()).max()
    }

    /// `configured`, widened to the longest known match span.
    pub fn lookback_for(&self, configured: usize) -> usize {
        self.lookback_hint()
            .map_or(configured, |longest| longest.max(configured))
    }

    /// Apply every rule to the whole of `input`.
    pub fn apply(&self, input: &[u8]) -> Vec<u8> {
        apply_all(&self.rules, input)
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::empty()
    }
}

impl FromIterator<Transformation> for RuleSet {
    fn from_iter<I: IntoIterator<Item = Transformation>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Apply `rules` in order; each rule sees the output of the ones before it.
pub fn apply_all(rules: &[Transformation], input: &[u8]) -> Vec<u8> {
    let mut current = input.to_vec();
    for rule in rules {
        let next = match rule.replace_all(&current) {
            Cow::Borrowed(_) => continue,
            Cow::Owned(next) => next,
        };
        current = next;
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(search: &str, replacement: &str) -> Transformation {
        Transformation::literal(search, replacement).unwrap()
    }

    #[test]
    fn test_single_rule_replaces_match() {
        let rules = vec![lit("white", "black")];
        let output = apply_all(&rules, b"This is a white test string.");
        assert_eq!(output, b"This is a black test string.");
    }

    #[test]
    fn test_rules_apply_in_order() {
        let rules = vec![lit("black", "white"), lit("red", "green")];
        let output = apply_all(&rules, b"The black cat is on the red mat.");
        assert_eq!(output, b"The white cat is on the green mat.");
    }

    #[test]
    fn test_later_rule_sees_earlier_replacement() {
        let rules = vec![lit("cat", "dog"), lit("dog", "fox")];
        assert_eq!(apply_all(&rules, b"cat and dog"), b"fox and fox");

        let reversed = vec![lit("dog", "fox"), lit("cat", "dog")];
        assert_eq!(apply_all(&reversed, b"cat and dog"), b"dog and fox");
    }

    #[test]
    fn test_matches_do_not_overlap() {
        let rules = vec![lit("aa", "b")];
        assert_eq!(apply_all(&rules, b"aaaaa"), b"bba");
    }

    #[test]
    fn test_no_rules_is_identity() {
        assert_eq!(apply_all(&[], b"unchanged"), b"unchanged");
    }

    #[test]
    fn test_literal_escapes_metacharacters() {
        let rules = vec![lit("{black}", "$1{white}")];
        assert_eq!(apply_all(&rules, b"x{black}y"), b"x$1{white}y");
    }

    #[test]
    fn test_regex_rule_expands_captures() {
        let rule = Transformation::new(r"(\w+)@example\.com", "$1@redacted").unwrap();
        let output = apply_all(&[rule], b"mail bob@example.com now");
        assert_eq!(output, b"mail bob@redacted now");
    }

    #[test]
    fn test_invalid_pattern_is_reported() {
        let err = Transformation::new("(unclosed", "x").unwrap_err();
        assert!(matches!(err, StreamError::InvalidPattern { .. }));
        assert!(err.to_string().contains("(unclosed"));
    }

    #[test]
    fn test_empty_matching_pattern_is_rejected() {
        let err = Transformation::new("x*", "y").unwrap_err();
        assert!(matches!(err, StreamError::EmptyMatch(_)));
        assert!(matches!(
            Transformation::new("a?", "y"),
            Err(StreamError::EmptyMatch(_))
        ));
        assert!(matches!(
            Transformation::new("(foo)?", "y"),
            Err(StreamError::EmptyMatch(_))
        ));
        assert!(Transformation::literal("", "y").is_err());
    }

    #[test]
    fn test_replace_committed_stops_at_boundary() {
        let rule = lit("ab", "X");
        let mut out = Vec::new();
        // Match at 0 is committed, match at 4 starts past the boundary.
        let committed = rule.replace_committed(b"ab--ab", 0, 3, &mut out);
        assert_eq!(committed, 3);
        assert_eq!(out, b"X-");
    }

    #[test]
    fn test_replace_committed_extends_past_boundary() {
        let rule = lit("abcd", "X");
        let mut out = Vec::new();
        let committed = rule.replace_committed(b"-abcd-", 0, 2, &mut out);
        assert_eq!(committed, 5);
        assert_eq!(out, b"-X");
    }

    #[test]
    fn test_replace_committed_uses_left_context() {
        let rule = Transformation::new(r"\bred\b", "green").unwrap();
        let mut out = Vec::new();
        // "bo" is context: "red" continues a word and must not match.
        let committed = rule.replace_committed(b"bored!", 2, 5, &mut out);
        assert_eq!(committed, 5);
        assert_eq!(out, b"red");

        let mut out = Vec::new();
        let committed = rule.replace_committed(b" red red!", 1, 8, &mut out);
        assert_eq!(committed, 8);
        assert_eq!(out, b"green green");
    }

    #[test]
    fn test_replace_committed_defers_match_touching_the_end() {
        let rule = Transformation::new(r"\w+", "W").unwrap();
        let mut out = Vec::new();
        // "abc" may continue in the next chunk.
        let committed = rule.replace_committed(b"x abc", 0, 4, &mut out);
        assert_eq!(committed, 2);
        assert_eq!(out, b"W ");

        let mut out = Vec::new();
        let committed = rule.replace_committed(b"x abc", 0, 5, &mut out);
        assert_eq!(committed, 5);
        assert_eq!(out, b"W W");
    }

    #[test]
    fn test_lookback_for_widens_to_longest_literal() {
        let rules: RuleSet = vec![lit("red", "green"), lit("black", "white")]
            .into_iter()
            .collect();
        assert_eq!(rules.lookback_for(2), 5);
        assert_eq!(rules.lookback_for(100), 100);
        assert_eq!(RuleSet::empty().lookback_for(7), 7);
    }

    #[test]
    fn test_lookback_hint_uses_longest_literal() {
        let rules: RuleSet = vec![lit("red", "green"), lit("black", "white")]
            .into_iter()
            .collect();
        assert_eq!(rules.lookback_hint(), Some(5));
        assert_eq!(RuleSet::empty().lookback_hint(), None);
    }
}
