//! Ban predicates: `(field, op, operand)` triples (spec §4.6).

use regex::Regex;

/// What a predicate tests against. `Header` names are matched
/// case-insensitively, as HTTP header names are.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BanField {
    /// The request URL that produced the cached object.
    ReqUrl,
    /// The cached response's status code, as a decimal string.
    ObjStatus,
    /// A response header, by name.
    ObjHttp(String),
}

/// The comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BanOp {
    /// Exact string equality.
    Eq,
    /// String inequality.
    Ne,
    /// Regex match.
    Match,
    /// Regex non-match.
    NotMatch,
}

/// What a predicate compares the field's value against.
#[derive(Clone)]
pub enum BanOperand {
    /// A literal string, for `Eq`/`Ne`.
    Literal(String),
    /// A compiled pattern, for `Match`/`NotMatch`.
    Pattern(Regex),
}

impl std::fmt::Debug for BanOperand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BanOperand::Literal(s) => write!(f, "Literal({s:?})"),
            BanOperand::Pattern(r) => write!(f, "Pattern({})", r.as_str()),
        }
    }
}

/// Metadata a ban predicate can be tested against. Implemented by
/// whichever caller knows the request/response in question — this crate
/// has no notion of either beyond this trait.
pub trait BanTarget {
    /// The request URL.
    fn url(&self) -> &str;
    /// A response header's value, if present. Looked up
    /// case-insensitively.
    fn header(&self, name: &str) -> Option<&str>;
    /// The response status code.
    fn status(&self) -> u16;
}

/// A single `(field, op, operand)` test.
#[derive(Debug, Clone)]
pub struct BanPredicate {
    field: BanField,
    op: BanOp,
    operand: BanOperand,
}

/// A predicate was constructed with a regex operator but an operand that
/// doesn't compile as a pattern.
#[derive(Debug, thiserror::Error)]
#[error("invalid ban pattern {pattern:?}: {source}")]
pub struct BanPredicateError {
    pattern: String,
    #[source]
    source: regex::Error,
}

impl BanPredicate {
    /// Builds a literal-comparison predicate (`Eq`/`Ne`).
    pub fn literal(field: BanField, op: BanOp, value: impl Into<String>) -> Self {
        debug_assert!(matches!(op, BanOp::Eq | BanOp::Ne));
        BanPredicate {
            field,
            op,
            operand: BanOperand::Literal(value.into()),
        }
    }

    /// Builds a regex-comparison predicate (`Match`/`NotMatch`), compiling
    /// `pattern` up front so a malformed ban is rejected at insert time
    /// rather than at first evaluation.
    pub fn pattern(field: BanField, op: BanOp, pattern: &str) -> Result<Self, BanPredicateError> {
        debug_assert!(matches!(op, BanOp::Match | BanOp::NotMatch));
        let regex = Regex::new(pattern).map_err(|source| BanPredicateError {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(BanPredicate {
            field,
            op,
            operand: BanOperand::Pattern(regex),
        })
    }

    fn field_value<'a>(&self, target: &'a dyn BanTarget, status_buf: &'a mut String) -> Option<&'a str> {
        match &self.field {
            BanField::ReqUrl => Some(target.url()),
            BanField::ObjStatus => {
                *status_buf = target.status().to_string();
                Some(status_buf.as_str())
            }
            BanField::ObjHttp(name) => target.header(name),
        }
    }

    /// Whether `target` satisfies this predicate. A missing field (e.g. an
    /// absent header) is treated as the empty string, matching the
    /// original's "absent compares equal to empty" convention.
    pub fn matches(&self, target: &dyn BanTarget) -> bool {
        let mut status_buf = String::new();
        let value = self.field_value(target, &mut status_buf).unwrap_or("");
        match (&self.operand, self.op) {
            (BanOperand::Literal(lit), BanOp::Eq) => value == lit,
            (BanOperand::Literal(lit), BanOp::Ne) => value != lit,
            (BanOperand::Pattern(re), BanOp::Match) => re.is_match(value),
            (BanOperand::Pattern(re), BanOp::NotMatch) => !re.is_match(value),
            _ => unreachable!("operand/op combination enforced at construction"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        url: String,
        status: u16,
        headers: Vec<(String, String)>,
    }

    impl BanTarget for Fixture {
        fn url(&self) -> &str {
            &self.url
        }
        fn header(&self, name: &str) -> Option<&str> {
            self.headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str())
        }
        fn status(&self) -> u16 {
            self.status
        }
    }

    fn fixture() -> Fixture {
        Fixture {
            url: "/a".into(),
            status: 200,
            headers: vec![("content-type".into(), "text/html".into())],
        }
    }

    #[test]
    fn literal_eq_matches_exact_url() {
        let pred = BanPredicate::literal(BanField::ReqUrl, BanOp::Eq, "/a");
        assert!(pred.matches(&fixture()));
        let pred = BanPredicate::literal(BanField::ReqUrl, BanOp::Eq, "/b");
        assert!(!pred.matches(&fixture()));
    }

    #[test]
    fn pattern_match_tests_regex_against_url() {
        let pred = BanPredicate::pattern(BanField::ReqUrl, BanOp::Match, "^/a$").unwrap();
        assert!(pred.matches(&fixture()));
        let pred = BanPredicate::pattern(BanField::ReqUrl, BanOp::Match, "^/b$").unwrap();
        assert!(!pred.matches(&fixture()));
    }

    #[test]
    fn status_field_compares_as_decimal_string() {
        let pred = BanPredicate::literal(BanField::ObjStatus, BanOp::Eq, "200");
        assert!(pred.matches(&fixture()));
    }

    #[test]
    fn missing_header_compares_as_empty_string() {
        let pred = BanPredicate::literal(BanField::ObjHttp("x-missing".into()), BanOp::Eq, "");
        assert!(pred.matches(&fixture()));
    }

    #[test]
    fn invalid_pattern_is_rejected_at_construction() {
        assert!(BanPredicate::pattern(BanField::ReqUrl, BanOp::Match, "(unterminated").is_err());
    }
}
