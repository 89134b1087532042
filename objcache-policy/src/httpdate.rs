//! Parsing the three legal `HTTP-date` formats (RFC 9110 §5.6.7, carried
//! from RFC 2616 §3.3.1, which `rfc2616.c`'s `TIM_parse` also accepts):
//! the preferred IMF-fixdate (`Sun, 06 Nov 1994 08:49:37 GMT`), obsolete
//! RFC 850 (`Sunday, 06-Nov-94 08:49:37 GMT`), and ANSI C `asctime`
//! (`Sun Nov  6 08:49:37 1994`).

use chrono::{DateTime, NaiveDateTime, Utc};

const IMF_FIXDATE: &str = "%a, %d %b %Y %H:%M:%S GMT";
const RFC_850: &str = "%A, %d-%b-%y %H:%M:%S GMT";
const ASCTIME: &str = "%a %b %e %H:%M:%S %Y";

/// Parses an `HTTP-date` header value, trying each legal format in turn.
/// Returns `None` on anything that doesn't match one of the three (the
/// caller's policy is to treat an unparsable date the same as an absent
/// one, per `rfc2616.c`'s `TIM_parse` returning `0`).
pub fn parse(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, IMF_FIXDATE) {
        return Some(naive.and_utc());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, RFC_850) {
        return Some(naive.and_utc());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, ASCTIME) {
        return Some(naive.and_utc());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_imf_fixdate() {
        let dt = parse("Sun, 06 Nov 1994 08:49:37 GMT").unwrap();
        assert_eq!(dt.timestamp(), 784111777);
    }

    #[test]
    fn parses_rfc850() {
        let dt = parse("Sunday, 06-Nov-94 08:49:37 GMT").unwrap();
        assert_eq!(dt.timestamp(), 784111777);
    }

    #[test]
    fn parses_asctime() {
        let dt = parse("Sun Nov  6 08:49:37 1994").unwrap();
        assert_eq!(dt.timestamp(), 784111777);
    }

    #[test]
    fn garbage_returns_none() {
        assert!(parse("not a date").is_none());
    }
}
