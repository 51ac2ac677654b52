use once_cell::sync::Lazy;
use regex::Regex;

use crate::consts::{DEFAULT_COLS, DEFAULT_ROWS};

pub const MIN_TERMINAL_DIMENSION: u16 = 1;
pub const MAX_TERMINAL_DIMENSION: u16 = 9999;

pub const MAX_ENV_PAIRS: usize = 50;
pub const MAX_ENV_VALUE_LEN: usize = 512;

#[allow(clippy::unwrap_used)]
static ENV_KEY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z][A-Z0-9_]{0,31}$").unwrap());

/// Live PTY geometry. Always within the clamp range once stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalDimensions {
    pub rows: u16,
    pub cols: u16,
}

impl Default for TerminalDimensions {
    fn default() -> Self {
        Self {
            rows: DEFAULT_ROWS,
            cols: DEFAULT_COLS,
        }
    }
}

/// Maps a raw wire value into the permitted range. `None` means the client
/// sent nothing usable (missing, zero, or not a finite number) and the
/// caller should fall back to the last known value, then the default.
pub fn clamp_dimension(raw: Option<f64>) -> Option<u16> {
    let value = raw?;
    if !value.is_finite() || value == 0.0 {
        return None;
    }
    let value = value as i64;
    Some(value.clamp(MIN_TERMINAL_DIMENSION as i64, MAX_TERMINAL_DIMENSION as i64) as u16)
}

/// Unspecified inputs resolve against the session's last known value, then
/// the 24x80 default. Idempotent over its own output.
pub fn resolve_dimensions(
    rows: Option<f64>,
    cols: Option<f64>,
    last: Option<TerminalDimensions>,
) -> TerminalDimensions {
    let fallback = last.unwrap_or_default();
    TerminalDimensions {
        rows: clamp_dimension(rows).unwrap_or(fallback.rows),
        cols: clamp_dimension(cols).unwrap_or(fallback.cols),
    }
}

fn is_valid_env_value(value: &str) -> bool {
    value.len() <= MAX_ENV_VALUE_LEN
        && !value
            .chars()
            .any(|c| matches!(c, ';' | '&' | '|' | '`' | '$'))
}

/// Keeps the pairs that satisfy the key/value rules, capped at
/// [`MAX_ENV_PAIRS`]. Order of surviving pairs is preserved.
pub fn sanitize_env(pairs: &[(String, String)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .filter(|(key, value)| ENV_KEY_RE.is_match(key) && is_valid_env_value(value))
        .take(MAX_ENV_PAIRS)
        .cloned()
        .collect()
}

/// Parses the landing page's `env` query parameter: comma-separated
/// `NAME=value` pairs. Entries without `=` are dropped.
pub fn parse_env_string(raw: &str) -> Vec<(String, String)> {
    raw.split(',')
        .filter_map(|entry| {
            entry
                .split_once('=')
                .map(|(k, v)| (k.to_owned(), v.to_owned()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_basic() {
        assert_eq!(clamp_dimension(Some(24.0)), Some(24));
        assert_eq!(clamp_dimension(Some(12000.0)), Some(9999));
        assert_eq!(clamp_dimension(Some(-3.0)), Some(1));
        assert_eq!(clamp_dimension(Some(0.0)), None);
        assert_eq!(clamp_dimension(Some(f64::NAN)), None);
        assert_eq!(clamp_dimension(Some(f64::INFINITY)), None);
        assert_eq!(clamp_dimension(None), None);
    }

    #[test]
    fn test_clamp_idempotent() {
        for raw in [1.0, 24.0, 9999.0, 20000.0, -1.0] {
            let once = clamp_dimension(Some(raw));
            let twice = clamp_dimension(once.map(f64::from));
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_resolve_fallback_chain() {
        let last = TerminalDimensions { rows: 50, cols: 132 };
        assert_eq!(
            resolve_dimensions(None, Some(100.0), Some(last)),
            TerminalDimensions { rows: 50, cols: 100 }
        );
        assert_eq!(
            resolve_dimensions(Some(0.0), None, None),
            TerminalDimensions::default()
        );
    }

    #[test]
    fn test_env_key_rules() {
        let pairs = vec![
            ("PATH_EXTRA".to_owned(), "/opt/bin".to_owned()),
            ("lowercase".to_owned(), "x".to_owned()),
            ("1LEADING".to_owned(), "x".to_owned()),
            ("INJECT".to_owned(), "a;rm -rf /".to_owned()),
            ("BACKTICK".to_owned(), "`id`".to_owned()),
        ];
        let sanitized = sanitize_env(&pairs);
        assert_eq!(sanitized.len(), 1);
        assert_eq!(sanitized[0].0, "PATH_EXTRA");
    }

    #[test]
    fn test_env_pair_cap() {
        let pairs: Vec<_> = (0..60)
            .map(|i| (format!("VAR_{i}"), "v".to_owned()))
            .collect();
        assert_eq!(sanitize_env(&pairs).len(), MAX_ENV_PAIRS);
    }

    #[test]
    fn test_parse_env_string() {
        let parsed = parse_env_string("FOO=bar,BAZ=qux,notapair");
        assert_eq!(
            parsed,
            vec![
                ("FOO".to_owned(), "bar".to_owned()),
                ("BAZ".to_owned(), "qux".to_owned())
            ]
        );
    }
}
