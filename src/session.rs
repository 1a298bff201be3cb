use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

/// Parse a cookie file's content into ordered `(name, value)` pairs.
///
/// Supported formats per line:
/// - single pair: `Water=ACC%3D...`
/// - several pairs separated by `;`: `Water=...; _lang=Lang%3DTW`
///   (so a `Cookie:` header value pasted from browser devtools works as-is)
/// - comments: everything after `#` is ignored
/// - whitespace and blank lines are ignored
///
/// Cookie values are kept verbatim; the caller is expected to provide them
/// already percent-encoded the way the browser sent them. Duplicate names
/// keep the first occurrence.
pub fn parse_cookies_str(s: &str) -> Result<Vec<(String, String)>> {
    let mut out: Vec<(String, String)> = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for (idx, raw_line) in s.lines().enumerate() {
        let line_no = idx + 1;
        // Strip comments and trim
        let line = raw_line.split('#').next().map(str::trim).unwrap_or("");
        if line.is_empty() {
            continue;
        }

        for pair in line.split(';') {
            let pair = pair.trim();
            if pair.is_empty() {
                continue;
            }
            let (name, value) = pair
                .split_once('=')
                .with_context(|| format!("line {line_no}: cookie pair missing '=': {pair}"))?;
            let name = name.trim();
            if name.is_empty() {
                bail!("line {line_no}: cookie pair has empty name: {pair}");
            }
            if seen.insert(name.to_string()) {
                out.push((name.to_string(), value.trim().to_string()));
            }
        }
    }

    Ok(out)
}

/// Load a cookie jar from a file path. Errors if the file cannot be read or parsed.
pub fn load_cookies_from_path(path: impl AsRef<Path>) -> Result<Vec<(String, String)>> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("failed to read cookie file: {}", path.as_ref().display()))?;
    parse_cookies_str(&content)
}

/// Join cookie pairs into a single `Cookie` header value.
/// Returns an empty string for an empty jar (callers skip the header then).
pub fn cookie_header_value(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(n, v)| format!("{n}={v}"))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_one_pair_per_line() {
        let input = "Water=abc\n_lang=Lang%3DTW\n";
        let pairs = parse_cookies_str(input).unwrap();
        assert_eq!(
            pairs,
            vec![
                ("Water".to_string(), "abc".to_string()),
                ("_lang".to_string(), "Lang%3DTW".to_string()),
            ]
        );
    }

    #[test]
    fn parse_header_style_line_with_comments() {
        let input = r#"
            # session blob pasted from devtools
            Water=tok; Water_Log=T%3Dx; _ga=GA1.1.1

            _lang=Lang%3DTW  # locale
        "#;
        let pairs = parse_cookies_str(input).unwrap();
        let names: Vec<_> = pairs.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["Water", "Water_Log", "_ga", "_lang"]);
    }

    #[test]
    fn duplicate_names_keep_first() {
        let input = "Water=first\nWater=second\n";
        let pairs = parse_cookies_str(input).unwrap();
        assert_eq!(pairs, vec![("Water".to_string(), "first".to_string())]);
    }

    #[test]
    fn pair_without_equals_errors() {
        assert!(parse_cookies_str("Water\n").is_err());
    }

    #[test]
    fn header_value_joins_with_semicolons() {
        let pairs = vec![
            ("a".to_string(), "1".to_string()),
            ("b".to_string(), "2".to_string()),
        ];
        assert_eq!(cookie_header_value(&pairs), "a=1; b=2");
        assert_eq!(cookie_header_value(&[]), "");
    }

    #[test]
    fn values_keep_inner_equals_signs() {
        let pairs = parse_cookies_str("Water=ACC=x&UID=y\n").unwrap();
        assert_eq!(pairs[0].1, "ACC=x&UID=y");
    }
}
