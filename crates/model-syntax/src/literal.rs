//! Literal normalization shared by the parser and the printer.
//!
//! Numbers are stored in one canonical spelling so that `0x10`, `1_6` and
//! `16` serialize identically; strings are re-quoted with Python `repr`
//! rules.

/// Canonical decimal spelling of an integer literal.
pub fn normalize_int(text: &str) -> String {
    let cleaned: String = text.chars().filter(|c| *c != '_').collect();
    let lowered = cleaned.to_ascii_lowercase();
    let radix = if lowered.starts_with("0x") {
        Some(16)
    } else if lowered.starts_with("0o") {
        Some(8)
    } else if lowered.starts_with("0b") {
        Some(2)
    } else {
        None
    };
    if let Some(radix) = radix {
        return match u128::from_str_radix(&lowered[2..], radix) {
            Ok(value) => value.to_string(),
            Err(_) => lowered,
        };
    }
    let trimmed = lowered.trim_start_matches('0');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Canonical spelling of a float literal, following Python `repr`.
pub fn normalize_float(text: &str) -> String {
    let cleaned: String = text.chars().filter(|c| *c != '_').collect();
    match cleaned.parse::<f64>() {
        Ok(value) => float_repr(value),
        Err(_) => cleaned,
    }
}

pub fn normalize_imaginary(text: &str) -> String {
    text.chars()
        .filter(|c| *c != '_')
        .collect::<String>()
        .to_ascii_lowercase()
}

/// Shortest round-trip float spelling with Python's exponent thresholds.
pub fn float_repr(value: f64) -> String {
    if value.is_infinite() {
        return if value > 0.0 { "1e309" } else { "-1e309" }.to_string();
    }
    if value.is_nan() {
        return "nan".to_string();
    }
    if value == 0.0 {
        return "0.0".to_string();
    }
    let scientific = format!("{value:e}");
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return scientific;
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);
    if (-4..16).contains(&exponent) {
        let plain = format!("{value}");
        if plain.contains('.') {
            plain
        } else {
            format!("{plain}.0")
        }
    } else {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{mantissa}e{sign}{:02}", exponent.abs())
    }
}

/// Quote `value` the way Python's `repr(str)` does.
pub fn repr_str(value: &str) -> String {
    let quote = if value.contains('\'') && !value.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(value.len() + 2);
    out.push(quote);
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

/// Quote a docstring the way `ast.unparse` does: triple quotes, newlines
/// and tabs kept literal, backslashes and other control characters escaped.
pub fn docstring_literal(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\n' | '\t' => escaped.push(c),
            '\\' => escaped.push_str("\\\\"),
            '\r' => escaped.push_str("\\r"),
            c if c.is_control() || matches!(c, '\u{2028}' | '\u{2029}') => {
                let code = c as u32;
                if code < 0x100 {
                    escaped.push_str(&format!("\\x{code:02x}"));
                } else {
                    escaped.push_str(&format!("\\u{code:04x}"));
                }
            }
            c => escaped.push(c),
        }
    }

    let mut quotes: Vec<&str> = ["\"\"\"", "'''"]
        .into_iter()
        .filter(|q| !escaped.contains(q))
        .collect();
    if quotes.is_empty() {
        let repr = repr_str(value);
        let quote = if repr.starts_with('"') { "\"\"\"" } else { "'''" };
        return format!("{quote}{}{quote}", &repr[1..repr.len() - 1]);
    }
    let last = escaped.chars().last();
    // a quote matching the last character would close the literal early
    quotes.sort_by_key(|q| q.starts_with(|c| Some(c) == last));
    let quote = quotes[0];
    if let Some(last) = last.filter(|c| quote.starts_with(*c)) {
        escaped.pop();
        escaped.push('\\');
        escaped.push(last);
    }
    format!("{quote}{escaped}{quote}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_spellings_collapse() {
        assert_eq!(normalize_int("0x10"), "16");
        assert_eq!(normalize_int("1_6"), "16");
        assert_eq!(normalize_int("0b1"), "1");
        assert_eq!(normalize_int("000"), "0");
    }

    #[test]
    fn test_float_repr_matches_python() {
        assert_eq!(normalize_float("1."), "1.0");
        assert_eq!(normalize_float(".5"), "0.5");
        assert_eq!(normalize_float("1e3"), "1000.0");
        assert_eq!(normalize_float("1e-5"), "1e-05");
        assert_eq!(normalize_float("0.001"), "0.001");
        assert_eq!(normalize_float("1e16"), "1e+16");
    }

    #[test]
    fn test_docstring_quoting() {
        assert_eq!(docstring_literal("doc"), r#""""doc""""#);
        assert_eq!(docstring_literal("two\nlines"), "\"\"\"two\nlines\"\"\"");
        // ends with a double quote, so single triple quotes win
        assert_eq!(docstring_literal("say \"hi\""), r#"'''say "hi"'''"#);
        assert_eq!(docstring_literal("a\\b"), r#""""a\\b""""#);
        assert_eq!(docstring_literal("has \"\"\" inside"), r#"'''has """ inside'''"#);
    }

    #[test]
    fn test_repr_prefers_single_quotes() {
        assert_eq!(repr_str("relu"), "'relu'");
        assert_eq!(repr_str("it's"), "\"it's\"");
        assert_eq!(repr_str("a\nb"), "'a\\nb'");
        assert_eq!(repr_str("both ' and \""), "'both \\' and \"'");
    }
}
