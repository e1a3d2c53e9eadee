//! Python literal rendering
//!
//! Every user-supplied string that ends up in a script passes through here.

use std::path::Path;

use dps_core::Literal;

/// A double-quoted Python string literal
pub fn string(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 || c as u32 == 0x7f => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// A file path literal
///
/// Paths with backslash separators become raw strings when Python can
/// represent them that way; everything else is an ordinary escaped string.
pub fn path(path: &Path) -> String {
    let text = path.to_string_lossy();
    if can_be_raw(&text) {
        format!("r\"{}\"", text)
    } else {
        string(&text)
    }
}

fn can_be_raw(text: &str) -> bool {
    text.contains('\\')
        && !text.ends_with('\\')
        && !text.chars().any(|c| c == '"' || c.is_control())
}

/// A Python float; non-finite values use `float(...)`
pub fn float(value: f64) -> String {
    if value.is_nan() {
        "float(\"nan\")".to_string()
    } else if value.is_infinite() {
        if value > 0.0 {
            "float(\"inf\")".to_string()
        } else {
            "-float(\"inf\")".to_string()
        }
    } else {
        // `{:?}` always keeps a decimal point or exponent
        format!("{:?}", value)
    }
}

/// A filter or fill literal
pub fn literal(value: &Literal) -> String {
    match value {
        Literal::Null => "None".to_string(),
        Literal::Bool(true) => "True".to_string(),
        Literal::Bool(false) => "False".to_string(),
        Literal::Int(i) => i.to_string(),
        Literal::Float(f) => float(*f),
        Literal::Text(s) => string(s),
        Literal::List(items) => {
            let inner: Vec<String> = items.iter().map(literal).collect();
            format!("[{}]", inner.join(", "))
        }
    }
}

/// A list of string literals
pub fn list<S: AsRef<str>>(items: &[S]) -> String {
    let inner: Vec<String> = items.iter().map(|s| string(s.as_ref())).collect();
    format!("[{}]", inner.join(", "))
}

pub fn boolean(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

/// `None` or a quoted string
pub fn optional(value: Option<&str>) -> String {
    value.map(string).unwrap_or_else(|| "None".to_string())
}
