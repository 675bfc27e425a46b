use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

lazy_static! {
    /// Strings matching this pattern are written as bare atoms
    static ref ATOM: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_.$]*$").unwrap();
}

const INDENT: &str = "    ";

/// Printer for the Sisp notation, the inverse of [`super::SispParser`]
///
/// Forms that fit on the remaining width are written on one line; longer forms put each
/// argument on its own line.
pub struct SispPrinter {
    width: usize,
}

impl Default for SispPrinter {
    fn default() -> Self {
        Self { width: 100 }
    }
}

impl SispPrinter {
    /// Create a printer with the default line width
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a printer that breaks forms longer than `width` characters
    pub fn with_width(width: usize) -> Self {
        Self { width }
    }

    /// Render a value
    pub fn print(&self, value: &Value) -> String {
        let mut out = String::new();
        self.write(value, 0, &mut out);
        out
    }

    fn write(&self, value: &Value, depth: usize, out: &mut String) {
        let flat = flat(value);
        if depth * INDENT.len() + flat.len() <= self.width {
            out.push_str(&flat);
            return;
        }

        match value {
            Value::Array(elements) => {
                out.push('[');
                self.write_lines(elements.iter().map(|e| (None, e)), depth, out);
                out.push(']');
            }
            Value::Object(map) => match head_form(value) {
                Some((head, arguments)) => {
                    out.push_str(head);
                    out.push('(');
                    self.write_lines(arguments.into_iter(), depth, out);
                    out.push(')');
                }
                None => {
                    out.push('(');
                    self.write_lines(map.iter().map(|(k, v)| (Some(k.as_str()), v)), depth, out);
                    out.push(')');
                }
            },
            _ => out.push_str(&flat),
        }
    }

    fn write_lines<'a>(
        &self,
        arguments: impl Iterator<Item = (Option<&'a str>, &'a Value)>,
        depth: usize,
        out: &mut String,
    ) {
        let mut any = false;
        for (index, (label, value)) in arguments.enumerate() {
            if index > 0 {
                out.push(',');
            }
            out.push('\n');
            out.push_str(&INDENT.repeat(depth + 1));
            if let Some(label) = label {
                out.push_str(&key(label));
                out.push_str(": ");
            }
            self.write(value, depth + 1, out);
            any = true;
        }
        if any {
            out.push('\n');
            out.push_str(&INDENT.repeat(depth));
        }
    }
}

/// The head and arguments of a single-entry map written as `head(arguments)`
fn head_form(value: &Value) -> Option<(&str, Vec<(Option<&str>, &Value)>)> {
    let map = value.as_object()?;
    if map.len() != 1 {
        return None;
    }
    let (head, payload) = map.iter().next()?;
    if !is_atom(head) {
        return None;
    }

    let arguments = match payload {
        Value::Object(fields) if fields.len() == 1 && fields.keys().all(|k| is_atom(k)) => {
            vec![(None, payload)]
        }
        Value::Object(fields) => fields
            .iter()
            .map(|(k, v)| (Some(k.as_str()), v))
            .collect(),
        Value::Array(elements) if elements.len() >= 2 => {
            elements.iter().map(|e| (None, e)).collect()
        }
        _ => vec![(None, payload)],
    };
    Some((head.as_str(), arguments))
}

fn flat(value: &Value) -> String {
    match value {
        Value::Null => "nil".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => string(s),
        Value::Array(elements) => {
            let parts: Vec<String> = elements.iter().map(flat).collect();
            format!("[{}]", parts.join(", "))
        }
        Value::Object(map) => match head_form(value) {
            Some((head, arguments)) => format!("{}({})", head, flat_arguments(&arguments)),
            None => {
                let arguments: Vec<(Option<&str>, &Value)> =
                    map.iter().map(|(k, v)| (Some(k.as_str()), v)).collect();
                format!("({})", flat_arguments(&arguments))
            }
        },
    }
}

fn flat_arguments(arguments: &[(Option<&str>, &Value)]) -> String {
    let parts: Vec<String> = arguments
        .iter()
        .map(|(label, value)| match label {
            Some(label) => format!("{}: {}", key(label), flat(value)),
            None => flat(value),
        })
        .collect();
    parts.join(", ")
}

fn is_atom(s: &str) -> bool {
    ATOM.is_match(s) && !matches!(s, "true" | "false" | "nil")
}

fn key(label: &str) -> String {
    string(label)
}

fn string(s: &str) -> String {
    if is_atom(s) {
        return s.to_string();
    }
    let mut quoted = String::with_capacity(s.len() + 2);
    quoted.push('"');
    for c in s.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\t' => quoted.push_str("\\t"),
            '\r' => quoted.push_str("\\r"),
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}
