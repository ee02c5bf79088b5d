//! Single-line CSV codec.
//!
//! Fields are separated by commas and may be wrapped in double quotes; a
//! doubled quote inside a quoted field stands for one literal quote. The
//! decoder is lenient: a quote that is never closed simply runs to the end of
//! the line.

/// One decoded line, in column order.
pub type Row = Vec<String>;

const SEPARATOR: char = ',';
const QUOTE: char = '"';

/// Splits `line` into fields.
///
/// Always yields at least one field, so an empty line becomes `[""]`.
pub fn decode(line: &str) -> Row {
    let mut fields = Vec::new();
    let mut current = String::with_capacity(line.len());
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            if ch == QUOTE {
                if chars.peek() == Some(&QUOTE) {
                    chars.next();
                    current.push(QUOTE);
                } else {
                    in_quotes = false;
                }
            } else {
                current.push(ch);
            }
        } else if ch == QUOTE {
            in_quotes = true;
        } else if ch == SEPARATOR {
            fields.push(std::mem::take(&mut current));
        } else {
            current.push(ch);
        }
    }

    fields.push(current);
    fields
}

/// Joins `row` into one line, quoting only the fields that need it.
pub fn encode<S: AsRef<str>>(row: &[S]) -> String {
    let mut line = String::new();
    for (idx, field) in row.iter().enumerate() {
        if idx > 0 {
            line.push(SEPARATOR);
        }
        push_field(&mut line, field.as_ref());
    }
    line
}

pub fn needs_quoting(field: &str) -> bool {
    field
        .chars()
        .any(|ch| matches!(ch, SEPARATOR | QUOTE | '\n' | '\r'))
}

fn push_field(line: &mut String, field: &str) {
    if !needs_quoting(field) {
        line.push_str(field);
        return;
    }
    line.push(QUOTE);
    for ch in field.chars() {
        if ch == QUOTE {
            line.push(QUOTE);
        }
        line.push(ch);
    }
    line.push(QUOTE);
}
