//! Colorization of plain-text compiler diagnostics.

use crate::colors::{BOLD, BOLD_CYAN, BOLD_RED, BOLD_YELLOW, RESET};

const SEVERITIES: &[(&str, &str)] = &[
    ("error:", BOLD_RED),
    ("warning:", BOLD_YELLOW),
    ("note:", BOLD_CYAN),
];

/// Colorize compiler output line by line.
///
/// The `<source_name>:<line>:<col>:` prefix becomes bold, and the text from
/// the first `error:`, `warning:` or `note:` to the end of the line takes the
/// severity's color. Other lines pass through unchanged.
pub fn colorize_diagnostics(text: &str, source_name: &str) -> String {
    let mut output = String::with_capacity(text.len() + 64);

    for line in text.split_inclusive('\n') {
        let (body, newline) = match line.strip_suffix('\n') {
            Some(body) => (body, "\n"),
            None => (line, ""),
        };

        let (location, rest) = split_location(body, source_name);
        if !location.is_empty() {
            output.push_str(BOLD);
            output.push_str(location);
            output.push_str(RESET);
        }
        output.push_str(&colorize_severity(rest));
        output.push_str(newline);
    }

    output
}

/// Split `source.c:12:5:` off the front of a line.
fn split_location<'a>(line: &'a str, source_name: &str) -> (&'a str, &'a str) {
    let Some(after_name) = line.strip_prefix(source_name) else {
        return ("", line);
    };

    let mut cursor = after_name;
    for _ in 0..2 {
        let Some(after_colon) = cursor.strip_prefix(':') else {
            return ("", line);
        };
        let digits = after_colon.len() - after_colon.trim_start_matches(|c: char| c.is_ascii_digit()).len();
        if digits == 0 {
            return ("", line);
        }
        cursor = &after_colon[digits..];
    }

    match cursor.strip_prefix(':') {
        Some(rest) => line.split_at(line.len() - rest.len()),
        None => ("", line),
    }
}

fn colorize_severity(text: &str) -> String {
    let first = SEVERITIES
        .iter()
        .filter_map(|(label, color)| text.find(label).map(|pos| (pos, *color)))
        .min_by_key(|(pos, _)| *pos);

    match first {
        Some((pos, color)) => {
            let (head, tail) = text.split_at(pos);
            format!("{head}{color}{tail}{RESET}")
        }
        None => text.to_string(),
    }
}
