//! Google-style sections (`Args:` followed by an indented block)

use regex::Regex;
use std::sync::LazyLock;

use super::{canonical_section, dedent, indent, indented_list, is_indented};

static HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Z][A-Z a-z]+):$").expect("valid regex"));

/// Sections rendered as `name: description` lists; the rest are quoted
const LIST_SECTIONS: &[&str] = &["Parameters", "Other Parameters", "Raises", "Attributes"];

pub(super) fn convert(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let mut out: Vec<String> = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        let Some(caps) = HEADER.captures(lines[i]) else {
            out.push(lines[i].to_string());
            i += 1;
            continue;
        };
        // contents: blank or indented lines, at least one of them indented
        let mut end = i + 1;
        while end < lines.len() && (lines[end].trim().is_empty() || is_indented(lines[end])) {
            end += 1;
        }
        while end > i + 1 && lines[end - 1].trim().is_empty() {
            end -= 1;
        }
        if !lines[i + 1..end].iter().any(|line| is_indented(line)) {
            out.push(lines[i].to_string());
            i += 1;
            continue;
        }
        let name = canonical_section(&caps[1]);
        let contents = dedent(lines[i + 1..end].join("\n").trim_start_matches('\n'));
        if out.last().is_some_and(|line| !line.trim().is_empty()) {
            out.push(String::new());
        }
        out.push(format!("###### {name}"));
        if LIST_SECTIONS.contains(&name.as_str()) {
            out.extend(indented_list(&contents).iter().map(|item| list_item(item)));
        } else {
            out.push(indent(&contents, "> ").replace("> \n", ">\n"));
        }
        out.push(String::new());
        i = end;
    }
    out.join("\n")
}

/// `x (int): desc` -> ` - **x** (int): desc`
fn list_item(item: &str) -> String {
    let (first, rest) = item.split_once('\n').unwrap_or((item, ""));
    let head = match first.split_once(':') {
        Some((name, desc)) => {
            let name = name.trim();
            let entry = match name.split_once(" (") {
                Some((bare, annotation)) if annotation.ends_with(')') => {
                    format!(" - **{}** ({})", bare.trim(), annotation.trim_end_matches(')'))
                }
                _ => format!(" - **{name}**"),
            };
            let desc = desc.trim();
            if desc.is_empty() {
                format!("{entry}:")
            } else {
                format!("{entry}: {desc}")
            }
        }
        None => format!(" - {}", first.trim()),
    };
    if rest.is_empty() {
        head
    } else {
        format!("{head}\n{}", indent(rest, "   "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_become_parameter_list() {
        let text = "Summary.\n\nArgs:\n    x (int): The first.\n    y: The second,\n        continued.\n\nReturns:\n    The sum.";
        let converted = convert(text);
        assert_eq!(
            converted,
            "Summary.\n\n###### Parameters\n - **x** (int): The first.\n - **y**: The second,\n   continued.\n\n\n###### Returns\n> The sum.\n"
        );
    }

    #[test]
    fn raises_and_plain_items() {
        let converted = convert("Raises:\n    ValueError: if bad.\n    TypeError\n");
        assert!(converted.contains("###### Raises\n - **ValueError**: if bad.\n - TypeError"));
    }

    #[test]
    fn unknown_sections_are_quoted_under_their_name() {
        let converted = convert("Custom Section:\n    line one\n\n    line two");
        assert!(converted.contains("###### Custom Section\n> line one\n>\n> line two"));
    }

    #[test]
    fn header_without_indented_block_is_kept() {
        assert_eq!(convert("Note:\nplain text"), "Note:\nplain text");
    }
}
