//! NumPy-style sections (heading underlined with dashes)

use regex::Regex;
use std::sync::LazyLock;

use super::{canonical_section, dedent, indent, indented_list};

static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z][A-Za-z ]+$").expect("valid regex"));
static DASHES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^---+$").expect("valid regex"));

const PARAMETER_SECTIONS: &[&str] = &[
    "Parameters",
    "Returns",
    "Yields",
    "Receives",
    "Other Parameters",
    "Raises",
    "Warns",
    "Attributes",
];

fn is_heading(lines: &[&str], i: usize) -> bool {
    HEADING.is_match(lines[i]) && lines.get(i + 1).is_some_and(|next| DASHES.is_match(next))
}

pub(super) fn convert(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let mut out: Vec<String> = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        if !is_heading(&lines, i) {
            out.push(lines[i].to_string());
            i += 1;
            continue;
        }
        let heading = canonical_section(lines[i]);
        let mut start = i + 2;
        while start < lines.len() && lines[start].trim().is_empty() {
            start += 1;
        }
        let mut end = start;
        if lines.get(start).is_some_and(|line| line.starts_with(' ')) {
            // indented content ends at the first non-indented line
            while end < lines.len() && (lines[end].is_empty() || lines[end].starts_with(' ')) {
                end += 1;
            }
        } else {
            while end < lines.len() && !is_heading(&lines, end) {
                end += 1;
            }
        }
        let content = lines[start..end].join("\n");
        let body = if PARAMETER_SECTIONS.contains(&heading.as_str()) {
            parameters(&content)
        } else if heading == "See Also" {
            see_also(&content)
        } else {
            dedent(&content)
        };
        out.push(format!("###### {heading}"));
        out.push(body.trim_end().to_string());
        out.push(String::new());
        i = end;
    }
    out.join("\n")
}

fn parameters(content: &str) -> String {
    let mut out = Vec::new();
    for item in indented_list(&dedent(content)) {
        let (first, rest) = item.split_once('\n').unwrap_or((item.as_str(), ""));
        match first.rsplit_once(':') {
            Some((name, annotation)) if !name.trim().is_empty() && !annotation.trim().is_empty() => {
                out.push(format!(" - **{}** ({}):", name.trim(), annotation.trim()));
                if !rest.trim().is_empty() {
                    out.push(indent(rest.trim(), "   "));
                }
            }
            _ => {
                let name = first.trim().trim_end_matches(':');
                let desc = rest.trim();
                if desc.is_empty() {
                    out.push(format!(" - **{name}**"));
                } else {
                    out.push(format!(" - **{name}**: {}", desc.replace('\n', "\n   ")));
                }
            }
        }
    }
    out.join("\n")
}

fn see_also(content: &str) -> String {
    let mut out = Vec::new();
    for item in indented_list(&dedent(content)) {
        let (funcs, desc) = match item.split_once(':') {
            Some((funcs, desc)) => (funcs.to_string(), format!(": {}", desc.trim())),
            None => (item.clone(), String::new()),
        };
        let funcs = funcs
            .split([' ', ','])
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(|f| format!("`{f}`"))
            .collect::<Vec<_>>()
            .join(", ");
        out.push(format!("{funcs}{desc}  "));
    }
    out.join("\n")
}
