//! reStructuredText directives, roles, links and field lists

use regex::{Captures, Regex};
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use super::{dedent, indent, is_indented};

static ADMONITION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^( *)\.\. +(note|warning|danger|versionadded|versionchanged|deprecated|seealso|math)::(.*)$",
    )
    .expect("valid regex")
});
static EMBEDDED_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`([^`<]+?)\s*<([^>`]+)>`_").expect("valid regex"));
static LINK_TARGET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\.\.\s+_([^:]+):\s*(http\S+)\s*$").expect("valid regex"));
static LINK_REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Za-z0-9_\-.+]+|`[^`]+`)_\b").expect("valid regex"));
static ROLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(:py)?:(mod|func|data|const|class|meth|attr|exc|obj):").expect("valid regex")
});
static MATH_ROLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":math:`(.+?)`").expect("valid regex"));
static FOOTNOTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^( *)\.\. +\[(\d+|[#*]\w*)\](.*)$").expect("valid regex"));
static FOOTNOTE_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(\d+|[#*]\w*)\]_").expect("valid regex"));
static FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^:([a-z]+)(?: +([^:]+?))?:(.*)$").expect("valid regex"));

pub(super) fn convert(text: &str) -> String {
    let text = admonitions(text);
    let text = links(&text);
    let text = ROLE.replace_all(&text, "");
    let text = MATH_ROLE.replace_all(&text, r"\\( ${1} \\)");
    let text = footnotes(&text);
    fields(&text)
}

fn leading_spaces(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

/// End of the block below `start`: blank lines or lines indented past `margin`
fn block_end(lines: &[&str], start: usize, margin: usize) -> usize {
    let mut end = start;
    while end < lines.len() && (lines[end].trim().is_empty() || leading_spaces(lines[end]) > margin) {
        end += 1;
    }
    while end > start && lines[end - 1].trim().is_empty() {
        end -= 1;
    }
    end
}

fn admonitions(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let mut out: Vec<String> = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        let Some(caps) = ADMONITION.captures(lines[i]) else {
            out.push(lines[i].to_string());
            i += 1;
            continue;
        };
        let ind = &caps[1];
        let end = block_end(&lines, i + 1, ind.len());
        let contents = dedent(&lines[i + 1..end].join("\n")).trim().to_string();
        out.extend(admonition(ind, &caps[2], caps[3].trim(), &contents));
        i = end;
    }
    out.join("\n")
}

fn admonition(ind: &str, kind: &str, val: &str, contents: &str) -> Vec<String> {
    let mut out = Vec::new();
    let label = match kind {
        "math" => {
            out.push(format!("{ind}$${val}{contents}$$"));
            return out;
        }
        "note" | "warning" | "danger" => {
            out.push(format!("{ind}<div class=\"alert {kind}\" markdown=\"1\">"));
            if !val.is_empty() {
                out.push(format!("{ind}**{val}**"));
            }
            if !contents.is_empty() {
                out.push(indent(contents, ind));
            }
            out.push(format!("{ind}</div>"));
            return out;
        }
        "versionadded" => format!("New in version {val}"),
        "versionchanged" => format!("Changed in version {val}"),
        "deprecated" => format!("Deprecated since version {val}"),
        _ => format!("{kind} {val}").trim().to_string(),
    };
    if contents.is_empty() {
        out.push(format!("{ind}*{label}.*"));
    } else {
        out.push(format!("{ind}*{label}:*"));
        out.push(indent(contents, ind));
        out.push(String::new());
    }
    out
}

fn link_id(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace() && *c != '`')
        .flat_map(char::to_lowercase)
        .collect()
}

fn links(text: &str) -> String {
    let text = EMBEDDED_LINK.replace_all(text, "[${1}](${2})");
    let mut targets: HashMap<String, String> = HashMap::new();
    let kept: Vec<&str> = text
        .lines()
        .filter(|line| match LINK_TARGET.captures(line) {
            Some(caps) => {
                targets.insert(link_id(&caps[1]), caps[2].to_string());
                false
            }
            None => true,
        })
        .collect();
    let text = kept.join("\n");
    if targets.is_empty() {
        return text;
    }
    LINK_REFERENCE
        .replace_all(&text, |caps: &Captures| {
            let label = &caps[1];
            match targets.get(&link_id(label)) {
                Some(url) => format!("[{}]({url})", label.trim_matches('`')),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn footnote_id(raw: &str, autonum: &mut usize) -> String {
    if raw == "*" || raw == "#" {
        let id = format!("fn-{autonum}");
        *autonum += 1;
        id
    } else {
        raw.trim_start_matches(['#', '*']).to_string()
    }
}

fn footnotes(text: &str) -> String {
    let mut registered = HashSet::new();
    let mut autonum = 1;
    let lines: Vec<String> = text
        .lines()
        .map(|line| match FOOTNOTE.captures(line) {
            Some(caps) => {
                let id = footnote_id(&caps[2], &mut autonum);
                let line = format!("{}[^{id}]: {}", &caps[1], caps[3].trim());
                registered.insert(id);
                line
            }
            None => line.to_string(),
        })
        .collect();
    let text = lines.join("\n");
    if registered.is_empty() {
        return text;
    }
    let mut autonum = 1;
    FOOTNOTE_REF
        .replace_all(&text, |caps: &Captures| {
            let id = footnote_id(&caps[1], &mut autonum);
            if registered.contains(&id) {
                format!("[^{id}]")
            } else {
                caps[0].to_string()
            }
        })
        .into_owned()
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Field {
    Param,
    Returns,
    Yields,
    Raises,
    Dropped,
}

impl Field {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "param" | "parameter" | "arg" | "argument" | "key" | "keyword" => Self::Param,
            "return" | "returns" => Self::Returns,
            "yield" | "yields" => Self::Yields,
            "raise" | "raises" | "except" | "exception" => Self::Raises,
            // annotations carry the types
            "type" | "vartype" | "rtype" | "ytype" => Self::Dropped,
            _ => return None,
        })
    }
}

/// ` - **x** (int): body`; `:param int x:` puts the type before the name
fn field_item(name: Option<&str>, body: &str) -> String {
    let body = body.replace('\n', "\n   ");
    let Some(name) = name else {
        return format!(" - {body}");
    };
    let words: Vec<&str> = name.split_whitespace().collect();
    match words.split_last() {
        Some((last, annotation)) if !annotation.is_empty() => {
            format!(" - **{last}** ({}): {body}", annotation.join(" "))
        }
        _ => format!(" - **{}**: {body}", name.trim()),
    }
}

fn push_heading(out: &mut Vec<String>, heading: &str) {
    if out.last().is_some_and(|line| !line.trim().is_empty()) {
        out.push(String::new());
    }
    out.push(format!("###### {heading}"));
}

fn fields(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let mut out: Vec<String> = Vec::new();
    let mut has_params = false;
    let mut has_raises = false;
    let mut i = 0;
    while i < lines.len() {
        let field = FIELD
            .captures(lines[i])
            .and_then(|caps| Field::from_name(&caps[1]).map(|field| (field, caps)));
        let Some((field, caps)) = field else {
            out.push(lines[i].to_string());
            i += 1;
            continue;
        };
        // continuation: indented lines, possibly after blank ones
        let mut end = i + 1;
        let mut next = end;
        loop {
            while next < lines.len() && lines[next].trim().is_empty() {
                next += 1;
            }
            if next < lines.len() && is_indented(lines[next]) {
                next += 1;
                end = next;
            } else {
                break;
            }
        }
        let first = caps[3].trim();
        let rest = dedent(&lines[i + 1..end].join("\n"));
        let body = format!("{first}\n{rest}").trim().to_string();
        let name = caps.get(2).map(|m| m.as_str());
        match field {
            Field::Param => {
                if !has_params {
                    has_params = true;
                    push_heading(&mut out, "Parameters");
                }
                out.push(field_item(name, &body));
            }
            Field::Raises => {
                if !has_raises {
                    has_raises = true;
                    push_heading(&mut out, "Raises");
                }
                out.push(field_item(name, &body));
            }
            Field::Returns | Field::Yields => {
                push_heading(
                    &mut out,
                    if field == Field::Returns { "Returns" } else { "Yields" },
                );
                out.push(indent(&body, "> ").replace("> \n", ">\n"));
            }
            Field::Dropped => {}
        }
        i = end;
    }
    out.join("\n")
}
