//! Docstring cleaning, flavor detection and conversion to Markdown
//!
//! Every docstring goes through the same steps:
//! 1. [`clean`] removes indentation the way `inspect.cleandoc` does
//! 2. `@public` / `@private` markers are extracted
//! 3. the flavor is taken from configuration or `__docformat__`, else [`detect`]ed
//! 4. [`convert`] rewrites flavor-specific sections into Markdown with
//!    `###### Section` headers, never touching fenced code blocks
//! 5. the result is split into structured [`Sections`]

mod google;
mod numpy;
mod rst;
mod sections;

pub use sections::{ParamDoc, Sections};

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::LazyLock;

/// Docstring convention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Flavor {
    /// Plain Markdown, passed through unchanged
    #[default]
    #[serde(alias = "plain", alias = "plaintext")]
    Markdown,
    Google,
    Numpy,
    #[serde(alias = "rst")]
    Restructuredtext,
}

impl Flavor {
    /// Interpret a `__docformat__` value such as `"restructuredtext en"`
    #[must_use]
    pub fn from_docformat(value: &str) -> Option<Self> {
        value.split_whitespace().next()?.parse().ok()
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::Google => "google",
            Self::Numpy => "numpy",
            Self::Restructuredtext => "restructuredtext",
        }
    }
}

impl FromStr for Flavor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "markdown" | "md" | "plain" | "plaintext" => Ok(Self::Markdown),
            "google" => Ok(Self::Google),
            "numpy" | "numpydoc" => Ok(Self::Numpy),
            "restructuredtext" | "rst" => Ok(Self::Restructuredtext),
            other => Err(format!("unknown docstring flavor '{other}'")),
        }
    }
}

impl std::fmt::Display for Flavor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Visibility override written inside a docstring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Marker {
    Public,
    Private,
}

/// A cleaned and normalized docstring
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Docstring {
    /// Cleaned source text, markers included
    pub raw: String,
    /// Markdown rendition
    pub text: String,
    pub flavor: Flavor,
    pub sections: Sections,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marker: Option<Marker>,
}

static MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@(public|private)\b").expect("valid regex"));

impl Docstring {
    /// Clean and normalize `raw`; `flavor` of `None` means detect
    #[must_use]
    pub fn new(raw: &str, flavor: Option<Flavor>) -> Self {
        let cleaned = clean(raw);
        if cleaned.is_empty() {
            return Self::default();
        }
        let marker = if cleaned.contains("@private") {
            Some(Marker::Private)
        } else if cleaned.contains("@public") {
            Some(Marker::Public)
        } else {
            None
        };
        let stripped = if marker.is_some() {
            clean(&MARKER.replace_all(&cleaned, ""))
        } else {
            cleaned.clone()
        };
        let flavor = flavor.unwrap_or_else(|| detect(&stripped));
        let text = convert(&stripped, flavor).trim().to_string();
        let sections = Sections::parse(&text);
        Self {
            raw: cleaned,
            text,
            flavor,
            sections,
            marker,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// First paragraph of the docstring
    #[must_use]
    pub fn summary(&self) -> &str {
        &self.sections.summary
    }
}

/// Remove indentation the way `inspect.cleandoc` does
///
/// Tabs expand to multiples of eight, the common indentation of all lines but
/// the first is removed, the first line is left-stripped and blank lines at
/// either end are dropped.
#[must_use]
pub fn clean(raw: &str) -> String {
    let lines: Vec<String> = raw.lines().map(expand_tabs).collect();
    let margin = lines
        .iter()
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start().len())
        .min()
        .unwrap_or(0);
    let mut cleaned: Vec<&str> = lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            if i == 0 {
                line.trim_start()
            } else {
                line.get(margin..).unwrap_or_else(|| line.trim_start())
            }
        })
        .collect();
    while cleaned.first().is_some_and(|line| line.trim().is_empty()) {
        cleaned.remove(0);
    }
    while cleaned.last().is_some_and(|line| line.trim().is_empty()) {
        cleaned.pop();
    }
    cleaned
        .iter()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

fn expand_tabs(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    for c in line.chars() {
        if c == '\t' {
            let pad = 8 - out.chars().count() % 8;
            out.extend(std::iter::repeat(' ').take(pad));
        } else {
            out.push(c);
        }
    }
    out
}

/// Remove the common leading whitespace of all non-blank lines
pub(crate) fn dedent(text: &str) -> String {
    let margin = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start().len())
        .min()
        .unwrap_or(0);
    text.lines()
        .map(|line| line.get(margin..).unwrap_or("").trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

pub(crate) fn indent(text: &str, prefix: &str) -> String {
    text.lines()
        .map(|line| format!("{prefix}{line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

pub(crate) fn is_indented(line: &str) -> bool {
    line.starts_with([' ', '\t']) && !line.trim().is_empty()
}

/// Split docstring items: a new item starts at every non-indented, non-blank line
pub(crate) fn indented_list(contents: &str) -> Vec<String> {
    let mut items: Vec<String> = Vec::new();
    for line in contents.lines() {
        let continues = line.trim().is_empty() || line.starts_with([' ', '\t']);
        match items.last_mut() {
            Some(item) if continues => {
                item.push('\n');
                item.push_str(line);
            }
            _ if line.trim().is_empty() => {}
            _ => items.push(line.to_string()),
        }
    }
    items.iter().map(|item| clean(item)).collect()
}

/// Map section name aliases to one spelling
pub(crate) fn canonical_section(name: &str) -> String {
    match name.trim().to_ascii_lowercase().as_str() {
        "args" | "arguments" | "params" | "parameters" => "Parameters",
        "keyword args" | "keyword arguments" | "other parameters" | "other params" => {
            "Other Parameters"
        }
        "return" | "returns" => "Returns",
        "yield" | "yields" => "Yields",
        "raise" | "raises" | "throws" | "exceptions" => "Raises",
        "example" | "examples" => "Examples",
        "note" | "notes" => "Notes",
        "warning" | "warnings" => "Warnings",
        "warns" => "Warns",
        "attribute" | "attributes" => "Attributes",
        "see also" => "See Also",
        "todo" => "Todo",
        "references" => "References",
        _ => return name.trim().to_string(),
    }
    .to_string()
}

/// A run of lines either inside or outside a fenced code block
enum Segment<'a> {
    Prose(Vec<&'a str>),
    Code(Vec<&'a str>),
}

fn fence_of(line: &str) -> Option<&'static str> {
    let trimmed = line.trim_start();
    if trimmed.starts_with("```") {
        Some("```")
    } else if trimmed.starts_with("~~~") {
        Some("~~~")
    } else {
        None
    }
}

fn segments(text: &str) -> Vec<Segment<'_>> {
    let mut out = Vec::new();
    let mut prose = Vec::new();
    let mut lines = text.lines();
    while let Some(line) = lines.next() {
        let Some(fence) = fence_of(line) else {
            prose.push(line);
            continue;
        };
        if !prose.is_empty() {
            out.push(Segment::Prose(std::mem::take(&mut prose)));
        }
        let mut code = vec![line];
        for inner in lines.by_ref() {
            code.push(inner);
            if inner.trim_start().starts_with(fence) {
                break;
            }
        }
        out.push(Segment::Code(code));
    }
    if !prose.is_empty() {
        out.push(Segment::Prose(prose));
    }
    out
}

/// Lines outside fenced code blocks
fn prose_lines(text: &str) -> Vec<&str> {
    segments(text)
        .into_iter()
        .filter_map(|segment| match segment {
            Segment::Prose(lines) => Some(lines),
            Segment::Code(_) => None,
        })
        .flatten()
        .collect()
}

static RST_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*:(param|parameter|arg|type|returns?|rtype|raises?|yields?)\b[^:]*:")
        .expect("valid regex")
});
static RST_DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*\.\.\s+(note|warning|danger|versionadded|versionchanged|deprecated|seealso|math)::")
        .expect("valid regex")
});
static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z][A-Za-z ]+$").expect("valid regex"));
static DASHES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^-{3,}$").expect("valid regex"));
static GOOGLE_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Z][A-Za-z ]+):\s*$").expect("valid regex"));

const GOOGLE_SECTIONS: &[&str] = &[
    "Args",
    "Arguments",
    "Parameters",
    "Params",
    "Keyword Args",
    "Keyword Arguments",
    "Other Parameters",
    "Returns",
    "Return",
    "Yields",
    "Yield",
    "Raises",
    "Attributes",
    "Example",
    "Examples",
    "Note",
    "Notes",
    "Todo",
    "Warning",
    "Warnings",
    "See Also",
];

/// Guess the flavor of a docstring from its section headers
///
/// Lines inside code fences are ignored. The first recognised pattern wins;
/// without any, the docstring is treated as Markdown.
#[must_use]
pub fn detect(text: &str) -> Flavor {
    let lines = prose_lines(text);
    for (i, line) in lines.iter().enumerate() {
        if RST_FIELD.is_match(line) || RST_DIRECTIVE.is_match(line) {
            return Flavor::Restructuredtext;
        }
        let next = lines.get(i + 1).copied().unwrap_or("");
        if HEADING.is_match(line.trim_end()) && DASHES.is_match(next.trim()) {
            return Flavor::Numpy;
        }
        if let Some(caps) = GOOGLE_HEADER.captures(line) {
            if GOOGLE_SECTIONS.contains(&&caps[1]) && is_indented(next) {
                return Flavor::Google;
            }
        }
    }
    Flavor::Markdown
}

/// Convert a cleaned docstring of `flavor` into Markdown
///
/// Google and NumPy docstrings commonly embed reST roles and directives, so
/// the reST pass runs for all three structured flavors.
#[must_use]
pub fn convert(text: &str, flavor: Flavor) -> String {
    if flavor == Flavor::Markdown {
        return text.to_string();
    }
    let mut out = Vec::new();
    for segment in segments(text) {
        match segment {
            Segment::Code(lines) => out.push(lines.join("\n")),
            Segment::Prose(lines) => {
                let prose = lines.join("\n");
                let mut converted = rst::convert(&prose);
                match flavor {
                    Flavor::Google => converted = google::convert(&converted),
                    Flavor::Numpy => converted = numpy::convert(&converted),
                    Flavor::Restructuredtext | Flavor::Markdown => {}
                }
                // keep the blank lines separating prose from a following fence
                let trailing = lines.iter().rev().take_while(|l| l.trim().is_empty()).count();
                let mut converted = converted.trim_end().to_string();
                converted.push_str(&"\n".repeat(trailing));
                out.push(converted);
            }
        }
    }
    out.join("\n")
}
