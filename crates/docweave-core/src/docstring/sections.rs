//! Structured view of a normalized docstring

use indexmap::IndexMap;
use serde::Serialize;

/// Sections of a Markdown docstring with `###### Heading` section headers
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Sections {
    /// First paragraph, joined into one line
    pub summary: String,
    /// Everything between the summary and the first section
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<ParamDoc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub returns: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yields: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub raises: Vec<ParamDoc>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub see_also: Vec<String>,
    /// Any other section by heading, in order of appearance
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub other: IndexMap<String, String>,
}

/// One entry of a parameter-like list
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ParamDoc {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotation: Option<String>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq)]
enum Section {
    Summary,
    Description,
    Parameters,
    Returns,
    Yields,
    Raises,
    Examples,
    SeeAlso,
    Other(String),
}

impl Sections {
    /// Parse normalized Markdown
    pub fn parse(text: &str) -> Self {
        let mut doc = Sections::default();
        let mut current = Section::Summary;
        let mut summary_lines = Vec::new();
        let mut buffer: Vec<&str> = Vec::new();
        let mut in_code_block = false;

        for line in text.lines() {
            let trimmed = line.trim();
            if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
                in_code_block = !in_code_block;
            }
            if !in_code_block {
                if let Some(section) = parse_section_header(trimmed) {
                    doc.finish(&current, &buffer);
                    buffer.clear();
                    current = section;
                    continue;
                }
            }
            match current {
                Section::Summary => {
                    if trimmed.is_empty() && !summary_lines.is_empty() {
                        current = Section::Description;
                    } else if !trimmed.is_empty() {
                        summary_lines.push(trimmed);
                    }
                }
                _ => buffer.push(line),
            }
        }
        doc.finish(&current, &buffer);
        doc.summary = summary_lines.join(" ");
        doc
    }

    fn finish(&mut self, section: &Section, lines: &[&str]) {
        let body = lines.join("\n").trim().to_string();
        match section {
            Section::Summary => {}
            Section::Description => {
                if !body.is_empty() {
                    self.description = Some(body);
                }
            }
            Section::Parameters => self.params.extend(parse_param_list(&body)),
            Section::Raises => self.raises.extend(parse_param_list(&body)),
            Section::Returns => self.returns = Some(unquote(&body)),
            Section::Yields => self.yields = Some(unquote(&body)),
            Section::Examples => self.examples.push(body),
            Section::SeeAlso => self.see_also.extend(
                body.lines()
                    .map(|line| line.trim().trim_end_matches("  ").to_string())
                    .filter(|line| !line.is_empty()),
            ),
            Section::Other(name) => {
                self.other.insert(name.clone(), body);
            }
        }
    }

    #[must_use]
    pub fn param(&self, name: &str) -> Option<&ParamDoc> {
        self.params.iter().find(|p| p.name == name)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.summary.is_empty()
            && self.description.is_none()
            && self.params.is_empty()
            && self.returns.is_none()
            && self.examples.is_empty()
    }
}

fn parse_section_header(line: &str) -> Option<Section> {
    let name = line.strip_prefix("###### ")?.trim();
    Some(match name {
        "Parameters" | "Other Parameters" => Section::Parameters,
        "Returns" => Section::Returns,
        "Yields" => Section::Yields,
        "Raises" => Section::Raises,
        "Examples" => Section::Examples,
        "See Also" => Section::SeeAlso,
        other => Section::Other(other.to_string()),
    })
}

/// Drop blockquote markers added by the converters
fn unquote(body: &str) -> String {
    body.lines()
        .map(|line| line.strip_prefix("> ").or(line.strip_prefix('>')).unwrap_or(line))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Parse ` - **name** (type): description` items
fn parse_param_list(body: &str) -> Vec<ParamDoc> {
    let mut params: Vec<ParamDoc> = Vec::new();
    for line in body.lines() {
        if let Some(param) = parse_param_line(line.trim()) {
            params.push(param);
        } else if let Some(last) = params.last_mut() {
            let extra = line.trim();
            if !extra.is_empty() {
                if !last.description.is_empty() {
                    last.description.push('\n');
                }
                last.description.push_str(extra);
            }
        }
    }
    params
}

fn parse_param_line(line: &str) -> Option<ParamDoc> {
    let line = line.strip_prefix('-')?.trim();
    let rest = line.strip_prefix("**")?;
    let end = rest.find("**")?;
    let name = rest[..end].trim().trim_end_matches(':').to_string();
    let mut rest = rest[end + 2..].trim();

    let mut annotation = None;
    if let Some(inner) = rest.strip_prefix('(') {
        if let Some(close) = inner.find(')') {
            annotation = Some(inner[..close].trim().to_string());
            rest = inner[close + 1..].trim();
        }
    }
    let description = rest.strip_prefix(':').unwrap_or(rest).trim().to_string();
    Some(ParamDoc {
        name,
        annotation,
        description,
    })
}
