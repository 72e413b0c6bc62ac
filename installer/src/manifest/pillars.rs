//! Pillar template rendering.
//!
//! A pillar whose key ends in [`TEMPLATE_SUFFIX`] holds a template such as
//! `/home/{{ .User }}`. Rendering substitutes fields from the template data
//! and stores the result under the key without the suffix.

use super::error::{ManifestError, Result};
use std::collections::BTreeMap;

/// Reserved key suffix marking a pillar value as a template.
pub const TEMPLATE_SUFFIX: &str = "_template";

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Values available to pillar templates (`User`, `Version`, `--variable`s).
pub type TemplateData = BTreeMap<String, String>;

/// Render every templated pillar in `pillars`.
///
/// Plain pillars are copied unchanged. A rendered template replaces any
/// plain pillar with the same base key.
///
/// # Errors
///
/// Returns [`ManifestError::TemplateSyntax`] for malformed actions and
/// [`ManifestError::TemplateUndefinedField`] when a field has no value.
///
/// # Examples
///
/// ```
/// use cast_installer::manifest::{render_pillars, TemplateData};
/// use std::collections::BTreeMap;
///
/// let mut pillars = BTreeMap::new();
/// pillars.insert("home_template".to_owned(), "/home/{{ .User }}".to_owned());
/// let mut data = TemplateData::new();
/// data.insert("User".to_owned(), "analyst".to_owned());
///
/// let rendered = render_pillars(&pillars, &data).expect("render");
/// assert_eq!(rendered.get("home").map(String::as_str), Some("/home/analyst"));
/// assert!(!rendered.contains_key("home_template"));
/// ```
pub fn render_pillars(
    pillars: &BTreeMap<String, String>,
    data: &TemplateData,
) -> Result<BTreeMap<String, String>> {
    let mut rendered = BTreeMap::new();

    // Keys sort before their `_template` twin, so templates overwrite.
    for (key, value) in pillars {
        match key.strip_suffix(TEMPLATE_SUFFIX) {
            Some(base) if !base.is_empty() => {
                let text = render_template(key, value, data)?;
                rendered.insert(base.to_owned(), text);
            }
            _ => {
                rendered.insert(key.clone(), value.clone());
            }
        }
    }

    Ok(rendered)
}

/// Render one template string.
fn render_template(pillar: &str, template: &str, data: &TemplateData) -> Result<String> {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find(OPEN) {
        let (literal, tail) = rest.split_at(start);
        output.push_str(literal);

        let action_and_tail = tail.get(OPEN.len()..).unwrap_or_default();
        let Some(end) = action_and_tail.find(CLOSE) else {
            return Err(syntax(pillar, "unclosed action"));
        };
        let (action, after) = action_and_tail.split_at(end);
        let field = parse_field(pillar, action)?;
        let value = data
            .get(field)
            .ok_or_else(|| ManifestError::TemplateUndefinedField {
                pillar: pillar.to_owned(),
                field: field.to_owned(),
            })?;
        output.push_str(value);
        rest = after.get(CLOSE.len()..).unwrap_or_default();
    }

    output.push_str(rest);
    Ok(output)
}

/// Accept `.Name` with optional surrounding whitespace.
fn parse_field<'a>(pillar: &str, action: &'a str) -> Result<&'a str> {
    let trimmed = action.trim();
    let Some(field) = trimmed.strip_prefix('.') else {
        return Err(syntax(pillar, &format!("unsupported action \"{trimmed}\"")));
    };
    let mut chars = field.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(syntax(pillar, &format!("bad field name \"{trimmed}\"")));
    }
    Ok(field)
}

fn syntax(pillar: &str, reason: &str) -> ManifestError {
    ManifestError::TemplateSyntax {
        pillar: pillar.to_owned(),
        reason: reason.to_owned(),
    }
}
