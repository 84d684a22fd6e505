//! Replace `<tag>` placeholders in a submission script
//!
//! Rendering is a single pass over the template. A substituted value is copied to the output as is
//! and never scanned for tags again, and a tag without a value fails the whole render so a half
//! rendered script can never reach the queue.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

/// Tag holding the job name
pub static NAME_TAG: &str = "name";
/// Tag holding the absolute path of the job folder
pub static FOLDER_TAG: &str = "folder";
/// Tags filled in by the scheduler, user keys may not reuse them
pub static RESERVED_TAGS: [&str; 2] = [NAME_TAG, FOLDER_TAG];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("template tag <{tag}> has no value")]
    UnresolvedTag { tag: String },
    #[error("user key '{key}' collides with a reserved template tag")]
    ReservedTag { key: String },
}

pub type TagValues = BTreeMap<String, String>;

fn tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"<([A-Za-z_][A-Za-z0-9_.\-]*)>").expect("valid tag pattern"))
}

/// Substitute every tag in `template` with its value
pub fn render(template: &str, values: &TagValues) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut last = 0;

    for caps in tag_pattern().captures_iter(template) {
        let (whole, tag) = match (caps.get(0), caps.get(1)) {
            (Some(whole), Some(tag)) => (whole, tag.as_str()),
            _ => continue,
        };
        let value = values
            .get(tag)
            .ok_or_else(|| TemplateError::UnresolvedTag { tag: tag.to_string() })?;
        out.push_str(&template[last..whole.start()]);
        out.push_str(value);
        last = whole.end();
    }
    out.push_str(&template[last..]);

    Ok(out)
}

/// Distinct tags used by a template, in sorted order
pub fn tags(template: &str) -> BTreeSet<String> {
    tag_pattern()
        .captures_iter(template)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

/// Fail on the first user key that shadows a reserved tag
pub fn check_reserved<'a, I>(keys: I) -> Result<(), TemplateError>
where
    I: IntoIterator<Item = &'a String>,
{
    match keys.into_iter().find(|key| RESERVED_TAGS.contains(&key.as_str())) {
        Some(key) => Err(TemplateError::ReservedTag { key: key.clone() }),
        None => Ok(()),
    }
}

/// Scalar top level entries of a job's arguments, usable as tags
///
/// Strings are used verbatim, numbers and booleans through their JSON text. Nested values and
/// nulls are skipped, as is anything that isn't a JSON object.
pub fn argument_tags(arguments: &Value) -> TagValues {
    let mut values = TagValues::new();
    if let Value::Object(map) = arguments {
        for (key, value) in map {
            let text = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => continue,
            };
            values.insert(key.clone(), text);
        }
    }
    values
}

/// Build the full mapping for one job: reserved tags, static tags, then argument tags
pub fn tag_values(
    name: &str,
    folder: &Path,
    static_tags: &TagValues,
    arguments: &Value,
) -> Result<TagValues, TemplateError> {
    let job_tags = argument_tags(arguments);
    check_reserved(job_tags.keys())?;

    let mut values = static_tags.clone();
    values.extend(job_tags);
    values.insert(NAME_TAG.to_string(), name.to_string());
    values.insert(FOLDER_TAG.to_string(), folder.display().to_string());
    Ok(values)
}
