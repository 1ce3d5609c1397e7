//! Taxonomy store: the immutable collection of classification entities,
//! loaded once from the scraped CSV export.

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::Entity;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("failed to read taxonomy csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("taxonomy store is empty")]
    EmptyStore,
    #[error("entity {code} is missing mandatory field `{field}`")]
    MissingField { code: String, field: &'static str },
    #[error("duplicate entity code {0}")]
    DuplicateCode(String),
    #[error("entity {code}: malformed list field `{field}`: {raw:?}")]
    MalformedList {
        code: String,
        field: &'static str,
        raw: String,
    },
}

/// How to treat list fields carrying a bracketed literal that does not parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListFieldPolicy {
    /// Reject the record with [`DataError::MalformedList`].
    #[default]
    Strict,
    /// Log and treat the field as empty, as the legacy pipeline did.
    Lenient,
}

/// Raw CSV row as written by the taxonomy scraper. List fields arrive as
/// `" | "`-joined strings or bracketed literals.
#[derive(Debug, Deserialize)]
struct RawRecord {
    noc_code: String,
    title: String,
    description: String,
    #[serde(default)]
    main_duties: String,
    #[serde(default)]
    example_titles: String,
    #[serde(default)]
    employment_requirements: String,
    #[serde(default)]
    additional_information: String,
    #[serde(default)]
    exclusions: String,
    #[serde(default)]
    broad_category: String,
    #[serde(default)]
    major_group: String,
    #[serde(default)]
    url: String,
}

/// Loaded-once, read-only collection of entities. Entity order is the
/// row order of the source file and is the index space for the
/// embedding matrices built from this store.
#[derive(Debug, Clone)]
pub struct TaxonomyStore {
    entities: Vec<Entity>,
}

impl TaxonomyStore {
    /// Wraps an already-parsed entity list, enforcing code uniqueness.
    pub fn from_entities(entities: Vec<Entity>) -> Result<Self, DataError> {
        let mut seen = HashSet::new();
        for entity in &entities {
            if !seen.insert(entity.code.as_str()) {
                return Err(DataError::DuplicateCode(entity.code.clone()));
            }
        }
        Ok(Self { entities })
    }

    pub fn load_csv(path: &Path, policy: ListFieldPolicy) -> Result<Self, DataError> {
        let mut reader = csv::Reader::from_path(path)?;
        let mut entities = Vec::new();

        for row in reader.deserialize() {
            let raw: RawRecord = row?;
            let code = raw.noc_code.trim().to_string();

            let duties = parse_list_field(&raw.main_duties, &code, "main_duties", policy)?;
            let example_titles =
                parse_list_field(&raw.example_titles, &code, "example_titles", policy)?;
            let exclusions = parse_list_field(&raw.exclusions, &code, "exclusions", policy)?;

            entities.push(Entity {
                code,
                title: raw.title.trim().to_string(),
                description: raw.description.trim().to_string(),
                duties,
                example_titles,
                requirements: clean_scalar(&raw.employment_requirements),
                additional_info: clean_scalar(&raw.additional_information),
                exclusions,
                broad_category: clean_scalar(&raw.broad_category),
                major_group: clean_scalar(&raw.major_group),
                reference_url: raw.url.trim().to_string(),
            });
        }

        info!(path = %path.display(), entities = entities.len(), "loaded taxonomy store");
        Self::from_entities(entities)
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn by_code(&self, code: &str) -> Option<&Entity> {
        self.entities.iter().find(|entity| entity.code == code)
    }
}

/// Scalar text fields inherit the scraper's `"nan"` sentinel for missing
/// values; normalize those to empty.
fn clean_scalar(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("nan") {
        String::new()
    } else {
        trimmed.to_string()
    }
}

/// Parses one list-encoded field. Three encodings exist in the wild:
/// bracketed quoted literals (legacy exports), `|`-separated strings
/// (current exports), and a bare single value.
fn parse_list_field(
    raw: &str,
    code: &str,
    field: &'static str,
    policy: ListFieldPolicy,
) -> Result<Vec<String>, DataError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
        return Ok(Vec::new());
    }

    if trimmed.starts_with('[') {
        return match parse_bracketed_list(trimmed) {
            Some(items) => Ok(items),
            None => match policy {
                ListFieldPolicy::Strict => Err(DataError::MalformedList {
                    code: code.to_string(),
                    field,
                    raw: truncate_for_log(trimmed),
                }),
                ListFieldPolicy::Lenient => {
                    warn!(code, field, "malformed bracketed list field treated as empty");
                    Ok(Vec::new())
                }
            },
        };
    }

    if trimmed.contains('|') {
        return Ok(trimmed
            .split('|')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect());
    }

    Ok(vec![trimmed.to_string()])
}

/// Parses `['a', "b"]`-style literals: quoted items separated by commas.
/// Returns `None` on anything that deviates from that shape.
fn parse_bracketed_list(raw: &str) -> Option<Vec<String>> {
    let inner = raw.strip_prefix('[')?.strip_suffix(']')?;
    let mut items = Vec::new();
    let mut chars = inner.chars().peekable();

    loop {
        while matches!(chars.peek(), Some(c) if c.is_whitespace()) {
            chars.next();
        }
        let Some(&quote) = chars.peek() else {
            break;
        };
        if quote != '\'' && quote != '"' {
            return None;
        }
        chars.next();

        let mut item = String::new();
        let mut closed = false;
        while let Some(c) = chars.next() {
            if c == '\\' {
                match chars.next() {
                    Some(escaped) => item.push(escaped),
                    None => return None,
                }
            } else if c == quote {
                closed = true;
                break;
            } else {
                item.push(c);
            }
        }
        if !closed {
            return None;
        }
        items.push(item);

        while matches!(chars.peek(), Some(c) if c.is_whitespace()) {
            chars.next();
        }
        match chars.next() {
            Some(',') => continue,
            Some(_) => return None,
            None => break,
        }
    }

    Some(items)
}

fn truncate_for_log(raw: &str) -> String {
    const MAX: usize = 80;
    if raw.chars().count() <= MAX {
        raw.to_string()
    } else {
        raw.chars().take(MAX).collect::<String>() + "…"
    }
}
