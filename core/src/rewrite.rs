use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::archive::ENTRY_POINT;
use crate::resource::{ResourceEntry, ResourceTable};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rewritten {
    pub document: String,
    pub replaced: usize,
    /// Archive-relative looking references that matched nothing.
    pub unresolved: Vec<String>,
}

fn attribute_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?i)\b(src|href)(\s*=\s*)(?:"([^"]*)"|'([^']*)')"#)
            .unwrap_or_else(|e| panic!("attribute pattern: {}", e))
    })
}

/// Points static `src=`/`href=` references at local handles.
///
/// An exact archive path wins; otherwise the longest archive path the
/// value ends with (after a `/`) is used. The entry point is never
/// substituted.
pub fn rewrite_references(document: &str, table: &ResourceTable) -> Rewritten {
    let mut replaced = 0usize;
    let mut unresolved = Vec::new();
    let text = attribute_pattern().replace_all(document, |caps: &Captures<'_>| {
        let (value, quote) = match (caps.get(3), caps.get(4)) {
            (Some(value), _) => (value.as_str(), '"'),
            (None, Some(value)) => (value.as_str(), '\''),
            (None, None) => return caps[0].to_string(),
        };
        match lookup_static(table, value) {
            Some(entry) => {
                replaced += 1;
                format!(
                    "{}{}{}{}{}",
                    &caps[1],
                    &caps[2],
                    quote,
                    entry.handle.as_str(),
                    quote
                )
            }
            None => {
                if looks_bundled(value) {
                    unresolved.push(value.to_string());
                }
                caps[0].to_string()
            }
        }
    });
    Rewritten {
        document: text.into_owned(),
        replaced,
        unresolved,
    }
}

fn lookup_static<'a>(table: &'a ResourceTable, value: &str) -> Option<&'a ResourceEntry> {
    if value.is_empty() || value == ENTRY_POINT {
        return None;
    }
    table
        .get(value)
        .or_else(|| table.suffix_of(value))
        .filter(|entry| entry.path != ENTRY_POINT)
}

fn looks_bundled(value: &str) -> bool {
    let value = value.trim();
    if value.is_empty() || value.starts_with('#') || value.starts_with("//") {
        return false;
    }
    if let Some((scheme, _)) = value.split_once(':') {
        let is_scheme = !scheme.is_empty()
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
        if is_scheme {
            return false;
        }
    }
    value.trim_start_matches("./").trim_start_matches('/') != ENTRY_POINT
}
