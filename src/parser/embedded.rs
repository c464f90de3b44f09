use std::fmt;
use std::sync::LazyLock;

use scraper::{Html, Selector};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::ExtractError;

static NEXT_DATA: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("script#__NEXT_DATA__").unwrap());

/// One product exactly as it appears in the page payload.
#[derive(Debug, Clone, PartialEq)]
pub struct RawItem(pub Value);

impl RawItem {
    /// Follow `keys` through nested objects. Missing or non-object
    /// intermediates yield `None`.
    pub fn field(&self, keys: &[&str]) -> Option<&Value> {
        keys.iter().try_fold(&self.0, |v, k| v.as_object()?.get(*k))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    Key(&'static str),
    Index(usize),
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Key(k) => write!(f, "{}", k),
            Segment::Index(i) => write!(f, "[{}]", i),
        }
    }
}

/// props → pageProps → initialData → searchResult → itemStacks[0] → items
pub const ITEMS_PATH: &[Segment] = &[
    Segment::Key("props"),
    Segment::Key("pageProps"),
    Segment::Key("initialData"),
    Segment::Key("searchResult"),
    Segment::Key("itemStacks"),
    Segment::Index(0),
    Segment::Key("items"),
];

/// Walk `path` from `root`. The error names the first segment that does not
/// resolve together with the segments walked before it.
pub fn lookup<'a>(root: &'a Value, path: &[Segment]) -> Result<&'a Value, ExtractError> {
    let mut current = root;
    for (depth, seg) in path.iter().enumerate() {
        let next = match seg {
            Segment::Key(k) => current.as_object().and_then(|o| o.get(*k)),
            Segment::Index(i) => current.as_array().and_then(|a| a.get(*i)),
        };
        current = match next {
            Some(v) => v,
            None => {
                return Err(ExtractError::UnexpectedSchema {
                    key: seg_label(path, depth),
                    path: render_path(&path[..depth]),
                })
            }
        };
    }
    Ok(current)
}

/// `itemStacks[0]` rather than `[0]` for index segments.
fn seg_label(path: &[Segment], depth: usize) -> String {
    match (path[depth], depth.checked_sub(1).map(|d| path[d])) {
        (Segment::Index(i), Some(Segment::Key(k))) => format!("{}[{}]", k, i),
        (seg, _) => seg.to_string(),
    }
}

fn render_path(path: &[Segment]) -> String {
    let mut out = String::new();
    for seg in path {
        match seg {
            Segment::Key(k) => {
                if !out.is_empty() {
                    out.push('.');
                }
                out.push_str(k);
            }
            Segment::Index(i) => out.push_str(&format!("[{}]", i)),
        }
    }
    out
}

/// Parse the `__NEXT_DATA__` script of `markup` into a JSON tree.
pub fn embedded_payload(markup: &str) -> Result<Value, ExtractError> {
    let doc = Html::parse_document(markup);
    let script = doc
        .select(&NEXT_DATA)
        .next()
        .ok_or(ExtractError::NoEmbeddedData)?;
    let text: String = script.text().collect();
    debug!(bytes = text.len(), "Found embedded payload");
    Ok(serde_json::from_str(&text)?)
}

/// Extract the product list from the page.
pub fn extract_items(markup: &str) -> Result<Vec<RawItem>, ExtractError> {
    let payload = embedded_payload(markup)?;
    let items = lookup(&payload, ITEMS_PATH)?;
    let arr = items.as_array().ok_or_else(|| ExtractError::UnexpectedSchema {
        key: "items".to_string(),
        path: render_path(&ITEMS_PATH[..ITEMS_PATH.len() - 1]),
    })?;
    info!("Extracted {} raw items", arr.len());
    Ok(arr.iter().cloned().map(RawItem).collect())
}

/// Indented key outline of `value`, descending into objects and into objects
/// held by arrays, stopping below `max_depth` when given.
pub fn key_tree(value: &Value, max_depth: Option<usize>) -> Vec<String> {
    let mut lines = Vec::new();
    walk_keys(value, 0, max_depth, &mut lines);
    lines
}

fn walk_keys(value: &Value, indent: usize, max_depth: Option<usize>, out: &mut Vec<String>) {
    if max_depth.is_some_and(|m| indent >= m) {
        return;
    }
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                out.push(format!("{}{}", "  ".repeat(indent), key));
                match child {
                    Value::Object(_) => walk_keys(child, indent + 1, max_depth, out),
                    Value::Array(arr) => {
                        for el in arr.iter().filter(|e| e.is_object()) {
                            walk_keys(el, indent + 1, max_depth, out);
                        }
                    }
                    _ => {}
                }
            }
        }
        Value::Array(arr) => {
            for el in arr.iter().filter(|e| e.is_object()) {
                walk_keys(el, indent, max_depth, out);
            }
        }
        _ => {}
    }
}
