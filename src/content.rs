//! Page content documents.
//!
//! Page content is stored as an opaque JSON document whose shape depends on
//! the page template. Older writers stored the document as a JSON string,
//! sometimes encoded more than once, so reading is lenient: string layers are
//! peeled until an object appears, and anything that never becomes an object
//! reads as an empty document.

use serde::Serialize;
use serde_json::{Map, Value};
use utoipa::ToSchema;

/// Template tag reserved for news articles.
pub const NEWS_TEMPLATE: &str = "news";

/// Upper bound on nested string encodings that will be unwrapped.
const MAX_ENCODING_DEPTH: usize = 8;

/// Content of a page, interpreted according to its template.
#[derive(Debug, Clone, PartialEq)]
pub enum PageDocument {
    News(NewsDocument),
    Standard(StandardDocument),
}

/// Content of a `news` page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct NewsDocument {
    pub html: String,
    pub image: Option<String>,
    pub excerpt: Option<String>,
}

/// Content of every other template: an HTML body plus an optional structured
/// editor tree and optional image.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StandardDocument {
    pub html: String,
    pub image: Option<String>,
    pub json: Option<Value>,
}

impl PageDocument {
    /// Decode stored content for a page with the given template. Never fails.
    pub fn decode(template: &str, raw: &Value) -> Self {
        let fields = unwrap_document(raw);

        if template == NEWS_TEMPLATE {
            PageDocument::News(NewsDocument {
                html: string_field(&fields, "html").unwrap_or_default(),
                image: string_field(&fields, "image"),
                excerpt: string_field(&fields, "excerpt"),
            })
        } else {
            PageDocument::Standard(StandardDocument {
                html: string_field(&fields, "html").unwrap_or_default(),
                image: string_field(&fields, "image"),
                json: fields.get("json").filter(|value| !value.is_null()).cloned(),
            })
        }
    }

    pub fn html(&self) -> &str {
        match self {
            PageDocument::News(doc) => &doc.html,
            PageDocument::Standard(doc) => &doc.html,
        }
    }
}

/// Resolve a stored document to its object form.
///
/// Objects are returned as-is, JSON strings are decoded repeatedly, and
/// everything else (including undecodable strings) becomes an empty object.
pub fn unwrap_document(raw: &Value) -> Map<String, Value> {
    let mut current = raw.clone();

    for _ in 0..=MAX_ENCODING_DEPTH {
        match current {
            Value::Object(map) => return map,
            Value::String(encoded) => match serde_json::from_str::<Value>(&encoded) {
                Ok(decoded) => current = decoded,
                Err(_) => break,
            },
            _ => break,
        }
    }

    Map::new()
}

/// Whether submitted content may be stored.
///
/// Objects are accepted as-is. Pre-encoded strings are accepted (and stored
/// verbatim) when they decode to a non-empty object.
pub fn is_acceptable_document(raw: &Value) -> bool {
    match raw {
        Value::Object(_) => true,
        Value::String(_) => !unwrap_document(raw).is_empty(),
        _ => false,
    }
}

fn string_field(fields: &Map<String, Value>, key: &str) -> Option<String> {
    fields
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
}
