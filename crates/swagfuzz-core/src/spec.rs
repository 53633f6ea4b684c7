//! Swagger v2 document handle and `$ref` resolution

use std::sync::Arc;

use serde_json::Value;

/// Parsed Swagger document, read-only for the process lifetime.
///
/// Cloning is cheap (`Arc`), which lets strategy closures capture the spec
/// without copying the document.
#[derive(Clone, Debug)]
pub struct SwaggerSpec {
    doc: Arc<Value>,
}

impl SwaggerSpec {
    #[must_use]
    pub fn new(doc: Value) -> Self {
        Self { doc: Arc::new(doc) }
    }

    #[must_use]
    pub fn doc(&self) -> &Value {
        &self.doc
    }

    /// `paths` object: endpoint path template → path item.
    ///
    /// `serde_json::Map` keeps keys sorted, so iteration order is the
    /// deterministic endpoint enumeration order.
    #[must_use]
    pub fn paths(&self) -> Option<&serde_json::Map<String, Value>> {
        self.doc.get("paths").and_then(Value::as_object)
    }

    /// Spec-global `consumes` media types.
    #[must_use]
    pub fn consumes(&self) -> Vec<String> {
        string_list(self.doc.get("consumes"))
    }

    /// Spec-global `produces` media types.
    #[must_use]
    pub fn produces(&self) -> Vec<String> {
        string_list(self.doc.get("produces"))
    }

    /// Resolve a `#/`-rooted JSON pointer against this document.
    ///
    /// # Errors
    ///
    /// See [`resolve`].
    pub fn resolve(&self, pointer: &str) -> Result<&Value, SpecError> {
        resolve(pointer, &self.doc)
    }
}

pub(crate) fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

/// Resolve a `$ref` pointer of the form `#/a/b/c` against the document root.
///
/// Each segment is a successive object-key or array-index lookup. An absent
/// segment is fatal for the current trial: either the spec is malformed or a
/// pointer was mis-derived.
///
/// # Errors
///
/// `BadPointer` if the pointer does not start with `#/`, `Unresolvable` if
/// any segment lookup fails.
pub fn resolve<'a>(pointer: &str, doc: &'a Value) -> Result<&'a Value, SpecError> {
    let Some(rest) = pointer.strip_prefix("#/") else {
        return Err(SpecError::BadPointer(pointer.to_string()));
    };

    let mut node = doc;
    for segment in rest.split('/') {
        let next = match node {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        node = next.ok_or_else(|| SpecError::Unresolvable {
            pointer: pointer.to_string(),
            segment: segment.to_string(),
        })?;
    }
    Ok(node)
}

#[derive(Debug, thiserror::Error)]
pub enum SpecError {
    #[error("reference {0:?} does not start with #/")]
    BadPointer(String),
    #[error("reference {pointer:?} has no segment {segment:?}")]
    Unresolvable { pointer: String, segment: String },
}
