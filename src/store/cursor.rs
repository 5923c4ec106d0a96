use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Document, StoreError};

/// Opaque position inside an ordered query result. Continuing a query from
/// a cursor returns only documents strictly after it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

/// What a cursor actually records: the order value and id of the last
/// document seen. Ties on the order value are broken by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Position {
    #[serde(rename = "v")]
    pub value: Value,
    pub id: String,
}

impl Cursor {
    /// Cursor positioned at `doc` in a query ordered by `order_by`.
    pub fn after(doc: &Document, order_by: &str) -> Self {
        let position = Position {
            value: doc.field(order_by).cloned().unwrap_or(Value::Null),
            id: doc.id.clone(),
        };
        let bytes = serde_json::to_vec(&position).unwrap_or_default();
        Cursor(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Accepts a cursor string handed out earlier, rejecting anything that
    /// does not decode.
    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        let cursor = Cursor(raw.to_string());
        cursor.position()?;
        Ok(cursor)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub(crate) fn position(&self) -> Result<Position, StoreError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(self.0.as_bytes())
            .map_err(|_| StoreError::InvalidCursor)?;
        serde_json::from_slice(&bytes).map_err(|_| StoreError::InvalidCursor)
    }
}

impl std::fmt::Display for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cursor_carries_order_value_and_id() {
        let doc = Document {
            id: "n1".into(),
            fields: json!({ "createdAt": "2024-05-01T00:00:00.000000Z" })
                .as_object()
                .cloned()
                .unwrap(),
        };
        let cursor = Cursor::after(&doc, "createdAt");
        let parsed = Cursor::parse(cursor.as_str()).unwrap();
        let position = parsed.position().unwrap();
        assert_eq!(position.id, "n1");
        assert_eq!(position.value, json!("2024-05-01T00:00:00.000000Z"));
    }

    #[test]
    fn test_garbage_cursor_is_rejected() {
        assert!(matches!(
            Cursor::parse("not a cursor!"),
            Err(StoreError::InvalidCursor)
        ));
        assert!(matches!(
            Cursor::parse(&URL_SAFE_NO_PAD.encode(b"[1,2]")),
            Err(StoreError::InvalidCursor)
        ));
    }
}
