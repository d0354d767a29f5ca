// Snapshot mutations - insert, replace by id, merge by query
//
// These operate on an already-loaded snapshot and never touch storage; the
// caller persists the snapshot only when they return Ok.

use crate::document::{render, Document, CREATED_AT_FIELD, ID_FIELD, UPDATED_AT_FIELD};
use crate::error::{BaseDbError, Result};
use crate::query::Query;
use std::collections::HashSet;

/// Stamp and append new documents. Fails without modifying the snapshot if
/// any resulting `id` is already taken, including within the batch itself.
pub fn insert_documents(
    snapshot: &mut Vec<Document>,
    new_docs: Vec<Document>,
    now: &str,
) -> Result<Vec<Document>> {
    let mut taken: HashSet<String> = snapshot
        .iter()
        .filter_map(|d| d.id().map(render))
        .collect();

    let mut stamped = Vec::with_capacity(new_docs.len());
    for mut doc in new_docs {
        doc.stamp_at(now);
        if let Some(id) = doc.id().map(render) {
            if !taken.insert(id.clone()) {
                return Err(BaseDbError::Conflict(format!(
                    "document with id '{id}' already exists"
                )));
            }
        }
        stamped.push(doc);
    }

    snapshot.extend(stamped.iter().cloned());
    Ok(stamped)
}

/// Replace the first document whose `id` equals `id` with `replacement`,
/// keeping the stored `id` and `created_at` and refreshing `updated_at`.
pub fn replace_by_id(
    snapshot: &mut [Document],
    id: &str,
    mut replacement: Document,
    now: &str,
) -> Result<Document> {
    let slot = snapshot
        .iter_mut()
        .find(|d| d.id_str() == Some(id))
        .ok_or_else(|| BaseDbError::NotFound(format!("no document with id '{id}'")))?;

    replacement.insert(ID_FIELD, id);
    let created_at = slot
        .get(CREATED_AT_FIELD)
        .cloned()
        .unwrap_or_else(|| now.into());
    replacement.insert(CREATED_AT_FIELD, created_at);
    replacement.insert(UPDATED_AT_FIELD, now);

    *slot = replacement.clone();
    Ok(replacement)
}

/// Overlay `patch` onto every document matching `query`. Reserved fields in
/// the patch are ignored. Zero matches is `NotFound`.
pub fn merge_matching(
    snapshot: &mut [Document],
    query: &Query,
    patch: &Document,
    now: &str,
) -> Result<Vec<Document>> {
    let mut updated = Vec::new();

    for doc in snapshot.iter_mut().filter(|d| query.matches(d)) {
        for (field, value) in patch.iter() {
            if field == ID_FIELD || field == CREATED_AT_FIELD {
                continue;
            }
            doc.insert(field.clone(), value.clone());
        }
        if !doc.contains(CREATED_AT_FIELD) {
            doc.insert(CREATED_AT_FIELD, now);
        }
        doc.insert(UPDATED_AT_FIELD, now);
        updated.push(doc.clone());
    }

    if updated.is_empty() {
        return Err(BaseDbError::NotFound(
            "no documents match the query".to_string(),
        ));
    }
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parse_query;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    const T0: &str = "2026-02-13T10:00:00Z";
    const T1: &str = "2026-02-14T10:00:00Z";

    fn doc(value: Value) -> Document {
        Document::from_value(value).unwrap()
    }

    #[test]
    fn test_insert_stamps_and_appends() {
        let mut snapshot = vec![doc(json!({ "id": "a", "name": "first" }))];
        let inserted = insert_documents(
            &mut snapshot,
            vec![doc(json!({ "name": "x" })), doc(json!({ "name": "x" }))],
            T0,
        )
        .unwrap();

        assert_eq!(snapshot.len(), 3);
        assert_eq!(inserted.len(), 2);
        assert_ne!(inserted[0].id_str(), inserted[1].id_str());
        assert_eq!(inserted[0].get(CREATED_AT_FIELD), Some(&json!(T0)));
        assert_eq!(snapshot[1], inserted[0]);
    }

    #[test]
    fn test_insert_rejects_duplicate_id() {
        let mut snapshot = vec![doc(json!({ "id": "a" }))];
        let result = insert_documents(&mut snapshot, vec![doc(json!({ "id": "a" }))], T0);
        assert!(matches!(result, Err(BaseDbError::Conflict(_))));
        assert_eq!(snapshot.len(), 1);

        let result = insert_documents(
            &mut snapshot,
            vec![doc(json!({ "id": "b" })), doc(json!({ "id": "b" }))],
            T0,
        );
        assert!(matches!(result, Err(BaseDbError::Conflict(_))));
        assert_eq!(snapshot.len(), 1);
    }

    #[test]
    fn test_replace_by_id_keeps_identity() {
        let mut snapshot = vec![
            doc(json!({ "id": "a", "created_at": T0, "updated_at": T0, "name": "old", "extra": 1 })),
            doc(json!({ "id": "b", "name": "other" })),
        ];
        let replaced = replace_by_id(
            &mut snapshot,
            "a",
            doc(json!({ "id": "hijack", "created_at": "1999-01-01T00:00:00Z", "name": "new" })),
            T1,
        )
        .unwrap();

        assert_eq!(
            replaced,
            doc(json!({ "id": "a", "created_at": T0, "updated_at": T1, "name": "new" }))
        );
        assert_eq!(snapshot[0], replaced);
        assert_eq!(snapshot[1], doc(json!({ "id": "b", "name": "other" })));
    }

    #[test]
    fn test_replace_by_id_not_found() {
        let mut snapshot = vec![doc(json!({ "id": "a" }))];
        let before = snapshot.clone();
        let result = replace_by_id(&mut snapshot, "missing", doc(json!({})), T1);
        assert!(matches!(result, Err(BaseDbError::NotFound(_))));
        assert_eq!(snapshot, before);
    }

    #[test]
    fn test_replace_by_id_requires_text_id() {
        let mut snapshot = vec![doc(json!({ "id": 7 }))];
        assert!(replace_by_id(&mut snapshot, "7", doc(json!({})), T1).is_err());
    }

    #[test]
    fn test_merge_matching_overlays_fields() {
        let mut snapshot = vec![
            doc(json!({ "id": "a", "created_at": T0, "role": "guest", "name": "A" })),
            doc(json!({ "id": "b", "created_at": T0, "role": "admin", "name": "B" })),
            doc(json!({ "id": "c", "created_at": T0, "role": "guest", "name": "C" })),
        ];
        let query = parse_query(&json!({ "role": "guest" })).unwrap();
        let patch = doc(json!({ "role": "member", "active": true, "created_at": T1 }));

        let updated = merge_matching(&mut snapshot, &query, &patch, T1).unwrap();

        assert_eq!(updated.len(), 2);
        assert_eq!(
            snapshot[0],
            doc(json!({
                "id": "a", "created_at": T0, "updated_at": T1,
                "role": "member", "name": "A", "active": true
            }))
        );
        assert_eq!(snapshot[1].get("role"), Some(&json!("admin")));
    }

    #[test]
    fn test_merge_matching_zero_matches() {
        let mut snapshot = vec![doc(json!({ "id": "a", "role": "admin" }))];
        let query = parse_query(&json!({ "role": "guest" })).unwrap();
        let result = merge_matching(&mut snapshot, &query, &doc(json!({ "x": 1 })), T1);
        assert!(matches!(result, Err(BaseDbError::NotFound(_))));
    }
}
