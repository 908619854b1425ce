//! Row mapping.
//!
//! The compiled query yields one row per annotation and association (term,
//! track, group link). Consecutive rows sharing an `id` are folded into one
//! result object. External fields and derived values are filled in here.

use serde_json::{Map, Value, json};

use crate::compiler::{CompiledQuery, QueryShape};
use crate::kind::AnnotationKind;

/// Per-association columns folded into arrays instead of copied.
const FOLDED: [&str; 11] = [
    "term",
    "annotationTerms",
    "userTerm",
    "track",
    "annotationTracks",
    "x",
    "y",
    "annotationLinks",
    "linkedAnnotations",
    "linkedImages",
    "linkedUpdated",
];

/// Map executed rows to listing results.
pub fn map_rows(query: &CompiledQuery, rows: Vec<Value>, site_url: &str) -> Vec<Value> {
    match query.shape {
        QueryShape::Cluster(_) => map_clusters(rows),
        QueryShape::Plain | QueryShape::AssociationRewrite => {
            map_annotations(query, rows, site_url)
        }
    }
}

fn map_annotations(query: &CompiledQuery, rows: Vec<Value>, site_url: &str) -> Vec<Value> {
    let has = |name: &str| query.fields.iter().any(|field| field.name == name);
    let site_url = site_url.trim_end_matches('/');

    let mut results: Vec<Map<String, Value>> = Vec::new();
    let mut last_id: Option<Value> = None;

    for row in rows {
        let Value::Object(row) = row else {
            continue;
        };
        let id = row.get("id").cloned().unwrap_or(Value::Null);

        if last_id.as_ref() == Some(&id)
            && let Some(item) = results.last_mut()
        {
            merge_associations(item, &row, &has);
            continue;
        }

        let mut item = Map::new();
        for field in &query.fields {
            if field.external || FOLDED.contains(&field.name.as_str()) {
                continue;
            }
            let value = row.get(&field.name).cloned().unwrap_or(Value::Null);
            let value = match field.name.as_str() {
                "areaUnit" | "perimeterUnit" => unit_label(value),
                _ => value,
            };
            item.insert(field.name.clone(), value);
        }

        if has("term") {
            item.insert("term".into(), Value::Array(Vec::new()));
            item.insert("userByTerm".into(), Value::Array(Vec::new()));
        }
        if has("track") {
            item.insert("track".into(), Value::Array(Vec::new()));
            item.insert("annotationTrack".into(), Value::Array(Vec::new()));
        }
        if has("annotationLinks") {
            item.insert("annotationLink".into(), Value::Array(Vec::new()));
        }
        merge_associations(&mut item, &row, &has);

        if has("x") && has("y") {
            item.insert(
                "centroid".into(),
                json!({
                    "x": row.get("x").cloned().unwrap_or(Value::Null),
                    "y": row.get("y").cloned().unwrap_or(Value::Null),
                }),
            );
        }

        for field in query.fields.iter().filter(|field| field.external) {
            let value = external_value(query.kind, &field.name, &row, site_url);
            item.insert(field.name.clone(), value);
        }
        item.insert("class".into(), Value::String(query.kind.domain_class().to_string()));

        results.push(item);
        last_id = Some(id);
    }

    results.into_iter().map(Value::Object).collect()
}

/// Fold the association columns of `row` into `item`.
fn merge_associations(
    item: &mut Map<String, Value>,
    row: &Map<String, Value>,
    has: &dyn Fn(&str) -> bool,
) {
    if has("term")
        && let Some(term) = row.get("term").filter(|term| !term.is_null())
    {
        push_unique(item, "term", term.clone());

        let user = row.get("userTerm").cloned().unwrap_or(Value::Null);
        let entry = array_mut(item, "userByTerm").and_then(|entries| {
            entries
                .iter_mut()
                .find(|entry| entry.get("term") == Some(term))
        });
        match entry {
            Some(entry) => {
                if let Some(Value::Array(users)) = entry.get_mut("user")
                    && !users.contains(&user)
                {
                    users.push(user);
                }
            }
            None => {
                let id = row.get("annotationTerms").cloned().unwrap_or(Value::Null);
                push_unique(
                    item,
                    "userByTerm",
                    json!({ "id": id, "term": term, "user": [user] }),
                );
            }
        }
    }

    if has("track")
        && let Some(track) = row.get("track").filter(|track| !track.is_null())
    {
        push_unique(item, "track", track.clone());
        let id = row.get("annotationTracks").cloned().unwrap_or(Value::Null);
        push_unique(item, "annotationTrack", json!({ "id": id, "track": track }));
    }

    if has("annotationLinks")
        && let Some(link) = row.get("annotationLinks").filter(|link| !link.is_null())
    {
        push_unique(
            item,
            "annotationLink",
            json!({
                "id": link,
                "annotation": row.get("linkedAnnotations").cloned().unwrap_or(Value::Null),
                "image": row.get("linkedImages").cloned().unwrap_or(Value::Null),
                "updated": row.get("linkedUpdated").cloned().unwrap_or(Value::Null),
            }),
        );
    }
}

fn array_mut<'m>(item: &'m mut Map<String, Value>, key: &str) -> Option<&'m mut Vec<Value>> {
    match item.get_mut(key) {
        Some(Value::Array(values)) => Some(values),
        _ => None,
    }
}

fn push_unique(item: &mut Map<String, Value>, key: &str, value: Value) {
    if let Some(values) = array_mut(item, key)
        && !values.contains(&value)
    {
        values.push(value);
    }
}

/// Display label of a stored measurement unit.
fn unit_label(value: Value) -> Value {
    let label = match value.as_i64() {
        Some(0) => "pixels",
        Some(1) => "pixels²",
        Some(2) => "mm",
        Some(3) => "mm²",
        Some(4) => "µm",
        Some(5) => "µm²",
        _ => return value,
    };
    Value::String(label.to_string())
}

fn external_value(
    kind: AnnotationKind,
    name: &str,
    row: &Map<String, Value>,
    site_url: &str,
) -> Value {
    let id = row.get("id").cloned().unwrap_or(Value::Null);
    let crop = format!("{site_url}/api/{}/{id}/crop.png", kind.api_segment());
    match name {
        "cropURL" | "url" => Value::String(crop),
        "smallCropURL" => Value::String(format!("{crop}?maxSize=256")),
        "imageURL" => {
            let project = row.get("project").cloned().unwrap_or(Value::Null);
            let image = row.get("image").cloned().unwrap_or(Value::Null);
            Value::String(format!(
                "{site_url}/#/project/{project}/image/{image}/annotation/{id}"
            ))
        }
        _ => Value::Null,
    }
}

/// Cluster rows with each cluster's share of the largest one.
fn map_clusters(rows: Vec<Value>) -> Vec<Value> {
    let max = rows
        .iter()
        .filter_map(|row| row.get("count").and_then(Value::as_i64))
        .fold(1, i64::max);

    rows.into_iter()
        .map(|row| {
            let count = row.get("count").and_then(Value::as_i64).unwrap_or(0);
            json!({
                "id": row.get("kmeans").cloned().unwrap_or(Value::Null),
                "count": count,
                "location": row.get("location").cloned().unwrap_or(Value::Null),
                "ratio": count as f64 / max as f64,
            })
        })
        .collect()
}

/// Keep results whose `user` is one of `users`.
pub fn retain_users(results: &mut Vec<Value>, users: &[i64]) {
    results.retain(|item| {
        item.get("user")
            .and_then(Value::as_i64)
            .is_some_and(|user| users.contains(&user))
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn units_map_to_labels() {
        assert_eq!(unit_label(json!(3)), json!("mm²"));
        assert_eq!(unit_label(json!(0)), json!("pixels"));
        assert_eq!(unit_label(json!(9)), json!(9));
        assert_eq!(unit_label(Value::Null), Value::Null);
    }

    #[test]
    fn cluster_ratio_is_relative_to_largest() {
        let rows = vec![
            json!({"kmeans": 0, "count": 10, "location": "POINT(1 1)"}),
            json!({"kmeans": 1, "count": 40, "location": "POINT(2 2)"}),
        ];
        let mapped = map_clusters(rows);
        assert_eq!(mapped[0]["id"], json!(0));
        assert_eq!(mapped[0]["ratio"], json!(0.25));
        assert_eq!(mapped[1]["ratio"], json!(1.0));
    }

    #[test]
    fn empty_clusters_do_not_divide_by_zero() {
        let mapped = map_clusters(vec![json!({"kmeans": 0, "count": 0, "location": null})]);
        assert_eq!(mapped[0]["ratio"], json!(0.0));
    }

    #[test]
    fn small_crop_url_has_max_size() {
        let row = json!({"id": 7, "project": 1, "image": 2});
        let row = row.as_object().unwrap();
        assert_eq!(
            external_value(AnnotationKind::Algo, "smallCropURL", row, "http://host"),
            json!("http://host/api/algoannotation/7/crop.png?maxSize=256")
        );
        assert_eq!(
            external_value(AnnotationKind::User, "imageURL", row, "http://host"),
            json!("http://host/#/project/1/image/2/annotation/7")
        );
    }
}
