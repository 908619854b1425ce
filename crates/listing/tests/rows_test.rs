#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Row mapping integration tests over compiled queries.

mod common;

use annotation_listing::rows::{map_rows, retain_users};
use annotation_listing::{AnnotationKind, ColumnGroup, FilterSpec};
use common::compiled;
use serde_json::json;

const SITE: &str = "http://localhost:8090";

#[tokio::test]
async fn association_rows_merge_per_annotation() {
    let spec = FilterSpec::new().with_project(10).with_terms(vec![3, 4]);
    let query = compiled(AnnotationKind::User, &spec).await;
    let rows = vec![
        json!({"id": 9, "project": 10, "image": 100, "user": 1, "term": 3, "annotationTerms": 90, "userTerm": 1}),
        json!({"id": 9, "project": 10, "image": 100, "user": 1, "term": 3, "annotationTerms": 91, "userTerm": 5}),
        json!({"id": 9, "project": 10, "image": 100, "user": 1, "term": 4, "annotationTerms": 92, "userTerm": 1}),
        json!({"id": 8, "project": 10, "image": 100, "user": 1, "term": null, "annotationTerms": null, "userTerm": null}),
    ];

    let results = map_rows(&query, rows, SITE);
    assert_eq!(results.len(), 2);

    let first = &results[0];
    assert_eq!(first["id"], json!(9));
    assert_eq!(first["term"], json!([3, 4]));
    assert_eq!(
        first["userByTerm"],
        json!([
            {"id": 90, "term": 3, "user": [1, 5]},
            {"id": 92, "term": 4, "user": [1]},
        ])
    );
    assert!(first.get("annotationTerms").is_none());
    assert!(first.get("userTerm").is_none());
    assert_eq!(first["class"], json!("be.cytomine.domain.ontology.UserAnnotation"));
    assert_eq!(
        first["cropURL"],
        json!("http://localhost:8090/api/userannotation/9/crop.png")
    );
    assert_eq!(first["url"], first["cropURL"]);
    assert_eq!(
        first["imageURL"],
        json!("http://localhost:8090/#/project/10/image/100/annotation/9")
    );

    let second = &results[1];
    assert_eq!(second["term"], json!([]));
    assert_eq!(second["userByTerm"], json!([]));
}

#[tokio::test]
async fn gis_rows_get_centroid_and_unit_labels() {
    let spec = FilterSpec::new()
        .with_project(10)
        .with_column_groups([ColumnGroup::Gis]);
    let query = compiled(AnnotationKind::Roi, &spec).await;
    let rows = vec![json!({
        "id": 1, "area": 12.0, "areaUnit": 1, "perimeter": 4.0, "perimeterUnit": 2,
        "x": 3.5, "y": 7.25
    })];

    let results = map_rows(&query, rows, SITE);
    let item = &results[0];
    assert_eq!(item["centroid"], json!({"x": 3.5, "y": 7.25}));
    assert_eq!(item["areaUnit"], json!("pixels²"));
    assert_eq!(item["perimeterUnit"], json!("mm"));
    assert!(item.get("x").is_none());
    assert!(item.get("cropURL").is_none());
    assert_eq!(item["class"], json!("be.cytomine.domain.processing.RoiAnnotation"));
}

#[tokio::test]
async fn track_and_link_rows_fold_into_arrays() {
    let spec = FilterSpec::new()
        .with_project(10)
        .with_column_groups([ColumnGroup::Track, ColumnGroup::Group]);
    let query = compiled(AnnotationKind::User, &spec).await;
    let rows = vec![
        json!({"id": 4, "track": 7, "annotationTracks": 70, "group": 8,
               "annotationLinks": 80, "linkedAnnotations": 4, "linkedImages": 100, "linkedUpdated": null}),
        json!({"id": 4, "track": 7, "annotationTracks": 70, "group": 8,
               "annotationLinks": 81, "linkedAnnotations": 5, "linkedImages": 101, "linkedUpdated": null}),
    ];

    let results = map_rows(&query, rows, SITE);
    assert_eq!(results.len(), 1);
    let item = &results[0];
    assert_eq!(item["track"], json!([7]));
    assert_eq!(item["annotationTrack"], json!([{"id": 70, "track": 7}]));
    assert_eq!(item["group"], json!(8));
    assert_eq!(
        item["annotationLink"],
        json!([
            {"id": 80, "annotation": 4, "image": 100, "updated": null},
            {"id": 81, "annotation": 5, "image": 101, "updated": null},
        ])
    );
}

#[tokio::test]
async fn cluster_rows_carry_ratio() {
    let spec = FilterSpec::new().with_project(10).with_clustering_density(2);
    let query = compiled(AnnotationKind::User, &spec).await;
    let rows = vec![
        json!({"kmeans": 0, "count": 5, "location": "POLYGON((0 0,1 1,1 0,0 0))"}),
        json!({"kmeans": 1, "count": 20, "location": "POINT(4 4)"}),
    ];
    let results = map_rows(&query, rows, SITE);
    assert_eq!(
        results,
        vec![
            json!({"id": 0, "count": 5, "location": "POLYGON((0 0,1 1,1 0,0 0))", "ratio": 0.25}),
            json!({"id": 1, "count": 20, "location": "POINT(4 4)", "ratio": 1.0}),
        ]
    );
}

#[test]
fn report_rows_keep_requested_users() {
    let mut results = vec![
        json!({"id": 1, "user": 1}),
        json!({"id": 2, "user": 2}),
        json!({"id": 3}),
    ];
    retain_users(&mut results, &[2]);
    assert_eq!(results, vec![json!({"id": 2, "user": 2})]);
}
