#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Listing facade integration tests: request parameters to filters,
//! security containers and report inputs.

use annotation_listing::{
    AnnotationKind, BaseAnnotation, ColumnGroup, FilterSpec, ListingError, ListingFacade,
    ProjectRef,
};
use annotation_listing_test_utils::{params, sample_lookup};

// -------------------------------------------------------------------------
// build_specification
// -------------------------------------------------------------------------

#[tokio::test]
async fn builds_scope_and_classification() {
    let lookup = sample_lookup();
    let facade = ListingFacade::new(&lookup);
    let (kind, spec) = facade
        .build_specification(&params(&[
            ("project", "10"),
            ("images", "100,101"),
            ("terms", "3_4"),
            ("noTerm", "true"),
            ("tags", "5"),
            ("excludedAnnotation", "50"),
        ]))
        .await
        .unwrap();

    assert_eq!(kind, AnnotationKind::User);
    assert_eq!(spec.project, Some(10));
    assert_eq!(spec.images, Some(vec![100, 101]));
    assert_eq!(spec.terms, Some(vec![3, 4]));
    assert!(spec.no_term);
    assert_eq!(spec.tags, Some(vec![5]));
    assert_eq!(spec.excluded_annotation, Some(50));
    assert_eq!(
        spec.requested_groups(),
        [ColumnGroup::Basic, ColumnGroup::Meta, ColumnGroup::Term]
            .into_iter()
            .collect()
    );
}

#[tokio::test]
async fn kind_flags_take_precedence() {
    let lookup = sample_lookup();
    let facade = ListingFacade::new(&lookup);
    let cases = [
        (vec![("reviewed", "true"), ("roi", "true")], AnnotationKind::Reviewed),
        (vec![("roi", "true"), ("includeAlgo", "true")], AnnotationKind::Roi),
        (vec![("includeAlgo", "true")], AnnotationKind::Algo),
        (vec![("user", "2")], AnnotationKind::Algo),
        (vec![("user", "1")], AnnotationKind::User),
        (vec![("users", "1_2")], AnnotationKind::Algo),
        (vec![("users", "1")], AnnotationKind::User),
        (vec![], AnnotationKind::User),
    ];
    for (pairs, expected) in cases {
        let (kind, _) = facade.build_specification(&params(&pairs)).await.unwrap();
        assert_eq!(kind, expected, "{pairs:?}");
    }
}

#[tokio::test]
async fn unknown_user_is_not_found() {
    let lookup = sample_lookup();
    let err = ListingFacade::new(&lookup)
        .build_specification(&params(&[("user", "99")]))
        .await
        .unwrap_err();
    assert!(matches!(err, ListingError::NotFound { field: "user", .. }));
}

#[tokio::test]
async fn jobs_map_to_their_users() {
    let lookup = sample_lookup();
    let (kind, spec) = ListingFacade::new(&lookup)
        .build_specification(&params(&[("job", "20"), ("jobForTermAlgo", "20")]))
        .await
        .unwrap();
    assert_eq!(kind, AnnotationKind::Algo);
    assert_eq!(spec.user, Some(2));
    assert_eq!(spec.user_for_term_algo, Some(2));
}

#[tokio::test]
async fn slice_bounds_need_a_track() {
    let lookup = sample_lookup();
    let facade = ListingFacade::new(&lookup);

    let (_, spec) = facade
        .build_specification(&params(&[("afterSlice", "1000")]))
        .await
        .unwrap();
    assert_eq!(spec.after_slice, None);

    let (_, spec) = facade
        .build_specification(&params(&[("track", "7"), ("afterSlice", "1000")]))
        .await
        .unwrap();
    assert_eq!(spec.after_slice, Some(1000));
}

#[tokio::test]
async fn spatial_parameters() {
    let lookup = sample_lookup();
    let (_, spec) = ListingFacade::new(&lookup)
        .build_specification(&params(&[
            ("bbox", "0,0,100,50"),
            ("bboxAnnotation", "50"),
            ("baseAnnotation", "POINT(1 1)"),
            ("maxDistanceBaseAnnotation", "12.5"),
        ]))
        .await
        .unwrap();
    assert_eq!(
        spec.bounding_box.as_deref(),
        Some("POLYGON((0 0, 0 50, 100 50, 100 0, 0 0))")
    );
    assert_eq!(
        spec.bounding_box_annotation.as_deref(),
        Some("POLYGON((0 0, 0 10, 10 10, 10 0, 0 0))")
    );
    assert_eq!(
        spec.base_annotation,
        Some(BaseAnnotation::Wkt("POINT(1 1)".to_string()))
    );
    assert_eq!(spec.max_distance, Some(12.5));

    let (_, spec) = ListingFacade::new(&lookup)
        .build_specification(&params(&[("baseAnnotation", "50")]))
        .await
        .unwrap();
    assert_eq!(spec.base_annotation, Some(BaseAnnotation::Id(50)));
}

#[tokio::test]
async fn missing_bbox_annotation_is_not_found() {
    let lookup = sample_lookup();
    let err = ListingFacade::new(&lookup)
        .build_specification(&params(&[("bboxAnnotation", "404")]))
        .await
        .unwrap_err();
    assert_eq!(err.field(), Some("bboxAnnotation"));
}

#[tokio::test]
async fn malformed_values_name_the_parameter() {
    let lookup = sample_lookup();
    let facade = ListingFacade::new(&lookup);
    for (name, value) in [
        ("project", "ten"),
        ("terms", "3,x"),
        ("bbox", "1,2,3"),
        ("afterThan", "yesterday"),
        ("maxDistanceBaseAnnotation", "far"),
    ] {
        let err = facade
            .build_specification(&params(&[(name, value)]))
            .await
            .unwrap_err();
        assert!(matches!(err, ListingError::InvalidArgument { .. }), "{name}");
    }
}

#[tokio::test]
async fn kmeans_value_only_with_kmeans() {
    let lookup = sample_lookup();
    let facade = ListingFacade::new(&lookup);

    let (_, spec) = facade
        .build_specification(&params(&[("kmeansValue", "2")]))
        .await
        .unwrap();
    assert!(!spec.clustering);
    assert_eq!(spec.clustering_density, None);

    let (_, spec) = facade
        .build_specification(&params(&[("kmeans", "true"), ("kmeansValue", "2")]))
        .await
        .unwrap();
    assert!(spec.clustering);
    assert_eq!(spec.clustering_density, Some(2));
}

#[tokio::test]
async fn dates_are_epoch_millis() {
    let lookup = sample_lookup();
    let (_, spec) = ListingFacade::new(&lookup)
        .build_specification(&params(&[("afterThan", "1000"), ("beforeThan", "2000")]))
        .await
        .unwrap();
    assert_eq!(spec.created_after.unwrap().timestamp_millis(), 1000);
    assert_eq!(spec.created_before.unwrap().timestamp_millis(), 2000);
}

// -------------------------------------------------------------------------
// resolve_security_container
// -------------------------------------------------------------------------

#[tokio::test]
async fn container_from_each_scope() {
    let lookup = sample_lookup();
    let facade = ListingFacade::new(&lookup);
    let cases = [
        FilterSpec::new().with_project(10).with_image(200),
        FilterSpec::new().with_image(100),
        FilterSpec::new().with_images(vec![100, 101]),
        FilterSpec::new().with_slice(1000),
        FilterSpec::new().with_slices(vec![1000, 1001]),
    ];
    for spec in cases {
        assert_eq!(
            facade.resolve_security_container(&spec).await.unwrap(),
            ProjectRef { id: 10 }
        );
    }
}

#[tokio::test]
async fn container_spanning_projects_is_invalid() {
    let lookup = sample_lookup();
    let facade = ListingFacade::new(&lookup);

    let err = facade
        .resolve_security_container(&FilterSpec::new().with_images(vec![100, 200]))
        .await
        .unwrap_err();
    assert!(matches!(err, ListingError::InvalidArgument { field: "images", .. }));

    let err = facade
        .resolve_security_container(&FilterSpec::new().with_slices(vec![1000, 2000]))
        .await
        .unwrap_err();
    assert!(matches!(err, ListingError::InvalidArgument { field: "slices", .. }));
}

#[tokio::test]
async fn container_requires_a_scope() {
    let lookup = sample_lookup();
    let err = ListingFacade::new(&lookup)
        .resolve_security_container(&FilterSpec::new().with_terms(vec![3]))
        .await
        .unwrap_err();
    assert!(matches!(err, ListingError::InvalidArgument { field: "project", .. }));
}

#[tokio::test]
async fn container_with_unknown_entity_is_not_found() {
    let lookup = sample_lookup();
    let facade = ListingFacade::new(&lookup);
    for (spec, field) in [
        (FilterSpec::new().with_project(99), "project"),
        (FilterSpec::new().with_image(99), "image"),
        (FilterSpec::new().with_slices(vec![1000, 99]), "slices"),
    ] {
        let err = facade.resolve_security_container(&spec).await.unwrap_err();
        assert_eq!(err.field(), Some(field));
    }
}

// -------------------------------------------------------------------------
// build_report_input
// -------------------------------------------------------------------------

#[tokio::test]
async fn report_input_adds_groups_and_names() {
    let lookup = sample_lookup();
    let input = ListingFacade::new(&lookup)
        .build_report_input(&params(&[("project", "10"), ("terms", "0,3,-1,4")]), &[1, 99])
        .await
        .unwrap();

    let groups = input.spec.requested_groups();
    for group in [
        ColumnGroup::Gis,
        ColumnGroup::Image,
        ColumnGroup::User,
        ColumnGroup::Term,
    ] {
        assert!(groups.contains(&group), "{group}");
    }
    assert_eq!(input.term_names.get(&3).map(String::as_str), Some("tumor"));
    assert_eq!(input.term_names.get(&4).map(String::as_str), Some("stroma"));
    assert_eq!(input.term_names.len(), 2);
    assert_eq!(input.user_names.get(&1).map(String::as_str), Some("alice"));
    assert!(!input.user_names.contains_key(&99));
    assert_eq!(input.users, vec![1, 99]);
}
