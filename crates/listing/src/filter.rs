//! Annotation filter value.
//!
//! `FilterSpec` carries every filter dimension of an annotation listing.
//! Values are built once, by chaining `with_*` methods on `Default` or by the
//! listing facade, and are never mutated after compilation starts.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::ColumnGroup;

/// Sort direction for order overrides.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// Reference geometry of the proximity filter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum BaseAnnotation {
    /// Id of an annotation of any kind.
    Id(i64),
    /// Literal WKT geometry.
    Wkt(String),
}

/// Every filter dimension of an annotation listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct FilterSpec {
    // Scope
    pub project: Option<i64>,
    pub image: Option<i64>,
    pub images: Option<Vec<i64>>,
    pub slice: Option<i64>,
    pub slices: Option<Vec<i64>>,
    pub track: Option<i64>,
    pub tracks: Option<Vec<i64>>,
    pub annotation_group: Option<i64>,
    pub annotation_groups: Option<Vec<i64>>,
    /// Parent annotation ids (reviewed annotations only).
    pub parents: Option<Vec<i64>>,

    // Actors
    pub user: Option<i64>,
    pub users: Option<Vec<i64>>,
    pub users_for_term: Option<Vec<i64>>,
    pub review_users: Option<Vec<i64>>,
    pub user_for_term_algo: Option<i64>,
    pub users_for_term_algo: Option<Vec<i64>>,

    // Classification
    pub term: Option<i64>,
    pub terms: Option<Vec<i64>>,
    pub suggested_term: Option<i64>,
    pub suggested_terms: Option<Vec<i64>>,
    pub tag: Option<i64>,
    pub tags: Option<Vec<i64>>,

    // Refinements
    pub no_term: bool,
    pub no_tag: bool,
    pub no_algo_term: bool,
    pub multiple_term: bool,
    pub no_track: bool,
    pub multiple_track: bool,
    pub not_reviewed_only: bool,
    pub avoid_empty_centroid: bool,

    // Spatial
    /// Normalized WKT polygon.
    pub bounding_box: Option<String>,
    /// WKT of another annotation.
    pub bounding_box_annotation: Option<String>,
    pub base_annotation: Option<BaseAnnotation>,
    pub max_distance: Option<f64>,

    // Temporal
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,

    // Sequencing
    pub before_slice: Option<i64>,
    pub after_slice: Option<i64>,
    /// Carried for callers; the compiled query ignores it.
    pub slice_dimension: Option<i64>,

    // Output
    /// Requested column groups; `None` means the default set.
    pub column_groups: Option<BTreeSet<ColumnGroup>>,
    /// Extra `(name, expression)` projections appended verbatim.
    pub extra_columns: Vec<(String, String)>,
    pub excluded_annotation: Option<i64>,
    pub order_by: Vec<(String, SortDirection)>,

    // Clustering
    pub clustering: bool,
    pub clustering_density: Option<u8>,
}

impl FilterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requested groups after normalization: defaults applied, `basic` added.
    pub fn requested_groups(&self) -> BTreeSet<ColumnGroup> {
        let mut groups = self
            .column_groups
            .clone()
            .unwrap_or_else(|| ColumnGroup::DEFAULTS.into_iter().collect());
        groups.insert(ColumnGroup::Basic);
        groups
    }

    pub fn has_term_filter(&self) -> bool {
        self.term.is_some() || self.terms.is_some()
    }

    pub fn has_track_filter(&self) -> bool {
        self.track.is_some() || self.tracks.is_some()
    }

    pub fn has_group_filter(&self) -> bool {
        self.annotation_group.is_some() || self.annotation_groups.is_some()
    }

    pub fn has_tag_filter(&self) -> bool {
        self.tag.is_some() || self.tags.is_some()
    }

    /// Filters on the algorithm suggestion (suggested terms, job users).
    pub fn has_suggestion_filter(&self) -> bool {
        self.suggested_term.is_some()
            || self.suggested_terms.is_some()
            || self.user_for_term_algo.is_some()
            || self.users_for_term_algo.is_some()
    }

    /// Before/after slice only applies together with a track filter.
    pub fn slice_bound(&self) -> Option<(i64, bool)> {
        if !self.has_track_filter() {
            return None;
        }
        match (self.before_slice, self.after_slice) {
            (Some(slice), _) => Some((slice, true)),
            (None, Some(slice)) => Some((slice, false)),
            (None, None) => None,
        }
    }

    // -------------------------------------------------------------------------
    // Builder
    // -------------------------------------------------------------------------

    pub fn with_project(mut self, project: i64) -> Self {
        self.project = Some(project);
        self
    }

    pub fn with_image(mut self, image: i64) -> Self {
        self.image = Some(image);
        self
    }

    pub fn with_images(mut self, images: Vec<i64>) -> Self {
        self.images = Some(images);
        self
    }

    pub fn with_slice(mut self, slice: i64) -> Self {
        self.slice = Some(slice);
        self
    }

    pub fn with_slices(mut self, slices: Vec<i64>) -> Self {
        self.slices = Some(slices);
        self
    }

    pub fn with_track(mut self, track: i64) -> Self {
        self.track = Some(track);
        self
    }

    pub fn with_tracks(mut self, tracks: Vec<i64>) -> Self {
        self.tracks = Some(tracks);
        self
    }

    pub fn with_annotation_group(mut self, group: i64) -> Self {
        self.annotation_group = Some(group);
        self
    }

    pub fn with_annotation_groups(mut self, groups: Vec<i64>) -> Self {
        self.annotation_groups = Some(groups);
        self
    }

    pub fn with_parents(mut self, parents: Vec<i64>) -> Self {
        self.parents = Some(parents);
        self
    }

    pub fn with_user(mut self, user: i64) -> Self {
        self.user = Some(user);
        self
    }

    pub fn with_users(mut self, users: Vec<i64>) -> Self {
        self.users = Some(users);
        self
    }

    pub fn with_users_for_term(mut self, users: Vec<i64>) -> Self {
        self.users_for_term = Some(users);
        self
    }

    pub fn with_review_users(mut self, users: Vec<i64>) -> Self {
        self.review_users = Some(users);
        self
    }

    pub fn with_user_for_term_algo(mut self, user: i64) -> Self {
        self.user_for_term_algo = Some(user);
        self
    }

    pub fn with_users_for_term_algo(mut self, users: Vec<i64>) -> Self {
        self.users_for_term_algo = Some(users);
        self
    }

    pub fn with_term(mut self, term: i64) -> Self {
        self.term = Some(term);
        self
    }

    pub fn with_terms(mut self, terms: Vec<i64>) -> Self {
        self.terms = Some(terms);
        self
    }

    pub fn with_suggested_term(mut self, term: i64) -> Self {
        self.suggested_term = Some(term);
        self
    }

    pub fn with_suggested_terms(mut self, terms: Vec<i64>) -> Self {
        self.suggested_terms = Some(terms);
        self
    }

    pub fn with_tag(mut self, tag: i64) -> Self {
        self.tag = Some(tag);
        self
    }

    pub fn with_tags(mut self, tags: Vec<i64>) -> Self {
        self.tags = Some(tags);
        self
    }

    pub fn with_no_term(mut self, value: bool) -> Self {
        self.no_term = value;
        self
    }

    pub fn with_no_tag(mut self, value: bool) -> Self {
        self.no_tag = value;
        self
    }

    pub fn with_no_algo_term(mut self, value: bool) -> Self {
        self.no_algo_term = value;
        self
    }

    pub fn with_multiple_term(mut self, value: bool) -> Self {
        self.multiple_term = value;
        self
    }

    pub fn with_no_track(mut self, value: bool) -> Self {
        self.no_track = value;
        self
    }

    pub fn with_multiple_track(mut self, value: bool) -> Self {
        self.multiple_track = value;
        self
    }

    pub fn with_not_reviewed_only(mut self, value: bool) -> Self {
        self.not_reviewed_only = value;
        self
    }

    pub fn with_avoid_empty_centroid(mut self, value: bool) -> Self {
        self.avoid_empty_centroid = value;
        self
    }

    pub fn with_bounding_box(mut self, wkt: impl Into<String>) -> Self {
        self.bounding_box = Some(wkt.into());
        self
    }

    pub fn with_bounding_box_annotation(mut self, wkt: impl Into<String>) -> Self {
        self.bounding_box_annotation = Some(wkt.into());
        self
    }

    pub fn with_base_annotation(mut self, base: BaseAnnotation) -> Self {
        self.base_annotation = Some(base);
        self
    }

    pub fn with_max_distance(mut self, distance: f64) -> Self {
        self.max_distance = Some(distance);
        self
    }

    pub fn with_created_after(mut self, at: DateTime<Utc>) -> Self {
        self.created_after = Some(at);
        self
    }

    pub fn with_created_before(mut self, at: DateTime<Utc>) -> Self {
        self.created_before = Some(at);
        self
    }

    pub fn with_before_slice(mut self, slice: i64) -> Self {
        self.before_slice = Some(slice);
        self
    }

    pub fn with_after_slice(mut self, slice: i64) -> Self {
        self.after_slice = Some(slice);
        self
    }

    pub fn with_slice_dimension(mut self, dimension: i64) -> Self {
        self.slice_dimension = Some(dimension);
        self
    }

    pub fn with_column_groups(mut self, groups: impl IntoIterator<Item = ColumnGroup>) -> Self {
        self.column_groups = Some(groups.into_iter().collect());
        self
    }

    /// Add one group on top of the requested (or default) set.
    pub fn with_column_group(mut self, group: ColumnGroup) -> Self {
        let mut groups = self
            .column_groups
            .take()
            .unwrap_or_else(|| ColumnGroup::DEFAULTS.into_iter().collect());
        groups.insert(group);
        self.column_groups = Some(groups);
        self
    }

    pub fn with_extra_column(mut self, name: impl Into<String>, expr: impl Into<String>) -> Self {
        self.extra_columns.push((name.into(), expr.into()));
        self
    }

    pub fn with_excluded_annotation(mut self, id: i64) -> Self {
        self.excluded_annotation = Some(id);
        self
    }

    pub fn with_order_by(mut self, column: impl Into<String>, direction: SortDirection) -> Self {
        self.order_by.push((column.into(), direction));
        self
    }

    pub fn with_clustering(mut self, value: bool) -> Self {
        self.clustering = value;
        self
    }

    pub fn with_clustering_density(mut self, density: u8) -> Self {
        self.clustering_density = Some(density);
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn default_groups_include_basic() {
        let groups = FilterSpec::new().requested_groups();
        assert_eq!(
            groups.into_iter().collect::<Vec<_>>(),
            vec![ColumnGroup::Basic, ColumnGroup::Meta, ColumnGroup::Term]
        );
    }

    #[test]
    fn explicit_groups_gain_basic() {
        let spec = FilterSpec::new().with_column_groups([ColumnGroup::Wkt]);
        let groups = spec.requested_groups();
        assert!(groups.contains(&ColumnGroup::Basic));
        assert!(groups.contains(&ColumnGroup::Wkt));
        assert!(!groups.contains(&ColumnGroup::Meta));
    }

    #[test]
    fn with_column_group_extends_defaults() {
        let spec = FilterSpec::new().with_column_group(ColumnGroup::Gis);
        let groups = spec.requested_groups();
        assert!(groups.contains(&ColumnGroup::Meta));
        assert!(groups.contains(&ColumnGroup::Gis));
    }

    #[test]
    fn slice_bound_requires_track() {
        let spec = FilterSpec::new().with_before_slice(4);
        assert_eq!(spec.slice_bound(), None);

        let spec = spec.with_track(2);
        assert_eq!(spec.slice_bound(), Some((4, true)));

        let spec = FilterSpec::new().with_tracks(vec![1]).with_after_slice(9);
        assert_eq!(spec.slice_bound(), Some((9, false)));
    }

    #[test]
    fn builder_values_compare_structurally() {
        let a = FilterSpec::new().with_project(1).with_terms(vec![3, 4]);
        let b = FilterSpec::new().with_terms(vec![3, 4]).with_project(1);
        assert_eq!(a, b);
    }

    #[test]
    fn deserializes_camel_case() {
        let spec: FilterSpec = serde_json::from_value(serde_json::json!({
            "project": 10,
            "terms": [3, 4],
            "noTerm": true,
            "baseAnnotation": "POINT (1 2)",
            "columnGroups": ["basic", "imageGroup"]
        }))
        .unwrap();
        assert_eq!(spec.project, Some(10));
        assert!(spec.no_term);
        assert_eq!(
            spec.base_annotation,
            Some(BaseAnnotation::Wkt("POINT (1 2)".to_string()))
        );
        assert!(spec.requested_groups().contains(&ColumnGroup::ImageGroup));
    }
}
