//! Column catalog.
//!
//! Every annotation kind owns a fixed, ordered registry of column groups.
//! A group maps output field names to SQL expressions, or marks a field as
//! computed after the query runs (derived URLs). The tables are `'static`
//! and shared by every compilation.

use serde::{Deserialize, Serialize};

use crate::error::ListingError;
use crate::kind::AnnotationKind;

/// Named bundle of output fields.
///
/// Variant order is the projection order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum ColumnGroup {
    Basic,
    Meta,
    Wkt,
    Gis,
    Term,
    Track,
    ImageGroup,
    Group,
    Image,
    Slice,
    Algo,
    User,
}

impl ColumnGroup {
    pub const ALL: [ColumnGroup; 12] = [
        Self::Basic,
        Self::Meta,
        Self::Wkt,
        Self::Gis,
        Self::Term,
        Self::Track,
        Self::ImageGroup,
        Self::Group,
        Self::Image,
        Self::Slice,
        Self::Algo,
        Self::User,
    ];

    /// Groups shown when the caller asks for none.
    pub const DEFAULTS: [ColumnGroup; 3] = [Self::Basic, Self::Meta, Self::Term];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Meta => "meta",
            Self::Wkt => "wkt",
            Self::Gis => "gis",
            Self::Term => "term",
            Self::Track => "track",
            Self::ImageGroup => "imageGroup",
            Self::Group => "group",
            Self::Image => "image",
            Self::Slice => "slice",
            Self::Algo => "algo",
            Self::User => "user",
        }
    }
}

impl std::str::FromStr for ColumnGroup {
    type Err = ListingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|group| group.as_str() == s)
            .ok_or_else(|| ListingError::invalid("columnGroups", format!("unknown group {s:?}")))
    }
}

impl std::fmt::Display for ColumnGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a field's value is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnExpr {
    /// Projected with this SQL expression.
    Sql(&'static str),
    /// Filled in by the row mapper; never part of the SQL projection.
    External,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub expr: ColumnExpr,
}

const fn sql(name: &'static str, expr: &'static str) -> Column {
    Column {
        name,
        expr: ColumnExpr::Sql(expr),
    }
}

const fn external(name: &'static str) -> Column {
    Column {
        name,
        expr: ColumnExpr::External,
    }
}

#[derive(Debug)]
pub struct GroupColumns {
    pub group: ColumnGroup,
    pub columns: &'static [Column],
}

// ---------------------------------------------------------------------------
// Shared groups
// ---------------------------------------------------------------------------

const BASIC: &[Column] = &[sql("id", "a.id")];

const URLS: [Column; 4] = [
    external("cropURL"),
    external("smallCropURL"),
    external("url"),
    external("imageURL"),
];

const WKT: &[Column] = &[
    sql("location", "a.wkt_location"),
    sql("geometryCompression", "a.geometry_compression"),
];

const GIS: &[Column] = &[
    sql("area", "a.area"),
    sql("areaUnit", "a.area_unit"),
    sql("perimeter", "a.perimeter"),
    sql("perimeterUnit", "a.perimeter_unit"),
    sql("x", "ST_X(ST_Centroid(a.location))"),
    sql("y", "ST_Y(ST_Centroid(a.location))"),
];

const TRACK: &[Column] = &[
    sql("track", "atr.track_id"),
    sql("annotationTracks", "atr.id"),
];

const IMAGE_GROUP: &[Column] = &[sql("imageGroup", "ig.group_id")];

const GROUP: &[Column] = &[
    sql("group", "al.group_id"),
    sql("annotationLinks", "al.id"),
    sql("linkedAnnotations", "al.annotation_ident"),
    sql("linkedImages", "al.image_id"),
    sql("linkedUpdated", "al.updated"),
];

const IMAGE: &[Column] = &[
    sql("originalFilename", "ai.original_filename"),
    sql(
        "instanceFilename",
        "COALESCE(ii.instance_filename, ai.original_filename)",
    ),
];

const SLICE: &[Column] = &[
    sql("channel", "asl.channel"),
    sql("zStack", "asl.z_stack"),
    sql("time", "asl.time"),
];

const HUMAN_USER: &[Column] = &[
    sql("creator", "u.username"),
    sql("lastname", "u.lastname"),
    sql("firstname", "u.firstname"),
];

// ---------------------------------------------------------------------------
// Per-kind groups
// ---------------------------------------------------------------------------

const COUNTED_META: &[Column] = &[
    sql("created", "extract(epoch from a.created)*1000"),
    sql("updated", "extract(epoch from a.updated)*1000"),
    sql("image", "a.image_id"),
    sql("slice", "a.slice_id"),
    sql("project", "a.project_id"),
    sql("user", "a.user_id"),
    sql("nbComments", "a.count_comments"),
    sql("countReviewedAnnotations", "a.count_reviewed_annotations"),
    sql("reviewed", "(a.count_reviewed_annotations>0)"),
    URLS[0],
    URLS[1],
    URLS[2],
    URLS[3],
];

const REVIEWED_META: &[Column] = &[
    sql("created", "extract(epoch from a.created)*1000"),
    sql("updated", "extract(epoch from a.updated)*1000"),
    sql("image", "a.image_id"),
    sql("slice", "a.slice_id"),
    sql("project", "a.project_id"),
    sql("user", "a.user_id"),
    sql("nbComments", "a.count_comments"),
    sql("reviewed", "true"),
    sql("reviewUser", "a.review_user_id"),
    sql("parentIdent", "a.parent_ident"),
    URLS[0],
    URLS[1],
    URLS[2],
    URLS[3],
];

const ROI_META: &[Column] = &[
    sql("created", "extract(epoch from a.created)*1000"),
    sql("updated", "extract(epoch from a.updated)*1000"),
    sql("image", "a.image_id"),
    sql("slice", "a.slice_id"),
    sql("project", "a.project_id"),
    sql("user", "a.user_id"),
    URLS[0],
    URLS[1],
    URLS[2],
    URLS[3],
];

const USER_TERM: &[Column] = &[
    sql("term", "at.term_id"),
    sql("annotationTerms", "at.id"),
    sql("userTerm", "at.user_id"),
];

const ALGO_TERM: &[Column] = &[
    sql("term", "aat.term_id"),
    sql("annotationTerms", "aat.id"),
    sql("userTerm", "aat.user_job_id"),
    sql("rate", "aat.rate"),
];

// The reviewer who created the reviewed annotation also owns its terms.
const REVIEWED_TERM: &[Column] = &[
    sql("term", "at.term_id"),
    sql("annotationTerms", "0"),
    sql("userTerm", "a.user_id"),
];

const SUGGESTION: &[Column] = &[
    sql("algoAnnotationTerm", "aat.id"),
    sql("rate", "aat.rate"),
    sql("idTerm", "aat.term_id"),
    sql("idExpectedTerm", "aat.expected_term_id"),
];

const JOB_USER: &[Column] = &[
    sql("creator", "u.username"),
    sql("software", "s.name"),
    sql("job", "j.id"),
];

const fn group(group: ColumnGroup, columns: &'static [Column]) -> GroupColumns {
    GroupColumns { group, columns }
}

static USER_CATALOG: [GroupColumns; 12] = [
    group(ColumnGroup::Basic, BASIC),
    group(ColumnGroup::Meta, COUNTED_META),
    group(ColumnGroup::Wkt, WKT),
    group(ColumnGroup::Gis, GIS),
    group(ColumnGroup::Term, USER_TERM),
    group(ColumnGroup::Track, TRACK),
    group(ColumnGroup::ImageGroup, IMAGE_GROUP),
    group(ColumnGroup::Group, GROUP),
    group(ColumnGroup::Image, IMAGE),
    group(ColumnGroup::Slice, SLICE),
    group(ColumnGroup::Algo, SUGGESTION),
    group(ColumnGroup::User, HUMAN_USER),
];

static ALGO_CATALOG: [GroupColumns; 11] = [
    group(ColumnGroup::Basic, BASIC),
    group(ColumnGroup::Meta, COUNTED_META),
    group(ColumnGroup::Wkt, WKT),
    group(ColumnGroup::Gis, GIS),
    group(ColumnGroup::Term, ALGO_TERM),
    group(ColumnGroup::Track, TRACK),
    group(ColumnGroup::ImageGroup, IMAGE_GROUP),
    group(ColumnGroup::Group, GROUP),
    group(ColumnGroup::Image, IMAGE),
    group(ColumnGroup::Slice, SLICE),
    group(ColumnGroup::User, JOB_USER),
];

static REVIEWED_CATALOG: [GroupColumns; 10] = [
    group(ColumnGroup::Basic, BASIC),
    group(ColumnGroup::Meta, REVIEWED_META),
    group(ColumnGroup::Wkt, WKT),
    group(ColumnGroup::Gis, GIS),
    group(ColumnGroup::Term, REVIEWED_TERM),
    group(ColumnGroup::ImageGroup, IMAGE_GROUP),
    group(ColumnGroup::Group, GROUP),
    group(ColumnGroup::Image, IMAGE),
    group(ColumnGroup::Slice, SLICE),
    group(ColumnGroup::User, HUMAN_USER),
];

static ROI_CATALOG: [GroupColumns; 7] = [
    group(ColumnGroup::Basic, BASIC),
    group(ColumnGroup::Meta, ROI_META),
    group(ColumnGroup::Wkt, WKT),
    group(ColumnGroup::Gis, GIS),
    group(ColumnGroup::Image, IMAGE),
    group(ColumnGroup::Slice, SLICE),
    group(ColumnGroup::User, HUMAN_USER),
];

/// All column groups of a kind, in projection order.
pub fn column_groups(kind: AnnotationKind) -> &'static [GroupColumns] {
    match kind {
        AnnotationKind::User => &USER_CATALOG,
        AnnotationKind::Algo => &ALGO_CATALOG,
        AnnotationKind::Reviewed => &REVIEWED_CATALOG,
        AnnotationKind::Roi => &ROI_CATALOG,
    }
}

/// Columns of one group, or `None` when the kind has no such group.
pub fn group_columns(kind: AnnotationKind, group: ColumnGroup) -> Option<&'static [Column]> {
    column_groups(kind)
        .iter()
        .find(|entry| entry.group == group)
        .map(|entry| entry.columns)
}

pub fn supports(kind: AnnotationKind, group: ColumnGroup) -> bool {
    group_columns(kind, group).is_some()
}

/// Field names of the given groups, in catalog order.
pub fn field_names<'a>(
    kind: AnnotationKind,
    groups: impl IntoIterator<Item = &'a ColumnGroup>,
) -> Vec<&'static str> {
    let wanted: Vec<ColumnGroup> = groups.into_iter().copied().collect();
    column_groups(kind)
        .iter()
        .filter(|entry| wanted.contains(&entry.group))
        .flat_map(|entry| entry.columns.iter().map(|column| column.name))
        .collect()
}

/// Whether `expr` reads a column through `alias.` (whole-word match).
pub fn references_alias(expr: &str, alias: &str) -> bool {
    let needle = format!("{alias}.");
    expr.match_indices(&needle).any(|(at, _)| {
        expr[..at]
            .chars()
            .next_back()
            .is_none_or(|c| !(c.is_ascii_alphanumeric() || c == '_'))
    })
}
