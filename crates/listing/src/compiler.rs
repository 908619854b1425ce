//! Query compiler.
//!
//! Turns an annotation kind and a `FilterSpec` into one parameterized
//! PostgreSQL statement, in one of three shapes:
//!
//! - **Plain**: `SELECT <columns> FROM <base> <joins> WHERE ... ORDER BY ...`
//! - **Association rewrite**: used when terms or tracks are filtered. The
//!   plain query, without the association columns and without ordering,
//!   becomes the row source of an outer `SELECT DISTINCT` that re-joins the
//!   association table. One row per annotation and matching association.
//! - **Cluster**: used when the clustering density is below 3. Matched
//!   geometries are grouped with `ST_ClusterKMeans` and aggregated per
//!   cluster; requested column groups do not apply.
//!
//! `compile` validates the filter and resolves the facts it needs through an
//! `EntityLookup`; `render` is the pure, synchronous second half.

use std::collections::{BTreeSet, HashSet};

use sea_query::{Alias, Expr, Order, PostgresQueryBuilder, Query, SelectStatement, Values};
use serde::Serialize;
use tracing::{debug, warn};

use crate::catalog::{self, ColumnExpr, ColumnGroup};
use crate::clustering::{ClusterMode, Density};
use crate::error::{ListingError, ListingResult};
use crate::filter::{BaseAnnotation, FilterSpec, SortDirection};
use crate::geometry;
use crate::joins::{self, JoinKey, JoinPlan};
use crate::kind::AnnotationKind;
use crate::lookup::EntityLookup;
use crate::predicates::{self, PredicateContext, SLICE_RANK};

/// Number of clusters requested from `ST_ClusterKMeans`.
const KMEANS_CLUSTERS: u32 = 5;

/// A field exposed by the row mapper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputField {
    pub name: String,
    /// Computed after execution rather than selected.
    pub external: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum QueryShape {
    Plain,
    AssociationRewrite,
    Cluster(ClusterMode),
}

/// A compiled listing statement and its bound values.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub kind: AnnotationKind,
    pub sql: String,
    pub values: Values,
    pub fields: Vec<OutputField>,
    pub shape: QueryShape,
}

/// Facts resolved from the store before rendering.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolved {
    /// `images` lists every image of `project`; the constraint is dropped.
    pub images_cover_project: bool,
    /// Rank of the before/after reference slice.
    pub reference_rank: Option<i64>,
    /// WKT of the proximity filter's base geometry.
    pub base_geometry: Option<String>,
}

pub struct QueryCompiler;

impl QueryCompiler {
    /// Validate, resolve and render.
    pub async fn compile(
        kind: AnnotationKind,
        spec: &FilterSpec,
        lookup: &dyn EntityLookup,
    ) -> ListingResult<CompiledQuery> {
        let resolved = resolve(kind, spec, lookup).await?;
        Self::render(kind, spec, &resolved)
    }

    /// Render an already validated filter.
    pub fn render(
        kind: AnnotationKind,
        spec: &FilterSpec,
        resolved: &Resolved,
    ) -> ListingResult<CompiledQuery> {
        check_compatibility(kind, spec)?;
        check_values(spec)?;

        let ctx = PredicateContext {
            kind,
            spec,
            resolved,
        };

        let density = spec
            .clustering_density
            .map(Density::from_value)
            .unwrap_or(Density::Full);

        let (query, fields, shape) = if let Some(mode) = density.cluster_mode() {
            (cluster_query(&ctx, mode), cluster_fields(), QueryShape::Cluster(mode))
        } else if needs_rewrite(kind, spec) {
            (
                rewrite_query(&ctx),
                output_fields(kind, spec),
                QueryShape::AssociationRewrite,
            )
        } else {
            (
                plain_query(&ctx)?,
                output_fields(kind, spec),
                QueryShape::Plain,
            )
        };

        let (sql, values) = query.build(PostgresQueryBuilder);
        debug!(
            kind = %kind,
            shape = ?shape,
            params = values.0.len(),
            "compiled annotation listing"
        );

        Ok(CompiledQuery {
            kind,
            sql,
            values,
            fields,
            shape,
        })
    }
}

fn needs_rewrite(kind: AnnotationKind, spec: &FilterSpec) -> bool {
    (spec.has_term_filter() && kind.term_alias().is_some())
        || (spec.has_track_filter() && kind.track_alias().is_some())
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Reject filter dimensions the kind cannot express.
pub fn check_compatibility(kind: AnnotationKind, spec: &FilterSpec) -> ListingResult<()> {
    use AnnotationKind::{Algo, Reviewed, Roi, User};

    let has_terms = kind.term_alias().is_some();
    let has_tracks = kind.track_alias().is_some();
    let suggestions = matches!(kind, User | Algo);

    // (field, active, supported by this kind)
    let checks: &[(&'static str, bool, bool)] = &[
        ("track", spec.track.is_some(), has_tracks),
        ("tracks", spec.tracks.is_some(), has_tracks),
        ("noTrack", spec.no_track, has_tracks),
        ("multipleTrack", spec.multiple_track, has_tracks),
        ("term", spec.term.is_some(), has_terms),
        ("terms", spec.terms.is_some(), has_terms),
        ("noTerm", spec.no_term, has_terms),
        ("multipleTerm", spec.multiple_term, has_terms),
        ("annotationGroup", spec.annotation_group.is_some(), kind != Roi),
        ("annotationGroups", spec.annotation_groups.is_some(), kind != Roi),
        (
            "usersForTerm",
            spec.users_for_term.is_some(),
            matches!(kind, User | Reviewed),
        ),
        ("suggestedTerm", spec.suggested_term.is_some(), suggestions),
        ("suggestedTerms", spec.suggested_terms.is_some(), suggestions),
        ("userForTermAlgo", spec.user_for_term_algo.is_some(), suggestions),
        ("usersForTermAlgo", spec.users_for_term_algo.is_some(), suggestions),
        ("noAlgoTerm", spec.no_algo_term, suggestions),
        ("reviewUsers", spec.review_users.is_some(), kind == Reviewed),
        ("parents", spec.parents.is_some(), kind == Reviewed),
    ];
    if let Some(&(field, _, _)) = checks.iter().find(|(_, active, supported)| *active && !supported)
    {
        return Err(ListingError::invalid(
            field,
            format!("not supported for {kind} annotations"),
        ));
    }

    if kind == User && spec.no_algo_term {
        if spec.requested_groups().contains(&ColumnGroup::Algo) {
            return Err(ListingError::invalid(
                "noAlgoTerm",
                "cannot be combined with the algo column group",
            ));
        }
        if spec.has_suggestion_filter() {
            return Err(ListingError::invalid(
                "noAlgoTerm",
                "cannot be combined with suggested term filters",
            ));
        }
    }

    Ok(())
}

/// Validate values that need no lookup: ordering, geometries, proximity.
pub fn check_values(spec: &FilterSpec) -> ListingResult<()> {
    for (column, _) in &spec.order_by {
        if !is_safe_column(column) {
            return Err(ListingError::invalid(
                "orderBy",
                format!("unsafe column {column:?}"),
            ));
        }
    }
    if let Some(bbox) = &spec.bounding_box {
        geometry::parse_wkt("boundingBox", bbox)?;
    }
    if let Some(wkt) = &spec.bounding_box_annotation {
        geometry::parse_wkt("boundingBoxAnnotation", wkt)?;
    }
    if spec.max_distance.is_some() {
        match &spec.base_annotation {
            None => {
                return Err(ListingError::invalid(
                    "baseAnnotation",
                    "required with maxDistance (annotation id or WKT)",
                ));
            }
            Some(BaseAnnotation::Wkt(wkt)) => {
                geometry::parse_wkt("baseAnnotation", wkt)?;
            }
            Some(BaseAnnotation::Id(_)) => {}
        }
    }
    Ok(())
}

/// Validate identifier (alphanumeric + underscore, 1-63 chars, not starting with digit).
fn is_safe_identifier(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= 63
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !s.starts_with(|c: char| c.is_ascii_digit())
}

/// `column` or `alias.column`.
fn is_safe_column(column: &str) -> bool {
    let segments: Vec<&str> = column.split('.').collect();
    segments.len() <= 2 && segments.iter().all(|segment| is_safe_identifier(segment))
}

/// Validate a filter against the store and resolve the facts `render` needs.
pub async fn resolve(
    kind: AnnotationKind,
    spec: &FilterSpec,
    lookup: &dyn EntityLookup,
) -> ListingResult<Resolved> {
    check_compatibility(kind, spec)?;
    check_values(spec)?;

    let mut resolved = Resolved::default();

    if let Some(user) = spec.user
        && lookup.user(user).await?.is_none()
    {
        return Err(ListingError::not_found("user", format!("user {user} not found")));
    }

    if let Some(image) = spec.image
        && lookup.image(image).await?.is_none()
    {
        return Err(ListingError::not_found("image", format!("image {image} not found")));
    }

    if let Some(images) = &spec.images {
        if images.is_empty() {
            return Err(ListingError::not_found("images", "the image has been deleted"));
        }
        if let Some(project) = spec.project {
            let count = lookup.project_image_count(project).await?.ok_or_else(|| {
                ListingError::not_found("project", format!("project {project} not found"))
            })?;
            let distinct: HashSet<i64> = images.iter().copied().collect();
            if distinct.len() as i64 == count {
                debug!(project, count, "images cover the whole project, dropping constraint");
                resolved.images_cover_project = true;
            }
        }
    }

    if let Some(slice) = spec.slice
        && lookup.slice(slice).await?.is_none()
    {
        return Err(ListingError::not_found("slice", format!("slice {slice} not found")));
    }

    if let Some(slices) = &spec.slices
        && slices.is_empty()
    {
        return Err(ListingError::not_found("slices", "the slice has been deleted"));
    }

    if let Some(term) = spec.term
        && lookup.term(term).await?.is_none()
    {
        return Err(ListingError::not_found("term", format!("term {term} not found")));
    }

    if let Some(track) = spec.track
        && !lookup.track_exists(track).await?
    {
        return Err(ListingError::not_found("track", format!("track {track} not found")));
    }

    if let Some((slice, before)) = spec.slice_bound() {
        let field = if before { "beforeSlice" } else { "afterSlice" };
        let reference = lookup
            .slice(slice)
            .await?
            .ok_or_else(|| ListingError::not_found(field, format!("slice {slice} not found")))?;
        resolved.reference_rank = Some(reference.rank);
    }

    if let Some(group) = spec.annotation_group
        && !lookup.annotation_group_exists(group).await?
    {
        return Err(ListingError::not_found(
            "annotationGroup",
            format!("annotation group {group} not found"),
        ));
    }

    if let Some(term) = spec.suggested_term
        && lookup.term(term).await?.is_none()
    {
        return Err(ListingError::not_found(
            "suggestedTerm",
            format!("term {term} not found"),
        ));
    }

    if spec.max_distance.is_some() {
        resolved.base_geometry = match &spec.base_annotation {
            Some(BaseAnnotation::Id(id)) => match lookup.annotation_wkt(*id).await? {
                Some(wkt) => Some(wkt),
                None => {
                    warn!(id, "base annotation not found, using the value as geometry text");
                    let text = id.to_string();
                    geometry::parse_wkt("baseAnnotation", &text)?;
                    Some(text)
                }
            },
            Some(BaseAnnotation::Wkt(wkt)) => Some(wkt.clone()),
            None => None,
        };
    }

    Ok(resolved)
}

// ---------------------------------------------------------------------------
// Projection
// ---------------------------------------------------------------------------

/// Groups both requested and available for the kind.
pub fn projected_groups(kind: AnnotationKind, spec: &FilterSpec) -> BTreeSet<ColumnGroup> {
    spec.requested_groups()
        .into_iter()
        .filter(|group| catalog::supports(kind, *group))
        .collect()
}

struct Projected {
    name: String,
    expr: Option<String>,
}

fn projection(kind: AnnotationKind, spec: &FilterSpec) -> Vec<Projected> {
    let groups = projected_groups(kind, spec);
    let mut columns: Vec<Projected> = catalog::column_groups(kind)
        .iter()
        .filter(|entry| groups.contains(&entry.group))
        .flat_map(|entry| entry.columns.iter())
        .map(|column| Projected {
            name: column.name.to_string(),
            expr: match column.expr {
                ColumnExpr::Sql(expr) => Some(expr.to_string()),
                ColumnExpr::External => None,
            },
        })
        .collect();
    columns.extend(spec.extra_columns.iter().map(|(name, expr)| Projected {
        name: name.clone(),
        expr: Some(expr.clone()),
    }));
    columns
}

fn output_fields(kind: AnnotationKind, spec: &FilterSpec) -> Vec<OutputField> {
    projection(kind, spec)
        .into_iter()
        .map(|column| OutputField {
            external: column.expr.is_none(),
            name: column.name,
        })
        .collect()
}

fn cluster_fields() -> Vec<OutputField> {
    ["kmeans", "count", "location"]
        .into_iter()
        .map(|name| OutputField {
            name: name.to_string(),
            external: false,
        })
        .collect()
}

/// Aliases the association rewrite re-joins in the outer query.
fn rewritten_aliases(kind: AnnotationKind, spec: &FilterSpec) -> Vec<&'static str> {
    let mut aliases = Vec::new();
    if spec.has_term_filter()
        && let Some(alias) = kind.term_alias()
    {
        aliases.push(alias);
    }
    if spec.has_track_filter()
        && let Some(alias) = kind.track_alias()
    {
        aliases.push(alias);
    }
    aliases
}

// ---------------------------------------------------------------------------
// Shapes
// ---------------------------------------------------------------------------

/// Row-level query without ordering: projection, joins and predicates.
fn row_query<'a>(
    ctx: &PredicateContext<'_>,
    columns: impl IntoIterator<Item = (&'a str, &'a str)>,
    plan: &JoinPlan,
) -> SelectStatement {
    let mut query = Query::select();
    for (name, expr) in columns {
        query.expr_as(Expr::cust(expr), Alias::new(name));
    }
    query.from_as(Alias::new(ctx.kind.base_table()), Alias::new("a"));
    plan.apply(&mut query);
    for predicate in predicates::assemble(ctx) {
        query.and_where(predicate);
    }
    query
}

fn plain_query(ctx: &PredicateContext<'_>) -> ListingResult<SelectStatement> {
    let groups = projected_groups(ctx.kind, ctx.spec);
    let plan = joins::plan(ctx.kind, &groups, ctx.spec);
    let columns = projection(ctx.kind, ctx.spec);
    let mut query = row_query(
        ctx,
        columns
            .iter()
            .filter_map(|c| c.expr.as_deref().map(|expr| (c.name.as_str(), expr))),
        &plan,
    );
    for (column, order) in plain_order(ctx.kind, ctx.spec, &plan)? {
        query.order_by_expr(Expr::cust(column), order);
    }
    Ok(query)
}

fn plain_order(
    kind: AnnotationKind,
    spec: &FilterSpec,
    plan: &JoinPlan,
) -> ListingResult<Vec<(String, Order)>> {
    let associations = matches!(kind, AnnotationKind::User | AnnotationKind::Algo);
    let suggested = associations && spec.has_suggestion_filter();

    // User listings order by rate before any override; algo listings after.
    if !spec.order_by.is_empty() && !(suggested && kind == AnnotationKind::User) {
        return spec
            .order_by
            .iter()
            .map(|(column, direction)| {
                if !is_safe_column(column) {
                    return Err(ListingError::invalid(
                        "orderBy",
                        format!("unsafe column {column:?}"),
                    ));
                }
                let order = match direction {
                    SortDirection::Asc => Order::Asc,
                    SortDirection::Desc => Order::Desc,
                };
                Ok((column.clone(), order))
            })
            .collect();
    }

    if suggested {
        return Ok(vec![("aat.rate".to_string(), Order::Desc)]);
    }

    let mut order = vec![("a.id".to_string(), Order::Desc)];
    if associations {
        if plan.contains(JoinKey::Term)
            && let Some(alias) = kind.term_alias()
        {
            order.push((format!("{alias}.term_id"), Order::Asc));
        }
        if plan.contains(JoinKey::Track) {
            order.push(("atr.track_id".to_string(), Order::Asc));
        }
    }
    Ok(order)
}

fn rewrite_query(ctx: &PredicateContext<'_>) -> SelectStatement {
    let kind = ctx.kind;
    let spec = ctx.spec;
    let aliases = rewritten_aliases(kind, spec);
    let references_rewritten =
        |expr: &str| aliases.iter().any(|alias| catalog::references_alias(expr, alias));

    // Inner: everything but the re-joined association columns.
    let groups = projected_groups(kind, spec);
    let plan = joins::plan(kind, &groups, spec);
    let columns = projection(kind, spec);
    let mut inner_columns: Vec<(&str, &str)> = columns
        .iter()
        .filter_map(|c| c.expr.as_deref().map(|expr| (c.name.as_str(), expr)))
        .filter(|(_, expr)| !references_rewritten(expr))
        .collect();
    let track_filtered = spec.has_track_filter();
    if track_filtered {
        inner_columns.push(("rank", SLICE_RANK));
    }
    let inner = row_query(ctx, inner_columns, &plan);

    // Outer: distinct rows re-joined to their associations.
    let mut outer = Query::select();
    outer.distinct().expr(Expr::cust("a.*"));
    for group in [ColumnGroup::Term, ColumnGroup::Track] {
        for column in catalog::group_columns(kind, group).unwrap_or_default() {
            if let ColumnExpr::Sql(expr) = column.expr
                && references_rewritten(expr)
            {
                outer.expr_as(Expr::cust(expr), Alias::new(column.name));
            }
        }
    }
    outer.from_subquery(inner, Alias::new("a"));
    joins::association_plan(kind, spec).apply(&mut outer);

    if track_filtered {
        outer.order_by_expr(Expr::cust("a.rank"), Order::Asc);
    } else {
        outer.order_by_expr(Expr::cust("a.id"), Order::Desc);
    }
    if spec.has_term_filter()
        && let Some(alias) = kind.term_alias()
    {
        outer.order_by_expr(Expr::cust(format!("{alias}.term_id")), Order::Asc);
    }
    if track_filtered {
        outer.order_by_expr(Expr::cust("atr.track_id"), Order::Asc);
    }
    outer
}

fn cluster_query(ctx: &PredicateContext<'_>, mode: ClusterMode) -> SelectStatement {
    // Requested groups do not apply: only filter-escalated joins.
    let plan = joins::plan(ctx.kind, &BTreeSet::new(), ctx.spec);
    let mut matched = row_query(ctx, [("id", "a.id"), ("location", "a.location")], &plan);
    matched.distinct();

    let mut clustered = Query::select();
    clustered
        .expr_as(
            Expr::cust(format!(
                "ST_ClusterKMeans(location, {KMEANS_CLUSTERS}) OVER ()"
            )),
            Alias::new("kmeans"),
        )
        .expr(Expr::cust("location"))
        .from_subquery(matched, Alias::new("matched"));

    let mut query = Query::select();
    query
        .expr(Expr::cust("kmeans"))
        .expr_as(Expr::cust("COUNT(*)"), Alias::new("count"))
        .expr_as(
            Expr::cust(format!("ST_AsText({})", mode.aggregate())),
            Alias::new("location"),
        )
        .from_subquery(clustered, Alias::new("ksub"))
        .add_group_by([Expr::cust("kmeans")])
        .order_by_expr(Expr::cust("kmeans"), Order::Asc);
    query
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn render(kind: AnnotationKind, spec: &FilterSpec) -> CompiledQuery {
        QueryCompiler::render(kind, spec, &Resolved::default()).unwrap()
    }

    fn field_names(query: &CompiledQuery) -> Vec<&str> {
        query.fields.iter().map(|f| f.name.as_str()).collect()
    }

    #[test]
    fn plain_default_projection() {
        let query = render(AnnotationKind::User, &FilterSpec::new().with_project(10));
        assert_eq!(query.shape, QueryShape::Plain);
        assert!(query.sql.starts_with("SELECT a.id AS \"id\""), "{}", query.sql);
        assert!(query.sql.contains("FROM \"user_annotation\" AS \"a\""));
        assert!(query.sql.contains("LEFT JOIN \"annotation_term\" AS \"at\""));
        assert!(query.sql.contains("ORDER BY a.id DESC, at.term_id ASC"));
        assert!(!query.sql.contains("cropURL"));
        assert!(field_names(&query).contains(&"cropURL"));
        assert_eq!(query.values.0.len(), 1);
    }

    #[test]
    fn basic_only_has_no_joins() {
        let spec = FilterSpec::new()
            .with_project(1)
            .with_column_groups([ColumnGroup::Basic]);
        let query = render(AnnotationKind::User, &spec);
        assert!(!query.sql.contains("JOIN"), "{}", query.sql);
        assert!(query.sql.contains("ORDER BY a.id DESC"));
        assert_eq!(field_names(&query), vec!["id"]);
    }

    #[test]
    fn term_filter_rewrites_with_distinct() {
        let spec = FilterSpec::new().with_project(1).with_terms(vec![1, 2]);
        let query = render(AnnotationKind::User, &spec);
        assert_eq!(query.shape, QueryShape::AssociationRewrite);
        assert!(query.sql.starts_with("SELECT DISTINCT a.*, at.term_id AS \"term\""));
        assert!(query.sql.ends_with("ORDER BY a.id DESC, at.term_id ASC"), "{}", query.sql);
    }

    #[test]
    fn track_filter_orders_by_rank() {
        let spec = FilterSpec::new().with_project(1).with_track(7);
        let query = render(AnnotationKind::User, &spec);
        assert_eq!(query.shape, QueryShape::AssociationRewrite);
        assert!(query.sql.contains(&format!("{SLICE_RANK} AS \"rank\"")));
        assert!(query.sql.ends_with("ORDER BY a.rank ASC, atr.track_id ASC"), "{}", query.sql);
    }

    #[test]
    fn suggested_term_orders_by_rate() {
        let spec = FilterSpec::new().with_project(1).with_suggested_term(3);
        let query = render(AnnotationKind::User, &spec);
        assert!(query.sql.ends_with("ORDER BY aat.rate DESC"), "{}", query.sql);
        assert!(query.sql.contains("INNER JOIN \"algo_annotation_term\" AS \"aat\""));
    }

    #[test]
    fn override_order_wins_for_algo() {
        let spec = FilterSpec::new()
            .with_project(1)
            .with_suggested_term(3)
            .with_order_by("a.created", SortDirection::Asc);
        let query = render(AnnotationKind::Algo, &spec);
        assert!(query.sql.ends_with("ORDER BY a.created ASC"), "{}", query.sql);
    }

    #[test]
    fn rate_order_wins_for_user_suggestions() {
        let spec = FilterSpec::new()
            .with_project(1)
            .with_suggested_term(3)
            .with_order_by("a.created", SortDirection::Asc);
        let query = render(AnnotationKind::User, &spec);
        assert!(query.sql.ends_with("ORDER BY aat.rate DESC"), "{}", query.sql);

        let spec = FilterSpec::new()
            .with_project(1)
            .with_order_by("a.created", SortDirection::Asc);
        let query = render(AnnotationKind::User, &spec);
        assert!(query.sql.ends_with("ORDER BY a.created ASC"), "{}", query.sql);
    }

    #[test]
    fn unsafe_order_is_rejected() {
        let spec = FilterSpec::new().with_order_by("a.id; DROP TABLE x", SortDirection::Asc);
        let err = QueryCompiler::render(AnnotationKind::User, &spec, &Resolved::default())
            .unwrap_err();
        assert_eq!(err.field(), Some("orderBy"));
    }

    #[test]
    fn density_two_clusters_three_does_not() {
        let spec = FilterSpec::new()
            .with_project(1)
            .with_clustering(true)
            .with_clustering_density(2);
        let query = render(AnnotationKind::User, &spec);
        assert_eq!(query.shape, QueryShape::Cluster(ClusterMode::Full));
        assert!(query.sql.contains("ST_ClusterKMeans(location, 5) OVER ()"));
        assert!(query.sql.contains("ST_ConvexHull"));
        assert!(query.sql.contains("GROUP BY kmeans"));
        assert!(!query.sql.contains("annotation_term"));

        let query = render(AnnotationKind::User, &spec.clone().with_clustering_density(3));
        assert_eq!(query.shape, QueryShape::Plain);
    }

    #[test]
    fn track_filter_on_reviewed_is_invalid() {
        let spec = FilterSpec::new().with_project(1).with_track(2);
        let err = QueryCompiler::render(AnnotationKind::Reviewed, &spec, &Resolved::default())
            .unwrap_err();
        assert_eq!(err.field(), Some("track"));
    }

    #[test]
    fn max_distance_needs_base() {
        let spec = FilterSpec::new().with_project(1).with_max_distance(10.0);
        let err = QueryCompiler::render(AnnotationKind::User, &spec, &Resolved::default())
            .unwrap_err();
        assert_eq!(err.field(), Some("baseAnnotation"));
    }

    #[test]
    fn safe_columns() {
        assert!(is_safe_column("a.id"));
        assert!(is_safe_column("created"));
        assert!(!is_safe_column("a.b.c"));
        assert!(!is_safe_column("1a"));
        assert!(!is_safe_column("a.id DESC"));
        assert!(!is_safe_column(""));
    }
}
