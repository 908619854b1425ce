//! Predicate assembler.
//!
//! One builder per filter dimension. Each builder is a pure function of the
//! filter, the annotation kind and the facts resolved during validation; it
//! returns `None` when its dimension is inactive. Builders run in a fixed
//! order so the WHERE clause (and its parameter numbering) is reproducible.
//!
//! Every request-derived value is bound as a parameter. Fragments number
//! their own placeholders from `$1`; sea-query renumbers them when the whole
//! statement is built.

use sea_query::{Expr, SimpleExpr, Value};

use crate::compiler::Resolved;
use crate::filter::FilterSpec;
use crate::kind::AnnotationKind;

/// Linear index of a slice among all planes of its image.
pub const SLICE_RANK: &str = "(asl.channel + ai.channels * (asl.z_stack + ai.depth * asl.time))";

// ---------------------------------------------------------------------------
// Fragment
// ---------------------------------------------------------------------------

/// SQL text with locally numbered `$n` placeholders and their values.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub sql: String,
    pub values: Vec<Value>,
}

impl Fragment {
    pub fn new(sql: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            values,
        }
    }

    /// Fragment without parameters.
    pub fn raw(sql: impl Into<String>) -> Self {
        Self::new(sql, Vec::new())
    }

    /// `column = $1`
    pub fn equals(column: &str, value: impl Into<Value>) -> Self {
        Self::new(format!("{column} = $1"), vec![value.into()])
    }

    /// `column IN ($1, ...)`; an empty list matches nothing.
    pub fn in_list(column: &str, ids: &[i64]) -> Self {
        if ids.is_empty() {
            return Self::raw("FALSE");
        }
        let placeholders = (1..=ids.len())
            .map(|n| format!("${n}"))
            .collect::<Vec<_>>()
            .join(", ");
        Self::new(
            format!("{column} IN ({placeholders})"),
            ids.iter().map(|&id| id.into()).collect(),
        )
    }

    /// Conjunction; placeholders of `other` are shifted after ours.
    pub fn and(mut self, other: Fragment) -> Self {
        let shifted = shift_placeholders(&other.sql, self.values.len());
        self.sql = format!("{} AND {shifted}", self.sql);
        self.values.extend(other.values);
        self
    }

    /// `(self) OR column IS NULL`
    pub fn or_null(self, column: &str) -> Self {
        Self {
            sql: format!("({}) OR {column} IS NULL", self.sql),
            values: self.values,
        }
    }

    /// Custom expression carrying the bound values.
    ///
    /// sea-query parenthesizes each condition of a multi-condition WHERE.
    pub fn into_expr(self) -> SimpleExpr {
        if self.values.is_empty() {
            Expr::cust(self.sql)
        } else {
            Expr::cust_with_values(self.sql, self.values)
        }
    }

    /// As `into_expr`, wrapped in parentheses for a join's `ON`.
    pub fn into_grouped_expr(self) -> SimpleExpr {
        Self {
            sql: format!("({})", self.sql),
            values: self.values,
        }
        .into_expr()
    }
}

fn shift_placeholders(sql: &str, offset: usize) -> String {
    if offset == 0 {
        return sql.to_string();
    }
    let mut out = String::with_capacity(sql.len());
    let mut rest = sql;
    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..=pos]);
        rest = &rest[pos + 1..];
        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        if let Ok(n) = rest[..digits].parse::<usize>() {
            out.push_str(&(n + offset).to_string());
        }
        rest = &rest[digits..];
    }
    out.push_str(rest);
    out
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

/// Inputs shared by every predicate builder.
#[derive(Debug, Clone, Copy)]
pub struct PredicateContext<'a> {
    pub kind: AnnotationKind,
    pub spec: &'a FilterSpec,
    pub resolved: &'a Resolved,
}

impl PredicateContext<'_> {
    fn term_column(&self) -> Option<String> {
        self.kind.term_alias().map(|alias| format!("{alias}.term_id"))
    }
}

type Builder = fn(&PredicateContext<'_>) -> Option<Fragment>;

/// Builders in WHERE order.
const BUILDERS: &[Builder] = &[
    project,
    user,
    users,
    image,
    images,
    slice,
    slices,
    tag,
    tags,
    term,
    terms,
    track,
    tracks,
    slice_bound,
    group,
    groups,
    users_for_term,
    user_for_term_algo,
    users_for_term_algo,
    suggested_term,
    suggested_terms,
    not_reviewed_only,
    parents,
    avoid_empty_centroid,
    review_users,
    bounding_box,
    bounding_box_annotation,
    max_distance,
    excluded_annotation,
    created_before,
    created_after,
    no_term,
    multiple_term,
    no_algo_term,
    no_track,
    multiple_track,
];

/// Active fragments, in WHERE order.
pub fn fragments(ctx: &PredicateContext<'_>) -> Vec<Fragment> {
    BUILDERS.iter().filter_map(|build| build(ctx)).collect()
}

/// Active predicates as sea-query expressions, in WHERE order.
pub fn assemble(ctx: &PredicateContext<'_>) -> Vec<SimpleExpr> {
    fragments(ctx).into_iter().map(Fragment::into_expr).collect()
}

fn project(ctx: &PredicateContext<'_>) -> Option<Fragment> {
    ctx.spec.project.map(|id| Fragment::equals("a.project_id", id))
}

fn user(ctx: &PredicateContext<'_>) -> Option<Fragment> {
    ctx.spec.user.map(|id| Fragment::equals("a.user_id", id))
}

fn users(ctx: &PredicateContext<'_>) -> Option<Fragment> {
    ctx.spec
        .users
        .as_deref()
        .map(|ids| Fragment::in_list("a.user_id", ids))
}

fn image(ctx: &PredicateContext<'_>) -> Option<Fragment> {
    ctx.spec.image.map(|id| Fragment::equals("a.image_id", id))
}

fn images(ctx: &PredicateContext<'_>) -> Option<Fragment> {
    if ctx.resolved.images_cover_project {
        return None;
    }
    ctx.spec
        .images
        .as_deref()
        .map(|ids| Fragment::in_list("a.image_id", ids))
}

fn slice(ctx: &PredicateContext<'_>) -> Option<Fragment> {
    ctx.spec.slice.map(|id| Fragment::equals("a.slice_id", id))
}

fn slices(ctx: &PredicateContext<'_>) -> Option<Fragment> {
    ctx.spec
        .slices
        .as_deref()
        .map(|ids| Fragment::in_list("a.slice_id", ids))
}

fn tag(ctx: &PredicateContext<'_>) -> Option<Fragment> {
    let fragment = Fragment::equals("tda.tag_id", ctx.spec.tag?);
    Some(if ctx.spec.no_tag {
        fragment.or_null("tda.tag_id")
    } else {
        fragment
    })
}

fn tags(ctx: &PredicateContext<'_>) -> Option<Fragment> {
    let fragment = Fragment::in_list("tda.tag_id", ctx.spec.tags.as_deref()?);
    Some(if ctx.spec.no_tag {
        fragment.or_null("tda.tag_id")
    } else {
        fragment
    })
}

fn term(ctx: &PredicateContext<'_>) -> Option<Fragment> {
    let column = ctx.term_column()?;
    let fragment = Fragment::equals(&column, ctx.spec.term?);
    Some(if ctx.spec.no_term {
        fragment.or_null(&column)
    } else {
        fragment
    })
}

fn terms(ctx: &PredicateContext<'_>) -> Option<Fragment> {
    let column = ctx.term_column()?;
    let fragment = Fragment::in_list(&column, ctx.spec.terms.as_deref()?);
    Some(if ctx.spec.no_term {
        fragment.or_null(&column)
    } else {
        fragment
    })
}

fn track(ctx: &PredicateContext<'_>) -> Option<Fragment> {
    ctx.kind.track_alias()?;
    let fragment = Fragment::equals("atr.track_id", ctx.spec.track?);
    Some(if ctx.spec.no_track {
        fragment.or_null("atr.track_id")
    } else {
        fragment
    })
}

fn tracks(ctx: &PredicateContext<'_>) -> Option<Fragment> {
    ctx.kind.track_alias()?;
    let fragment = Fragment::in_list("atr.track_id", ctx.spec.tracks.as_deref()?);
    Some(if ctx.spec.no_track {
        fragment.or_null("atr.track_id")
    } else {
        fragment
    })
}

fn slice_bound(ctx: &PredicateContext<'_>) -> Option<Fragment> {
    let (_, before) = ctx.spec.slice_bound()?;
    let rank = ctx.resolved.reference_rank?;
    let sign = if before { "<" } else { ">" };
    Some(Fragment::new(
        format!("{SLICE_RANK} {sign} $1"),
        vec![rank.into()],
    ))
}

fn group(ctx: &PredicateContext<'_>) -> Option<Fragment> {
    ctx.spec
        .annotation_group
        .map(|id| Fragment::equals("al1.group_id", id))
}

fn groups(ctx: &PredicateContext<'_>) -> Option<Fragment> {
    ctx.spec
        .annotation_groups
        .as_deref()
        .map(|ids| Fragment::in_list("al1.group_id", ids))
}

fn users_for_term(ctx: &PredicateContext<'_>) -> Option<Fragment> {
    // Reviewed terms belong to the reviewer: nothing to filter.
    if ctx.kind != AnnotationKind::User {
        return None;
    }
    ctx.spec
        .users_for_term
        .as_deref()
        .map(|ids| Fragment::in_list("at.user_id", ids))
}

// The suggestion builders read `aat`: the algorithm-term join for user
// annotations, the term join itself for algorithm annotations.

fn user_for_term_algo(ctx: &PredicateContext<'_>) -> Option<Fragment> {
    ctx.spec
        .user_for_term_algo
        .map(|id| Fragment::equals("aat.user_job_id", id))
}

fn users_for_term_algo(ctx: &PredicateContext<'_>) -> Option<Fragment> {
    ctx.spec
        .users_for_term_algo
        .as_deref()
        .map(|ids| Fragment::in_list("aat.user_job_id", ids))
}

fn suggested_term(ctx: &PredicateContext<'_>) -> Option<Fragment> {
    ctx.spec
        .suggested_term
        .map(|id| Fragment::equals("aat.term_id", id))
}

fn suggested_terms(ctx: &PredicateContext<'_>) -> Option<Fragment> {
    ctx.spec
        .suggested_terms
        .as_deref()
        .map(|ids| Fragment::in_list("aat.term_id", ids))
}

fn not_reviewed_only(ctx: &PredicateContext<'_>) -> Option<Fragment> {
    let counted = matches!(ctx.kind, AnnotationKind::User | AnnotationKind::Algo);
    (counted && ctx.spec.not_reviewed_only).then(|| Fragment::raw("a.count_reviewed_annotations = 0"))
}

fn parents(ctx: &PredicateContext<'_>) -> Option<Fragment> {
    ctx.spec
        .parents
        .as_deref()
        .map(|ids| Fragment::in_list("a.parent_ident", ids))
}

fn avoid_empty_centroid(ctx: &PredicateContext<'_>) -> Option<Fragment> {
    ctx.spec
        .avoid_empty_centroid
        .then(|| Fragment::raw("ST_IsEmpty(ST_Centroid(a.location)) = false"))
}

fn review_users(ctx: &PredicateContext<'_>) -> Option<Fragment> {
    ctx.spec
        .review_users
        .as_deref()
        .map(|ids| Fragment::in_list("a.review_user_id", ids))
}

fn intersects(wkt: &str) -> Fragment {
    Fragment::new(
        "ST_Intersects(a.location, ST_GeometryFromText($1, 0))",
        vec![wkt.into()],
    )
}

fn bounding_box(ctx: &PredicateContext<'_>) -> Option<Fragment> {
    ctx.spec.bounding_box.as_deref().map(intersects)
}

fn bounding_box_annotation(ctx: &PredicateContext<'_>) -> Option<Fragment> {
    ctx.spec.bounding_box_annotation.as_deref().map(intersects)
}

fn max_distance(ctx: &PredicateContext<'_>) -> Option<Fragment> {
    let distance = ctx.spec.max_distance?;
    let base = ctx.resolved.base_geometry.as_deref()?;
    Some(Fragment::new(
        "ST_Distance(a.location, ST_GeometryFromText($1)) <= $2",
        vec![base.into(), distance.into()],
    ))
}

fn excluded_annotation(ctx: &PredicateContext<'_>) -> Option<Fragment> {
    ctx.spec
        .excluded_annotation
        .map(|id| Fragment::new("a.id <> $1", vec![id.into()]))
}

fn created_before(ctx: &PredicateContext<'_>) -> Option<Fragment> {
    ctx.spec
        .created_before
        .map(|at| Fragment::new("a.created < $1", vec![at.into()]))
}

fn created_after(ctx: &PredicateContext<'_>) -> Option<Fragment> {
    ctx.spec
        .created_after
        .map(|at| Fragment::new("a.created > $1", vec![at.into()]))
}

fn no_term(ctx: &PredicateContext<'_>) -> Option<Fragment> {
    let spec = ctx.spec;
    let wanted = match ctx.kind {
        AnnotationKind::Algo => spec.no_term || spec.no_algo_term,
        _ => spec.no_term,
    };
    if !wanted || spec.multiple_term || spec.has_term_filter() {
        return None;
    }
    ctx.term_column()
        .map(|column| Fragment::raw(format!("{column} IS NULL")))
}

fn multiple_term(ctx: &PredicateContext<'_>) -> Option<Fragment> {
    if !ctx.spec.multiple_term {
        return None;
    }
    let alias = ctx.kind.term_alias()?;
    Some(Fragment::raw(format!(
        "{alias}.term_id <> {alias}2.term_id"
    )))
}

fn no_algo_term(ctx: &PredicateContext<'_>) -> Option<Fragment> {
    (ctx.kind == AnnotationKind::User && ctx.spec.no_algo_term)
        .then(|| Fragment::raw("aat.id IS NULL"))
}

fn no_track(ctx: &PredicateContext<'_>) -> Option<Fragment> {
    ctx.kind.track_alias()?;
    let spec = ctx.spec;
    (spec.no_track && !spec.multiple_track && !spec.has_track_filter())
        .then(|| Fragment::raw("atr.id IS NULL"))
}

fn multiple_track(ctx: &PredicateContext<'_>) -> Option<Fragment> {
    ctx.kind.track_alias()?;
    ctx.spec
        .multiple_track
        .then(|| Fragment::raw("atr.id <> atr2.id AND atr.track_id <> atr2.track_id"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn sqls(kind: AnnotationKind, spec: &FilterSpec, resolved: &Resolved) -> Vec<String> {
        let ctx = PredicateContext {
            kind,
            spec,
            resolved,
        };
        fragments(&ctx).into_iter().map(|f| f.sql).collect()
    }

    #[test]
    fn empty_spec_has_no_predicates() {
        assert!(sqls(AnnotationKind::User, &FilterSpec::new(), &Resolved::default()).is_empty());
    }

    #[test]
    fn fixed_order_regardless_of_builder_order() {
        let spec = FilterSpec::new()
            .with_excluded_annotation(9)
            .with_terms(vec![1])
            .with_project(2)
            .with_users(vec![3]);
        assert_eq!(
            sqls(AnnotationKind::User, &spec, &Resolved::default()),
            vec![
                "a.project_id = $1",
                "a.user_id IN ($1)",
                "at.term_id IN ($1)",
                "a.id <> $1",
            ]
        );
    }

    #[test]
    fn no_term_with_terms_adds_null_disjunct() {
        let spec = FilterSpec::new().with_terms(vec![3, 4]).with_no_term(true);
        assert_eq!(
            sqls(AnnotationKind::User, &spec, &Resolved::default()),
            vec!["(at.term_id IN ($1, $2)) OR at.term_id IS NULL"]
        );
    }

    #[test]
    fn no_term_alone_checks_missing_association() {
        let spec = FilterSpec::new().with_no_term(true);
        assert_eq!(
            sqls(AnnotationKind::Algo, &spec, &Resolved::default()),
            vec!["aat.term_id IS NULL"]
        );
    }

    #[test]
    fn images_dropped_when_they_cover_the_project() {
        let spec = FilterSpec::new().with_images(vec![1, 2]);
        let resolved = Resolved {
            images_cover_project: true,
            ..Resolved::default()
        };
        assert!(sqls(AnnotationKind::User, &spec, &resolved).is_empty());
    }

    #[test]
    fn slice_bound_uses_reference_rank() {
        let spec = FilterSpec::new().with_track(1).with_after_slice(5);
        let resolved = Resolved {
            reference_rank: Some(12),
            ..Resolved::default()
        };
        let ctx = PredicateContext {
            kind: AnnotationKind::User,
            spec: &spec,
            resolved: &resolved,
        };
        let all = fragments(&ctx);
        assert_eq!(all[1].sql, format!("{SLICE_RANK} > $1"));
        assert_eq!(all[1].values, vec![Value::from(12i64)]);
    }

    #[test]
    fn proximity_binds_geometry_and_distance() {
        let spec = FilterSpec::new().with_max_distance(25.0);
        let resolved = Resolved {
            base_geometry: Some("POINT(1 1)".to_string()),
            ..Resolved::default()
        };
        let ctx = PredicateContext {
            kind: AnnotationKind::Roi,
            spec: &spec,
            resolved: &resolved,
        };
        let all = fragments(&ctx);
        assert_eq!(all.len(), 1);
        assert_eq!(
            all[0].values,
            vec![Value::from("POINT(1 1)"), Value::from(25.0f64)]
        );
    }

    #[test]
    fn dates_are_bound() {
        let at = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let spec = FilterSpec::new().with_created_after(at);
        let ctx = PredicateContext {
            kind: AnnotationKind::User,
            spec: &spec,
            resolved: &Resolved::default(),
        };
        let all = fragments(&ctx);
        assert_eq!(all[0].sql, "a.created > $1");
        assert_eq!(all[0].values, vec![Value::from(at)]);
    }

    #[test]
    fn not_reviewed_only_is_noop_for_reviewed() {
        let spec = FilterSpec::new().with_not_reviewed_only(true);
        assert!(sqls(AnnotationKind::Reviewed, &spec, &Resolved::default()).is_empty());
        assert_eq!(
            sqls(AnnotationKind::User, &spec, &Resolved::default()),
            vec!["a.count_reviewed_annotations = 0"]
        );
    }

    #[test]
    fn and_shifts_placeholders() {
        let joined = Fragment::equals("x", 1i64).and(Fragment::in_list("y", &[2, 3]));
        assert_eq!(joined.sql, "x = $1 AND y IN ($2, $3)");
        assert_eq!(joined.values.len(), 3);
    }

    #[test]
    fn empty_list_matches_nothing() {
        assert_eq!(Fragment::in_list("a.user_id", &[]).sql, "FALSE");
    }

    #[test]
    fn multiple_track_compares_second_alias() {
        let spec = FilterSpec::new().with_multiple_track(true).with_no_track(true);
        assert_eq!(
            sqls(AnnotationKind::User, &spec, &Resolved::default()),
            vec!["atr.id <> atr2.id AND atr.track_id <> atr2.track_id"]
        );
    }

    #[test]
    fn where_conditions_are_wrapped_once() {
        use sea_query::{Alias, PostgresQueryBuilder, Query};

        let (sql, values) = Query::select()
            .expr(Expr::cust("1"))
            .from(Alias::new("t"))
            .and_where(Fragment::equals("a.project_id", 10i64).into_expr())
            .and_where(
                Fragment::in_list("at.term_id", &[3, 4])
                    .or_null("at.term_id")
                    .into_expr(),
            )
            .build(PostgresQueryBuilder);
        assert!(
            sql.ends_with("WHERE (a.project_id = $1) AND ((at.term_id IN ($2, $3)) OR at.term_id IS NULL)"),
            "{sql}"
        );
        assert_eq!(values.0.len(), 3);
    }

    #[test]
    fn join_conditions_are_grouped() {
        let expr = Fragment::raw("at.deleted IS NULL").into_grouped_expr();
        assert_eq!(expr, Expr::cust("(at.deleted IS NULL)"));
    }
}
