//! Join planner.
//!
//! Decides which tables a listing must join, from the projected column
//! groups and from the filters that read columns outside the base table.
//! Filter escalation only adds joins: the escalated group's fields are not
//! projected. Joins are emitted in `JoinKey` order so identical inputs give
//! identical SQL.

use std::collections::BTreeSet;

use sea_query::{Alias, SelectStatement};

use crate::catalog::ColumnGroup;
use crate::filter::FilterSpec;
use crate::kind::AnnotationKind;
use crate::predicates::Fragment;

/// Join slots, in emission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum JoinKey {
    Tag,
    Term,
    TermSecond,
    Track,
    TrackSecond,
    ImageGroup,
    GroupMembership,
    GroupLinks,
    User,
    Image,
    AlgoTerm,
    Slice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

impl From<JoinKind> for sea_query::JoinType {
    fn from(kind: JoinKind) -> Self {
        match kind {
            JoinKind::Inner => sea_query::JoinType::InnerJoin,
            JoinKind::Left => sea_query::JoinType::LeftJoin,
        }
    }
}

/// One `JOIN table AS alias ON ...` clause.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    pub key: JoinKey,
    pub join_type: JoinKind,
    pub table: &'static str,
    pub alias: &'static str,
    pub on: Fragment,
}

impl JoinClause {
    fn new(
        key: JoinKey,
        join_type: JoinKind,
        table: &'static str,
        alias: &'static str,
        on: Fragment,
    ) -> Self {
        Self {
            key,
            join_type,
            table,
            alias,
            on,
        }
    }
}

/// Ordered joins of one query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JoinPlan {
    clauses: Vec<JoinClause>,
}

impl JoinPlan {
    pub fn clauses(&self) -> &[JoinClause] {
        &self.clauses
    }

    pub fn keys(&self) -> BTreeSet<JoinKey> {
        self.clauses.iter().map(|clause| clause.key).collect()
    }

    pub fn contains(&self, key: JoinKey) -> bool {
        self.clauses.iter().any(|clause| clause.key == key)
    }

    /// Add every clause to `query`, in order.
    pub fn apply(&self, query: &mut SelectStatement) {
        for clause in &self.clauses {
            query.join_as(
                clause.join_type.into(),
                Alias::new(clause.table),
                Alias::new(clause.alias),
                clause.on.clone().into_grouped_expr(),
            );
        }
    }
}

/// Join keys required by the projected groups and the active filters.
pub fn required_keys(
    kind: AnnotationKind,
    groups: &BTreeSet<ColumnGroup>,
    spec: &FilterSpec,
) -> BTreeSet<JoinKey> {
    let mut keys = BTreeSet::new();
    let has = |group: ColumnGroup| groups.contains(&group);

    if spec.has_tag_filter() {
        keys.insert(JoinKey::Tag);
    }

    if kind.term_alias().is_some() {
        let by_kind = match kind {
            AnnotationKind::User => spec.users_for_term.is_some(),
            AnnotationKind::Algo => spec.has_suggestion_filter() || spec.no_algo_term,
            AnnotationKind::Reviewed | AnnotationKind::Roi => false,
        };
        if has(ColumnGroup::Term)
            || spec.has_term_filter()
            || spec.no_term
            || spec.multiple_term
            || by_kind
        {
            keys.insert(JoinKey::Term);
        }
        if spec.multiple_term {
            keys.insert(JoinKey::TermSecond);
        }
    }

    if kind.track_alias().is_some() {
        if has(ColumnGroup::Track)
            || spec.has_track_filter()
            || spec.no_track
            || spec.multiple_track
        {
            keys.insert(JoinKey::Track);
        }
        if spec.multiple_track {
            keys.insert(JoinKey::TrackSecond);
        }
        // Slice rank needs the image depth and channel counts.
        if spec.has_track_filter() {
            keys.insert(JoinKey::Image);
            keys.insert(JoinKey::Slice);
        }
    }

    if has(ColumnGroup::ImageGroup) && kind != AnnotationKind::Roi {
        keys.insert(JoinKey::ImageGroup);
    }
    if kind != AnnotationKind::Roi && (has(ColumnGroup::Group) || spec.has_group_filter()) {
        keys.insert(JoinKey::GroupMembership);
    }
    if has(ColumnGroup::Group) && kind != AnnotationKind::Roi {
        keys.insert(JoinKey::GroupLinks);
    }
    if has(ColumnGroup::User) {
        keys.insert(JoinKey::User);
    }
    if has(ColumnGroup::Image) {
        keys.insert(JoinKey::Image);
    }
    if kind == AnnotationKind::User
        && (has(ColumnGroup::Algo) || spec.has_suggestion_filter() || spec.no_algo_term)
    {
        keys.insert(JoinKey::AlgoTerm);
    }
    if has(ColumnGroup::Slice) {
        keys.insert(JoinKey::Slice);
    }

    keys
}

/// Plan the joins of the row-level query.
pub fn plan(kind: AnnotationKind, groups: &BTreeSet<ColumnGroup>, spec: &FilterSpec) -> JoinPlan {
    let mut clauses = Vec::new();
    for key in required_keys(kind, groups, spec) {
        clauses.extend(clauses_for(kind, key, groups, spec));
    }
    JoinPlan { clauses }
}

/// Joins the association rewrite re-applies around the inner query.
///
/// The outer query sees the inner rows as `a`, so the same `ON` columns
/// apply, but no user restriction is carried over.
pub fn association_plan(kind: AnnotationKind, spec: &FilterSpec) -> JoinPlan {
    let mut clauses = Vec::new();
    if spec.has_term_filter()
        && let Some(clause) = term_clause(kind, JoinKey::Term, None)
    {
        clauses.push(clause);
    }
    if spec.has_track_filter() && kind.track_alias().is_some() {
        clauses.push(track_clause(JoinKey::Track, "atr"));
    }
    JoinPlan { clauses }
}

fn clauses_for(
    kind: AnnotationKind,
    key: JoinKey,
    groups: &BTreeSet<ColumnGroup>,
    spec: &FilterSpec,
) -> Vec<JoinClause> {
    match key {
        JoinKey::Tag => vec![JoinClause::new(
            key,
            JoinKind::Left,
            "tag_domain_association",
            "tda",
            Fragment::new(
                "tda.domain_ident = a.id AND tda.domain_class_name = $1",
                vec![kind.domain_class().into()],
            ),
        )],
        JoinKey::Term => term_clause(kind, key, no_term_users(kind, spec))
            .into_iter()
            .collect(),
        JoinKey::TermSecond => term_clause(kind, key, None).into_iter().collect(),
        JoinKey::Track => vec![track_clause(key, "atr")],
        JoinKey::TrackSecond => vec![track_clause(key, "atr2")],
        JoinKey::ImageGroup => vec![JoinClause::new(
            key,
            JoinKind::Left,
            "image_group_image_instance",
            "ig",
            Fragment::raw("ig.image_id = a.image_id AND ig.deleted IS NULL"),
        )],
        JoinKey::GroupMembership => vec![JoinClause::new(
            key,
            JoinKind::Left,
            "annotation_link",
            "al1",
            Fragment::raw("al1.annotation_ident = a.id AND al1.deleted IS NULL"),
        )],
        JoinKey::GroupLinks => vec![JoinClause::new(
            key,
            JoinKind::Left,
            "annotation_link",
            "al",
            Fragment::raw("al.group_id = al1.group_id AND al.deleted IS NULL"),
        )],
        JoinKey::User => {
            let mut clauses = vec![JoinClause::new(
                key,
                JoinKind::Inner,
                "sec_user",
                "u",
                Fragment::raw("u.id = a.user_id"),
            )];
            if kind == AnnotationKind::Algo {
                clauses.push(JoinClause::new(
                    key,
                    JoinKind::Inner,
                    "job",
                    "j",
                    Fragment::raw("j.id = u.job_id"),
                ));
                clauses.push(JoinClause::new(
                    key,
                    JoinKind::Inner,
                    "software",
                    "s",
                    Fragment::raw("s.id = j.software_id"),
                ));
            }
            clauses
        }
        JoinKey::Image => vec![
            JoinClause::new(
                key,
                JoinKind::Inner,
                "image_instance",
                "ii",
                Fragment::raw("ii.id = a.image_id"),
            ),
            JoinClause::new(
                key,
                JoinKind::Inner,
                "abstract_image",
                "ai",
                Fragment::raw("ai.id = ii.base_image_id"),
            ),
        ],
        JoinKey::AlgoTerm => {
            // Without the suggestion columns or filters, only annotations
            // lacking a suggestion are wanted.
            let needs_match = groups.contains(&ColumnGroup::Algo) || spec.has_suggestion_filter();
            let join_type = if spec.no_algo_term && !needs_match {
                JoinKind::Left
            } else {
                JoinKind::Inner
            };
            vec![JoinClause::new(
                key,
                join_type,
                "algo_annotation_term",
                "aat",
                Fragment::raw("aat.annotation_ident = a.id AND aat.deleted IS NULL"),
            )]
        }
        JoinKey::Slice => vec![
            JoinClause::new(
                key,
                JoinKind::Inner,
                "slice_instance",
                "si",
                Fragment::raw("si.id = a.slice_id"),
            ),
            JoinClause::new(
                key,
                JoinKind::Inner,
                "abstract_slice",
                "asl",
                Fragment::raw("asl.id = si.base_slice_id"),
            ),
        ],
    }
}

/// Users whose term associations count when listing unclassified annotations.
fn no_term_users(kind: AnnotationKind, spec: &FilterSpec) -> Option<&[i64]> {
    let wants_missing = match kind {
        AnnotationKind::Algo => spec.no_term || spec.no_algo_term,
        AnnotationKind::User => spec.no_term,
        AnnotationKind::Reviewed | AnnotationKind::Roi => false,
    };
    if wants_missing && !spec.multiple_term && !spec.has_term_filter() {
        spec.users.as_deref()
    } else {
        None
    }
}

fn term_clause(kind: AnnotationKind, key: JoinKey, users: Option<&[i64]>) -> Option<JoinClause> {
    let second = key == JoinKey::TermSecond;
    let (table, alias, on) = match kind {
        AnnotationKind::User => (
            "annotation_term",
            if second { "at2" } else { "at" },
            "{a}.user_annotation_id = a.id AND {a}.deleted IS NULL",
        ),
        AnnotationKind::Algo => (
            "algo_annotation_term",
            if second { "aat2" } else { "aat" },
            "{a}.annotation_ident = a.id AND {a}.deleted IS NULL",
        ),
        AnnotationKind::Reviewed => (
            "reviewed_annotation_term",
            if second { "at2" } else { "at" },
            "{a}.reviewed_annotation_terms_id = a.id",
        ),
        AnnotationKind::Roi => return None,
    };
    let mut on = Fragment::raw(on.replace("{a}", alias));
    if let Some(users) = users {
        let user_column = match kind {
            AnnotationKind::Algo => "user_job_id",
            _ => "user_id",
        };
        on = on.and(Fragment::in_list(&format!("{alias}.{user_column}"), users));
    }
    Some(JoinClause::new(key, JoinKind::Left, table, alias, on))
}

fn track_clause(key: JoinKey, alias: &'static str) -> JoinClause {
    JoinClause::new(
        key,
        JoinKind::Left,
        "annotation_track",
        alias,
        Fragment::raw(format!("{alias}.annotation_ident = a.id")),
    )
}
