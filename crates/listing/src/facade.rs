//! Listing facade.
//!
//! Converts the raw request parameter bag into an annotation kind and a
//! `FilterSpec`, resolves the project a listing is scoped to, and prepares
//! report inputs. Parameter names follow the public listing API.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::ColumnGroup;
use crate::error::{ListingError, ListingResult};
use crate::filter::{BaseAnnotation, FilterSpec};
use crate::geometry;
use crate::kind::AnnotationKind;
use crate::lookup::EntityLookup;

/// Raw request parameters, by name.
pub type RawParams = HashMap<String, String>;

/// The project a listing is authorized against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectRef {
    pub id: i64,
}

/// Filter and side tables for an annotation report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportInput {
    pub kind: AnnotationKind,
    pub spec: FilterSpec,
    /// Rows outside these users are dropped from the report.
    pub users: Vec<i64>,
    pub term_names: BTreeMap<i64, String>,
    pub user_names: BTreeMap<i64, String>,
}

/// `show*` switches, in catalog group order.
const SHOW_SWITCHES: [(&str, ColumnGroup); 12] = [
    ("showBasic", ColumnGroup::Basic),
    ("showMeta", ColumnGroup::Meta),
    ("showWKT", ColumnGroup::Wkt),
    ("showGIS", ColumnGroup::Gis),
    ("showTerm", ColumnGroup::Term),
    ("showTrack", ColumnGroup::Track),
    ("showImageGroup", ColumnGroup::ImageGroup),
    ("showLink", ColumnGroup::Group),
    ("showImage", ColumnGroup::Image),
    ("showSlice", ColumnGroup::Slice),
    ("showAlgo", ColumnGroup::Algo),
    ("showUser", ColumnGroup::User),
];

pub struct ListingFacade<'a> {
    lookup: &'a dyn EntityLookup,
}

impl<'a> ListingFacade<'a> {
    pub fn new(lookup: &'a dyn EntityLookup) -> Self {
        Self { lookup }
    }

    /// Build the kind and filter of a listing request.
    pub async fn build_specification(
        &self,
        params: &RawParams,
    ) -> ListingResult<(AnnotationKind, FilterSpec)> {
        let kind = self.select_kind(params).await?;
        let mut spec = FilterSpec::new();

        // Scope
        spec.project = id(params, "project")?;
        spec.image = id(params, "image")?;
        spec.images = ids(params, "images")?;
        spec.slice = id(params, "slice")?;
        spec.slices = ids(params, "slices")?;
        spec.track = id(params, "track")?;
        spec.tracks = ids(params, "tracks")?;
        spec.annotation_group = id(params, "annotationGroup")?;
        spec.annotation_groups = ids(params, "annotationGroups")?;
        spec.parents = ids(params, "parents")?;
        if spec.has_track_filter() {
            spec.before_slice = id(params, "beforeSlice")?;
            spec.after_slice = id(params, "afterSlice")?;
            spec.slice_dimension = id(params, "sliceDimension")?;
        }

        // Actors
        spec.user = match id(params, "user")? {
            Some(user) => Some(user),
            None => self.job_user(params, "job").await?,
        };
        spec.users = ids(params, "users")?;
        spec.users_for_term = ids(params, "usersForTerm")?;
        spec.user_for_term_algo = match id(params, "userForTermAlgo")? {
            Some(user) => Some(user),
            None => self.job_user(params, "jobForTermAlgo").await?,
        };
        spec.users_for_term_algo = ids(params, "usersForTermAlgo")?;
        spec.review_users = ids(params, "reviewUsers")?;

        // Classification
        spec.tag = id(params, "tag")?;
        spec.tags = ids(params, "tags")?;
        spec.no_tag = flag(params, "noTag");
        spec.term = id(params, "term")?;
        spec.terms = ids(params, "terms")?;
        spec.suggested_term = id(params, "suggestedTerm")?;
        spec.suggested_terms = ids(params, "suggestedTerms")?;
        spec.no_term = flag(params, "noTerm");
        spec.no_algo_term = flag(params, "noAlgoTerm");
        spec.multiple_term = flag(params, "multipleTerm");
        spec.no_track = flag(params, "noTrack");
        spec.multiple_track = flag(params, "multipleTrack");
        spec.not_reviewed_only = flag(params, "notReviewedOnly");

        // Spatial
        if let Some(bbox) = text(params, "bbox") {
            spec.bounding_box = Some(geometry::parse_bounding_box(bbox)?);
        }
        if let Some(annotation) = id(params, "bboxAnnotation")? {
            let wkt = self.lookup.annotation_wkt(annotation).await?.ok_or_else(|| {
                ListingError::not_found(
                    "bboxAnnotation",
                    format!("annotation {annotation} not found"),
                )
            })?;
            spec.bounding_box_annotation = Some(wkt);
        }
        spec.base_annotation = text(params, "baseAnnotation").map(|base| {
            base.parse::<i64>()
                .map(BaseAnnotation::Id)
                .unwrap_or_else(|_| BaseAnnotation::Wkt(base.to_string()))
        });
        spec.max_distance = number(params, "maxDistanceBaseAnnotation")?;

        // Temporal
        spec.created_after = millis(params, "afterThan")?;
        spec.created_before = millis(params, "beforeThan")?;

        // Output
        spec.column_groups = Some(column_groups(params)?);
        spec.excluded_annotation = id(params, "excludedAnnotation")?;

        // Clustering
        spec.clustering = flag(params, "kmeans");
        if spec.clustering
            && let Some(value) = text(params, "kmeansValue")
        {
            let density = value.parse::<u8>().map_err(|_| {
                ListingError::invalid("kmeansValue", format!("not a density: {value:?}"))
            })?;
            spec.clustering_density = Some(density);
        }

        debug!(kind = %kind, "built listing filter from request parameters");
        Ok((kind, spec))
    }

    /// Kind selected by the request flags and the listed users.
    async fn select_kind(&self, params: &RawParams) -> ListingResult<AnnotationKind> {
        if flag(params, "reviewed") {
            return Ok(AnnotationKind::Reviewed);
        }
        if flag(params, "roi") {
            return Ok(AnnotationKind::Roi);
        }
        if flag(params, "includeAlgo") {
            return Ok(AnnotationKind::Algo);
        }

        let user = match id(params, "user")? {
            Some(user) => Some(user),
            None => self.job_user(params, "job").await?,
        };
        if let Some(user) = user {
            let user = self
                .lookup
                .user(user)
                .await?
                .ok_or_else(|| ListingError::not_found("user", format!("user {user} not found")))?;
            return Ok(if user.algo {
                AnnotationKind::Algo
            } else {
                AnnotationKind::User
            });
        }

        for user in ids(params, "users")?.unwrap_or_default() {
            if let Some(user) = self.lookup.user(user).await?
                && user.algo
            {
                return Ok(AnnotationKind::Algo);
            }
        }
        Ok(AnnotationKind::User)
    }

    async fn job_user(&self, params: &RawParams, name: &'static str) -> ListingResult<Option<i64>> {
        let Some(job) = id(params, name)? else {
            return Ok(None);
        };
        let user = self
            .lookup
            .user_by_job(job)
            .await?
            .ok_or_else(|| ListingError::not_found(name, format!("no user for job {job}")))?;
        Ok(Some(user))
    }

    /// Project the listing is scoped to.
    ///
    /// The first scope present decides: project, image, images, slice,
    /// slices. A multi-project image or slice set is rejected.
    pub async fn resolve_security_container(&self, spec: &FilterSpec) -> ListingResult<ProjectRef> {
        if let Some(project) = spec.project {
            self.lookup
                .project_image_count(project)
                .await?
                .ok_or_else(|| {
                    ListingError::not_found("project", format!("project {project} not found"))
                })?;
            return Ok(ProjectRef { id: project });
        }

        if let Some(image) = spec.image {
            let image = self
                .lookup
                .image(image)
                .await?
                .ok_or_else(|| ListingError::not_found("image", format!("image {image} not found")))?;
            return Ok(ProjectRef { id: image.project });
        }

        if let Some(images) = &spec.images {
            let mut projects = BTreeSet::new();
            for &image in images {
                let image = self.lookup.image(image).await?.ok_or_else(|| {
                    ListingError::not_found("images", format!("image {image} not found"))
                })?;
                projects.insert(image.project);
            }
            return single_project("images", projects);
        }

        if let Some(slice) = spec.slice {
            let slice = self
                .lookup
                .slice(slice)
                .await?
                .ok_or_else(|| ListingError::not_found("slice", format!("slice {slice} not found")))?;
            return Ok(ProjectRef { id: slice.project });
        }

        if let Some(slices) = &spec.slices {
            let mut projects = BTreeSet::new();
            for &slice in slices {
                let slice = self.lookup.slice(slice).await?.ok_or_else(|| {
                    ListingError::not_found("slices", format!("slice {slice} not found"))
                })?;
                projects.insert(slice.project);
            }
            return single_project("slices", projects);
        }

        Err(ListingError::invalid(
            "project",
            "a project, image or slice scope is required",
        ))
    }

    /// Filter and side tables for a report over `users`.
    pub async fn build_report_input(
        &self,
        params: &RawParams,
        users: &[i64],
    ) -> ListingResult<ReportInput> {
        let (kind, spec) = self.build_specification(params).await?;
        let spec = spec
            .with_column_group(ColumnGroup::Gis)
            .with_column_group(ColumnGroup::Image)
            .with_column_group(ColumnGroup::User);

        let mut term_names = BTreeMap::new();
        for term in report_terms(params)? {
            if let Some(name) = self.lookup.term(term).await? {
                term_names.insert(term, name);
            }
        }

        let mut user_names = BTreeMap::new();
        for &user in users {
            if let Some(found) = self.lookup.user(user).await? {
                user_names.insert(user, found.username);
            }
        }

        Ok(ReportInput {
            kind,
            spec,
            users: users.to_vec(),
            term_names,
            user_names,
        })
    }
}

fn single_project(field: &'static str, projects: BTreeSet<i64>) -> ListingResult<ProjectRef> {
    let mut projects = projects.into_iter();
    match (projects.next(), projects.next()) {
        (Some(id), None) => Ok(ProjectRef { id }),
        (None, _) => Err(ListingError::not_found(field, "the list is empty")),
        (Some(_), Some(_)) => Err(ListingError::invalid(
            field,
            "all entries must belong to the same project",
        )),
    }
}

// ---------------------------------------------------------------------------
// Parameter parsing
// ---------------------------------------------------------------------------

/// Non-empty parameter text; the literal `null` counts as absent.
fn text<'p>(params: &'p RawParams, name: &str) -> Option<&'p str> {
    params
        .get(name)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty() && *value != "null")
}

fn flag(params: &RawParams, name: &str) -> bool {
    text(params, name).is_some_and(|value| value.eq_ignore_ascii_case("true"))
}

fn id(params: &RawParams, name: &'static str) -> ListingResult<Option<i64>> {
    text(params, name)
        .map(|value| {
            value
                .parse::<i64>()
                .map_err(|_| ListingError::invalid(name, format!("not an id: {value:?}")))
        })
        .transpose()
}

/// Comma or underscore separated ids.
fn ids(params: &RawParams, name: &'static str) -> ListingResult<Option<Vec<i64>>> {
    let Some(value) = text(params, name) else {
        return Ok(None);
    };
    value
        .split([',', '_'])
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(|token| {
            token
                .parse::<i64>()
                .map_err(|_| ListingError::invalid(name, format!("not an id: {token:?}")))
        })
        .collect::<ListingResult<Vec<_>>>()
        .map(Some)
}

fn number(params: &RawParams, name: &'static str) -> ListingResult<Option<f64>> {
    text(params, name)
        .map(|value| {
            value
                .parse::<f64>()
                .map_err(|_| ListingError::invalid(name, format!("not a number: {value:?}")))
        })
        .transpose()
}

/// Epoch milliseconds.
fn millis(params: &RawParams, name: &'static str) -> ListingResult<Option<DateTime<Utc>>> {
    let Some(value) = text(params, name) else {
        return Ok(None);
    };
    let millis = value
        .parse::<i64>()
        .map_err(|_| ListingError::invalid(name, format!("not a timestamp: {value:?}")))?;
    DateTime::from_timestamp_millis(millis)
        .map(Some)
        .ok_or_else(|| ListingError::invalid(name, format!("timestamp out of range: {millis}")))
}

/// Requested groups from the `show*` and `hide*` switches.
fn column_groups(params: &RawParams) -> ListingResult<BTreeSet<ColumnGroup>> {
    let mut groups: BTreeSet<ColumnGroup> = SHOW_SWITCHES
        .iter()
        .filter(|(name, _)| flag(params, name))
        .map(|&(_, group)| group)
        .collect();
    if groups.is_empty() || flag(params, "showDefault") {
        groups.extend(ColumnGroup::DEFAULTS);
    }
    for (show, group) in SHOW_SWITCHES {
        let hide = show.replacen("show", "hide", 1);
        if flag(params, &hide) {
            groups.remove(&group);
        }
    }
    if groups.is_empty() {
        return Err(ListingError::not_found(
            "columnGroups",
            "every column group is hidden",
        ));
    }
    Ok(groups)
}

/// Term ids of a report; `0`, `-1` and blanks are placeholders.
fn report_terms(params: &RawParams) -> ListingResult<Vec<i64>> {
    let Some(value) = text(params, "terms") else {
        return Ok(Vec::new());
    };
    value
        .split(',')
        .map(str::trim)
        .filter(|token| !matches!(*token, "" | "0" | "-1"))
        .map(|token| {
            token
                .parse::<i64>()
                .map_err(|_| ListingError::invalid("terms", format!("not an id: {token:?}")))
        })
        .collect()
}
