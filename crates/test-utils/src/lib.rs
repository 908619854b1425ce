//! Annotation listing test utilities.
//!
//! An in-memory `EntityLookup`, an allow/deny authorizer, raw parameter and
//! row fixtures, and assertion helpers for compiled SQL.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use annotation_listing::lookup::{EntityLookup, ImageRef, SliceRef, UserRef};
use annotation_listing::{ContainerAuthorizer, ListingError, ListingResult, ProjectRef, RawParams};
use async_trait::async_trait;

/// In-memory entity store.
#[derive(Debug, Default)]
pub struct InMemoryLookup {
    projects: HashMap<i64, i64>,
    images: HashMap<i64, ImageRef>,
    slices: HashMap<i64, SliceRef>,
    users: HashMap<i64, UserRef>,
    jobs: HashMap<i64, i64>,
    terms: HashMap<i64, String>,
    tracks: HashSet<i64>,
    groups: HashSet<i64>,
    annotations: HashMap<i64, String>,
    annotation_count: i64,
}

impl InMemoryLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a project with `image_count` images.
    pub fn with_project(mut self, id: i64, image_count: i64) -> Self {
        self.projects.insert(id, image_count);
        self
    }

    pub fn with_image(mut self, id: i64, project: i64, width: Option<i64>) -> Self {
        self.images.insert(id, ImageRef { id, project, width });
        self
    }

    pub fn with_slice(mut self, id: i64, image: i64, project: i64, rank: i64) -> Self {
        self.slices.insert(
            id,
            SliceRef {
                id,
                image,
                project,
                rank,
            },
        );
        self
    }

    pub fn with_user(mut self, id: i64, username: &str) -> Self {
        self.users.insert(
            id,
            UserRef {
                id,
                username: username.to_string(),
                algo: false,
            },
        );
        self
    }

    /// Add the job user of algorithm job `job`.
    pub fn with_job_user(mut self, id: i64, job: i64, username: &str) -> Self {
        self.users.insert(
            id,
            UserRef {
                id,
                username: username.to_string(),
                algo: true,
            },
        );
        self.jobs.insert(job, id);
        self
    }

    pub fn with_term(mut self, id: i64, name: &str) -> Self {
        self.terms.insert(id, name.to_string());
        self
    }

    pub fn with_track(mut self, id: i64) -> Self {
        self.tracks.insert(id);
        self
    }

    pub fn with_annotation_group(mut self, id: i64) -> Self {
        self.groups.insert(id);
        self
    }

    pub fn with_annotation(mut self, id: i64, wkt: &str) -> Self {
        self.annotations.insert(id, wkt.to_string());
        self
    }

    /// Count returned for any slice set.
    pub fn with_annotation_count(mut self, count: i64) -> Self {
        self.annotation_count = count;
        self
    }
}

#[async_trait]
impl EntityLookup for InMemoryLookup {
    async fn project_image_count(&self, project: i64) -> ListingResult<Option<i64>> {
        Ok(self.projects.get(&project).copied())
    }

    async fn image(&self, id: i64) -> ListingResult<Option<ImageRef>> {
        Ok(self.images.get(&id).cloned())
    }

    async fn slice(&self, id: i64) -> ListingResult<Option<SliceRef>> {
        Ok(self.slices.get(&id).cloned())
    }

    async fn user(&self, id: i64) -> ListingResult<Option<UserRef>> {
        Ok(self.users.get(&id).cloned())
    }

    async fn user_by_job(&self, job: i64) -> ListingResult<Option<i64>> {
        Ok(self.jobs.get(&job).copied())
    }

    async fn term(&self, id: i64) -> ListingResult<Option<String>> {
        Ok(self.terms.get(&id).cloned())
    }

    async fn track_exists(&self, id: i64) -> ListingResult<bool> {
        Ok(self.tracks.contains(&id))
    }

    async fn annotation_group_exists(&self, id: i64) -> ListingResult<bool> {
        Ok(self.groups.contains(&id))
    }

    async fn annotation_wkt(&self, id: i64) -> ListingResult<Option<String>> {
        Ok(self.annotations.get(&id).cloned())
    }

    async fn annotation_count(&self, _slices: &[i64], _user: Option<i64>) -> ListingResult<i64> {
        Ok(self.annotation_count)
    }
}

/// A small project: project 10 with images 100 (width 1000) and 101,
/// slices 1000 and 1001 on image 100, human user 1, job user 2 (job 20),
/// terms 3 and 4, track 7, annotation group 8 and annotation 50.
pub fn sample_lookup() -> InMemoryLookup {
    InMemoryLookup::new()
        .with_project(10, 2)
        .with_project(11, 1)
        .with_image(100, 10, Some(1000))
        .with_image(101, 10, None)
        .with_image(200, 11, Some(500))
        .with_slice(1000, 100, 10, 0)
        .with_slice(1001, 100, 10, 1)
        .with_slice(2000, 200, 11, 0)
        .with_user(1, "alice")
        .with_job_user(2, 20, "job-20")
        .with_term(3, "tumor")
        .with_term(4, "stroma")
        .with_track(7)
        .with_annotation_group(8)
        .with_annotation(50, "POLYGON((0 0, 0 10, 10 10, 10 0, 0 0))")
}

/// Authorizer that allows a fixed set of projects and records every check.
#[derive(Debug, Default)]
pub struct RecordingAuthorizer {
    allowed: HashSet<i64>,
    checked: Mutex<Vec<i64>>,
}

impl RecordingAuthorizer {
    pub fn allowing(projects: &[i64]) -> Self {
        Self {
            allowed: projects.iter().copied().collect(),
            checked: Mutex::new(Vec::new()),
        }
    }

    /// Projects checked so far, in order.
    pub fn checked(&self) -> Vec<i64> {
        self.checked
            .lock()
            .map(|checked| checked.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ContainerAuthorizer for RecordingAuthorizer {
    async fn check_read(&self, project: ProjectRef) -> ListingResult<()> {
        if let Ok(mut checked) = self.checked.lock() {
            checked.push(project.id);
        }
        if self.allowed.contains(&project.id) {
            Ok(())
        } else {
            Err(ListingError::Forbidden(format!(
                "no read access to project {}",
                project.id
            )))
        }
    }
}

/// Build a raw parameter bag.
pub fn params(pairs: &[(&str, &str)]) -> RawParams {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect()
}

/// Assertion helpers for compiled SQL.
pub mod assert {
    /// Assert that a string contains a substring.
    pub fn contains(haystack: &str, needle: &str) {
        assert!(
            haystack.contains(needle),
            "Expected string to contain '{needle}'\nActual: {haystack}"
        );
    }

    /// Assert that a string does not contain a substring.
    pub fn not_contains(haystack: &str, needle: &str) {
        assert!(
            !haystack.contains(needle),
            "Expected string to NOT contain '{needle}'\nActual: {haystack}"
        );
    }

    /// Assert that `first` occurs before `second`.
    pub fn in_order(haystack: &str, first: &str, second: &str) {
        let a = haystack.find(first);
        let b = haystack.find(second);
        assert!(
            matches!((a, b), (Some(a), Some(b)) if a < b),
            "Expected '{first}' before '{second}'\nActual: {haystack}"
        );
    }
}
