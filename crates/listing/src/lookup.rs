//! Entity lookup.
//!
//! Read-only existence and metadata queries used while validating a filter
//! and resolving its security container. The compiler only sees the
//! `EntityLookup` trait; `PgEntityLookup` answers from PostgreSQL.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::error::ListingResult;
use crate::predicates::SLICE_RANK;

/// Image instance with its project and base image width.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ImageRef {
    pub id: i64,
    pub project: i64,
    pub width: Option<i64>,
}

/// Slice instance with its image, project and rank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SliceRef {
    pub id: i64,
    pub image: i64,
    pub project: i64,
    pub rank: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserRef {
    pub id: i64,
    pub username: String,
    /// Job user created for an algorithm run.
    pub algo: bool,
}

/// Lookups needed to validate and resolve a filter.
///
/// `Ok(None)` means the entity does not exist.
#[async_trait]
pub trait EntityLookup: Send + Sync {
    /// Number of images in the project.
    async fn project_image_count(&self, project: i64) -> ListingResult<Option<i64>>;

    async fn image(&self, id: i64) -> ListingResult<Option<ImageRef>>;

    async fn slice(&self, id: i64) -> ListingResult<Option<SliceRef>>;

    async fn user(&self, id: i64) -> ListingResult<Option<UserRef>>;

    /// Job user of an algorithm job.
    async fn user_by_job(&self, job: i64) -> ListingResult<Option<i64>>;

    /// Term name.
    async fn term(&self, id: i64) -> ListingResult<Option<String>>;

    async fn track_exists(&self, id: i64) -> ListingResult<bool>;

    async fn annotation_group_exists(&self, id: i64) -> ListingResult<bool>;

    /// WKT location of an annotation of any kind.
    async fn annotation_wkt(&self, id: i64) -> ListingResult<Option<String>>;

    /// Indexed annotation count over slices, optionally for one user.
    async fn annotation_count(&self, slices: &[i64], user: Option<i64>) -> ListingResult<i64>;
}

/// PostgreSQL-backed lookup.
#[derive(Clone)]
pub struct PgEntityLookup {
    pool: PgPool,
}

impl PgEntityLookup {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EntityLookup for PgEntityLookup {
    async fn project_image_count(&self, project: i64) -> ListingResult<Option<i64>> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT count_images::bigint FROM project WHERE id = $1 AND deleted IS NULL",
        )
        .bind(project)
        .fetch_optional(&self.pool)
        .await?;
        Ok(count)
    }

    async fn image(&self, id: i64) -> ListingResult<Option<ImageRef>> {
        let image = sqlx::query_as::<_, ImageRef>(
            r#"
            SELECT ii.id, ii.project_id AS project, ai.width::bigint AS width
            FROM image_instance ii
            INNER JOIN abstract_image ai ON ai.id = ii.base_image_id
            WHERE ii.id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(image)
    }

    async fn slice(&self, id: i64) -> ListingResult<Option<SliceRef>> {
        let sql = format!(
            r#"
            SELECT si.id, si.image_id AS image, ii.project_id AS project,
                   {SLICE_RANK}::bigint AS rank
            FROM slice_instance si
            INNER JOIN abstract_slice asl ON asl.id = si.base_slice_id
            INNER JOIN image_instance ii ON ii.id = si.image_id
            INNER JOIN abstract_image ai ON ai.id = ii.base_image_id
            WHERE si.id = $1
            "#
        );
        let slice = sqlx::query_as::<_, SliceRef>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(slice)
    }

    async fn user(&self, id: i64) -> ListingResult<Option<UserRef>> {
        let user = sqlx::query_as::<_, UserRef>(
            "SELECT id, username, (job_id IS NOT NULL) AS algo FROM sec_user WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn user_by_job(&self, job: i64) -> ListingResult<Option<i64>> {
        let user = sqlx::query_scalar::<_, i64>("SELECT id FROM sec_user WHERE job_id = $1")
            .bind(job)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn term(&self, id: i64) -> ListingResult<Option<String>> {
        let name = sqlx::query_scalar::<_, String>("SELECT name FROM term WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(name)
    }

    async fn track_exists(&self, id: i64) -> ListingResult<bool> {
        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM track WHERE id = $1)")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn annotation_group_exists(&self, id: i64) -> ListingResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM annotation_group WHERE id = $1)",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn annotation_wkt(&self, id: i64) -> ListingResult<Option<String>> {
        let wkt = sqlx::query_scalar::<_, String>(
            r#"
            SELECT wkt_location FROM user_annotation WHERE id = $1
            UNION ALL SELECT wkt_location FROM algo_annotation WHERE id = $1
            UNION ALL SELECT wkt_location FROM reviewed_annotation WHERE id = $1
            UNION ALL SELECT wkt_location FROM roi_annotation WHERE id = $1
            LIMIT 1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(wkt)
    }

    async fn annotation_count(&self, slices: &[i64], user: Option<i64>) -> ListingResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COALESCE(SUM(count_annotation), 0)::bigint
            FROM annotation_index
            WHERE slice_id = ANY($1) AND ($2::bigint IS NULL OR user_id = $2)
            "#,
        )
        .bind(slices.to_vec())
        .bind(user)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}
