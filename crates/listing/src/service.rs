//! Listing service.
//!
//! Runs a listing end to end: scope and authorize, resolve the clustering
//! density, compile, execute on PostgreSQL and map the rows.

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use sea_query::{Value, Values};
use sqlx::postgres::PgArguments;
use sqlx::{Arguments, PgPool};
use tracing::{debug, info};

use crate::clustering;
use crate::compiler::{CompiledQuery, QueryCompiler};
use crate::config::ListingConfig;
use crate::db;
use crate::error::{ListingError, ListingResult};
use crate::facade::{ListingFacade, ProjectRef, ReportInput};
use crate::filter::FilterSpec;
use crate::kind::AnnotationKind;
use crate::lookup::{EntityLookup, PgEntityLookup};
use crate::rows;
use crate::telemetry;

/// Read access check against the project a listing is scoped to.
#[async_trait]
pub trait ContainerAuthorizer: Send + Sync {
    /// `Err(ListingError::Forbidden(..))` when access is refused.
    async fn check_read(&self, project: ProjectRef) -> ListingResult<()>;
}

#[derive(Clone)]
pub struct ListingService {
    pool: PgPool,
    config: ListingConfig,
    lookup: Arc<dyn EntityLookup>,
}

impl ListingService {
    pub fn new(pool: PgPool, config: ListingConfig) -> Self {
        let lookup = Arc::new(PgEntityLookup::new(pool.clone()));
        Self {
            pool,
            config,
            lookup,
        }
    }

    /// Install tracing, load the configuration from the environment and
    /// connect the pool.
    pub async fn connect() -> ListingResult<Self> {
        telemetry::init_tracing();
        let config = ListingConfig::from_env()?;
        let pool = db::create_pool(&config).await?;
        info!(
            max_connections = config.database_max_connections,
            "connected listing database"
        );
        Ok(Self::new(pool, config))
    }

    pub async fn health(&self) -> bool {
        db::check_health(&self.pool).await
    }

    /// Use another lookup than the PostgreSQL one.
    pub fn with_lookup(mut self, lookup: Arc<dyn EntityLookup>) -> Self {
        self.lookup = lookup;
        self
    }

    pub fn lookup(&self) -> &dyn EntityLookup {
        self.lookup.as_ref()
    }

    pub fn facade(&self) -> ListingFacade<'_> {
        ListingFacade::new(self.lookup.as_ref())
    }

    /// List annotations of `kind` matching the filter.
    pub async fn list(
        &self,
        kind: AnnotationKind,
        spec: FilterSpec,
        authorizer: &dyn ContainerAuthorizer,
    ) -> ListingResult<Vec<serde_json::Value>> {
        let project = self.facade().resolve_security_container(&spec).await?;
        authorizer.check_read(project).await?;

        let spec = resolve_density(self.lookup(), spec).await?;
        let compiled = QueryCompiler::compile(kind, &spec, self.lookup()).await?;
        let rows = self.execute(&compiled).await?;
        let results = rows::map_rows(&compiled, rows, &self.config.site_url);

        info!(
            kind = %kind,
            project = project.id,
            results = results.len(),
            "annotation listing"
        );
        Ok(results)
    }

    /// Rows of a report, restricted to the report's users.
    pub async fn report(
        &self,
        input: ReportInput,
        authorizer: &dyn ContainerAuthorizer,
    ) -> ListingResult<Vec<serde_json::Value>> {
        let mut results = self.list(input.kind, input.spec, authorizer).await?;
        rows::retain_users(&mut results, &input.users);
        Ok(results)
    }

    /// Execute a compiled query and return one JSON object per row.
    pub async fn execute(&self, query: &CompiledQuery) -> ListingResult<Vec<serde_json::Value>> {
        let arguments = bind_values(&query.values)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin transaction")?;

        let timeout = format!(
            "SET LOCAL statement_timeout = '{}s'",
            self.config.statement_timeout_secs
        );
        sqlx::query(&timeout)
            .execute(&mut *tx)
            .await
            .context("failed to set statement timeout")?;

        let sql = format!("SELECT row_to_json(t) FROM ({}) t", query.sql);
        let rows = sqlx::query_scalar_with::<_, serde_json::Value, _>(&sql, arguments)
            .fetch_all(&mut *tx)
            .await
            .context("failed to execute listing query")?;

        tx.commit()
            .await
            .context("failed to commit listing transaction")?;

        debug!(rows = rows.len(), shape = ?query.shape, "executed listing query");
        Ok(rows)
    }
}

/// Fill in the clustering density when clustering is on without one.
///
/// The density depends on the viewport (`bounding_box`) over the image of
/// the viewed slices and on how many annotations those slices hold.
pub async fn resolve_density(
    lookup: &dyn EntityLookup,
    spec: FilterSpec,
) -> ListingResult<FilterSpec> {
    if !spec.clustering || spec.clustering_density.is_some() {
        return Ok(spec);
    }

    let Some(bbox) = spec.bounding_box.as_deref() else {
        return Err(ListingError::invalid(
            "bbox",
            "a bounding box is required to cluster annotations",
        ));
    };
    let slices = match (&spec.slices, spec.slice) {
        (Some(slices), _) if !slices.is_empty() => slices.clone(),
        (_, Some(slice)) => vec![slice],
        _ => {
            return Err(ListingError::invalid(
                "slices",
                "a slice is required to cluster annotations",
            ));
        }
    };

    let mut images = BTreeSet::new();
    for &slice in &slices {
        let found = lookup
            .slice(slice)
            .await?
            .ok_or_else(|| ListingError::not_found("slices", format!("slice {slice} not found")))?;
        images.insert(found.image);
    }
    let mut images = images.into_iter();
    let (Some(image), None) = (images.next(), images.next()) else {
        return Err(ListingError::invalid(
            "slices",
            "all slices must belong to the same image",
        ));
    };

    let width = lookup.image(image).await?.and_then(|image| image.width);
    let count = lookup.annotation_count(&slices, spec.user).await?;
    let density = clustering::density_for(width, bbox, count)?;
    debug!(image, count, density = density.value(), "resolved clustering density");

    Ok(spec.with_clustering_density(density.value()))
}

/// Bind compiled parameter values in order.
pub fn bind_values(values: &Values) -> ListingResult<PgArguments> {
    let mut arguments = PgArguments::default();
    for value in &values.0 {
        let bound = match value {
            Value::Bool(v) => arguments.add(*v),
            Value::Int(v) => arguments.add(*v),
            Value::BigInt(v) => arguments.add(*v),
            Value::Double(v) => arguments.add(*v),
            Value::String(v) => arguments.add(v.as_deref().cloned()),
            Value::ChronoDateTimeUtc(v) => arguments.add(v.as_deref().copied()),
            other => {
                return Err(ListingError::Internal(anyhow::anyhow!(
                    "unsupported parameter value {other:?}"
                )));
            }
        };
        bound.map_err(|e| {
            ListingError::Internal(anyhow::anyhow!("failed to bind parameter: {e}"))
        })?;
    }
    Ok(arguments)
}
