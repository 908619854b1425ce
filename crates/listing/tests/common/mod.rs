#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Shared helpers for listing integration tests.

#![allow(dead_code)]

use annotation_listing::{AnnotationKind, CompiledQuery, FilterSpec, ListingResult, QueryCompiler};
use annotation_listing_test_utils::{InMemoryLookup, sample_lookup};

/// Compile against the sample project.
pub async fn compile(kind: AnnotationKind, spec: &FilterSpec) -> ListingResult<CompiledQuery> {
    compile_with(&sample_lookup(), kind, spec).await
}

pub async fn compile_with(
    lookup: &InMemoryLookup,
    kind: AnnotationKind,
    spec: &FilterSpec,
) -> ListingResult<CompiledQuery> {
    QueryCompiler::compile(kind, spec, lookup).await
}

/// Compile and fail the test on error.
pub async fn compiled(kind: AnnotationKind, spec: &FilterSpec) -> CompiledQuery {
    compile(kind, spec).await.unwrap()
}

/// Output field names, in order.
pub fn fields(query: &CompiledQuery) -> Vec<&str> {
    query.fields.iter().map(|f| f.name.as_str()).collect()
}
