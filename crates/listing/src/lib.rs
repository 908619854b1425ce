//! Annotation listing engine.
//!
//! Composes one parameterized PostgreSQL/PostGIS query from a multi-dimensional
//! annotation filter, for each of the four annotation kinds, and runs it.
//!
//! The pipeline: [`facade::ListingFacade`] turns request parameters into a
//! [`filter::FilterSpec`]; [`compiler::QueryCompiler`] validates it through an
//! [`lookup::EntityLookup`] and renders SQL using the column catalog, the join
//! planner and the predicate assembler; [`service::ListingService`] executes
//! the statement and [`rows::map_rows`] shapes the results.

pub mod catalog;
pub mod clustering;
pub mod compiler;
pub mod config;
pub mod db;
pub mod error;
pub mod facade;
pub mod filter;
pub mod geometry;
pub mod joins;
pub mod kind;
pub mod lookup;
pub mod predicates;
pub mod rows;
pub mod service;
pub mod telemetry;

pub use catalog::ColumnGroup;
pub use compiler::{CompiledQuery, OutputField, QueryCompiler, QueryShape, Resolved};
pub use error::{ListingError, ListingResult};
pub use facade::{ListingFacade, ProjectRef, RawParams, ReportInput};
pub use filter::{BaseAnnotation, FilterSpec, SortDirection};
pub use kind::AnnotationKind;
pub use lookup::{EntityLookup, PgEntityLookup};
pub use service::{ContainerAuthorizer, ListingService};
