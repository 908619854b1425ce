//! Clustering rules.
//!
//! At low zoom a listing returns spatial clusters instead of annotations.
//! The density level comes from how much of the image the viewport covers
//! and how many annotations the viewed slices hold.

use serde::{Deserialize, Serialize};

use crate::error::ListingResult;
use crate::geometry;

/// Clustering density level; values below 3 switch to cluster output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Density {
    ClusterSoft = 1,
    ClusterFull = 2,
    Full = 3,
}

impl Density {
    pub fn value(self) -> u8 {
        self as u8
    }

    pub fn from_value(value: u8) -> Self {
        match value {
            0 | 1 => Self::ClusterSoft,
            2 => Self::ClusterFull,
            _ => Self::Full,
        }
    }

    /// Cluster aggregate to use, or `None` for per-annotation output.
    pub fn cluster_mode(self) -> Option<ClusterMode> {
        match self {
            Self::ClusterSoft => Some(ClusterMode::Soft),
            Self::ClusterFull => Some(ClusterMode::Full),
            Self::Full => None,
        }
    }
}

/// How matched geometries of a cluster are aggregated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClusterMode {
    /// Convex hull of the cluster.
    Full,
    /// Centroid of the cluster.
    Soft,
}

impl ClusterMode {
    pub fn aggregate(self) -> &'static str {
        match self {
            Self::Full => "ST_ConvexHull(ST_Collect(location))",
            Self::Soft => "ST_Centroid(ST_Collect(location))",
        }
    }
}

/// Lower bounds of the annotation-count buckets.
const COUNT_BUCKETS: [i64; 5] = [0, 100, 2_000, 10_000, 100_000];

use Density::{ClusterFull as K, Full as F};

/// Rows: viewport covers 0, 25, 50, 75, 100 % of the image width.
/// Columns: `COUNT_BUCKETS`.
const RULES: [[Density; 5]; 5] = [
    [F, F, F, F, F],
    [F, F, F, F, F],
    [F, F, F, F, K],
    [F, F, F, K, K],
    [F, F, K, K, K],
];

fn zoom_row(ratio: f64) -> usize {
    // Truncation toward zero is the bucket boundary.
    let quarters = (ratio * 4.0).floor();
    if quarters.is_nan() || quarters < 0.0 {
        0
    } else {
        (quarters as usize).min(4)
    }
}

fn count_column(count: i64) -> usize {
    COUNT_BUCKETS
        .iter()
        .rposition(|&floor| count.max(0) >= floor)
        .unwrap_or(0)
}

/// Density for a viewport of width `viewport_width` over an image.
pub fn density_from_widths(image_width: Option<i64>, viewport_width: f64, count: i64) -> Density {
    match image_width {
        Some(width) if width > 0 => {
            RULES[zoom_row(viewport_width / width as f64)][count_column(count)]
        }
        _ => Density::Full,
    }
}

/// Density for the bounding box `bbox` (WKT) over an image.
pub fn density_for(image_width: Option<i64>, bbox: &str, count: i64) -> ListingResult<Density> {
    if image_width.is_none() {
        return Ok(Density::Full);
    }
    let viewport = geometry::bounding_width("boundingBox", bbox)?;
    Ok(density_from_widths(image_width, viewport, count))
}
