//! Annotation kinds and their storage layout.

use serde::{Deserialize, Serialize};

/// The four independently stored annotation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationKind {
    /// Drawn by a human user.
    User,
    /// Produced by an algorithm job.
    Algo,
    /// Validated copy created by a reviewer.
    Reviewed,
    /// Region of interest.
    Roi,
}

impl AnnotationKind {
    pub const ALL: [AnnotationKind; 4] = [Self::User, Self::Algo, Self::Reviewed, Self::Roi];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Algo => "algo",
            Self::Reviewed => "reviewed",
            Self::Roi => "roi",
        }
    }

    /// Table holding annotations of this kind; always aliased `a`.
    pub fn base_table(self) -> &'static str {
        match self {
            Self::User => "user_annotation",
            Self::Algo => "algo_annotation",
            Self::Reviewed => "reviewed_annotation",
            Self::Roi => "roi_annotation",
        }
    }

    /// Class name stored in `tag_domain_association.domain_class_name`.
    pub fn domain_class(self) -> &'static str {
        match self {
            Self::User => "be.cytomine.domain.ontology.UserAnnotation",
            Self::Algo => "be.cytomine.domain.ontology.AlgoAnnotation",
            Self::Reviewed => "be.cytomine.domain.ontology.ReviewedAnnotation",
            Self::Roi => "be.cytomine.domain.processing.RoiAnnotation",
        }
    }

    /// Alias of the per-kind term association table, if the kind has terms.
    pub fn term_alias(self) -> Option<&'static str> {
        match self {
            Self::User | Self::Reviewed => Some("at"),
            Self::Algo => Some("aat"),
            Self::Roi => None,
        }
    }

    /// Alias of the track association table, if the kind has tracks.
    pub fn track_alias(self) -> Option<&'static str> {
        match self {
            Self::User | Self::Algo => Some("atr"),
            Self::Reviewed | Self::Roi => None,
        }
    }

    /// Path segment used by the crop endpoints of the API.
    pub fn api_segment(self) -> &'static str {
        match self {
            Self::User => "userannotation",
            Self::Algo => "algoannotation",
            Self::Reviewed => "reviewedannotation",
            Self::Roi => "roiannotation",
        }
    }
}

impl std::fmt::Display for AnnotationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
