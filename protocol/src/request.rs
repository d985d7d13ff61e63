use serde::{Deserialize, Serialize};

use crate::predicate::Predicate;

/// Selects the commits a backend walks: a single revision, or every ref
/// matching a glob minus those matching an exclude glob.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionSpecifier {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rev_spec: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_glob: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_ref_glob: Option<String>,
}

impl RevisionSpecifier {
    pub fn rev(spec: impl Into<String>) -> Self {
        Self {
            rev_spec: Some(spec.into()),
            ..Self::default()
        }
    }

    pub fn glob(glob: impl Into<String>) -> Self {
        Self {
            ref_glob: Some(glob.into()),
            ..Self::default()
        }
    }

    pub fn exclude_glob(glob: impl Into<String>) -> Self {
        Self {
            exclude_ref_glob: Some(glob.into()),
            ..Self::default()
        }
    }
}

/// One history search against one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub repo: String,
    pub revisions: Vec<RevisionSpecifier>,
    pub query: Predicate,
    pub include_diff: bool,
    pub limit: usize,
}
