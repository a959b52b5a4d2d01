// Project and caller identities shared by the cache, the executor and the CLI

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]{0,99}$").expect("static regex"));

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProjectRefError {
    #[error("invalid repository owner '{0}'")]
    InvalidOwner(String),
    #[error("invalid repository name '{0}'")]
    InvalidRepo(String),
    #[error("expected 'owner/repo', got '{0}'")]
    Malformed(String),
}

/// Remote repository a migration workflow belongs to.
///
/// All cached workflow state is partitioned by this pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProjectRef {
    owner: String,
    repo: String,
}

impl ProjectRef {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Result<Self, ProjectRefError> {
        let owner = owner.into();
        let repo = repo.into();
        if !IDENTIFIER.is_match(&owner) {
            return Err(ProjectRefError::InvalidOwner(owner));
        }
        if !IDENTIFIER.is_match(&repo) {
            return Err(ProjectRefError::InvalidRepo(repo));
        }
        Ok(Self { owner, repo })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }
}

impl std::str::FromStr for ProjectRef {
    type Err = ProjectRefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((owner, repo)) => Self::new(owner, repo),
            None => Err(ProjectRefError::Malformed(s.to_string())),
        }
    }
}

impl fmt::Display for ProjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// Stable caller identity supplied by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserIdentity(String);

impl UserIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
