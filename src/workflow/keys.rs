use crate::project::ProjectRef;

/// Pointer to the single active workflow. Deliberately not partitioned per
/// project.
pub const ACTIVE_PROJECT_KEY: &str = "migration:active-project";

/// Deterministic per-project cache keys
pub struct CacheKeys;

impl CacheKeys {
    fn prefix(project: &ProjectRef) -> String {
        format!("migration:{}/{}", project.owner(), project.repo())
    }

    pub fn analysis(project: &ProjectRef) -> String {
        format!("{}:analysis", Self::prefix(project))
    }

    pub fn phase_plan(project: &ProjectRef) -> String {
        format!("{}:phases", Self::prefix(project))
    }

    pub fn progress(project: &ProjectRef) -> String {
        format!("{}:progress", Self::prefix(project))
    }

    pub fn all(project: &ProjectRef) -> [String; 3] {
        [
            Self::analysis(project),
            Self::phase_plan(project),
            Self::progress(project),
        ]
    }
}
