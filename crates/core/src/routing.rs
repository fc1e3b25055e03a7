//! Initial department and assignee selection for new complaints.

use serde::{Deserialize, Serialize};

use crate::domain::directory::{Department, DepartmentId, UserId};
use crate::errors::WorkflowError;
use crate::store::{DirectoryStore, RoutingStats};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingStrategy {
    #[default]
    Default,
    RoundRobin,
    LeastLoaded,
}

/// The `system` settings record's auto-routing section.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoRoutingConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub departments: Vec<DepartmentId>,
    #[serde(default)]
    pub default_department: Option<DepartmentId>,
    #[serde(default)]
    pub strategy: RoutingStrategy,
}

/// Picks a department among the configured candidates.
pub trait DepartmentSelector: Send + Sync {
    fn select(&self, config: &AutoRoutingConfig, stats: &RoutingStats) -> Option<DepartmentId>;
}

pub struct DefaultDepartmentSelector;

impl DepartmentSelector for DefaultDepartmentSelector {
    fn select(&self, config: &AutoRoutingConfig, _stats: &RoutingStats) -> Option<DepartmentId> {
        config.default_department.clone().or_else(|| config.departments.first().cloned())
    }
}

/// Rotates through `departments`. The cursor is the number of persisted complaints that
/// were themselves auto-routed, so client-picked departments do not shift the rotation.
pub struct RoundRobinSelector;

impl DepartmentSelector for RoundRobinSelector {
    fn select(&self, config: &AutoRoutingConfig, stats: &RoutingStats) -> Option<DepartmentId> {
        if config.departments.is_empty() {
            return config.default_department.clone();
        }
        let len = config.departments.len() as u64;
        let index = usize::try_from(stats.auto_routed_complaints % len).unwrap_or(0);
        config.departments.get(index).cloned()
    }
}

/// Fewest open complaints wins; ties go to the earlier entry in `departments`.
pub struct LeastLoadedSelector;

impl DepartmentSelector for LeastLoadedSelector {
    fn select(&self, config: &AutoRoutingConfig, stats: &RoutingStats) -> Option<DepartmentId> {
        config
            .departments
            .iter()
            .enumerate()
            .min_by_key(|(index, department)| {
                (stats.open_by_department.get(*department).copied().unwrap_or(0), *index)
            })
            .map(|(_, department)| department.clone())
            .or_else(|| config.default_department.clone())
    }
}

pub fn selector_for(strategy: RoutingStrategy) -> Box<dyn DepartmentSelector> {
    match strategy {
        RoutingStrategy::Default => Box::new(DefaultDepartmentSelector),
        RoutingStrategy::RoundRobin => Box::new(RoundRobinSelector),
        RoutingStrategy::LeastLoaded => Box::new(LeastLoadedSelector),
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoutingDecision {
    pub department: Department,
    pub assignee_id: UserId,
    pub auto_routed: bool,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct RoutingResolver;

impl RoutingResolver {
    /// A department the client picked always wins; auto-routing only fills the gap.
    pub async fn resolve(
        &self,
        requested: Option<&DepartmentId>,
        config: &AutoRoutingConfig,
        stats: &RoutingStats,
        directory: &dyn DirectoryStore,
    ) -> Result<RoutingDecision, WorkflowError> {
        let (department_id, auto_routed) = match requested {
            Some(id) => (id.clone(), false),
            None if config.enabled => {
                let selected = selector_for(config.strategy).select(config, stats).ok_or_else(|| {
                    WorkflowError::Configuration(
                        "auto-routing is enabled but no department is configured".to_owned(),
                    )
                })?;
                (selected, true)
            }
            None => return Err(WorkflowError::validation("department_id is required")),
        };

        let department = directory.find_department(&department_id).await?;
        let department = match department {
            Some(department) if department.is_active => department,
            _ if auto_routed => {
                return Err(WorkflowError::Configuration(format!(
                    "auto-routed department `{department_id}` does not exist or is inactive"
                )))
            }
            _ => {
                return Err(WorkflowError::validation(format!(
                    "department `{department_id}` does not exist or is inactive"
                )))
            }
        };

        let assignee_id = department.default_assignee_id.clone().ok_or_else(|| {
            WorkflowError::Configuration(format!(
                "department `{department_id}` has no default assignee"
            ))
        })?;
        let assignee = directory.find_user(&assignee_id).await?;
        if !assignee.is_some_and(|user| user.is_active && user.role.is_staff()) {
            return Err(WorkflowError::Configuration(format!(
                "default assignee `{assignee_id}` of department `{department_id}` is missing or inactive"
            )));
        }

        Ok(RoutingDecision { department, assignee_id, auto_routed })
    }
}
