//! Dependency validation and stable ordering of plan apps.
//!
//! The order is a pass-based scan: each pass walks the apps in their
//! original order and schedules every app whose dependencies are already
//! scheduled, including apps scheduled earlier in the same pass. A pass
//! that schedules nothing means a cycle. Independent apps keep their input
//! order; a dependent app listed before its dependency waits for the next
//! pass, so it can land after siblings listed later.

use std::collections::HashSet;

use thatdam_constants::plan::MAX_APPS_PER_PLAN;

use crate::error::PlanError;
use crate::model::AppSpec;

/// Validate `apps` and return them in dependency order.
///
/// # Errors
///
/// - [`PlanError::MissingName`] / [`PlanError::DuplicateApp`] for bad names
/// - [`PlanError::UnknownDependency`] when `after` names an app not in the plan
/// - [`PlanError::DependencyDeadlock`] when the graph has a cycle
/// - [`PlanError::TooManyApps`] past `MAX_APPS_PER_PLAN`
pub fn order_apps(apps: &[AppSpec]) -> Result<Vec<&AppSpec>, PlanError> {
    if apps.len() > MAX_APPS_PER_PLAN {
        return Err(PlanError::TooManyApps {
            count: apps.len(),
            max: MAX_APPS_PER_PLAN,
        });
    }

    let mut names: HashSet<&str> = HashSet::with_capacity(apps.len());
    for (index, app) in apps.iter().enumerate() {
        if app.name.is_empty() {
            return Err(PlanError::MissingName { index });
        }
        if !names.insert(app.name.as_str()) {
            return Err(PlanError::DuplicateApp { name: app.name.clone() });
        }
    }
    for app in apps {
        if let Some(dep) = app.after.iter().find(|d| !names.contains(d.as_str())) {
            return Err(PlanError::UnknownDependency {
                app: app.name.clone(),
                dependency: dep.clone(),
            });
        }
    }

    let mut done: HashSet<&str> = HashSet::with_capacity(apps.len());
    let mut ordered: Vec<&AppSpec> = Vec::with_capacity(apps.len());
    while ordered.len() < apps.len() {
        let before = ordered.len();
        for app in apps {
            if done.contains(app.name.as_str()) {
                continue;
            }
            if app.after.iter().all(|d| done.contains(d.as_str())) {
                done.insert(app.name.as_str());
                ordered.push(app);
            }
        }
        if ordered.len() == before {
            let stalled = apps
                .iter()
                .filter(|a| !done.contains(a.name.as_str()))
                .map(|a| a.name.clone())
                .collect();
            return Err(PlanError::DependencyDeadlock { stalled });
        }
    }
    Ok(ordered)
}
