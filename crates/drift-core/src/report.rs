//! Presentation helpers over aggregation results.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::aggregator::ComponentDiff;
use crate::config::DriftConfig;
use crate::environments::EnvironmentMatrix;

/// Coarse state of a component, as shown in listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentStatus {
    /// Resolution or diff failed.
    Unresolved,
    /// No diff was fetched: the refs are equal or one is unknown.
    Unchanged,
    UpToDate,
    Drifted,
}

impl ComponentStatus {
    pub fn of(component: &ComponentDiff) -> Self {
        if component.error.is_some() {
            ComponentStatus::Unresolved
        } else if !component.is_compared() {
            ComponentStatus::Unchanged
        } else if component.ahead() == 0 && component.behind() == 0 {
            ComponentStatus::UpToDate
        } else {
            ComponentStatus::Drifted
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentStatus::Unresolved => "unresolved",
            ComponentStatus::Unchanged => "unchanged",
            ComponentStatus::UpToDate => "up-to-date",
            ComponentStatus::Drifted => "drifted",
        }
    }
}

impl std::fmt::Display for ComponentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Components whose name contains `query`, ignoring case. An empty query keeps everything.
pub fn filter_by_name<'a>(components: &'a [ComponentDiff], query: &str) -> Vec<&'a ComponentDiff> {
    let needle = query.trim().to_lowercase();
    components
        .iter()
        .filter(|c| needle.is_empty() || c.name.to_lowercase().contains(&needle))
        .collect()
}

fn compare_url(config: &DriftConfig, repo: &str, from: &str, to: &str) -> String {
    format!("{}/{}/{repo}/compare/{from}...{to}", config.web_url, config.owner)
}

/// Web link listing the commits `to` has over `from`.
pub fn ahead_url(config: &DriftConfig, component: &ComponentDiff) -> Option<String> {
    match (&component.from, &component.to) {
        (Some(from), Some(to)) => Some(compare_url(config, &component.name, from, to)),
        _ => None,
    }
}

/// Web link listing the commits `from` has over `to`.
pub fn behind_url(config: &DriftConfig, component: &ComponentDiff) -> Option<String> {
    match (&component.from, &component.to) {
        (Some(from), Some(to)) => Some(compare_url(config, &component.name, to, from)),
        _ => None,
    }
}

pub fn commits_url(config: &DriftConfig, repo: &str, sha: &str) -> String {
    format!("{}/{}/{repo}/commits/{sha}", config.web_url, config.owner)
}

fn short(sha: &str) -> &str {
    sha.get(..7).unwrap_or(sha)
}

fn cell_text(component: &ComponentDiff) -> String {
    if let Some(error) = &component.error {
        return format!("! {error}");
    }
    match ComponentStatus::of(component) {
        ComponentStatus::Unchanged | ComponentStatus::UpToDate => "-".to_string(),
        _ => {
            let mut parts = Vec::new();
            if component.ahead() > 0 {
                parts.push(format!("{} ahead", component.ahead()));
            }
            if component.behind() > 0 {
                parts.push(format!("{} behind", component.behind()));
            }
            parts.join(", ")
        }
    }
}

/// One line per component: name, refs, drift.
pub fn render_components(components: &[&ComponentDiff]) -> String {
    let width = components.iter().map(|c| c.name.len()).max().unwrap_or(0);
    let mut out = String::new();
    for component in components {
        let from = component.from.as_deref().map(short).unwrap_or("?");
        let to = component.to.as_deref().map(short).unwrap_or("?");
        let _ = writeln!(
            out,
            "{:<width$}  {from}..{to}  {}",
            component.name,
            cell_text(component),
        );
    }
    out
}

/// Component rows by environment columns, tab separated.
pub fn render_matrix(matrix: &EnvironmentMatrix) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "component\t{}", matrix.environments.join("\t"));
    for row in &matrix.rows {
        let cells: Vec<String> = matrix
            .environments
            .iter()
            .map(|env| row.cell(env).map(cell_text).unwrap_or_default())
            .collect();
        let label = if matrix.rows_named(&row.name).count() > 1 {
            format!("{} ({})", row.name, row.key)
        } else {
            row.name.clone()
        };
        let _ = writeln!(out, "{label}\t{}", cells.join("\t"));
    }
    out
}
