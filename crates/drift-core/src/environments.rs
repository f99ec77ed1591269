//! Drift across several environment manifests at once.
//!
//! Every environment has its own manifest (see
//! [`DriftConfig::environment_manifest`](crate::config::DriftConfig::environment_manifest)).
//! The matrix aggregates all of them concurrently through one gateway scope,
//! so tag lookups and compares shared between environments are sent once.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};

use crate::aggregator::{ComponentAggregator, ComponentDiff};
use crate::error::Result;

/// One component across environments.
///
/// A row is one manifest key: two keys pinning the same repository get a
/// row each.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixRow {
    pub name: String,
    pub key: String,
    /// Environment name to the component's drift there. Missing when the
    /// environment does not pin this component.
    pub cells: BTreeMap<String, ComponentDiff>,
}

impl MatrixRow {
    pub fn cell(&self, environment: &str) -> Option<&ComponentDiff> {
        self.cells.get(environment)
    }
}

/// Components by environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentMatrix {
    /// Environments in the order they were requested.
    pub environments: Vec<String>,
    pub base_ref: String,
    pub head_ref: Option<String>,
    /// Sorted by component name, then manifest key.
    pub rows: Vec<MatrixRow>,
    pub generated_at: DateTime<Utc>,
}

impl EnvironmentMatrix {
    /// Build from per-environment results given in `environments` order.
    pub fn from_results(
        environments: Vec<String>,
        base_ref: &str,
        head_ref: Option<&str>,
        results: Vec<Vec<ComponentDiff>>,
    ) -> Self {
        let mut rows: BTreeMap<(String, String), MatrixRow> = BTreeMap::new();
        for (environment, components) in environments.iter().zip(results) {
            for component in components {
                rows.entry((component.name.clone(), component.key.clone()))
                    .or_insert_with(|| MatrixRow {
                        name: component.name.clone(),
                        key: component.key.clone(),
                        cells: BTreeMap::new(),
                    })
                    .cells
                    .insert(environment.clone(), component);
            }
        }

        Self {
            environments,
            base_ref: base_ref.to_string(),
            head_ref: head_ref.map(str::to_string),
            rows: rows.into_values().collect(),
            generated_at: Utc::now(),
        }
    }

    /// First row of repository `name`.
    pub fn row(&self, name: &str) -> Option<&MatrixRow> {
        self.rows.iter().find(|r| r.name == name)
    }

    /// Every row of repository `name`, one per manifest key.
    pub fn rows_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a MatrixRow> + 'a {
        self.rows.iter().filter(move |r| r.name == name)
    }

    /// Number of cells carrying an error.
    pub fn error_count(&self) -> usize {
        self.rows
            .iter()
            .flat_map(|r| r.cells.values())
            .filter(|c| c.error.is_some())
            .count()
    }
}

impl ComponentAggregator {
    /// Aggregate the manifest of every environment in `environments`.
    ///
    /// Any environment whose manifest cannot be loaded fails the call.
    pub async fn aggregate_environments(
        &self,
        environments: &[String],
        base_ref: &str,
        head_ref: Option<&str>,
    ) -> Result<EnvironmentMatrix> {
        let scope = self.gateway().fresh_scope();
        let paths: Vec<String> = environments
            .iter()
            .map(|e| self.config().environment_manifest(e))
            .collect();

        let results = try_join_all(
            paths
                .iter()
                .map(|path| self.aggregate_in_scope(&scope, path, base_ref, head_ref)),
        )
        .await?;

        Ok(EnvironmentMatrix::from_results(
            environments.to_vec(),
            base_ref,
            head_ref,
            results,
        ))
    }
}
