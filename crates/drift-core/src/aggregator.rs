//! Component drift aggregation across a whole manifest.
//!
//! [`ComponentAggregator`] loads a manifest (and optionally a second one at a
//! head reference), resolves every tracked component to a commit and
//! compares it against its reference. Failures of single components are
//! recorded on that component; only manifest failures fail the call.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::Instrument;

use crate::config::{DriftConfig, MergeCommitPolicy};
use crate::diff::{only_merge_commits, CommitRecord, DiffFetcher};
use crate::error::{ComponentError, ComponentErrorKind, DriftError, Result};
use crate::gateway::RequestGateway;
use crate::manifest::{ManifestLoader, VersionManifest};
use crate::names::NameTable;
use crate::obs;
use crate::version::VersionResolver;

/// A manifest entry whose key mapped to a repository, with its resolved commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedComponent {
    pub key: String,
    pub name: String,
    pub raw_version: String,
    pub commit_id: Option<String>,
    pub error: Option<ComponentError>,
}

/// Drift of one component between two references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentDiff {
    /// Repository name.
    pub name: String,
    /// Manifest key the component was found under.
    pub key: String,
    pub from: Option<String>,
    pub to: Option<String>,
    /// Unset when no diff was fetched.
    pub ahead_by: Option<u64>,
    pub behind_by: Option<u64>,
    /// Compare status reported by the API (`ahead`, `behind`, `diverged`, `identical`).
    pub status: Option<String>,
    pub commits: Vec<CommitRecord>,
    pub error: Option<ComponentError>,
}

impl ComponentDiff {
    fn new(name: &str, key: &str) -> Self {
        Self {
            name: name.to_string(),
            key: key.to_string(),
            from: None,
            to: None,
            ahead_by: None,
            behind_by: None,
            status: None,
            commits: Vec::new(),
            error: None,
        }
    }

    /// `true` when a diff was fetched for this component.
    pub fn is_compared(&self) -> bool {
        self.ahead_by.is_some() || self.behind_by.is_some()
    }

    /// `true` when from and to are known and differ.
    pub fn needs_diff(&self) -> bool {
        matches!((&self.from, &self.to), (Some(from), Some(to)) if from != to)
    }

    pub fn ahead(&self) -> u64 {
        self.ahead_by.unwrap_or(0)
    }

    pub fn behind(&self) -> u64 {
        self.behind_by.unwrap_or(0)
    }
}

/// Resolves and compares every component of a manifest.
#[derive(Clone)]
pub struct ComponentAggregator {
    gateway: RequestGateway,
    names: Arc<NameTable>,
    config: Arc<DriftConfig>,
}

impl ComponentAggregator {
    pub fn new(gateway: RequestGateway, names: NameTable, config: DriftConfig) -> Self {
        Self {
            gateway,
            names: Arc::new(names),
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &DriftConfig {
        &self.config
    }

    pub fn names(&self) -> &NameTable {
        &self.names
    }

    pub fn gateway(&self) -> &RequestGateway {
        &self.gateway
    }

    /// Load the default manifest at `reference` (default branch when `None`).
    pub async fn resolve_manifest(&self, reference: Option<&str>) -> Result<VersionManifest> {
        ManifestLoader::new(self.gateway.fresh_scope(), &self.config)
            .load(reference)
            .await
    }

    /// Compare every component of the default manifest at `base_ref`.
    ///
    /// With `head_ref`, each component is compared against its version in the
    /// manifest at `head_ref`; otherwise, and for components missing from the
    /// head manifest, against the default branch. Results are sorted by name.
    pub async fn aggregate(&self, base_ref: &str, head_ref: Option<&str>) -> Result<Vec<ComponentDiff>> {
        let path = self.config.manifest_path.clone();
        self.aggregate_manifest(&path, base_ref, head_ref).await
    }

    /// [`aggregate`](Self::aggregate) for the manifest stored at `manifest_path`.
    pub async fn aggregate_manifest(
        &self,
        manifest_path: &str,
        base_ref: &str,
        head_ref: Option<&str>,
    ) -> Result<Vec<ComponentDiff>> {
        let scope = self.gateway.fresh_scope();
        self.aggregate_in_scope(&scope, manifest_path, base_ref, head_ref)
            .await
    }

    /// Aggregate using the caller's gateway scope, sharing its request cache.
    pub(crate) async fn aggregate_in_scope(
        &self,
        gateway: &RequestGateway,
        manifest_path: &str,
        base_ref: &str,
        head_ref: Option<&str>,
    ) -> Result<Vec<ComponentDiff>> {
        let span = obs::aggregation_span(manifest_path, base_ref, head_ref);
        async {
            let started = Instant::now();
            obs::emit_aggregation_started(manifest_path, base_ref, head_ref);

            let loader = ManifestLoader::new(gateway.clone(), &self.config);
            let (base, head) = tokio::try_join!(
                loader.load_path(manifest_path, Some(base_ref)),
                async {
                    match head_ref {
                        Some(head_ref) => loader.load_path(manifest_path, Some(head_ref)).await.map(Some),
                        None => Ok(None),
                    }
                },
            )?;

            let resolver = VersionResolver::new(gateway.clone(), &self.config);
            let mut components = self.resolve_pairs(&resolver, &base, head.as_ref()).await;

            let fetcher = DiffFetcher::new(gateway.clone(), &self.config);
            self.fetch_diffs(&fetcher, &mut components).await;

            components.sort_by(|a, b| a.name.cmp(&b.name));

            let errors = components.iter().filter(|c| c.error.is_some()).count();
            obs::emit_aggregation_finished(components.len(), errors, gateway.stats(), started.elapsed());
            Ok::<_, DriftError>(components)
        }
        .instrument(span)
        .await
    }

    /// Resolve every mapped entry of `manifest` to a commit, concurrently.
    pub async fn resolve_components(
        &self,
        resolver: &VersionResolver,
        manifest: &VersionManifest,
    ) -> Vec<ResolvedComponent> {
        let mut join_set = JoinSet::new();
        let mut slots: Vec<Option<ResolvedComponent>> = Vec::new();
        let mut pending = Vec::new();

        for entry in &manifest.entries {
            let Some(name) = self.names.resolve_name(&entry.key) else {
                obs::emit_component_unmapped(&entry.key);
                continue;
            };
            let idx = slots.len();
            slots.push(None);
            let ids = (entry.key.clone(), name.to_string(), entry.raw_version.clone());
            pending.push(ids.clone());

            let resolver = resolver.clone();
            let (key, name, raw_version) = ids;
            join_set.spawn(async move {
                let resolved = match resolver.resolve(&name, &raw_version).await {
                    Ok(sha) => ResolvedComponent {
                        key,
                        name,
                        raw_version,
                        commit_id: Some(sha),
                        error: None,
                    },
                    Err(e) => {
                        obs::emit_component_resolve_failed(&name, &raw_version, &e);
                        ResolvedComponent {
                            key,
                            name,
                            raw_version,
                            commit_id: None,
                            error: Some(ComponentError::from(e)),
                        }
                    }
                };
                (idx, resolved)
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((idx, resolved)) => slots[idx] = Some(resolved),
                Err(e) => tracing::error!(error = %e, "version resolution task failed"),
            }
        }

        slots
            .into_iter()
            .zip(pending)
            .map(|(slot, (key, name, raw_version))| {
                slot.unwrap_or_else(|| ResolvedComponent {
                    key,
                    name,
                    raw_version,
                    commit_id: None,
                    error: Some(task_failure("version resolution did not complete")),
                })
            })
            .collect()
    }

    /// Resolve base and head versions and pick `(from, to)` per component.
    async fn resolve_pairs(
        &self,
        resolver: &VersionResolver,
        base: &VersionManifest,
        head: Option<&VersionManifest>,
    ) -> Vec<ComponentDiff> {
        let head_entries = head.map(|head| {
            let tracked: Vec<_> = head
                .entries
                .iter()
                .filter(|e| base.get(&e.key).is_some() && self.names.resolve_name(&e.key).is_some())
                .cloned()
                .collect();
            VersionManifest { entries: tracked }
        });

        let (base_resolved, head_resolved) = tokio::join!(
            self.resolve_components(resolver, base),
            async {
                match &head_entries {
                    Some(entries) => self.resolve_components(resolver, entries).await,
                    None => Vec::new(),
                }
            },
        );

        base_resolved
            .into_iter()
            .map(|resolved| {
                let mut component = ComponentDiff::new(&resolved.name, &resolved.key);
                component.from = resolved.commit_id;
                component.error = resolved.error;

                match head_resolved.iter().find(|h| h.key == resolved.key) {
                    Some(head) => {
                        component.to = head.commit_id.clone();
                        if component.error.is_none() {
                            component.error = head.error.clone();
                        }
                    }
                    // Untracked in head (or no head requested): compare to mainline.
                    None => component.to = Some(self.config.default_branch.clone()),
                }
                component
            })
            .collect()
    }

    /// Fetch diffs for every component that needs one, concurrently.
    async fn fetch_diffs(&self, fetcher: &DiffFetcher, components: &mut [ComponentDiff]) {
        let mut join_set = JoinSet::new();
        let mut requested = Vec::new();

        for (idx, component) in components.iter().enumerate() {
            if component.error.is_some() || !component.needs_diff() {
                continue;
            }
            let (Some(from), Some(to)) = (component.from.clone(), component.to.clone()) else {
                continue;
            };
            requested.push(idx);
            let fetcher = fetcher.clone();
            let name = component.name.clone();
            join_set.spawn(async move {
                let result = fetcher.diff(&name, &from, &to).await;
                if let Err(e) = &result {
                    obs::emit_component_diff_failed(&name, &from, &to, e);
                }
                (idx, result)
            });
        }

        let mut completed = vec![false; components.len()];
        while let Some(joined) = join_set.join_next().await {
            let (idx, result) = match joined {
                Ok(done) => done,
                Err(e) => {
                    tracing::error!(error = %e, "diff task failed");
                    continue;
                }
            };
            completed[idx] = true;
            let component = &mut components[idx];
            match result {
                Ok(mut compare) => {
                    if self.config.merge_commits == MergeCommitPolicy::IgnoreMergeOnly
                        && only_merge_commits(&compare.commits)
                    {
                        compare.ahead_by = 0;
                    }
                    component.ahead_by = Some(compare.ahead_by);
                    component.behind_by = Some(compare.behind_by);
                    component.status = Some(compare.status);
                    component.commits = compare.commits;
                }
                Err(e) => component.error = Some(ComponentError::from(e)),
            }
        }

        for idx in requested {
            if !completed[idx] {
                components[idx].error = Some(task_failure("diff fetch did not complete"));
            }
        }
    }
}

fn task_failure(message: &str) -> ComponentError {
    ComponentError {
        kind: ComponentErrorKind::Other,
        status: None,
        message: message.to_string(),
    }
}
