//! Component Drift CLI
//!
//! The `drift` command reports how far the components pinned in a version
//! manifest have drifted from their mainline.
//!
//! ## Commands
//!
//! - `manifest`: Print the entries of a manifest
//! - `components`: Compare every component of one manifest
//! - `matrix`: Compare components across all environments
//! - `pr`: Show the drift a pull request introduces
//! - `search`: Find pull requests of the manifest repository
//! - `shortlog`: Summarize the pending commits of one component
//! - `check-token`: Verify the access token

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn, Level};

use drift_core::report::{render_components, render_matrix};
use drift_core::{
    filter_by_name, shortlog, ComponentAggregator, Credential, DriftConfig, NameTable,
    PullRequestReport, RequestGateway, ReqwestTransport,
};

#[derive(Parser)]
#[command(name = "drift")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Component version drift across manifests", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Report format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,

    /// Base URL of the repository-hosting API
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Account owning the manifest and component repositories
    #[arg(long, global = true)]
    owner: Option<String>,

    /// Repository holding the version manifests
    #[arg(long, global = true)]
    manifest_repo: Option<String>,

    /// Path of the default manifest in the manifest repository
    #[arg(long, global = true)]
    manifest_path: Option<String>,

    /// Mainline branch components are compared against
    #[arg(long, global = true)]
    default_branch: Option<String>,

    /// JSON file mapping manifest component names to repository names
    #[arg(long, global = true, env = "DRIFT_NAMES")]
    names: Option<PathBuf>,

    /// Access token for the API
    #[arg(long, global = true, env = "GITHUB_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// File containing the access token (takes precedence over --token)
    #[arg(long, global = true)]
    token_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the entries of a manifest
    Manifest {
        /// Reference to read the manifest at (default: default branch)
        #[arg(long = "ref")]
        reference: Option<String>,

        /// Read this environment's manifest instead of the default one
        #[arg(short, long)]
        environment: Option<String>,
    },

    /// Compare every component of a manifest
    Components {
        /// Reference of the base manifest (default: default branch)
        #[arg(long)]
        base: Option<String>,

        /// Reference of a head manifest to compare against
        #[arg(long)]
        head: Option<String>,

        /// Use this environment's manifest instead of the default one
        #[arg(short, long)]
        environment: Option<String>,

        /// Only show components whose name contains this text
        #[arg(short, long)]
        filter: Option<String>,
    },

    /// Compare components across all configured environments
    Matrix {
        /// Reference of head manifests to compare against
        #[arg(long, conflicts_with = "pr")]
        head: Option<String>,

        /// Compare at the head commit of this pull request
        #[arg(long)]
        pr: Option<u64>,
    },

    /// Show the drift a pull request introduces
    Pr {
        /// Pull request number
        number: u64,
    },

    /// Find pull requests of the manifest repository
    Search {
        /// Free-text query
        query: String,
    },

    /// Summarize the pending commits of one component by author
    Shortlog {
        /// Repository name of the component
        component: String,

        /// Reference of a head manifest to compare against
        #[arg(long)]
        head: Option<String>,

        /// Use this environment's manifest instead of the default one
        #[arg(short, long)]
        environment: Option<String>,
    },

    /// Verify the access token against the API
    CheckToken,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    drift_core::telemetry::init_tracing(cli.json, level);

    let config = build_config(&cli)?;
    let names = load_names(cli.names.as_deref())?;
    let credential = load_credential(cli.token.as_deref(), cli.token_file.as_deref())?;

    let transport = ReqwestTransport::new(&config).context("Failed to build HTTP client")?;
    let gateway = RequestGateway::new(Arc::new(transport), credential);
    let aggregator = ComponentAggregator::new(gateway, names, config);

    let output = run(&aggregator, cli.command, cli.output).await?;
    print!("{output}");
    Ok(())
}

/// Configuration from `DRIFT_*` variables with command-line overrides applied.
fn build_config(cli: &Cli) -> Result<DriftConfig> {
    let mut config = DriftConfig::from_env().context("Invalid DRIFT_* configuration")?;
    if let Some(api_url) = &cli.api_url {
        config = config.with_api_url(api_url);
    }
    if let Some(owner) = &cli.owner {
        config = config.with_owner(owner);
    }
    if cli.manifest_repo.is_some() || cli.manifest_path.is_some() {
        let repo = cli.manifest_repo.clone().unwrap_or(config.manifest_repo.clone());
        let path = cli.manifest_path.clone().unwrap_or(config.manifest_path.clone());
        config = config.with_manifest(&repo, &path);
    }
    if let Some(branch) = &cli.default_branch {
        config = config.with_default_branch(branch);
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn load_names(path: Option<&Path>) -> Result<NameTable> {
    match path {
        Some(path) => NameTable::from_json_file(path)
            .with_context(|| format!("Failed to load name table from {}", path.display())),
        None => {
            warn!("no name table given (--names); every manifest entry will be skipped");
            Ok(NameTable::new())
        }
    }
}

fn load_credential(token: Option<&str>, token_file: Option<&Path>) -> Result<Option<Credential>> {
    if let Some(path) = token_file {
        let token = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read token file {}", path.display()))?;
        let token = token.trim();
        if token.is_empty() {
            bail!("Token file {} is empty", path.display());
        }
        return Ok(Some(Credential::new(token)));
    }
    Ok(token
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(Credential::new))
}

async fn run(aggregator: &ComponentAggregator, command: Commands, output: OutputFormat) -> Result<String> {
    match command {
        Commands::Manifest {
            reference,
            environment,
        } => cmd_manifest(aggregator, reference.as_deref(), environment.as_deref(), output).await,
        Commands::Components {
            base,
            head,
            environment,
            filter,
        } => {
            cmd_components(
                aggregator,
                base.as_deref(),
                head.as_deref(),
                environment.as_deref(),
                filter.as_deref(),
                output,
            )
            .await
        }
        Commands::Matrix { head, pr } => cmd_matrix(aggregator, head.as_deref(), pr, output).await,
        Commands::Pr { number } => cmd_pr(aggregator, number, output).await,
        Commands::Search { query } => cmd_search(aggregator, &query, output).await,
        Commands::Shortlog {
            component,
            head,
            environment,
        } => cmd_shortlog(aggregator, &component, head.as_deref(), environment.as_deref()).await,
        Commands::CheckToken => cmd_check_token(aggregator).await,
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let mut text = serde_json::to_string_pretty(value).context("Failed to serialize report")?;
    text.push('\n');
    Ok(text)
}

fn manifest_path(aggregator: &ComponentAggregator, environment: Option<&str>) -> String {
    match environment {
        Some(env) => aggregator.config().environment_manifest(env),
        None => aggregator.config().manifest_path.clone(),
    }
}

/// Print manifest entries
async fn cmd_manifest(
    aggregator: &ComponentAggregator,
    reference: Option<&str>,
    environment: Option<&str>,
    output: OutputFormat,
) -> Result<String> {
    let path = manifest_path(aggregator, environment);
    let manifest = match environment {
        None => aggregator.resolve_manifest(reference).await,
        Some(_) => {
            drift_core::ManifestLoader::new(aggregator.gateway().fresh_scope(), aggregator.config())
                .load_path(&path, reference)
                .await
        }
    }
    .with_context(|| format!("Failed to load manifest {path}"))?;

    if output == OutputFormat::Json {
        return to_json(&manifest);
    }

    let mut text = String::new();
    for entry in &manifest.entries {
        let repo = aggregator.names().resolve_name(&entry.key).unwrap_or("-");
        text.push_str(&format!("{}: {} ({})\n", entry.key, entry.raw_version, repo));
    }
    Ok(text)
}

/// Compare the components of one manifest
async fn cmd_components(
    aggregator: &ComponentAggregator,
    base: Option<&str>,
    head: Option<&str>,
    environment: Option<&str>,
    filter: Option<&str>,
    output: OutputFormat,
) -> Result<String> {
    let path = manifest_path(aggregator, environment);
    let base = base.unwrap_or(&aggregator.config().default_branch).to_string();
    let components = aggregator
        .aggregate_manifest(&path, &base, head)
        .await
        .with_context(|| format!("Failed to compare components of {path}"))?;
    let shown = filter_by_name(&components, filter.unwrap_or(""));

    info!(total = components.len(), shown = shown.len(), "components compared");
    match output {
        OutputFormat::Json => to_json(&shown),
        OutputFormat::Text if shown.is_empty() => Ok("No components found.\n".to_string()),
        OutputFormat::Text => Ok(render_components(&shown)),
    }
}

/// Compare components across environments
async fn cmd_matrix(
    aggregator: &ComponentAggregator,
    head: Option<&str>,
    pr: Option<u64>,
    output: OutputFormat,
) -> Result<String> {
    if let Some(number) = pr {
        return cmd_pr(aggregator, number, output).await;
    }

    let config = aggregator.config();
    let matrix = aggregator
        .aggregate_environments(&config.environments, &config.default_branch, head)
        .await
        .context("Failed to compare environments")?;

    match output {
        OutputFormat::Json => to_json(&matrix),
        OutputFormat::Text => Ok(render_matrix(&matrix)),
    }
}

/// Show the drift of a pull request
async fn cmd_pr(aggregator: &ComponentAggregator, number: u64, output: OutputFormat) -> Result<String> {
    let report = aggregator
        .compare_pull_request(number, &aggregator.config().environments)
        .await
        .with_context(|| format!("Failed to compare pull request #{number}"))?;

    if output == OutputFormat::Json {
        return to_json(&report);
    }
    match report {
        PullRequestReport::Merged { pull_request } => Ok(format!(
            "Pull request #{} was merged, nothing to display.\n",
            pull_request.number
        )),
        PullRequestReport::Open {
            pull_request,
            matrix,
        } => Ok(format!(
            "#{} {} ({})\n\n{}",
            pull_request.number,
            pull_request.title,
            pull_request.html_url,
            render_matrix(&matrix)
        )),
    }
}

/// Search pull requests
async fn cmd_search(aggregator: &ComponentAggregator, query: &str, output: OutputFormat) -> Result<String> {
    let hits = aggregator
        .search_pull_requests(query)
        .await
        .context("Failed to search pull requests")?;

    match output {
        OutputFormat::Json => to_json(&hits),
        OutputFormat::Text if hits.is_empty() => Ok(format!("No pull requests match '{query}'.\n")),
        OutputFormat::Text => Ok(hits.iter().map(|hit| format!("{hit}\n")).collect()),
    }
}

/// Shortlog of one component's pending commits
async fn cmd_shortlog(
    aggregator: &ComponentAggregator,
    component: &str,
    head: Option<&str>,
    environment: Option<&str>,
) -> Result<String> {
    let path = manifest_path(aggregator, environment);
    let base = aggregator.config().default_branch.clone();
    let components = aggregator
        .aggregate_manifest(&path, &base, head)
        .await
        .with_context(|| format!("Failed to compare components of {path}"))?;

    let Some(found) = components.iter().find(|c| c.name == component) else {
        bail!("Component '{component}' is not tracked in {path}");
    };
    if let Some(error) = &found.error {
        bail!("Component '{component}' could not be compared: {error}");
    }
    Ok(shortlog(&found.commits))
}

/// Verify the access token
async fn cmd_check_token(aggregator: &ComponentAggregator) -> Result<String> {
    if aggregator.gateway().is_credential_valid().await {
        Ok("Access token is valid.\n".to_string())
    } else {
        bail!("Access token was rejected")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drift_core::fakes::FakeTransport;

    const PUPPET: &str = "/repos/Tradeshift/tradeshift-puppet";
    const WIDGET: &str = "/repos/Tradeshift/widget-repo";
    const WIDGET_SHA: &str = "1111111111111111111111111111111111111111";

    fn aggregator(transport: &Arc<FakeTransport>) -> ComponentAggregator {
        ComponentAggregator::new(
            RequestGateway::new(transport.clone(), None),
            NameTable::new().with("widget", "widget-repo"),
            DriftConfig::default().with_environments(["testing"]),
        )
    }

    fn widget_fixture() -> Arc<FakeTransport> {
        let transport = FakeTransport::new();
        transport.respond_manifest(
            PUPPET,
            "hiera/versions.yaml",
            Some("master"),
            "role::app::widget: 1.2.0\nrole::app::other: abcdef0\n",
        );
        transport.respond_tag(WIDGET, "v1.2.0", WIDGET_SHA);
        transport.respond_compare(
            WIDGET,
            WIDGET_SHA,
            "master",
            2,
            0,
            &[
                ("c1", "alice", "Alice", "Add knob"),
                ("c2", "alice", "Alice", "Polish knob"),
            ],
        );
        transport
    }

    #[test]
    fn test_cli_parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "drift",
            "components",
            "--filter",
            "wid",
            "--output",
            "json",
            "--owner",
            "acme",
        ])
        .unwrap();
        assert_eq!(cli.output, OutputFormat::Json);
        assert_eq!(cli.owner.as_deref(), Some("acme"));
        assert!(matches!(cli.command, Commands::Components { .. }));
    }

    #[test]
    fn test_matrix_head_conflicts_with_pr() {
        assert!(Cli::try_parse_from(["drift", "matrix", "--head", "abc", "--pr", "3"]).is_err());
    }

    #[test]
    fn test_token_file_is_trimmed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token");
        std::fs::write(&path, "s3cret\n").unwrap();
        let credential = load_credential(None, Some(&path)).unwrap().unwrap();
        assert_eq!(credential.token(), "s3cret");

        std::fs::write(&path, "  \n").unwrap();
        assert!(load_credential(None, Some(&path)).is_err());
        assert!(load_credential(Some(""), None).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_components_text_report() {
        let transport = widget_fixture();
        let out = cmd_components(&aggregator(&transport), None, None, None, None, OutputFormat::Text)
            .await
            .unwrap();
        assert_eq!(out, "widget-repo  1111111..master  2 ahead\n");
    }

    #[tokio::test]
    async fn test_components_json_report_respects_filter() {
        let transport = widget_fixture();
        let out = cmd_components(
            &aggregator(&transport),
            None,
            None,
            None,
            Some("gizmo"),
            OutputFormat::Json,
        )
        .await
        .unwrap();
        assert_eq!(out.trim(), "[]");
    }

    #[tokio::test]
    async fn test_shortlog_of_component() {
        let transport = widget_fixture();
        let out = cmd_shortlog(&aggregator(&transport), "widget-repo", None, None)
            .await
            .unwrap();
        assert_eq!(out, "Alice (2):\n      Add knob\n      Polish knob\n\n");

        let err = cmd_shortlog(&aggregator(&transport), "gizmo-repo", None, None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not tracked"));
    }

    #[tokio::test]
    async fn test_manifest_lists_entries_with_repositories() {
        let transport = widget_fixture();
        let out = cmd_manifest(&aggregator(&transport), Some("master"), None, OutputFormat::Text)
            .await
            .unwrap();
        assert_eq!(
            out,
            "role::app::widget: 1.2.0 (widget-repo)\nrole::app::other: abcdef0 (-)\n"
        );

        let err = cmd_manifest(&aggregator(&transport), Some("master"), Some("staging"), OutputFormat::Text)
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("hiera/environments/staging/versions.yaml"));
    }

    #[tokio::test]
    async fn test_check_token_rejected() {
        let transport = FakeTransport::new();
        transport.fail("/user", 401, "Bad credentials");
        assert!(cmd_check_token(&aggregator(&transport)).await.is_err());
    }
}
