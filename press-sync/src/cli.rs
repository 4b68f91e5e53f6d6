/// Command line surface of press-sync: argument parsing and dispatch into `press-sync-core`.
///
/// All remote behaviour lives in the core crate. This module loads config, opens one
/// API session per invocation and prints results for people; progress goes to the
/// tracing log.
///
/// ## How To Use
/// - For command-line users: run the `press-sync` binary with `--help`.
/// - For programmatic/integration use: call [`run`] with a constructed [`Cli`].
use crate::load_config::{load_config, CliConfig, APP_PASSWORD_ENV, USERNAME_ENV};
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use press_sync_core::media::{MediaKey, MediaRecord, SyncOutcome};
use press_sync_core::synchronise::synchronise_directory;
use press_sync_core::taxonomy::{TaxonomyKind, TaxonomyProxy};
use press_sync_core::WordPressApi;
use serde_json::{Map, Value};
use std::path::PathBuf;

/// CLI for press-sync: publish markdown posts and keep media in step with a WordPress site.
#[derive(Parser)]
#[clap(
    name = "press-sync",
    version,
    about = "Publish a directory of markdown posts and sync media with a WordPress site"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create or update a post for every markdown file in content.posts_dir
    Sync {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
    /// Sync one media file in whichever direction is newer
    Media {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Local file, or a directory to download into. Defaults to content.media_dir
        /// for items matched by --id or --slug
        path: Option<PathBuf>,
        /// Remote slug to match or assign
        #[clap(long)]
        slug: Option<String>,
        /// Remote media id to match
        #[clap(long)]
        id: Option<u64>,
        /// Skip the content hash comparison and decide by timestamps alone
        #[clap(long)]
        force: bool,
    },
    /// Print the URL where an application password can be granted
    Authorize {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
    /// List categories or tags with their ids
    Terms {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        #[clap(value_enum)]
        kind: TermsKind,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TermsKind {
    Categories,
    Tags,
}

impl From<TermsKind> for TaxonomyKind {
    fn from(kind: TermsKind) -> Self {
        match kind {
            TermsKind::Categories => TaxonomyKind::Categories,
            TermsKind::Tags => TaxonomyKind::Tags,
        }
    }
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Sync { config } => {
            let loaded = load_config(config)?;
            let posts_dir = loaded
                .config
                .content
                .posts_dir
                .clone()
                .ok_or_else(|| anyhow!("content.posts_dir is not set in the config"))?;
            let api = open_session(&loaded)?;
            announce_missing_credentials(&api).await;

            tracing::info!(command = "sync", dir = %posts_dir.display(), "Starting synchronisation");
            let report = match synchronise_directory(&posts_dir, &api).await {
                Ok(report) => report,
                Err(e) => {
                    tracing::error!(command = "sync", error = %e, "Synchronisation failed");
                    return Err(e).context("Synchronisation failed");
                }
            };
            for post in &report.posts {
                let id = post.id.map(|id| id.to_string()).unwrap_or_else(|| "-".into());
                println!("{:?}\t{}\t{}", post.action, id, post.slug);
            }
            tracing::info!(
                command = "sync",
                created = report.created(),
                updated = report.updated(),
                "Synchronisation complete"
            );
            Ok(())
        }
        Commands::Media {
            config,
            path,
            slug,
            id,
            force,
        } => {
            let loaded = load_config(config)?;
            let api = open_session(&loaded)?;
            announce_missing_credentials(&api).await;

            let record = media_record(&api, &loaded, path, slug, id).await?;
            tracing::info!(command = "media", path = %record.path().display(), force, "Syncing media");
            match api.media_sync().sync(&record, !force).await? {
                SyncOutcome::Skipped => println!("in sync\t{}", record.path().display()),
                SyncOutcome::Uploaded(saved) => println!(
                    "uploaded\t{}\t{}",
                    saved.id().map(|i| i.to_string()).unwrap_or_default(),
                    saved.source_url().unwrap_or_default()
                ),
                SyncOutcome::Downloaded(Some(dest)) => println!("downloaded\t{}", dest.display()),
                SyncOutcome::Downloaded(None) => println!("nothing to download"),
            }
            Ok(())
        }
        Commands::Authorize { config } => {
            let loaded = load_config(config)?;
            let api = open_session(&loaded)?;
            let url = api
                .authorization_url()
                .await
                .context("Could not build the authorization URL")?;
            println!("{url}");
            Ok(())
        }
        Commands::Terms { config, kind } => {
            let loaded = load_config(config)?;
            let api = open_session(&loaded)?;
            announce_missing_credentials(&api).await;
            let terms = TaxonomyProxy::new(&api, kind.into()).list_all().await?;
            for term in terms.values() {
                println!("{}\t{}\t{}", term.id, term.name, term.slug);
            }
            tracing::info!(command = "terms", kind = ?kind, count = terms.len(), "Listed terms");
            Ok(())
        }
    }
}

fn open_session(loaded: &CliConfig) -> Result<WordPressApi> {
    WordPressApi::from_config(&loaded.config.site, loaded.credentials.clone())
        .context("Failed to create API session")
}

/// Points the user at the grant page when no application password is configured.
/// The session carries on unauthenticated; writes will then be refused by the remote.
async fn announce_missing_credentials(api: &WordPressApi) {
    if api.is_authenticated() {
        return;
    }
    tracing::warn!("No credentials in the environment, continuing unauthenticated");
    match api.authorization_url().await {
        Ok(url) => eprintln!(
            "No credentials: set {USERNAME_ENV} and {APP_PASSWORD_ENV}. Grant an application password at {url}"
        ),
        Err(e) => tracing::warn!(error = %e, "Could not discover the authorization URL"),
    }
}

/// Pairs `path` with the remote item named by `id` or `slug`. Without `path` a matched
/// item lives under `content.media_dir`. Without a remote match the file is treated as
/// new, keeping `slug` for the upload name.
async fn media_record(
    api: &WordPressApi,
    loaded: &CliConfig,
    path: Option<PathBuf>,
    slug: Option<String>,
    id: Option<u64>,
) -> Result<MediaRecord> {
    let key = match (id, slug.as_deref()) {
        (Some(id), _) => Some(MediaKey::ById(id)),
        (None, Some(slug)) => Some(MediaKey::from(slug)),
        (None, None) => None,
    };
    let remote = match &key {
        Some(key) => api.media(loaded.config.content.media_dir.clone()).get(key).await?,
        None => None,
    };
    match (remote, path) {
        (Some(remote), Some(path)) => Ok(MediaRecord::new(Some(path), remote.metadata().clone())),
        (Some(remote), None) => Ok(remote),
        (None, None) => Err(anyhow!("No remote media matched; a local path is required")),
        (None, Some(path)) => {
            let mut metadata = Map::new();
            if let Some(slug) = slug {
                metadata.insert("slug".to_string(), Value::String(slug));
            }
            MediaRecord::from_file(&path, metadata)
                .with_context(|| format!("No remote match and no readable local file at {}", path.display()))
        }
    }
}
