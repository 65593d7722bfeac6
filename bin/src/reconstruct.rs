use clap::Parser;
use color_eyre::eyre::{bail, Context, Result};
use derive_more::Debug;
use hindsight_lib::{
    daemon::{Credentials, Daemon},
    recipe::build_recipe,
    resolve::{require_anchor_tag, resolve_by_name},
    ContentId, Error, ImageName, DEFAULT_REPOSITORY,
};
use std::str::FromStr;
use tracing::{info, warn};

#[derive(Debug, Parser)]
pub struct Options {
    /// Name of the image with an optional tag (e.g. ubuntu:focal, app:1.1.2)
    ///
    /// If no local image carries this name, it is pulled from the registry.
    /// Images without a tag are treated as `latest`.
    #[arg(short, long, required_unless_present = "id", conflicts_with = "id")]
    name: Option<String>,

    /// Engine identifier of the image (e.g. sha256:0a1b... or its short form)
    ///
    /// The image must already be present locally; it is never pulled.
    #[arg(short, long, value_parser = ContentId::from_str)]
    id: Option<ContentId>,

    /// Registry prefix the image name lives under
    /// (e.g. docker.io/library, asia.gcr.io/google-containers)
    #[arg(short, long, default_value = DEFAULT_REPOSITORY)]
    repository: String,

    /// Username for the registry, used when pulling
    #[arg(short, long, env = "HINDSIGHT_USERNAME", requires = "password")]
    username: Option<String>,

    /// Password for the registry, used when pulling
    #[arg(
        short,
        long,
        env = "HINDSIGHT_PASSWORD",
        hide_env_values = true,
        requires = "username"
    )]
    #[debug(skip)]
    password: Option<String>,

    /// Print the layer tree of all local images after the recipe
    #[arg(short, long)]
    tree: bool,
}

impl Options {
    fn credentials(&self) -> Option<Credentials> {
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => Some(
                Credentials::builder()
                    .username(username)
                    .password(password)
                    .build(),
            ),
            _ => None,
        }
    }
}

#[tracing::instrument]
pub async fn main(opts: Options) -> Result<()> {
    let daemon = Daemon::builder()
        .build()
        .await
        .context("connect to docker daemon")?;

    let id = match (&opts.id, &opts.name) {
        (Some(id), _) => id.clone(),
        (None, Some(name)) => {
            let name = ImageName::builder()
                .repository(&opts.repository)
                .name(name)
                .build()
                .or_latest();
            resolve_or_pull(&daemon, &name, opts.credentials()).await?
        }
        (None, None) => bail!("either an image name or an image id is required"),
    };

    info!(%id, "reconstructing recipe");
    let base = require_anchor_tag(&daemon, &id)
        .await
        .context("find base image")?;
    let recipe = build_recipe(&daemon, &id, &base)
        .await
        .context("reconstruct recipe")?;
    print!("{recipe}");

    if opts.tree {
        info!("printing layer tree of all local images");
        if let Err(err) = daemon.visualize_layers().await {
            warn!(?err, "unable to print layer tree");
        }
    }

    Ok(())
}

/// Resolve the image locally, pulling it first if no local image carries the name.
async fn resolve_or_pull(
    daemon: &Daemon,
    name: &ImageName,
    credentials: Option<Credentials>,
) -> Result<ContentId> {
    match resolve_by_name(daemon, name).await {
        Ok(id) => Ok(id),
        Err(Error::NotFound { .. }) => {
            info!(%name, "image not found locally");
            daemon.pull(name, credentials).await.context("pull image")?;
            resolve_by_name(daemon, name)
                .await
                .context("resolve pulled image")
        }
        Err(err) => Err(err).context("resolve image"),
    }
}
