//! Interacts with the local Docker daemon.

use bollard::{
    auth::DockerCredentials,
    models::{ContainerCreateBody, HostConfig, Mount, MountTypeEnum},
    query_parameters::{
        CreateContainerOptions, CreateImageOptions, ListImagesOptions, LogsOptions,
        RemoveContainerOptions, StartContainerOptions, WaitContainerOptions,
    },
    Docker,
};
use bon::Builder;
use color_eyre::{
    eyre::{Context, Result},
    Section, SectionExt,
};
use derive_more::Debug;
use futures_lite::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::{ContentId, Engine, HistoryRecord, ImageName, ImageSummary};

/// The public image used to render the layer tree of local images.
pub const LAYER_TREE_IMAGE: &str = "nate/dockviz:latest";

/// The Docker socket, mounted into the layer tree helper so it can read local images.
const DOCKER_SOCKET: &str = "/var/run/docker.sock";

/// Credentials for pulling from an authenticated registry.
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
pub struct Credentials {
    /// The registry username.
    #[builder(into)]
    pub username: String,

    /// The registry password or token.
    #[debug(skip)]
    #[builder(into)]
    pub password: String,
}

/// A connection to the local Docker daemon.
#[derive(Debug, Clone)]
pub struct Daemon {
    /// The Docker client for interacting with the daemon
    #[debug(skip)]
    docker: Docker,
}

#[bon::bon]
impl Daemon {
    /// Connect to the Docker daemon using the local defaults
    /// (`DOCKER_HOST` if set, otherwise the platform socket).
    #[builder]
    pub async fn new() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults().context("connect to Docker daemon")?;

        // Verify Docker daemon is accessible
        docker
            .version()
            .await
            .context("verify Docker daemon connection")?;

        Ok(Self { docker })
    }
}

impl Daemon {
    /// Pull an image from its registry.
    ///
    /// The progress feed is read to completion before this returns.
    #[tracing::instrument(skip(self, credentials))]
    pub async fn pull(&self, name: &ImageName, credentials: Option<Credentials>) -> Result<()> {
        let options = pull_options(name);
        let target = format!(
            "{}:{}",
            options.from_image.as_deref().unwrap_or_default(),
            options.tag.as_deref().unwrap_or_default(),
        );
        info!("pulling image '{}' as '{target}'", name.name);

        let credentials = credentials.map(|credentials| registry_credentials(name, credentials));
        let mut pull_stream = Box::pin(self.docker.create_image(Some(options), None, credentials));
        while let Some(info) = pull_stream.next().await {
            let info = info
                .context("pull image")
                .with_section(|| target.clone().header("Image:"))?;
            debug!(status = ?info.status, progress = ?info.progress_detail, "pull progress");
        }

        Ok(())
    }

    /// Print the layer tree of every local image to standard output.
    ///
    /// This runs the [`LAYER_TREE_IMAGE`] helper with the Docker socket mounted,
    /// waits for it to finish, copies its output, and removes the container.
    #[tracing::instrument(skip(self))]
    pub async fn visualize_layers(&self) -> Result<()> {
        let helper = ImageName::builder()
            .repository("docker.io")
            .name(LAYER_TREE_IMAGE)
            .build();
        self.pull(&helper, None)
            .await
            .context("pull layer tree image")?;

        let config = ContainerCreateBody {
            image: Some(LAYER_TREE_IMAGE.to_string()),
            cmd: Some(vec![String::from("images"), String::from("-t")]),
            tty: Some(true),
            host_config: Some(HostConfig {
                mounts: Some(vec![Mount {
                    typ: Some(MountTypeEnum::BIND),
                    source: Some(DOCKER_SOCKET.to_string()),
                    target: Some(DOCKER_SOCKET.to_string()),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        };

        let container = self
            .docker
            .create_container(None::<CreateContainerOptions>, config)
            .await
            .context("create layer tree container")?;
        debug!(id = %container.id, "created layer tree container");

        // The container is removed even if running it failed.
        let output = self.run_to_completion(&container.id).await;
        self.docker
            .remove_container(
                &container.id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
            .context("remove layer tree container")?;

        output
    }

    /// Start the container, wait for it to exit, then copy its stdout.
    async fn run_to_completion(&self, id: &str) -> Result<()> {
        self.docker
            .start_container(id, None::<StartContainerOptions>)
            .await
            .context("start container")?;

        let mut wait_stream = Box::pin(self.docker.wait_container(id, None::<WaitContainerOptions>));
        while let Some(exit) = wait_stream.next().await {
            match exit {
                Ok(exit) => debug!(code = exit.status_code, "container exited"),
                Err(err) => warn!(?err, "container exited unsuccessfully"),
            }
        }

        let options = Some(LogsOptions {
            stdout: true,
            tail: String::from("all"),
            ..Default::default()
        });

        let mut stdout = tokio::io::stdout();
        let mut log_stream = Box::pin(self.docker.logs(id, options));
        while let Some(chunk) = log_stream.next().await {
            let chunk = chunk.context("read container logs")?;
            stdout
                .write_all(&chunk.into_bytes())
                .await
                .context("write container logs")?;
        }

        stdout.flush().await.context("flush stdout")
    }
}

#[async_trait::async_trait]
impl Engine for Daemon {
    #[tracing::instrument(skip(self))]
    async fn list_images(&self) -> Result<Vec<ImageSummary>, bollard::errors::Error> {
        let options = Some(ListImagesOptions {
            all: false,
            ..Default::default()
        });

        let images = self.docker.list_images(options).await?;
        debug!(count = images.len(), "listed images");
        Ok(images.into_iter().map(ImageSummary::from).collect())
    }

    #[tracing::instrument(skip(self))]
    async fn history(&self, id: &ContentId) -> Result<Vec<HistoryRecord>, bollard::errors::Error> {
        let history = self.docker.image_history(id.as_str()).await?;
        debug!(layers = history.len(), "read image history");
        Ok(history.into_iter().map(HistoryRecord::from).collect())
    }
}

impl From<bollard::models::ImageSummary> for ImageSummary {
    fn from(image: bollard::models::ImageSummary) -> Self {
        Self::builder().id(image.id).tags(image.repo_tags).build()
    }
}

impl From<bollard::models::HistoryResponseItem> for HistoryRecord {
    fn from(item: bollard::models::HistoryResponseItem) -> Self {
        Self::builder()
            .tags(item.tags)
            .created_by(item.created_by)
            .build()
    }
}

/// The options for pulling the image from `repository/name`.
///
/// Images without a tag are pulled as `latest`;
/// the daemon would otherwise pull every tag of the repository.
pub fn pull_options(name: &ImageName) -> CreateImageOptions {
    CreateImageOptions {
        from_image: Some(format!("{}/{}", name.repository, name.untagged())),
        tag: Some(name.tag().unwrap_or("latest").to_string()),
        ..Default::default()
    }
}

/// Credentials addressed to the registry host of the image.
pub fn registry_credentials(name: &ImageName, credentials: Credentials) -> DockerCredentials {
    DockerCredentials {
        username: Some(credentials.username),
        password: Some(credentials.password),
        serveraddress: Some(name.host().to_string()),
        ..Default::default()
    }
}

/// Checks if Docker daemon is available.
pub async fn is_daemon_available() -> bool {
    match Docker::connect_with_local_defaults() {
        Ok(docker) => docker.version().await.is_ok(),
        Err(_) => false,
    }
}
