//! Core library for `hindsight`, a tool for reconstructing Dockerfiles from image history.

use bon::Builder;
use color_eyre::{
    eyre::{self, eyre},
    Section, SectionExt,
};
use derive_more::{Display, Error, From};
use std::str::FromStr;
use tap::Pipe;

pub mod daemon;
pub mod recipe;
pub mod resolve;

/// The registry prefix used when the user doesn't provide one.
pub const DEFAULT_REPOSITORY: &str = "docker.io/library";

/// A human-readable image reference, split into the registry prefix and the image name.
///
/// The name carries an optional tag. Docker stores tags for images pulled from the default
/// registry namespace in short form (`ubuntu:focal`), while other images are stored fully
/// qualified (`asia.gcr.io/google-containers/ubuntu-slim:0.14`);
/// [`resolve::resolve_by_name`] accepts either form.
///
/// ```
/// # use hindsight_lib::ImageName;
/// # use std::str::FromStr;
/// let name = ImageName::from_str("myregistry.example.com/base/app:1.0").expect("parse name");
/// assert_eq!(name.repository, "myregistry.example.com/base");
/// assert_eq!(name.name, "app:1.0");
/// assert_eq!(name.tag(), Some("1.0"));
/// assert_eq!(name.qualified(), "myregistry.example.com/base/app:1.0");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
pub struct ImageName {
    /// Registry prefix, including any namespace (e.g. "docker.io/library", "ghcr.io/user").
    #[builder(into, default = DEFAULT_REPOSITORY.to_string())]
    pub repository: String,

    /// Image name with an optional tag (e.g. "ubuntu", "ubuntu:focal").
    #[builder(into)]
    pub name: String,
}

impl ImageName {
    /// The tag of the image, if one was provided.
    pub fn tag(&self) -> Option<&str> {
        self.base_name()
            .split_once(':')
            .map(|(_, tag)| tag)
            .filter(|tag| !tag.is_empty())
    }

    /// The name without its tag (e.g. "ubuntu" for "ubuntu:focal").
    pub fn untagged(&self) -> &str {
        match self.tag() {
            Some(tag) => &self.name[..self.name.len() - tag.len() - 1],
            None => self.name.trim_end_matches(':'),
        }
    }

    /// The fully registry-qualified form: `repository/name`.
    pub fn qualified(&self) -> String {
        format!("{}/{}", self.repository, self.name)
    }

    /// The registry host, which is the first segment of the repository.
    pub fn host(&self) -> &str {
        self.repository
            .split_once('/')
            .map_or(self.repository.as_str(), |(host, _)| host)
    }

    /// Clone the instance, tagging it `latest` if it has no tag.
    ///
    /// ```
    /// # use hindsight_lib::ImageName;
    /// let name = ImageName::builder().name("ubuntu").build().or_latest();
    /// assert_eq!(name.name, "ubuntu:latest");
    ///
    /// let name = ImageName::builder().name("ubuntu:focal").build().or_latest();
    /// assert_eq!(name.name, "ubuntu:focal");
    /// ```
    pub fn or_latest(&self) -> Self {
        match self.tag() {
            Some(_) => self.clone(),
            None => Self::builder()
                .repository(&self.repository)
                .name(format!("{}:latest", self.untagged()))
                .build(),
        }
    }

    /// The last path segment of the name, which is where the tag lives.
    fn base_name(&self) -> &str {
        self.name
            .rsplit_once('/')
            .map_or(self.name.as_str(), |(_, base)| base)
    }
}

impl FromStr for ImageName {
    type Err = eyre::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input_section = || s.to_string().header("Input:");
        let expected_section = || "{repository}/{name}[:{tag}]".to_string().header("Expected:");

        let (repository, name) = s.rsplit_once('/').ok_or_else(|| {
            eyre!("invalid image name: missing repository separator '/'")
                .with_section(input_section)
                .with_section(expected_section)
        })?;

        if repository.is_empty() {
            return Err(eyre!("repository cannot be empty").with_section(input_section));
        }
        if name.is_empty() {
            return Err(eyre!("name cannot be empty").with_section(input_section));
        }

        Self::builder()
            .repository(repository)
            .name(name)
            .build()
            .pipe(Ok)
    }
}

impl std::fmt::Display for ImageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.qualified())
    }
}

/// The identifier the container engine assigns to an image (e.g. "sha256:0a1b...").
///
/// This is opaque: the engine accepts full and shortened forms alike,
/// so no normalization is applied.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display)]
pub struct ContentId(String);

impl ContentId {
    /// The identifier as the engine reported it.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ContentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for ContentId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<&ContentId> for ContentId {
    fn from(id: &ContentId) -> Self {
        id.clone()
    }
}

impl FromStr for ContentId {
    type Err = eyre::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = s.trim();
        if id.is_empty() {
            return Err(eyre!("content identifier cannot be empty"));
        }
        Ok(Self::from(id))
    }
}

/// An image known to the local engine, along with every tag recorded against it.
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
pub struct ImageSummary {
    /// The engine identifier of the image.
    #[builder(into)]
    pub id: ContentId,

    /// Tags attached to the image (e.g. "ubuntu:focal", "ghcr.io/user/app:1.0").
    #[builder(into, default)]
    pub tags: Vec<String>,
}

/// One entry of an image's layer history.
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
pub struct HistoryRecord {
    /// Tags attached at this layer, if any.
    #[builder(into, default)]
    pub tags: Vec<String>,

    /// The recorded creation command.
    ///
    /// Empty for metadata-only layers.
    #[builder(into, default)]
    pub created_by: String,
}

/// The capabilities `hindsight` needs from a container engine.
#[async_trait::async_trait]
pub trait Engine: Send + Sync {
    /// List the images present in the local engine.
    async fn list_images(&self) -> Result<Vec<ImageSummary>, bollard::errors::Error>;

    /// Retrieve the layer history of an image, newest layer first.
    async fn history(&self, id: &ContentId) -> Result<Vec<HistoryRecord>, bollard::errors::Error>;
}

/// Errors reported by identity resolution and recipe reconstruction.
#[derive(Debug, Display, Error, From)]
pub enum Error {
    /// No local image carries a tag matching the reference.
    ///
    /// Pulling the image and resolving again may resolve this.
    #[display("no local image is tagged '{reference}' or '{}'", reference.name)]
    NotFound {
        /// The reference that was searched.
        reference: ImageName,
    },

    /// The image history has no tagged layer to use as the base image.
    #[display("image '{id}' has no tagged layer in its history to use as a base image")]
    NoAnchor {
        /// The image whose history was searched.
        id: ContentId,
    },

    /// The container engine failed; the error is passed through unchanged
    /// and exposed as the source.
    #[display("{_0}")]
    #[from]
    Upstream(#[error(source)] bollard::errors::Error),
}
