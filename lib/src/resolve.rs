//! Maps between human-readable image names and engine identifiers.

use crate::{ContentId, Engine, Error, HistoryRecord, ImageName};

/// Find the local image tagged with the provided name.
///
/// A tag matches if it is the fully qualified `repository/name`,
/// or if it is just `name`: images from the default registry namespace are
/// recorded by the engine in short form (`ubuntu:focal` rather than `docker.io/library/ubuntu:focal`).
///
/// The first matching image in listing order is returned.
/// The registry is never queried; pulling is up to the caller.
pub async fn resolve_by_name(engine: &impl Engine, name: &ImageName) -> Result<ContentId, Error> {
    let qualified = name.qualified();
    engine
        .list_images()
        .await?
        .into_iter()
        .find(|image| {
            image
                .tags
                .iter()
                .any(|tag| !tag.is_empty() && (*tag == qualified || *tag == name.name))
        })
        .map(|image| image.id)
        .ok_or_else(|| Error::NotFound {
            reference: name.clone(),
        })
}

/// Find the tag to use as the base image for the recipe of the provided image.
///
/// Locally built images keep the tags of each image they were built on,
/// so the oldest tagged layer is the most likely base image.
/// Images pulled from a registry usually carry no such history, in which case this returns `None`.
pub async fn anchor_tag_for(engine: &impl Engine, id: &ContentId) -> Result<Option<String>, Error> {
    let history = engine.history(id).await?;
    Ok(oldest_tag(&history).map(String::from))
}

/// Like [`anchor_tag_for`], but reports a missing anchor as [`Error::NoAnchor`].
pub async fn require_anchor_tag(engine: &impl Engine, id: &ContentId) -> Result<String, Error> {
    anchor_tag_for(engine, id)
        .await?
        .ok_or_else(|| Error::NoAnchor { id: id.clone() })
}

/// The first tag of the oldest record that has any tags.
/// History is newest-first, so this walks it from the back.
pub fn oldest_tag(history: &[HistoryRecord]) -> Option<&str> {
    history
        .iter()
        .rev()
        .find_map(|record| record.tags.first().filter(|tag| !tag.is_empty()))
        .map(String::as_str)
}
