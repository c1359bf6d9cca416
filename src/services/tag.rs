//! Tag service
//!
//! Tags are the catalogue's categories. The set is small and seeded from
//! configuration at startup, so the full list is cached as one entry.

use crate::cache::{Cache, CacheLayer};
use crate::db::repositories::TagRepository;
use crate::models::Tag;
use crate::services::generate_slug;
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;

const CACHE_KEY_TAG_LIST: &str = "tag:list";
const CACHE_PREFIX_TAG: &str = "tag:";

/// Error types for tag service operations
#[derive(Debug, thiserror::Error)]
pub enum TagServiceError {
    #[error("Tag name cannot be empty")]
    EmptyName,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Tag service
pub struct TagService {
    repo: Arc<dyn TagRepository>,
    cache: Arc<Cache>,
    cache_ttl: Duration,
}

impl TagService {
    pub fn new(repo: Arc<dyn TagRepository>, cache: Arc<Cache>) -> Self {
        let cache_ttl = cache.default_ttl();
        Self {
            repo,
            cache,
            cache_ttl,
        }
    }

    /// All tags ordered by name
    pub async fn list(&self) -> Result<Vec<Tag>, TagServiceError> {
        if let Some(tags) = self.cache.get::<Vec<Tag>>(CACHE_KEY_TAG_LIST).await.ok().flatten() {
            return Ok(tags);
        }

        let tags = self.repo.list().await.context("Failed to list tags")?;
        let _ = self.cache.set(CACHE_KEY_TAG_LIST, &tags, self.cache_ttl).await;
        Ok(tags)
    }

    /// Return the tag named `name`, creating it with a generated slug if
    /// it does not exist yet.
    pub async fn create_or_get(&self, name: &str) -> Result<Tag, TagServiceError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(TagServiceError::EmptyName);
        }

        if let Some(existing) = self
            .repo
            .get_by_name(name)
            .await
            .context("Failed to check existing tag")?
        {
            return Ok(existing);
        }

        let tag = Tag::new(generate_slug(name), name.to_string());
        let created = self.repo.create(&tag).await.context("Failed to create tag")?;

        let _ = self.cache.delete_prefix(CACHE_PREFIX_TAG).await;
        Ok(created)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Tag>, TagServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get tag by ID")
            .map_err(Into::into)
    }

    /// Make sure every tag in `names` exists. Returns how many were created.
    pub async fn seed(&self, names: &[String]) -> Result<usize, TagServiceError> {
        let mut created = 0;
        for name in names {
            if name.trim().is_empty() {
                continue;
            }
            let existed = self
                .repo
                .get_by_name(name.trim())
                .await
                .context("Failed to check existing tag")?
                .is_some();
            if !existed {
                self.create_or_get(name).await?;
                created += 1;
            }
        }

        if created > 0 {
            tracing::info!("Seeded {} catalogue tags", created);
        }
        Ok(created)
    }
}
