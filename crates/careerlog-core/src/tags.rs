use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{
  debug,
  trace
};

use crate::model::{
  ContentId,
  Tag,
  TagId
};
use crate::service::{
  ServiceError,
  TagService
};

/// Cached view over the tag service.
///
/// The list is fetched once and reused
/// until `invalidate` is called or a
/// write through this catalog changes
/// it.
pub struct TagCatalog {
  service: Arc<dyn TagService>,
  cached:  Mutex<Option<Vec<Tag>>>
}

impl TagCatalog {
  pub fn new(
    service: Arc<dyn TagService>
  ) -> Self {
    Self {
      service,
      cached: Mutex::new(None)
    }
  }

  pub fn invalidate(&self) {
    trace!("tag cache invalidated");
    *self.cached.lock() = None;
  }

  pub fn is_cached(&self) -> bool {
    self.cached.lock().is_some()
  }

  #[tracing::instrument(skip(self))]
  pub async fn fetch_all(
    &self,
    force_refresh: bool
  ) -> Result<Vec<Tag>, ServiceError> {
    let cached = if force_refresh {
      None
    } else {
      self.cached.lock().clone()
    };
    if let Some(tags) = cached {
      trace!(
        count = tags.len(),
        "serving tags from cache"
      );
      return Ok(tags);
    }

    let tags =
      self.service.fetch_all_tags().await?;
    debug!(
      count = tags.len(),
      "refreshed tag cache"
    );
    *self.cached.lock() = Some(tags.clone());
    Ok(tags)
  }

  pub async fn find(
    &self,
    id: TagId
  ) -> Result<Option<Tag>, ServiceError> {
    let tags = self.fetch_all(false).await?;
    if let Some(tag) =
      tags.into_iter().find(|t| t.id == id)
    {
      return Ok(Some(tag));
    }

    // Created elsewhere since the last
    // refresh.
    let tags = self.fetch_all(true).await?;
    Ok(tags.into_iter().find(|t| t.id == id))
  }

  pub async fn insert(
    &self,
    name: &str
  ) -> Result<Tag, ServiceError> {
    let tag =
      self.service.insert_tag(name).await?;
    self.invalidate();
    Ok(tag)
  }

  pub async fn rename(
    &self,
    id: TagId,
    name: &str
  ) -> Result<(), ServiceError> {
    self.service.update_tag(id, name).await?;
    self.invalidate();
    Ok(())
  }

  pub async fn delete(
    &self,
    id: TagId
  ) -> Result<(), ServiceError> {
    let result =
      self.service.delete_tag(id).await;
    self.invalidate();
    result
  }

  pub async fn attach(
    &self,
    content_id: ContentId,
    tag_id: TagId
  ) -> Result<(), ServiceError> {
    self
      .service
      .attach_tag(content_id, tag_id)
      .await
  }

  pub async fn detach(
    &self,
    content_id: ContentId,
    tag_id: TagId
  ) -> Result<(), ServiceError> {
    self
      .service
      .detach_tag(content_id, tag_id)
      .await
  }
}
