use std::sync::atomic::{
  AtomicBool,
  Ordering
};

use async_trait::async_trait;
use thiserror::Error;
use tokio::task::JoinError;

use crate::model::{
  Content,
  ContentDraft,
  ContentId,
  ContentUpdate,
  CoverLetter,
  CoverLetterDraft,
  CoverLetterUpdate,
  RecordId,
  Tag,
  TagId
};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
  #[error("network unreachable: {0}")]
  Transport(String),

  #[error(
    "server responded with {status}: \
     {message}"
  )]
  Server {
    status:  u16,
    message: String
  },

  #[error("{entity} {id} not found")]
  NotFound {
    entity: &'static str,
    id:     i64
  },

  #[error("storage failure: {0}")]
  Storage(String),

  #[error("background task failed: {0}")]
  Join(String)
}

impl ServiceError {
  pub fn not_found(
    entity: &'static str,
    id: i64
  ) -> Self {
    Self::NotFound {
      entity,
      id
    }
  }

  pub fn is_not_found(&self) -> bool {
    matches!(self, Self::NotFound { .. })
  }

  /// Transport failures, throttling and
  /// 5xx responses may succeed later.
  pub fn is_retryable(&self) -> bool {
    match self {
      | Self::Transport(_) => true,
      | Self::Server {
        status,
        ..
      } => *status == 429 || *status >= 500,
      | _ => false
    }
  }
}

impl From<JoinError> for ServiceError {
  fn from(err: JoinError) -> Self {
    Self::Join(err.to_string())
  }
}

/// Remote store for cover letters and
/// their questions.
///
/// `fetch_all_records` returns rows
/// ordered by due date descending, then
/// creation time descending. Returned
/// records carry no contents; use
/// `fetch_contents_with_tags` per record.
#[async_trait]
pub trait CoverLetterService:
  Send + Sync
{
  async fn fetch_all_records(
    &self
  ) -> Result<Vec<CoverLetter>, ServiceError>;

  async fn fetch_contents_with_tags(
    &self,
    record_id: RecordId
  ) -> Result<Vec<Content>, ServiceError>;

  async fn insert_record(
    &self,
    draft: CoverLetterDraft
  ) -> Result<CoverLetter, ServiceError>;

  async fn update_record(
    &self,
    update: CoverLetterUpdate
  ) -> Result<(), ServiceError>;

  async fn delete_record(
    &self,
    id: RecordId
  ) -> Result<(), ServiceError>;

  async fn insert_content(
    &self,
    draft: ContentDraft
  ) -> Result<Content, ServiceError>;

  async fn update_content(
    &self,
    update: ContentUpdate
  ) -> Result<(), ServiceError>;

  async fn delete_content(
    &self,
    id: ContentId,
    record_id: RecordId
  ) -> Result<(), ServiceError>;
}

#[async_trait]
pub trait TagService: Send + Sync {
  /// Ordered by creation time ascending.
  async fn fetch_all_tags(
    &self
  ) -> Result<Vec<Tag>, ServiceError>;

  async fn insert_tag(
    &self,
    name: &str
  ) -> Result<Tag, ServiceError>;

  async fn update_tag(
    &self,
    id: TagId,
    name: &str
  ) -> Result<(), ServiceError>;

  async fn delete_tag(
    &self,
    id: TagId
  ) -> Result<(), ServiceError>;

  async fn attach_tag(
    &self,
    content_id: ContentId,
    tag_id: TagId
  ) -> Result<(), ServiceError>;

  async fn detach_tag(
    &self,
    content_id: ContentId,
    tag_id: TagId
  ) -> Result<(), ServiceError>;
}

#[async_trait]
pub trait AuthSession: Send + Sync {
  fn is_logged_in(&self) -> bool;

  async fn sign_out(
    &self
  ) -> Result<(), ServiceError>;
}

/// Session for a local data store: no
/// identity provider, just a flag.
#[derive(Debug)]
pub struct LocalSession {
  signed_in: AtomicBool
}

impl LocalSession {
  pub fn signed_in() -> Self {
    Self {
      signed_in: AtomicBool::new(true)
    }
  }

  pub fn signed_out() -> Self {
    Self {
      signed_in: AtomicBool::new(false)
    }
  }

  pub fn sign_in(&self) {
    self
      .signed_in
      .store(true, Ordering::SeqCst);
  }
}

#[async_trait]
impl AuthSession for LocalSession {
  fn is_logged_in(&self) -> bool {
    self.signed_in.load(Ordering::SeqCst)
  }

  async fn sign_out(
    &self
  ) -> Result<(), ServiceError> {
    self
      .signed_in
      .store(false, Ordering::SeqCst);
    Ok(())
  }
}
