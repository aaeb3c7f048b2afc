use std::collections::{
  BTreeSet,
  HashMap,
  HashSet
};
use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{
  debug,
  error,
  info,
  warn
};

use crate::config::PresenterSettings;
use crate::debounce::Debouncer;
use crate::events::{
  EventSink,
  PresenterEvent
};
use crate::filter::{
  self,
  CategoryFilter,
  FilterState
};
use crate::model::{
  Content,
  ContentDraft,
  ContentId,
  ContentUpdate,
  CoverLetter,
  CoverLetterUpdate,
  RecordEdit,
  RecordId,
  Tag,
  TagId,
  optional_text
};
use crate::mutation::{
  apply_optimistic,
  persist_with_retry
};
use crate::parallel::parallel_map;
use crate::selection::{
  SelectionReason,
  SelectionTracker
};
use crate::service::{
  AuthSession,
  CoverLetterService,
  ServiceError,
  TagService
};
use crate::tags::TagCatalog;
use crate::templates;

#[derive(Debug, Error)]
pub enum PresenterError {
  #[error("presenter used before load()")]
  NotLoaded,

  #[error("not signed in: cannot {action}")]
  NotLoggedIn { action: &'static str },

  #[error("no cover letter with id {0}")]
  UnknownRecord(RecordId),

  #[error(
    "cover letter {record} has no \
     question {content}"
  )]
  UnknownContent {
    record:  RecordId,
    content: ContentId
  },

  #[error("no tag with id {0}")]
  UnknownTag(TagId),

  #[error("tag name cannot be empty")]
  InvalidTagName,

  #[error("a tag named {0:?} already exists")]
  DuplicateTag(String),

  #[error(transparent)]
  Remote(#[from] ServiceError)
}

impl PresenterError {
  /// Text for the user, or `None` for
  /// programming errors that are only
  /// logged.
  pub fn user_message(
    &self
  ) -> Option<String> {
    match self {
      | Self::NotLoaded => None,
      | Self::NotLoggedIn {
        action
      } => Some(format!(
        "Sign in to {action}."
      )),
      | Self::UnknownRecord(_) => Some(
        "That cover letter no longer \
         exists."
          .to_string()
      ),
      | Self::UnknownContent { .. } => {
        Some(
          "That question no longer exists."
            .to_string()
        )
      }
      | Self::UnknownTag(_) => Some(
        "That tag no longer exists."
          .to_string()
      ),
      | Self::InvalidTagName
      | Self::DuplicateTag(_) => {
        Some(capitalize(&self.to_string()))
      }
      | Self::Remote(err) => Some(format!(
        "Something went wrong ({err}). \
         Please try again."
      ))
    }
  }
}

/// Debounce key for free-text edits.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash,
)]
pub enum EditKey {
  Record(RecordId),
  Content(ContentId)
}

/// Collaborators handed to the presenter
/// at composition time.
#[derive(Clone)]
pub struct Services {
  pub letters: Arc<dyn CoverLetterService>,
  pub tags:    Arc<dyn TagService>,
  pub auth:    Arc<dyn AuthSession>
}

/// Owns the authoritative collection and
/// the filter and selection state; every
/// change is pushed out as a
/// [`PresenterEvent`].
///
/// All methods take `&mut self`, so state
/// is only ever touched from one logical
/// context; remote I/O is awaited in
/// between.
/// Latest row to write per record. Debounced
/// saves read it when they run, so a bookmark
/// toggled meanwhile is not written over.
type StagedRows =
  Arc<Mutex<HashMap<RecordId, CoverLetterUpdate>>>;

pub struct ListPresenter {
  services:    Services,
  catalog:     TagCatalog,
  settings:    PresenterSettings,
  events:      EventSink,
  debouncer:   Debouncer<EditKey>,
  staged_rows: StagedRows,
  records:     Option<Vec<CoverLetter>>,
  filter:      FilterState,
  selection:   SelectionTracker
}

impl ListPresenter {
  pub fn new(
    services: Services,
    settings: PresenterSettings
  ) -> (
    Self,
    mpsc::UnboundedReceiver<PresenterEvent>
  ) {
    let (events, rx) = EventSink::channel();
    let presenter = Self {
      catalog: TagCatalog::new(Arc::clone(
        &services.tags
      )),
      debouncer: Debouncer::new(
        settings.debounce_delay
      ),
      services,
      settings,
      events,
      staged_rows: StagedRows::default(),
      records: None,
      filter: FilterState::default(),
      selection: SelectionTracker::default()
    };
    (presenter, rx)
  }

  pub fn is_loaded(&self) -> bool {
    self.records.is_some()
  }

  /// The authoritative collection; empty
  /// before `load`.
  pub fn records(&self) -> &[CoverLetter] {
    self.records.as_deref().unwrap_or_default()
  }

  pub fn record(
    &self,
    id: RecordId
  ) -> Option<&CoverLetter> {
    self.records().iter().find(|r| r.id == id)
  }

  pub fn visible(&self) -> Vec<&CoverLetter> {
    filter::visible(
      self.records(),
      &self.filter
    )
  }

  pub fn filter(&self) -> &FilterState {
    &self.filter
  }

  pub fn selected_id(
    &self
  ) -> Option<RecordId> {
    self.selection.selected()
  }

  pub fn pending_writes(&self) -> usize {
    self.debouncer.pending_len()
  }

  pub fn is_pending(
    &self,
    key: EditKey
  ) -> bool {
    self.debouncer.is_pending(&key)
  }

  /// Fetches the collection, seeding the
  /// onboarding templates into an empty
  /// store, and joins every record's
  /// questions concurrently.
  ///
  /// Signed out, a read-only sample is
  /// shown instead. On failure the last
  /// loaded collection is kept.
  #[tracing::instrument(skip(self))]
  pub async fn load(
    &mut self
  ) -> Result<(), PresenterError> {
    let logged_in =
      self.services.auth.is_logged_in();
    self.events.emit(
      PresenterEvent::AuthStateChanged {
        logged_in
      }
    );

    if !logged_in {
      info!("signed out; showing sample");
      self.debouncer.cancel_all();
      self.staged_rows.lock().clear();
      self.catalog.invalidate();
      self.records =
        Some(templates::signed_out_sample());
      return self
        .publish(
          SelectionReason::SystemAutomatic,
          None
        )
        .await;
    }

    let records = self
      .fetch_collection()
      .await
      .map_err(|err| surface(&self.events, err))?;
    info!(
      count = records.len(),
      "loaded cover letters"
    );
    self.records = Some(records);
    self
      .publish(
        SelectionReason::SystemAutomatic,
        None
      )
      .await
  }

  async fn fetch_collection(
    &self
  ) -> Result<Vec<CoverLetter>, ServiceError> {
    let letters = &self.services.letters;
    let mut records =
      letters.fetch_all_records().await?;

    if records.is_empty()
      && self.settings.seed_templates
    {
      self.seed_templates().await?;
      records =
        letters.fetch_all_records().await?;
    }

    let ids: Vec<RecordId> =
      records.iter().map(|r| r.id).collect();
    let service = Arc::clone(letters);
    let contents =
      parallel_map(ids, move |id| {
        let service = Arc::clone(&service);
        async move {
          service
            .fetch_contents_with_tags(id)
            .await
        }
      })
      .await?;

    for (record, contents) in
      records.iter_mut().zip(contents)
    {
      record.contents = contents;
    }
    Ok(records)
  }

  async fn seed_templates(
    &self
  ) -> Result<(), ServiceError> {
    let letters = &self.services.letters;
    let (writing, managing) = tokio::try_join!(
      letters.insert_record(
        templates::writing_guide_letter()
      ),
      letters.insert_record(
        templates::managing_guide_letter()
      )
    )?;

    let batches: Vec<Vec<ContentDraft>> = vec![
      templates::writing_guide_contents(
        writing.id
      ),
      templates::managing_guide_contents(
        managing.id
      ),
    ];
    let service = Arc::clone(letters);
    // Questions keep their order within a
    // guide; the guides load side by side.
    parallel_map(batches, move |drafts| {
      let service = Arc::clone(&service);
      async move {
        for draft in drafts {
          service.insert_content(draft).await?;
        }
        Ok::<_, ServiceError>(())
      }
    })
    .await?;

    info!("seeded onboarding templates");
    Ok(())
  }

  #[tracing::instrument(skip(self))]
  pub async fn apply_category_filter(
    &mut self,
    category: CategoryFilter
  ) -> Result<(), PresenterError> {
    self.ensure_loaded("apply category filter")?;
    self.filter.category = category;
    self
      .publish(
        SelectionReason::UserInitiated,
        None
      )
      .await
  }

  #[tracing::instrument(skip(self))]
  pub async fn toggle_bookmark_filter(
    &mut self
  ) -> Result<(), PresenterError> {
    self
      .ensure_loaded("toggle bookmark filter")?;
    self.filter.bookmarked_only =
      !self.filter.bookmarked_only;
    self
      .publish(
        SelectionReason::UserInitiated,
        None
      )
      .await
  }

  #[tracing::instrument(skip(self, tags))]
  pub async fn set_selected_tags<I, S>(
    &mut self,
    tags: I
  ) -> Result<(), PresenterError>
  where
    I: IntoIterator<Item = S>,
    S: Into<String>
  {
    self.ensure_loaded("set selected tags")?;
    self.filter.tags =
      tags.into_iter().map(Into::<String>::into).collect();
    self
      .publish(
        SelectionReason::UserInitiated,
        None
      )
      .await
  }

  /// Search-as-you-type never moves the
  /// selection.
  #[tracing::instrument(skip(self))]
  pub async fn set_search_text(
    &mut self,
    query: &str
  ) -> Result<(), PresenterError> {
    self.ensure_loaded("set search text")?;
    self.filter.query = query.to_string();
    self
      .publish(SelectionReason::None, None)
      .await
  }

  #[tracing::instrument(skip(self))]
  pub async fn select(
    &mut self,
    id: RecordId
  ) -> Result<(), PresenterError> {
    self.ensure_loaded("select")?;
    if self.record(id).is_none() {
      return Err(surface(
        &self.events,
        PresenterError::UnknownRecord(id)
      ));
    }
    self
      .publish(
        SelectionReason::UserInitiated,
        Some(id)
      )
      .await
  }

  /// Flips the bookmark locally, then
  /// writes it; a failed write flips it
  /// back. Returns the new flag.
  #[tracing::instrument(skip(self))]
  pub async fn toggle_bookmark(
    &mut self,
    id: RecordId
  ) -> Result<bool, PresenterError> {
    let index =
      self.writable_position("bookmark", id)?;
    let records = self
      .records
      .as_mut()
      .ok_or_else(|| not_loaded("bookmark"))?;
    let service =
      Arc::clone(&self.services.letters);
    let events = &self.events;
    let staged = &self.staged_rows;

    let flip = |row: &mut CoverLetter| {
      row.is_bookmarked = !row.is_bookmarked;
    };
    let result = apply_optimistic(
      &mut records[index],
      flip,
      flip,
      |row| {
        restage(staged, row);
        events.row_changed(row);
      },
      |row| {
        let update =
          CoverLetterUpdate::from(row);
        let bookmarked = update.is_bookmarked;
        async move {
          service.update_record(update).await?;
          Ok(bookmarked)
        }
      }
    )
    .await;

    let bookmarked = result
      .map_err(|err| surface(&self.events, err))?;
    debug!(bookmarked, "bookmark saved");

    if self.filter.bookmarked_only {
      self
        .publish(SelectionReason::None, None)
        .await?;
    }
    Ok(bookmarked)
  }

  /// Removes a record once the remote
  /// delete is confirmed. Deleting a record
  /// that is already gone succeeds.
  #[tracing::instrument(skip(self))]
  pub async fn delete(
    &mut self,
    id: RecordId
  ) -> Result<(), PresenterError> {
    self.ensure_loaded("delete")?;
    self.require_login("delete")?;
    let Some(index) = self.index_of(id) else {
      debug!("record already absent");
      return Ok(());
    };

    match self
      .services
      .letters
      .delete_record(id)
      .await
    {
      | Ok(()) => {}
      | Err(err) if err.is_not_found() => {
        debug!("record already deleted remotely");
      }
      | Err(err) => {
        return Err(surface(&self.events, err));
      }
    }

    let records = self
      .records
      .as_mut()
      .ok_or_else(|| not_loaded("delete"))?;
    let removed = records.remove(index);
    let content_ids: HashSet<ContentId> = removed
      .contents
      .iter()
      .map(|c| c.id)
      .collect();
    let cancelled =
      self.debouncer.cancel_where(|key| match key {
        | EditKey::Record(rid) => *rid == id,
        | EditKey::Content(cid) => {
          content_ids.contains(cid)
        }
      });
    if cancelled > 0 {
      debug!(cancelled, "dropped pending writes");
    }
    self.staged_rows.lock().remove(&id);

    self.selection.forget(id);
    info!("deleted cover letter");
    self
      .publish(
        SelectionReason::SystemAutomatic,
        None
      )
      .await
  }

  /// Replaces a record's metadata locally
  /// and schedules a debounced save. Its
  /// questions are kept as loaded; they
  /// change through the content methods.
  /// Blank optional text is stored as
  /// `None`.
  ///
  /// A failed save is reported but never
  /// rolled back.
  #[tracing::instrument(skip(self, record), fields(id = record.id))]
  pub async fn update_record(
    &mut self,
    mut record: CoverLetter
  ) -> Result<(), PresenterError> {
    let id = record.id;
    let index =
      self.writable_position("edit", id)?;
    let records = self
      .records
      .as_mut()
      .ok_or_else(|| not_loaded("edit"))?;

    record.normalize();
    record.updated_at = Utc::now();
    record.contents = std::mem::take(
      &mut records[index].contents
    );
    self
      .staged_rows
      .lock()
      .insert(id, CoverLetterUpdate::from(&record));
    records[index] = record;

    let service =
      Arc::clone(&self.services.letters);
    let staged = Arc::clone(&self.staged_rows);
    self.schedule_write(
      EditKey::Record(id),
      move || {
        let service = Arc::clone(&service);
        let update =
          staged.lock().get(&id).cloned();
        async move {
          match update {
            | Some(update) => {
              service.update_record(update).await
            }
            | None => Ok(())
          }
        }
      }
    );

    self.selection.remember(id);
    self
      .publish(
        SelectionReason::SystemAutomatic,
        None
      )
      .await
  }

  /// Applies a tri-state patch and saves it
  /// like [`Self::update_record`].
  pub async fn edit_record(
    &mut self,
    id: RecordId,
    edit: RecordEdit
  ) -> Result<(), PresenterError> {
    self.ensure_loaded("edit")?;
    if edit.is_empty() {
      return Ok(());
    }
    let Some(mut record) =
      self.record(id).cloned()
    else {
      return Err(surface(
        &self.events,
        PresenterError::UnknownRecord(id)
      ));
    };
    edit.apply_to(&mut record);
    self.update_record(record).await
  }

  /// Creates a blank record remotely and
  /// selects it.
  #[tracing::instrument(skip(self))]
  pub async fn insert_default(
    &mut self
  ) -> Result<RecordId, PresenterError> {
    self.ensure_loaded("add")?;
    self.require_login("add a cover letter")?;

    let letter = self
      .services
      .letters
      .insert_record(templates::blank_letter())
      .await
      .map_err(|err| surface(&self.events, err))?;
    let id = letter.id;

    // Undated and newest, so it sorts first
    // remotely as well.
    self
      .records
      .as_mut()
      .ok_or_else(|| not_loaded("add"))?
      .insert(0, letter);
    self.selection.remember(id);
    info!(id, "inserted cover letter");

    self
      .publish(
        SelectionReason::SystemAutomatic,
        None
      )
      .await?;
    Ok(id)
  }

  #[tracing::instrument(skip(self))]
  pub async fn add_content(
    &mut self,
    record_id: RecordId,
    question: &str
  ) -> Result<Content, PresenterError> {
    self.writable_position(
      "add a question",
      record_id
    )?;

    let content = self
      .services
      .letters
      .insert_content(ContentDraft::new(
        record_id,
        question.trim(),
        &[]
      ))
      .await
      .map_err(|err| surface(&self.events, err))?;

    // Re-resolve: the record may have been
    // removed while the insert was in
    // flight.
    let Some(record) = self
      .records
      .as_mut()
      .and_then(|records| {
        records
          .iter_mut()
          .find(|r| r.id == record_id)
      })
    else {
      return Err(surface(
        &self.events,
        PresenterError::UnknownRecord(
          record_id
        )
      ));
    };
    record.contents.push(content.clone());
    self.events.row_changed(record);
    self.republish_if_filtered().await?;
    Ok(content)
  }

  /// Replaces a question's text and answers
  /// locally and schedules a debounced save
  /// keyed by the question.
  #[tracing::instrument(skip(self, content), fields(id = content.id))]
  pub async fn update_content(
    &mut self,
    record_id: RecordId,
    mut content: Content
  ) -> Result<(), PresenterError> {
    let index = self.writable_position(
      "edit a question",
      record_id
    )?;
    let records = self
      .records
      .as_mut()
      .ok_or_else(|| not_loaded("edit"))?;
    let record = &mut records[index];
    let content_id = content.id;

    let Some(slot) =
      record.content_mut(content_id)
    else {
      return Err(surface(
        &self.events,
        PresenterError::UnknownContent {
          record:  record_id,
          content: content_id
        }
      ));
    };
    content.cover_letter_id = record_id;
    content.tags = std::mem::take(&mut slot.tags);
    let update = ContentUpdate::from(&content);
    *slot = content;
    self.events.row_changed(record);

    let service =
      Arc::clone(&self.services.letters);
    self.schedule_write(
      EditKey::Content(content_id),
      move || {
        let service = Arc::clone(&service);
        let update = update.clone();
        async move {
          service.update_content(update).await
        }
      }
    );

    self.republish_if_filtered().await
  }

  #[tracing::instrument(skip(self))]
  pub async fn delete_content(
    &mut self,
    record_id: RecordId,
    content_id: ContentId
  ) -> Result<(), PresenterError> {
    let index = self.writable_position(
      "delete a question",
      record_id
    )?;
    let present = self
      .records()
      .get(index)
      .is_some_and(|r| {
        r.content(content_id).is_some()
      });
    if !present {
      debug!("question already absent");
      return Ok(());
    }

    match self
      .services
      .letters
      .delete_content(content_id, record_id)
      .await
    {
      | Ok(()) => {}
      | Err(err) if err.is_not_found() => {
        debug!(
          "question already deleted remotely"
        );
      }
      | Err(err) => {
        return Err(surface(&self.events, err));
      }
    }
    self
      .debouncer
      .cancel(&EditKey::Content(content_id));

    if let Some(record) = self
      .records
      .as_mut()
      .and_then(|records| {
        records
          .iter_mut()
          .find(|r| r.id == record_id)
      })
    {
      record
        .contents
        .retain(|c| c.id != content_id);
      self.events.row_changed(record);
    }
    self.republish_if_filtered().await
  }

  #[tracing::instrument(skip(self))]
  pub async fn attach_tag(
    &mut self,
    record_id: RecordId,
    content_id: ContentId,
    tag_id: TagId
  ) -> Result<(), PresenterError> {
    self.content_position(
      "tag a question",
      record_id,
      content_id
    )?;
    let tag = self
      .catalog
      .find(tag_id)
      .await
      .map_err(|err| surface(&self.events, err))?
      .ok_or_else(|| {
        surface(
          &self.events,
          PresenterError::UnknownTag(tag_id)
        )
      })?;

    self
      .catalog
      .attach(content_id, tag_id)
      .await
      .map_err(|err| surface(&self.events, err))?;

    self.update_content_locally(
      record_id,
      content_id,
      |content| {
        if !content
          .tags
          .iter()
          .any(|t| t.id == tag.id)
        {
          content.tags.push(tag);
        }
      }
    );
    self
      .publish(SelectionReason::None, None)
      .await
  }

  #[tracing::instrument(skip(self))]
  pub async fn detach_tag(
    &mut self,
    record_id: RecordId,
    content_id: ContentId,
    tag_id: TagId
  ) -> Result<(), PresenterError> {
    self.content_position(
      "untag a question",
      record_id,
      content_id
    )?;
    self
      .catalog
      .detach(content_id, tag_id)
      .await
      .map_err(|err| surface(&self.events, err))?;

    self.update_content_locally(
      record_id,
      content_id,
      |content| {
        content.tags.retain(|t| t.id != tag_id)
      }
    );
    self
      .publish(SelectionReason::None, None)
      .await
  }

  /// Every tag, from the cache unless
  /// `force_refresh`. Signed out there are
  /// none.
  pub async fn tags(
    &self,
    force_refresh: bool
  ) -> Result<Vec<Tag>, PresenterError> {
    if !self.services.auth.is_logged_in() {
      return Ok(vec![]);
    }
    self
      .catalog
      .fetch_all(force_refresh)
      .await
      .map_err(|err| surface(&self.events, err))
  }

  #[tracing::instrument(skip(self))]
  pub async fn create_tag(
    &mut self,
    name: &str
  ) -> Result<Tag, PresenterError> {
    self.require_login("create a tag")?;
    let name = self.checked_tag_name(name, None).await?;
    let tag = self
      .catalog
      .insert(&name)
      .await
      .map_err(|err| surface(&self.events, err))?;
    info!(id = tag.id, "created tag");
    Ok(tag)
  }

  /// Renames a tag; every question that
  /// carries it and the tag filter follow
  /// the new name.
  #[tracing::instrument(skip(self))]
  pub async fn rename_tag(
    &mut self,
    id: TagId,
    name: &str
  ) -> Result<(), PresenterError> {
    self.require_login("rename a tag")?;
    let old = self.known_tag(id).await?;
    let name = self
      .checked_tag_name(name, Some(id))
      .await?;
    self
      .catalog
      .rename(id, &name)
      .await
      .map_err(|err| surface(&self.events, err))?;

    let touched = self.retag_locally(id, |tag| {
      tag.name = name.clone();
      tag.updated_at = Utc::now();
      true
    });
    if self.filter.tags.remove(&old.name) {
      self.filter.tags.insert(name.clone());
    }
    if touched > 0 {
      self
        .publish(SelectionReason::None, None)
        .await?;
    }
    Ok(())
  }

  /// Deletes a tag and drops it from every
  /// question and from the tag filter.
  #[tracing::instrument(skip(self))]
  pub async fn delete_tag(
    &mut self,
    id: TagId
  ) -> Result<(), PresenterError> {
    self.require_login("delete a tag")?;
    let old = self.known_tag(id).await?;
    self
      .catalog
      .delete(id)
      .await
      .map_err(|err| surface(&self.events, err))?;

    let touched =
      self.retag_locally(id, |_| false);
    let filter_changed =
      self.filter.tags.remove(&old.name);
    if filter_changed {
      self
        .publish(
          SelectionReason::SystemAutomatic,
          None
        )
        .await?;
    } else if touched > 0 {
      self
        .publish(SelectionReason::None, None)
        .await?;
    }
    Ok(())
  }

  /// Writes pending debounced edits now,
  /// then signs out and shows the sample.
  #[tracing::instrument(skip(self))]
  pub async fn sign_out(
    &mut self
  ) -> Result<(), PresenterError> {
    self.flush_pending().await;
    self
      .services
      .auth
      .sign_out()
      .await
      .map_err(|err| surface(&self.events, err))?;
    info!("signed out");
    self.load().await
  }

  /// Called after the session changed
  /// elsewhere, e.g. a successful sign-in.
  pub async fn auth_changed(
    &mut self
  ) -> Result<(), PresenterError> {
    self.load().await
  }

  /// Runs every pending debounced write
  /// immediately.
  pub async fn flush_pending(&self) -> usize {
    let flushed = self.debouncer.flush().await;
    if flushed > 0 {
      info!(flushed, "flushed pending writes");
    }
    flushed
  }

  async fn publish(
    &mut self,
    reason: SelectionReason,
    target: Option<RecordId>
  ) -> Result<(), PresenterError> {
    let records = self
      .records
      .as_ref()
      .ok_or_else(|| not_loaded("publish"))?;

    let ids = if records.len()
      >= self.settings.background_filter_threshold
    {
      let snapshot = Arc::new(records.clone());
      filter::visible_ids_in_background(
        snapshot,
        self.filter.clone()
      )
      .await
      .map_err(ServiceError::from)?
    } else {
      filter::visible_ids(
        records,
        &self.filter
      )
    };

    let selection =
      self.selection.resolve(reason, target, &ids);

    let wanted: HashSet<RecordId> =
      ids.iter().copied().collect();
    let items: Vec<CoverLetter> = self
      .records()
      .iter()
      .filter(|r| wanted.contains(&r.id))
      .cloned()
      .collect();
    debug!(
      ?reason,
      visible = items.len(),
      "publishing visible set"
    );
    self.events.emit(
      PresenterEvent::VisibleSetChanged {
        items,
        selection
      }
    );
    Ok(())
  }

  /// Content edits can change what a search
  /// or tag filter matches.
  async fn republish_if_filtered(
    &mut self
  ) -> Result<(), PresenterError> {
    if self.filter.is_empty() {
      return Ok(());
    }
    self
      .publish(SelectionReason::None, None)
      .await
  }

  fn schedule_write<W, Fut>(
    &self,
    key: EditKey,
    write: W
  ) where
    W: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), ServiceError>>
      + Send
      + 'static
  {
    let retry = self.settings.retry;
    let events = self.events.clone();
    self.debouncer.schedule(key, async move {
      if let Err(err) =
        persist_with_retry(retry, write).await
      {
        warn!(
          ?key,
          error = %err,
          "debounced write failed; keeping \
           local edit"
        );
        events.failed(format!(
          "Your changes could not be saved \
           ({err})."
        ));
      }
    });
  }

  fn ensure_loaded(
    &self,
    operation: &'static str
  ) -> Result<(), PresenterError> {
    if self.records.is_none() {
      return Err(not_loaded(operation));
    }
    Ok(())
  }

  fn require_login(
    &self,
    action: &'static str
  ) -> Result<(), PresenterError> {
    if self.services.auth.is_logged_in() {
      return Ok(());
    }
    Err(surface(
      &self.events,
      PresenterError::NotLoggedIn { action }
    ))
  }

  fn index_of(
    &self,
    id: RecordId
  ) -> Option<usize> {
    self.records().iter().position(|r| r.id == id)
  }

  /// Loaded, signed in and `id` present.
  fn writable_position(
    &self,
    action: &'static str,
    id: RecordId
  ) -> Result<usize, PresenterError> {
    self.ensure_loaded(action)?;
    self.require_login(action)?;
    self.index_of(id).ok_or_else(|| {
      surface(
        &self.events,
        PresenterError::UnknownRecord(id)
      )
    })
  }

  fn content_position(
    &self,
    action: &'static str,
    record_id: RecordId,
    content_id: ContentId
  ) -> Result<usize, PresenterError> {
    let index =
      self.writable_position(action, record_id)?;
    let present = self
      .records()
      .get(index)
      .is_some_and(|r| {
        r.content(content_id).is_some()
      });
    if !present {
      return Err(surface(
        &self.events,
        PresenterError::UnknownContent {
          record:  record_id,
          content: content_id
        }
      ));
    }
    Ok(index)
  }

  fn update_content_locally(
    &mut self,
    record_id: RecordId,
    content_id: ContentId,
    change: impl FnOnce(&mut Content)
  ) {
    let Some(record) = self
      .records
      .as_mut()
      .and_then(|records| {
        records
          .iter_mut()
          .find(|r| r.id == record_id)
      })
    else {
      return;
    };
    if let Some(content) =
      record.content_mut(content_id)
    {
      change(content);
      self.events.row_changed(record);
    }
  }

  /// Applies `keep` to every reference of
  /// tag `id`; returning false drops the
  /// reference. Returns how many records
  /// changed.
  fn retag_locally(
    &mut self,
    id: TagId,
    mut keep: impl FnMut(&mut Tag) -> bool
  ) -> usize {
    let Some(records) = self.records.as_mut()
    else {
      return 0;
    };
    let mut touched = 0;
    for record in records.iter_mut() {
      let mut changed = false;
      for content in &mut record.contents {
        let before = content.tags.len();
        let mut hit = false;
        content.tags.retain_mut(|tag| {
          if tag.id != id {
            return true;
          }
          hit = true;
          keep(tag)
        });
        changed |=
          hit || content.tags.len() != before;
      }
      if changed {
        touched += 1;
        self.events.row_changed(record);
      }
    }
    touched
  }

  async fn known_tag(
    &self,
    id: TagId
  ) -> Result<Tag, PresenterError> {
    self
      .catalog
      .find(id)
      .await
      .map_err(|err| surface(&self.events, err))?
      .ok_or_else(|| {
        surface(
          &self.events,
          PresenterError::UnknownTag(id)
        )
      })
  }

  /// Trimmed, non-empty and unique by
  /// case-insensitive name, ignoring the
  /// tag being renamed.
  async fn checked_tag_name(
    &self,
    raw: &str,
    renaming: Option<TagId>
  ) -> Result<String, PresenterError> {
    let Some(name) = optional_text(raw) else {
      return Err(surface(
        &self.events,
        PresenterError::InvalidTagName
      ));
    };
    let existing = self
      .catalog
      .fetch_all(false)
      .await
      .map_err(|err| surface(&self.events, err))?;
    let taken = existing.iter().any(|tag| {
      Some(tag.id) != renaming
        && tag.name.to_lowercase()
          == name.to_lowercase()
    });
    if taken {
      return Err(surface(
        &self.events,
        PresenterError::DuplicateTag(name)
      ));
    }
    Ok(name)
  }
}

fn not_loaded(
  operation: &'static str
) -> PresenterError {
  error!(
    operation,
    "presenter used before load()"
  );
  PresenterError::NotLoaded
}

/// Logs a user-facing failure and pushes it
/// to the view.
fn surface(
  events: &EventSink,
  err: impl Into<PresenterError>
) -> PresenterError {
  let err = err.into();
  if let Some(message) = err.user_message() {
    warn!(error = %err, "operation failed");
    events.failed(message);
  }
  err
}

/// Refreshes the staged row for a record
/// that has a save queued or running.
fn restage(
  staged: &Mutex<HashMap<RecordId, CoverLetterUpdate>>,
  row: &CoverLetter
) {
  if let Some(update) =
    staged.lock().get_mut(&row.id)
  {
    *update = CoverLetterUpdate::from(row);
  }
}

fn capitalize(text: &str) -> String {
  let mut chars = text.chars();
  match chars.next() {
    | Some(first) => {
      first.to_uppercase().chain(chars).collect()
    }
    | None => String::new()
  }
}

/// Tag names present anywhere in the
/// collection, for filter pickers.
pub fn tag_names_in_use(
  records: &[CoverLetter]
) -> BTreeSet<String> {
  records
    .iter()
    .flat_map(|r| r.contents.iter())
    .flat_map(|c| c.tags.iter())
    .map(|t| t.name.clone())
    .collect()
}
