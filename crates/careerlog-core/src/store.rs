use std::cmp::Ordering;
use std::collections::HashMap;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::model::{
    Content, ContentDraft, ContentId, ContentUpdate, CoverLetter, CoverLetterDraft,
    CoverLetterUpdate, RecordId, Tag, TagId,
};
use crate::service::{CoverLetterService, ServiceError, TagService};

const LETTERS_FILE: &str = "letters.data";
const CONTENTS_FILE: &str = "contents.data";
const TAGS_FILE: &str = "tags.data";
const TAG_LINKS_FILE: &str = "tag_links.data";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredContent {
    id: ContentId,
    cover_letter_id: RecordId,
    question: String,
    #[serde(default)]
    answers: Vec<String>,
    #[serde(default)]
    character_limit: Option<u32>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct TagLink {
    content_id: ContentId,
    tag_id: TagId,
}

#[derive(Debug, Default)]
struct Tables {
    letters: Vec<CoverLetter>,
    contents: Vec<StoredContent>,
    tags: Vec<Tag>,
    links: Vec<TagLink>,
    next_letter_id: i64,
    next_content_id: i64,
    next_tag_id: i64,
}

#[derive(Debug, Clone, Copy)]
enum Table {
    Letters,
    Contents,
    Tags,
    Links,
}

#[derive(Debug, Clone)]
struct Paths {
    letters: PathBuf,
    contents: PathBuf,
    tags: PathBuf,
    links: PathBuf,
}

/// Local implementation of the cover letter and tag services.
///
/// Each table is a JSONL file rewritten atomically on every change. An
/// in-memory store keeps the same semantics without touching disk.
#[derive(Debug)]
pub struct DataStore {
    pub data_dir: Option<PathBuf>,
    paths: Option<Paths>,
    tables: Mutex<Tables>,
}

impl DataStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let paths = Paths {
            letters: data_dir.join(LETTERS_FILE),
            contents: data_dir.join(CONTENTS_FILE),
            tags: data_dir.join(TAGS_FILE),
            links: data_dir.join(TAG_LINKS_FILE),
        };

        for path in [&paths.letters, &paths.contents, &paths.tags, &paths.links] {
            if !path.exists() {
                fs::write(path, "")?;
            }
        }

        let letters: Vec<CoverLetter> =
            load_jsonl(&paths.letters).context("failed to load letters.data")?;
        let contents: Vec<StoredContent> =
            load_jsonl(&paths.contents).context("failed to load contents.data")?;
        let tags: Vec<Tag> = load_jsonl(&paths.tags).context("failed to load tags.data")?;
        let links: Vec<TagLink> =
            load_jsonl(&paths.links).context("failed to load tag_links.data")?;

        info!(
            data_dir = %data_dir.display(),
            letters = letters.len(),
            contents = contents.len(),
            tags = tags.len(),
            links = links.len(),
            "opened datastore"
        );

        Ok(Self {
            data_dir: Some(data_dir),
            paths: Some(paths),
            tables: Mutex::new(Tables::seeded(letters, contents, tags, links)),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            data_dir: None,
            paths: None,
            tables: Mutex::new(Tables::seeded(vec![], vec![], vec![], vec![])),
        }
    }

    pub fn letter_count(&self) -> usize {
        self.tables.lock().letters.len()
    }

    pub fn tag_link_count(&self) -> usize {
        self.tables.lock().links.len()
    }

    fn persist(&self, tables: &Tables, which: &[Table]) -> Result<(), ServiceError> {
        let Some(paths) = self.paths.as_ref() else {
            return Ok(());
        };

        for table in which {
            let result = match table {
                Table::Letters => save_jsonl_atomic(&paths.letters, &tables.letters),
                Table::Contents => save_jsonl_atomic(&paths.contents, &tables.contents),
                Table::Tags => save_jsonl_atomic(&paths.tags, &tables.tags),
                Table::Links => save_jsonl_atomic(&paths.links, &tables.links),
            };
            result.map_err(|err| ServiceError::Storage(format!("{err:#}")))?;
        }
        Ok(())
    }
}

impl Tables {
    fn seeded(
        letters: Vec<CoverLetter>,
        contents: Vec<StoredContent>,
        tags: Vec<Tag>,
        links: Vec<TagLink>,
    ) -> Self {
        let next_letter_id = letters.iter().map(|l| l.id).max().unwrap_or(0) + 1;
        let next_content_id = contents.iter().map(|c| c.id).max().unwrap_or(0) + 1;
        let next_tag_id = tags.iter().map(|t| t.id).max().unwrap_or(0) + 1;
        Self {
            letters,
            contents,
            tags,
            links,
            next_letter_id,
            next_content_id,
            next_tag_id,
        }
    }

    fn contents_for(&self, record_id: RecordId) -> Vec<Content> {
        let tags_by_id: HashMap<TagId, &Tag> = self.tags.iter().map(|t| (t.id, t)).collect();

        let mut rows: Vec<&StoredContent> = self
            .contents
            .iter()
            .filter(|c| c.cover_letter_id == record_id)
            .collect();
        rows.sort_by_key(|c| (c.created_at, c.id));

        rows.into_iter()
            .map(|row| Content {
                id: row.id,
                cover_letter_id: row.cover_letter_id,
                question: row.question.clone(),
                answers: row.answers.clone(),
                character_limit: row.character_limit,
                tags: self
                    .links
                    .iter()
                    .filter(|link| link.content_id == row.id)
                    .filter_map(|link| tags_by_id.get(&link.tag_id).map(|tag| (*tag).clone()))
                    .collect(),
                created_at: row.created_at,
            })
            .collect()
    }
}

/// Due date descending with undated rows first, then newest first.
fn remote_order(a: &CoverLetter, b: &CoverLetter) -> Ordering {
    let due = match (a.due_date, b.due_date) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => y.cmp(&x),
    };
    due.then_with(|| b.created_at.cmp(&a.created_at))
        .then_with(|| b.id.cmp(&a.id))
}

#[async_trait]
impl CoverLetterService for DataStore {
    #[tracing::instrument(skip(self))]
    async fn fetch_all_records(&self) -> Result<Vec<CoverLetter>, ServiceError> {
        let tables = self.tables.lock();
        let mut rows = tables.letters.clone();
        rows.sort_by(remote_order);
        for row in &mut rows {
            row.contents.clear();
        }
        debug!(count = rows.len(), "fetched cover letters");
        Ok(rows)
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_contents_with_tags(
        &self,
        record_id: RecordId,
    ) -> Result<Vec<Content>, ServiceError> {
        let tables = self.tables.lock();
        Ok(tables.contents_for(record_id))
    }

    #[tracing::instrument(skip(self, draft), fields(title = %draft.title))]
    async fn insert_record(&self, draft: CoverLetterDraft) -> Result<CoverLetter, ServiceError> {
        let now = Utc::now();
        let mut tables = self.tables.lock();
        let id = tables.next_letter_id;
        tables.next_letter_id += 1;

        let letter = CoverLetter {
            id,
            company: draft.company,
            title: draft.title,
            state: Default::default(),
            is_bookmarked: false,
            due_date: None,
            job_position: draft.job_position,
            memo: None,
            apply_url: None,
            includes_whitespace: false,
            created_at: now,
            updated_at: now,
            contents: vec![],
        };
        tables.letters.push(letter.clone());
        self.persist(&tables, &[Table::Letters])?;
        debug!(id, "inserted cover letter");
        Ok(letter)
    }

    #[tracing::instrument(skip(self, update), fields(id = update.id))]
    async fn update_record(&self, update: CoverLetterUpdate) -> Result<(), ServiceError> {
        let mut tables = self.tables.lock();
        let row = tables
            .letters
            .iter_mut()
            .find(|l| l.id == update.id)
            .ok_or_else(|| ServiceError::not_found("cover letter", update.id))?;

        row.company = update.company;
        row.title = update.title;
        row.state = update.state;
        row.is_bookmarked = update.is_bookmarked;
        row.due_date = update.due_date;
        row.job_position = update.job_position;
        row.memo = update.memo;
        row.apply_url = update.apply_url;
        row.updated_at = update.updated_at;
        row.includes_whitespace = update.includes_whitespace;

        self.persist(&tables, &[Table::Letters])
    }

    #[tracing::instrument(skip(self))]
    async fn delete_record(&self, id: RecordId) -> Result<(), ServiceError> {
        let mut tables = self.tables.lock();
        let before = tables.letters.len();
        tables.letters.retain(|l| l.id != id);
        if tables.letters.len() == before {
            return Err(ServiceError::not_found("cover letter", id));
        }

        let removed: Vec<ContentId> = tables
            .contents
            .iter()
            .filter(|c| c.cover_letter_id == id)
            .map(|c| c.id)
            .collect();
        tables.contents.retain(|c| c.cover_letter_id != id);
        tables.links.retain(|link| !removed.contains(&link.content_id));

        info!(id, contents = removed.len(), "deleted cover letter");
        self.persist(&tables, &[Table::Letters, Table::Contents, Table::Links])
    }

    #[tracing::instrument(skip(self, draft), fields(record = draft.cover_letter_id))]
    async fn insert_content(&self, draft: ContentDraft) -> Result<Content, ServiceError> {
        let now = Utc::now();
        let mut tables = self.tables.lock();
        if !tables.letters.iter().any(|l| l.id == draft.cover_letter_id) {
            return Err(ServiceError::not_found("cover letter", draft.cover_letter_id));
        }

        let id = tables.next_content_id;
        tables.next_content_id += 1;
        let row = StoredContent {
            id,
            cover_letter_id: draft.cover_letter_id,
            question: draft.question,
            answers: draft.answers,
            character_limit: draft.character_limit,
            created_at: now,
        };
        tables.contents.push(row.clone());
        self.persist(&tables, &[Table::Contents])?;

        Ok(Content {
            id,
            cover_letter_id: row.cover_letter_id,
            question: row.question,
            answers: row.answers,
            character_limit: row.character_limit,
            tags: vec![],
            created_at: row.created_at,
        })
    }

    #[tracing::instrument(skip(self, update), fields(id = update.id))]
    async fn update_content(&self, update: ContentUpdate) -> Result<(), ServiceError> {
        let mut tables = self.tables.lock();
        let row = tables
            .contents
            .iter_mut()
            .find(|c| c.id == update.id && c.cover_letter_id == update.cover_letter_id)
            .ok_or_else(|| ServiceError::not_found("content", update.id))?;

        row.question = update.question;
        row.answers = update.answers;
        row.character_limit = update.character_limit;
        self.persist(&tables, &[Table::Contents])
    }

    #[tracing::instrument(skip(self))]
    async fn delete_content(&self, id: ContentId, record_id: RecordId) -> Result<(), ServiceError> {
        let mut tables = self.tables.lock();
        let before = tables.contents.len();
        tables
            .contents
            .retain(|c| !(c.id == id && c.cover_letter_id == record_id));
        if tables.contents.len() == before {
            return Err(ServiceError::not_found("content", id));
        }
        tables.links.retain(|link| link.content_id != id);
        self.persist(&tables, &[Table::Contents, Table::Links])
    }
}

#[async_trait]
impl TagService for DataStore {
    async fn fetch_all_tags(&self) -> Result<Vec<Tag>, ServiceError> {
        let tables = self.tables.lock();
        let mut tags = tables.tags.clone();
        tags.sort_by_key(|t| (t.created_at, t.id));
        Ok(tags)
    }

    #[tracing::instrument(skip(self))]
    async fn insert_tag(&self, name: &str) -> Result<Tag, ServiceError> {
        let now = Utc::now();
        let mut tables = self.tables.lock();
        let id = tables.next_tag_id;
        tables.next_tag_id += 1;
        let tag = Tag {
            id,
            name: name.to_string(),
            created_at: now,
            updated_at: now,
        };
        tables.tags.push(tag.clone());
        self.persist(&tables, &[Table::Tags])?;
        Ok(tag)
    }

    #[tracing::instrument(skip(self))]
    async fn update_tag(&self, id: TagId, name: &str) -> Result<(), ServiceError> {
        let mut tables = self.tables.lock();
        let tag = tables
            .tags
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| ServiceError::not_found("tag", id))?;
        tag.name = name.to_string();
        tag.updated_at = Utc::now();
        self.persist(&tables, &[Table::Tags])
    }

    #[tracing::instrument(skip(self))]
    async fn delete_tag(&self, id: TagId) -> Result<(), ServiceError> {
        let mut tables = self.tables.lock();
        let before = tables.tags.len();
        tables.tags.retain(|t| t.id != id);
        if tables.tags.len() == before {
            return Err(ServiceError::not_found("tag", id));
        }
        tables.links.retain(|link| link.tag_id != id);
        self.persist(&tables, &[Table::Tags, Table::Links])
    }

    #[tracing::instrument(skip(self))]
    async fn attach_tag(&self, content_id: ContentId, tag_id: TagId) -> Result<(), ServiceError> {
        let mut tables = self.tables.lock();
        if !tables.contents.iter().any(|c| c.id == content_id) {
            return Err(ServiceError::not_found("content", content_id));
        }
        if !tables.tags.iter().any(|t| t.id == tag_id) {
            return Err(ServiceError::not_found("tag", tag_id));
        }

        let link = TagLink { content_id, tag_id };
        if tables.links.contains(&link) {
            return Ok(());
        }
        tables.links.push(link);
        self.persist(&tables, &[Table::Links])
    }

    #[tracing::instrument(skip(self))]
    async fn detach_tag(&self, content_id: ContentId, tag_id: TagId) -> Result<(), ServiceError> {
        let mut tables = self.tables.lock();
        tables
            .links
            .retain(|link| !(link.content_id == content_id && link.tag_id == tag_id));
        self.persist(&tables, &[Table::Links])
    }
}

#[tracing::instrument(skip(path))]
fn load_jsonl<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    debug!(file = %path.display(), "loading jsonl");
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);

    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let row: T = serde_json::from_str(trimmed)
            .with_context(|| format!("failed parsing {} line {}", path.display(), idx + 1))?;
        out.push(row);
    }

    debug!(count = out.len(), "loaded rows from jsonl");
    Ok(out)
}

#[tracing::instrument(skip(path, rows))]
fn save_jsonl_atomic<T: Serialize>(path: &Path, rows: &[T]) -> anyhow::Result<()> {
    debug!(file = %path.display(), count = rows.len(), "saving jsonl atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    for row in rows {
        let serialized = serde_json::to_string(row)?;
        writeln!(temp, "{serialized}")?;
    }
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}
