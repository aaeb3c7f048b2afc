use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type RecordId = i64;
pub type ContentId = i64;
pub type TagId = i64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[serde(rename_all = "lowercase")]
pub enum CoverLetterState {
    #[default]
    #[serde(rename = "unwrite")]
    Unwritten,
    Draft,
    Submitted,
    Passed,
    Failed,
}

impl CoverLetterState {
    pub const ALL: [CoverLetterState; 5] = [
        CoverLetterState::Unwritten,
        CoverLetterState::Draft,
        CoverLetterState::Submitted,
        CoverLetterState::Passed,
        CoverLetterState::Failed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CoverLetterState::Unwritten => "unwrite",
            CoverLetterState::Draft => "draft",
            CoverLetterState::Submitted => "submitted",
            CoverLetterState::Passed => "passed",
            CoverLetterState::Failed => "failed",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CoverLetterState::Unwritten => "Not started",
            CoverLetterState::Draft => "Drafting",
            CoverLetterState::Submitted => "Submitted",
            CoverLetterState::Passed => "Passed",
            CoverLetterState::Failed => "Rejected",
        }
    }
}

impl fmt::Display for CoverLetterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for CoverLetterState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unwrite" | "unwritten" | "new" => Ok(CoverLetterState::Unwritten),
            "draft" | "drafting" => Ok(CoverLetterState::Draft),
            "submitted" => Ok(CoverLetterState::Submitted),
            "passed" => Ok(CoverLetterState::Passed),
            "failed" | "rejected" => Ok(CoverLetterState::Failed),
            other => Err(anyhow!("unknown cover letter state: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Tag {
    pub id: TagId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A question with its answers. Belongs to exactly one cover letter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Content {
    pub id: ContentId,
    pub cover_letter_id: RecordId,
    pub question: String,
    #[serde(default)]
    pub answers: Vec<String>,
    #[serde(default)]
    pub character_limit: Option<u32>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    pub created_at: DateTime<Utc>,
}

impl Content {
    pub fn has_tag_named(&self, name: &str) -> bool {
        self.tags.iter().any(|tag| tag.name == name)
    }
}

/// Optional text fields follow one convention: `None` is absent, and an
/// empty or whitespace-only value is never stored (see [`optional_text`]).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CoverLetter {
    pub id: RecordId,

    #[serde(default)]
    pub company: Option<String>,

    pub title: String,

    #[serde(default)]
    pub state: CoverLetterState,

    #[serde(default)]
    pub is_bookmarked: bool,

    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,

    #[serde(default)]
    pub job_position: Option<String>,

    #[serde(default)]
    pub memo: Option<String>,

    #[serde(default)]
    pub apply_url: Option<String>,

    #[serde(default)]
    pub includes_whitespace: bool,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    #[serde(default, skip_serializing)]
    pub contents: Vec<Content>,
}

impl CoverLetter {
    pub fn company_name(&self) -> &str {
        self.company.as_deref().unwrap_or_default()
    }

    /// Collapses blank optional text to `None`, trimming the rest.
    pub fn normalize(&mut self) {
        for field in [
            &mut self.company,
            &mut self.job_position,
            &mut self.memo,
            &mut self.apply_url,
        ] {
            *field = field.as_deref().and_then(optional_text);
        }
    }

    pub fn content(&self, id: ContentId) -> Option<&Content> {
        self.contents.iter().find(|content| content.id == id)
    }

    pub fn content_mut(&mut self, id: ContentId) -> Option<&mut Content> {
        self.contents.iter_mut().find(|content| content.id == id)
    }

    pub fn tag_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .contents
            .iter()
            .flat_map(|content| content.tags.iter().map(|tag| tag.name.as_str()))
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CoverLetterDraft {
    pub company: Option<String>,
    pub title: String,
    pub job_position: Option<String>,
}

impl CoverLetterDraft {
    pub fn new(company: &str, title: &str, job_position: &str) -> Self {
        Self {
            company: optional_text(company),
            title: title.trim().to_string(),
            job_position: optional_text(job_position),
        }
    }
}

/// Full-row update sent to the data service. Built from the local record so
/// the last local state always wins.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CoverLetterUpdate {
    pub id: RecordId,
    pub company: Option<String>,
    pub title: String,
    pub state: CoverLetterState,
    pub is_bookmarked: bool,
    pub due_date: Option<DateTime<Utc>>,
    pub job_position: Option<String>,
    pub memo: Option<String>,
    pub apply_url: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub includes_whitespace: bool,
}

impl From<&CoverLetter> for CoverLetterUpdate {
    fn from(letter: &CoverLetter) -> Self {
        Self {
            id: letter.id,
            company: letter.company.clone(),
            title: letter.title.clone(),
            state: letter.state,
            is_bookmarked: letter.is_bookmarked,
            due_date: letter.due_date,
            job_position: letter.job_position.clone(),
            memo: letter.memo.clone(),
            apply_url: letter.apply_url.clone(),
            updated_at: letter.updated_at,
            includes_whitespace: letter.includes_whitespace,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentDraft {
    pub cover_letter_id: RecordId,
    pub question: String,
    #[serde(default)]
    pub answers: Vec<String>,
    #[serde(default)]
    pub character_limit: Option<u32>,
}

impl ContentDraft {
    pub fn new(cover_letter_id: RecordId, question: &str, answers: &[&str]) -> Self {
        Self {
            cover_letter_id,
            question: question.to_string(),
            answers: answers.iter().map(ToString::to_string).collect(),
            character_limit: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentUpdate {
    pub id: ContentId,
    pub cover_letter_id: RecordId,
    pub question: String,
    pub answers: Vec<String>,
    pub character_limit: Option<u32>,
}

impl From<&Content> for ContentUpdate {
    fn from(content: &Content) -> Self {
        Self {
            id: content.id,
            cover_letter_id: content.cover_letter_id,
            question: content.question.clone(),
            answers: content.answers.clone(),
            character_limit: content.character_limit,
        }
    }
}

/// Partial edit of a record's metadata.
///
/// Outer `None` leaves a field alone, `Some(None)` clears it and
/// `Some(Some(v))` sets it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordEdit {
    pub title: Option<String>,
    pub company: Option<Option<String>>,
    pub job_position: Option<Option<String>>,
    pub memo: Option<Option<String>>,
    pub apply_url: Option<Option<String>>,
    pub state: Option<CoverLetterState>,
    pub due_date: Option<Option<DateTime<Utc>>>,
    pub includes_whitespace: Option<bool>,
}

impl RecordEdit {
    pub fn is_empty(&self) -> bool {
        *self == RecordEdit::default()
    }

    pub fn apply_to(self, letter: &mut CoverLetter) {
        if let Some(title) = self.title {
            letter.title = title;
        }
        if let Some(company) = self.company {
            letter.company = company.as_deref().and_then(optional_text);
        }
        if let Some(job_position) = self.job_position {
            letter.job_position = job_position.as_deref().and_then(optional_text);
        }
        if let Some(memo) = self.memo {
            letter.memo = memo.as_deref().and_then(optional_text);
        }
        if let Some(apply_url) = self.apply_url {
            letter.apply_url = apply_url.as_deref().and_then(optional_text);
        }
        if let Some(state) = self.state {
            letter.state = state;
        }
        if let Some(due_date) = self.due_date {
            letter.due_date = due_date;
        }
        if let Some(includes_whitespace) = self.includes_whitespace {
            letter.includes_whitespace = includes_whitespace;
        }
    }
}

pub fn optional_text(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
