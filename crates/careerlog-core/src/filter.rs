use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::task::JoinError;
use tracing::trace;

use crate::model::{
  CoverLetter,
  CoverLetterState,
  RecordId
};

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Default,
)]
pub enum CategoryFilter {
  #[default]
  All,
  State(CoverLetterState)
}

impl CategoryFilter {
  pub fn matches(
    &self,
    letter: &CoverLetter
  ) -> bool {
    match self {
      | CategoryFilter::All => true,
      | CategoryFilter::State(state) => {
        letter.state == *state
      }
    }
  }

  pub fn label(&self) -> &'static str {
    match self {
      | CategoryFilter::All => "All",
      | CategoryFilter::State(state) => {
        state.label()
      }
    }
  }
}

/// Presentation-only filter state. None
/// of it mutates records.
#[derive(
  Debug, Clone, Default, PartialEq, Eq,
)]
pub struct FilterState {
  pub category:        CategoryFilter,
  pub bookmarked_only: bool,
  pub tags:            BTreeSet<String>,
  pub query:           String
}

impl FilterState {
  pub fn is_empty(&self) -> bool {
    self.category == CategoryFilter::All
      && !self.bookmarked_only
      && self.tags.is_empty()
      && normalized_query(&self.query)
        .is_none()
  }

  /// Stages run cheapest first: category,
  /// bookmark, tags, then text.
  pub fn matches(
    &self,
    letter: &CoverLetter
  ) -> bool {
    self.matcher().matches(letter)
  }

  fn matcher(&self) -> Matcher<'_> {
    Matcher {
      state: self,
      query: normalized_query(&self.query)
    }
  }
}

struct Matcher<'a> {
  state: &'a FilterState,
  query: Option<String>
}

impl Matcher<'_> {
  fn matches(
    &self,
    letter: &CoverLetter
  ) -> bool {
    if !self.state.category.matches(letter)
    {
      return false;
    }

    if self.state.bookmarked_only
      && !letter.is_bookmarked
    {
      return false;
    }

    if !self.state.tags.is_empty()
      && !letter.contents.iter().any(
        |content| {
          content.tags.iter().any(|tag| {
            self.state.tags.contains(&tag.name)
          })
        }
      )
    {
      return false;
    }

    if let Some(query) = self.query.as_ref()
    {
      return text_matches(letter, query);
    }

    true
  }
}

fn normalized_query(
  raw: &str
) -> Option<String> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    None
  } else {
    Some(trimmed.to_lowercase())
  }
}

fn contains_folded(
  haystack: &str,
  needle: &str
) -> bool {
  haystack.to_lowercase().contains(needle)
}

fn text_matches(
  letter: &CoverLetter,
  query: &str
) -> bool {
  let header_match =
    contains_folded(&letter.title, query)
      || contains_folded(
        letter.company_name(),
        query
      );
  if header_match {
    return true;
  }

  letter.contents.iter().any(|content| {
    contains_folded(&content.question, query)
      || content.answers.iter().any(
        |answer| {
          contains_folded(answer, query)
        }
      )
  })
}

/// The visible subset, in collection
/// order.
pub fn visible<'a>(
  letters: &'a [CoverLetter],
  filter: &FilterState
) -> Vec<&'a CoverLetter> {
  let matcher = filter.matcher();
  let out: Vec<&CoverLetter> = letters
    .iter()
    .filter(|letter| matcher.matches(letter))
    .collect();
  trace!(
    total = letters.len(),
    visible = out.len(),
    "applied filter"
  );
  out
}

pub fn visible_ids(
  letters: &[CoverLetter],
  filter: &FilterState
) -> Vec<RecordId> {
  visible(letters, filter)
    .into_iter()
    .map(|letter| letter.id)
    .collect()
}

/// Same as [`visible_ids`] but on the
/// blocking pool, over a snapshot.
pub async fn visible_ids_in_background(
  snapshot: Arc<Vec<CoverLetter>>,
  filter: FilterState
) -> Result<Vec<RecordId>, JoinError> {
  tokio::task::spawn_blocking(move || {
    visible_ids(&snapshot, &filter)
  })
  .await
}
