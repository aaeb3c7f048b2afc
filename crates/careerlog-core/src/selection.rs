use tracing::trace;

use crate::model::RecordId;

/// Why the visible set is being
/// recomputed.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
)]
pub enum SelectionReason {
  /// Explicit filter or row choice.
  UserInitiated,
  /// Reload or mutation settling.
  SystemAutomatic,
  /// Search-as-you-type and other
  /// changes that must not move the
  /// selection.
  #[default]
  None
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionDirective {
  /// Select `id`; `scroll` asks the view
  /// to bring it into view.
  Select {
    id:     RecordId,
    scroll: bool
  },
  Clear,
  Unchanged
}

#[derive(Debug, Clone, Default)]
pub struct SelectionTracker {
  selected:    Option<RecordId>,
  last_reason: SelectionReason
}

impl SelectionTracker {
  pub fn selected(&self) -> Option<RecordId> {
    self.selected
  }

  pub fn last_reason(&self) -> SelectionReason {
    self.last_reason
  }

  /// Marks `id` as the record to keep
  /// once the next system recompute
  /// settles.
  pub fn remember(&mut self, id: RecordId) {
    self.selected = Some(id);
  }

  pub fn forget(&mut self, id: RecordId) {
    if self.selected == Some(id) {
      self.selected = None;
    }
  }

  /// Decides the selection for a freshly
  /// computed visible set.
  ///
  /// `target` is an explicit row the user
  /// asked for; without one the current
  /// selection is the candidate.
  pub fn resolve(
    &mut self,
    reason: SelectionReason,
    target: Option<RecordId>,
    visible: &[RecordId]
  ) -> SelectionDirective {
    self.last_reason = reason;
    let directive = match reason {
      | SelectionReason::UserInitiated => {
        let wanted = target
          .or(self.selected)
          .filter(|id| visible.contains(id));
        match wanted {
          | Some(id) => {
            self.selected = Some(id);
            SelectionDirective::Select {
              id,
              scroll: true
            }
          }
          | None => {
            self.selected = None;
            SelectionDirective::Clear
          }
        }
      }
      | SelectionReason::SystemAutomatic => {
        let kept = target
          .or(self.selected)
          .filter(|id| visible.contains(id));
        if let Some(id) = kept {
          self.selected = Some(id);
          SelectionDirective::Select {
            id,
            scroll: false
          }
        } else if let Some(first) =
          visible.first().copied()
        {
          self.selected = Some(first);
          SelectionDirective::Select {
            id:     first,
            scroll: true
          }
        } else {
          self.selected = None;
          SelectionDirective::Clear
        }
      }
      | SelectionReason::None => {
        SelectionDirective::Unchanged
      }
    };

    trace!(
      ?reason,
      ?directive,
      visible = visible.len(),
      "resolved selection"
    );
    directive
  }
}
