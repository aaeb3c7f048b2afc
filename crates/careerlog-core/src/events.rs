use tokio::sync::mpsc;
use tracing::trace;

use crate::model::{CoverLetter, RecordId};
use crate::selection::SelectionDirective;

/// What the presentation layer is told. Marshalling onto a UI thread is the
/// receiver's job.
#[derive(Debug, Clone, PartialEq)]
pub enum PresenterEvent {
    VisibleSetChanged {
        items: Vec<CoverLetter>,
        selection: SelectionDirective,
    },
    RowChanged {
        id: RecordId,
        row: CoverLetter,
    },
    AuthStateChanged {
        logged_in: bool,
    },
    OperationFailed {
        message: String,
    },
}

#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<PresenterEvent>,
}

impl EventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PresenterEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn emit(&self, event: PresenterEvent) {
        if self.tx.send(event).is_err() {
            trace!("event receiver dropped; discarding event");
        }
    }

    pub fn row_changed(&self, row: &CoverLetter) {
        self.emit(PresenterEvent::RowChanged {
            id: row.id,
            row: row.clone(),
        });
    }

    pub fn failed(&self, message: impl Into<String>) {
        self.emit(PresenterEvent::OperationFailed {
            message: message.into(),
        });
    }
}
