use chrono::Utc;

use crate::model::{Content, ContentDraft, CoverLetter, CoverLetterDraft, CoverLetterState, RecordId};

pub const NEW_LETTER_COMPANY: &str = "Company";
pub const NEW_LETTER_TITLE: &str = "Cover letter";
pub const NEW_LETTER_POSITION: &str = "Job position";

/// Draft used for "add" from the list.
pub fn blank_letter() -> CoverLetterDraft {
    CoverLetterDraft::new(NEW_LETTER_COMPANY, NEW_LETTER_TITLE, NEW_LETTER_POSITION)
}

pub fn writing_guide_letter() -> CoverLetterDraft {
    CoverLetterDraft::new(
        NEW_LETTER_COMPANY,
        "CareerLog guide - writing a cover letter",
        "Target position",
    )
}

pub fn managing_guide_letter() -> CoverLetterDraft {
    CoverLetterDraft::new(
        NEW_LETTER_COMPANY,
        "CareerLog guide - managing cover letters",
        "Target position",
    )
}

pub fn writing_guide_contents(record_id: RecordId) -> Vec<ContentDraft> {
    vec![
        ContentDraft::new(
            record_id,
            "Can I only write one answer?",
            &["No! Use 'Add answer' under a question to keep as many drafts as you like."],
        ),
        ContentDraft::new(
            record_id,
            "How do I delete a question?",
            &["Open the ... menu on the right of the question and choose delete."],
        ),
        ContentDraft::new(
            record_id,
            "How do I add a new question?",
            &["Press + in the top right corner and write as many questions as you need."],
        ),
        ContentDraft::new(
            record_id,
            "Can I reorder answers?",
            &["Press and hold an answer, then drag it up or down."],
        ),
        ContentDraft::new(
            record_id,
            "Is my writing saved?",
            &[
                "Edits are saved automatically shortly after you stop typing.",
                "Your drafts stay where you left them after closing the app.",
            ],
        ),
    ]
}

pub fn managing_guide_contents(record_id: RecordId) -> Vec<ContentDraft> {
    vec![
        ContentDraft::new(
            record_id,
            "How do I delete a cover letter?",
            &[
                "Right-click a cover letter in the list on the left.",
                "Choose delete to remove it together with all of its answers.",
            ],
        ),
        ContentDraft::new(
            record_id,
            "How do I rename a cover letter?",
            &[
                "Click the title at the top to edit it.",
                "A more specific title makes it easier to find later.",
            ],
        ),
        ContentDraft::new(
            record_id,
            "Where do I keep notes about the application?",
            &[
                "Use the panel on the right for company, position and memo.",
                "Deadlines and things to prepare are easy to find there later.",
            ],
        ),
    ]
}

/// Read-only record shown while signed out.
pub fn signed_out_sample() -> Vec<CoverLetter> {
    let now = Utc::now();
    vec![CoverLetter {
        id: -1,
        company: Some("ABC Company".to_string()),
        title: "Developer cover letter".to_string(),
        state: CoverLetterState::Draft,
        is_bookmarked: false,
        due_date: None,
        job_position: Some("iOS Developer".to_string()),
        memo: None,
        apply_url: None,
        includes_whitespace: false,
        created_at: now,
        updated_at: now,
        contents: vec![Content {
            id: -1,
            cover_letter_id: -1,
            question: "Why are you applying?".to_string(),
            answers: vec!["What first drew me to ABC Company was...".to_string()],
            character_limit: None,
            tags: vec![],
            created_at: now,
        }],
    }]
}
