use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{debug, instrument};

use crate::cli::{Command, FilterArgs};
use crate::config::PresenterSettings;
use crate::events::PresenterEvent;
use crate::filter::CategoryFilter;
use crate::model::{CoverLetter, RecordId};
use crate::presenter::{ListPresenter, Services, tag_names_in_use};
use crate::render::Renderer;
use crate::service::LocalSession;
use crate::store::DataStore;

/// Loads the list, applies the filter flags, runs one command, flushes
/// pending writes and prints the resulting list.
#[instrument(skip_all)]
pub async fn dispatch(
    store: Arc<DataStore>,
    settings: PresenterSettings,
    renderer: &Renderer,
    filters: FilterArgs,
    command: Command,
) -> anyhow::Result<()> {
    let services = Services {
        letters: store.clone(),
        tags: store,
        auth: Arc::new(LocalSession::signed_in()),
    };
    let (mut presenter, mut events) = ListPresenter::new(services, settings);

    presenter.load().await.context("failed to load cover letters")?;
    apply_filters(&mut presenter, filters).await?;

    debug!(?command, "dispatching command");
    let show_list = run_command(&mut presenter, renderer, command).await?;
    presenter.flush_pending().await;

    report_failures(&mut events, renderer);
    if show_list {
        let letters: Vec<CoverLetter> = presenter.visible().into_iter().cloned().collect();
        renderer.print_letters(&letters, presenter.selected_id())?;
    }
    Ok(())
}

async fn apply_filters(presenter: &mut ListPresenter, filters: FilterArgs) -> anyhow::Result<()> {
    if let Some(state) = filters.state {
        presenter
            .apply_category_filter(CategoryFilter::State(state))
            .await?;
    }
    if filters.bookmarked {
        presenter.toggle_bookmark_filter().await?;
    }
    if !filters.tags.is_empty() {
        presenter.set_selected_tags(filters.tags).await?;
    }
    if let Some(query) = filters.search {
        presenter.set_search_text(&query).await?;
    }
    Ok(())
}

/// Returns whether the list should be printed afterwards.
async fn run_command(
    presenter: &mut ListPresenter,
    renderer: &Renderer,
    command: Command,
) -> anyhow::Result<bool> {
    match command {
        Command::List => {}
        Command::Add => {
            let id = presenter.insert_default().await?;
            println!("Created cover letter {id}.");
        }
        Command::Select { id } => presenter.select(id).await?,
        Command::Bookmark { id } => {
            let bookmarked = presenter.toggle_bookmark(id).await?;
            let verb = if bookmarked { "Bookmarked" } else { "Removed bookmark from" };
            println!("{verb} cover letter {id}.");
        }
        Command::Delete { id } => {
            presenter.delete(id).await?;
            println!("Deleted cover letter {id}.");
        }
        Command::Edit { id, fields } => {
            let edit = fields.into_edit()?;
            presenter.edit_record(id, edit).await?;
        }
        Command::Question {
            id,
            question,
            answers,
        } => add_question(presenter, id, &question, answers).await?,
        Command::QuestionRm { id, content } => presenter.delete_content(id, content).await?,
        Command::Tags => {
            let tags = presenter.tags(true).await?;
            renderer.print_tags(&tags, &tag_names_in_use(presenter.records()))?;
            return Ok(false);
        }
        Command::TagNew { name } => {
            let tag = presenter.create_tag(&name).await?;
            println!("Created tag {} ({}).", tag.name, tag.id);
            return Ok(false);
        }
        Command::TagRename { id, name } => presenter.rename_tag(id, &name).await?,
        Command::TagRm { id } => presenter.delete_tag(id).await?,
        Command::TagAttach {
            record,
            content,
            tag,
        } => presenter.attach_tag(record, content, tag).await?,
        Command::TagDetach {
            record,
            content,
            tag,
        } => presenter.detach_tag(record, content, tag).await?,
    }
    Ok(true)
}

async fn add_question(
    presenter: &mut ListPresenter,
    record_id: RecordId,
    question: &str,
    answers: Vec<String>,
) -> anyhow::Result<()> {
    let mut content = presenter.add_content(record_id, question).await?;
    println!("Added question {} to cover letter {record_id}.", content.id);
    if !answers.is_empty() {
        content.answers = answers;
        presenter.update_content(record_id, content).await?;
    }
    Ok(())
}

/// Prints failures reported by background writes.
fn report_failures(events: &mut mpsc::UnboundedReceiver<PresenterEvent>, renderer: &Renderer) {
    while let Ok(event) = events.try_recv() {
        if let PresenterEvent::OperationFailed { message } = event {
            renderer.print_failure(&message);
        }
    }
}
