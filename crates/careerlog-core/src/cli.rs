use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::{Context, anyhow};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::model::{CoverLetterState, RecordEdit};

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "careerlog",
    version,
    about = "CareerLog: keep cover letters, their questions and tags in one list",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "rc-file")]
    pub rc_file: Option<PathBuf>,

    #[arg(long = "data")]
    pub data: Option<PathBuf>,

    #[command(flatten)]
    pub filters: FilterArgs,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Filters applied to the list before the command runs.
#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    #[arg(
        long = "state",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<CoverLetterState>())
    )]
    pub state: Option<CoverLetterState>,

    #[arg(long = "bookmarked")]
    pub bookmarked: bool,

    #[arg(long = "tag", action = ArgAction::Append)]
    pub tags: Vec<String>,

    #[arg(long = "search")]
    pub search: Option<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Show the filtered list (default).
    List,
    /// Add a blank cover letter and select it.
    Add,
    Select {
        id: i64,
    },
    /// Flip the bookmark on a cover letter.
    Bookmark {
        id: i64,
    },
    Delete {
        id: i64,
    },
    /// Change a cover letter's details; an empty value clears a text field.
    Edit {
        id: i64,
        #[command(flatten)]
        fields: EditArgs,
    },
    /// Add a question, optionally with answers.
    Question {
        id: i64,
        question: String,
        #[arg(long = "answer", action = ArgAction::Append)]
        answers: Vec<String>,
    },
    QuestionRm {
        id: i64,
        content: i64,
    },
    Tags,
    TagNew {
        name: String,
    },
    TagRename {
        id: i64,
        name: String,
    },
    TagRm {
        id: i64,
    },
    TagAttach {
        record: i64,
        content: i64,
        tag: i64,
    },
    TagDetach {
        record: i64,
        content: i64,
        tag: i64,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct EditArgs {
    #[arg(long)]
    pub title: Option<String>,

    #[arg(long)]
    pub company: Option<String>,

    #[arg(long)]
    pub position: Option<String>,

    #[arg(long)]
    pub memo: Option<String>,

    #[arg(long)]
    pub url: Option<String>,

    #[arg(
        long = "set-state",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<CoverLetterState>())
    )]
    pub state: Option<CoverLetterState>,

    /// YYYY-MM-DD, or `none` to clear.
    #[arg(long)]
    pub due: Option<String>,

    #[arg(long)]
    pub whitespace: Option<bool>,
}

impl EditArgs {
    pub fn into_edit(self) -> anyhow::Result<RecordEdit> {
        let due_date = self.due.as_deref().map(parse_due).transpose()?;
        Ok(RecordEdit {
            title: self.title,
            company: self.company.map(Some),
            job_position: self.position.map(Some),
            memo: self.memo.map(Some),
            apply_url: self.url.map(Some),
            state: self.state,
            due_date,
            includes_whitespace: self.whitespace,
        })
    }
}

fn parse_due(raw: &str) -> anyhow::Result<Option<DateTime<Utc>>> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("invalid due date {raw:?}, expected YYYY-MM-DD"))?;
    Ok(Some(date.and_time(chrono::NaiveTime::MIN).and_utc()))
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Pulls positional `rc.key=value` (or `rc.key:value`) overrides out of the
/// argument list before clap sees it.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter {
        let s = arg.to_string_lossy();
        if let Some(rest) = s.strip_prefix("rc.") {
            let parsed = rest
                .split_once('=')
                .or_else(|| rest.split_once(':'))
                .map(|(k, v)| (format!("rc.{k}"), v.to_string()));

            if let Some((k, v)) = parsed {
                debug!(key = %k, value = %v, "captured positional rc override");
                overrides.push((k, v));
                continue;
            }
        }

        cleaned.push(arg);
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;

    use clap::Parser;

    use super::*;

    fn os(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    #[test]
    fn positional_rc_overrides_are_extracted() {
        let pre = preprocess_args(&os(&["careerlog", "rc.color=off", "list", "rc.sync.debounce_ms:5"]))
            .unwrap();
        assert_eq!(pre.cleaned_args, os(&["careerlog", "list"]));
        assert_eq!(
            pre.rc_overrides,
            vec![
                ("rc.color".to_string(), "off".to_string()),
                ("rc.sync.debounce_ms".to_string(), "5".to_string()),
            ]
        );
    }

    #[test]
    fn filters_and_subcommand_parse() {
        let cli = GlobalCli::parse_from(os(&[
            "careerlog",
            "--state",
            "draft",
            "--tag",
            "growth",
            "--tag",
            "culture",
            "tag-attach",
            "1",
            "2",
            "3",
        ]));
        assert_eq!(cli.filters.state, Some(CoverLetterState::Draft));
        assert_eq!(cli.filters.tags, vec!["growth", "culture"]);
        assert!(matches!(
            cli.command,
            Some(Command::TagAttach {
                record: 1,
                content: 2,
                tag: 3
            })
        ));
    }

    #[test]
    fn edit_args_become_a_tri_state_patch() {
        let edit = EditArgs {
            company: Some(String::new()),
            due: Some("2026-11-02".to_string()),
            ..EditArgs::default()
        }
        .into_edit()
        .unwrap();
        assert_eq!(edit.company, Some(Some(String::new())));
        assert!(edit.title.is_none());
        assert_eq!(
            edit.due_date.flatten().map(|d| d.date_naive().to_string()).as_deref(),
            Some("2026-11-02")
        );

        let cleared = EditArgs {
            due: Some("none".to_string()),
            ..EditArgs::default()
        }
        .into_edit()
        .unwrap();
        assert_eq!(cleared.due_date, Some(None));

        assert!(
            EditArgs {
                due: Some("tomorrow".to_string()),
                ..EditArgs::default()
            }
            .into_edit()
            .is_err()
        );
    }
}
