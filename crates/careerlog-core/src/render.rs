use std::collections::BTreeSet;
use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::Local;
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::model::{CoverLetter, CoverLetterState, RecordId, Tag};

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self {
            color: color && io::stdout().is_terminal(),
        })
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    #[tracing::instrument(skip(self, letters))]
    pub fn print_letters(
        &self,
        letters: &[CoverLetter],
        selected: Option<RecordId>,
    ) -> anyhow::Result<()> {
        self.write_letters(io::stdout().lock(), letters, selected)
    }

    /// One row per cover letter; `>` marks the selection and `*` a bookmark.
    pub fn write_letters<W: Write>(
        &self,
        mut out: W,
        letters: &[CoverLetter],
        selected: Option<RecordId>,
    ) -> anyhow::Result<()> {
        if letters.is_empty() {
            writeln!(out, "No cover letters.")?;
            return Ok(());
        }

        let headers = ["", "ID", "State", "Due", "Company", "Title", "Q", "Tags"]
            .map(ToString::to_string)
            .to_vec();

        let mut rows = Vec::with_capacity(letters.len());
        for letter in letters {
            let mut marker = String::new();
            marker.push(if selected == Some(letter.id) { '>' } else { ' ' });
            marker.push(if letter.is_bookmarked { '*' } else { ' ' });

            let id = self.paint(&letter.id.to_string(), "33");
            let state = self.paint(letter.state.label(), state_color(letter.state));
            let due = letter
                .due_date
                .map(|date| date.with_timezone(&Local).format("%Y-%m-%d").to_string())
                .unwrap_or_default();
            let tags = letter
                .tag_names()
                .iter()
                .map(|tag| format!("#{tag}"))
                .collect::<Vec<_>>()
                .join(" ");

            rows.push(vec![
                marker,
                id,
                state,
                due,
                letter.company_name().to_string(),
                letter.title.clone(),
                letter.contents.len().to_string(),
                tags,
            ]);
        }

        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, tags, in_use))]
    pub fn print_tags(&self, tags: &[Tag], in_use: &BTreeSet<String>) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        if tags.is_empty() {
            writeln!(out, "No tags.")?;
            return Ok(());
        }

        let headers = vec!["ID".to_string(), "Name".to_string(), "Used".to_string()];
        let rows = tags
            .iter()
            .map(|tag| {
                let used = if in_use.contains(&tag.name) { "yes" } else { "" };
                vec![
                    self.paint(&tag.id.to_string(), "33"),
                    tag.name.clone(),
                    used.to_string(),
                ]
            })
            .collect();
        write_table(&mut out, headers, rows)
    }

    pub fn print_failure(&self, message: &str) {
        eprintln!("{}", self.paint(message, "31"));
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn state_color(state: CoverLetterState) -> &'static str {
    match state {
        CoverLetterState::Unwritten => "90",
        CoverLetterState::Draft => "36",
        CoverLetterState::Submitted => "34",
        CoverLetterState::Passed => "32",
        CoverLetterState::Failed => "31",
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "", width = *width)?;
    }
    writeln!(writer)?;

    for row in rows {
        for (idx, cell) in row.iter().enumerate() {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
