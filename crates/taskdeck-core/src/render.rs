use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use taskdeck_shared::TaskDto;
use unicode_width::UnicodeWidthStr;

use crate::api::{Dashboard, TaskState};
use crate::config::Config;
use crate::datetime::parse_instant;
use crate::interaction::StatusChoice;
use crate::pagination::{PageMarker, PaginationView};
use crate::query::{FilterState, href, with_page};
use crate::routes;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
    tz: Tz,
}

impl Renderer {
    pub fn new(cfg: &Config, tz: Tz) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color, tz })
    }

    #[tracing::instrument(skip(self, dashboard, filter, now))]
    pub fn print_dashboard(
        &mut self,
        dashboard: &Dashboard,
        filter: &FilterState,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        let mut active = Vec::new();
        if !filter.search.is_empty() {
            active.push(format!("search \"{}\"", filter.search));
        }
        active.push(format!(
            "status {}",
            StatusChoice::from_completed(filter.completed).label()
        ));
        match (filter.from_date, filter.to_date) {
            (Some(from), Some(to)) => active.push(format!("{from} - {to}")),
            (Some(from), None) => active.push(format!("{from} -")),
            (None, Some(to)) => active.push(format!("- {to}")),
            (None, None) => {}
        }
        writeln!(out, "Dashboard  [{}]", active.join(", "))?;
        writeln!(out)?;

        if dashboard.page.tasks.is_empty() {
            writeln!(out, "No result")?;
        } else {
            let rows = dashboard
                .page
                .tasks
                .iter()
                .map(|task| self.task_row(task, now))
                .collect();
            write_table(
                &mut out,
                vec![
                    "ID".to_string(),
                    "Status".to_string(),
                    "Deadline".to_string(),
                    "Title".to_string(),
                ],
                rows,
            )?;
        }

        writeln!(out)?;
        writeln!(out, "{}", self.pagination_line(&dashboard.pagination))?;
        for (label, link) in pagination_links(&dashboard.pagination, &dashboard.query) {
            writeln!(out, "  {label:<8} {link}")?;
        }
        writeln!(out, "{} task(s) total", dashboard.page.total)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, task, now), fields(id = %task.id))]
    pub fn print_task_info(&mut self, task: &TaskDto, now: DateTime<Utc>) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(out, "id          {}", task.id)?;
        writeln!(out, "title       {}", task.title)?;
        writeln!(out, "status      {}", self.status_cell(task, now))?;
        writeln!(out, "deadline    {}", self.local_deadline(task))?;
        if let Some(created) = &task.created_at {
            writeln!(out, "created     {created}")?;
        }
        writeln!(out, "edit        {}", routes::edit_task(&task.id))?;
        if !task.description.is_empty() {
            writeln!(out)?;
            writeln!(out, "{}", task.description)?;
        }

        Ok(())
    }

    pub fn pagination_line(&self, view: &PaginationView) -> String {
        view.markers
            .iter()
            .map(|marker| match marker {
                PageMarker::Previous { disabled } => self.dim_if("< prev", *disabled),
                PageMarker::Next { disabled } => self.dim_if("next >", *disabled),
                PageMarker::Ellipsis => "...".to_string(),
                PageMarker::Page { number, active: true } => self.paint(&format!("[{number}]"), "1"),
                PageMarker::Page { number, active: false } => number.to_string(),
            })
            .collect::<Vec<_>>()
            .join("  ")
    }

    fn task_row(&self, task: &TaskDto, now: DateTime<Utc>) -> Vec<String> {
        vec![
            self.paint(&task.id, "33"),
            self.status_cell(task, now),
            self.local_deadline(task),
            task.title.clone(),
        ]
    }

    fn status_cell(&self, task: &TaskDto, now: DateTime<Utc>) -> String {
        let state = TaskState::of(task, now);
        let code = match state {
            TaskState::Completed => "32",
            TaskState::Late => "31",
            TaskState::InProgress => "33",
        };
        self.paint(state.label(), code)
    }

    fn local_deadline(&self, task: &TaskDto) -> String {
        parse_instant(&task.deadline)
            .map(|dt| dt.with_timezone(&self.tz).format("%b %d, %Y %H:%M").to_string())
            .unwrap_or_else(|_| task.deadline.clone())
    }

    fn dim_if(&self, text: &str, disabled: bool) -> String {
        if disabled { self.paint(text, "2") } else { text.to_string() }
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

/// Where each clickable marker leads.
pub fn pagination_links(view: &PaginationView, query: &str) -> Vec<(String, String)> {
    view.markers
        .iter()
        .filter_map(|marker| {
            let target = marker.target(view.current_page)?;
            let label = match marker {
                PageMarker::Previous { .. } => "prev".to_string(),
                PageMarker::Next { .. } => "next".to_string(),
                _ => target.to_string(),
            };
            Some((label, href(routes::DASHBOARD, &with_page(query, target))))
        })
        .collect()
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

    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for idx in 0..column_count {
            let cell = &row[idx];
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
