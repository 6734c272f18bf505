use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::AppError;
use crate::models::{ProgressEntry, ProgressStatus, SessionPlan};

pub trait Dated {
    fn date_text(&self) -> &str;

    fn record_date(&self) -> Option<NaiveDate> {
        parse_record_date(self.date_text())
    }
}

pub fn parse_record_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    let date_part = value.get(..10)?;
    match value.as_bytes().get(10) {
        None | Some(b'T') | Some(b' ') => {}
        Some(_) => return None,
    }
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

pub fn filter_by_date_range<T: Dated + Clone>(
    rows: &[T],
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<T>, AppError> {
    if start > end {
        return Err(AppError::InvalidRange {
            start: start.to_string(),
            end: end.to_string(),
        });
    }

    Ok(rows
        .iter()
        .filter(|row| {
            row.record_date()
                .is_some_and(|date| date >= start && date <= end)
        })
        .cloned()
        .collect())
}

pub fn resolve_range<T: Dated>(
    rows: &[T],
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Option<(NaiveDate, NaiveDate)> {
    if let (Some(start), Some(end)) = (start, end) {
        return Some((start, end));
    }

    let (earliest, latest) = rows
        .iter()
        .filter_map(Dated::record_date)
        .fold(None, |bounds, date| match bounds {
            None => Some((date, date)),
            Some((lo, hi)) => Some((date.min(lo), date.max(hi))),
        })?;

    Some((start.unwrap_or(earliest), end.unwrap_or(latest)))
}

#[instrument(skip(rows), fields(rows = rows.len()))]
pub fn date_range_view<T: Dated + Clone>(
    rows: &[T],
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<Vec<T>, AppError> {
    let mut filtered = match resolve_range(rows, start, end) {
        // An inferred bound can land on the wrong side of the one the caller sent.
        Some((lo, hi)) if lo > hi && (start.is_none() || end.is_none()) => Vec::new(),
        Some((lo, hi)) => filter_by_date_range(rows, lo, hi)?,
        None => rows.to_vec(),
    };
    sort_by_date_desc(&mut filtered);
    debug!(kept = filtered.len(), "Applied date range view");
    Ok(filtered)
}

pub fn sort_by_date_desc<T: Dated>(rows: &mut [T]) {
    rows.sort_by(|a, b| b.record_date().cmp(&a.record_date()));
}

pub trait CsvRecord {
    const HEADERS: &'static [&'static str];

    type Row<'a>: Serialize
    where
        Self: 'a;

    fn csv_row(&self) -> Self::Row<'_>;
}

#[derive(Serialize)]
pub struct ProgressCsvRow<'a> {
    date: &'a str,
    child_name: &'a str,
    discipline: &'a str,
    goal_area: &'a str,
    status: &'static str,
    notes: &'a str,
    media_path: &'a str,
}

impl CsvRecord for ProgressEntry {
    const HEADERS: &'static [&'static str] = &[
        "date",
        "child_name",
        "discipline",
        "goal_area",
        "status",
        "notes",
        "media_path",
    ];

    type Row<'a> = ProgressCsvRow<'a>;

    fn csv_row(&self) -> Self::Row<'_> {
        ProgressCsvRow {
            date: &self.date,
            child_name: &self.child_name,
            discipline: &self.discipline,
            goal_area: &self.goal_area,
            status: self.status.as_str(),
            notes: &self.notes,
            media_path: self.media_path.as_deref().unwrap_or_default(),
        }
    }
}

#[derive(Serialize)]
pub struct SessionPlanCsvRow<'a> {
    date: &'a str,
    lead_staff: &'a str,
    support_staff: String,
    warm_up: &'a str,
    learning_block: &'a str,
    regulation_break: &'a str,
    social_play: &'a str,
    closing_routine: &'a str,
    materials_needed: &'a str,
    internal_notes: &'a str,
}

impl CsvRecord for SessionPlan {
    const HEADERS: &'static [&'static str] = &[
        "date",
        "lead_staff",
        "support_staff",
        "warm_up",
        "learning_block",
        "regulation_break",
        "social_play",
        "closing_routine",
        "materials_needed",
        "internal_notes",
    ];

    type Row<'a> = SessionPlanCsvRow<'a>;

    fn csv_row(&self) -> Self::Row<'_> {
        SessionPlanCsvRow {
            date: &self.date,
            lead_staff: &self.lead_staff,
            support_staff: self.support_staff_text(),
            warm_up: &self.warm_up,
            learning_block: &self.learning_block,
            regulation_break: &self.regulation_break,
            social_play: &self.social_play,
            closing_routine: &self.closing_routine,
            materials_needed: &self.materials_needed,
            internal_notes: &self.internal_notes,
        }
    }
}

// The header is written even when `rows` is empty.
#[instrument(skip(rows), fields(rows = rows.len()))]
pub fn export_csv<T: CsvRecord>(rows: &[T]) -> Result<String, AppError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());

    writer.write_record(T::HEADERS)?;
    for row in rows {
        writer.serialize(row.csv_row())?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| AppError::Internal(format!("CSV export error: {}", e.error())))?;

    String::from_utf8(bytes).map_err(|e| AppError::Internal(format!("CSV export error: {}", e)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    SessionPlans,
    Progress,
}

pub fn export_filename(kind: ExportKind, today: NaiveDate) -> String {
    let stem = match kind {
        ExportKind::SessionPlans => "TILP_Session_Plans",
        ExportKind::Progress => "TILP_Progress",
    };
    format!("{}_{}.csv", stem, today.format("%Y-%m-%d"))
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSummary {
    pub regression: usize,
    pub stable: usize,
    pub progress: usize,
}

pub fn status_summary(rows: &[ProgressEntry]) -> StatusSummary {
    rows.iter()
        .fold(StatusSummary::default(), |mut summary, row| {
            match row.status {
                ProgressStatus::Regression => summary.regression += 1,
                ProgressStatus::Stable => summary.stable += 1,
                ProgressStatus::Progress => summary.progress += 1,
            }
            summary
        })
}
