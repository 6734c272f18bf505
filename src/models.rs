use chrono::NaiveDate;
use rocket::request::FromParam;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::access::ChildScoped;
use crate::auth::NONE_SENTINEL;
use crate::error::AppError;
use crate::reporting::{Dated, parse_record_date};

pub const SUPPORT_STAFF_DELIMITER: &str = ", ";

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Child {
    pub child_name: String,
    pub parent_username: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbChild {
    pub child_name: Option<String>,
    pub parent_username: Option<String>,
    pub date_of_birth: Option<String>,
}

impl From<DbChild> for Child {
    fn from(child: DbChild) -> Self {
        Self {
            child_name: child.child_name.unwrap_or_default(),
            parent_username: child
                .parent_username
                .filter(|p| !p.is_empty() && p != NONE_SENTINEL),
            date_of_birth: child.date_of_birth.as_deref().and_then(parse_record_date),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProgressStatus {
    Regression,
    Stable,
    Progress,
}

impl ProgressStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressStatus::Regression => "Regression",
            ProgressStatus::Stable => "Stable",
            ProgressStatus::Progress => "Progress",
        }
    }

    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value {
            "Regression" => Ok(ProgressStatus::Regression),
            "Stable" => Ok(ProgressStatus::Stable),
            "Progress" => Ok(ProgressStatus::Progress),
            other => Err(AppError::Validation(format!(
                "Unknown progress status: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Field order here is the CSV column order.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ProgressEntry {
    pub date: String,
    pub child_name: String,
    pub discipline: String,
    pub goal_area: String,
    pub status: ProgressStatus,
    pub notes: String,
    pub media_path: Option<String>,
}

#[derive(sqlx::FromRow, Clone, Default)]
pub struct DbProgressEntry {
    pub date: Option<String>,
    pub child_name: Option<String>,
    pub discipline: Option<String>,
    pub goal_area: Option<String>,
    pub status: Option<String>,
    pub notes: Option<String>,
    pub media_path: Option<String>,
}

impl TryFrom<DbProgressEntry> for ProgressEntry {
    type Error = AppError;

    fn try_from(db: DbProgressEntry) -> Result<Self, Self::Error> {
        Ok(Self {
            date: db.date.unwrap_or_default(),
            child_name: db.child_name.unwrap_or_default(),
            discipline: db.discipline.unwrap_or_default(),
            goal_area: db.goal_area.unwrap_or_default(),
            status: ProgressStatus::parse(db.status.as_deref().unwrap_or_default())
                .map_err(|e| AppError::Internal(e.to_string()))?,
            notes: db.notes.unwrap_or_default(),
            media_path: db.media_path.filter(|p| !p.is_empty()),
        })
    }
}

impl Dated for ProgressEntry {
    fn date_text(&self) -> &str {
        &self.date
    }
}

impl ChildScoped for ProgressEntry {
    fn child_name(&self) -> &str {
        &self.child_name
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct SessionPlan {
    pub date: String,
    pub lead_staff: String,
    pub support_staff: Vec<String>,
    pub warm_up: String,
    pub learning_block: String,
    pub regulation_break: String,
    pub social_play: String,
    pub closing_routine: String,
    pub materials_needed: String,
    pub internal_notes: String,
}

impl SessionPlan {
    pub fn support_staff_text(&self) -> String {
        self.support_staff.join(SUPPORT_STAFF_DELIMITER)
    }
}

#[derive(sqlx::FromRow, Clone, Default)]
pub struct DbSessionPlan {
    pub date: Option<String>,
    pub lead_staff: Option<String>,
    pub support_staff: Option<String>,
    pub warm_up: Option<String>,
    pub learning_block: Option<String>,
    pub regulation_break: Option<String>,
    pub social_play: Option<String>,
    pub closing_routine: Option<String>,
    pub materials_needed: Option<String>,
    pub internal_notes: Option<String>,
}

impl From<DbSessionPlan> for SessionPlan {
    fn from(db: DbSessionPlan) -> Self {
        Self {
            date: db.date.unwrap_or_default(),
            lead_staff: db.lead_staff.unwrap_or_default(),
            support_staff: split_support_staff(&db.support_staff.unwrap_or_default()),
            warm_up: db.warm_up.unwrap_or_default(),
            learning_block: db.learning_block.unwrap_or_default(),
            regulation_break: db.regulation_break.unwrap_or_default(),
            social_play: db.social_play.unwrap_or_default(),
            closing_routine: db.closing_routine.unwrap_or_default(),
            materials_needed: db.materials_needed.unwrap_or_default(),
            internal_notes: db.internal_notes.unwrap_or_default(),
        }
    }
}

impl Dated for SessionPlan {
    fn date_text(&self) -> &str {
        &self.date
    }
}

pub fn check_support_staff_name(name: &str) -> Result<(), AppError> {
    if name.contains(',') {
        return Err(AppError::Validation(format!(
            "Support staff name '{}' cannot contain a comma",
            name
        )));
    }
    Ok(())
}

pub fn split_support_staff(text: &str) -> Vec<String> {
    text.split(SUPPORT_STAFF_DELIMITER.trim())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListKind {
    Disciplines,
    GoalAreas,
}

impl ListKind {
    pub fn table_name(&self) -> &'static str {
        match self {
            ListKind::Disciplines => "disciplines",
            ListKind::GoalAreas => "goal_areas",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ListKind::Disciplines => "Discipline",
            ListKind::GoalAreas => "Goal Area",
        }
    }
}

impl<'a> FromParam<'a> for ListKind {
    type Error = &'a str;

    fn from_param(param: &'a str) -> Result<Self, Self::Error> {
        match param {
            "disciplines" => Ok(ListKind::Disciplines),
            "goal_areas" => Ok(ListKind::GoalAreas),
            _ => Err(param),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ListItem {
    pub name: String,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbListItem {
    pub name: Option<String>,
}

impl From<DbListItem> for ListItem {
    fn from(item: DbListItem) -> Self {
        Self {
            name: item.name.unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn support_staff_splits_delimited_text() {
        assert_eq!(
            split_support_staff("Assistant/BI, Volunteer,  OT-Assistant"),
            vec!["Assistant/BI", "Volunteer", "OT-Assistant"]
        );
        assert!(split_support_staff("").is_empty());
    }

    #[test]
    fn support_staff_names_with_commas_are_rejected() {
        assert!(check_support_staff_name("Lee").is_ok());
        assert!(matches!(
            check_support_staff_name("Lee, Sam"),
            Err(AppError::Validation(_))
        ));

        let plan = SessionPlan {
            support_staff: vec!["Assistant/BI".into(), "Lee".into()],
            ..SessionPlan::default()
        };
        assert_eq!(
            split_support_staff(&plan.support_staff_text()),
            plan.support_staff
        );
    }

    #[test]
    fn db_child_maps_none_sentinel_to_unassigned() {
        let child = Child::from(DbChild {
            child_name: Some("Tony".into()),
            parent_username: Some("None".into()),
            date_of_birth: Some("2019-04-02".into()),
        });
        assert_eq!(child.parent_username, None);
        assert_eq!(child.date_of_birth, NaiveDate::from_ymd_opt(2019, 4, 2));
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert!(ProgressStatus::parse("Great").is_err());
        assert_eq!(
            ProgressStatus::parse("Stable").unwrap(),
            ProgressStatus::Stable
        );
    }

    #[test]
    fn list_kind_only_accepts_known_tables() {
        assert_eq!(
            ListKind::from_param("goal_areas").unwrap(),
            ListKind::GoalAreas
        );
        assert!(ListKind::from_param("users").is_err());
    }
}
