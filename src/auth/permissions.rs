use anyhow::Error;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Permission {
    ViewOwnChild,

    ViewAllChildren,
    ViewLists,
    LogProgress,
    PlanSessions,
    ExportReports,

    ManageUsers,
    ManageChildren,
    ManageLists,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "admin")]
    Admin,
    #[serde(rename = "OT")]
    Ot,
    #[serde(rename = "SLP")]
    Slp,
    #[serde(rename = "BC")]
    Bc,
    #[serde(rename = "ECE")]
    Ece,
    #[serde(rename = "Assistant")]
    Assistant,
    #[serde(rename = "staff")]
    Staff,
    #[serde(rename = "parent")]
    Parent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Page {
    AdminTools,
    ProgressTracker,
    DailyPlanner,
    Dashboard,
    ChildDashboard,
}

impl Page {
    pub fn title(&self) -> &'static str {
        match self {
            Page::AdminTools => "Admin Tools",
            Page::ProgressTracker => "Progress Tracker",
            Page::DailyPlanner => "Daily Planner",
            Page::Dashboard => "Dashboard & Reports",
            Page::ChildDashboard => "My Child's Dashboard",
        }
    }
}

static PARENT_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.insert(Permission::ViewOwnChild);

    permissions
});

static STAFF_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.insert(Permission::ViewAllChildren);
    permissions.insert(Permission::ViewLists);
    permissions.insert(Permission::LogProgress);
    permissions.insert(Permission::PlanSessions);
    permissions.insert(Permission::ExportReports);

    permissions
});

static ADMIN_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.extend(STAFF_PERMISSIONS.iter().copied());

    permissions.insert(Permission::ManageUsers);
    permissions.insert(Permission::ManageChildren);
    permissions.insert(Permission::ManageLists);

    permissions
});

const ADMIN_PAGES: &[Page] = &[
    Page::AdminTools,
    Page::ProgressTracker,
    Page::DailyPlanner,
    Page::Dashboard,
];
const STAFF_PAGES: &[Page] = &[Page::ProgressTracker, Page::DailyPlanner, Page::Dashboard];
const PARENT_PAGES: &[Page] = &[Page::ChildDashboard];

impl Role {
    pub const ALL: [Role; 8] = [
        Role::Admin,
        Role::Ot,
        Role::Slp,
        Role::Bc,
        Role::Ece,
        Role::Assistant,
        Role::Staff,
        Role::Parent,
    ];

    pub fn permissions(&self) -> &'static HashSet<Permission> {
        match self {
            Role::Admin => &ADMIN_PERMISSIONS,
            Role::Ot | Role::Slp | Role::Bc | Role::Ece | Role::Assistant | Role::Staff => {
                &STAFF_PERMISSIONS
            }
            Role::Parent => &PARENT_PERMISSIONS,
        }
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions().contains(&permission)
    }

    pub fn visible_pages(&self) -> &'static [Page] {
        match self {
            Role::Admin => ADMIN_PAGES,
            Role::Ot | Role::Slp | Role::Bc | Role::Ece | Role::Assistant | Role::Staff => {
                STAFF_PAGES
            }
            Role::Parent => PARENT_PAGES,
        }
    }

    pub fn is_parent(&self) -> bool {
        matches!(self, Role::Parent)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Ot => "OT",
            Role::Slp => "SLP",
            Role::Bc => "BC",
            Role::Ece => "ECE",
            Role::Assistant => "Assistant",
            Role::Staff => "staff",
            Role::Parent => "parent",
        }
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| Error::msg(format!("Unknown role: {}", s)))
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn visible_pages(role: Role) -> &'static [Page] {
    role.visible_pages()
}
