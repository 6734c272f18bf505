use crate::auth::{ChildLink, Permission, Role, User};
use crate::error::AppError;

pub trait ChildScoped {
    fn child_name(&self) -> &str;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DashboardScope {
    AllChildren,
    Child(String),
    Nothing,
}

impl DashboardScope {
    pub fn for_user(user: &User) -> Result<Self, AppError> {
        user.require_any_permission(&[Permission::ViewAllChildren, Permission::ViewOwnChild])?;

        if user.has_permission(Permission::ViewAllChildren) {
            return Ok(DashboardScope::AllChildren);
        }

        Ok(match &user.child_link {
            ChildLink::Child(name) => DashboardScope::Child(name.clone()),
            ChildLink::All | ChildLink::None => DashboardScope::Nothing,
        })
    }
}

// A parent holding a sentinel link gets nothing.
pub fn filter_dashboard_rows<T: ChildScoped>(
    role: Role,
    child_link: &ChildLink,
    rows: Vec<T>,
) -> Vec<T> {
    if !role.is_parent() {
        return rows;
    }

    match child_link.child_name() {
        Some(child) => rows
            .into_iter()
            .filter(|row| row.child_name() == child)
            .collect(),
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        child: &'static str,
        note: &'static str,
    }

    impl ChildScoped for Row {
        fn child_name(&self) -> &str {
            self.child
        }
    }

    fn mixed_rows() -> Vec<Row> {
        vec![
            Row { child: "Tony", note: "a" },
            Row { child: "Zoe", note: "b" },
            Row { child: "Tony", note: "c" },
            Row { child: "Leo", note: "d" },
            Row { child: "Tonya", note: "e" },
        ]
    }

    #[test]
    fn parent_only_receives_linked_child_rows() {
        let rows = filter_dashboard_rows(
            Role::Parent,
            &ChildLink::Child("Tony".into()),
            mixed_rows(),
        );

        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.child == "Tony"));
    }

    #[test]
    fn staff_and_admin_rows_are_unchanged() {
        for role in [Role::Admin, Role::Ot, Role::Assistant, Role::Staff] {
            let rows = filter_dashboard_rows(role, &ChildLink::All, mixed_rows());
            assert_eq!(rows, mixed_rows());
        }
    }

    #[test]
    fn unlinked_parent_receives_nothing() {
        assert!(filter_dashboard_rows(Role::Parent, &ChildLink::None, mixed_rows()).is_empty());
        assert!(filter_dashboard_rows(Role::Parent, &ChildLink::All, mixed_rows()).is_empty());
    }

    #[test]
    fn scope_follows_role_and_link() {
        let staff = User {
            username: "sam".into(),
            role: Role::Slp,
            child_link: ChildLink::All,
        };
        let parent = User {
            username: "alice".into(),
            role: Role::Parent,
            child_link: ChildLink::Child("Tony".into()),
        };
        let unlinked = User {
            username: "bob".into(),
            role: Role::Parent,
            child_link: ChildLink::None,
        };

        assert_eq!(
            DashboardScope::for_user(&staff).unwrap(),
            DashboardScope::AllChildren
        );
        assert_eq!(
            DashboardScope::for_user(&parent).unwrap(),
            DashboardScope::Child("Tony".into())
        );
        assert_eq!(
            DashboardScope::for_user(&unlinked).unwrap(),
            DashboardScope::Nothing
        );
    }
}
