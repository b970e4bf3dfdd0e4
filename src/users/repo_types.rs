use sqlx::FromRow;

use crate::users::model::User;

/// Row of the `users` table as stored.
#[derive(Debug, FromRow)]
pub struct UserRow {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub date_created: String,
    pub last_modified: String,
    pub status: String,
    pub role: String,
}

impl TryFrom<UserRow> for User {
    type Error = String;

    fn try_from(r: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            status: r.status.parse()?,
            role: r.role.parse()?,
            id: r.id,
            first_name: r.first_name,
            last_name: r.last_name,
            email: r.email,
            password: r.password,
            date_created: r.date_created,
            last_modified: r.last_modified,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::model::{Role, Status};

    fn row(status: &str, role: &str) -> UserRow {
        UserRow {
            id: 7,
            first_name: "Oscar".into(),
            last_name: "Isaac".into(),
            email: "oscaac@gmail.com".into(),
            password: "$2b$10$x".into(),
            date_created: "2024-01-01 10:00:00".into(),
            last_modified: String::new(),
            status: status.into(),
            role: role.into(),
        }
    }

    #[test]
    fn converts_known_values() {
        let user = User::try_from(row("inactive", "admin")).unwrap();
        assert_eq!(user.id, 7);
        assert_eq!(user.status, Status::Inactive);
        assert_eq!(user.role, Role::Admin);
    }

    #[test]
    fn rejects_unknown_role() {
        assert!(User::try_from(row("active", "root")).is_err());
    }
}
