use rusqlite::{named_params, Row};
use serde::{Deserialize, Serialize};

use crate::db::{self, DB};

use super::UserId;

const USER_COLUMNS: &str = "id, name, email, password, created_at, updated_at";

#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("email", &self.email)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .field("password", &"[redacted]")
            .finish()
    }
}

impl<'a> TryFrom<&Row<'a>> for User {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'a>) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            email: row.get(2)?,
            password: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct CreateUserParameters {
    pub name: String,
    pub email: String,
    pub password_hash: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct GetUserByEmailParameters {
    pub user_email: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct GetUserByIdParameters {
    pub user_id: UserId,
}

pub async fn create(db: DB, args: CreateUserParameters) -> db::Result<User> {
    let user = db
        .call(move |conn| {
            conn.query_row(
                &format!(
                    r#"INSERT INTO users (name, email, password) VALUES (:name, :email, :password)
                    RETURNING {USER_COLUMNS}"#
                ),
                named_params! {
                    ":name": args.name,
                    ":email": args.email,
                    ":password": args.password_hash,
                },
                |r| User::try_from(r),
            )
            .map_err(|e| e.into())
        })
        .await?;

    Ok(user)
}

pub async fn find_one_by_id(db: DB, args: GetUserByIdParameters) -> db::Result<User> {
    let user_id = args.user_id;
    let user = db
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"),
                [args.user_id],
                |r| User::try_from(r),
            )
            .map_err(|e| e.into())
        })
        .await
        .map_err(db::Error::from)
        .map_err(|e| e.not_found_message(format!("User '{}' not found", user_id)))?;

    Ok(user)
}

pub async fn find_one_by_email(db: DB, args: GetUserByEmailParameters) -> db::Result<User> {
    let user_email = args.user_email.to_owned();
    let user = db
        .call(|conn| {
            conn.query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?"),
                [args.user_email],
                |r| User::try_from(r),
            )
            .map_err(|e| e.into())
        })
        .await
        .map_err(db::Error::from)
        .map_err(|e| e.not_found_message(format!("User '{}' not found", user_email)))?;

    Ok(user)
}
