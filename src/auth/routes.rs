use axum::{
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::{
    ctx::BaseParams,
    db::{self, DB},
    errors::{Error, Result},
    state::AppState,
    users::{
        self,
        auth::{CreateUserParameters, GetUserByEmailParameters, GetUserByIdParameters},
        User,
    },
};

use super::{jwt, password};

const MIN_PASSWORD_LENGTH: usize = 6;

#[derive(Debug, Deserialize)]
pub struct RegisterUser {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginUser {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/auth/register", post(register))
        .route("/api/v1/auth/login", post(login))
        .route("/api/v1/auth/me", get(me))
        .with_state(state)
}

async fn register(
    Extension(db): Extension<DB>,
    Json(args): Json<RegisterUser>,
) -> Result<(StatusCode, Json<AuthResponse>)> {
    let name = args.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
    let email = args.email.map(|e| e.trim().to_lowercase()).filter(|e| !e.is_empty());
    let password = args.password.filter(|p| !p.is_empty());

    let (Some(name), Some(email), Some(password)) = (name, email, password) else {
        return Err(Error::Validation("Name, email and password are required".into()));
    };

    password::validate_password_strength(&password, MIN_PASSWORD_LENGTH).map_err(Error::Validation)?;

    let password_hash = password::hash_password(&password).map_err(|e| Error::Unexpected(e.to_string()))?;

    let user = users::auth::create(
        db,
        CreateUserParameters {
            name,
            email,
            password_hash,
        },
    )
    .await
    .map_err(Error::from)
    .map_err(|e| match e {
        Error::Conflict(_) => Error::Conflict("Email is already registered".into()),
        e => e,
    })?;

    let token = jwt::generate_token(user.id, &user.email).map_err(|e| Error::Unexpected(e.to_string()))?;

    tracing::info!("{} registered", user.email);

    Ok((StatusCode::CREATED, Json(AuthResponse { token, user })))
}

async fn login(Extension(db): Extension<DB>, Json(args): Json<LoginUser>) -> Result<Json<AuthResponse>> {
    let email = args.email.map(|e| e.trim().to_lowercase()).filter(|e| !e.is_empty());
    let password = args.password.filter(|p| !p.is_empty());

    let (Some(email), Some(password)) = (email, password) else {
        return Err(Error::Validation("Email and password are required".into()));
    };

    // an unknown email reads the same as a wrong password
    let user = users::auth::find_one_by_email(db, GetUserByEmailParameters { user_email: email })
        .await
        .map_err(|e| match e {
            db::Error::NotFound(_) => Error::Unauthorized,
            e => e.into(),
        })?;

    let verified =
        password::verify_password(&password, &user.password).map_err(|e| Error::Unexpected(e.to_string()))?;
    if !verified {
        return Err(Error::Unauthorized);
    }

    let token = jwt::generate_token(user.id, &user.email).map_err(|e| Error::Unexpected(e.to_string()))?;

    tracing::info!("{} logged in", user.email);

    Ok(Json(AuthResponse { token, user }))
}

async fn me(BaseParams { db, ctx }: BaseParams) -> Result<Json<User>> {
    let user = users::auth::find_one_by_id(
        db,
        GetUserByIdParameters {
            user_id: ctx.user_id(),
        },
    )
    .await?;

    Ok(Json(user))
}
