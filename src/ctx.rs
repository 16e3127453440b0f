use axum::{
    extract::{Extension, FromRequestParts},
    http::{header, request::Parts},
};

use crate::{auth::jwt, db::DB, errors::Error, users::UserId};

#[derive(Clone, FromRequestParts)]
pub struct BaseParams {
    pub ctx: Ctx,
    #[from_request(via(Extension))]
    pub db: DB,
}

impl BaseParams {
    pub fn new(db: DB, ctx: Ctx) -> Self {
        Self { db, ctx }
    }
}

#[derive(Clone, Debug)]
pub struct CurrentUser {
    pub id: UserId,
    pub email: String,
}

#[derive(Clone, Debug)]
pub struct Ctx {
    pub user: CurrentUser,
}

impl Ctx {
    pub fn new(user: CurrentUser) -> Self {
        Self { user }
    }

    pub fn user_id(&self) -> UserId {
        self.user.id
    }
}

impl<S> FromRequestParts<S> for Ctx
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(Error::Unauthorized)?;

        let claims = jwt::validate_token(token).map_err(|_| Error::Unauthorized)?;

        Ok(Self::new(CurrentUser {
            id: claims.sub,
            email: claims.email,
        }))
    }
}
