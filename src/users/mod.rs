use uuid::Uuid;

pub type UserId = Uuid;

pub mod auth;

pub use auth::User;
