use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::{config::config, users::UserId};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: UserId,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

pub fn generate_token(user_id: UserId, email: &str) -> Result<String, jsonwebtoken::errors::Error> {
    let now = chrono::Utc::now().timestamp();
    let exp = now + config().jwt_expiry_hours * 3600;

    let claims = Claims {
        sub: user_id,
        email: email.to_string(),
        iat: now,
        exp,
    };

    encode(
        &Header::default(), // HS256
        &claims,
        &EncodingKey::from_secret(config().jwt_secret.as_bytes()),
    )
}

/// Checks the signature and expiry, both enforced by [`Validation::default`].
pub fn validate_token(token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config().jwt_secret.as_bytes()),
        &Validation::default(),
    )?;

    Ok(token_data.claims)
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn token_round_trips() {
        let user_id = Uuid::new_v4();
        let token = generate_token(user_id, "ada@mail.com").unwrap();

        let claims = validate_token(&token).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.email, "ada@mail.com");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn rejects_a_tampered_token() {
        let token = generate_token(Uuid::new_v4(), "ada@mail.com").unwrap();

        let mut tampered = token;
        tampered.push('x');

        assert!(validate_token(&tampered).is_err());
    }

    #[test]
    fn rejects_an_expired_token() {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: Uuid::new_v4(),
            email: "ada@mail.com".into(),
            // well past the default leeway
            iat: now - 600,
            exp: now - 300,
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config().jwt_secret.as_bytes()),
        )
        .unwrap();

        assert!(validate_token(&token).is_err());
    }

    #[test]
    fn rejects_garbage() {
        assert!(validate_token("not-a-jwt").is_err());
    }
}
