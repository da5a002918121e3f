use argon2::{
    Argon2, PasswordHasher,
    password_hash::{PasswordHash, PasswordVerifier, SaltString},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use password_hash::rand_core::OsRng;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set, TransactionTrait,
};
use secrecy::ExposeSecret;
use uuid::Uuid;

use crate::{
    audit,
    dto::auth::{Claims, LoginRequest, LoginResponse, RegisterRequest, VerifyEmailRequest},
    entity::{
        users::{ActiveModel as UserActive, Column as UserCol, Entity as Users},
        verification_tokens::{
            ActiveModel as TokenActive, Column as TokenCol, Entity as VerificationTokens,
        },
    },
    error::{AppError, AppResult},
    mail,
    middleware::auth::ROLE_USER,
    models::User,
    response::{ApiResponse, Meta},
    services::cart_service,
    state::AppState,
};

const MIN_PASSWORD_LEN: usize = 6;
const SESSION_HOURS: i64 = 24;
const VERIFICATION_HOURS: i64 = 24;

pub async fn register_user(
    state: &AppState,
    payload: RegisterRequest,
) -> AppResult<ApiResponse<User>> {
    let RegisterRequest {
        name,
        email,
        password,
    } = payload;
    let name = name.trim().to_string();
    let email = normalize_email(&email);

    if name.is_empty() {
        return Err(AppError::BadRequest("Name is required".into()));
    }
    if !email.contains('@') {
        return Err(AppError::BadRequest("Invalid email address".into()));
    }
    if password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    let exist = Users::find()
        .filter(UserCol::Email.eq(email.as_str()))
        .one(&state.orm)
        .await?;
    if exist.is_some() {
        return Err(AppError::BadRequest("Email is already taken".to_string()));
    }

    let password_hash = hash_password(&password)?;

    let txn = state.orm.begin().await?;
    let user = UserActive {
        id: Set(Uuid::new_v4()),
        name: Set(name),
        email: Set(email.clone()),
        password_hash: Set(password_hash),
        role: Set(ROLE_USER.to_string()),
        email_verified_at: Set(None),
        address: Set(None),
        payment_method: Set(None),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;

    let token = Uuid::new_v4().simple().to_string();
    TokenActive {
        id: Set(Uuid::new_v4()),
        identifier: Set(email.clone()),
        token: Set(token.clone()),
        expires_at: Set((Utc::now() + Duration::hours(VERIFICATION_HOURS)).into()),
        created_at: NotSet,
    }
    .insert(&txn)
    .await?;
    txn.commit().await?;

    audit::record(
        state,
        Some(user.id),
        "user_register",
        "users",
        serde_json::json!({ "user_id": user.id }),
    )
    .await;

    let link = verification_link(&state.config.public_url, &email, &token);
    mail::deliver(state.mailer.as_ref(), "verification", |mailer| async move {
        mailer.send_verification(&email, &link).await
    })
    .await;

    Ok(ApiResponse::success("User created", user.into(), None))
}

/// Checks credentials and issues a session token. A guest cart carried by
/// the request is handed over to the user.
pub async fn login_user(
    state: &AppState,
    payload: LoginRequest,
    session_cart_id: Option<Uuid>,
) -> AppResult<ApiResponse<LoginResponse>> {
    let LoginRequest { email, password } = payload;
    let user = Users::find()
        .filter(UserCol::Email.eq(normalize_email(&email)))
        .one(&state.orm)
        .await?;

    let user = match user {
        Some(u) => u,
        None => return Err(AppError::BadRequest("Invalid email or password".into())),
    };

    let parsed_hash = PasswordHash::new(&user.password_hash)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("Invalid password hash")))?;

    let argon2 = Argon2::default();
    if argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_err()
    {
        return Err(AppError::BadRequest("Invalid email or password".into()));
    }

    let token = issue_token(
        user.id,
        &user.role,
        state.config.jwt_secret.expose_secret(),
    )?;

    if let Some(session_cart_id) = session_cart_id {
        cart_service::claim_session_cart(state, user.id, session_cart_id).await?;
    }

    audit::record(
        state,
        Some(user.id),
        "user_login",
        "users",
        serde_json::json!({ "user_id": user.id }),
    )
    .await;

    let resp = LoginResponse {
        token: format!("Bearer {}", token),
        user: user.into(),
    };

    Ok(ApiResponse::success(
        "Logged in",
        resp,
        Some(Meta::empty()),
    ))
}

pub async fn verify_email(
    state: &AppState,
    payload: VerifyEmailRequest,
) -> AppResult<ApiResponse<User>> {
    let email = normalize_email(&payload.email);
    let txn = state.orm.begin().await?;

    let token = VerificationTokens::find()
        .filter(TokenCol::Identifier.eq(email.as_str()))
        .filter(TokenCol::Token.eq(payload.token.as_str()))
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::BadRequest("Invalid verification token".into()))?;

    if token.expires_at.with_timezone(&Utc) < Utc::now() {
        VerificationTokens::delete_by_id(token.id).exec(&txn).await?;
        txn.commit().await?;
        return Err(AppError::BadRequest("Verification token has expired".into()));
    }

    let user = Users::find()
        .filter(UserCol::Email.eq(email.as_str()))
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    let now = Utc::now();
    let mut active: UserActive = user.into();
    active.email_verified_at = Set(Some(now.into()));
    active.updated_at = Set(now.into());
    let user = active.update(&txn).await?;

    VerificationTokens::delete_many()
        .filter(TokenCol::Identifier.eq(email.as_str()))
        .exec(&txn)
        .await?;
    txn.commit().await?;

    audit::record(
        state,
        Some(user.id),
        "user_verify_email",
        "users",
        serde_json::json!({ "user_id": user.id }),
    )
    .await;

    Ok(ApiResponse::success("Email verified", user.into(), Some(Meta::empty())))
}

pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    Ok(argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))?
        .to_string())
}

pub fn issue_token(user_id: Uuid, role: &str, secret: &str) -> AppResult<String> {
    let expiration = Utc::now()
        .checked_add_signed(Duration::hours(SESSION_HOURS))
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to set expiration")))?;

    let claims = Claims {
        sub: user_id.to_string(),
        role: role.to_string(),
        exp: expiration.timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn verification_link(public_url: &str, email: &str, token: &str) -> String {
    let email = email.replace('+', "%2B").replace('@', "%40");
    format!("{public_url}/verify-email?email={email}&token={token}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::auth::{ROLE_ADMIN, decode_user};

    #[test]
    fn issued_token_decodes_to_same_user() {
        let id = Uuid::new_v4();
        let token = issue_token(id, ROLE_ADMIN, "secret").unwrap();
        let user = decode_user(&token, "secret").unwrap();
        assert_eq!(user.user_id, id);
        assert_eq!(user.role, ROLE_ADMIN);
    }

    #[test]
    fn password_hash_verifies() {
        let hash = hash_password("hunter22").unwrap();
        let parsed = PasswordHash::new(&hash).unwrap();
        assert!(Argon2::default().verify_password(b"hunter22", &parsed).is_ok());
        assert!(Argon2::default().verify_password(b"wrong", &parsed).is_err());
    }

    #[test]
    fn email_is_trimmed_and_lowercased() {
        assert_eq!(normalize_email("  Nino@Example.GE "), "nino@example.ge");
    }

    #[test]
    fn verification_link_escapes_email() {
        assert_eq!(
            verification_link("https://shop.ge", "a+b@x.ge", "tok"),
            "https://shop.ge/verify-email?email=a%2Bb%40x.ge&token=tok"
        );
    }
}
