use crate::{
    error::{ApiError, ApiJson},
    token::Tokens,
    AppState,
};
use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use assist_db::{
    models::{NewUser, User},
    status::Role,
    Store,
};
use axum::{extract::State, Json};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Stored password hash could not be parsed: {0}")]
    StoredPasswordUnableToParse(argon2::password_hash::Error),
    #[error("Password could not be verified: {0}")]
    PasswordUnableToVerify(argon2::password_hash::Error),
    #[error("Password hash failed: {0}")]
    PasswordHash(argon2::password_hash::Error),
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError::internal(err)
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Credentials {
    username: String,
    password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub username: String,
    pub role: Role,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub name: String,
    pub role: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// A user as shown to clients; the password hash never leaves the server.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: i32,
    pub username: String,
    pub name: String,
    pub role: Role,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub enabled: bool,
}

impl From<User> for UserView {
    fn from(
        User {
            id,
            username,
            name,
            role,
            email,
            phone,
            enabled,
            ..
        }: User,
    ) -> Self {
        Self {
            id,
            username,
            name,
            role,
            email,
            phone,
            enabled,
        }
    }
}

const BAD_CREDENTIALS: &str = "Invalid username or password";

#[tracing::instrument(skip(store, tokens, credentials), fields(username = %credentials.username))]
pub async fn authenticate(
    store: &dyn Store,
    tokens: &Tokens,
    credentials: Credentials,
) -> Result<LoginResponse, ApiError> {
    let user = store
        .load_user_by_username(credentials.username.trim())
        .await?
        .ok_or_else(|| ApiError::Unauthorized(BAD_CREDENTIALS.into()))?;
    if !verify_password(&credentials.password, &user.password_hash)? {
        return Err(ApiError::Unauthorized(BAD_CREDENTIALS.into()));
    }
    if !user.enabled {
        return Err(ApiError::Unauthorized("User account is disabled".into()));
    }
    let token = tokens.issue(&user.username, user.role).map_err(ApiError::internal)?;
    tracing::info!(role = %user.role, "user logged in");
    Ok(LoginResponse {
        token,
        username: user.username,
        role: user.role,
    })
}

/// Registers a user. Without `role` the request's own role name is used, and it must be valid.
#[tracing::instrument(skip(store, request), fields(username = %request.username))]
pub async fn register(
    store: &dyn Store,
    request: RegistrationRequest,
    role: Option<Role>,
) -> Result<UserView, ApiError> {
    let new_user = new_user(request, role).map_err(ApiError::Validation)?;
    let user = store.create_user(new_user).await?;
    tracing::info!(user_id = user.id, role = %user.role, "user registered");
    Ok(user.into())
}

/// Validates a registration and hashes its password, returning every validation message on
/// failure.
pub fn new_user(request: RegistrationRequest, role: Option<Role>) -> Result<NewUser, Vec<String>> {
    let RegistrationRequest {
        username,
        password,
        name,
        role: role_name,
        email,
        phone,
    } = request;
    let username = username.trim().to_owned();
    let email = email.map(|e| e.trim().to_owned()).filter(|e| !e.is_empty());
    let phone = phone.map(|p| p.trim().to_owned()).filter(|p| !p.is_empty());
    let messages = Vec::new();
    let (messages, username_valid) = validate_username(messages, &username);
    let (messages, password_valid) = validate_password(messages, &password);
    let (messages, name_valid) = validate_name(messages, &name);
    let (messages, email_valid) = validate_email(messages, email.as_deref());
    let (mut messages, phone_valid) = validate_phone(messages, phone.as_deref());
    let role = match role {
        Some(role) => Some(role),
        None => match Role::from_role_name(role_name.as_deref().unwrap_or_default()) {
            Ok(role) => Some(role),
            Err(_) => {
                messages.push(format!(
                    "Invalid role: {}. Must be one of {}",
                    role_name.as_deref().unwrap_or_default(),
                    Role::ALL.iter().map(Role::as_str).collect::<Vec<_>>().join(", ")
                ));
                None
            }
        },
    };
    match role {
        Some(role)
            if username_valid && password_valid && name_valid && email_valid && phone_valid =>
        {
            let password_hash = hash_password(&password).map_err(|err| vec![err.to_string()])?;
            Ok(NewUser {
                username,
                password_hash,
                name: name.trim().to_owned(),
                role,
                email,
                phone,
            })
        }
        _ => Err(messages),
    }
}

fn validate_username(mut messages: Vec<String>, username: &str) -> (Vec<String>, bool) {
    let mut valid = true;
    if username.contains(|c: char| !(c.is_alphanumeric() || c == '.' || c == '-' || c == '_')) {
        valid = false;
        messages
            .push("username must only consist of letters, numbers, and '.', '-' or '_'".into());
    }
    if username.chars().count() < 4 {
        valid = false;
        messages.push("username must be at least 4 characters in length".into());
    }
    if username.chars().count() > 64 {
        valid = false;
        messages.push("username must be no more than 64 characters in length".into());
    }
    (messages, valid)
}

pub(crate) fn validate_password(mut messages: Vec<String>, password: &str) -> (Vec<String>, bool) {
    let mut valid = true;
    if password.chars().count() < 8 {
        valid = false;
        messages.push("password must be at least 8 characters in length".into());
    }
    if password.chars().count() > 512 {
        valid = false;
        messages.push("password must be shorter than 512 characters in length".into());
    }
    (messages, valid)
}

fn validate_name(mut messages: Vec<String>, name: &str) -> (Vec<String>, bool) {
    let mut valid = true;
    if name.chars().count() > 100 {
        valid = false;
        messages.push("name must not exceed 100 characters".into());
    }
    (messages, valid)
}

fn validate_email(mut messages: Vec<String>, email: Option<&str>) -> (Vec<String>, bool) {
    let mut valid = true;
    if let Some(email) = email {
        if email.chars().count() > 255 {
            valid = false;
            messages.push("email must not exceed 255 characters".into());
        } else if !email_address::EmailAddress::is_valid(email) {
            valid = false;
            messages.push(format!("email address {email:?} is invalid"));
        }
    }
    (messages, valid)
}

fn validate_phone(mut messages: Vec<String>, phone: Option<&str>) -> (Vec<String>, bool) {
    let mut valid = true;
    if phone.is_some_and(|phone| phone.chars().count() > 32) {
        valid = false;
        messages.push("phone must not exceed 32 characters".into());
    }
    (messages, valid)
}

pub fn hash_password(password: &str) -> Result<String, Error> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(Error::PasswordHash)
}

pub fn verify_password(password: &str, password_hash: &str) -> Result<bool, Error> {
    let parsed = PasswordHash::new(password_hash).map_err(Error::StoredPasswordUnableToParse)?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(err) => Err(Error::PasswordUnableToVerify(err)),
    }
}

pub mod login {
    use super::*;

    pub async fn post(
        State(app_state): State<AppState>,
        ApiJson(credentials): ApiJson<Credentials>,
    ) -> Result<Json<LoginResponse>, ApiError> {
        authenticate(app_state.store.as_ref(), &app_state.tokens, credentials)
            .await
            .map(Json)
    }
}

pub mod register {
    use super::*;

    /// Public self-registration always yields `ROLE_USER`.
    pub async fn post(
        State(app_state): State<AppState>,
        ApiJson(request): ApiJson<RegistrationRequest>,
    ) -> Result<Json<UserView>, ApiError> {
        register(app_state.store.as_ref(), request, Some(Role::User))
            .await
            .map(Json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assist_db::MemoryStore;
    use std::time::Duration;

    fn request(username: &str, password: &str, role: Option<&str>) -> RegistrationRequest {
        RegistrationRequest {
            username: username.into(),
            password: password.into(),
            name: "Jane Wanjiku".into(),
            role: role.map(Into::into),
            email: Some("jane@example.org".into()),
            phone: None,
        }
    }

    fn tokens() -> Tokens {
        Tokens::new("0123456789abcdef0123456789abcdef", Duration::from_secs(60)).unwrap()
    }

    #[test]
    fn hashed_password_verifies() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash).unwrap());
        assert!(!verify_password("wrong horse", &hash).unwrap());
    }

    #[test]
    fn validation_collects_every_message() {
        let mut bad = request("a b", "short", Some("ROLE_SUPERUSER"));
        bad.email = Some("not-an-email".into());
        let messages = new_user(bad, None).unwrap_err();
        assert_eq!(messages.len(), 5, "{messages:?}");
    }

    #[test]
    fn contact_details_must_fit_their_columns() {
        let mut long_phone = request("jane.w", "password123", Some("ROLE_USER"));
        long_phone.phone = Some("0".repeat(33));
        assert_eq!(
            new_user(long_phone, None).unwrap_err(),
            vec!["phone must not exceed 32 characters".to_owned()]
        );
        let mut long_email = request("jane.w", "password123", Some("ROLE_USER"));
        long_email.email = Some(format!("{}@example.org", "j".repeat(250)));
        assert_eq!(
            new_user(long_email, None).unwrap_err(),
            vec!["email must not exceed 255 characters".to_owned()]
        );
        let mut fits = request("jane.w", "password123", Some("ROLE_USER"));
        fits.phone = Some(format!(" {} ", "0".repeat(32)));
        assert_eq!(new_user(fits, None).unwrap().phone, Some("0".repeat(32)));
    }

    #[tokio::test]
    async fn public_registration_forces_user_role() {
        let store = MemoryStore::new();
        let user = register(
            &store,
            request("jane.w", "password123", Some("ROLE_ADMIN")),
            Some(Role::User),
        )
        .await
        .unwrap();
        assert_eq!(user.role, Role::User);
    }

    #[tokio::test]
    async fn duplicate_username_is_a_conflict() {
        let store = MemoryStore::new();
        register(&store, request("jane.w", "password123", Some("USER")), None)
            .await
            .unwrap();
        let err = register(&store, request("JANE.W", "password123", Some("USER")), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Duplicate(_)), "{err:?}");
    }

    #[tokio::test]
    async fn login_issues_token_for_valid_credentials_only() {
        let store = MemoryStore::new();
        let tokens = tokens();
        register(&store, request("approver1", "password123", Some("APPROVER")), None)
            .await
            .unwrap();
        let response = authenticate(
            &store,
            &tokens,
            Credentials {
                username: "approver1".into(),
                password: "password123".into(),
            },
        )
        .await
        .unwrap();
        assert_eq!(response.role, Role::Approver);
        assert_eq!(tokens.verify(&response.token).unwrap().sub, "approver1");

        let err = authenticate(
            &store,
            &tokens,
            Credentials {
                username: "approver1".into(),
                password: "password124".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));
    }
}
