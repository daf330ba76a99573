use crate::{
    caller::Caller,
    error::{ApiError, ApiJson, ApiPath, ApiQuery},
    login::{self, RegistrationRequest, UserView},
    AppState,
};
use assist_db::{status::Role, Store};
use axum::{extract::State, http::StatusCode, Json};

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordParams {
    pub old_password: String,
    pub new_password: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub new_password: String,
}

pub async fn list(store: &dyn Store, caller: &Caller) -> Result<Vec<UserView>, ApiError> {
    caller.require(&[Role::Admin])?;
    Ok(store
        .list_users()
        .await?
        .into_iter()
        .map(Into::into)
        .collect())
}

/// Registration by an administrator, honouring the requested role.
pub async fn register(
    store: &dyn Store,
    caller: &Caller,
    request: RegistrationRequest,
) -> Result<UserView, ApiError> {
    caller.require(&[Role::Admin])?;
    login::register(store, request, None).await
}

#[tracing::instrument(skip(store, old_password, new_password), fields(caller = %caller.username))]
pub async fn change_password(
    store: &dyn Store,
    caller: &Caller,
    old_password: &str,
    new_password: &str,
) -> Result<(), ApiError> {
    let user = store
        .load_user_by_id(caller.id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("User not found with ID: {}", caller.id)))?;
    if !login::verify_password(old_password, &user.password_hash)? {
        return Err(ApiError::InvalidState("Old password is incorrect".into()));
    }
    store_new_password(store, user.id, new_password).await?;
    tracing::info!("password changed");
    Ok(())
}

/// Sets a user's password without the old one. Administrators may reset anyone's password.
#[tracing::instrument(skip(store, new_password), fields(caller = %caller.username))]
pub async fn reset_password(
    store: &dyn Store,
    caller: &Caller,
    user_id: i32,
    new_password: &str,
) -> Result<(), ApiError> {
    if caller.role != Role::Admin && caller.id != user_id {
        return Err(ApiError::Forbidden);
    }
    store_new_password(store, user_id, new_password).await?;
    tracing::info!("password reset");
    Ok(())
}

async fn store_new_password(
    store: &dyn Store,
    user_id: i32,
    new_password: &str,
) -> Result<(), ApiError> {
    let (messages, valid) = login::validate_password(Vec::new(), new_password);
    if !valid {
        return Err(ApiError::Validation(messages));
    }
    let password_hash = login::hash_password(new_password)?;
    store.update_password(user_id, password_hash).await?;
    Ok(())
}

pub async fn list_handler(
    State(app_state): State<AppState>,
    caller: Caller,
) -> Result<Json<Vec<UserView>>, ApiError> {
    list(app_state.store.as_ref(), &caller).await.map(Json)
}

pub async fn register_handler(
    State(app_state): State<AppState>,
    caller: Caller,
    ApiJson(request): ApiJson<RegistrationRequest>,
) -> Result<Json<UserView>, ApiError> {
    register(app_state.store.as_ref(), &caller, request)
        .await
        .map(Json)
}

pub async fn change_password_handler(
    State(app_state): State<AppState>,
    caller: Caller,
    ApiQuery(params): ApiQuery<ChangePasswordParams>,
) -> Result<StatusCode, ApiError> {
    change_password(
        app_state.store.as_ref(),
        &caller,
        &params.old_password,
        &params.new_password,
    )
    .await?;
    Ok(StatusCode::OK)
}

pub async fn reset_password_handler(
    State(app_state): State<AppState>,
    caller: Caller,
    ApiPath(user_id): ApiPath<i32>,
    ApiJson(request): ApiJson<ResetPasswordRequest>,
) -> Result<StatusCode, ApiError> {
    reset_password(
        app_state.store.as_ref(),
        &caller,
        user_id,
        &request.new_password,
    )
    .await?;
    Ok(StatusCode::OK)
}
