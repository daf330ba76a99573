//! Lookup data: parameters, villages and programmes.

use crate::{
    caller::Caller,
    error::{ApiError, ApiJson, ApiQuery},
    views::{PageParams, ParameterView, ProgrammeView, VillageView},
    AppState,
};
use assist_db::{paging::Page, status::Role, Store};
use axum::{extract::State, Json};

#[derive(Clone, Debug, Default, serde::Deserialize)]
pub struct CategoryParams {
    pub category: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubLocationParams {
    pub sub_location_id: Option<i32>,
}

#[derive(Clone, Debug, serde::Deserialize)]
pub struct ProgrammeRequest {
    pub name: String,
}

#[tracing::instrument(skip(store), fields(caller = %caller.username))]
pub async fn create_programme(
    store: &dyn Store,
    caller: &Caller,
    name: &str,
) -> Result<ProgrammeView, ApiError> {
    caller.require(&[Role::Admin])?;
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::Validation(vec!["Programme name is required".into()]));
    }
    if name.chars().count() > 100 {
        return Err(ApiError::Validation(vec![
            "Programme name must not exceed 100 characters".into(),
        ]));
    }
    let programme = store.create_programme(name.to_owned()).await?;
    tracing::info!(programme_id = programme.id, "programme created");
    Ok(programme.into())
}

pub async fn parameters_handler(
    State(app_state): State<AppState>,
    _caller: Caller,
    ApiQuery(params): ApiQuery<CategoryParams>,
    ApiQuery(page): ApiQuery<PageParams>,
) -> Result<Json<Page<ParameterView>>, ApiError> {
    let category = params
        .category
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty());
    Ok(Json(
        app_state
            .store
            .list_parameters(category, &page.to_request()?)
            .await?
            .map(Into::into),
    ))
}

pub async fn villages_handler(
    State(app_state): State<AppState>,
    _caller: Caller,
    ApiQuery(params): ApiQuery<SubLocationParams>,
    ApiQuery(page): ApiQuery<PageParams>,
) -> Result<Json<Page<VillageView>>, ApiError> {
    Ok(Json(
        app_state
            .store
            .list_villages(params.sub_location_id, &page.to_request()?)
            .await?
            .map(Into::into),
    ))
}

pub async fn programmes_handler(
    State(app_state): State<AppState>,
    _caller: Caller,
) -> Result<Json<Vec<ProgrammeView>>, ApiError> {
    Ok(Json(
        app_state
            .store
            .list_programmes()
            .await?
            .into_iter()
            .map(Into::into)
            .collect(),
    ))
}

pub async fn create_programme_handler(
    State(app_state): State<AppState>,
    caller: Caller,
    ApiJson(request): ApiJson<ProgrammeRequest>,
) -> Result<Json<ProgrammeView>, ApiError> {
    create_programme(app_state.store.as_ref(), &caller, &request.name)
        .await
        .map(Json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::seeded;

    #[tokio::test]
    async fn programme_names_are_unique() {
        let seeded = seeded().await;
        let created = create_programme(&seeded.store, &seeded.admin, "  Youth Fund ")
            .await
            .unwrap();
        assert_eq!(created.name, "Youth Fund");
        let err = create_programme(&seeded.store, &seeded.admin, "Youth Fund")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Duplicate(_)), "{err:?}");
    }

    #[tokio::test]
    async fn programmes_are_created_by_admins_only() {
        let seeded = seeded().await;
        assert!(matches!(
            create_programme(&seeded.store, &seeded.collector, "Youth Fund").await,
            Err(ApiError::Forbidden)
        ));
        assert!(matches!(
            create_programme(&seeded.store, &seeded.admin, " ").await,
            Err(ApiError::Validation(_))
        ));
    }
}
