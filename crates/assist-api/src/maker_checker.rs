//! Second-person confirmation of proposed verifications and approvals.

use crate::{
    applicants, applications,
    caller::Caller,
    error::{ApiError, ApiPath, ApiQuery},
    views::{ApplicantView, ApplicationView, LogView},
    AppState,
};
use assist_db::{
    status::{Action, EntityType, LogStatus, Role},
    workflow::ConfirmPolicy,
    Store,
};
use axum::{extract::State, Json};

#[derive(Clone, Copy, Debug, serde::Deserialize)]
pub struct ConfirmParams {
    pub approve: bool,
}

/// Roles allowed to resolve a proposed `action`.
fn checkers(action: Action) -> &'static [Role] {
    match action {
        Action::Verify => &[Role::Verifier, Role::Approver],
        Action::Approve => &[Role::Approver],
    }
}

/// Resolves a proposed log. With `expected` set, logs for the other entity type are refused.
#[tracing::instrument(skip(store), fields(caller = %caller.username))]
pub async fn confirm(
    store: &dyn Store,
    caller: &Caller,
    log_id: i32,
    approve: bool,
    expected: Option<EntityType>,
    policy: ConfirmPolicy,
) -> Result<LogView, ApiError> {
    caller.require(&[Role::Verifier, Role::Approver])?;
    let log = store
        .load_log(log_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Maker-checker log not found with ID: {log_id}")))?;
    if let Some(expected) = expected {
        if log.entity_type != expected {
            return Err(ApiError::InvalidArgument(format!(
                "Maker-checker log {log_id} concerns an {} not an {}",
                log.entity_type.as_str().to_lowercase(),
                expected.as_str().to_lowercase()
            )));
        }
    }
    caller.require(checkers(log.action))?;
    let log = store.confirm_log(log_id, caller.id, approve, policy).await?;
    tracing::info!(status = %log.status, "maker-checker log resolved");
    Ok(log.into())
}

pub async fn pending(store: &dyn Store, caller: &Caller) -> Result<Vec<LogView>, ApiError> {
    caller.require(&[Role::Approver, Role::Verifier])?;
    Ok(store
        .list_logs(LogStatus::Proposed)
        .await?
        .into_iter()
        .map(Into::into)
        .collect())
}

pub async fn propose_verification_handler(
    State(app_state): State<AppState>,
    caller: Caller,
    ApiPath(applicant_id): ApiPath<i32>,
) -> Result<Json<ApplicantView>, ApiError> {
    applicants::verify(app_state.store.as_ref(), &caller, applicant_id, true)
        .await
        .map(Json)
}

pub async fn propose_approval_handler(
    State(app_state): State<AppState>,
    caller: Caller,
    ApiPath(application_id): ApiPath<i32>,
) -> Result<Json<ApplicationView>, ApiError> {
    applications::approve(app_state.store.as_ref(), &caller, application_id, true)
        .await
        .map(Json)
}

pub async fn confirm_handler(
    State(app_state): State<AppState>,
    caller: Caller,
    ApiPath(log_id): ApiPath<i32>,
    ApiQuery(params): ApiQuery<ConfirmParams>,
) -> Result<Json<LogView>, ApiError> {
    confirm(
        app_state.store.as_ref(),
        &caller,
        log_id,
        params.approve,
        None,
        app_state.confirm_policy,
    )
    .await
    .map(Json)
}

pub async fn pending_handler(
    State(app_state): State<AppState>,
    caller: Caller,
) -> Result<Json<Vec<LogView>>, ApiError> {
    pending(app_state.store.as_ref(), &caller).await.map(Json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{seeded, user};
    use assist_db::{
        models::NewApplication,
        status::{ApplicationStatus, VerificationStatus},
        ApplicantStore, ApplicationStore,
    };

    #[tokio::test]
    async fn confirming_a_verification_updates_applicant_and_log() {
        let seeded = seeded().await;
        let applicant = applicants::create(
            &seeded.store,
            &seeded.collector,
            seeded.applicant_request("12345678"),
        )
        .await
        .unwrap();
        applicants::verify(&seeded.store, &seeded.verifier, applicant.id, true)
            .await
            .unwrap();
        let log = pending(&seeded.store, &seeded.approver).await.unwrap()[0].clone();

        let resolved = confirm(
            &seeded.store,
            &seeded.approver,
            log.id,
            true,
            Some(EntityType::Applicant),
            ConfirmPolicy::default(),
        )
        .await
        .unwrap();
        assert_eq!(resolved.status, LogStatus::Approved);
        assert_eq!(resolved.checker_id, Some(seeded.approver.id));
        let applicant = seeded
            .store
            .load_applicant(applicant.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(applicant.verification_status, VerificationStatus::Verified);
        assert!(pending(&seeded.store, &seeded.approver)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn rejecting_a_verification_rejects_both() {
        let seeded = seeded().await;
        let applicant = applicants::create(
            &seeded.store,
            &seeded.collector,
            seeded.applicant_request("12345678"),
        )
        .await
        .unwrap();
        applicants::verify(&seeded.store, &seeded.verifier, applicant.id, true)
            .await
            .unwrap();
        let log = pending(&seeded.store, &seeded.verifier).await.unwrap()[0].clone();
        let second_verifier = user(&seeded.store, "verifier2", Role::Verifier).await;

        let resolved = confirm(
            &seeded.store,
            &second_verifier,
            log.id,
            false,
            None,
            ConfirmPolicy::default(),
        )
        .await
        .unwrap();
        assert_eq!(resolved.status, LogStatus::Rejected);
        let applicant = seeded
            .store
            .load_applicant(applicant.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(applicant.verification_status, VerificationStatus::Rejected);
    }

    #[tokio::test]
    async fn maker_may_not_confirm_unless_allowed() {
        let seeded = seeded().await;
        let applicant = applicants::create(
            &seeded.store,
            &seeded.collector,
            seeded.applicant_request("12345678"),
        )
        .await
        .unwrap();
        applicants::verify(&seeded.store, &seeded.verifier, applicant.id, true)
            .await
            .unwrap();
        let log = pending(&seeded.store, &seeded.verifier).await.unwrap()[0].clone();

        let err = confirm(
            &seeded.store,
            &seeded.verifier,
            log.id,
            true,
            None,
            ConfirmPolicy::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::InvalidState(_)), "{err:?}");

        let resolved = confirm(
            &seeded.store,
            &seeded.verifier,
            log.id,
            true,
            None,
            ConfirmPolicy {
                allow_self_confirm: true,
            },
        )
        .await
        .unwrap();
        assert_eq!(resolved.status, LogStatus::Approved);
    }

    #[tokio::test]
    async fn approval_logs_need_an_approver() {
        let seeded = seeded().await;
        let applicant = applicants::create(
            &seeded.store,
            &seeded.collector,
            seeded.applicant_request("12345678"),
        )
        .await
        .unwrap();
        applicants::verify(&seeded.store, &seeded.verifier, applicant.id, false)
            .await
            .unwrap();
        let application = seeded
            .store
            .create_application(NewApplication {
                applicant_id: applicant.id,
                programme_id: seeded.programme_id,
                application_date: jiff::civil::date(2025, 3, 1),
            })
            .await
            .unwrap();
        applications::approve(&seeded.store, &seeded.approver, application.id, true)
            .await
            .unwrap();
        let log = pending(&seeded.store, &seeded.approver).await.unwrap()[0].clone();

        let err = confirm(
            &seeded.store,
            &seeded.verifier,
            log.id,
            true,
            None,
            ConfirmPolicy::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden));

        let err = confirm(
            &seeded.store,
            &seeded.approver,
            log.id,
            true,
            Some(EntityType::Applicant),
            ConfirmPolicy::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::InvalidArgument(_)));

        let second_approver = user(&seeded.store, "approver2", Role::Approver).await;
        confirm(
            &seeded.store,
            &second_approver,
            log.id,
            true,
            Some(EntityType::Application),
            ConfirmPolicy::default(),
        )
        .await
        .unwrap();
        let application = seeded
            .store
            .load_application(application.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(application.status, ApplicationStatus::Approved);
        assert_eq!(application.checker_id, Some(second_approver.id));
        assert_eq!(application.maker_id, Some(seeded.approver.id));
    }

    #[tokio::test]
    async fn resolved_logs_cannot_be_confirmed_again() {
        let seeded = seeded().await;
        let applicant = applicants::create(
            &seeded.store,
            &seeded.collector,
            seeded.applicant_request("12345678"),
        )
        .await
        .unwrap();
        applicants::verify(&seeded.store, &seeded.verifier, applicant.id, true)
            .await
            .unwrap();
        let log = pending(&seeded.store, &seeded.approver).await.unwrap()[0].clone();
        confirm(
            &seeded.store,
            &seeded.approver,
            log.id,
            true,
            None,
            ConfirmPolicy::default(),
        )
        .await
        .unwrap();
        let err = confirm(
            &seeded.store,
            &seeded.approver,
            log.id,
            false,
            None,
            ConfirmPolicy::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::InvalidState(_)), "{err:?}");
    }

    #[tokio::test]
    async fn unknown_log_is_not_found() {
        let seeded = seeded().await;
        let err = confirm(
            &seeded.store,
            &seeded.approver,
            4242,
            true,
            None,
            ConfirmPolicy::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}
