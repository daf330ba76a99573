use super::{now, PgStore};
use crate::{
    models::MakerCheckerLog,
    schema::assist::{applicants, applications, maker_checker_logs},
    status::{Action, ApplicationStatus, EntityType, LogStatus, VerificationStatus},
    store::{applicant_not_found, application_not_found, log_not_found, MakerCheckerStore},
    workflow::{self, ConfirmPolicy, TargetStatus},
    Error,
};
use diesel::prelude::*;
use diesel_async::{
    scoped_futures::ScopedFutureExt, AsyncConnection, AsyncPgConnection, RunQueryDsl,
};

#[derive(Insertable)]
#[diesel(table_name = maker_checker_logs)]
struct LogRow {
    entity_type: EntityType,
    entity_id: i32,
    action: Action,
    status: LogStatus,
    maker_id: i32,
    created: jiff_diesel::Timestamp,
    updated: jiff_diesel::Timestamp,
}

/// Records a proposed action made by `maker_id`.
pub(super) async fn insert_log(
    conn: &mut AsyncPgConnection,
    entity_type: EntityType,
    entity_id: i32,
    action: Action,
    maker_id: i32,
    now: jiff_diesel::Timestamp,
) -> Result<MakerCheckerLog, Error> {
    diesel::insert_into(maker_checker_logs::table)
        .values(LogRow {
            entity_type,
            entity_id,
            action,
            status: LogStatus::Proposed,
            maker_id,
            created: now,
            updated: now,
        })
        .returning(MakerCheckerLog::as_returning())
        .get_result(conn)
        .await
        .map_err(Into::into)
}

#[async_trait::async_trait]
impl MakerCheckerStore for PgStore {
    #[tracing::instrument(skip(self))]
    async fn load_log(&self, log_id: i32) -> Result<Option<MakerCheckerLog>, Error> {
        let mut conn = self.connection().await?;
        maker_checker_logs::table
            .find(log_id)
            .select(MakerCheckerLog::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(Into::into)
    }

    #[tracing::instrument(skip(self))]
    async fn list_logs(&self, status: LogStatus) -> Result<Vec<MakerCheckerLog>, Error> {
        let mut conn = self.connection().await?;
        maker_checker_logs::table
            .filter(maker_checker_logs::status.eq(status))
            .order((maker_checker_logs::created.desc(), maker_checker_logs::id.desc()))
            .select(MakerCheckerLog::as_select())
            .load(&mut conn)
            .await
            .map_err(Into::into)
    }

    #[tracing::instrument(skip(self))]
    async fn confirm_log(
        &self,
        log_id: i32,
        checker_id: i32,
        approve: bool,
        policy: ConfirmPolicy,
    ) -> Result<MakerCheckerLog, Error> {
        let now = now();
        self.connection()
            .await?
            .transaction(|conn| {
                async move {
                    let log = maker_checker_logs::table
                        .find(log_id)
                        .select(MakerCheckerLog::as_select())
                        .for_update()
                        .first(conn)
                        .await
                        .optional()?
                        .ok_or_else(|| log_not_found(log_id))?;
                    let resolution = workflow::resolve(&log, checker_id, approve, policy)?;
                    if resolution.target == TargetStatus::Application(ApplicationStatus::Approved) {
                        let applicant_status: VerificationStatus = applications::table
                            .inner_join(applicants::table)
                            .filter(applications::id.eq(log.entity_id))
                            .select(applicants::verification_status)
                            .for_update()
                            .first(conn)
                            .await
                            .optional()?
                            .ok_or_else(|| application_not_found(log.entity_id))?;
                        workflow::check_approvable(applicant_status)?;
                    }
                    let updated = match resolution.target {
                        TargetStatus::Applicant(status) => {
                            diesel::update(applicants::table.find(log.entity_id))
                                .set((
                                    applicants::verification_status.eq(status),
                                    applicants::updated.eq(now),
                                ))
                                .execute(conn)
                                .await?
                        }
                        TargetStatus::Application(status) => {
                            diesel::update(applications::table.find(log.entity_id))
                                .set((
                                    applications::status.eq(status),
                                    applications::checker_id.eq(checker_id),
                                    applications::updated.eq(now),
                                ))
                                .execute(conn)
                                .await?
                        }
                    };
                    if updated == 0 {
                        return Err(match log.entity_type {
                            EntityType::Applicant => applicant_not_found(log.entity_id),
                            EntityType::Application => application_not_found(log.entity_id),
                        });
                    }
                    diesel::update(maker_checker_logs::table.find(log_id))
                        .set((
                            maker_checker_logs::status.eq(resolution.log_status),
                            maker_checker_logs::checker_id.eq(checker_id),
                            maker_checker_logs::updated.eq(now),
                        ))
                        .returning(MakerCheckerLog::as_returning())
                        .get_result(conn)
                        .await
                        .map_err(Error::from)
                }
                .scope_boxed()
            })
            .await
    }
}
