use super::{applicants::insert_applicant, maker_checker::insert_log, now, PgStore};
use crate::{
    models::{Applicant, Application, NewApplicant, NewApplication},
    paging::{ApplicationSort, Page, PageRequest, SortKey},
    query::{ApplicationFilter, ApplicationRow, ExportFilter, LocationScope, ProgrammeStats},
    schema::assist::{
        applicants, applications, locations, programmes, sub_counties, sub_locations, villages,
    },
    status::{Action, ApplicationStatus, EntityType, VerificationStatus},
    store::{
        applicant_not_found, application_not_found, duplicate_application, programme_not_found,
        Acted, ApplicationStore,
    },
    workflow, Error,
};
use diesel::prelude::*;
use diesel_async::{
    scoped_futures::ScopedFutureExt, AsyncConnection, AsyncPgConnection, RunQueryDsl,
};

#[derive(Insertable)]
#[diesel(table_name = applications)]
struct ApplicationInsert {
    applicant_id: i32,
    programme_id: i32,
    application_date: jiff_diesel::Date,
    status: ApplicationStatus,
    created: jiff_diesel::Timestamp,
    updated: jiff_diesel::Timestamp,
}

async fn check_references(
    conn: &mut AsyncPgConnection,
    applicant_id: i32,
    programme_id: i32,
) -> Result<(), Error> {
    let applicant: Option<i32> = applicants::table
        .find(applicant_id)
        .select(applicants::id)
        .first(conn)
        .await
        .optional()?;
    if applicant.is_none() {
        return Err(applicant_not_found(applicant_id));
    }
    let programme: Option<i32> = programmes::table
        .find(programme_id)
        .select(programmes::id)
        .first(conn)
        .await
        .optional()?;
    if programme.is_none() {
        return Err(programme_not_found(programme_id));
    }
    Ok(())
}

/// Early duplicate check; the unique `(applicant_id, programme_id)` constraint still decides races.
async fn check_pair_free(
    conn: &mut AsyncPgConnection,
    applicant_id: i32,
    programme_id: i32,
    except_application: Option<i32>,
) -> Result<(), Error> {
    let holder: Option<i32> = applications::table
        .filter(applications::applicant_id.eq(applicant_id))
        .filter(applications::programme_id.eq(programme_id))
        .select(applications::id)
        .first(conn)
        .await
        .optional()?;
    match holder {
        Some(holder) if Some(holder) != except_application => Err(duplicate_application()),
        _ => Ok(()),
    }
}

async fn insert_application(
    conn: &mut AsyncPgConnection,
    application: &NewApplication,
    now: jiff_diesel::Timestamp,
) -> Result<Application, Error> {
    check_references(conn, application.applicant_id, application.programme_id).await?;
    check_pair_free(conn, application.applicant_id, application.programme_id, None).await?;
    diesel::insert_into(applications::table)
        .values(ApplicationInsert {
            applicant_id: application.applicant_id,
            programme_id: application.programme_id,
            application_date: application.application_date.into(),
            status: ApplicationStatus::Pending,
            created: now,
            updated: now,
        })
        .returning(Application::as_returning())
        .get_result(conn)
        .await
        .map_err(Into::into)
}

async fn load_application_for_update(
    conn: &mut AsyncPgConnection,
    application_id: i32,
) -> Result<Application, Error> {
    applications::table
        .find(application_id)
        .select(Application::as_select())
        .for_update()
        .first(conn)
        .await
        .optional()?
        .ok_or_else(|| application_not_found(application_id))
}

fn filtered(filter: &ApplicationFilter) -> applications::BoxedQuery<'static, diesel::pg::Pg> {
    let mut query = applications::table.into_boxed();
    if let Some(applicant_id) = filter.applicant_id {
        query = query.filter(applications::applicant_id.eq(applicant_id));
    }
    if let Some(programme_id) = filter.programme_id {
        query = query.filter(applications::programme_id.eq(programme_id));
    }
    if let Some(status) = filter.status {
        query = query.filter(applications::status.eq(status));
    }
    query
}

type ExportTuple = (
    i32,
    String,
    Option<String>,
    String,
    String,
    ApplicationStatus,
    jiff_diesel::Date,
);

#[async_trait::async_trait]
impl ApplicationStore for PgStore {
    #[tracing::instrument(skip(self))]
    async fn create_application(&self, application: NewApplication) -> Result<Application, Error> {
        let now = now();
        self.connection()
            .await?
            .transaction(|conn| {
                async move { insert_application(conn, &application, now).await }.scope_boxed()
            })
            .await
    }

    #[tracing::instrument(skip(self, new_applications), fields(count = new_applications.len()))]
    async fn create_applications(
        &self,
        new_applications: Vec<NewApplication>,
    ) -> Result<Vec<Application>, Error> {
        let now = now();
        self.connection()
            .await?
            .transaction(|conn| {
                async move {
                    let mut created = Vec::with_capacity(new_applications.len());
                    for application in &new_applications {
                        created.push(insert_application(conn, application, now).await?);
                    }
                    Ok::<_, Error>(created)
                }
                .scope_boxed()
            })
            .await
    }

    #[tracing::instrument(skip(self, applicant), fields(id_number = %applicant.id_number))]
    async fn enrol_applicant(
        &self,
        applicant: NewApplicant,
        programme_id: i32,
        application_date: jiff::civil::Date,
    ) -> Result<(Applicant, Application), Error> {
        let now = now();
        self.connection()
            .await?
            .transaction(|conn| {
                async move {
                    let applicant = insert_applicant(conn, &applicant, now).await?;
                    let application = NewApplication {
                        applicant_id: applicant.id,
                        programme_id,
                        application_date,
                    };
                    let application = insert_application(conn, &application, now).await?;
                    Ok::<_, Error>((applicant, application))
                }
                .scope_boxed()
            })
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn load_application(&self, application_id: i32) -> Result<Option<Application>, Error> {
        let mut conn = self.connection().await?;
        applications::table
            .find(application_id)
            .select(Application::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(Into::into)
    }

    #[tracing::instrument(skip(self))]
    async fn list_applications(
        &self,
        filter: &ApplicationFilter,
        page: &PageRequest,
    ) -> Result<Page<Application>, Error> {
        let (key, descending) = ApplicationSort::resolve(page.sort.as_ref())?;
        let mut conn = self.connection().await?;
        let total: i64 = filtered(filter).count().get_result(&mut conn).await?;
        let query = filtered(filter);
        let query = match (key, descending) {
            (ApplicationSort::Id, false) => query.order(applications::id.asc()),
            (ApplicationSort::Id, true) => query.order(applications::id.desc()),
            (ApplicationSort::ApplicationDate, false) => {
                query.order(applications::application_date.asc())
            }
            (ApplicationSort::ApplicationDate, true) => {
                query.order(applications::application_date.desc())
            }
            (ApplicationSort::Status, false) => query.order(applications::status.asc()),
            (ApplicationSort::Status, true) => query.order(applications::status.desc()),
        };
        let content = query
            .then_order_by(applications::id.asc())
            .offset(page.offset())
            .limit(page.limit())
            .select(Application::as_select())
            .load(&mut conn)
            .await?;
        Ok(Page::new(content, page, total))
    }

    #[tracing::instrument(skip(self))]
    async fn update_application(
        &self,
        application_id: i32,
        applicant_id: i32,
        programme_id: i32,
    ) -> Result<Application, Error> {
        let now = now();
        self.connection()
            .await?
            .transaction(|conn| {
                async move {
                    let current = load_application_for_update(conn, application_id).await?;
                    if (current.applicant_id, current.programme_id) != (applicant_id, programme_id)
                    {
                        workflow::check_repointable(current.status)?;
                    }
                    check_references(conn, applicant_id, programme_id).await?;
                    check_pair_free(conn, applicant_id, programme_id, Some(application_id))
                        .await?;
                    diesel::update(applications::table.find(application_id))
                        .set((
                            applications::applicant_id.eq(applicant_id),
                            applications::programme_id.eq(programme_id),
                            applications::updated.eq(now),
                        ))
                        .returning(Application::as_returning())
                        .get_result(conn)
                        .await
                        .map_err(Error::from)
                }
                .scope_boxed()
            })
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn delete_application(&self, application_id: i32) -> Result<(), Error> {
        self.connection()
            .await?
            .transaction(|conn| {
                async move {
                    match diesel::delete(applications::table.find(application_id))
                        .execute(conn)
                        .await
                    {
                        Ok(0) => Err(application_not_found(application_id)),
                        Ok(_) => Ok(()),
                        Err(err) => Err(err.into()),
                    }
                }
                .scope_boxed()
            })
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn approve_application(
        &self,
        application_id: i32,
        actor_id: i32,
        use_maker_checker: bool,
    ) -> Result<Acted<Application>, Error> {
        let now = now();
        self.connection()
            .await?
            .transaction(|conn| {
                async move {
                    let application = load_application_for_update(conn, application_id).await?;
                    let applicant_status: VerificationStatus = applicants::table
                        .find(application.applicant_id)
                        .select(applicants::verification_status)
                        .first(conn)
                        .await
                        .optional()?
                        .ok_or_else(|| applicant_not_found(application.applicant_id))?;
                    let next =
                        workflow::approve(applicant_status, application.status, use_maker_checker)?;
                    let (maker_id, checker_id) = if use_maker_checker {
                        (Some(actor_id), application.checker_id)
                    } else {
                        (application.maker_id, Some(actor_id))
                    };
                    let entity = diesel::update(applications::table.find(application_id))
                        .set((
                            applications::status.eq(next),
                            applications::maker_id.eq(maker_id),
                            applications::checker_id.eq(checker_id),
                            applications::updated.eq(now),
                        ))
                        .returning(Application::as_returning())
                        .get_result(conn)
                        .await?;
                    let log = if use_maker_checker {
                        Some(
                            insert_log(
                                conn,
                                EntityType::Application,
                                application_id,
                                Action::Approve,
                                actor_id,
                                now,
                            )
                            .await?,
                        )
                    } else {
                        None
                    };
                    Ok::<_, Error>(Acted { entity, log })
                }
                .scope_boxed()
            })
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn export_applications(
        &self,
        filter: &ExportFilter,
    ) -> Result<Vec<ApplicationRow>, Error> {
        let start: jiff_diesel::Date = filter.start.into();
        let end: jiff_diesel::Date = filter.end.into();
        let mut query = applications::table
            .inner_join(applicants::table)
            .inner_join(programmes::table)
            .filter(applications::application_date.between(start, end))
            .select((
                applications::id,
                applicants::first_name,
                applicants::middle_name,
                applicants::last_name,
                programmes::name,
                applications::status,
                applications::application_date,
            ))
            .into_boxed();
        if let Some(status) = filter.status {
            query = query.filter(applications::status.eq(status));
        }
        if let Some(age) = filter.age {
            query = query.filter(applicants::age.eq(age));
        }
        if let Some(sex_id) = filter.sex_id {
            query = query.filter(applicants::sex_id.eq(sex_id));
        }
        if let Some(marital_status_id) = filter.marital_status_id {
            query = query.filter(applicants::marital_status_id.eq(marital_status_id));
        }
        query = match filter.location {
            LocationScope::All => query,
            LocationScope::Village(id) => query.filter(applicants::village_id.eq(id)),
            LocationScope::SubLocation(id) => query.filter(
                applicants::village_id.eq_any(
                    villages::table
                        .filter(villages::sub_location_id.eq(id))
                        .select(villages::id),
                ),
            ),
            LocationScope::Location(id) => query.filter(
                applicants::village_id.eq_any(
                    villages::table
                        .inner_join(sub_locations::table)
                        .filter(sub_locations::location_id.eq(id))
                        .select(villages::id),
                ),
            ),
            LocationScope::SubCounty(id) => query.filter(
                applicants::village_id.eq_any(
                    villages::table
                        .inner_join(sub_locations::table.inner_join(locations::table))
                        .filter(locations::sub_county_id.eq(id))
                        .select(villages::id),
                ),
            ),
            LocationScope::County(id) => query.filter(
                applicants::village_id.eq_any(
                    villages::table
                        .inner_join(
                            sub_locations::table
                                .inner_join(locations::table.inner_join(sub_counties::table)),
                        )
                        .filter(sub_counties::county_id.eq(id))
                        .select(villages::id),
                ),
            ),
        };
        let mut conn = self.connection().await?;
        let rows: Vec<ExportTuple> = query
            .order(applications::id.asc())
            .load(&mut conn)
            .await?;
        Ok(rows
            .into_iter()
            .map(
                |(id, first_name, middle_name, last_name, programme_name, status, date)| {
                    ApplicationRow {
                        id,
                        first_name,
                        middle_name,
                        last_name,
                        programme_name,
                        status,
                        application_date: date.to_jiff(),
                    }
                },
            )
            .collect())
    }

    #[tracing::instrument(skip(self))]
    async fn application_stats(&self) -> Result<Vec<ProgrammeStats>, Error> {
        let mut conn = self.connection().await?;
        let rows: Vec<(i32, String, ApplicationStatus)> = applications::table
            .inner_join(programmes::table)
            .select((programmes::id, programmes::name, applications::status))
            .load(&mut conn)
            .await?;
        Ok(ProgrammeStats::tally(rows))
    }
}
