use super::{contains_pattern, maker_checker::insert_log, now, PgStore};
use crate::{
    models::{Applicant, NewApplicant},
    paging::{ApplicantSort, Page, PageRequest, SortKey},
    query::ApplicantFilter,
    schema::assist::{applicants, applications, parameters, villages},
    status::{Action, EntityType, VerificationStatus},
    store::{applicant_not_found, duplicate_id_number, Acted, ApplicantStore},
    workflow, Error,
};
use diesel::prelude::*;
use diesel_async::{
    scoped_futures::ScopedFutureExt, AsyncConnection, AsyncPgConnection, RunQueryDsl,
};

#[derive(Insertable)]
#[diesel(table_name = applicants)]
struct ApplicantRow<'a> {
    first_name: &'a str,
    middle_name: Option<&'a str>,
    last_name: &'a str,
    sex_id: i32,
    age: i32,
    marital_status_id: i32,
    id_number: &'a str,
    village_id: i32,
    postal_address: Option<&'a str>,
    physical_address: Option<&'a str>,
    telephone: Option<&'a str>,
    verification_status: VerificationStatus,
    created: jiff_diesel::Timestamp,
    updated: jiff_diesel::Timestamp,
}

#[derive(AsChangeset)]
#[diesel(table_name = applicants)]
#[diesel(treat_none_as_null = true)]
struct ApplicantChanges<'a> {
    first_name: &'a str,
    middle_name: Option<&'a str>,
    last_name: &'a str,
    sex_id: i32,
    age: i32,
    marital_status_id: i32,
    id_number: &'a str,
    village_id: i32,
    postal_address: Option<&'a str>,
    physical_address: Option<&'a str>,
    telephone: Option<&'a str>,
    updated: jiff_diesel::Timestamp,
}

impl<'a> ApplicantChanges<'a> {
    fn new(applicant: &'a NewApplicant, now: jiff_diesel::Timestamp) -> Self {
        ApplicantChanges {
            first_name: &applicant.first_name,
            middle_name: applicant.middle_name.as_deref(),
            last_name: &applicant.last_name,
            sex_id: applicant.sex_id,
            age: applicant.age,
            marital_status_id: applicant.marital_status_id,
            id_number: &applicant.id_number,
            village_id: applicant.village_id,
            postal_address: applicant.postal_address.as_deref(),
            physical_address: applicant.physical_address.as_deref(),
            telephone: applicant.telephone.as_deref(),
            updated: now,
        }
    }
}

/// Fails with `NotFound` naming the first parameter or village the applicant refers to that does not exist.
async fn check_references(
    conn: &mut AsyncPgConnection,
    applicant: &NewApplicant,
) -> Result<(), Error> {
    let sex: Option<i32> = parameters::table
        .find(applicant.sex_id)
        .select(parameters::id)
        .first(conn)
        .await
        .optional()?;
    if sex.is_none() {
        return Err(Error::NotFound(format!(
            "Sex parameter not found with ID: {}",
            applicant.sex_id
        )));
    }
    let marital_status: Option<i32> = parameters::table
        .find(applicant.marital_status_id)
        .select(parameters::id)
        .first(conn)
        .await
        .optional()?;
    if marital_status.is_none() {
        return Err(Error::NotFound(format!(
            "Marital status parameter not found with ID: {}",
            applicant.marital_status_id
        )));
    }
    let village: Option<i32> = villages::table
        .find(applicant.village_id)
        .select(villages::id)
        .first(conn)
        .await
        .optional()?;
    if village.is_none() {
        return Err(Error::NotFound(format!(
            "Village not found with ID: {}",
            applicant.village_id
        )));
    }
    Ok(())
}

/// Early duplicate check; the unique constraint on `id_number` still decides races.
async fn check_id_number_free(
    conn: &mut AsyncPgConnection,
    id_number: &str,
    except_applicant: Option<i32>,
) -> Result<(), Error> {
    let holder: Option<i32> = applicants::table
        .filter(applicants::id_number.eq(id_number))
        .select(applicants::id)
        .first(conn)
        .await
        .optional()?;
    match holder {
        Some(holder) if Some(holder) != except_applicant => Err(duplicate_id_number()),
        _ => Ok(()),
    }
}

pub(super) async fn insert_applicant(
    conn: &mut AsyncPgConnection,
    applicant: &NewApplicant,
    now: jiff_diesel::Timestamp,
) -> Result<Applicant, Error> {
    check_id_number_free(conn, &applicant.id_number, None).await?;
    check_references(conn, applicant).await?;
    let row = ApplicantRow {
        first_name: &applicant.first_name,
        middle_name: applicant.middle_name.as_deref(),
        last_name: &applicant.last_name,
        sex_id: applicant.sex_id,
        age: applicant.age,
        marital_status_id: applicant.marital_status_id,
        id_number: &applicant.id_number,
        village_id: applicant.village_id,
        postal_address: applicant.postal_address.as_deref(),
        physical_address: applicant.physical_address.as_deref(),
        telephone: applicant.telephone.as_deref(),
        verification_status: VerificationStatus::Pending,
        created: now,
        updated: now,
    };
    diesel::insert_into(applicants::table)
        .values(row)
        .returning(Applicant::as_returning())
        .get_result(conn)
        .await
        .map_err(Into::into)
}

pub(super) async fn load_applicant_for_update(
    conn: &mut AsyncPgConnection,
    applicant_id: i32,
) -> Result<Applicant, Error> {
    applicants::table
        .find(applicant_id)
        .select(Applicant::as_select())
        .for_update()
        .first(conn)
        .await
        .optional()?
        .ok_or_else(|| applicant_not_found(applicant_id))
}

fn filtered<'a>(filter: &'a ApplicantFilter) -> applicants::BoxedQuery<'a, diesel::pg::Pg> {
    let mut query = applicants::table.into_boxed();
    if let Some(name) = filter.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        let pattern = contains_pattern(name);
        query = query.filter(
            applicants::first_name
                .ilike(pattern.clone())
                .or(applicants::middle_name.ilike(pattern.clone()))
                .or(applicants::last_name.ilike(pattern)),
        );
    }
    if let Some(id_number) = filter.id_number.as_deref() {
        query = query.filter(applicants::id_number.eq(id_number));
    }
    if let Some(date_applied) = filter.date_applied {
        query = query.filter(
            applicants::id.eq_any(
                applications::table
                    .filter(applications::application_date.eq(jiff_diesel::Date::from(date_applied)))
                    .select(applications::applicant_id),
            ),
        );
    }
    if let Some(status) = filter.status {
        query = query.filter(applicants::verification_status.eq(status));
    }
    if let Some(village_id) = filter.village_id {
        query = query.filter(applicants::village_id.eq(village_id));
    }
    query
}

#[async_trait::async_trait]
impl ApplicantStore for PgStore {
    #[tracing::instrument(skip(self, applicant), fields(id_number = %applicant.id_number))]
    async fn create_applicant(&self, applicant: NewApplicant) -> Result<Applicant, Error> {
        let now = now();
        self.connection()
            .await?
            .transaction(|conn| {
                async move { insert_applicant(conn, &applicant, now).await }.scope_boxed()
            })
            .await
    }

    #[tracing::instrument(skip(self, new_applicants), fields(count = new_applicants.len()))]
    async fn create_applicants(
        &self,
        new_applicants: Vec<NewApplicant>,
    ) -> Result<Vec<Applicant>, Error> {
        let now = now();
        self.connection()
            .await?
            .transaction(|conn| {
                async move {
                    let mut created = Vec::with_capacity(new_applicants.len());
                    for applicant in &new_applicants {
                        created.push(insert_applicant(conn, applicant, now).await?);
                    }
                    Ok::<_, Error>(created)
                }
                .scope_boxed()
            })
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn load_applicant(&self, applicant_id: i32) -> Result<Option<Applicant>, Error> {
        let mut conn = self.connection().await?;
        applicants::table
            .find(applicant_id)
            .select(Applicant::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(Into::into)
    }

    #[tracing::instrument(skip(self))]
    async fn find_applicant_by_name(
        &self,
        first_name: &str,
        middle_name: Option<&str>,
        last_name: &str,
    ) -> Result<Option<Applicant>, Error> {
        let mut conn = self.connection().await?;
        let mut query = applicants::table
            .filter(applicants::first_name.eq(first_name))
            .filter(applicants::last_name.eq(last_name))
            .into_boxed();
        query = match middle_name {
            Some(middle_name) => query.filter(applicants::middle_name.eq(middle_name)),
            None => query.filter(applicants::middle_name.is_null()),
        };
        query
            .order(applicants::id.asc())
            .select(Applicant::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(Into::into)
    }

    #[tracing::instrument(skip(self))]
    async fn list_applicants(
        &self,
        filter: &ApplicantFilter,
        page: &PageRequest,
    ) -> Result<Page<Applicant>, Error> {
        let (key, descending) = ApplicantSort::resolve(page.sort.as_ref())?;
        let mut conn = self.connection().await?;
        let total: i64 = filtered(filter).count().get_result(&mut conn).await?;
        let query = filtered(filter);
        let query = match (key, descending) {
            (ApplicantSort::Id, false) => query.order(applicants::id.asc()),
            (ApplicantSort::Id, true) => query.order(applicants::id.desc()),
            (ApplicantSort::FirstName, false) => query.order(applicants::first_name.asc()),
            (ApplicantSort::FirstName, true) => query.order(applicants::first_name.desc()),
            (ApplicantSort::LastName, false) => query.order(applicants::last_name.asc()),
            (ApplicantSort::LastName, true) => query.order(applicants::last_name.desc()),
            (ApplicantSort::Age, false) => query.order(applicants::age.asc()),
            (ApplicantSort::Age, true) => query.order(applicants::age.desc()),
            (ApplicantSort::IdNumber, false) => query.order(applicants::id_number.asc()),
            (ApplicantSort::IdNumber, true) => query.order(applicants::id_number.desc()),
            (ApplicantSort::VerificationStatus, false) => {
                query.order(applicants::verification_status.asc())
            }
            (ApplicantSort::VerificationStatus, true) => {
                query.order(applicants::verification_status.desc())
            }
        };
        let content = query
            .then_order_by(applicants::id.asc())
            .offset(page.offset())
            .limit(page.limit())
            .select(Applicant::as_select())
            .load(&mut conn)
            .await?;
        Ok(Page::new(content, page, total))
    }

    #[tracing::instrument(skip(self, changes))]
    async fn update_applicant(
        &self,
        applicant_id: i32,
        changes: NewApplicant,
    ) -> Result<Applicant, Error> {
        let now = now();
        self.connection()
            .await?
            .transaction(|conn| {
                async move {
                    load_applicant_for_update(conn, applicant_id).await?;
                    check_id_number_free(conn, &changes.id_number, Some(applicant_id)).await?;
                    check_references(conn, &changes).await?;
                    diesel::update(applicants::table.find(applicant_id))
                        .set(ApplicantChanges::new(&changes, now))
                        .returning(Applicant::as_returning())
                        .get_result(conn)
                        .await
                        .map_err(Error::from)
                }
                .scope_boxed()
            })
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn delete_applicant(&self, applicant_id: i32) -> Result<(), Error> {
        self.connection()
            .await?
            .transaction(|conn| {
                async move {
                    diesel::delete(
                        applications::table.filter(applications::applicant_id.eq(applicant_id)),
                    )
                    .execute(conn)
                    .await?;
                    match diesel::delete(applicants::table.find(applicant_id))
                        .execute(conn)
                        .await
                    {
                        Ok(0) => Err(applicant_not_found(applicant_id)),
                        Ok(_) => Ok(()),
                        Err(err) => Err(err.into()),
                    }
                }
                .scope_boxed()
            })
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn set_applicant_image(
        &self,
        applicant_id: i32,
        image_path: String,
    ) -> Result<Applicant, Error> {
        let now = now();
        self.connection()
            .await?
            .transaction(|conn| {
                async move {
                    diesel::update(applicants::table.find(applicant_id))
                        .set((applicants::image_path.eq(image_path), applicants::updated.eq(now)))
                        .returning(Applicant::as_returning())
                        .get_result(conn)
                        .await
                        .optional()?
                        .ok_or_else(|| applicant_not_found(applicant_id))
                }
                .scope_boxed()
            })
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn verify_applicant(
        &self,
        applicant_id: i32,
        actor_id: i32,
        use_maker_checker: bool,
    ) -> Result<Acted<Applicant>, Error> {
        let now = now();
        self.connection()
            .await?
            .transaction(|conn| {
                async move {
                    let applicant = load_applicant_for_update(conn, applicant_id).await?;
                    let next = workflow::verify(applicant.verification_status, use_maker_checker)?;
                    let entity = diesel::update(applicants::table.find(applicant_id))
                        .set((
                            applicants::verification_status.eq(next),
                            applicants::updated.eq(now),
                        ))
                        .returning(Applicant::as_returning())
                        .get_result(conn)
                        .await?;
                    let log = if use_maker_checker {
                        Some(
                            insert_log(
                                conn,
                                EntityType::Applicant,
                                applicant_id,
                                Action::Verify,
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
}
