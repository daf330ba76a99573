use diesel::result::{DatabaseErrorInformation, DatabaseErrorKind};
use diesel_async::{
    pooled_connection::{
        mobc::{Builder, Pool},
        AsyncDieselConnectionManager,
    },
    AsyncPgConnection,
};
use std::time::Duration;

pub mod memory;
pub mod models;
pub mod paging;
mod pg;
pub mod query;
mod schema;
mod sql_functions;
pub mod status;
mod store;
#[cfg(test)]
mod tests;
pub mod workflow;

pub use memory::MemoryStore;
pub use pg::PgStore;
pub use store::{
    Acted, ApplicantStore, ApplicationStore, MakerCheckerStore, ReferenceStore, Store, UserStore,
};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("getting connection from pool: {0}")]
    GetConnectionPool(#[from] mobc::Error<diesel_async::pooled_connection::PoolError>),
    #[error("result failure: {0}")]
    Result(diesel::result::Error),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Duplicate(String),
    #[error("{0}")]
    InvalidState(String),
    #[error("cannot sort by {0:?}")]
    InvalidSort(String),
    #[error("stored value: {0}")]
    UnknownName(#[from] status::UnknownName),
}

impl From<diesel::result::Error> for Error {
    fn from(err: diesel::result::Error) -> Self {
        use diesel::result::Error::DatabaseError;
        match err {
            DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                Error::Duplicate(describe_unique_violation(info.as_ref()))
            }
            DatabaseError(DatabaseErrorKind::ForeignKeyViolation, info) => Error::NotFound(format!(
                "Referenced record does not exist ({})",
                info.constraint_name().unwrap_or("unknown constraint")
            )),
            other => Error::Result(other),
        }
    }
}

fn describe_unique_violation(info: &dyn DatabaseErrorInformation) -> String {
    match info.constraint_name() {
        Some("applicants_id_number_key") => "Applicant with this ID number already exists".into(),
        Some("applications_applicant_programme_key") => {
            "Application already exists for this applicant and programme".into()
        }
        Some("users_username_key") => "Username already exists".into(),
        Some("programmes_name_key") => "Programme with this name already exists".into(),
        Some("parameters_category_value_key") => "Parameter already exists in this category".into(),
        Some(constraint) => format!("Duplicate value violates {constraint}"),
        None => info.message().to_owned(),
    }
}

#[derive(Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    pub db_url: String,
    max_open: u64,
    max_idle: u64,
    #[serde(with = "humantime_serde", default)]
    max_lifetime: Option<Duration>,
    #[serde(with = "humantime_serde", default)]
    max_idle_lifetime: Option<Duration>,
    #[serde(with = "humantime_serde")]
    timeout_for_get: Duration,
}

pub async fn create(config: &Config) -> Result<PgStore, Error> {
    let pool = create_pool(config);
    // Fail fast on a bad URL or unreachable server instead of on the first request.
    drop(pool.get().await?);
    Ok(PgStore::new(pool))
}

fn create_pool(config: &Config) -> Pool<AsyncPgConnection> {
    let builder = Builder::new()
        .max_open(config.max_open)
        .max_idle(config.max_idle)
        .max_lifetime(
            config
                .max_lifetime
                .map(|v| v.max(Duration::from_secs(3600))),
        )
        .max_idle_lifetime(
            config
                .max_idle_lifetime
                .map(|v| v.max(Duration::from_secs(900))),
        )
        .get_timeout(Some(config.timeout_for_get.max(Duration::from_secs(5))));
    let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(&config.db_url);
    builder.build(manager)
}
