use crate::{
    models::{
        Applicant, Application, LocationPath, MakerCheckerLog, NewApplicant, NewApplication,
        NewParameter, NewUser, Parameter, Programme, User, Village,
    },
    paging::{Page, PageRequest},
    query::{ApplicantFilter, ApplicationFilter, ApplicationRow, ExportFilter, ProgrammeStats},
    status::LogStatus,
    workflow::ConfirmPolicy,
    Error,
};

/// An entity after a verify or approve action, with the log row left behind when the action
/// went through the maker-checker.
#[derive(Clone, Debug)]
pub struct Acted<T> {
    pub entity: T,
    pub log: Option<MakerCheckerLog>,
}

#[async_trait::async_trait]
pub trait UserStore: Send + Sync {
    async fn create_user(&self, user: NewUser) -> Result<User, Error>;

    /// All or none.
    async fn create_users(&self, users: Vec<NewUser>) -> Result<Vec<User>, Error>;

    /// Usernames compare case-insensitively.
    async fn load_user_by_username(&self, username: &str) -> Result<Option<User>, Error>;

    async fn load_user_by_id(&self, user_id: i32) -> Result<Option<User>, Error>;

    async fn list_users(&self) -> Result<Vec<User>, Error>;

    async fn update_password(&self, user_id: i32, password_hash: String) -> Result<(), Error>;
}

#[async_trait::async_trait]
pub trait ReferenceStore: Send + Sync {
    async fn list_parameters(
        &self,
        category: Option<&str>,
        page: &PageRequest,
    ) -> Result<Page<Parameter>, Error>;

    async fn load_parameter(&self, parameter_id: i32) -> Result<Option<Parameter>, Error>;

    /// Inserts the parameters not already present, returning only the inserted ones.
    async fn create_parameters(
        &self,
        parameters: Vec<NewParameter>,
    ) -> Result<Vec<Parameter>, Error>;

    async fn list_programmes(&self) -> Result<Vec<Programme>, Error>;

    async fn load_programme(&self, programme_id: i32) -> Result<Option<Programme>, Error>;

    async fn load_programme_by_name(&self, name: &str) -> Result<Option<Programme>, Error>;

    async fn create_programme(&self, name: String) -> Result<Programme, Error>;

    async fn list_villages(
        &self,
        sub_location_id: Option<i32>,
        page: &PageRequest,
    ) -> Result<Page<Village>, Error>;

    async fn load_village(&self, village_id: i32) -> Result<Option<Village>, Error>;

    /// Finds or creates every level of each path, keyed by name and parent, returning the villages.
    async fn upsert_location_paths(&self, paths: Vec<LocationPath>) -> Result<Vec<Village>, Error>;
}

#[async_trait::async_trait]
pub trait ApplicantStore: Send + Sync {
    /// The new applicant starts `Pending`.
    async fn create_applicant(&self, applicant: NewApplicant) -> Result<Applicant, Error>;

    /// All or none.
    async fn create_applicants(
        &self,
        applicants: Vec<NewApplicant>,
    ) -> Result<Vec<Applicant>, Error>;

    async fn load_applicant(&self, applicant_id: i32) -> Result<Option<Applicant>, Error>;

    /// Exact match on all three names; a missing middle name only matches a missing one.
    async fn find_applicant_by_name(
        &self,
        first_name: &str,
        middle_name: Option<&str>,
        last_name: &str,
    ) -> Result<Option<Applicant>, Error>;

    async fn list_applicants(
        &self,
        filter: &ApplicantFilter,
        page: &PageRequest,
    ) -> Result<Page<Applicant>, Error>;

    async fn update_applicant(
        &self,
        applicant_id: i32,
        changes: NewApplicant,
    ) -> Result<Applicant, Error>;

    /// Also removes the applicant's applications.
    async fn delete_applicant(&self, applicant_id: i32) -> Result<(), Error>;

    async fn set_applicant_image(
        &self,
        applicant_id: i32,
        image_path: String,
    ) -> Result<Applicant, Error>;

    async fn verify_applicant(
        &self,
        applicant_id: i32,
        actor_id: i32,
        use_maker_checker: bool,
    ) -> Result<Acted<Applicant>, Error>;
}

#[async_trait::async_trait]
pub trait ApplicationStore: Send + Sync {
    /// The new application starts `Pending`.
    async fn create_application(&self, application: NewApplication) -> Result<Application, Error>;

    /// All or none.
    async fn create_applications(
        &self,
        applications: Vec<NewApplication>,
    ) -> Result<Vec<Application>, Error>;

    /// Registers an applicant and applies for a programme in one transaction.
    async fn enrol_applicant(
        &self,
        applicant: NewApplicant,
        programme_id: i32,
        application_date: jiff::civil::Date,
    ) -> Result<(Applicant, Application), Error>;

    async fn load_application(&self, application_id: i32) -> Result<Option<Application>, Error>;

    async fn list_applications(
        &self,
        filter: &ApplicationFilter,
        page: &PageRequest,
    ) -> Result<Page<Application>, Error>;

    /// Re-points the application, keeping its status and application date.
    async fn update_application(
        &self,
        application_id: i32,
        applicant_id: i32,
        programme_id: i32,
    ) -> Result<Application, Error>;

    async fn delete_application(&self, application_id: i32) -> Result<(), Error>;

    async fn approve_application(
        &self,
        application_id: i32,
        actor_id: i32,
        use_maker_checker: bool,
    ) -> Result<Acted<Application>, Error>;

    /// Ordered by application id.
    async fn export_applications(&self, filter: &ExportFilter)
        -> Result<Vec<ApplicationRow>, Error>;

    /// One entry per programme, ordered by programme name.
    async fn application_stats(&self) -> Result<Vec<ProgrammeStats>, Error>;
}

#[async_trait::async_trait]
pub trait MakerCheckerStore: Send + Sync {
    async fn load_log(&self, log_id: i32) -> Result<Option<MakerCheckerLog>, Error>;

    /// Newest first.
    async fn list_logs(&self, status: LogStatus) -> Result<Vec<MakerCheckerLog>, Error>;

    /// Resolves a proposed action and applies its effect to the target entity.
    async fn confirm_log(
        &self,
        log_id: i32,
        checker_id: i32,
        approve: bool,
        policy: ConfirmPolicy,
    ) -> Result<MakerCheckerLog, Error>;
}

pub trait Store:
    UserStore + ReferenceStore + ApplicantStore + ApplicationStore + MakerCheckerStore
{
}

impl<T> Store for T where
    T: UserStore + ReferenceStore + ApplicantStore + ApplicationStore + MakerCheckerStore
{
}

pub(crate) fn applicant_not_found(applicant_id: i32) -> Error {
    Error::NotFound(format!("Applicant not found with ID: {applicant_id}"))
}

pub(crate) fn application_not_found(application_id: i32) -> Error {
    Error::NotFound(format!("Application not found with ID: {application_id}"))
}

pub(crate) fn programme_not_found(programme_id: i32) -> Error {
    Error::NotFound(format!("Programme not found with ID: {programme_id}"))
}

pub(crate) fn log_not_found(log_id: i32) -> Error {
    Error::NotFound(format!("Maker-checker log not found with ID: {log_id}"))
}

pub(crate) fn user_not_found(user_id: i32) -> Error {
    Error::NotFound(format!("User not found with ID: {user_id}"))
}

pub(crate) fn duplicate_id_number() -> Error {
    Error::Duplicate("Applicant with this ID number already exists".into())
}

pub(crate) fn duplicate_application() -> Error {
    Error::Duplicate("Application already exists for this applicant and programme".into())
}
