//! In-process store with the same uniqueness, reference and workflow rules as [`crate::PgStore`].
//!
//! Every mutating operation works on a copy of the tables and only publishes it on success,
//! which gives the same all-or-none behaviour as a database transaction.

use crate::{
    models::{
        Applicant, Application, County, Location, LocationPath, MakerCheckerLog, NewApplicant,
        NewApplication, NewParameter, NewUser, Parameter, Programme, SubCounty, SubLocation, User,
        Village,
    },
    paging::{
        ApplicantSort, ApplicationSort, Page, PageRequest, ParameterSort, SortKey, VillageSort,
    },
    query::{
        ApplicantFilter, ApplicationFilter, ApplicationRow, ExportFilter, LocationScope,
        ProgrammeStats,
    },
    status::{Action, ApplicationStatus, EntityType, LogStatus, VerificationStatus},
    store::{
        applicant_not_found, application_not_found, duplicate_application, duplicate_id_number,
        log_not_found, programme_not_found, user_not_found, Acted, ApplicantStore,
        ApplicationStore, MakerCheckerStore, ReferenceStore, UserStore,
    },
    workflow::{self, ConfirmPolicy, TargetStatus},
    Error,
};
use std::{cmp::Ordering, sync::Arc};
use tokio::sync::Mutex;

#[derive(Clone, Debug, Default)]
struct Tables {
    last_id: i32,
    users: Vec<User>,
    parameters: Vec<Parameter>,
    programmes: Vec<Programme>,
    counties: Vec<County>,
    sub_counties: Vec<SubCounty>,
    locations: Vec<Location>,
    sub_locations: Vec<SubLocation>,
    villages: Vec<Village>,
    applicants: Vec<Applicant>,
    applications: Vec<Application>,
    logs: Vec<MakerCheckerLog>,
}

#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn read<R>(&self, f: impl FnOnce(&Tables) -> R) -> R {
        let tables = self.tables.lock().await;
        f(&tables)
    }

    /// Runs `f` against a draft of the tables, keeping the draft only when `f` succeeds.
    async fn write<R>(
        &self,
        f: impl FnOnce(&mut Tables, jiff_diesel::Timestamp) -> Result<R, Error>,
    ) -> Result<R, Error> {
        let mut tables = self.tables.lock().await;
        let mut draft = tables.clone();
        let result = f(&mut draft, jiff::Timestamp::now().into())?;
        *tables = draft;
        Ok(result)
    }
}

fn page_of<T>(items: Vec<T>, page: &PageRequest) -> Page<T> {
    let total = items.len() as i64;
    let content = items
        .into_iter()
        .skip(page.offset() as usize)
        .take(page.limit() as usize)
        .collect();
    Page::new(content, page, total)
}

fn directed(ordering: Ordering, descending: bool) -> Ordering {
    if descending {
        ordering.reverse()
    } else {
        ordering
    }
}

fn contains_ignoring_case(haystack: &str, needle_lower: &str) -> bool {
    haystack.to_lowercase().contains(needle_lower)
}

impl Tables {
    fn next_id(&mut self) -> i32 {
        self.last_id += 1;
        self.last_id
    }

    fn applicant(&self, applicant_id: i32) -> Result<&Applicant, Error> {
        self.applicants
            .iter()
            .find(|a| a.id == applicant_id)
            .ok_or_else(|| applicant_not_found(applicant_id))
    }

    fn applicant_mut(&mut self, applicant_id: i32) -> Result<&mut Applicant, Error> {
        self.applicants
            .iter_mut()
            .find(|a| a.id == applicant_id)
            .ok_or_else(|| applicant_not_found(applicant_id))
    }

    fn application_mut(&mut self, application_id: i32) -> Result<&mut Application, Error> {
        self.applications
            .iter_mut()
            .find(|a| a.id == application_id)
            .ok_or_else(|| application_not_found(application_id))
    }

    fn insert_user(&mut self, user: NewUser, now: jiff_diesel::Timestamp) -> Result<User, Error> {
        if self
            .users
            .iter()
            .any(|u| u.username.eq_ignore_ascii_case(&user.username))
        {
            return Err(Error::Duplicate("Username already exists".into()));
        }
        let user = User {
            id: self.next_id(),
            username: user.username,
            password_hash: user.password_hash,
            name: user.name,
            role: user.role,
            email: user.email,
            phone: user.phone,
            enabled: true,
            created: now,
            updated: now,
        };
        self.users.push(user.clone());
        Ok(user)
    }

    fn check_applicant_references(&self, applicant: &NewApplicant) -> Result<(), Error> {
        if !self.parameters.iter().any(|p| p.id == applicant.sex_id) {
            return Err(Error::NotFound(format!(
                "Sex parameter not found with ID: {}",
                applicant.sex_id
            )));
        }
        if !self
            .parameters
            .iter()
            .any(|p| p.id == applicant.marital_status_id)
        {
            return Err(Error::NotFound(format!(
                "Marital status parameter not found with ID: {}",
                applicant.marital_status_id
            )));
        }
        if !self.villages.iter().any(|v| v.id == applicant.village_id) {
            return Err(Error::NotFound(format!(
                "Village not found with ID: {}",
                applicant.village_id
            )));
        }
        Ok(())
    }

    fn check_id_number_free(&self, id_number: &str, except: Option<i32>) -> Result<(), Error> {
        match self.applicants.iter().find(|a| a.id_number == id_number) {
            Some(holder) if Some(holder.id) != except => Err(duplicate_id_number()),
            _ => Ok(()),
        }
    }

    fn insert_applicant(
        &mut self,
        applicant: NewApplicant,
        now: jiff_diesel::Timestamp,
    ) -> Result<Applicant, Error> {
        self.check_id_number_free(&applicant.id_number, None)?;
        self.check_applicant_references(&applicant)?;
        let applicant = Applicant {
            id: self.next_id(),
            first_name: applicant.first_name,
            middle_name: applicant.middle_name,
            last_name: applicant.last_name,
            sex_id: applicant.sex_id,
            age: applicant.age,
            marital_status_id: applicant.marital_status_id,
            id_number: applicant.id_number,
            village_id: applicant.village_id,
            postal_address: applicant.postal_address,
            physical_address: applicant.physical_address,
            telephone: applicant.telephone,
            verification_status: VerificationStatus::Pending,
            image_path: None,
            created: now,
            updated: now,
        };
        self.applicants.push(applicant.clone());
        Ok(applicant)
    }

    fn check_application_references(
        &self,
        applicant_id: i32,
        programme_id: i32,
    ) -> Result<(), Error> {
        self.applicant(applicant_id)?;
        if !self.programmes.iter().any(|p| p.id == programme_id) {
            return Err(programme_not_found(programme_id));
        }
        Ok(())
    }

    fn check_pair_free(
        &self,
        applicant_id: i32,
        programme_id: i32,
        except: Option<i32>,
    ) -> Result<(), Error> {
        match self
            .applications
            .iter()
            .find(|a| a.applicant_id == applicant_id && a.programme_id == programme_id)
        {
            Some(holder) if Some(holder.id) != except => Err(duplicate_application()),
            _ => Ok(()),
        }
    }

    fn insert_application(
        &mut self,
        application: NewApplication,
        now: jiff_diesel::Timestamp,
    ) -> Result<Application, Error> {
        self.check_application_references(application.applicant_id, application.programme_id)?;
        self.check_pair_free(application.applicant_id, application.programme_id, None)?;
        let application = Application {
            id: self.next_id(),
            applicant_id: application.applicant_id,
            programme_id: application.programme_id,
            application_date: application.application_date.into(),
            status: ApplicationStatus::Pending,
            maker_id: None,
            checker_id: None,
            created: now,
            updated: now,
        };
        self.applications.push(application.clone());
        Ok(application)
    }

    fn insert_log(
        &mut self,
        entity_type: EntityType,
        entity_id: i32,
        action: Action,
        maker_id: i32,
        now: jiff_diesel::Timestamp,
    ) -> MakerCheckerLog {
        let log = MakerCheckerLog {
            id: self.next_id(),
            entity_type,
            entity_id,
            action,
            status: LogStatus::Proposed,
            maker_id,
            checker_id: None,
            created: now,
            updated: now,
        };
        self.logs.push(log.clone());
        log
    }

    fn upsert_location_path(&mut self, path: &LocationPath) -> Village {
        let county_id = match self.counties.iter().find(|c| c.name == path.county) {
            Some(county) => county.id,
            None => {
                let id = self.next_id();
                self.counties.push(County {
                    id,
                    name: path.county.clone(),
                });
                id
            }
        };
        let sub_county_id = match self
            .sub_counties
            .iter()
            .find(|s| s.name == path.sub_county && s.county_id == county_id)
        {
            Some(sub_county) => sub_county.id,
            None => {
                let id = self.next_id();
                self.sub_counties.push(SubCounty {
                    id,
                    name: path.sub_county.clone(),
                    county_id,
                });
                id
            }
        };
        let location_id = match self
            .locations
            .iter()
            .find(|l| l.name == path.location && l.sub_county_id == sub_county_id)
        {
            Some(location) => location.id,
            None => {
                let id = self.next_id();
                self.locations.push(Location {
                    id,
                    name: path.location.clone(),
                    sub_county_id,
                });
                id
            }
        };
        let sub_location_id = match self
            .sub_locations
            .iter()
            .find(|s| s.name == path.sub_location && s.location_id == location_id)
        {
            Some(sub_location) => sub_location.id,
            None => {
                let id = self.next_id();
                self.sub_locations.push(SubLocation {
                    id,
                    name: path.sub_location.clone(),
                    location_id,
                });
                id
            }
        };
        match self
            .villages
            .iter()
            .find(|v| v.name == path.village && v.sub_location_id == sub_location_id)
        {
            Some(village) => village.clone(),
            None => {
                let village = Village {
                    id: self.next_id(),
                    name: path.village.clone(),
                    sub_location_id,
                };
                self.villages.push(village.clone());
                village
            }
        }
    }

    fn in_scope(&self, village_id: i32, scope: LocationScope) -> bool {
        let village = self.villages.iter().find(|v| v.id == village_id);
        let sub_location = village.and_then(|v| {
            self.sub_locations
                .iter()
                .find(|s| s.id == v.sub_location_id)
        });
        let location =
            sub_location.and_then(|s| self.locations.iter().find(|l| l.id == s.location_id));
        let sub_county =
            location.and_then(|l| self.sub_counties.iter().find(|s| s.id == l.sub_county_id));
        match scope {
            LocationScope::All => true,
            LocationScope::Village(id) => village_id == id,
            LocationScope::SubLocation(id) => sub_location.is_some_and(|s| s.id == id),
            LocationScope::Location(id) => location.is_some_and(|l| l.id == id),
            LocationScope::SubCounty(id) => sub_county.is_some_and(|s| s.id == id),
            LocationScope::County(id) => sub_county.is_some_and(|s| s.county_id == id),
        }
    }
}

#[async_trait::async_trait]
impl UserStore for MemoryStore {
    async fn create_user(&self, user: NewUser) -> Result<User, Error> {
        self.write(|tables, now| tables.insert_user(user, now)).await
    }

    async fn create_users(&self, users: Vec<NewUser>) -> Result<Vec<User>, Error> {
        self.write(|tables, now| {
            users
                .into_iter()
                .map(|user| tables.insert_user(user, now))
                .collect()
        })
        .await
    }

    async fn load_user_by_username(&self, username: &str) -> Result<Option<User>, Error> {
        Ok(self
            .read(|tables| {
                tables
                    .users
                    .iter()
                    .find(|u| u.username.eq_ignore_ascii_case(username))
                    .cloned()
            })
            .await)
    }

    async fn load_user_by_id(&self, user_id: i32) -> Result<Option<User>, Error> {
        Ok(self
            .read(|tables| tables.users.iter().find(|u| u.id == user_id).cloned())
            .await)
    }

    async fn list_users(&self) -> Result<Vec<User>, Error> {
        Ok(self.read(|tables| tables.users.clone()).await)
    }

    async fn update_password(&self, user_id: i32, password_hash: String) -> Result<(), Error> {
        self.write(|tables, now| {
            let user = tables
                .users
                .iter_mut()
                .find(|u| u.id == user_id)
                .ok_or_else(|| user_not_found(user_id))?;
            user.password_hash = password_hash;
            user.updated = now;
            Ok(())
        })
        .await
    }
}

#[async_trait::async_trait]
impl ReferenceStore for MemoryStore {
    async fn list_parameters(
        &self,
        category: Option<&str>,
        page: &PageRequest,
    ) -> Result<Page<Parameter>, Error> {
        let (key, descending) = ParameterSort::resolve(page.sort.as_ref())?;
        let mut items = self
            .read(|tables| {
                tables
                    .parameters
                    .iter()
                    .filter(|p| category.is_none_or(|c| p.category == c))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .await;
        items.sort_by(|a, b| {
            let ordering = match key {
                ParameterSort::Id => a.id.cmp(&b.id),
                ParameterSort::Category => a.category.cmp(&b.category),
                ParameterSort::Value => a.value.cmp(&b.value),
            };
            directed(ordering, descending).then(a.id.cmp(&b.id))
        });
        Ok(page_of(items, page))
    }

    async fn load_parameter(&self, parameter_id: i32) -> Result<Option<Parameter>, Error> {
        Ok(self
            .read(|tables| tables.parameters.iter().find(|p| p.id == parameter_id).cloned())
            .await)
    }

    async fn create_parameters(
        &self,
        parameters: Vec<NewParameter>,
    ) -> Result<Vec<Parameter>, Error> {
        self.write(|tables, _| {
            let mut created = Vec::new();
            for parameter in parameters {
                if tables
                    .parameters
                    .iter()
                    .any(|p| p.category == parameter.category && p.value == parameter.value)
                {
                    continue;
                }
                let parameter = Parameter {
                    id: tables.next_id(),
                    category: parameter.category,
                    value: parameter.value,
                };
                tables.parameters.push(parameter.clone());
                created.push(parameter);
            }
            Ok(created)
        })
        .await
    }

    async fn list_programmes(&self) -> Result<Vec<Programme>, Error> {
        let mut programmes = self.read(|tables| tables.programmes.clone()).await;
        programmes.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(programmes)
    }

    async fn load_programme(&self, programme_id: i32) -> Result<Option<Programme>, Error> {
        Ok(self
            .read(|tables| tables.programmes.iter().find(|p| p.id == programme_id).cloned())
            .await)
    }

    async fn load_programme_by_name(&self, name: &str) -> Result<Option<Programme>, Error> {
        Ok(self
            .read(|tables| tables.programmes.iter().find(|p| p.name == name).cloned())
            .await)
    }

    async fn create_programme(&self, name: String) -> Result<Programme, Error> {
        self.write(|tables, _| {
            if tables.programmes.iter().any(|p| p.name == name) {
                return Err(Error::Duplicate(
                    "Programme with this name already exists".into(),
                ));
            }
            let programme = Programme {
                id: tables.next_id(),
                name,
            };
            tables.programmes.push(programme.clone());
            Ok(programme)
        })
        .await
    }

    async fn list_villages(
        &self,
        sub_location_id: Option<i32>,
        page: &PageRequest,
    ) -> Result<Page<Village>, Error> {
        let (key, descending) = VillageSort::resolve(page.sort.as_ref())?;
        let mut items = self
            .read(|tables| {
                tables
                    .villages
                    .iter()
                    .filter(|v| sub_location_id.is_none_or(|id| v.sub_location_id == id))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .await;
        items.sort_by(|a, b| {
            let ordering = match key {
                VillageSort::Id => a.id.cmp(&b.id),
                VillageSort::Name => a.name.cmp(&b.name),
            };
            directed(ordering, descending).then(a.id.cmp(&b.id))
        });
        Ok(page_of(items, page))
    }

    async fn load_village(&self, village_id: i32) -> Result<Option<Village>, Error> {
        Ok(self
            .read(|tables| tables.villages.iter().find(|v| v.id == village_id).cloned())
            .await)
    }

    async fn upsert_location_paths(&self, paths: Vec<LocationPath>) -> Result<Vec<Village>, Error> {
        self.write(|tables, _| {
            Ok(paths
                .iter()
                .map(|path| tables.upsert_location_path(path))
                .collect())
        })
        .await
    }
}

#[async_trait::async_trait]
impl ApplicantStore for MemoryStore {
    async fn create_applicant(&self, applicant: NewApplicant) -> Result<Applicant, Error> {
        self.write(|tables, now| tables.insert_applicant(applicant, now))
            .await
    }

    async fn create_applicants(
        &self,
        applicants: Vec<NewApplicant>,
    ) -> Result<Vec<Applicant>, Error> {
        self.write(|tables, now| {
            applicants
                .into_iter()
                .map(|applicant| tables.insert_applicant(applicant, now))
                .collect()
        })
        .await
    }

    async fn load_applicant(&self, applicant_id: i32) -> Result<Option<Applicant>, Error> {
        Ok(self
            .read(|tables| tables.applicant(applicant_id).ok().cloned())
            .await)
    }

    async fn find_applicant_by_name(
        &self,
        first_name: &str,
        middle_name: Option<&str>,
        last_name: &str,
    ) -> Result<Option<Applicant>, Error> {
        Ok(self
            .read(|tables| {
                tables
                    .applicants
                    .iter()
                    .find(|a| {
                        a.first_name == first_name
                            && a.middle_name.as_deref() == middle_name
                            && a.last_name == last_name
                    })
                    .cloned()
            })
            .await)
    }

    async fn list_applicants(
        &self,
        filter: &ApplicantFilter,
        page: &PageRequest,
    ) -> Result<Page<Applicant>, Error> {
        let (key, descending) = ApplicantSort::resolve(page.sort.as_ref())?;
        let name = filter
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_lowercase);
        let mut items = self
            .read(|tables| {
                tables
                    .applicants
                    .iter()
                    .filter(|a| {
                        name.as_deref().is_none_or(|name| {
                            contains_ignoring_case(&a.first_name, name)
                                || a.middle_name
                                    .as_deref()
                                    .is_some_and(|m| contains_ignoring_case(m, name))
                                || contains_ignoring_case(&a.last_name, name)
                        })
                    })
                    .filter(|a| {
                        filter
                            .id_number
                            .as_deref()
                            .is_none_or(|id_number| a.id_number == id_number)
                    })
                    .filter(|a| {
                        filter.date_applied.is_none_or(|date| {
                            tables.applications.iter().any(|app| {
                                app.applicant_id == a.id && app.application_date.to_jiff() == date
                            })
                        })
                    })
                    .filter(|a| filter.status.is_none_or(|s| a.verification_status == s))
                    .filter(|a| filter.village_id.is_none_or(|id| a.village_id == id))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .await;
        items.sort_by(|a, b| {
            let ordering = match key {
                ApplicantSort::Id => a.id.cmp(&b.id),
                ApplicantSort::FirstName => a.first_name.cmp(&b.first_name),
                ApplicantSort::LastName => a.last_name.cmp(&b.last_name),
                ApplicantSort::Age => a.age.cmp(&b.age),
                ApplicantSort::IdNumber => a.id_number.cmp(&b.id_number),
                ApplicantSort::VerificationStatus => a
                    .verification_status
                    .as_str()
                    .cmp(b.verification_status.as_str()),
            };
            directed(ordering, descending).then(a.id.cmp(&b.id))
        });
        Ok(page_of(items, page))
    }

    async fn update_applicant(
        &self,
        applicant_id: i32,
        changes: NewApplicant,
    ) -> Result<Applicant, Error> {
        self.write(|tables, now| {
            tables.applicant(applicant_id)?;
            tables.check_id_number_free(&changes.id_number, Some(applicant_id))?;
            tables.check_applicant_references(&changes)?;
            let applicant = tables.applicant_mut(applicant_id)?;
            applicant.first_name = changes.first_name;
            applicant.middle_name = changes.middle_name;
            applicant.last_name = changes.last_name;
            applicant.sex_id = changes.sex_id;
            applicant.age = changes.age;
            applicant.marital_status_id = changes.marital_status_id;
            applicant.id_number = changes.id_number;
            applicant.village_id = changes.village_id;
            applicant.postal_address = changes.postal_address;
            applicant.physical_address = changes.physical_address;
            applicant.telephone = changes.telephone;
            applicant.updated = now;
            Ok(applicant.clone())
        })
        .await
    }

    async fn delete_applicant(&self, applicant_id: i32) -> Result<(), Error> {
        self.write(|tables, _| {
            tables.applicant(applicant_id)?;
            tables.applications.retain(|a| a.applicant_id != applicant_id);
            tables.applicants.retain(|a| a.id != applicant_id);
            Ok(())
        })
        .await
    }

    async fn set_applicant_image(
        &self,
        applicant_id: i32,
        image_path: String,
    ) -> Result<Applicant, Error> {
        self.write(|tables, now| {
            let applicant = tables.applicant_mut(applicant_id)?;
            applicant.image_path = Some(image_path);
            applicant.updated = now;
            Ok(applicant.clone())
        })
        .await
    }

    async fn verify_applicant(
        &self,
        applicant_id: i32,
        actor_id: i32,
        use_maker_checker: bool,
    ) -> Result<Acted<Applicant>, Error> {
        self.write(|tables, now| {
            let applicant = tables.applicant_mut(applicant_id)?;
            applicant.verification_status =
                workflow::verify(applicant.verification_status, use_maker_checker)?;
            applicant.updated = now;
            let entity = applicant.clone();
            let log = use_maker_checker.then(|| {
                tables.insert_log(
                    EntityType::Applicant,
                    applicant_id,
                    Action::Verify,
                    actor_id,
                    now,
                )
            });
            Ok(Acted { entity, log })
        })
        .await
    }
}

#[async_trait::async_trait]
impl ApplicationStore for MemoryStore {
    async fn create_application(&self, application: NewApplication) -> Result<Application, Error> {
        self.write(|tables, now| tables.insert_application(application, now))
            .await
    }

    async fn create_applications(
        &self,
        applications: Vec<NewApplication>,
    ) -> Result<Vec<Application>, Error> {
        self.write(|tables, now| {
            applications
                .into_iter()
                .map(|application| tables.insert_application(application, now))
                .collect()
        })
        .await
    }

    async fn enrol_applicant(
        &self,
        applicant: NewApplicant,
        programme_id: i32,
        application_date: jiff::civil::Date,
    ) -> Result<(Applicant, Application), Error> {
        self.write(|tables, now| {
            let applicant = tables.insert_applicant(applicant, now)?;
            let application = tables.insert_application(
                NewApplication {
                    applicant_id: applicant.id,
                    programme_id,
                    application_date,
                },
                now,
            )?;
            Ok((applicant, application))
        })
        .await
    }

    async fn load_application(&self, application_id: i32) -> Result<Option<Application>, Error> {
        Ok(self
            .read(|tables| {
                tables
                    .applications
                    .iter()
                    .find(|a| a.id == application_id)
                    .cloned()
            })
            .await)
    }

    async fn list_applications(
        &self,
        filter: &ApplicationFilter,
        page: &PageRequest,
    ) -> Result<Page<Application>, Error> {
        let (key, descending) = ApplicationSort::resolve(page.sort.as_ref())?;
        let mut items = self
            .read(|tables| {
                tables
                    .applications
                    .iter()
                    .filter(|a| filter.applicant_id.is_none_or(|id| a.applicant_id == id))
                    .filter(|a| filter.programme_id.is_none_or(|id| a.programme_id == id))
                    .filter(|a| filter.status.is_none_or(|s| a.status == s))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .await;
        items.sort_by(|a, b| {
            let ordering = match key {
                ApplicationSort::Id => a.id.cmp(&b.id),
                ApplicationSort::ApplicationDate => a
                    .application_date
                    .to_jiff()
                    .cmp(&b.application_date.to_jiff()),
                ApplicationSort::Status => a.status.as_str().cmp(b.status.as_str()),
            };
            directed(ordering, descending).then(a.id.cmp(&b.id))
        });
        Ok(page_of(items, page))
    }

    async fn update_application(
        &self,
        application_id: i32,
        applicant_id: i32,
        programme_id: i32,
    ) -> Result<Application, Error> {
        self.write(|tables, now| {
            let current = tables.application_mut(application_id)?;
            if (current.applicant_id, current.programme_id) != (applicant_id, programme_id) {
                workflow::check_repointable(current.status)?;
            }
            tables.check_application_references(applicant_id, programme_id)?;
            tables.check_pair_free(applicant_id, programme_id, Some(application_id))?;
            let application = tables.application_mut(application_id)?;
            application.applicant_id = applicant_id;
            application.programme_id = programme_id;
            application.updated = now;
            Ok(application.clone())
        })
        .await
    }

    async fn delete_application(&self, application_id: i32) -> Result<(), Error> {
        self.write(|tables, _| {
            tables.application_mut(application_id)?;
            tables.applications.retain(|a| a.id != application_id);
            Ok(())
        })
        .await
    }

    async fn approve_application(
        &self,
        application_id: i32,
        actor_id: i32,
        use_maker_checker: bool,
    ) -> Result<Acted<Application>, Error> {
        self.write(|tables, now| {
            let applicant_id = tables.application_mut(application_id)?.applicant_id;
            let applicant_status = tables.applicant(applicant_id)?.verification_status;
            let application = tables.application_mut(application_id)?;
            application.status =
                workflow::approve(applicant_status, application.status, use_maker_checker)?;
            if use_maker_checker {
                application.maker_id = Some(actor_id);
            } else {
                application.checker_id = Some(actor_id);
            }
            application.updated = now;
            let entity = application.clone();
            let log = use_maker_checker.then(|| {
                tables.insert_log(
                    EntityType::Application,
                    application_id,
                    Action::Approve,
                    actor_id,
                    now,
                )
            });
            Ok(Acted { entity, log })
        })
        .await
    }

    async fn export_applications(
        &self,
        filter: &ExportFilter,
    ) -> Result<Vec<ApplicationRow>, Error> {
        let mut rows = self
            .read(|tables| {
                tables
                    .applications
                    .iter()
                    .filter_map(|application| {
                        let date = application.application_date.to_jiff();
                        if date < filter.start || date > filter.end {
                            return None;
                        }
                        if filter.status.is_some_and(|s| application.status != s) {
                            return None;
                        }
                        let applicant = tables.applicant(application.applicant_id).ok()?;
                        let programme = tables
                            .programmes
                            .iter()
                            .find(|p| p.id == application.programme_id)?;
                        let wanted = filter.age.is_none_or(|age| applicant.age == age)
                            && filter.sex_id.is_none_or(|id| applicant.sex_id == id)
                            && filter
                                .marital_status_id
                                .is_none_or(|id| applicant.marital_status_id == id)
                            && tables.in_scope(applicant.village_id, filter.location);
                        wanted.then(|| ApplicationRow {
                            id: application.id,
                            first_name: applicant.first_name.clone(),
                            middle_name: applicant.middle_name.clone(),
                            last_name: applicant.last_name.clone(),
                            programme_name: programme.name.clone(),
                            status: application.status,
                            application_date: date,
                        })
                    })
                    .collect::<Vec<_>>()
            })
            .await;
        rows.sort_by_key(|row| row.id);
        Ok(rows)
    }

    async fn application_stats(&self) -> Result<Vec<ProgrammeStats>, Error> {
        Ok(self
            .read(|tables| {
                ProgrammeStats::tally(tables.applications.iter().filter_map(|application| {
                    tables
                        .programmes
                        .iter()
                        .find(|p| p.id == application.programme_id)
                        .map(|p| (p.id, p.name.clone(), application.status))
                }))
            })
            .await)
    }
}

#[async_trait::async_trait]
impl MakerCheckerStore for MemoryStore {
    async fn load_log(&self, log_id: i32) -> Result<Option<MakerCheckerLog>, Error> {
        Ok(self
            .read(|tables| tables.logs.iter().find(|l| l.id == log_id).cloned())
            .await)
    }

    async fn list_logs(&self, status: LogStatus) -> Result<Vec<MakerCheckerLog>, Error> {
        let mut logs = self
            .read(|tables| {
                tables
                    .logs
                    .iter()
                    .filter(|l| l.status == status)
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .await;
        logs.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(logs)
    }

    async fn confirm_log(
        &self,
        log_id: i32,
        checker_id: i32,
        approve: bool,
        policy: ConfirmPolicy,
    ) -> Result<MakerCheckerLog, Error> {
        self.write(|tables, now| {
            let log = tables
                .logs
                .iter()
                .find(|l| l.id == log_id)
                .cloned()
                .ok_or_else(|| log_not_found(log_id))?;
            let resolution = workflow::resolve(&log, checker_id, approve, policy)?;
            if resolution.target == TargetStatus::Application(ApplicationStatus::Approved) {
                let applicant_id = tables.application_mut(log.entity_id)?.applicant_id;
                workflow::check_approvable(tables.applicant(applicant_id)?.verification_status)?;
            }
            match resolution.target {
                TargetStatus::Applicant(status) => {
                    let applicant = tables.applicant_mut(log.entity_id)?;
                    applicant.verification_status = status;
                    applicant.updated = now;
                }
                TargetStatus::Application(status) => {
                    let application = tables.application_mut(log.entity_id)?;
                    application.status = status;
                    application.checker_id = Some(checker_id);
                    application.updated = now;
                }
            }
            let log = tables
                .logs
                .iter_mut()
                .find(|l| l.id == log_id)
                .ok_or_else(|| log_not_found(log_id))?;
            log.status = resolution.log_status;
            log.checker_id = Some(checker_id);
            log.updated = now;
            Ok(log.clone())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::Role;

    struct Seeded {
        store: MemoryStore,
        sex_id: i32,
        marital_status_id: i32,
        village_id: i32,
        programme_id: i32,
    }

    async fn seeded() -> Seeded {
        let store = MemoryStore::new();
        let parameters = store
            .create_parameters(vec![
                NewParameter {
                    category: "Sex".into(),
                    value: "Female".into(),
                },
                NewParameter {
                    category: "Marital Status".into(),
                    value: "Single".into(),
                },
            ])
            .await
            .unwrap();
        let villages = store
            .upsert_location_paths(vec![LocationPath {
                county: "Nairobi".into(),
                sub_county: "Westlands".into(),
                location: "Parklands".into(),
                sub_location: "Highridge".into(),
                village: "Kileleshwa".into(),
            }])
            .await
            .unwrap();
        let programme = store.create_programme("Health Program".into()).await.unwrap();
        Seeded {
            sex_id: parameters[0].id,
            marital_status_id: parameters[1].id,
            village_id: villages[0].id,
            programme_id: programme.id,
            store,
        }
    }

    fn applicant(seeded: &Seeded, id_number: &str) -> NewApplicant {
        NewApplicant {
            first_name: "John".into(),
            middle_name: None,
            last_name: "Doe".into(),
            sex_id: seeded.sex_id,
            age: 30,
            marital_status_id: seeded.marital_status_id,
            id_number: id_number.into(),
            village_id: seeded.village_id,
            postal_address: None,
            physical_address: None,
            telephone: None,
        }
    }

    #[tokio::test]
    async fn duplicate_id_number_is_rejected_without_saving() {
        let seeded = seeded().await;
        let created = seeded
            .store
            .create_applicant(applicant(&seeded, "12345678"))
            .await
            .unwrap();
        assert_eq!(created.verification_status, VerificationStatus::Pending);
        let err = seeded
            .store
            .create_applicant(applicant(&seeded, "12345678"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Duplicate(_)));
        let all = seeded
            .store
            .list_applicants(&ApplicantFilter::default(), &PageRequest::default())
            .await
            .unwrap();
        assert_eq!(all.total_elements, 1);
    }

    #[tokio::test]
    async fn batch_insert_is_all_or_none() {
        let seeded = seeded().await;
        let mut bad = applicant(&seeded, "2");
        bad.village_id = 9999;
        let err = seeded
            .store
            .create_applicants(vec![applicant(&seeded, "1"), bad])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(message) if message.contains("Village")));
        assert!(seeded
            .store
            .find_applicant_by_name("John", None, "Doe")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn location_upsert_reuses_existing_nodes() {
        let seeded = seeded().await;
        let villages = seeded
            .store
            .upsert_location_paths(vec![
                LocationPath {
                    county: "Nairobi".into(),
                    sub_county: "Westlands".into(),
                    location: "Parklands".into(),
                    sub_location: "Highridge".into(),
                    village: "Kileleshwa".into(),
                },
                LocationPath {
                    county: "Nairobi".into(),
                    sub_county: "Westlands".into(),
                    location: "Parklands".into(),
                    sub_location: "Highridge".into(),
                    village: "Lavington".into(),
                },
            ])
            .await
            .unwrap();
        assert_eq!(villages[0].id, seeded.village_id);
        assert_ne!(villages[1].id, seeded.village_id);
        assert_eq!(villages[0].sub_location_id, villages[1].sub_location_id);
    }

    #[tokio::test]
    async fn proposed_verification_is_confirmed_by_a_second_user() {
        let seeded = seeded().await;
        let store = &seeded.store;
        let created = store
            .create_applicant(applicant(&seeded, "12345678"))
            .await
            .unwrap();
        let acted = store.verify_applicant(created.id, 100, true).await.unwrap();
        assert_eq!(acted.entity.verification_status, VerificationStatus::Proposed);
        let log = acted.log.unwrap();
        assert_eq!(store.list_logs(LogStatus::Proposed).await.unwrap().len(), 1);

        let err = store
            .confirm_log(log.id, 100, true, ConfirmPolicy::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));

        let confirmed = store
            .confirm_log(log.id, 200, true, ConfirmPolicy::default())
            .await
            .unwrap();
        assert_eq!(confirmed.status, LogStatus::Approved);
        assert_eq!(confirmed.checker_id, Some(200));
        let applicant = store.load_applicant(created.id).await.unwrap().unwrap();
        assert_eq!(applicant.verification_status, VerificationStatus::Verified);
        assert!(store.list_logs(LogStatus::Proposed).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn approval_waits_for_verification_and_pairs_are_unique() {
        let seeded = seeded().await;
        let store = &seeded.store;
        let (applicant, application) = store
            .enrol_applicant(
                applicant(&seeded, "12345678"),
                seeded.programme_id,
                jiff::civil::date(2025, 3, 1),
            )
            .await
            .unwrap();
        let err = store
            .create_application(NewApplication {
                applicant_id: applicant.id,
                programme_id: seeded.programme_id,
                application_date: jiff::civil::date(2025, 3, 2),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Duplicate(_)));

        let err = store
            .approve_application(application.id, 300, false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));

        store.verify_applicant(applicant.id, 200, false).await.unwrap();
        let acted = store
            .approve_application(application.id, 300, false)
            .await
            .unwrap();
        assert_eq!(acted.entity.status, ApplicationStatus::Approved);
        assert_eq!(acted.entity.checker_id, Some(300));
        assert!(acted.log.is_none());
    }

    #[tokio::test]
    async fn proposed_application_cannot_move_to_another_applicant() {
        let seeded = seeded().await;
        let store = &seeded.store;
        let (verified, application) = store
            .enrol_applicant(
                applicant(&seeded, "1"),
                seeded.programme_id,
                jiff::civil::date(2025, 3, 1),
            )
            .await
            .unwrap();
        let unverified = store.create_applicant(applicant(&seeded, "2")).await.unwrap();
        store.verify_applicant(verified.id, 200, false).await.unwrap();
        let log = store
            .approve_application(application.id, 300, true)
            .await
            .unwrap()
            .log
            .unwrap();

        let err = store
            .update_application(application.id, unverified.id, seeded.programme_id)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
        let unchanged = store
            .update_application(application.id, verified.id, seeded.programme_id)
            .await
            .unwrap();
        assert_eq!(unchanged.applicant_id, verified.id);
        assert_eq!(unchanged.status, ApplicationStatus::Proposed);

        let confirmed = store
            .confirm_log(log.id, 400, true, ConfirmPolicy::default())
            .await
            .unwrap();
        assert_eq!(confirmed.status, LogStatus::Approved);
        let approved = store.load_application(application.id).await.unwrap().unwrap();
        assert_eq!(approved.applicant_id, verified.id);
        assert_eq!(approved.status, ApplicationStatus::Approved);
    }

    #[tokio::test]
    async fn confirming_an_approval_checks_the_applicant_again() {
        let seeded = seeded().await;
        let store = &seeded.store;
        let (enrolled, application) = store
            .enrol_applicant(
                applicant(&seeded, "1"),
                seeded.programme_id,
                jiff::civil::date(2025, 3, 1),
            )
            .await
            .unwrap();
        store.verify_applicant(enrolled.id, 200, false).await.unwrap();
        let log = store
            .approve_application(application.id, 300, true)
            .await
            .unwrap()
            .log
            .unwrap();
        store
            .write(|tables, _| {
                tables.applicant_mut(enrolled.id)?.verification_status =
                    VerificationStatus::Pending;
                Ok(())
            })
            .await
            .unwrap();

        let err = store
            .confirm_log(log.id, 400, true, ConfirmPolicy::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidState(message) if message.contains("not verified")));
        let still = store.load_application(application.id).await.unwrap().unwrap();
        assert_eq!(still.status, ApplicationStatus::Proposed);
        assert_eq!(store.list_logs(LogStatus::Proposed).await.unwrap().len(), 1);

        let rejected = store
            .confirm_log(log.id, 400, false, ConfirmPolicy::default())
            .await
            .unwrap();
        assert_eq!(rejected.status, LogStatus::Rejected);
        let application = store.load_application(application.id).await.unwrap().unwrap();
        assert_eq!(application.status, ApplicationStatus::Rejected);
    }

    #[tokio::test]
    async fn export_filters_by_date_range_and_location() {
        let seeded = seeded().await;
        let store = &seeded.store;
        store
            .enrol_applicant(
                applicant(&seeded, "1"),
                seeded.programme_id,
                jiff::civil::date(2025, 3, 1),
            )
            .await
            .unwrap();
        let county_id = store.read(|tables| tables.counties[0].id).await;
        let filter = ExportFilter {
            status: None,
            start: jiff::civil::date(2025, 1, 1),
            end: jiff::civil::date(2025, 3, 31),
            age: None,
            sex_id: None,
            marital_status_id: None,
            location: LocationScope::County(county_id),
        };
        let rows = store.export_applications(&filter).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].applicant_name(), "John Doe");
        assert_eq!(rows[0].programme_name, "Health Program");

        let elsewhere = ExportFilter {
            location: LocationScope::County(county_id + 1000),
            ..filter.clone()
        };
        assert!(store.export_applications(&elsewhere).await.unwrap().is_empty());
        let too_late = ExportFilter {
            start: jiff::civil::date(2025, 3, 2),
            ..filter
        };
        assert!(store.export_applications(&too_late).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn usernames_are_unique_ignoring_case() {
        let store = MemoryStore::new();
        let user = |username: &str| NewUser {
            username: username.into(),
            password_hash: "hash".into(),
            name: "Test".into(),
            role: Role::User,
            email: None,
            phone: None,
        };
        store.create_user(user("verifier1")).await.unwrap();
        let err = store.create_user(user("Verifier1")).await.unwrap_err();
        assert!(matches!(err, Error::Duplicate(_)));
        assert!(store
            .load_user_by_username("VERIFIER1")
            .await
            .unwrap()
            .is_some());
    }
}
