//! JSON shapes returned by the API and the paging parameters accepted by list endpoints.

use crate::error::ApiError;
use assist_db::{
    models::{Applicant, Application, MakerCheckerLog, Parameter, Programme, Village},
    paging::{PageRequest, Sort},
    status::{Action, ApplicationStatus, EntityType, LogStatus, VerificationStatus},
};

/// `page`, `size` and `sort=property[,asc|desc]` query parameters.
#[derive(Clone, Debug, Default, serde::Deserialize)]
pub struct PageParams {
    pub page: Option<u32>,
    pub size: Option<u32>,
    pub sort: Option<String>,
}

impl PageParams {
    pub fn to_request(&self) -> Result<PageRequest, ApiError> {
        let sort = match self.sort.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(text) => Some(
                Sort::parse(text)
                    .ok_or_else(|| ApiError::InvalidArgument(format!("Invalid sort: {text}")))?,
            ),
        };
        Ok(PageRequest::new(
            self.page.unwrap_or(0),
            self.size.unwrap_or(PageRequest::DEFAULT_SIZE),
            sort,
        ))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicantView {
    pub id: i32,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: String,
    pub sex_id: i32,
    pub age: i32,
    pub marital_status_id: i32,
    pub id_number: String,
    pub village_id: i32,
    pub postal_address: Option<String>,
    pub physical_address: Option<String>,
    pub telephone: Option<String>,
    pub verification_status: VerificationStatus,
    pub image_path: Option<String>,
    pub created: jiff::Timestamp,
    pub updated: jiff::Timestamp,
}

impl From<Applicant> for ApplicantView {
    fn from(applicant: Applicant) -> Self {
        Self {
            id: applicant.id,
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
            verification_status: applicant.verification_status,
            image_path: applicant.image_path,
            created: applicant.created.to_jiff(),
            updated: applicant.updated.to_jiff(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationView {
    pub id: i32,
    pub applicant_id: i32,
    pub programme_id: i32,
    pub application_date: jiff::civil::Date,
    pub status: ApplicationStatus,
    pub maker_id: Option<i32>,
    pub checker_id: Option<i32>,
    pub created: jiff::Timestamp,
    pub updated: jiff::Timestamp,
}

impl From<Application> for ApplicationView {
    fn from(application: Application) -> Self {
        Self {
            id: application.id,
            applicant_id: application.applicant_id,
            programme_id: application.programme_id,
            application_date: application.application_date.to_jiff(),
            status: application.status,
            maker_id: application.maker_id,
            checker_id: application.checker_id,
            created: application.created.to_jiff(),
            updated: application.updated.to_jiff(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogView {
    pub id: i32,
    pub entity_type: EntityType,
    pub entity_id: i32,
    pub action: Action,
    pub status: LogStatus,
    pub maker_id: i32,
    pub checker_id: Option<i32>,
    pub created: jiff::Timestamp,
    pub updated: jiff::Timestamp,
}

impl From<MakerCheckerLog> for LogView {
    fn from(log: MakerCheckerLog) -> Self {
        Self {
            id: log.id,
            entity_type: log.entity_type,
            entity_id: log.entity_id,
            action: log.action,
            status: log.status,
            maker_id: log.maker_id,
            checker_id: log.checker_id,
            created: log.created.to_jiff(),
            updated: log.updated.to_jiff(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct ParameterView {
    pub id: i32,
    pub category: String,
    pub value: String,
}

impl From<Parameter> for ParameterView {
    fn from(Parameter { id, category, value }: Parameter) -> Self {
        Self {
            id,
            category,
            value,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct ProgrammeView {
    pub id: i32,
    pub name: String,
}

impl From<Programme> for ProgrammeView {
    fn from(Programme { id, name }: Programme) -> Self {
        Self { id, name }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VillageView {
    pub id: i32,
    pub name: String,
    pub sub_location_id: i32,
}

impl From<Village> for VillageView {
    fn from(
        Village {
            id,
            name,
            sub_location_id,
        }: Village,
    ) -> Self {
        Self {
            id,
            name,
            sub_location_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_params_default_and_reject_bad_sort() {
        let request = PageParams::default().to_request().unwrap();
        assert_eq!(request, PageRequest::default());

        let params = PageParams {
            page: Some(2),
            size: Some(5),
            sort: Some("lastName,desc".into()),
        };
        let request = params.to_request().unwrap();
        assert_eq!(request.offset(), 10);
        assert!(request.sort.unwrap().descending);

        let params = PageParams {
            sort: Some("lastName,upwards".into()),
            ..PageParams::default()
        };
        assert!(matches!(
            params.to_request(),
            Err(ApiError::InvalidArgument(_))
        ));
    }
}
