use crate::status::{
    Action, ApplicationStatus, EntityType, LogStatus, Role, VerificationStatus,
};
use diesel::prelude::*;

#[derive(Clone, Debug, Identifiable, Queryable, Selectable)]
#[diesel(table_name = crate::schema::assist::users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct User {
    pub id: i32,
    pub username: String,
    pub password_hash: String,
    pub name: String,
    pub role: Role,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub enabled: bool,
    pub created: jiff_diesel::Timestamp,
    pub updated: jiff_diesel::Timestamp,
}

#[derive(Clone, Debug, Identifiable, Queryable, Selectable)]
#[diesel(table_name = crate::schema::assist::parameters)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Parameter {
    pub id: i32,
    pub category: String,
    pub value: String,
}

#[derive(Clone, Debug, Identifiable, Queryable, Selectable)]
#[diesel(table_name = crate::schema::assist::programmes)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Programme {
    pub id: i32,
    pub name: String,
}

#[derive(Clone, Debug, Identifiable, Queryable, Selectable)]
#[diesel(table_name = crate::schema::assist::counties)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct County {
    pub id: i32,
    pub name: String,
}

#[derive(Clone, Debug, Identifiable, Queryable, Selectable, Associations)]
#[diesel(table_name = crate::schema::assist::sub_counties)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(belongs_to(County))]
pub struct SubCounty {
    pub id: i32,
    pub name: String,
    pub county_id: i32,
}

#[derive(Clone, Debug, Identifiable, Queryable, Selectable, Associations)]
#[diesel(table_name = crate::schema::assist::locations)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(belongs_to(SubCounty))]
pub struct Location {
    pub id: i32,
    pub name: String,
    pub sub_county_id: i32,
}

#[derive(Clone, Debug, Identifiable, Queryable, Selectable, Associations)]
#[diesel(table_name = crate::schema::assist::sub_locations)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(belongs_to(Location))]
pub struct SubLocation {
    pub id: i32,
    pub name: String,
    pub location_id: i32,
}

#[derive(Clone, Debug, Identifiable, Queryable, Selectable, Associations)]
#[diesel(table_name = crate::schema::assist::villages)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(belongs_to(SubLocation))]
pub struct Village {
    pub id: i32,
    pub name: String,
    pub sub_location_id: i32,
}

#[derive(Clone, Debug, Identifiable, Queryable, Selectable, Associations)]
#[diesel(table_name = crate::schema::assist::applicants)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(belongs_to(Village))]
pub struct Applicant {
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
    pub created: jiff_diesel::Timestamp,
    pub updated: jiff_diesel::Timestamp,
}

impl Applicant {
    /// First, middle (when present) and last name separated by single spaces.
    pub fn full_name(&self) -> String {
        full_name(&self.first_name, self.middle_name.as_deref(), &self.last_name)
    }
}

pub(crate) fn full_name(first: &str, middle: Option<&str>, last: &str) -> String {
    match middle {
        Some(middle) => format!("{first} {middle} {last}"),
        None => format!("{first} {last}"),
    }
}

#[derive(Clone, Debug, Identifiable, Queryable, Selectable, Associations)]
#[diesel(table_name = crate::schema::assist::applications)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(belongs_to(Applicant))]
#[diesel(belongs_to(Programme))]
pub struct Application {
    pub id: i32,
    pub applicant_id: i32,
    pub programme_id: i32,
    pub application_date: jiff_diesel::Date,
    pub status: ApplicationStatus,
    pub maker_id: Option<i32>,
    pub checker_id: Option<i32>,
    pub created: jiff_diesel::Timestamp,
    pub updated: jiff_diesel::Timestamp,
}

#[derive(Clone, Debug, Identifiable, Queryable, Selectable)]
#[diesel(table_name = crate::schema::assist::maker_checker_logs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct MakerCheckerLog {
    pub id: i32,
    pub entity_type: EntityType,
    pub entity_id: i32,
    pub action: Action,
    pub status: LogStatus,
    pub maker_id: i32,
    pub checker_id: Option<i32>,
    pub created: jiff_diesel::Timestamp,
    pub updated: jiff_diesel::Timestamp,
}

/// Input for registering a user; the password is already hashed.
#[derive(Clone, Debug)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub name: String,
    pub role: Role,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewParameter {
    pub category: String,
    pub value: String,
}

/// Input for creating an applicant, and the full replacement set of fields when updating one.
#[derive(Clone, Debug)]
pub struct NewApplicant {
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
}

#[derive(Clone, Debug)]
pub struct NewApplication {
    pub applicant_id: i32,
    pub programme_id: i32,
    pub application_date: jiff::civil::Date,
}

/// One row of a location upload, county first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocationPath {
    pub county: String,
    pub sub_county: String,
    pub location: String,
    pub sub_location: String,
    pub village: String,
}
