use crate::status::{ApplicationStatus, VerificationStatus};
use std::collections::BTreeMap;

/// Applicant search; every field left as `None` matches all applicants.
#[derive(Clone, Debug, Default)]
pub struct ApplicantFilter {
    /// Case-insensitive substring of the first, middle or last name.
    pub name: Option<String>,
    pub id_number: Option<String>,
    /// Applicants with at least one application dated on this day.
    pub date_applied: Option<jiff::civil::Date>,
    pub status: Option<VerificationStatus>,
    pub village_id: Option<i32>,
}

#[derive(Clone, Debug, Default)]
pub struct ApplicationFilter {
    pub applicant_id: Option<i32>,
    pub programme_id: Option<i32>,
    pub status: Option<ApplicationStatus>,
}

/// Restricts an export to applicants living somewhere in one node of the location hierarchy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LocationScope {
    #[default]
    All,
    Village(i32),
    SubLocation(i32),
    Location(i32),
    SubCounty(i32),
    County(i32),
}

#[derive(Clone, Debug)]
pub struct ExportFilter {
    pub status: Option<ApplicationStatus>,
    /// Inclusive.
    pub start: jiff::civil::Date,
    /// Inclusive.
    pub end: jiff::civil::Date,
    pub age: Option<i32>,
    pub sex_id: Option<i32>,
    pub marital_status_id: Option<i32>,
    pub location: LocationScope,
}

/// An application joined with the names needed to print it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApplicationRow {
    pub id: i32,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: String,
    pub programme_name: String,
    pub status: ApplicationStatus,
    pub application_date: jiff::civil::Date,
}

impl ApplicationRow {
    pub fn applicant_name(&self) -> String {
        crate::models::full_name(
            &self.first_name,
            self.middle_name.as_deref(),
            &self.last_name,
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgrammeStats {
    pub programme_id: i32,
    pub programme_name: String,
    pub total: i64,
    pub approved: i64,
    pub pending: i64,
    pub rejected: i64,
}

impl ProgrammeStats {
    /// Counts `(programme id, programme name, status)` rows per programme, ordered by programme name.
    pub fn tally(rows: impl IntoIterator<Item = (i32, String, ApplicationStatus)>) -> Vec<Self> {
        let mut stats: BTreeMap<(String, i32), ProgrammeStats> = BTreeMap::new();
        for (programme_id, programme_name, status) in rows {
            let entry = stats
                .entry((programme_name.clone(), programme_id))
                .or_insert_with(|| ProgrammeStats {
                    programme_id,
                    programme_name,
                    total: 0,
                    approved: 0,
                    pending: 0,
                    rejected: 0,
                });
            entry.total += 1;
            match status {
                ApplicationStatus::Approved => entry.approved += 1,
                ApplicationStatus::Pending => entry.pending += 1,
                ApplicationStatus::Rejected => entry.rejected += 1,
                ApplicationStatus::Proposed => {}
            }
        }
        stats.into_values().collect()
    }
}
