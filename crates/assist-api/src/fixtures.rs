//! Reference data shared by the service tests.

use crate::{applicants::ApplicantRequest, caller::Caller};
use assist_db::{
    models::{LocationPath, NewParameter, NewUser},
    status::Role,
    MemoryStore, ReferenceStore, UserStore,
};

pub(crate) struct Seeded {
    pub store: MemoryStore,
    pub sex_id: i32,
    pub marital_status_id: i32,
    pub village_id: i32,
    pub programme_id: i32,
    pub admin: Caller,
    pub collector: Caller,
    pub verifier: Caller,
    pub approver: Caller,
}

pub(crate) async fn seeded() -> Seeded {
    let store = MemoryStore::new();
    let parameters = store
        .create_parameters(vec![
            NewParameter {
                category: "Sex".into(),
                value: "Female".into(),
            },
            NewParameter {
                category: "Marital Status".into(),
                value: "Married".into(),
            },
        ])
        .await
        .unwrap();
    let villages = store
        .upsert_location_paths(vec![LocationPath {
            county: "Kisumu".into(),
            sub_county: "Kisumu East".into(),
            location: "Kolwa".into(),
            sub_location: "Buoye".into(),
            village: "Nyalunya".into(),
        }])
        .await
        .unwrap();
    let programme = store
        .create_programme("Older Persons Cash Transfer".into())
        .await
        .unwrap();
    let admin = user(&store, "admin1", Role::Admin).await;
    let collector = user(&store, "collector1", Role::DataCollector).await;
    let verifier = user(&store, "verifier1", Role::Verifier).await;
    let approver = user(&store, "approver1", Role::Approver).await;
    Seeded {
        sex_id: parameters[0].id,
        marital_status_id: parameters[1].id,
        village_id: villages[0].id,
        programme_id: programme.id,
        store,
        admin,
        collector,
        verifier,
        approver,
    }
}

pub(crate) async fn user(store: &MemoryStore, username: &str, role: Role) -> Caller {
    let user = store
        .create_user(NewUser {
            username: username.into(),
            password_hash: crate::login::hash_password("password123").unwrap(),
            name: username.into(),
            role,
            email: None,
            phone: None,
        })
        .await
        .unwrap();
    Caller {
        id: user.id,
        username: user.username,
        role: user.role,
    }
}

impl Seeded {
    pub fn applicant_request(&self, id_number: &str) -> ApplicantRequest {
        ApplicantRequest {
            first_name: Some("Akinyi".into()),
            middle_name: None,
            last_name: Some("Otieno".into()),
            sex_id: Some(self.sex_id),
            age: Some(67),
            marital_status_id: Some(self.marital_status_id),
            id_number: Some(id_number.into()),
            village_id: Some(self.village_id),
            postal_address: Some("P.O. Box 12, Kisumu".into()),
            physical_address: None,
            telephone: Some("0712345678".into()),
            programme_id: None,
        }
    }
}
