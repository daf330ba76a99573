//! Runs against a real PostgreSQL database named by `DATABASE_URL` with the migrations applied.
//! Ignored by default: `cargo test -- --ignored`.

use crate::{
    models::{LocationPath, NewApplicant, NewApplication, NewParameter, NewUser},
    paging::PageRequest,
    query::{ApplicantFilter, ExportFilter, LocationScope},
    schema::assist::{applicants, locations, sub_counties, sub_locations, villages},
    status::{ApplicationStatus, LogStatus, Role, VerificationStatus},
    workflow::ConfirmPolicy,
    ApplicantStore, ApplicationStore, Config, Error, MakerCheckerStore, PgStore, ReferenceStore,
    UserStore,
};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use dotenvy::dotenv;
use std::{env, time::Duration};

async fn establish_store() -> PgStore {
    dotenv().ok();
    let db_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let config = Config {
        db_url,
        max_open: 4,
        max_idle: 2,
        max_lifetime: None,
        max_idle_lifetime: None,
        timeout_for_get: Duration::from_secs(5),
    };
    crate::create(&config)
        .await
        .unwrap_or_else(|err| panic!("Error connecting to database: {err}"))
}

/// Unique per run so repeated runs don't collide on the id number constraint.
fn unique_suffix() -> String {
    jiff::Timestamp::now().as_nanosecond().to_string()
}

async fn seed_applicant(store: &PgStore, suffix: &str) -> NewApplicant {
    store
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
        .expect("should insert or skip parameters");
    let sex = store
        .list_parameters(Some("Sex"), &PageRequest::default())
        .await
        .expect("should list parameters");
    let marital = store
        .list_parameters(Some("Marital Status"), &PageRequest::default())
        .await
        .expect("should list parameters");
    let villages = store
        .upsert_location_paths(vec![LocationPath {
            county: "Test County".into(),
            sub_county: "Test Sub County".into(),
            location: "Test Location".into(),
            sub_location: "Test Sub Location".into(),
            village: format!("Village {suffix}"),
        }])
        .await
        .expect("should upsert location path");
    NewApplicant {
        first_name: "Jane".into(),
        middle_name: None,
        last_name: format!("Tester{suffix}"),
        sex_id: sex.content[0].id,
        age: 41,
        marital_status_id: marital.content[0].id,
        id_number: suffix.chars().rev().take(20).collect(),
        village_id: villages[0].id,
        postal_address: None,
        physical_address: Some("Plot 7".into()),
        telephone: None,
    }
}

#[tokio::test]
#[ignore]
async fn it_rejects_a_second_applicant_with_the_same_id_number() {
    let store = establish_store().await;
    let applicant = seed_applicant(&store, &unique_suffix()).await;
    let created = store
        .create_applicant(applicant.clone())
        .await
        .expect("should create the first applicant");
    assert_eq!(created.verification_status, VerificationStatus::Pending);
    let err = store
        .create_applicant(applicant)
        .await
        .expect_err("should reject the duplicate");
    assert!(matches!(err, Error::Duplicate(_)), "got {err:?}");
}

async fn seed_user(store: &PgStore, username: String, role: Role) -> i32 {
    store
        .create_user(NewUser {
            username,
            password_hash: "not-a-real-hash".into(),
            name: "Test User".into(),
            role,
            email: None,
            phone: None,
        })
        .await
        .expect("should create user")
        .id
}

#[tokio::test]
#[ignore]
async fn it_confirms_a_proposed_verification() {
    let store = establish_store().await;
    let suffix = unique_suffix();
    let applicant = seed_applicant(&store, &suffix).await;
    let maker = seed_user(&store, format!("maker{suffix}"), Role::Verifier).await;
    let checker = seed_user(&store, format!("checker{suffix}"), Role::Approver).await;
    let created = store
        .create_applicant(applicant)
        .await
        .expect("should create applicant");
    let acted = store
        .verify_applicant(created.id, maker, true)
        .await
        .expect("should propose verification");
    let log = acted.log.expect("should have left a log row");
    assert_eq!(log.status, LogStatus::Proposed);
    let confirmed = store
        .confirm_log(log.id, checker, false, ConfirmPolicy::default())
        .await
        .expect("should reject the proposal");
    assert_eq!(confirmed.status, LogStatus::Rejected);
    let found = store
        .list_applicants(
            &ApplicantFilter {
                name: Some(format!("tester{suffix}")),
                ..ApplicantFilter::default()
            },
            &PageRequest::default(),
        )
        .await
        .expect("should search by name");
    assert_eq!(found.total_elements, 1);
    assert_eq!(
        found.content[0].verification_status,
        VerificationStatus::Rejected
    );
}

/// A second applicant in the same village with its own id number.
fn sibling(applicant: &NewApplicant, first_name: &str) -> NewApplicant {
    NewApplicant {
        first_name: first_name.into(),
        id_number: format!("B{}", &applicant.id_number[1..]),
        ..applicant.clone()
    }
}

async fn seed_programme(store: &PgStore, name: String) -> i32 {
    store
        .create_programme(name)
        .await
        .expect("should create programme")
        .id
}

async fn apply(
    store: &PgStore,
    applicant_id: i32,
    programme_id: i32,
    application_date: jiff::civil::Date,
) -> i32 {
    store
        .create_application(NewApplication {
            applicant_id,
            programme_id,
            application_date,
        })
        .await
        .expect("should create application")
        .id
}

async fn exported(store: &PgStore, filter: ExportFilter) -> Vec<i32> {
    store
        .export_applications(&filter)
        .await
        .expect("should export")
        .into_iter()
        .map(|row| row.id)
        .collect()
}

/// `(county, sub county, location, sub location)` ids above a village.
async fn ancestors(store: &PgStore, village_id: i32) -> (i32, i32, i32, i32) {
    let mut conn = store
        .connection()
        .await
        .expect("should get a connection");
    villages::table
        .inner_join(
            sub_locations::table.inner_join(locations::table.inner_join(sub_counties::table)),
        )
        .filter(villages::id.eq(village_id))
        .select((
            sub_counties::county_id,
            locations::sub_county_id,
            sub_locations::location_id,
            villages::sub_location_id,
        ))
        .first(&mut conn)
        .await
        .expect("should find the village ancestors")
}

#[tokio::test]
#[ignore]
async fn it_skips_parameters_that_already_exist() {
    let store = establish_store().await;
    let category = format!("Cat {}", unique_suffix());
    let parameter = |value: &str| NewParameter {
        category: category.clone(),
        value: value.into(),
    };
    let created = store
        .create_parameters(vec![parameter("A"), parameter("B"), parameter("A")])
        .await
        .expect("should insert new parameters");
    assert_eq!(
        created.iter().map(|p| p.value.as_str()).collect::<Vec<_>>(),
        vec!["A", "B"]
    );
    let created = store
        .create_parameters(vec![parameter("B"), parameter("C")])
        .await
        .expect("should skip existing parameters");
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].value, "C");
    let listed = store
        .list_parameters(Some(&category), &PageRequest::default())
        .await
        .expect("should list parameters");
    assert_eq!(listed.total_elements, 3);
}

#[tokio::test]
#[ignore]
async fn it_reuses_location_nodes_on_upsert() {
    let store = establish_store().await;
    let suffix = unique_suffix();
    let path = |village: &str| LocationPath {
        county: format!("County {suffix}"),
        sub_county: "Central".into(),
        location: "Market".into(),
        sub_location: "Upper".into(),
        village: village.into(),
    };
    let villages = store
        .upsert_location_paths(vec![path("Alpha"), path("Beta"), path("Alpha")])
        .await
        .expect("should upsert paths");
    assert_eq!(villages[0].id, villages[2].id);
    assert_ne!(villages[0].id, villages[1].id);
    assert_eq!(villages[0].sub_location_id, villages[1].sub_location_id);
    let again = store
        .upsert_location_paths(vec![path("Beta")])
        .await
        .expect("should find the existing path");
    assert_eq!(again[0].id, villages[1].id);
    assert_eq!(
        ancestors(&store, villages[0].id).await,
        ancestors(&store, again[0].id).await
    );
}

#[tokio::test]
#[ignore]
async fn it_only_approves_applications_of_verified_applicants() {
    let store = establish_store().await;
    let suffix = unique_suffix();
    let applicant = seed_applicant(&store, &suffix).await;
    let verifier = seed_user(&store, format!("verifier{suffix}"), Role::Verifier).await;
    let approver = seed_user(&store, format!("approver{suffix}"), Role::Approver).await;
    let programme_id = seed_programme(&store, format!("Programme {suffix}")).await;
    let applicant = store
        .create_applicant(applicant)
        .await
        .expect("should create applicant");
    let date = jiff::civil::date(2025, 3, 1);
    let application_id = apply(&store, applicant.id, programme_id, date).await;

    let err = store
        .approve_application(application_id, approver, false)
        .await
        .expect_err("should refuse an unverified applicant");
    assert!(
        matches!(&err, Error::InvalidState(message) if message.contains("not verified")),
        "got {err:?}"
    );
    let application = store
        .load_application(application_id)
        .await
        .expect("should load application")
        .expect("should still exist");
    assert_eq!(application.status, ApplicationStatus::Pending);
    assert_eq!(application.checker_id, None);

    store
        .verify_applicant(applicant.id, verifier, false)
        .await
        .expect("should verify applicant");
    let acted = store
        .approve_application(application_id, approver, false)
        .await
        .expect("should approve");
    assert_eq!(acted.entity.status, ApplicationStatus::Approved);
    assert_eq!(acted.entity.checker_id, Some(approver));
    assert!(acted.log.is_none());
}

#[tokio::test]
#[ignore]
async fn it_checks_the_pair_and_status_when_changing_an_application() {
    let store = establish_store().await;
    let suffix = unique_suffix();
    let first = seed_applicant(&store, &suffix).await;
    let second = sibling(&first, "Joan");
    let approver = seed_user(&store, format!("approver{suffix}"), Role::Approver).await;
    let verifier = seed_user(&store, format!("verifier{suffix}"), Role::Verifier).await;
    let programme_id = seed_programme(&store, format!("Programme {suffix}")).await;
    let other_programme_id = seed_programme(&store, format!("Other {suffix}")).await;
    let first = store.create_applicant(first).await.expect("should create");
    let second = store.create_applicant(second).await.expect("should create");
    let date = jiff::civil::date(2025, 3, 1);
    let taken = apply(&store, first.id, programme_id, date).await;
    let moving = apply(&store, second.id, programme_id, date).await;

    let err = store
        .update_application(moving, first.id, programme_id)
        .await
        .expect_err("should refuse a taken pair");
    assert!(matches!(err, Error::Duplicate(_)), "got {err:?}");
    let err = store
        .update_application(moving, second.id, -1)
        .await
        .expect_err("should refuse an unknown programme");
    assert!(matches!(err, Error::NotFound(_)), "got {err:?}");
    let moved = store
        .update_application(moving, second.id, other_programme_id)
        .await
        .expect("should move to a free pair");
    assert_eq!(moved.programme_id, other_programme_id);

    store
        .verify_applicant(first.id, verifier, false)
        .await
        .expect("should verify");
    store
        .approve_application(taken, approver, true)
        .await
        .expect("should propose approval");
    let err = store
        .update_application(taken, second.id, programme_id)
        .await
        .expect_err("should refuse to re-point a proposed application");
    assert!(matches!(err, Error::InvalidState(_)), "got {err:?}");
    let unchanged = store
        .load_application(taken)
        .await
        .expect("should load")
        .expect("should exist");
    assert_eq!(unchanged.applicant_id, first.id);
    assert_eq!(unchanged.status, ApplicationStatus::Proposed);
}

#[tokio::test]
#[ignore]
async fn it_confirms_a_proposed_approval() {
    let store = establish_store().await;
    let suffix = unique_suffix();
    let first = seed_applicant(&store, &suffix).await;
    let second = sibling(&first, "Joan");
    let verifier = seed_user(&store, format!("verifier{suffix}"), Role::Verifier).await;
    let maker = seed_user(&store, format!("maker{suffix}"), Role::Approver).await;
    let checker = seed_user(&store, format!("checker{suffix}"), Role::Approver).await;
    let programme_id = seed_programme(&store, format!("Programme {suffix}")).await;
    let date = jiff::civil::date(2025, 3, 1);
    let mut application_ids = Vec::new();
    let mut applicant_ids = Vec::new();
    for applicant in [first, second] {
        let applicant = store.create_applicant(applicant).await.expect("should create");
        store
            .verify_applicant(applicant.id, verifier, false)
            .await
            .expect("should verify");
        application_ids.push(apply(&store, applicant.id, programme_id, date).await);
        applicant_ids.push(applicant.id);
    }
    let mut logs = Vec::new();
    for &application_id in &application_ids {
        let acted = store
            .approve_application(application_id, maker, true)
            .await
            .expect("should propose approval");
        assert_eq!(acted.entity.status, ApplicationStatus::Proposed);
        assert_eq!(acted.entity.maker_id, Some(maker));
        logs.push(acted.log.expect("should have left a log row"));
    }

    let err = store
        .confirm_log(logs[0].id, maker, true, ConfirmPolicy::default())
        .await
        .expect_err("should refuse the maker");
    assert!(matches!(err, Error::InvalidState(_)), "got {err:?}");
    let confirmed = store
        .confirm_log(logs[0].id, checker, true, ConfirmPolicy::default())
        .await
        .expect("should confirm the proposal");
    assert_eq!(confirmed.status, LogStatus::Approved);
    assert_eq!(confirmed.checker_id, Some(checker));
    let approved = store
        .load_application(application_ids[0])
        .await
        .expect("should load")
        .expect("should exist");
    assert_eq!(approved.status, ApplicationStatus::Approved);
    assert_eq!(approved.maker_id, Some(maker));
    assert_eq!(approved.checker_id, Some(checker));

    let mut conn = store
        .connection()
        .await
        .expect("should get a connection");
    diesel::update(applicants::table.find(applicant_ids[1]))
        .set(applicants::verification_status.eq(VerificationStatus::Pending))
        .execute(&mut conn)
        .await
        .expect("should reset the verification");
    drop(conn);
    let err = store
        .confirm_log(logs[1].id, checker, true, ConfirmPolicy::default())
        .await
        .expect_err("should refuse an applicant that is no longer verified");
    assert!(matches!(err, Error::InvalidState(_)), "got {err:?}");
    let pending = store
        .load_log(logs[1].id)
        .await
        .expect("should load log")
        .expect("should exist");
    assert_eq!(pending.status, LogStatus::Proposed);
    let proposed = store
        .load_application(application_ids[1])
        .await
        .expect("should load")
        .expect("should exist");
    assert_eq!(proposed.status, ApplicationStatus::Proposed);
}

#[tokio::test]
#[ignore]
async fn it_exports_by_location_scope_and_date_range() {
    let store = establish_store().await;
    let suffix = unique_suffix();
    let first = seed_applicant(&store, &suffix).await;
    let path = |sub_county: &str, village: &str| LocationPath {
        county: format!("County {suffix}"),
        sub_county: sub_county.into(),
        location: "Market".into(),
        sub_location: "Upper".into(),
        village: village.into(),
    };
    let villages = store
        .upsert_location_paths(vec![path("East", "Alpha"), path("West", "Beta")])
        .await
        .expect("should upsert paths");
    let first = NewApplicant {
        village_id: villages[0].id,
        ..first
    };
    let second = NewApplicant {
        village_id: villages[1].id,
        ..sibling(&first, "Joan")
    };
    let programme_id = seed_programme(&store, format!("Programme {suffix}")).await;
    let first = store.create_applicant(first).await.expect("should create");
    let second = store.create_applicant(second).await.expect("should create");
    let early = apply(&store, first.id, programme_id, jiff::civil::date(2025, 3, 1)).await;
    let late = apply(&store, second.id, programme_id, jiff::civil::date(2025, 3, 31)).await;
    let (county, east, east_location, east_sub_location) =
        ancestors(&store, villages[0].id).await;
    let (_, west, west_location, _) = ancestors(&store, villages[1].id).await;
    assert_ne!(east, west);
    assert_ne!(east_location, west_location);

    let filter = ExportFilter {
        status: None,
        start: jiff::civil::date(2025, 3, 1),
        end: jiff::civil::date(2025, 3, 31),
        age: None,
        sex_id: None,
        marital_status_id: None,
        location: LocationScope::County(county),
    };
    assert_eq!(exported(&store, filter.clone()).await, vec![early, late]);
    let scoped = |location| ExportFilter {
        location,
        ..filter.clone()
    };
    assert_eq!(exported(&store, scoped(LocationScope::SubCounty(east))).await, vec![early]);
    assert_eq!(exported(&store, scoped(LocationScope::SubCounty(west))).await, vec![late]);
    assert_eq!(exported(&store, scoped(LocationScope::Location(west_location))).await, vec![late]);
    assert_eq!(
        exported(&store, scoped(LocationScope::SubLocation(east_sub_location))).await,
        vec![early]
    );
    assert_eq!(exported(&store, scoped(LocationScope::Village(villages[1].id))).await, vec![late]);

    let from_second_day = ExportFilter {
        start: jiff::civil::date(2025, 3, 2),
        ..filter.clone()
    };
    assert_eq!(exported(&store, from_second_day).await, vec![late]);
    let until_the_thirtieth = ExportFilter {
        end: jiff::civil::date(2025, 3, 30),
        ..filter.clone()
    };
    assert_eq!(exported(&store, until_the_thirtieth).await, vec![early]);
    let approved_only = ExportFilter {
        status: Some(ApplicationStatus::Approved),
        ..filter
    };
    assert!(exported(&store, approved_only).await.is_empty());
}
