//! Maker-checker state machine.
//!
//! Acting directly moves an entity straight to its terminal state. Acting through the
//! maker-checker moves it to `Proposed` and leaves a log row that a second user resolves.
//! Both store implementations call these functions so the rules live in one place.

use crate::{
    models::MakerCheckerLog,
    status::{Action, ApplicationStatus, EntityType, LogStatus, VerificationStatus},
    Error,
};

/// Next verification status for an applicant, or why it may not be verified now.
pub fn verify(
    current: VerificationStatus,
    use_maker_checker: bool,
) -> Result<VerificationStatus, Error> {
    match current {
        VerificationStatus::Pending | VerificationStatus::Rejected => Ok(if use_maker_checker {
            VerificationStatus::Proposed
        } else {
            VerificationStatus::Verified
        }),
        VerificationStatus::Proposed => Err(Error::InvalidState(
            "Applicant verification is already awaiting confirmation".into(),
        )),
        VerificationStatus::Verified => {
            Err(Error::InvalidState("Applicant is already verified".into()))
        }
    }
}

/// Fails unless the applicant behind an application is verified.
pub fn check_approvable(applicant: VerificationStatus) -> Result<(), Error> {
    if applicant != VerificationStatus::Verified {
        return Err(Error::InvalidState(
            "Cannot approve application: Applicant is not verified".into(),
        ));
    }
    Ok(())
}

/// Next status for an application. The applicant must already be verified.
pub fn approve(
    applicant: VerificationStatus,
    current: ApplicationStatus,
    use_maker_checker: bool,
) -> Result<ApplicationStatus, Error> {
    check_approvable(applicant)?;
    match current {
        ApplicationStatus::Pending | ApplicationStatus::Rejected => Ok(if use_maker_checker {
            ApplicationStatus::Proposed
        } else {
            ApplicationStatus::Approved
        }),
        ApplicationStatus::Proposed => Err(Error::InvalidState(
            "Application approval is already awaiting confirmation".into(),
        )),
        ApplicationStatus::Approved => {
            Err(Error::InvalidState("Application is already approved".into()))
        }
    }
}

/// An application may only move to another applicant or programme while nothing is
/// proposed or approved for it.
pub fn check_repointable(current: ApplicationStatus) -> Result<(), Error> {
    match current {
        ApplicationStatus::Pending | ApplicationStatus::Rejected => Ok(()),
        ApplicationStatus::Proposed | ApplicationStatus::Approved => {
            Err(Error::InvalidState(format!(
                "Cannot change the applicant or programme of an application that is {current}"
            )))
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConfirmPolicy {
    pub allow_self_confirm: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetStatus {
    Applicant(VerificationStatus),
    Application(ApplicationStatus),
}

/// Outcome of confirming or rejecting a proposed action.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub log_status: LogStatus,
    pub target: TargetStatus,
}

pub fn resolve(
    log: &MakerCheckerLog,
    checker_id: i32,
    approve: bool,
    policy: ConfirmPolicy,
) -> Result<Resolution, Error> {
    if log.status != LogStatus::Proposed {
        return Err(Error::InvalidState(format!(
            "Maker-checker log {} is already {}",
            log.id, log.status
        )));
    }
    if log.maker_id == checker_id && !policy.allow_self_confirm {
        return Err(Error::InvalidState(
            "The maker of a proposal cannot also confirm it".into(),
        ));
    }
    let log_status = if approve {
        LogStatus::Approved
    } else {
        LogStatus::Rejected
    };
    let target = match (log.entity_type, log.action) {
        (EntityType::Applicant, Action::Verify) => TargetStatus::Applicant(if approve {
            VerificationStatus::Verified
        } else {
            VerificationStatus::Rejected
        }),
        (EntityType::Application, Action::Approve) => TargetStatus::Application(if approve {
            ApplicationStatus::Approved
        } else {
            ApplicationStatus::Rejected
        }),
        (entity_type, action) => {
            return Err(Error::InvalidState(format!(
                "Unsupported maker-checker action {action} on {entity_type}"
            )));
        }
    };
    Ok(Resolution { log_status, target })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log(entity_type: EntityType, action: Action, status: LogStatus) -> MakerCheckerLog {
        let now: jiff_diesel::Timestamp = jiff::Timestamp::now().into();
        MakerCheckerLog {
            id: 7,
            entity_type,
            entity_id: 1,
            action,
            status,
            maker_id: 10,
            checker_id: None,
            created: now,
            updated: now,
        }
    }

    #[test]
    fn verify_is_direct_or_proposed() {
        assert_eq!(
            verify(VerificationStatus::Pending, false).unwrap(),
            VerificationStatus::Verified
        );
        assert_eq!(
            verify(VerificationStatus::Rejected, true).unwrap(),
            VerificationStatus::Proposed
        );
        assert!(matches!(
            verify(VerificationStatus::Proposed, false),
            Err(Error::InvalidState(_))
        ));
        assert!(matches!(
            verify(VerificationStatus::Verified, true),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn approve_requires_verified_applicant() {
        for applicant in [
            VerificationStatus::Pending,
            VerificationStatus::Proposed,
            VerificationStatus::Rejected,
        ] {
            for use_maker_checker in [false, true] {
                match approve(applicant, ApplicationStatus::Pending, use_maker_checker) {
                    Err(Error::InvalidState(message)) => {
                        assert_eq!(message, "Cannot approve application: Applicant is not verified")
                    }
                    other => panic!("expected invalid state, got {other:?}"),
                }
            }
        }
        assert_eq!(
            approve(VerificationStatus::Verified, ApplicationStatus::Pending, false).unwrap(),
            ApplicationStatus::Approved
        );
        assert_eq!(
            approve(VerificationStatus::Verified, ApplicationStatus::Rejected, true).unwrap(),
            ApplicationStatus::Proposed
        );
    }

    #[test]
    fn only_open_applications_can_be_repointed() {
        assert!(check_repointable(ApplicationStatus::Pending).is_ok());
        assert!(check_repointable(ApplicationStatus::Rejected).is_ok());
        for status in [ApplicationStatus::Proposed, ApplicationStatus::Approved] {
            assert!(matches!(
                check_repointable(status),
                Err(Error::InvalidState(_))
            ));
        }
    }

    #[test]
    fn confirmed_approval_still_needs_a_verified_applicant() {
        assert!(check_approvable(VerificationStatus::Verified).is_ok());
        assert!(matches!(
            check_approvable(VerificationStatus::Pending),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn resolve_maps_verify_and_approve_logs() {
        let policy = ConfirmPolicy::default();
        let verify_log = log(EntityType::Applicant, Action::Verify, LogStatus::Proposed);
        assert_eq!(
            resolve(&verify_log, 11, true, policy).unwrap(),
            Resolution {
                log_status: LogStatus::Approved,
                target: TargetStatus::Applicant(VerificationStatus::Verified),
            }
        );
        assert_eq!(
            resolve(&verify_log, 11, false, policy).unwrap(),
            Resolution {
                log_status: LogStatus::Rejected,
                target: TargetStatus::Applicant(VerificationStatus::Rejected),
            }
        );
        let approve_log = log(EntityType::Application, Action::Approve, LogStatus::Proposed);
        assert_eq!(
            resolve(&approve_log, 11, false, policy).unwrap().target,
            TargetStatus::Application(ApplicationStatus::Rejected)
        );
    }

    #[test]
    fn resolve_rejects_closed_logs_and_self_confirmation() {
        let closed = log(EntityType::Applicant, Action::Verify, LogStatus::Approved);
        assert!(matches!(
            resolve(&closed, 11, true, ConfirmPolicy::default()),
            Err(Error::InvalidState(_))
        ));
        let open = log(EntityType::Applicant, Action::Verify, LogStatus::Proposed);
        assert!(matches!(
            resolve(&open, 10, true, ConfirmPolicy::default()),
            Err(Error::InvalidState(_))
        ));
        let allowed = ConfirmPolicy {
            allow_self_confirm: true,
        };
        assert!(resolve(&open, 10, true, allowed).is_ok());
        let mismatched = log(EntityType::Applicant, Action::Approve, LogStatus::Proposed);
        assert!(resolve(&mismatched, 11, true, allowed).is_err());
    }
}
