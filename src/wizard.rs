//! Three-step registration wizard.
//!
//! `BasicDetails → OtherDetails → Review`. Moving forward runs the guard
//! of the step being left and advances one step at most; moving back is
//! always allowed. `submit` turns a completed wizard into the body that
//! `POST /auth/register` accepts.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::auth::{RegisterHospital, RegisterRequest, RegisterUser};
use crate::models::{deserialize_optional_date, AccountKind, Address, Gender};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Step {
    BasicDetails,
    OtherDetails,
    Review,
}

impl Step {
    const ALL: [Step; 3] = [Step::BasicDetails, Step::OtherDetails, Step::Review];

    fn index(self) -> usize {
        self as usize
    }

    fn next(self) -> Option<Step> {
        Self::ALL.get(self.index() + 1).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Wait,
    Process,
    Finish,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum WizardError {
    #[error("Please fill all required details: {}", missing.join(", "))]
    Incomplete {
        step: Step,
        missing: Vec<&'static str>,
    },
    #[error("Registration can only be submitted from the review step")]
    NotAtReview,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BasicDetails {
    #[serde(rename = "type")]
    pub kind: AccountKind,
    pub name: String,
    pub phone: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OtherDetails {
    pub address: Address,
    pub gender: Option<Gender>,
    #[serde(deserialize_with = "deserialize_optional_date")]
    pub dob: Option<NaiveDate>,
    pub medical_history: Vec<String>,
    pub website: Option<String>,
    #[serde(alias = "department")]
    pub departments: Vec<String>,
    pub available_services: Vec<String>,
}

impl Default for BasicDetails {
    fn default() -> Self {
        Self {
            kind: AccountKind::Hospital,
            name: String::new(),
            phone: String::new(),
            email: String::new(),
            password: String::new(),
            confirm_password: String::new(),
        }
    }
}

fn blank(value: &str) -> bool {
    value.trim().is_empty()
}

impl BasicDetails {
    /// Labels of the fields still missing; empty when the step is complete.
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        for (label, value) in [
            ("Name", &self.name),
            ("Phone", &self.phone),
            ("Email", &self.email),
            ("Password", &self.password),
            ("Confirm Password", &self.confirm_password),
        ] {
            if blank(value) {
                missing.push(label);
            }
        }
        if !blank(&self.password)
            && !blank(&self.confirm_password)
            && self.password != self.confirm_password
        {
            missing.push("Matching Passwords");
        }
        missing
    }
}

impl OtherDetails {
    pub fn missing(&self, kind: AccountKind) -> Vec<&'static str> {
        let mut missing = Vec::new();
        for (label, value) in [
            ("Street", &self.address.street),
            ("City", &self.address.city),
            ("State", &self.address.state),
            ("Postal Code", &self.address.postal_code),
        ] {
            if blank(value) {
                missing.push(label);
            }
        }
        match kind {
            AccountKind::User => {
                if self.gender.is_none() {
                    missing.push("Gender");
                }
                if self.dob.is_none() {
                    missing.push("Date of Birth");
                }
            }
            AccountKind::Hospital => {
                if self.departments.iter().all(|d| blank(d)) {
                    missing.push("Department");
                }
                if self.available_services.iter().all(|s| blank(s)) {
                    missing.push("Available Services");
                }
            }
        }
        missing
    }
}

#[derive(Debug, Clone)]
pub struct RegistrationWizard {
    current: Step,
    statuses: [StepStatus; 3],
    pub basic: BasicDetails,
    pub other: OtherDetails,
}

impl Default for RegistrationWizard {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistrationWizard {
    pub fn new() -> Self {
        Self {
            current: Step::BasicDetails,
            statuses: [StepStatus::Process, StepStatus::Wait, StepStatus::Wait],
            basic: BasicDetails::default(),
            other: OtherDetails::default(),
        }
    }

    pub fn current(&self) -> Step {
        self.current
    }

    pub fn status(&self, step: Step) -> StepStatus {
        self.statuses[step.index()]
    }

    fn guard(&self, step: Step) -> Result<(), WizardError> {
        let missing = match step {
            Step::BasicDetails => self.basic.missing(),
            Step::OtherDetails => self.other.missing(self.basic.kind),
            Step::Review => Vec::new(),
        };
        if missing.is_empty() {
            Ok(())
        } else {
            Err(WizardError::Incomplete { step, missing })
        }
    }

    /// Move towards `target`. Forward moves advance one step at most and
    /// only when the current step is complete; backward moves always succeed.
    pub fn go_to(&mut self, target: Step) -> Result<Step, WizardError> {
        if target <= self.current {
            self.current = target;
            return Ok(self.current);
        }
        self.guard(self.current)?;
        if let Some(next) = self.current.next() {
            self.statuses[self.current.index()] = StepStatus::Finish;
            self.statuses[next.index()] = StepStatus::Process;
            self.current = next;
        }
        Ok(self.current)
    }

    pub fn next(&mut self) -> Result<Step, WizardError> {
        match self.current.next() {
            Some(step) => self.go_to(step),
            None => Ok(self.current),
        }
    }

    pub fn back(&mut self) -> Step {
        if let Some(prev) = self.current.index().checked_sub(1) {
            self.current = Step::ALL[prev];
        }
        self.current
    }

    /// Build the registration body. Only valid on the review step.
    pub fn submit(&mut self) -> Result<RegisterRequest, WizardError> {
        if self.current != Step::Review {
            return Err(WizardError::NotAtReview);
        }
        self.guard(Step::BasicDetails)?;
        self.guard(Step::OtherDetails)?;
        self.statuses[Step::Review.index()] = StepStatus::Finish;

        let basic = &self.basic;
        let other = &self.other;
        let request = match basic.kind {
            AccountKind::User => RegisterRequest::User(RegisterUser {
                name: basic.name.trim().to_string(),
                email: basic.email.trim().to_string(),
                password: basic.password.clone(),
                phone: basic.phone.trim().to_string(),
                dob: other.dob,
                gender: other.gender,
                address: other.address.clone(),
                medical_history: other.medical_history.clone(),
            }),
            AccountKind::Hospital => RegisterRequest::Hospital(RegisterHospital {
                name: basic.name.trim().to_string(),
                email: basic.email.trim().to_string(),
                password: basic.password.clone(),
                phone: basic.phone.trim().to_string(),
                website: other.website.clone().filter(|w| !blank(w)),
                departments: other.departments.clone(),
                available_services: other.available_services.clone(),
                address: other.address.clone(),
            }),
        };
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled_basic(kind: AccountKind) -> BasicDetails {
        BasicDetails {
            kind,
            name: "Asha Patil".into(),
            phone: "9876543210".into(),
            email: "asha@example.com".into(),
            password: "secret123".into(),
            confirm_password: "secret123".into(),
        }
    }

    fn pune() -> Address {
        Address {
            street: "4 FC Road".into(),
            city: "Pune".into(),
            state: "Maharashtra".into(),
            postal_code: "411004".into(),
        }
    }

    #[test]
    fn starts_on_basic_details() {
        let wizard = RegistrationWizard::new();
        assert_eq!(wizard.current(), Step::BasicDetails);
        assert_eq!(wizard.status(Step::BasicDetails), StepStatus::Process);
        assert_eq!(wizard.status(Step::Review), StepStatus::Wait);
    }

    #[test]
    fn empty_basic_details_block_forward_move() {
        let mut wizard = RegistrationWizard::new();
        wizard.basic.name = "Asha".into();
        let err = wizard.next().unwrap_err();
        assert_eq!(
            err,
            WizardError::Incomplete {
                step: Step::BasicDetails,
                missing: vec!["Phone", "Email", "Password", "Confirm Password"],
            }
        );
        assert_eq!(wizard.current(), Step::BasicDetails);
    }

    #[test]
    fn password_mismatch_blocks_forward_move() {
        let mut wizard = RegistrationWizard::new();
        wizard.basic = filled_basic(AccountKind::User);
        wizard.basic.confirm_password = "different".into();
        let err = wizard.next().unwrap_err();
        assert!(matches!(err, WizardError::Incomplete { ref missing, .. } if missing == &vec!["Matching Passwords"]));
    }

    #[test]
    fn jumping_ahead_advances_one_step() {
        let mut wizard = RegistrationWizard::new();
        wizard.basic = filled_basic(AccountKind::User);
        assert_eq!(wizard.go_to(Step::Review).unwrap(), Step::OtherDetails);
        assert_eq!(wizard.status(Step::BasicDetails), StepStatus::Finish);
        assert_eq!(wizard.status(Step::OtherDetails), StepStatus::Process);
    }

    #[test]
    fn user_other_details_need_gender_and_dob() {
        let mut wizard = RegistrationWizard::new();
        wizard.basic = filled_basic(AccountKind::User);
        wizard.next().unwrap();
        wizard.other.address = pune();
        let err = wizard.next().unwrap_err();
        assert_eq!(
            err,
            WizardError::Incomplete {
                step: Step::OtherDetails,
                missing: vec!["Gender", "Date of Birth"],
            }
        );
    }

    #[test]
    fn hospital_other_details_need_departments_and_services() {
        let other = OtherDetails {
            address: Address {
                postal_code: String::new(),
                ..pune()
            },
            departments: vec![" ".into()],
            ..Default::default()
        };
        assert_eq!(
            other.missing(AccountKind::Hospital),
            vec!["Postal Code", "Department", "Available Services"]
        );
    }

    #[test]
    fn backward_moves_are_unconditional() {
        let mut wizard = RegistrationWizard::new();
        wizard.basic = filled_basic(AccountKind::User);
        wizard.next().unwrap();
        wizard.basic.name.clear();
        assert_eq!(wizard.back(), Step::BasicDetails);
        assert_eq!(wizard.back(), Step::BasicDetails);
        assert_eq!(wizard.go_to(Step::BasicDetails).unwrap(), Step::BasicDetails);
    }

    #[test]
    fn submit_requires_review_step() {
        let mut wizard = RegistrationWizard::new();
        assert_eq!(wizard.submit().unwrap_err(), WizardError::NotAtReview);
    }

    #[test]
    fn completed_user_wizard_submits_register_body() {
        let mut wizard = RegistrationWizard::new();
        wizard.basic = filled_basic(AccountKind::User);
        wizard.next().unwrap();
        wizard.other.address = pune();
        wizard.other.gender = Some(Gender::Female);
        wizard.other.dob = NaiveDate::from_ymd_opt(1995, 1, 20);
        wizard.next().unwrap();
        assert_eq!(wizard.current(), Step::Review);

        let body = serde_json::to_value(wizard.submit().unwrap()).unwrap();
        assert_eq!(body["type"], "user");
        assert_eq!(body["email"], "asha@example.com");
        assert_eq!(body["address"]["city"], "Pune");
        assert!(body.get("confirmPassword").is_none());
        assert_eq!(wizard.status(Step::Review), StepStatus::Finish);
    }

    #[test]
    fn completed_hospital_wizard_submits_hospital_body() {
        let mut wizard = RegistrationWizard::new();
        wizard.basic = filled_basic(AccountKind::Hospital);
        wizard.next().unwrap();
        wizard.other.address = pune();
        wizard.other.departments = vec!["Cardiology".into()];
        wizard.other.available_services = vec!["OPD".into()];
        wizard.other.website = Some(String::new());
        wizard.next().unwrap();

        match wizard.submit().unwrap() {
            RegisterRequest::Hospital(h) => {
                assert_eq!(h.departments, vec!["Cardiology".to_string()]);
                assert_eq!(h.website, None);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
