//! Account authentication: registration, password login, JWT issuing
//! and the OTP-based password reset flow.
//!
//! All functions here are synchronous and take a borrowed connection.
//! Network side effects (geocoding, OTP email) stay with the callers.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::db::{self, DatabaseError, NewHospital, NewUser};
use crate::models::{
    deserialize_optional_date, AccountKind, Address, Credentials, Gender, Hospital, User,
};

/// Lifetime of an issued JWT (3 days).
pub const TOKEN_TTL_SECS: i64 = 259_200;
/// Lifetime of a password-reset OTP.
pub const OTP_TTL_MINUTES: i64 = 10;
/// How long a verified OTP allows a password reset.
pub const RESET_WINDOW_MINUTES: i64 = 10;

const BCRYPT_COST: u32 = 10;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Email already registered")]
    EmailTaken,
    #[error("{0} not found")]
    AccountNotFound(&'static str),
    #[error("Invalid or expired OTP")]
    InvalidOtp,
    #[error("Verify the OTP before resetting the password")]
    ResetNotAllowed,
    #[error("Token is not valid")]
    InvalidToken,
    #[error("Password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),
    #[error("Token signing failed: {0}")]
    Signing(jsonwebtoken::errors::Error),
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

// ═══════════════════════════════════════════════════════════
// Requests
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterUser {
    #[validate(length(min = 2, message = "Name must be at least 2 characters"))]
    pub name: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
    #[validate(length(min = 10, max = 15, message = "Phone must be 10 to 15 digits"))]
    pub phone: String,
    #[serde(default, deserialize_with = "deserialize_optional_date")]
    #[validate(
        required(message = "Date of birth is required"),
        custom(function = "not_in_future")
    )]
    pub dob: Option<NaiveDate>,
    #[validate(required(message = "Gender is required"))]
    pub gender: Option<Gender>,
    #[serde(default)]
    #[validate(nested)]
    pub address: Address,
    #[serde(default)]
    pub medical_history: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterHospital {
    #[validate(length(min = 2, message = "Name must be at least 2 characters"))]
    pub name: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
    #[validate(length(min = 10, max = 15, message = "Phone must be 10 to 15 digits"))]
    pub phone: String,
    #[validate(url(message = "Website must be a valid URL"))]
    pub website: Option<String>,
    #[serde(default, alias = "department")]
    pub departments: Vec<String>,
    #[serde(default)]
    pub available_services: Vec<String>,
    #[serde(default)]
    #[validate(nested)]
    pub address: Address,
}

/// Body of `POST /auth/register`, discriminated by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RegisterRequest {
    User(RegisterUser),
    Hospital(RegisterHospital),
}

impl Validate for RegisterRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        match self {
            RegisterRequest::User(user) => user.validate(),
            RegisterRequest::Hospital(hospital) => hospital.validate(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginRequest {
    #[serde(rename = "type")]
    pub kind: AccountKind,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ForgotPasswordRequest {
    #[serde(rename = "type")]
    pub kind: AccountKind,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct VerifyOtpRequest {
    #[serde(rename = "type", default)]
    pub kind: Option<AccountKind>,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(equal = 6, message = "OTP must be 6 digits"))]
    pub otp: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    #[serde(rename = "type")]
    pub kind: AccountKind,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub new_password: String,
}

fn not_in_future(dob: &NaiveDate) -> Result<(), ValidationError> {
    if *dob > Utc::now().date_naive() {
        let mut err = ValidationError::new("future_date");
        err.message = Some("Date of birth cannot be in the future".into());
        return Err(err);
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════
// Tokens
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimUser {
    pub id: String,
    pub kind: AccountKind,
}

/// JWT payload: `{ user: { id, kind }, iat, exp }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub user: ClaimUser,
    pub iat: i64,
    pub exp: i64,
}

/// HS256 signing and verification keys derived from the shared secret.
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl TokenKeys {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn issue(&self, id: &str, kind: AccountKind) -> Result<String, AuthError> {
        let iat = Utc::now().timestamp();
        let claims = Claims {
            user: ClaimUser {
                id: id.to_string(),
                kind,
            },
            iat,
            exp: iat + TOKEN_TTL_SECS,
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(AuthError::Signing)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let validation = Validation::new(Algorithm::HS256);
        jsonwebtoken::decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|_| AuthError::InvalidToken)
    }
}

/// The authenticated account behind a request, with its admin flag.
#[derive(Debug, Clone, PartialEq)]
pub struct Caller {
    pub id: String,
    pub kind: AccountKind,
    pub is_admin: bool,
}

impl Caller {
    /// Only user accounts can carry the admin flag.
    pub fn resolve(conn: &rusqlite::Connection, user: &ClaimUser) -> Result<Self, AuthError> {
        let is_admin = match user.kind {
            AccountKind::User => db::user_is_admin(conn, &user.id)?,
            AccountKind::Hospital => false,
        };
        Ok(Self {
            id: user.id.clone(),
            kind: user.kind,
            is_admin,
        })
    }

    /// Owner of the given account, or an admin.
    pub fn acts_for(&self, kind: AccountKind, id: &str) -> bool {
        self.is_admin || (self.kind == kind && self.id == id)
    }
}

// ═══════════════════════════════════════════════════════════
// Passwords and OTPs
// ═══════════════════════════════════════════════════════════

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    Ok(bcrypt::hash(password, BCRYPT_COST)?)
}

/// A malformed stored hash counts as a mismatch.
pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Six-digit numeric OTP.
pub fn generate_otp() -> String {
    rand::thread_rng().gen_range(100_000..1_000_000).to_string()
}

fn hash_otp(otp: &str) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(otp.trim().as_bytes());
    hasher.finalize().into()
}

fn otp_matches(creds: &Credentials, otp: &str, now: DateTime<Utc>) -> bool {
    let (Some(stored), Some(expires_at)) = (&creds.otp_hash, creds.otp_expires_at) else {
        return false;
    };
    if now > expires_at {
        return false;
    }
    stored.as_slice().ct_eq(&hash_otp(otp)).into()
}

fn kind_label(kind: AccountKind) -> &'static str {
    match kind {
        AccountKind::User => "User",
        AccountKind::Hospital => "Hospital",
    }
}

fn map_duplicate(err: DatabaseError) -> AuthError {
    if err.is_unique_violation() {
        AuthError::EmailTaken
    } else {
        AuthError::Database(err)
    }
}

// ═══════════════════════════════════════════════════════════
// Flows
// ═══════════════════════════════════════════════════════════

pub fn register_user(
    conn: &rusqlite::Connection,
    req: &RegisterUser,
) -> Result<User, AuthError> {
    let new_user = NewUser {
        name: req.name.trim().to_string(),
        email: normalize_email(&req.email),
        password_hash: hash_password(&req.password)?,
        phone: req.phone.trim().to_string(),
        dob: req.dob,
        gender: req.gender,
        address: req.address.clone(),
        medical_history: req.medical_history.clone(),
    };
    let user = db::insert_user(conn, &new_user).map_err(map_duplicate)?;
    tracing::info!(user_id = %user.id, "User registered");
    Ok(user)
}

/// Insert a hospital with coordinates already resolved by the caller.
pub fn register_hospital(
    conn: &rusqlite::Connection,
    req: &RegisterHospital,
    coordinates: Option<(f64, f64)>,
) -> Result<Hospital, AuthError> {
    let new_hospital = NewHospital {
        name: req.name.trim().to_string(),
        email: normalize_email(&req.email),
        password_hash: hash_password(&req.password)?,
        phone: req.phone.trim().to_string(),
        website: req.website.clone(),
        address: req.address.clone(),
        lat: coordinates.map(|(lat, _)| lat),
        long: coordinates.map(|(_, long)| long),
        departments: clean_list(&req.departments),
        available_services: clean_list(&req.available_services),
    };
    let hospital = db::insert_hospital(conn, &new_hospital).map_err(map_duplicate)?;
    tracing::info!(
        hospital_id = %hospital.id,
        geocoded = coordinates.is_some(),
        "Hospital registered"
    );
    Ok(hospital)
}

fn clean_list(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

/// Check credentials and issue a token. Unknown email and wrong password
/// produce the same error.
pub fn login(
    conn: &rusqlite::Connection,
    keys: &TokenKeys,
    kind: AccountKind,
    email: &str,
    password: &str,
) -> Result<String, AuthError> {
    let creds = db::get_credentials_by_email(conn, kind, &normalize_email(email))?
        .ok_or(AuthError::InvalidCredentials)?;
    if !verify_password(password, &creds.password_hash) {
        tracing::debug!(kind = kind.as_str(), "Login rejected");
        return Err(AuthError::InvalidCredentials);
    }
    keys.issue(&creds.id, kind)
}

/// Store a fresh OTP for the account and return it with the account.
pub fn issue_otp(
    conn: &rusqlite::Connection,
    kind: AccountKind,
    email: &str,
) -> Result<(Credentials, String), AuthError> {
    let creds = db::get_credentials_by_email(conn, kind, &normalize_email(email))?
        .ok_or(AuthError::AccountNotFound(kind_label(kind)))?;
    let otp = generate_otp();
    let expires_at = Utc::now() + Duration::minutes(OTP_TTL_MINUTES);
    db::store_otp(conn, kind, &creds.id, &hash_otp(&otp), expires_at)?;
    Ok((creds, otp))
}

/// Verify an OTP. Without a kind, users are checked before hospitals.
/// Success consumes the OTP and opens the reset window.
pub fn verify_otp(
    conn: &rusqlite::Connection,
    email: &str,
    otp: &str,
    kind: Option<AccountKind>,
) -> Result<AccountKind, AuthError> {
    verify_otp_at(conn, email, otp, kind, Utc::now())
}

fn verify_otp_at(
    conn: &rusqlite::Connection,
    email: &str,
    otp: &str,
    kind: Option<AccountKind>,
    now: DateTime<Utc>,
) -> Result<AccountKind, AuthError> {
    let email = normalize_email(email);
    let kinds = match kind {
        Some(kind) => vec![kind],
        None => vec![AccountKind::User, AccountKind::Hospital],
    };
    for kind in kinds {
        if let Some(creds) = db::get_credentials_by_email(conn, kind, &email)? {
            if otp_matches(&creds, otp, now) {
                db::open_reset_window(
                    conn,
                    kind,
                    &creds.id,
                    now + Duration::minutes(RESET_WINDOW_MINUTES),
                )?;
                return Ok(kind);
            }
        }
    }
    Err(AuthError::InvalidOtp)
}

pub fn reset_password(
    conn: &rusqlite::Connection,
    kind: AccountKind,
    email: &str,
    new_password: &str,
) -> Result<(), AuthError> {
    let creds = db::get_credentials_by_email(conn, kind, &normalize_email(email))?
        .ok_or(AuthError::AccountNotFound(kind_label(kind)))?;
    match creds.reset_allowed_until {
        Some(until) if Utc::now() <= until => {}
        _ => return Err(AuthError::ResetNotAllowed),
    }
    db::set_password_hash(conn, kind, &creds.id, &hash_password(new_password)?)?;
    tracing::info!(kind = kind.as_str(), account_id = %creds.id, "Password reset");
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;

    pub(crate) fn user_request(email: &str) -> RegisterUser {
        RegisterUser {
            name: "Asha Patil".into(),
            email: email.into(),
            password: "secret123".into(),
            phone: "9876543210".into(),
            dob: NaiveDate::from_ymd_opt(1995, 1, 20),
            gender: Some(Gender::Female),
            address: Address {
                street: "4 FC Road".into(),
                city: "Pune".into(),
                state: "Maharashtra".into(),
                postal_code: "411004".into(),
            },
            medical_history: vec![],
        }
    }

    pub(crate) fn hospital_request(email: &str) -> RegisterHospital {
        RegisterHospital {
            name: "Sahyadri Hospital".into(),
            email: email.into(),
            password: "secret123".into(),
            phone: "02067212121".into(),
            website: Some("https://sahyadri.example".into()),
            departments: vec!["Cardiology".into(), " ".into()],
            available_services: vec!["OPD".into()],
            address: Address {
                street: "Karve Road".into(),
                city: "Pune".into(),
                state: "Maharashtra".into(),
                postal_code: "411004".into(),
            },
        }
    }

    #[test]
    fn register_request_validation_reports_fields() {
        let mut req = user_request("not-an-email");
        req.password = "123".into();
        req.address.city.clear();
        let errors = req.validate().unwrap_err();
        let json = serde_json::to_value(&errors).unwrap();
        assert!(json.get("email").is_some());
        assert!(json.get("password").is_some());
        assert!(json.get("address").is_some());
    }

    #[test]
    fn future_dob_is_rejected() {
        let mut req = user_request("a@example.com");
        req.dob = Some(Utc::now().date_naive() + Duration::days(2));
        assert!(req.validate().is_err());
    }

    #[test]
    fn register_request_is_tagged_by_type() {
        let json = serde_json::to_value(RegisterRequest::User(user_request("a@example.com")))
            .unwrap();
        assert_eq!(json["type"], "user");
        assert_eq!(json["address"]["postalCode"], "411004");

        let back: RegisterRequest = serde_json::from_value(json).unwrap();
        assert!(matches!(back, RegisterRequest::User(_)));
    }

    #[test]
    fn hospital_request_accepts_singular_department_key() {
        let req: RegisterHospital = serde_json::from_value(serde_json::json!({
            "name": "X Hospital", "email": "x@h.in", "password": "secret1",
            "phone": "0201234567", "department": ["ENT"], "availableServices": ["OPD"],
            "address": {"street": "s", "city": "c", "state": "st", "postalCode": "1"}
        }))
        .unwrap();
        assert_eq!(req.departments, vec!["ENT".to_string()]);
    }

    #[test]
    fn duplicate_email_maps_to_email_taken() {
        let conn = open_memory_database().unwrap();
        register_user(&conn, &user_request("Dup@Example.com")).unwrap();
        let err = register_user(&conn, &user_request("dup@example.com ")).unwrap_err();
        assert!(matches!(err, AuthError::EmailTaken));
    }

    #[test]
    fn hospital_registration_drops_blank_departments() {
        let conn = open_memory_database().unwrap();
        let hospital =
            register_hospital(&conn, &hospital_request("care@h.in"), Some((18.5, 73.8))).unwrap();
        assert_eq!(hospital.departments, vec!["Cardiology".to_string()]);
        assert_eq!(hospital.lat, Some(18.5));
        assert_eq!(hospital.long, Some(73.8));
    }

    #[test]
    fn login_token_lives_three_days() {
        let conn = open_memory_database().unwrap();
        let keys = TokenKeys::new("test-secret");
        let user = register_user(&conn, &user_request("login@example.com")).unwrap();

        let token = login(&conn, &keys, AccountKind::User, "login@example.com", "secret123")
            .unwrap();
        let claims = keys.verify(&token).unwrap();
        assert_eq!(claims.user.id, user.id);
        assert_eq!(claims.user.kind, AccountKind::User);
        assert_eq!(claims.exp - claims.iat, 259_200);
    }

    #[test]
    fn wrong_password_and_unknown_email_look_the_same() {
        let conn = open_memory_database().unwrap();
        let keys = TokenKeys::new("test-secret");
        register_user(&conn, &user_request("same@example.com")).unwrap();

        let wrong = login(&conn, &keys, AccountKind::User, "same@example.com", "nope").unwrap_err();
        let unknown =
            login(&conn, &keys, AccountKind::User, "ghost@example.com", "secret123").unwrap_err();
        assert_eq!(wrong.to_string(), unknown.to_string());
        assert_eq!(wrong.to_string(), "Invalid email or password");
    }

    #[test]
    fn login_is_scoped_by_account_kind() {
        let conn = open_memory_database().unwrap();
        let keys = TokenKeys::new("test-secret");
        register_user(&conn, &user_request("kind@example.com")).unwrap();
        let err = login(&conn, &keys, AccountKind::Hospital, "kind@example.com", "secret123")
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let token = TokenKeys::new("one").issue("id-1", AccountKind::User).unwrap();
        assert!(matches!(
            TokenKeys::new("two").verify(&token),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn otp_is_six_digits() {
        for _ in 0..50 {
            let otp = generate_otp();
            assert_eq!(otp.len(), 6);
            assert!(otp.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn full_reset_flow() {
        let conn = open_memory_database().unwrap();
        let keys = TokenKeys::new("test-secret");
        register_user(&conn, &user_request("reset@example.com")).unwrap();

        let (_, otp) = issue_otp(&conn, AccountKind::User, "reset@example.com").unwrap();
        assert!(matches!(
            reset_password(&conn, AccountKind::User, "reset@example.com", "brandnew"),
            Err(AuthError::ResetNotAllowed)
        ));

        let kind = verify_otp(&conn, "reset@example.com", &otp, None).unwrap();
        assert_eq!(kind, AccountKind::User);
        // consumed
        assert!(matches!(
            verify_otp(&conn, "reset@example.com", &otp, None),
            Err(AuthError::InvalidOtp)
        ));

        reset_password(&conn, AccountKind::User, "reset@example.com", "brandnew").unwrap();
        assert!(login(&conn, &keys, AccountKind::User, "reset@example.com", "brandnew").is_ok());
        assert!(login(&conn, &keys, AccountKind::User, "reset@example.com", "secret123").is_err());
    }

    #[test]
    fn otp_expires_after_ten_minutes() {
        let conn = open_memory_database().unwrap();
        register_user(&conn, &user_request("late@example.com")).unwrap();
        let (_, otp) = issue_otp(&conn, AccountKind::User, "late@example.com").unwrap();

        let later = Utc::now() + Duration::minutes(OTP_TTL_MINUTES + 1);
        let err = verify_otp_at(&conn, "late@example.com", &otp, None, later).unwrap_err();
        assert!(matches!(err, AuthError::InvalidOtp));
    }

    #[test]
    fn verify_otp_falls_back_to_hospitals() {
        let conn = open_memory_database().unwrap();
        register_hospital(&conn, &hospital_request("otp@h.in"), None).unwrap();
        let (_, otp) = issue_otp(&conn, AccountKind::Hospital, "otp@h.in").unwrap();
        assert_eq!(
            verify_otp(&conn, "otp@h.in", &otp, None).unwrap(),
            AccountKind::Hospital
        );
    }

    #[test]
    fn caller_acts_for_own_account_or_as_admin() {
        let conn = open_memory_database().unwrap();
        let user = register_user(&conn, &user_request("owner@example.com")).unwrap();
        let caller = Caller::resolve(
            &conn,
            &ClaimUser {
                id: user.id.clone(),
                kind: AccountKind::User,
            },
        )
        .unwrap();
        assert!(!caller.is_admin);
        assert!(caller.acts_for(AccountKind::User, &user.id));
        assert!(!caller.acts_for(AccountKind::Hospital, &user.id));
        assert!(!caller.acts_for(AccountKind::User, "someone-else"));

        let admin = Caller {
            is_admin: true,
            ..caller
        };
        assert!(admin.acts_for(AccountKind::Hospital, "any-hospital"));
    }

    #[test]
    fn otp_for_unknown_account_is_not_found() {
        let conn = open_memory_database().unwrap();
        let err = issue_otp(&conn, AccountKind::Hospital, "none@h.in").unwrap_err();
        assert_eq!(err.to_string(), "Hospital not found");
    }
}
