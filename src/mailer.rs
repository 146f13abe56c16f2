//! Outbound email: SMTP delivery via `lettre`, or a logging stand-in
//! when no SMTP credentials are configured.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::{SmtpConfig, APP_NAME};

#[derive(Debug, Clone, PartialEq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Invalid mailbox {0}")]
    Address(String),
    #[error("Cannot build message: {0}")]
    Build(String),
    #[error("SMTP delivery failed: {0}")]
    Transport(String),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: Email) -> Result<(), MailError>;
}

/// Send and swallow the failure. Returns whether the mail went out.
pub async fn deliver_best_effort(mailer: &dyn Mailer, email: Email) -> bool {
    let to = email.to.clone();
    match mailer.send(email).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, %to, "Email delivery failed");
            false
        }
    }
}

// ─── SMTP ─────────────────────────────────────────────────────────────────────

pub struct SmtpMailer {
    from: Mailbox,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self, MailError> {
        let from: Mailbox = format!("{APP_NAME} <{}>", config.username)
            .parse()
            .map_err(|_| MailError::Address(config.username.clone()))?;
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
            .map_err(|e| MailError::Transport(e.to_string()))?
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .build();
        Ok(Self { from, transport })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: Email) -> Result<(), MailError> {
        let to: Mailbox = email
            .to
            .parse()
            .map_err(|_| MailError::Address(email.to.clone()))?;
        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(email.subject)
            .header(ContentType::TEXT_HTML)
            .body(email.html)
            .map_err(|e| MailError::Build(e.to_string()))?;
        self.transport
            .send(message)
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;
        Ok(())
    }
}

// ─── Logging stand-in ─────────────────────────────────────────────────────────

/// Used when SMTP is not configured. Bodies are not logged (they may hold OTPs).
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: Email) -> Result<(), MailError> {
        tracing::info!(to = %email.to, subject = %email.subject, "SMTP not configured; email not sent");
        Ok(())
    }
}

// ─── Templates ────────────────────────────────────────────────────────────────

pub struct ConfirmationDetails<'a> {
    pub patient_name: &'a str,
    pub hospital_name: &'a str,
    pub doctor_name: &'a str,
    pub department: Option<&'a str>,
    pub date: &'a str,
    pub time_slot: &'a str,
}

pub fn appointment_confirmation(to: &str, details: &ConfirmationDetails<'_>) -> Email {
    let department = details
        .department
        .map(|d| format!("<li><strong>Department:</strong> {}</li>", escape(d)))
        .unwrap_or_default();
    Email {
        to: to.to_string(),
        subject: "Appointment Confirmation".into(),
        html: format!(
            "<h2>Appointment Confirmed</h2>\
             <p>Dear {},</p>\
             <p>Your appointment has been booked.</p>\
             <ul>\
             <li><strong>Hospital:</strong> {}</li>\
             <li><strong>Doctor:</strong> {}</li>{}\
             <li><strong>Date:</strong> {}</li>\
             <li><strong>Time:</strong> {}</li>\
             </ul>\
             <p>Please arrive 15 minutes early.</p>",
            escape(details.patient_name),
            escape(details.hospital_name),
            escape(details.doctor_name),
            department,
            escape(details.date),
            escape(details.time_slot),
        ),
    }
}

pub fn password_reset_otp(to: &str, otp: &str, valid_minutes: i64) -> Email {
    Email {
        to: to.to_string(),
        subject: "Password Reset OTP".into(),
        html: format!(
            "<p>Your OTP for resetting the password is <strong>{otp}</strong>.</p>\
             <p>It is valid for {valid_minutes} minutes.</p>"
        ),
    }
}

pub fn newsletter_welcome(to: &str) -> Email {
    Email {
        to: to.to_string(),
        subject: format!("Welcome to {APP_NAME}"),
        html: format!("<p>Thanks for subscribing to {APP_NAME} updates.</p>"),
    }
}

fn escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

// ─── Test double ──────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Records every email; fails on demand.
    #[derive(Default)]
    pub(crate) struct RecordingMailer {
        pub sent: Mutex<Vec<Email>>,
        pub fail: bool,
    }

    impl RecordingMailer {
        pub(crate) fn failing() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        pub(crate) fn sent(&self) -> Vec<Email> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, email: Email) -> Result<(), MailError> {
            if self.fail {
                return Err(MailError::Transport("connection refused".into()));
            }
            self.sent.lock().unwrap().push(email);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingMailer;
    use super::*;

    #[test]
    fn confirmation_escapes_user_text() {
        let email = appointment_confirmation(
            "p@example.com",
            &ConfirmationDetails {
                patient_name: "<script>",
                hospital_name: "A & B",
                doctor_name: "Dr. Rao",
                department: Some("ENT"),
                date: "2025-06-02",
                time_slot: "10:00 AM - 12:00 PM",
            },
        );
        assert!(email.html.contains("&lt;script&gt;"));
        assert!(email.html.contains("A &amp; B"));
        assert!(email.html.contains("ENT"));
        assert_eq!(email.subject, "Appointment Confirmation");
    }

    #[test]
    fn otp_email_mentions_code_and_validity() {
        let email = password_reset_otp("u@example.com", "123456", 10);
        assert!(email.html.contains("123456"));
        assert!(email.html.contains("10 minutes"));
    }

    #[tokio::test]
    async fn best_effort_reports_failure_without_error() {
        let mailer = RecordingMailer::failing();
        assert!(!deliver_best_effort(&mailer, newsletter_welcome("x@example.com")).await);

        let mailer = RecordingMailer::default();
        assert!(deliver_best_effort(&mailer, newsletter_welcome("x@example.com")).await);
        assert_eq!(mailer.sent().len(), 1);
    }

    #[tokio::test]
    async fn log_mailer_always_succeeds() {
        assert!(LogMailer.send(newsletter_welcome("x@example.com")).await.is_ok());
    }

    #[test]
    fn smtp_mailer_rejects_bad_sender() {
        let result = SmtpMailer::new(&SmtpConfig {
            host: "smtp.example.com".into(),
            username: "not an address".into(),
            password: "pw".into(),
        });
        assert!(matches!(result, Err(MailError::Address(_))));
    }
}
