//! Outgoing e-mail for the confirm and recover flows.
use async_trait::async_trait;
use serde::Serialize;

use super::{config::MailConfig, render::escape};
use crate::error::AuthError;

/// Email
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Email {
    pub to: Vec<String>,
    pub from: String,
    pub subject: String,
    pub text_body: String,
    pub html_body: String,
}

/// Mailer
///
/// Delivers a composed e-mail. Implementations decide where it goes.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: Email) -> Result<(), AuthError>;
}

/// LogMailer
///
/// Writes e-mails to the log instead of sending them, which is all the demo needs to
/// follow the confirm and recover links.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: Email) -> Result<(), AuthError> {
        if email.to.is_empty() {
            return Err(AuthError::Mail(format!("no recipient for {:?}", email.subject)));
        }
        tracing::info!(
            to = ?email.to,
            from = %email.from,
            subject = %email.subject,
            "sending e-mail\n{}",
            email.text_body
        );
        Ok(())
    }
}

/// The e-mails the engine knows how to write.
#[derive(Debug, Clone, PartialEq)]
pub enum MailTemplate {
    Confirm { url: String },
    Recover { url: String },
}

/// MailRenderer
///
/// Composes text and HTML bodies and addresses them using the mail settings.
#[derive(Debug, Clone)]
pub struct MailRenderer {
    from: String,
    subject_prefix: String,
}

impl MailRenderer {
    pub fn new(config: &MailConfig) -> Self {
        Self {
            from: config.from.clone(),
            subject_prefix: config.subject_prefix.clone(),
        }
    }

    pub fn compose(&self, to: &str, template: &MailTemplate) -> Email {
        let (subject, intro, url) = match template {
            MailTemplate::Confirm { url } => (
                "Confirm New Account",
                "Please confirm your account by visiting:",
                url,
            ),
            MailTemplate::Recover { url } => (
                "Password Reset",
                "A password reset was requested for your account. To choose a new password visit:",
                url,
            ),
        };

        Email {
            to: vec![to.to_string()],
            from: self.from.clone(),
            subject: format!("{}{subject}", self.subject_prefix),
            text_body: format!("{intro}\n\n{url}\n"),
            html_body: format!(
                "<p>{}</p><p><a href=\"{u}\">{u}</a></p>",
                escape(intro),
                u = escape(url)
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compose_addresses_and_links() {
        let renderer = MailRenderer::new(&MailConfig {
            from: "hello-auth@localhost".into(),
            subject_prefix: "[hello] ".into(),
        });
        let email = renderer.compose(
            "morty@smith.com",
            &MailTemplate::Confirm {
                url: "http://localhost:4000/auth/confirm?cnf=abc".into(),
            },
        );

        assert_eq!(email.to, vec!["morty@smith.com"]);
        assert_eq!(email.from, "hello-auth@localhost");
        assert_eq!(email.subject, "[hello] Confirm New Account");
        assert!(email.text_body.contains("http://localhost:4000/auth/confirm?cnf=abc"));
        assert!(email.html_body.contains("href=\"http://localhost:4000/auth/confirm?cnf=abc\""));
    }

    #[tokio::test]
    async fn log_mailer_needs_a_recipient() {
        let err = LogMailer.send(Email::default()).await.unwrap_err();
        assert!(matches!(err, AuthError::Mail(_)));

        let email = Email {
            to: vec!["morty@smith.com".into()],
            ..Email::default()
        };
        assert!(LogMailer.send(email).await.is_ok());
    }
}
