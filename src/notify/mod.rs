//! Completion alert.
//!
//! A single message with a fixed subject and body, addressed to the
//! configured recipient, optionally carrying the detection log as a base64
//! `application/octet-stream` attachment. Delivery goes through the `Mailer`
//! seam so the SMTP transport can be swapped out.

use lettre::message::header::{ContentTransferEncoding, ContentType};
use lettre::message::{Attachment, Body, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::{PipelineConfig, SmtpSettings};

pub const ALERT_SUBJECT: &str = "VisionGuard - ALERT";
pub const ALERT_BODY: &str =
    "Sharp object alert: detections were recorded for the analysed video.";
const ATTACHMENT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("invalid mail address '{address}': {reason}")]
    Address { address: String, reason: String },

    #[error("failed to read attachment {}: {source}", path.display())]
    Attachment {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to build alert message: {0}")]
    Message(String),

    #[error("mail transport failed: {0}")]
    Transport(String),
}

/// Something that can deliver a fully built message.
pub trait Mailer {
    fn send(&self, message: &Message) -> Result<(), NotificationError>;
}

/// SMTP submission over implicit TLS.
///
/// The transport is built per delivery, so a relay that cannot be set up only
/// fails the alert, never the run that produced it.
pub struct SmtpMailer {
    settings: SmtpSettings,
}

impl SmtpMailer {
    pub fn new(settings: &SmtpSettings) -> Self {
        Self {
            settings: settings.clone(),
        }
    }

    fn transport(&self) -> Result<SmtpTransport, NotificationError> {
        // lettre keeps its own plain copy of the password for the lifetime of
        // the transport.
        let credentials = Credentials::new(
            self.settings.user.clone(),
            self.settings.password.expose().to_string(),
        );
        let transport = SmtpTransport::relay(&self.settings.host)
            .map_err(|e| {
                NotificationError::Transport(format!(
                    "cannot use relay '{}': {}",
                    self.settings.host, e
                ))
            })?
            .port(self.settings.port)
            .credentials(credentials)
            .build();
        Ok(transport)
    }
}

impl Mailer for SmtpMailer {
    fn send(&self, message: &Message) -> Result<(), NotificationError> {
        self.transport()?
            .send(message)
            .map(|_| ())
            .map_err(|e| NotificationError::Transport(e.to_string()))
    }
}

/// Builds and sends the completion alert.
pub struct AlertNotifier<M: Mailer> {
    mailer: M,
    from: Mailbox,
    to: Mailbox,
}

impl<M: Mailer> AlertNotifier<M> {
    pub fn new(mailer: M, from: &str, to: &str) -> Result<Self, NotificationError> {
        Ok(Self {
            mailer,
            from: parse_mailbox(from)?,
            to: parse_mailbox(to)?,
        })
    }

    /// Sender and recipient taken from the run configuration.
    pub fn from_config(mailer: M, config: &PipelineConfig) -> Result<Self, NotificationError> {
        Self::new(mailer, &config.smtp.from, &config.recipient)
    }

    pub fn recipient(&self) -> &Mailbox {
        &self.to
    }

    pub fn mailer(&self) -> &M {
        &self.mailer
    }

    /// Assemble the alert, reading `attachment` fully if given.
    pub fn build_message(&self, attachment: Option<&Path>) -> Result<Message, NotificationError> {
        let mut parts = MultiPart::mixed().singlepart(SinglePart::plain(ALERT_BODY.to_string()));
        if let Some(path) = attachment {
            parts = parts.singlepart(attachment_part(path)?);
        }
        Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(ALERT_SUBJECT)
            .multipart(parts)
            .map_err(|e| NotificationError::Message(e.to_string()))
    }

    /// Build and deliver the alert.
    pub fn notify(&self, attachment: Option<&Path>) -> Result<(), NotificationError> {
        let message = self.build_message(attachment)?;
        self.mailer.send(&message)?;
        log::info!("alert sent to {}", self.to);
        Ok(())
    }
}

fn attachment_part(path: &Path) -> Result<SinglePart, NotificationError> {
    let bytes = std::fs::read(path).map_err(|source| NotificationError::Attachment {
        path: path.to_path_buf(),
        source,
    })?;
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "attachment".to_string());
    let body = Body::new_with_encoding(bytes, ContentTransferEncoding::Base64).map_err(|_| {
        NotificationError::Message("attachment cannot be base64 encoded".to_string())
    })?;
    let content_type = ContentType::parse(ATTACHMENT_CONTENT_TYPE)
        .map_err(|e| NotificationError::Message(e.to_string()))?;
    Ok(Attachment::new(filename).body(body, content_type))
}

fn parse_mailbox(address: &str) -> Result<Mailbox, NotificationError> {
    address
        .parse::<Mailbox>()
        .map_err(|e| NotificationError::Address {
            address: address.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use tempfile::tempdir;

    #[derive(Default)]
    struct CapturingMailer {
        sent: RefCell<Vec<String>>,
    }

    impl Mailer for CapturingMailer {
        fn send(&self, message: &Message) -> Result<(), NotificationError> {
            self.sent
                .borrow_mut()
                .push(String::from_utf8_lossy(&message.formatted()).into_owned());
            Ok(())
        }
    }

    struct RefusingMailer;

    impl Mailer for RefusingMailer {
        fn send(&self, _message: &Message) -> Result<(), NotificationError> {
            Err(NotificationError::Transport("535 authentication failed".to_string()))
        }
    }

    #[test]
    fn message_carries_fixed_subject_and_recipient() {
        let notifier = AlertNotifier::new(
            CapturingMailer::default(),
            "guard@example.com",
            "security@example.com",
        )
        .unwrap();
        notifier.notify(None).unwrap();

        let sent = notifier.mailer().sent.borrow();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("Subject: VisionGuard - ALERT"));
        assert!(sent[0].contains("To: security@example.com"));
        assert!(sent[0].contains("From: guard@example.com"));
        assert!(sent[0].contains(ALERT_BODY));
    }

    #[test]
    fn attachment_is_base64_octet_stream_with_file_name() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.txt");
        std::fs::write(&path, "TOTAL FRAMES: 3\nFPS: 30\n").unwrap();

        let notifier = AlertNotifier::new(
            CapturingMailer::default(),
            "guard@example.com",
            "security@example.com",
        )
        .unwrap();
        notifier.notify(Some(&path)).unwrap();

        let sent = notifier.mailer().sent.borrow();
        assert!(sent[0].contains("Content-Type: application/octet-stream"));
        assert!(sent[0].contains("Content-Transfer-Encoding: base64"));
        assert!(sent[0].contains("filename=\"log.txt\""));
    }

    #[test]
    fn missing_attachment_is_reported() {
        let dir = tempdir().unwrap();
        let notifier = AlertNotifier::new(
            CapturingMailer::default(),
            "guard@example.com",
            "security@example.com",
        )
        .unwrap();
        let err = notifier
            .notify(Some(&dir.path().join("absent.txt")))
            .err()
            .unwrap();
        assert!(matches!(err, NotificationError::Attachment { .. }));
        assert!(notifier.mailer().sent.borrow().is_empty());
    }

    #[test]
    fn transport_failure_surfaces_as_error() {
        let notifier =
            AlertNotifier::new(RefusingMailer, "guard@example.com", "security@example.com")
                .unwrap();
        assert!(matches!(
            notifier.notify(None),
            Err(NotificationError::Transport(_))
        ));
    }

    #[test]
    fn unusable_relay_fails_at_send_time() {
        let settings = SmtpSettings {
            host: "not a host name".to_string(),
            port: 465,
            user: "guard@example.com".to_string(),
            password: crate::config::Secret::new("hunter2"),
            from: "guard@example.com".to_string(),
        };
        let notifier = AlertNotifier::new(
            SmtpMailer::new(&settings),
            "guard@example.com",
            "security@example.com",
        )
        .unwrap();
        assert!(matches!(
            notifier.notify(None),
            Err(NotificationError::Transport(_))
        ));
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert!(matches!(
            AlertNotifier::new(CapturingMailer::default(), "guard", "security@example.com"),
            Err(NotificationError::Address { .. })
        ));
    }
}
