use std::fmt;

use crate::config::SmtpSettings;
use crate::domain::monitoring::SyncError;

/// A fully rendered, ready-to-send notification message.
#[derive(Debug, Clone)]
pub struct RenderedNotification {
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

/// Delivers one-shot notification messages. Invoked by the timed event
/// processor when an `Other` event fires; failures are logged by the
/// caller and never retried.
pub trait MailDispatch: fmt::Debug + Send + Sync {
    fn send(&self, mail: &RenderedNotification) -> Result<(), SyncError>;
}

/// Default dispatcher: applies the same SMTP configuration sanity checks a
/// real sender would, then logs the message instead of delivering it.
#[derive(Debug, Clone, Default)]
pub struct LogMailer {
    smtp: SmtpSettings,
}

impl LogMailer {
    pub fn new(smtp: SmtpSettings) -> Self {
        Self { smtp }
    }
}

impl MailDispatch for LogMailer {
    fn send(&self, mail: &RenderedNotification) -> Result<(), SyncError> {
        if self.smtp.enabled && (self.smtp.user.is_empty() || self.smtp.password.is_empty() || self.smtp.from_address.is_empty()) {
            log::error!(
                "SMTP is enabled, but SMTP user, password or from-address is not set! Notification '{}' will not be sent!",
                mail.subject
            );
            return Err(SyncError::new("incomplete SMTP configuration"));
        }

        if !self.smtp.enabled {
            log::warn!("SMTP is not enabled, notification '{}' will not be sent!", mail.subject);
        }

        log::info!("Notification: {}, Receiver: {}", mail.subject, mail.recipient);
        log::debug!("Notification content: {}", mail.body);
        Ok(())
    }
}
