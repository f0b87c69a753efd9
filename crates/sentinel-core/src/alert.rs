//! Mail alerts through a local `sendmail`-compatible program.

use crate::classifier::Verdict;
use crate::settings::AlertSettings;
use crate::{Result, SentinelError};
use std::io::Write;
use std::process::{Command, Stdio};

pub trait Notifier {
    fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<()>;
}

/// Pipes an RFC 822 message into `<program> -t`.
#[derive(Debug, Clone)]
pub struct SendmailNotifier {
    program: String,
    sender: String,
}

impl SendmailNotifier {
    pub fn new(settings: &AlertSettings) -> Self {
        Self {
            program: settings.sendmail_program.clone(),
            sender: settings.sender.clone(),
        }
    }

    fn compose(&self, recipient: &str, subject: &str, body: &str) -> String {
        format!(
            "To: {recipient}\nFrom: {}\nSubject: {subject}\n\n{body}\n",
            self.sender
        )
    }
}

impl Notifier for SendmailNotifier {
    fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<()> {
        let message = self.compose(recipient, subject, body);
        let mut child = Command::new(&self.program)
            .arg("-t")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| SentinelError::Alert(format!("spawn {}: {e}", self.program)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(message.as_bytes())
                .map_err(|e| SentinelError::Alert(format!("write message: {e}")))?;
        }

        let status = child
            .wait()
            .map_err(|e| SentinelError::Alert(format!("wait for {}: {e}", self.program)))?;
        if !status.success() {
            return Err(SentinelError::Alert(format!(
                "{} exited with {status}",
                self.program
            )));
        }
        Ok(())
    }
}

/// Subject line for a file taken out of monitoring because it cannot be read
pub const UNREADABLE_SUBJECT: &str = "File unreadable";

/// Subject line for an alert about `verdict`. `None` for a clean check.
pub fn subject_for(verdict: &Verdict) -> Option<&'static str> {
    match verdict {
        Verdict::Deletion => Some("File missing"),
        Verdict::Checksum { .. } => Some("File integrity failed: content"),
        Verdict::Metadata { .. } => Some("File integrity failed: metadata"),
        Verdict::ModTimeOnly { .. } => Some("File modification time changed"),
        Verdict::Clean => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::SentinelSettings;

    #[test]
    fn message_has_headers_and_body() {
        let notifier = SendmailNotifier::new(&SentinelSettings::default().alert);
        let msg = notifier.compose("root@host", "File missing", "/etc/passwd");
        assert!(msg.starts_with("To: root@host\nFrom: nobody@localhost\nSubject: File missing\n\n"));
        assert!(msg.contains("/etc/passwd"));
    }

    #[test]
    fn clean_has_no_subject() {
        assert!(subject_for(&Verdict::Clean).is_none());
        assert_eq!(subject_for(&Verdict::Deletion), Some("File missing"));
    }

    #[test]
    fn missing_program_is_alert_error() {
        let mut settings = SentinelSettings::default().alert;
        settings.sendmail_program = "/nonexistent/sendmail-for-tests".into();
        let err = SendmailNotifier::new(&settings)
            .send("a@b", "s", "b")
            .unwrap_err();
        assert!(matches!(err, SentinelError::Alert(_)));
    }
}
