//! Per-row email dispatch of generated documents.

use crate::batch::RowOutcome;
use crate::error::DocMergeError;
use crate::filename::OutputFormat;
use crate::row::Row;
use std::time::Duration;

pub const DEFAULT_SUBJECT: &str = "Your Personalized Document";
pub const DEFAULT_BODY: &str = "Please find your personalized document attached.";
pub const NO_ADDRESS: &str = "No email address";

#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub attachment_name: String,
    pub attachment: Vec<u8>,
}

/// Delivery backend. Implementations own the network side.
pub trait MailTransport {
    fn send(&mut self, mail: &OutgoingMail) -> Result<(), DocMergeError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchStatus {
    Pending,
    Sending,
    Sent,
    Error(String),
}

impl DispatchStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DispatchStatus::Sent | DispatchStatus::Error(_))
    }
}

#[derive(Debug, Clone)]
pub struct DispatchOptions {
    pub subject: String,
    pub body: String,
    pub format: OutputFormat,
    /// Pause after each successful send except the last row.
    pub throttle: Duration,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            subject: DEFAULT_SUBJECT.to_string(),
            body: DEFAULT_BODY.to_string(),
            format: OutputFormat::Pdf,
            throttle: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchReport {
    pub statuses: Vec<DispatchStatus>,
}

impl DispatchReport {
    pub fn sent(&self) -> usize {
        self.statuses
            .iter()
            .filter(|status| **status == DispatchStatus::Sent)
            .count()
    }

    pub fn errors(&self) -> usize {
        self.statuses
            .iter()
            .filter(|status| matches!(status, DispatchStatus::Error(_)))
            .count()
    }
}

/// Send each row's document to the address in `email_column`.
///
/// Rows are processed in order. `on_status(index, status)` fires on every
/// status change. A missing address or a failed document marks that row as an
/// error and the walk continues.
pub fn dispatch<T, F>(
    rows: &[Row],
    email_column: &str,
    documents: &[RowOutcome],
    transport: &mut T,
    options: &DispatchOptions,
    mut on_status: F,
) -> DispatchReport
where
    T: MailTransport + ?Sized,
    F: FnMut(usize, &DispatchStatus),
{
    let mut statuses = vec![DispatchStatus::Pending; rows.len()];
    let last = rows.len().saturating_sub(1);

    for (index, row) in rows.iter().enumerate() {
        let mut set = |status: DispatchStatus, statuses: &mut Vec<DispatchStatus>| {
            on_status(index, &status);
            statuses[index] = status;
        };

        let address = row
            .display(email_column)
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty());
        let Some(to) = address else {
            set(DispatchStatus::Error(NO_ADDRESS.to_string()), &mut statuses);
            continue;
        };

        let attachment = match documents.iter().find(|outcome| outcome.index() == index) {
            Some(RowOutcome::Generated { bytes, .. }) => bytes.clone(),
            Some(RowOutcome::Failed { error, .. }) => {
                set(DispatchStatus::Error(format!("document failed: {}", error)), &mut statuses);
                continue;
            }
            None => {
                set(DispatchStatus::Error("document not generated".to_string()), &mut statuses);
                continue;
            }
        };

        set(DispatchStatus::Sending, &mut statuses);
        let mail = OutgoingMail {
            to,
            subject: options.subject.clone(),
            body: options.body.clone(),
            attachment_name: format!("document-{}.{}", index + 1, options.format.extension()),
            attachment,
        };
        match transport.send(&mail) {
            Ok(()) => {
                set(DispatchStatus::Sent, &mut statuses);
                if index < last && !options.throttle.is_zero() {
                    std::thread::sleep(options.throttle);
                }
            }
            Err(err) => {
                log::warn!("mail to {} for row {} failed: {}", mail.to, index + 1, err);
                set(DispatchStatus::Error(err.to_string()), &mut statuses);
            }
        }
    }
    DispatchReport { statuses }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        sent: Vec<OutgoingMail>,
        reject: Option<String>,
    }

    impl MailTransport for Recorder {
        fn send(&mut self, mail: &OutgoingMail) -> Result<(), DocMergeError> {
            if self.reject.as_deref() == Some(mail.to.as_str()) {
                return Err(DocMergeError::Transport("mailbox unavailable".to_string()));
            }
            self.sent.push(mail.clone());
            Ok(())
        }
    }

    fn generated(index: usize) -> RowOutcome {
        RowOutcome::Generated {
            index,
            filename: format!("doc{}.pdf", index),
            bytes: vec![index as u8],
        }
    }

    fn quick() -> DispatchOptions {
        DispatchOptions {
            throttle: Duration::ZERO,
            ..DispatchOptions::default()
        }
    }

    #[test]
    fn sends_each_row_with_defaults() {
        let rows = vec![
            Row::new().with("Email", "ada@example.com"),
            Row::new().with("Email", " bob@example.com "),
        ];
        let docs = vec![generated(0), generated(1)];
        let mut transport = Recorder::default();
        let report = dispatch(&rows, "Email", &docs, &mut transport, &quick(), |_, _| {});
        assert_eq!(report.sent(), 2);
        assert_eq!(transport.sent[1].to, "bob@example.com");
        assert_eq!(transport.sent[1].attachment_name, "document-2.pdf");
        assert_eq!(transport.sent[0].subject, DEFAULT_SUBJECT);
        assert_eq!(transport.sent[0].attachment, vec![0]);
    }

    #[test]
    fn missing_address_is_an_error_and_walk_continues() {
        let rows = vec![
            Row::new().with("Email", "  "),
            Row::new(),
            Row::new().with("Email", "c@example.com"),
        ];
        let docs = vec![generated(0), generated(1), generated(2)];
        let mut transport = Recorder::default();
        let report = dispatch(&rows, "Email", &docs, &mut transport, &quick(), |_, _| {});
        assert_eq!(report.statuses[0], DispatchStatus::Error(NO_ADDRESS.to_string()));
        assert_eq!(report.statuses[1], DispatchStatus::Error(NO_ADDRESS.to_string()));
        assert_eq!(report.statuses[2], DispatchStatus::Sent);
        assert_eq!(transport.sent.len(), 1);
    }

    #[test]
    fn failed_documents_and_transport_errors_are_reported() {
        let rows = vec![
            Row::new().with("Email", "a@example.com"),
            Row::new().with("Email", "b@example.com"),
        ];
        let docs = vec![
            RowOutcome::Failed {
                index: 0,
                filename: "a.pdf".to_string(),
                error: "boom".to_string(),
            },
            generated(1),
        ];
        let mut transport = Recorder {
            reject: Some("b@example.com".to_string()),
            ..Recorder::default()
        };
        let report = dispatch(&rows, "Email", &docs, &mut transport, &quick(), |_, _| {});
        assert_eq!(report.statuses[0], DispatchStatus::Error("document failed: boom".to_string()));
        assert!(matches!(&report.statuses[1], DispatchStatus::Error(msg) if msg.contains("mailbox")));
        assert_eq!(report.errors(), 2);
    }

    #[test]
    fn status_callback_sees_sending_before_sent() {
        let rows = vec![Row::new().with("Email", "a@example.com")];
        let docs = vec![generated(0)];
        let mut seen = Vec::new();
        let mut transport = Recorder::default();
        dispatch(&rows, "Email", &docs, &mut transport, &quick(), |index, status| {
            seen.push((index, status.clone()));
        });
        assert_eq!(seen, vec![(0, DispatchStatus::Sending), (0, DispatchStatus::Sent)]);
    }
}
