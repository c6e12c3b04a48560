//! Fire-and-forget notification mail.
//!
//! Actual delivery is an external collaborator behind the [`Mailer`]
//! trait. Dispatch happens on a detached thread so the triggering
//! request never blocks on a mail relay; no result is observed, no
//! retry, no cancellation.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum MailError {
    #[error("send failed: {0}")]
    Send(String),
}

/// Outbound mail transport.
pub trait Mailer: Send + Sync {
    fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), MailError>;
}

/// Mailer that only logs. The default when no relay is configured.
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, to: &str, subject: &str, _body: &str) -> Result<(), MailError> {
        info!(to, subject, "mail delivery disabled; message logged only");
        Ok(())
    }
}

/// Send a message on a detached thread. Failures are logged and
/// dropped.
pub fn send_detached(mailer: Arc<dyn Mailer>, to: String, subject: String, body: String) {
    std::thread::spawn(move || {
        if let Err(e) = mailer.send(&to, &subject, &body) {
            warn!(to, subject, error = %e, "mail send failed");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;

    struct ChannelMailer {
        tx: std::sync::Mutex<mpsc::Sender<String>>,
        fail: AtomicUsize,
    }

    impl Mailer for ChannelMailer {
        fn send(&self, to: &str, _subject: &str, _body: &str) -> Result<(), MailError> {
            if self.fail.load(Ordering::SeqCst) > 0 {
                self.fail.fetch_sub(1, Ordering::SeqCst);
                return Err(MailError::Send("relay unreachable".into()));
            }
            self.tx.lock().unwrap().send(to.to_string()).unwrap();
            Ok(())
        }
    }

    #[test]
    fn test_detached_send_delivers() {
        let (tx, rx) = mpsc::channel();
        let mailer = Arc::new(ChannelMailer {
            tx: std::sync::Mutex::new(tx),
            fail: AtomicUsize::new(0),
        });

        send_detached(mailer, "a@example.com".into(), "s".into(), "b".into());
        let to = rx.recv_timeout(std::time::Duration::from_secs(2)).unwrap();
        assert_eq!(to, "a@example.com");
    }

    #[test]
    fn test_detached_send_swallows_failure() {
        let (tx, rx) = mpsc::channel();
        let mailer = Arc::new(ChannelMailer {
            tx: std::sync::Mutex::new(tx),
            fail: AtomicUsize::new(1),
        });

        // Errors stay on the worker thread; nothing is delivered, and
        // nothing panics here.
        send_detached(mailer, "a@example.com".into(), "s".into(), "b".into());
        assert!(rx
            .recv_timeout(std::time::Duration::from_millis(200))
            .is_err());
    }
}
