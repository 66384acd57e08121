//! Enrollment prompt.
//!
//! When the monitor sees an unknown input-like device, it surfaces exactly
//! one prompt at a time. The prompt owns the credential gate: it only
//! returns [`PromptDecision::Approved`] after the operator supplies the
//! correct shared secret, so no privileged call is ever made on a wrong
//! credential. Wrong input is surfaced inline and retried without
//! restarting the flow; empty input dismisses.

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;
use tracing::debug;

use hidwarden_core::secret::SharedSecret;

/// Ephemeral record of one detected-but-unwhitelisted device. Exists only
/// for the duration of the prompt interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollmentEvent {
    pub instance_id: String,
    pub display_name: String,
}

/// The operator's decision for one enrollment event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptDecision {
    /// Correct credential supplied; proceed to the privilege boundary.
    Approved,
    /// Dismissed; the device stays blocked until replugged.
    Dismissed,
}

/// Interactive gate for enrolling one device.
#[async_trait]
pub trait EnrollmentPrompt: Send + Sync {
    /// Present one event and block until the operator decides.
    async fn request(&self, event: &EnrollmentEvent) -> PromptDecision;
}

/// One banner-and-password exchange over arbitrary streams. Loops on a
/// wrong credential, dismisses on an empty line or a closed input, and
/// approves only on a verified secret.
async fn dialogue<R, W>(
    secret: &SharedSecret,
    event: &EnrollmentEvent,
    lines: &mut Lines<R>,
    out: &mut W,
) -> PromptDecision
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    let banner = format!(
        "\nBlocked input device detected\n  device: {}\n  id:     {}\nEnter password to whitelist (empty to dismiss):\n",
        if event.display_name.is_empty() { "(unnamed)" } else { &event.display_name },
        event.instance_id,
    );
    if out.write_all(banner.as_bytes()).await.is_err() {
        return PromptDecision::Dismissed;
    }
    let _ = out.flush().await;

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            // Input closed or unreadable: treat as dismissal.
            _ => return PromptDecision::Dismissed,
        };
        let candidate = line.trim_end_matches(['\r', '\n']);
        if candidate.is_empty() {
            debug!(instance_id = %event.instance_id, "prompt dismissed");
            return PromptDecision::Dismissed;
        }
        if secret.verify(candidate) {
            return PromptDecision::Approved;
        }
        let _ = out.write_all(b"Wrong password. Try again (empty to dismiss):\n").await;
        let _ = out.flush().await;
    }
}

/// Console prompt reading the shared secret from stdin. Holds one stdin
/// reader for its whole lifetime so buffered type-ahead is not lost
/// between prompts.
pub struct ConsolePrompt {
    secret: SharedSecret,
    input: Mutex<Lines<BufReader<Stdin>>>,
}

impl ConsolePrompt {
    pub fn new(secret: SharedSecret) -> Self {
        Self {
            secret,
            input: Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
        }
    }
}

#[async_trait]
impl EnrollmentPrompt for ConsolePrompt {
    async fn request(&self, event: &EnrollmentEvent) -> PromptDecision {
        let mut lines = self.input.lock().await;
        let mut stdout = tokio::io::stdout();
        dialogue(&self.secret, event, &mut *lines, &mut stdout).await
    }
}
