//! CLI channel: stdin/stdout REPL for local testing.
//!
//! A blank line ends a message, so multi-line registrations can be pasted
//! as-is. `/as NAME` switches the simulated sender.

use std::io::Write;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures::stream;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::channels::{Channel, MessageStream, OutgoingResponse};
use crate::error::ChannelError;
use crate::intake::RawMessage;

const DEFAULT_SENDER: &str = "cli-user";

pub struct CliChannel {
    admins: Vec<String>,
    out: Mutex<Box<dyn Write + Send>>,
    started: AtomicBool,
}

impl CliChannel {
    pub fn new(admins: Vec<String>) -> Self {
        Self::with_output(admins, Box::new(std::io::stdout()))
    }

    /// Replies go to `out` instead of stdout.
    pub fn with_output(admins: Vec<String>, out: Box<dyn Write + Send>) -> Self {
        Self {
            admins,
            out: Mutex::new(out),
            started: AtomicBool::new(false),
        }
    }

    fn send_failed(&self, reason: impl ToString) -> ChannelError {
        ChannelError::SendFailed {
            name: self.name().to_string(),
            reason: reason.to_string(),
        }
    }
}

fn write_parts(out: &mut dyn Write, response: &OutgoingResponse) -> std::io::Result<()> {
    for part in &response.parts {
        writeln!(out, "\n[{}] {}\n", response.sender, part)?;
    }
    out.flush()
}

/// Accumulates pasted lines until a blank line.
#[derive(Debug, Default)]
struct Composer {
    sender: Option<String>,
    lines: Vec<String>,
}

impl Composer {
    fn sender(&self) -> &str {
        self.sender.as_deref().unwrap_or(DEFAULT_SENDER)
    }

    /// Feed one stdin line. Returns a finished message text, if any.
    fn feed(&mut self, line: &str) -> Option<String> {
        let trimmed = line.trim();
        if let Some(name) = trimmed.strip_prefix("/as ") {
            let name = name.trim();
            if !name.is_empty() {
                self.sender = Some(name.to_string());
                eprintln!("   now sending as {name}");
            }
            return None;
        }
        if trimmed.is_empty() {
            if self.lines.is_empty() {
                return None;
            }
            return Some(std::mem::take(&mut self.lines).join("\n"));
        }
        self.lines.push(trimmed.to_string());
        None
    }

    fn flush(&mut self) -> Option<String> {
        (!self.lines.is_empty()).then(|| std::mem::take(&mut self.lines).join("\n"))
    }
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        // One reader per process: a second one would split stdin lines.
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(ChannelError::StartupFailed {
                name: self.name().to_string(),
                reason: "stdin reader already running".to_string(),
            });
        }
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let admins = self.admins.clone();

        tokio::spawn(async move {
            let stdin = tokio::io::stdin();
            let reader = BufReader::new(stdin);
            let mut lines = reader.lines();
            let mut composer = Composer::default();

            eprint!("> ");

            loop {
                let (text, eof) = match lines.next_line().await {
                    Ok(Some(line)) => (composer.feed(&line), false),
                    Ok(None) => (composer.flush(), true),
                    Err(e) => {
                        tracing::error!("Error reading stdin: {}", e);
                        break;
                    }
                };
                if let Some(text) = text {
                    let mut msg = RawMessage::new(composer.sender(), text);
                    msg.is_admin = admins.iter().any(|a| a == &msg.sender);
                    if tx.send(msg).is_err() {
                        break;
                    }
                }
                if eof {
                    break;
                }
            }
        });

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn respond(&self, response: &OutgoingResponse) -> Result<(), ChannelError> {
        {
            let mut out = self
                .out
                .lock()
                .map_err(|_| self.send_failed("output lock poisoned"))?;
            write_parts(out.as_mut(), response).map_err(|e| self.send_failed(e))?;
        }
        eprint!("> ");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use uuid::Uuid;

    use super::*;

    /// Writer that refuses every byte.
    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// Writer whose bytes stay readable after the channel takes it.
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn reply(parts: &[&str]) -> OutgoingResponse {
        OutgoingResponse {
            sender: "alice".to_string(),
            in_reply_to: Uuid::new_v4(),
            parts: parts.iter().map(|p| p.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn respond_writes_every_part() {
        let captured = Captured::default();
        let channel = CliChannel::with_output(Vec::new(), Box::new(captured.clone()));
        channel.respond(&reply(&["satu", "dua"])).await.unwrap();

        let text = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(text.contains("[alice] satu"));
        assert!(text.contains("[alice] dua"));
    }

    #[tokio::test]
    async fn broken_output_is_a_send_failure() {
        let channel = CliChannel::with_output(Vec::new(), Box::new(ClosedPipe));
        let err = channel.respond(&reply(&["halo"])).await.unwrap_err();
        assert!(matches!(err, ChannelError::SendFailed { ref name, .. } if name == "cli"));
        assert!(err.to_string().contains("pipe closed"));
    }

    #[tokio::test]
    async fn second_start_is_refused() {
        let channel = CliChannel::with_output(Vec::new(), Box::new(Captured::default()));
        // Mark the reader as running without spawning a real stdin task.
        channel.started.store(true, Ordering::SeqCst);
        let err = channel.start().await.err().unwrap();
        assert!(matches!(err, ChannelError::StartupFailed { .. }));
    }

    #[test]
    fn blank_line_ends_message() {
        let mut c = Composer::default();
        assert_eq!(c.feed("Budi"), None);
        assert_eq!(c.feed("5049488500001111"), None);
        assert_eq!(c.feed(""), Some("Budi\n5049488500001111".to_string()));
        assert_eq!(c.feed(""), None);
    }

    #[test]
    fn switch_sender() {
        let mut c = Composer::default();
        assert_eq!(c.sender(), "cli-user");
        assert_eq!(c.feed("/as 62812000"), None);
        assert_eq!(c.sender(), "62812000");
        c.feed("cek");
        assert_eq!(c.flush().as_deref(), Some("cek"));
        assert_eq!(c.flush(), None);
    }
}
