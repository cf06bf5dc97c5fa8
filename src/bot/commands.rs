use crate::execution::StatusReport;
use crate::models::Profile;
use std::str::FromStr;
use tokio::sync::{mpsc, oneshot};

/// Operator command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Pause,
    Resume,
    /// Close now and stop. Applied immediately.
    Kill,
    /// Stop after the current cycle without closing
    Shutdown,
    Status,
    Trades,
    SwitchProfile(Profile),
}

impl Command {
    /// Applied as soon as it arrives rather than at the next cycle start
    pub fn is_immediate(&self) -> bool {
        matches!(
            self,
            Command::Kill | Command::Shutdown | Command::Status | Command::Trades
        )
    }
}

impl FromStr for Command {
    type Err = String;

    /// Parses chat text such as `/pause` or `/profile ltf_15m`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_whitespace();
        let head = parts.next().ok_or_else(|| "empty command".to_string())?;
        // Telegram appends @botname in group chats
        let head = head.split('@').next().unwrap_or(head);

        match head {
            "/pause" | "/stop" => Ok(Command::Pause),
            "/resume" | "/start" => Ok(Command::Resume),
            "/kill" => Ok(Command::Kill),
            "/shutdown" => Ok(Command::Shutdown),
            "/status" => Ok(Command::Status),
            "/trades" => Ok(Command::Trades),
            "/ltf5m" => Ok(Command::SwitchProfile(Profile::Ltf5m)),
            "/ltf15m" => Ok(Command::SwitchProfile(Profile::Ltf15m)),
            "/profile" => {
                let arg = parts
                    .next()
                    .ok_or_else(|| "usage: /profile <ltf_5m|ltf_15m>".to_string())?;
                Ok(Command::SwitchProfile(arg.parse()?))
            }
            other => Err(format!("unknown command: {}", other)),
        }
    }
}

/// Command plus an optional channel for the status after it is applied
#[derive(Debug)]
pub struct Envelope {
    pub command: Command,
    pub reply: Option<oneshot::Sender<StatusReport>>,
}

/// Cloneable sender side of the bot's command channel
#[derive(Debug, Clone)]
pub struct BotHandle {
    tx: mpsc::Sender<Envelope>,
}

impl BotHandle {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Envelope>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Fire and forget. Returns false once the bot has stopped.
    pub async fn send(&self, command: Command) -> bool {
        self.tx
            .send(Envelope {
                command,
                reply: None,
            })
            .await
            .is_ok()
    }

    /// Send and wait until the command has been applied
    pub async fn request(&self, command: Command) -> Option<StatusReport> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Envelope {
                command,
                reply: Some(reply),
            })
            .await
            .ok()?;
        rx.await.ok()
    }

    pub async fn status(&self) -> Option<StatusReport> {
        self.request(Command::Status).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!("/pause".parse::<Command>().unwrap(), Command::Pause);
        assert_eq!("/kill@swing_bot".parse::<Command>().unwrap(), Command::Kill);
        assert_eq!(
            "/profile ltf_15m".parse::<Command>().unwrap(),
            Command::SwitchProfile(Profile::Ltf15m)
        );
        assert_eq!(
            "/ltf5m".parse::<Command>().unwrap(),
            Command::SwitchProfile(Profile::Ltf5m)
        );
    }

    #[test]
    fn test_parse_rejects_unknown() {
        assert!("hello".parse::<Command>().is_err());
        assert!("/profile".parse::<Command>().is_err());
        assert!("/profile ltf_1h".parse::<Command>().is_err());
        assert!("".parse::<Command>().is_err());
    }

    #[test]
    fn test_immediate_commands() {
        assert!(Command::Kill.is_immediate());
        assert!(Command::Status.is_immediate());
        assert!(!Command::Pause.is_immediate());
        assert!(!Command::SwitchProfile(Profile::Ltf5m).is_immediate());
    }
}
