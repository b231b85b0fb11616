use std::env;
use std::path::PathBuf;
use std::process::Command;

use tracing::info;

use crate::error::WatchError;

pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, message: &str) -> Result<(), WatchError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, message: &str) -> Result<(), WatchError> {
        info!(title, message, "notification");
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct DesktopNotifier {
    notify_send: Option<PathBuf>,
    osascript: Option<PathBuf>,
}

impl DesktopNotifier {
    pub fn new() -> Self {
        Self {
            notify_send: find_in_path("notify-send"),
            osascript: find_in_path("osascript"),
        }
    }
}

impl Default for DesktopNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for DesktopNotifier {
    fn notify(&self, title: &str, message: &str) -> Result<(), WatchError> {
        let status = if let Some(notify_send) = &self.notify_send {
            Command::new(notify_send).arg(title).arg(message).status()
        } else if let Some(osascript) = &self.osascript {
            let script = format!(
                "display notification {} with title {}",
                applescript_string(message),
                applescript_string(title)
            );
            Command::new(osascript).arg("-e").arg(script).status()
        } else {
            return Err(WatchError::Notification(
                "no notification tool found on PATH".to_string(),
            ));
        };

        let status = status.map_err(|err| WatchError::Notification(err.to_string()))?;
        if !status.success() {
            return Err(WatchError::Notification(format!(
                "notifier exited with {status}"
            )));
        }
        Ok(())
    }
}

fn applescript_string(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

fn find_in_path(binary: &str) -> Option<PathBuf> {
    let paths = env::var_os("PATH")?;
    env::split_paths(&paths)
        .map(|dir| dir.join(binary))
        .find(|candidate| candidate.is_file())
}
