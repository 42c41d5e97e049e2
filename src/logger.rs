use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;

use chrono::Utc;
use serde_json::{Value, json};
use tracing::warn;

use crate::protocol::{Command, Frame, encode_keepalive};
use crate::types::Function;

pub enum MessageLogMode {
    /// Every line in both directions.
    Full,
    /// Skips ACKs, keepalive traffic and CHN updates that repeat the last value.
    Changes,
}

pub(crate) struct MessageLogger {
    mode: MessageLogMode,
    file: File,
    last_values: HashMap<Function, String>,
}

impl MessageLogger {
    pub fn new(mode: MessageLogMode, path: &str) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self {
            mode,
            file,
            last_values: HashMap::new(),
        })
    }

    pub fn log_sent(&mut self, line: &str) {
        if matches!(self.mode, MessageLogMode::Changes) && line == encode_keepalive() {
            return;
        }
        let entry = json!({
            "ts": Utc::now().to_rfc3339(),
            "dir": "tx",
            "line": line,
        });
        self.write_line(&entry);
    }

    /// `frame` is `None` when the line failed to decode.
    pub fn log_received(&mut self, line: &str, frame: Option<&Frame>) {
        if let MessageLogMode::Changes = self.mode {
            match frame {
                Some(Frame::Ack) => return,
                Some(Frame::Message(m)) if m.command == Command::Chn => {
                    if self.last_values.get(&m.function) == Some(&m.value) {
                        return;
                    }
                    self.last_values.insert(m.function, m.value.clone());
                }
                _ => {}
            }
        }
        let entry = json!({
            "ts": Utc::now().to_rfc3339(),
            "dir": "rx",
            "line": line,
            "valid": frame.is_some(),
        });
        self.write_line(&entry);
    }

    pub fn log_link(&mut self, online: bool) {
        if !online {
            self.last_values.clear();
        }
        let entry = json!({
            "ts": Utc::now().to_rfc3339(),
            "dir": "link",
            "online": online,
        });
        self.write_line(&entry);
    }

    fn write_line(&mut self, entry: &Value) {
        if let Ok(line) = serde_json::to_string(entry)
            && let Err(e) = writeln!(self.file, "{line}")
        {
            warn!("failed to write log entry: {e}");
        }
    }
}
