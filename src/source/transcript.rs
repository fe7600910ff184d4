use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use super::{markers, MarkerSet, MessageSource, ObservedMessage};
use crate::direction::{INCOMING_MARKER, OUTGOING_MARKER};
use crate::error::SourceError;

/// One message parsed from a chat export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportEntry {
    pub sender: String,
    pub text: String,
}

/// Path of the export file for `chat` inside `directory`.
pub fn export_path(directory: &Path, chat: &str) -> PathBuf {
    directory.join(format!("WhatsApp Chat with {chat}.txt"))
}

/// Return the part after `<date>, <time> - ` when `line` starts a new entry.
fn strip_header(line: &str) -> Option<&str> {
    let line = line.trim_start_matches(['\u{200e}', '\u{feff}']);
    let (stamp, rest) = line.split_once(" - ")?;
    let starts_with_digit = stamp.chars().next().is_some_and(|c| c.is_ascii_digit());
    if starts_with_digit && stamp.contains(',') {
        Some(rest)
    } else {
        None
    }
}

/// Parse a WhatsApp-style text export into messages.
///
/// Header lines without a `sender: ` part are system notices and are skipped.
/// Lines without a header continue the previous message.
pub fn parse_export(content: &str) -> Vec<ExportEntry> {
    let mut entries: Vec<ExportEntry> = Vec::new();
    // Whether the last header belonged to a message (vs. a system notice)
    let mut in_message = false;

    for line in content.lines() {
        match strip_header(line) {
            Some(rest) => match rest.split_once(": ") {
                Some((sender, text)) => {
                    entries.push(ExportEntry {
                        sender: sender.trim().to_string(),
                        text: text.to_string(),
                    });
                    in_message = true;
                }
                None => in_message = false,
            },
            None => {
                if in_message {
                    if let Some(last) = entries.last_mut() {
                        last.text.push('\n');
                        last.text.push_str(line);
                    }
                }
            }
        }
    }

    entries
        .into_iter()
        .filter_map(|mut e| {
            e.text = e.text.trim().to_string();
            (!e.text.is_empty()).then_some(e)
        })
        .collect()
}

/// Reads the latest message from a chat export on disk, re-reading the file
/// every poll so an externally refreshed export is picked up.
pub struct TranscriptSource {
    directory: PathBuf,
    self_name: String,
    path: Option<PathBuf>,
    entries: Vec<ExportEntry>,
}

impl TranscriptSource {
    pub fn new(directory: impl Into<PathBuf>, self_name: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            self_name: self_name.into(),
            path: None,
            entries: Vec::new(),
        }
    }
}

#[async_trait]
impl MessageSource for TranscriptSource {
    fn name(&self) -> &str {
        "transcript"
    }

    async fn open(&mut self, chat: &str) -> Result<(), SourceError> {
        let path = export_path(&self.directory, chat);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(SourceError::ChatNotFound(chat.to_string()));
        }
        info!("Opened chat export: {}", path.display());
        self.path = Some(path);
        Ok(())
    }

    async fn latest_message(&mut self) -> Result<Option<ObservedMessage>, SourceError> {
        let path = self
            .path
            .as_ref()
            .ok_or_else(|| SourceError::Unavailable("no chat open".to_string()))?;

        let content = tokio::fs::read_to_string(path).await?;
        self.entries = parse_export(&content);
        debug!(count = self.entries.len(), "Parsed chat export");

        Ok(self.entries.last().map(|e| ObservedMessage {
            text: e.text.clone(),
            locator: self.entries.len() - 1,
        }))
    }

    async fn ancestor_markers(
        &mut self,
        message: &ObservedMessage,
        max_depth: usize,
    ) -> Result<Vec<MarkerSet>, SourceError> {
        let entry = self.entries.get(message.locator).ok_or_else(|| {
            SourceError::Unavailable(format!("message {} no longer visible", message.locator))
        })?;

        let side = if entry.sender == self.self_name {
            OUTGOING_MARKER
        } else {
            INCOMING_MARKER
        };

        let mut chain = vec![
            markers(["selectable-text"]),
            markers([side, "focusable-list-item"]),
        ];
        chain.truncate(max_depth);
        Ok(chain)
    }

    async fn close(&mut self) -> Result<(), SourceError> {
        if let Some(path) = self.path.take() {
            info!("Closed chat export: {}", path.display());
        }
        self.entries.clear();
        Ok(())
    }
}
