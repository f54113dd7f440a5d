//! Conversation state and its file round-trip
//!
//! The [`Session`] is owned by the interactive thread. Workers never touch it;
//! they describe changes as `UiEvent`s which the dispatcher applies here.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DOCUMENT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    User,
    Assistant,
    AssistantEvaluation,
}

impl Speaker {
    pub fn label(self) -> &'static str {
        match self {
            Speaker::User => "You",
            Speaker::Assistant => "AI Assistant",
            Speaker::AssistantEvaluation => "AI Evaluation",
        }
    }
}

/// Which mode produced an entry, or that it reports an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryTag {
    Ask,
    Evaluate,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub speaker: Speaker,
    pub text: String,
    pub tag: EntryTag,
    pub timestamp: DateTime<Utc>,
    /// The stream feeding this entry failed part way
    #[serde(default)]
    pub interrupted: bool,
}

impl ConversationEntry {
    pub fn new(speaker: Speaker, text: impl Into<String>, tag: EntryTag) -> Self {
        Self {
            speaker,
            text: text.into(),
            tag,
            timestamp: Utc::now(),
            interrupted: false,
        }
    }

    /// Speaker, text and tag match; timestamps are ignored
    pub fn same_content(&self, other: &ConversationEntry) -> bool {
        self.speaker == other.speaker && self.text == other.text && self.tag == other.tag
    }
}

/// Ordered conversation log with at most one live (streaming) entry
#[derive(Debug, Default)]
pub struct Session {
    entries: Vec<ConversationEntry>,
    live: Option<usize>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[ConversationEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append a finished entry
    pub fn push(&mut self, entry: ConversationEntry) -> &ConversationEntry {
        self.entries.push(entry);
        &self.entries[self.entries.len() - 1]
    }

    pub fn push_error(&mut self, message: impl Into<String>) -> &ConversationEntry {
        self.push(ConversationEntry::new(Speaker::Assistant, message, EntryTag::Error))
    }

    /// Start an empty entry that [`append_live`](Self::append_live) extends.
    /// A previous live entry is closed first.
    pub fn open_entry(&mut self, speaker: Speaker, tag: EntryTag) -> &ConversationEntry {
        self.close_live();
        self.entries.push(ConversationEntry::new(speaker, String::new(), tag));
        let index = self.entries.len() - 1;
        self.live = Some(index);
        &self.entries[index]
    }

    pub fn live_entry(&self) -> Option<&ConversationEntry> {
        self.live.and_then(|i| self.entries.get(i))
    }

    /// Returns false when nothing is streaming
    pub fn append_live(&mut self, fragment: &str) -> bool {
        match self.live.and_then(|i| self.entries.get_mut(i)) {
            Some(entry) => {
                entry.text.push_str(fragment);
                true
            }
            None => false,
        }
    }

    /// Append failure text to the live entry and mark it interrupted.
    /// Without a live entry the failure becomes its own error entry.
    pub fn fail_live(&mut self, message: &str) {
        match self.live.and_then(|i| self.entries.get_mut(i)) {
            Some(entry) => {
                if !entry.text.is_empty() {
                    entry.text.push('\n');
                }
                entry.text.push_str(message);
                entry.interrupted = true;
            }
            None => {
                self.push_error(message);
            }
        }
    }

    /// Freeze the live entry. Returns it if there was one.
    pub fn close_live(&mut self) -> Option<&ConversationEntry> {
        let index = self.live.take()?;
        self.entries.get(index)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.live = None;
    }

    pub fn replace(&mut self, entries: Vec<ConversationEntry>) {
        self.entries = entries;
        self.live = None;
    }

    pub fn to_document(&self) -> ConversationDocument {
        ConversationDocument {
            version: DOCUMENT_VERSION,
            saved_at: Utc::now(),
            entries: self.entries.clone(),
        }
    }

    pub fn export<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&self.to_document())
            .context("Failed to serialize conversation")?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write conversation file: {}", path.display()))?;
        tracing::info!(path = %path.display(), entries = self.entries.len(), "Conversation exported");
        Ok(())
    }

    /// Replace the whole session with the file's entries
    pub fn import<P: AsRef<Path>>(&mut self, path: P) -> Result<usize> {
        let document = ConversationDocument::read(path.as_ref())?;
        let count = document.entries.len();
        self.replace(document.entries);
        tracing::info!(path = %path.as_ref().display(), entries = count, "Conversation imported");
        Ok(count)
    }
}

/// On-disk conversation format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationDocument {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub entries: Vec<ConversationEntry>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredConversation {
    Document(ConversationDocument),
    Bare(Vec<ConversationEntry>),
}

impl ConversationDocument {
    /// Read a document, also accepting a bare array of entries
    pub fn read(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read conversation file: {}", path.display()))?;
        let stored: StoredConversation = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse conversation file: {}", path.display()))?;

        Ok(match stored {
            StoredConversation::Document(document) => document,
            StoredConversation::Bare(entries) => {
                let saved_at = fs::metadata(path)
                    .and_then(|m| m.modified())
                    .map(DateTime::<Utc>::from)
                    .unwrap_or_else(|_| Utc::now());
                ConversationDocument {
                    version: 0,
                    saved_at,
                    entries,
                }
            }
        })
    }

    /// First user line, shortened, for listings
    pub fn title(&self) -> String {
        let first = self
            .entries
            .iter()
            .find(|e| e.speaker == Speaker::User)
            .map(|e| e.text.trim())
            .unwrap_or("Empty conversation");
        if first.chars().count() > 50 {
            let cut: String = first.chars().take(50).collect();
            format!("{}...", cut.trim_end())
        } else {
            first.to_string()
        }
    }
}

/// Summary of a saved conversation file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedConversation {
    pub path: PathBuf,
    pub saved_at: DateTime<Utc>,
    pub entry_count: usize,
    pub title: String,
}

/// Directory of saved conversations
#[derive(Debug, Clone)]
pub struct ConversationStore {
    dir: PathBuf,
}

impl ConversationStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Export under a timestamped file name and return the path
    pub fn save(&self, session: &Session) -> Result<PathBuf> {
        let name = format!("conversation-{}.json", Utc::now().format("%Y%m%d-%H%M%S%3f"));
        let path = self.dir.join(name);
        session.export(&path)?;
        Ok(path)
    }

    /// Saved conversations, newest first. Unreadable files are skipped.
    pub fn list(&self) -> Result<Vec<SavedConversation>> {
        let mut saved = Vec::new();
        if !self.dir.exists() {
            return Ok(saved);
        }

        for entry in fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to read directory: {}", self.dir.display()))?
        {
            let path = entry.context("Failed to read directory entry")?.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            match ConversationDocument::read(&path) {
                Ok(document) => saved.push(SavedConversation {
                    title: document.title(),
                    saved_at: document.saved_at,
                    entry_count: document.entries.len(),
                    path,
                }),
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %format!("{:#}", err), "Skipping unreadable conversation");
                }
            }
        }

        saved.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn sample_session() -> Session {
        let mut session = Session::new();
        session.push(ConversationEntry::new(Speaker::User, "What are your weaknesses?", EntryTag::Ask));
        session.open_entry(Speaker::Assistant, EntryTag::Ask);
        session.append_live("I focus ");
        session.append_live("on growth.");
        session.close_live();
        session.push(ConversationEntry::new(Speaker::User, "I work too hard.", EntryTag::Evaluate));
        session.open_entry(Speaker::AssistantEvaluation, EntryTag::Evaluate);
        session.append_live("Too generic.");
        session.fail_live("Stream interrupted: reset");
        session.close_live();
        session
    }

    #[test]
    fn test_live_entry_lifecycle() {
        let mut session = Session::new();
        assert!(!session.append_live("orphan"));

        session.open_entry(Speaker::Assistant, EntryTag::Ask);
        assert!(session.append_live("a"));
        assert!(session.append_live("b"));
        assert_eq!(session.close_live().map(|e| e.text.as_str()), Some("ab"));

        assert!(!session.append_live("late"));
        assert_eq!(session.entries()[0].text, "ab");
    }

    #[test]
    fn test_failure_keeps_partial_text() {
        let session = sample_session();
        let last = &session.entries()[3];
        assert_eq!(last.text, "Too generic.\nStream interrupted: reset");
        assert!(last.interrupted);
    }

    #[test]
    fn test_failure_without_live_entry_is_error_entry() {
        let mut session = Session::new();
        session.fail_live("API Connection Error: refused");
        assert_eq!(session.entries()[0].tag, EntryTag::Error);
    }

    #[test]
    fn test_export_import_round_trip() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("chat.json");
        let session = sample_session();
        session.export(&path)?;

        let mut restored = Session::new();
        restored.push(ConversationEntry::new(Speaker::User, "replaced", EntryTag::Ask));
        assert_eq!(restored.import(&path)?, 4);

        assert_eq!(restored.entries().len(), session.entries().len());
        for (a, b) in restored.entries().iter().zip(session.entries()) {
            assert!(a.same_content(b));
            assert_eq!(a.interrupted, b.interrupted);
        }
        Ok(())
    }

    #[test]
    fn test_import_accepts_bare_array() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("old.json");
        fs::write(
            &path,
            r#"[{"speaker":"user","text":"Hi","tag":"ask","timestamp":"2025-01-02T10:00:00Z"}]"#,
        )?;

        let mut session = Session::new();
        assert_eq!(session.import(&path)?, 1);
        assert_eq!(session.entries()[0].text, "Hi");
        assert!(!session.entries()[0].interrupted);
        Ok(())
    }

    #[test]
    fn test_import_rejects_garbage() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("bad.json");
        fs::write(&path, "{\"entries\": 3}")?;
        let mut session = sample_session();
        assert!(session.import(&path).is_err());
        assert_eq!(session.len(), 4);
        Ok(())
    }

    #[test]
    fn test_store_lists_newest_first() -> Result<()> {
        let dir = TempDir::new()?;
        let store = ConversationStore::new(dir.path().join("conversations"));
        assert!(store.list()?.is_empty());

        let older = ConversationDocument {
            version: DOCUMENT_VERSION,
            saved_at: "2024-05-01T08:00:00Z".parse()?,
            entries: vec![ConversationEntry::new(Speaker::User, "Old question", EntryTag::Ask)],
        };
        fs::create_dir_all(store.dir())?;
        fs::write(store.dir().join("older.json"), serde_json::to_string(&older)?)?;
        fs::write(store.dir().join("notes.txt"), "ignored")?;

        let newest = store.save(&sample_session())?;
        let listed = store.list()?;
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].path, newest);
        assert_eq!(listed[0].title, "What are your weaknesses?");
        assert_eq!(listed[1].title, "Old question");
        Ok(())
    }
}
