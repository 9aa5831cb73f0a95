use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};

/// Command history: an in-memory ring persisted to a plain text file,
/// one entry per line.
#[derive(Debug, Default)]
pub struct HistoryManager {
    entries: Vec<String>,
    max_len: usize,
    file_path: Option<String>,
}

impl HistoryManager {
    pub fn new(max_len: usize) -> Self {
        HistoryManager {
            entries: Vec::new(),
            max_len,
            file_path: None,
        }
    }

    /// Load from the history file; a missing file is an empty history.
    pub fn load(path: &str, max_len: usize) -> Self {
        let mut entries = Vec::new();
        if let Ok(file) = File::open(path) {
            for line in BufReader::new(file).lines().map_while(Result::ok) {
                if !line.trim().is_empty() {
                    entries.push(line);
                }
            }
        }
        if entries.len() > max_len {
            entries.drain(..entries.len() - max_len);
        }
        HistoryManager {
            entries,
            max_len,
            file_path: Some(path.to_string()),
        }
    }

    pub fn save(&self) -> std::io::Result<()> {
        let Some(path) = &self.file_path else {
            return Ok(());
        };
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        for line in &self.entries {
            writeln!(file, "{line}")?;
        }
        Ok(())
    }

    pub fn add(&mut self, line: &str) {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return;
        }
        // Consecutive duplicates collapse into one entry.
        if self.entries.last().map(String::as_str) == Some(trimmed) {
            return;
        }
        self.entries.push(trimmed.to_string());
        if self.max_len > 0 && self.entries.len() > self.max_len {
            self.entries.remove(0);
        }
    }

    pub fn list(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
