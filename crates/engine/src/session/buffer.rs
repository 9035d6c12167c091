use inkstone_common::text::char_count;

/// The live text of one chapter plus its derived character count.
///
/// Owned exclusively by the session actor; every mutation goes through
/// `commit`, which bumps the revision.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Buffer {
    text: String,
    char_count: usize,
    revision: u64,
}

impl Buffer {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let char_count = char_count(&text);
        Self { text, char_count, revision: 0 }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn char_count(&self) -> usize {
        self.char_count
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Replace the full text. Returns false (and leaves the revision alone)
    /// when the text is unchanged.
    pub fn commit(&mut self, text: String) -> bool {
        if text == self.text {
            return false;
        }
        self.char_count = char_count(&text);
        self.text = text;
        self.revision = self.revision.saturating_add(1);
        true
    }

    /// Append to the latest text.
    pub fn append(&mut self, suffix: &str) -> bool {
        if suffix.is_empty() {
            return false;
        }
        self.text.push_str(suffix);
        self.char_count += char_count(suffix);
        self.revision = self.revision.saturating_add(1);
        true
    }
}
