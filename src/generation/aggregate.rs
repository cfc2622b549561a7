//! Merges every note of a step into one prompt blob.

use crate::types::Note;

const SECTION_SEPARATOR: &str = "\n\n---\n\n";

#[derive(Debug, Default, Clone, Copy)]
pub struct ContentAggregator;

impl ContentAggregator {
    /// Notes are emitted oldest first; each becomes a titled section.
    pub fn merge(&self, notes: &[Note]) -> String {
        let mut ordered: Vec<&Note> = notes.iter().collect();
        ordered.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        ordered
            .iter()
            .enumerate()
            .map(|(i, note)| {
                format!(
                    "### Note {}: {}\n{}",
                    i + 1,
                    note.title.trim(),
                    note.content.trim()
                )
            })
            .collect::<Vec<_>>()
            .join(SECTION_SEPARATOR)
    }
}
