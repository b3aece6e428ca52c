use crate::error::IngestError;
use crate::models::{Chunk, ChunkMetadata, Document, UNKNOWN_SECTION};
use regex::Regex;
use std::collections::VecDeque;

/// Split points in priority order: paragraph, line, word, character.
pub const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

const NUMBERED_HEADING_PATTERN: &str = r"^\s*(\d+\.)+\s+\S";
const MAX_CAPS_HEADING_CHARS: usize = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl ChunkingConfig {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, IngestError> {
        if chunk_size == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "chunk_size must be positive".to_string(),
            ));
        }
        if chunk_overlap >= chunk_size {
            return Err(IngestError::InvalidChunkConfig(format!(
                "chunk_overlap {chunk_overlap} must be smaller than chunk_size {chunk_size}"
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Recursive separator splitter: tries the earliest separator present in the
/// text, merges small pieces back up to `chunk_size`, and recurses into
/// pieces that are still too large with the remaining separators.
#[derive(Debug, Clone)]
pub struct RecursiveSplitter {
    config: ChunkingConfig,
    separators: Vec<String>,
}

impl RecursiveSplitter {
    pub fn new(config: ChunkingConfig) -> Self {
        Self {
            config,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_with(text, &self.separators)
    }

    fn split_with(&self, text: &str, separators: &[String]) -> Vec<String> {
        let mut separator = separators.last().map(String::as_str).unwrap_or("");
        let mut remaining: &[String] = &[];

        for (position, candidate) in separators.iter().enumerate() {
            if candidate.is_empty() {
                separator = "";
                break;
            }
            if text.contains(candidate.as_str()) {
                separator = candidate;
                remaining = &separators[position + 1..];
                break;
            }
        }

        let splits: Vec<String> = if separator.is_empty() {
            text.chars().map(String::from).collect()
        } else {
            text.split(separator)
                .filter(|piece| !piece.is_empty())
                .map(str::to_string)
                .collect()
        };

        let mut chunks = Vec::new();
        let mut fitting = Vec::new();

        for piece in splits {
            if char_len(&piece) < self.config.chunk_size {
                fitting.push(piece);
                continue;
            }

            if !fitting.is_empty() {
                chunks.extend(self.merge_splits(&fitting, separator));
                fitting.clear();
            }

            if remaining.is_empty() {
                chunks.push(piece);
            } else {
                chunks.extend(self.split_with(&piece, remaining));
            }
        }

        if !fitting.is_empty() {
            chunks.extend(self.merge_splits(&fitting, separator));
        }

        chunks
    }

    fn merge_splits(&self, splits: &[String], separator: &str) -> Vec<String> {
        let separator_len = char_len(separator);
        let mut merged = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for piece in splits {
            let len = char_len(piece);
            let joiner = if window.is_empty() { 0 } else { separator_len };

            if total + len + joiner > self.config.chunk_size && !window.is_empty() {
                push_joined(&mut merged, &window, separator);

                // Drop from the front until only the overlap is carried over.
                while total > self.config.chunk_overlap
                    || (total > 0
                        && total + len + if window.is_empty() { 0 } else { separator_len }
                            > self.config.chunk_size)
                {
                    let dropped_joiner = if window.len() > 1 { separator_len } else { 0 };
                    match window.pop_front() {
                        Some(first) => {
                            total = total.saturating_sub(char_len(first) + dropped_joiner);
                        }
                        None => break,
                    }
                }
            }

            window.push_back(piece);
            total += len + if window.len() > 1 { separator_len } else { 0 };
        }

        push_joined(&mut merged, &window, separator);
        merged
    }
}

fn push_joined(target: &mut Vec<String>, window: &VecDeque<&str>, separator: &str) {
    let joined = window.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        target.push(trimmed.to_string());
    }
}

/// Best-effort heading guess: the first numbered heading ("1.", "2.3.") or
/// short all-caps line in the chunk.
#[derive(Debug, Clone)]
pub struct SectionHeuristic {
    numbered: Regex,
}

impl SectionHeuristic {
    pub fn new() -> Result<Self, IngestError> {
        Ok(Self {
            numbered: Regex::new(NUMBERED_HEADING_PATTERN)?,
        })
    }

    pub fn guess(&self, text: &str) -> Option<String> {
        text.lines()
            .find(|line| {
                self.numbered.is_match(line)
                    || (char_len(line) < MAX_CAPS_HEADING_CHARS && is_upper_case(line))
            })
            .map(|line| line.trim().to_string())
    }
}

fn is_upper_case(line: &str) -> bool {
    let mut cased = false;
    for c in line.chars() {
        if c.is_lowercase() {
            return false;
        }
        if c.is_uppercase() {
            cased = true;
        }
    }
    cased
}

pub fn chunk_documents(
    documents: &[Document],
    config: ChunkingConfig,
) -> Result<Vec<Chunk>, IngestError> {
    let splitter = RecursiveSplitter::new(config);
    let sections = SectionHeuristic::new()?;

    let mut chunks = Vec::new();
    for document in documents {
        for content in splitter.split_text(&document.text) {
            let mut metadata = ChunkMetadata::from(document);
            metadata.section = Some(
                sections
                    .guess(&content)
                    .unwrap_or_else(|| UNKNOWN_SECTION.to_string()),
            );
            chunks.push(Chunk { content, metadata });
        }
    }

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn splitter(size: usize, overlap: usize) -> RecursiveSplitter {
        RecursiveSplitter::new(ChunkingConfig::new(size, overlap).expect("valid config"))
    }

    #[test]
    fn short_text_stays_whole() {
        let chunks = splitter(100, 10).split_text("  A single short paragraph.  ");
        assert_eq!(chunks, vec!["A single short paragraph.".to_string()]);
    }

    #[test]
    fn paragraphs_are_preferred_split_points() {
        let text = "First paragraph here.\n\nSecond paragraph here.";
        let chunks = splitter(25, 0).split_text(text);
        assert_eq!(
            chunks,
            vec![
                "First paragraph here.".to_string(),
                "Second paragraph here.".to_string()
            ]
        );
    }

    #[test]
    fn consecutive_word_chunks_overlap() {
        let chunks = splitter(10, 5).split_text("aaaa bbbb cccc dddd eeee");
        assert_eq!(
            chunks,
            vec!["aaaa bbbb", "bbbb cccc", "cccc dddd", "dddd eeee"]
        );
    }

    #[test]
    fn unbroken_text_falls_back_to_characters() {
        let chunks = splitter(5, 0).split_text("abcdefghijkl");
        assert_eq!(chunks, vec!["abcde", "fghij", "kl"]);
    }

    #[test]
    fn chunks_never_exceed_chunk_size() {
        let text = "Lorem ipsum dolor sit amet, consectetur adipiscing elit.\n\
                    Sed do eiusmod tempor incididunt ut labore et dolore magna aliqua.\n\n\
                    Ut enim ad minim veniam, quis nostrud exercitation ullamco laboris.";
        for chunk in splitter(40, 8).split_text(text) {
            assert!(chunk.chars().count() <= 40, "chunk too long: {chunk:?}");
        }
    }

    #[test]
    fn overlap_must_be_smaller_than_size() {
        assert!(ChunkingConfig::new(10, 10).is_err());
        assert!(ChunkingConfig::new(0, 0).is_err());
    }

    #[test]
    fn numbered_heading_is_detected() -> Result<(), IngestError> {
        let heuristic = SectionHeuristic::new()?;
        assert_eq!(
            heuristic.guess("intro text\n 2.1. Pump Maintenance\nmore"),
            Some("2.1. Pump Maintenance".to_string())
        );
        Ok(())
    }

    #[test]
    fn short_caps_line_is_detected() -> Result<(), IngestError> {
        let heuristic = SectionHeuristic::new()?;
        assert_eq!(
            heuristic.guess("SAFETY NOTES\nKeep hands clear."),
            Some("SAFETY NOTES".to_string())
        );
        assert_eq!(heuristic.guess("nothing to see here"), None);
        let long_caps = "A".repeat(90);
        assert_eq!(heuristic.guess(&long_caps), None);
        Ok(())
    }

    #[test]
    fn chunks_inherit_page_metadata() -> Result<(), IngestError> {
        let documents = vec![Document {
            text: "plain body text".to_string(),
            source: "alpha.pdf".to_string(),
            file_path: "/uploads/alpha.pdf".to_string(),
            page: 3,
        }];

        let chunks = chunk_documents(&documents, ChunkingConfig::new(100, 10)?)?;

        assert_eq!(chunks.len(), 1);
        let metadata = &chunks[0].metadata;
        assert_eq!(metadata.source.as_deref(), Some("alpha.pdf"));
        assert_eq!(metadata.page, Some(3));
        assert_eq!(metadata.section.as_deref(), Some(UNKNOWN_SECTION));
        assert_eq!(metadata.corpus_id, None);
        Ok(())
    }

    #[test]
    fn empty_pages_produce_no_chunks() -> Result<(), IngestError> {
        let documents = vec![Document {
            text: "  \n ".to_string(),
            source: "scan.pdf".to_string(),
            file_path: "/uploads/scan.pdf".to_string(),
            page: 1,
        }];
        assert!(chunk_documents(&documents, ChunkingConfig::new(100, 10)?)?.is_empty());
        Ok(())
    }
}
