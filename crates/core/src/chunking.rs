use crate::error::IngestError;
use crate::models::{DocumentChunk, IngestionOptions, PageText};
use regex::Regex;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
}

impl From<&IngestionOptions> for ChunkingConfig {
    fn from(value: &IngestionOptions) -> Self {
        Self {
            max_chars: value.chunk_max_chars,
            overlap_chars: value.chunk_overlap_chars,
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self::from(&IngestionOptions::default())
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.max_chars == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "max_chars must be greater than zero".to_string(),
            ));
        }
        if self.overlap_chars >= self.max_chars {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap_chars ({}) must be smaller than max_chars ({})",
                self.overlap_chars, self.max_chars
            )));
        }
        Ok(())
    }
}

/// Character span `[start, end)` of one window over a page's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextWindow {
    pub start: usize,
    pub end: usize,
}

impl TextWindow {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }
}

// Tried in order; the first tier with a usable match inside the window wins.
const PARAGRAPH_BREAK: &str = r"\n[ \t]*\n\s*";
const SENTENCE_END: &str = r#"[.!?]["')\]]*\s+"#;
const WORD_BREAK: &str = r"\s+";

struct Separators {
    tiers: [Regex; 3],
}

impl Separators {
    fn compile() -> Result<Self, IngestError> {
        Ok(Self {
            tiers: [
                Regex::new(PARAGRAPH_BREAK)?,
                Regex::new(SENTENCE_END)?,
                Regex::new(WORD_BREAK)?,
            ],
        })
    }
}

/// Collapses blank runs so no window can hold only whitespace.
///
/// Runs of spaces and tabs become one space, three or more line breaks become
/// one paragraph break, and leading and trailing whitespace is dropped.
pub fn clean_page_text(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut cleaned = String::with_capacity(unified.len());
    let mut pending_space = false;
    let mut newlines = 0usize;

    for ch in unified.chars() {
        if ch == '\n' {
            newlines += 1;
            continue;
        }
        if ch.is_whitespace() {
            pending_space = true;
            continue;
        }

        if !cleaned.is_empty() {
            match newlines {
                0 if pending_space => cleaned.push(' '),
                0 => {}
                1 => cleaned.push('\n'),
                _ => cleaned.push_str("\n\n"),
            }
        }
        newlines = 0;
        pending_space = false;
        cleaned.push(ch);
    }

    cleaned
}

pub fn split_windows(text: &str, config: ChunkingConfig) -> Result<Vec<TextWindow>, IngestError> {
    config.validate()?;
    let separators = Separators::compile()?;
    Ok(split_with(text, config, &separators))
}

fn split_with(text: &str, config: ChunkingConfig, separators: &Separators) -> Vec<TextWindow> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let chars: Vec<char> = text.chars().collect();
    let offsets: Vec<usize> = text
        .char_indices()
        .map(|(offset, _)| offset)
        .chain(std::iter::once(text.len()))
        .collect();
    let total = chars.len();

    let mut windows = Vec::new();
    let mut start = 0;
    loop {
        let hard_end = (start + config.max_chars).min(total);
        if hard_end == total {
            windows.push(TextWindow { start, end: total });
            break;
        }

        // A break must leave more than the overlap behind, or the scan stalls.
        let min_end = start + config.overlap_chars + 1;
        // Breaks must keep at least one non-whitespace character in the window.
        let min_end = (start..hard_end)
            .find(|&position| !chars[position].is_whitespace())
            .map_or(hard_end, |position| min_end.max(position + 1));
        let end = preferred_break(text, &offsets, start, min_end, hard_end, separators)
            .unwrap_or(hard_end);
        windows.push(TextWindow { start, end });
        start = next_start(&chars, end, config.overlap_chars);
    }

    windows
}

fn preferred_break(
    text: &str,
    offsets: &[usize],
    start: usize,
    min_end: usize,
    hard_end: usize,
    separators: &Separators,
) -> Option<usize> {
    let base = offsets[start];
    let window = &text[base..offsets[hard_end]];

    separators.tiers.iter().find_map(|separator| {
        separator
            .find_iter(window)
            .map(|found| char_position(offsets, base + found.end()))
            .filter(|&position| position >= min_end && position <= hard_end)
            .last()
    })
}

fn char_position(offsets: &[usize], byte_offset: usize) -> usize {
    offsets
        .binary_search(&byte_offset)
        .unwrap_or_else(|insert_at| insert_at)
}

fn next_start(chars: &[char], end: usize, overlap: usize) -> usize {
    if overlap == 0 {
        return end;
    }

    let from = end - overlap;
    (from..end)
        .find(|&position| {
            position > 0 && chars[position - 1].is_whitespace() && !chars[position].is_whitespace()
        })
        .unwrap_or(from)
}

/// Splits extracted pages into chunks, numbering them from `first_ordinal`.
///
/// Returns the chunks in page order and the next free ordinal.
pub fn chunk_pages(
    document_id: &str,
    pages: &[PageText],
    options: &IngestionOptions,
    first_ordinal: u64,
) -> Result<(Vec<DocumentChunk>, u64), IngestError> {
    let config = ChunkingConfig::from(options);
    config.validate()?;
    let separators = Separators::compile()?;

    let mut chunks = Vec::new();
    let mut cursor = first_ordinal;

    for page in pages {
        let cleaned = clean_page_text(&page.text);
        let offsets: Vec<usize> = cleaned
            .char_indices()
            .map(|(offset, _)| offset)
            .chain(std::iter::once(cleaned.len()))
            .collect();

        let mut chunk_index = 0u32;
        for window in split_with(&cleaned, config, &separators) {
            let text = &cleaned[offsets[window.start]..offsets[window.end]];
            if text.trim().is_empty() {
                continue;
            }

            chunks.push(DocumentChunk {
                chunk_id: make_chunk_id(document_id, page.page, cursor, text),
                document_id: document_id.to_string(),
                source: page.source.clone(),
                page: page.page,
                chunk_index,
                ordinal: cursor,
                char_start: window.start,
                char_end: window.end,
                text: text.to_string(),
            });

            chunk_index = chunk_index.saturating_add(1);
            cursor = cursor.saturating_add(1);
        }
    }

    Ok((chunks, cursor))
}

fn make_chunk_id(document_id: &str, page: u32, ordinal: u64, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document_id.as_bytes());
    hasher.update(page.to_le_bytes());
    hasher.update(ordinal.to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_chars: usize, overlap_chars: usize) -> ChunkingConfig {
        ChunkingConfig {
            max_chars,
            overlap_chars,
        }
    }

    fn slices(text: &str, windows: &[TextWindow]) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        windows
            .iter()
            .map(|window| chars[window.start..window.end].iter().collect())
            .collect()
    }

    fn page(source: &str, number: u32, text: &str) -> PageText {
        PageText {
            source: source.to_string(),
            page: number,
            text: text.to_string(),
        }
    }

    #[test]
    fn fixed_windows_without_separators() {
        let windows = split_windows("ABCDEFGHIJ", config(4, 2)).unwrap();
        assert_eq!(
            slices("ABCDEFGHIJ", &windows),
            vec!["ABCD", "CDEF", "EFGH", "GHIJ"]
        );
    }

    #[test]
    fn short_text_is_a_single_window() {
        let windows = split_windows("short text", config(50, 5)).unwrap();
        assert_eq!(windows, vec![TextWindow { start: 0, end: 10 }]);
    }

    #[test]
    fn empty_and_blank_text_produce_no_windows() {
        assert!(split_windows("", config(10, 2)).unwrap().is_empty());
        assert!(split_windows("   \n\n\t ", config(10, 2)).unwrap().is_empty());
    }

    #[test]
    fn windows_cover_text_with_bounded_overlap() {
        let text = "Hydraulic pumps move fluid. Pressure rises quickly!\n\n\
                    Valves regulate flow and protect the circuit from spikes. \
                    Operators inspect seals weekly? Yes, and filters monthly.\n\n\
                    Abcdefghijklmnopqrstuvwxyzabcdefghijklmnopqrstuvwxyz end.";
        let total = text.chars().count();

        for (max_chars, overlap_chars) in [(8, 0), (16, 3), (25, 10), (40, 39), (64, 8), (500, 50)] {
            let cfg = config(max_chars, overlap_chars);
            let windows = split_windows(text, cfg).unwrap();

            assert_eq!(windows.first().map(|w| w.start), Some(0));
            assert_eq!(windows.last().map(|w| w.end), Some(total));

            for window in &windows {
                assert!(!window.is_empty());
                assert!(window.len() <= max_chars, "{window:?} exceeds {max_chars}");
            }

            for pair in windows.windows(2) {
                let (left, right) = (pair[0], pair[1]);
                assert!(right.start > left.start, "windows must advance");
                assert!(right.start <= left.end, "gap between {left:?} and {right:?}");
                let overlap = left.end - right.start;
                assert!(overlap <= overlap_chars);
                if overlap_chars > 0 {
                    assert!(overlap > 0, "adjacent windows must overlap");
                }
            }
        }
    }

    #[test]
    fn prefers_paragraph_break_over_word_break() {
        let text = "alpha beta\n\ngamma delta epsilon";
        let windows = split_windows(text, config(20, 2)).unwrap();
        assert_eq!(slices(text, &windows)[0], "alpha beta\n\n");
    }

    #[test]
    fn prefers_sentence_end_over_word_break() {
        let text = "One two. Three four five six";
        let windows = split_windows(text, config(15, 2)).unwrap();
        assert_eq!(slices(text, &windows)[0], "One two. ");
    }

    #[test]
    fn overlap_starts_at_word_boundary_when_possible() {
        let text = "aaaa bbbb cccc dddd";
        let windows = split_windows(text, config(10, 5)).unwrap();
        let pieces = slices(text, &windows);
        assert_eq!(pieces[0], "aaaa bbbb ");
        assert!(pieces[1].starts_with("bbbb"));
    }

    #[test]
    fn counts_characters_not_bytes() {
        let text = "ééééé";
        let windows = split_windows(text, config(2, 1)).unwrap();
        assert_eq!(slices(text, &windows), vec!["éé", "éé", "éé", "éé"]);
    }

    #[test]
    fn invalid_config_is_rejected() {
        assert!(matches!(
            split_windows("text", config(0, 0)),
            Err(IngestError::InvalidChunkConfig(_))
        ));
        assert!(matches!(
            split_windows("text", config(4, 4)),
            Err(IngestError::InvalidChunkConfig(_))
        ));
    }

    #[test]
    fn page_text_is_cleaned_but_keeps_paragraphs() {
        assert_eq!(clean_page_text("a\r\n\r\nb\u{a0}c"), "a\n\nb c");
        assert_eq!(clean_page_text("  a \t b \n \n\n\n c\nd  "), "a b\n\nc\nd");
        assert_eq!(clean_page_text(" \n\t "), "");
    }

    #[test]
    fn long_blank_runs_keep_chunks_overlapping() {
        let options = IngestionOptions {
            chunk_max_chars: 8,
            chunk_overlap_chars: 3,
        };
        let spaced = format!("alpha{}omega", " ".repeat(30));
        let broken = format!("alpha{}omega gamma{}delta", "\n".repeat(20), "\t ".repeat(12));

        for text in [spaced, broken] {
            let pages = vec![page("a.pdf", 1, &text)];
            let (chunks, _) = chunk_pages("doc", &pages, &options, 0).unwrap();

            assert!(chunks.len() > 1);
            assert!(chunks.iter().all(|chunk| !chunk.text.trim().is_empty()));
            for pair in chunks.windows(2) {
                assert!(
                    pair[1].char_start < pair[0].char_end,
                    "{:?} and {:?} do not overlap",
                    pair[0].text,
                    pair[1].text
                );
            }
        }
    }

    #[test]
    fn breaks_never_produce_blank_windows() {
        let text = "abc\n\ndefg";
        let windows = split_windows(text, config(4, 1)).unwrap();
        assert_eq!(windows.last().map(|w| w.end), Some(9));
        for piece in slices(text, &windows) {
            assert!(!piece.trim().is_empty(), "blank window {piece:?}");
        }
    }

    #[test]
    fn chunk_pages_preserves_order_and_numbering() {
        let options = IngestionOptions {
            chunk_max_chars: 4,
            chunk_overlap_chars: 2,
        };
        let pages = vec![
            page("a.pdf", 1, "ABCDEFGHIJ"),
            page("a.pdf", 2, "   "),
            page("a.pdf", 3, "KLMNOP"),
        ];

        let (chunks, next) = chunk_pages("doc-1", &pages, &options, 10).unwrap();

        assert_eq!(chunks.len(), 6);
        assert_eq!(next, 16);
        for pair in chunks.windows(2) {
            assert!(pair[1].ordinal > pair[0].ordinal);
        }
        assert!(chunks[..4].iter().all(|chunk| chunk.page == 1));
        assert!(chunks[4..].iter().all(|chunk| chunk.page == 3));
        assert_eq!(chunks[3].chunk_index, 3);
        assert_eq!(chunks[4].chunk_index, 0);
        assert_eq!(chunks[4].text, "KLMN");
        assert_eq!(chunks[0].document_id, "doc-1");
        assert_ne!(chunks[0].chunk_id, chunks[1].chunk_id);
    }

    #[test]
    fn default_config_matches_ingestion_defaults() {
        let cfg = ChunkingConfig::default();
        assert_eq!(cfg.max_chars, 5_000);
        assert_eq!(cfg.overlap_chars, 500);
    }
}
