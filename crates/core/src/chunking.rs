use crate::error::IngestError;
use regex::Regex;
use std::sync::LazyLock;

struct TextPatterns {
    blank_runs: Regex,
    space_runs: Regex,
    page_numbers: Regex,
    sentence_boundary: Regex,
}

static PATTERNS: LazyLock<Result<TextPatterns, regex::Error>> = LazyLock::new(|| {
    Ok(TextPatterns {
        blank_runs: Regex::new(r"\n\s*\n")?,
        space_runs: Regex::new(r" +")?,
        page_numbers: Regex::new(r"(?m)^\d+\s*$")?,
        sentence_boundary: Regex::new(r"[.!?]\s+")?,
    })
});

/// Compiled once per process and shared by every document.
fn patterns() -> Result<&'static TextPatterns, IngestError> {
    PATTERNS.as_ref().map_err(|error| error.clone().into())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    /// Target chunk length in bytes. A single longer sentence still becomes one chunk.
    pub chunk_size: usize,
    /// Overlap budget; `overlap / 10` trailing words are carried into the next chunk.
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1_000,
            overlap: 200,
        }
    }
}

impl ChunkingConfig {
    fn overlap_words(&self) -> usize {
        self.overlap / 10
    }
}

/// Collapses blank-line runs and space runs and drops lines holding only a page number.
pub fn clean_text(text: &str) -> Result<String, IngestError> {
    let patterns = patterns()?;

    let text = patterns.blank_runs.replace_all(text, "\n\n");
    let text = patterns.space_runs.replace_all(&text, " ");
    let text = patterns.page_numbers.replace_all(&text, "");
    Ok(text.trim().to_string())
}

/// Splits after `.`, `!` or `?` when followed by whitespace. The whitespace is dropped.
pub fn split_sentences(text: &str) -> Result<Vec<&str>, IngestError> {
    let boundary = &patterns()?.sentence_boundary;
    let mut sentences = Vec::new();
    let mut start = 0;

    for found in boundary.find_iter(text) {
        // The punctuation mark is one ASCII byte.
        let end = found.start() + 1;
        sentences.push(&text[start..end]);
        start = found.end();
    }
    if start < text.len() {
        sentences.push(&text[start..]);
    }

    Ok(sentences)
}

/// Greedy sentence packing with a word-level overlap between consecutive chunks.
pub fn chunk_text(text: &str, config: ChunkingConfig) -> Result<Vec<String>, IngestError> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut chunks = Vec::new();
    let mut current = String::new();

    for sentence in split_sentences(text)? {
        if !current.is_empty() && current.len() + sentence.len() > config.chunk_size {
            push_trimmed(&mut chunks, &current);

            let words: Vec<&str> = current.split_whitespace().collect();
            let keep = config.overlap_words().min(words.len());
            let carried = words[words.len() - keep..].join(" ");
            current = format!("{carried} {sentence}");
        } else {
            current.push(' ');
            current.push_str(sentence);
        }
    }

    push_trimmed(&mut chunks, &current);
    Ok(chunks)
}

fn push_trimmed(chunks: &mut Vec<String>, chunk: &str) {
    let trimmed = chunk.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleaning_collapses_blank_lines_spaces_and_page_numbers() {
        let cleaned =
            clean_text("Intro   text\n\n\n\n12\nBody  here\n  \n").expect("valid regexes");
        assert_eq!(cleaned, "Intro text\n\n\nBody here");
    }

    #[test]
    fn patterns_are_shared_across_calls() {
        let first = patterns().expect("valid regexes");
        let second = patterns().expect("valid regexes");
        assert!(std::ptr::eq(first, second));
    }

    #[test]
    fn sentences_split_on_terminal_punctuation() {
        let sentences = split_sentences("One. Two!  Three? Four").expect("valid regex");
        assert_eq!(sentences, vec!["One.", "Two!", "Three?", "Four"]);
    }

    #[test]
    fn decimals_do_not_split_sentences() {
        let sentences = split_sentences("Pi is 3.14 roughly. Done.").expect("valid regex");
        assert_eq!(sentences, vec!["Pi is 3.14 roughly.", "Done."]);
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = chunk_text("The sky is blue. Water is wet.", ChunkingConfig::default())
            .expect("valid regex");
        assert_eq!(chunks, vec!["The sky is blue. Water is wet."]);
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(chunk_text("", ChunkingConfig::default()).expect("valid regex").is_empty());
        assert!(chunk_text("  \n ", ChunkingConfig::default()).expect("valid regex").is_empty());
    }

    #[test]
    fn overflow_starts_a_new_chunk_with_overlap_words() {
        let config = ChunkingConfig {
            chunk_size: 30,
            overlap: 20,
        };
        let text = "alpha beta gamma delta. epsilon zeta eta theta. iota kappa.";
        let chunks = chunk_text(text, config).expect("valid regex");

        assert_eq!(
            chunks,
            vec![
                "alpha beta gamma delta.",
                "gamma delta. epsilon zeta eta theta.",
                "eta theta. iota kappa.",
            ]
        );
    }

    #[test]
    fn zero_overlap_carries_nothing() {
        let config = ChunkingConfig {
            chunk_size: 10,
            overlap: 0,
        };
        let chunks = chunk_text("First one. Second one.", config).expect("valid regex");
        assert_eq!(chunks, vec!["First one.", "Second one."]);
    }
}
