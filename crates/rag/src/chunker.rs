//! Text chunker (C1) — splits source documents into overlapping retrieval
//! units while preserving paragraph and sentence boundaries.
//!
//! Character-based, not token-based: mixed-script input (the router's own
//! token estimator in `crm-core::tokens` is CJK-aware for the same reason)
//! makes a token count an unreliable unit to budget against at this layer,
//! so `chunk_size`/`chunk_overlap` are both character counts (§4.1).

use crm_core::rag::RagConfig;

/// Sentence-ending punctuation, Chinese and Western, retained at the end of
/// the sentence it closes (§4.1 step 2).
const SENTENCE_SEPARATORS: &[char] = &['。', '！', '？', '；', '.', '!', '?', ';'];

/// Splits text into retrieval chunks per `RagConfig.chunk_size` /
/// `chunk_overlap`. Stateless aside from its configuration, so rebuilding it
/// on `RagConfig` update (§4.9 `updateConfig`) is just constructing a new
/// one.
#[derive(Debug, Clone)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Chunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size),
        }
    }

    pub fn from_config(config: &RagConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    /// Split `text` into an ordered list of non-empty chunks (§4.1).
    ///
    /// `chunk("")` → `[]`; `chunk(t)` with `|t| <= chunk_size` → `[t]`
    /// (collapsed whitespace aside) per §8 boundary behaviors.
    pub fn split(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        if self.chunk_size == 0 {
            return vec![text.to_string()];
        }

        let paragraphs = split_paragraphs(text);
        let mut chunks: Vec<String> = Vec::new();
        let mut current = String::new();

        for paragraph in paragraphs {
            if current.is_empty() {
                if char_len(&paragraph) <= self.chunk_size {
                    current = paragraph;
                    continue;
                }
            } else if char_len(&current) + 1 + char_len(&paragraph) <= self.chunk_size {
                current.push('\n');
                current.push_str(&paragraph);
                continue;
            }

            // Paragraph doesn't fit as a whole — split it into sentences and
            // pack those instead, flushing `current` whenever a sentence
            // would overflow it.
            for sentence in split_sentences(&paragraph) {
                if current.is_empty() {
                    current = sentence;
                    continue;
                }
                if char_len(&current) + char_len(&sentence) <= self.chunk_size {
                    current.push_str(&sentence);
                } else {
                    chunks.push(std::mem::take(&mut current));
                    current = self.seed_overlap(chunks.last().unwrap());
                    current.push_str(&sentence);
                }
            }
        }

        if !current.trim().is_empty() {
            chunks.push(current);
        }

        chunks.into_iter().filter(|c| !c.trim().is_empty()).collect()
    }

    /// The overlap seed for the next chunk: the last `chunk_overlap`
    /// characters of the chunk just emitted, or empty when overlap is 0
    /// (§4.1 step 3).
    fn seed_overlap(&self, emitted: &str) -> String {
        if self.chunk_overlap == 0 {
            return String::new();
        }
        let chars: Vec<char> = emitted.chars().collect();
        let start = chars.len().saturating_sub(self.chunk_overlap);
        chars[start..].iter().collect()
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Split on paragraph separators (double-newline, newline), dropping empty
/// paragraphs (§4.1 step 1).
fn split_paragraphs(text: &str) -> Vec<String> {
    text.split("\n\n")
        .flat_map(|p| p.split('\n'))
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(|p| p.to_string())
        .collect()
}

/// Split on sentence separators, retaining the separator at the end of each
/// sentence (§4.1 step 2).
fn split_sentences(paragraph: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    for c in paragraph.chars() {
        current.push(c);
        if SENTENCE_SEPARATORS.contains(&c) {
            sentences.push(std::mem::take(&mut current));
        }
    }
    if !current.trim().is_empty() {
        sentences.push(current);
    }
    sentences
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_yields_no_chunks() {
        let chunker = Chunker::new(512, 50);
        assert_eq!(chunker.split(""), Vec::<String>::new());
        assert_eq!(chunker.split("   "), Vec::<String>::new());
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunker = Chunker::new(512, 50);
        let chunks = chunker.split("hello world");
        assert_eq!(chunks, vec!["hello world".to_string()]);
    }

    #[test]
    fn splits_long_text_into_multiple_chunks() {
        let chunker = Chunker::new(40, 10);
        let text = "This is the first sentence. This is the second sentence. \
                    This is the third sentence. This is the fourth sentence.";
        let chunks = chunker.split(text);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(char_len(chunk) <= 40 + 60, "chunk overshot bound: {chunk:?}");
        }
    }

    #[test]
    fn overlap_seeds_the_next_chunk() {
        let chunker = Chunker::new(20, 5);
        let text = "Alpha sentence one. Beta sentence two. Gamma sentence three.";
        let chunks = chunker.split(text);
        assert!(chunks.len() >= 2);
        let tail_of_first: String = chunks[0].chars().rev().take(5).collect::<Vec<_>>().into_iter().rev().collect();
        assert!(chunks[1].starts_with(&tail_of_first) || chunks[1].contains(&tail_of_first));
    }

    #[test]
    fn zero_overlap_does_not_seed() {
        let chunker = Chunker::new(20, 0);
        let text = "Alpha sentence one. Beta sentence two. Gamma sentence three.";
        let chunks = chunker.split(text);
        assert!(chunks.len() >= 2);
    }

    #[test]
    fn respects_paragraph_boundaries_when_they_fit() {
        let chunker = Chunker::new(100, 10);
        let text = "First paragraph here.\n\nSecond paragraph here.";
        let chunks = chunker.split(text);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].contains("First paragraph"));
        assert!(chunks[0].contains("Second paragraph"));
    }

    #[test]
    fn oversized_single_sentence_still_emits_one_chunk() {
        // A sentence longer than chunk_size is allowed to overshoot (§4.1 invariant).
        let chunker = Chunker::new(10, 2);
        let long_sentence = "a".repeat(50);
        let chunks = chunker.split(&long_sentence);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], long_sentence);
    }

    #[test]
    fn no_empty_chunks_are_emitted() {
        let chunker = Chunker::new(30, 5);
        let text = "One.\n\n\n\nTwo.\n\nThree is a longer sentence that forces a split here.";
        let chunks = chunker.split(text);
        assert!(chunks.iter().all(|c| !c.trim().is_empty()));
    }
}
