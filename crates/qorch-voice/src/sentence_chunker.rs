//! Buffers generator tokens into speakable chunks for the TTS client (§4.14).
//!
//! Flushes at a sentence boundary (`.!?`), at a clause boundary (`,;:`) once
//! at least `CLAUSE_MIN_CHARS` have accumulated, or unconditionally once
//! `FORCE_FLUSH_CHARS` is reached, so a long unpunctuated span never starves
//! the audio queue.

const CLAUSE_MIN_CHARS: usize = 40;
const FORCE_FLUSH_CHARS: usize = 200;

fn is_sentence_boundary(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

fn is_clause_boundary(c: char) -> bool {
    matches!(c, ',' | ';' | ':')
}

/// Incremental sentence/clause chunker. Feed tokens via `push`; each call
/// returns the chunks that became ready to speak.
#[derive(Debug, Default)]
pub struct SentenceChunker {
    buffer: String,
}

impl SentenceChunker {
    pub fn new() -> Self {
        Self { buffer: String::new() }
    }

    /// Appends a token and returns zero or more chunks now ready for TTS.
    pub fn push(&mut self, token: &str) -> Vec<String> {
        self.buffer.push_str(token);
        let mut ready = Vec::new();

        loop {
            let Some(cut) = self.find_flush_point() else { break };
            let chunk = self.buffer[..cut].trim().to_string();
            self.buffer.drain(..cut);
            if !chunk.is_empty() {
                ready.push(chunk);
            }
        }

        ready
    }

    /// Flushes any remaining buffered text, e.g. at end of generation.
    pub fn finish(&mut self) -> Option<String> {
        let chunk = self.buffer.trim().to_string();
        self.buffer.clear();
        if chunk.is_empty() {
            None
        } else {
            Some(chunk)
        }
    }

    fn find_flush_point(&self) -> Option<usize> {
        if self.buffer.len() >= FORCE_FLUSH_CHARS {
            // Snap to the nearest char boundary at or before the cut point;
            // `FORCE_FLUSH_CHARS` is a byte offset and can otherwise land
            // inside a multi-byte codepoint.
            let mut cut = FORCE_FLUSH_CHARS;
            while !self.buffer.is_char_boundary(cut) {
                cut -= 1;
            }
            return Some(cut);
        }

        for (idx, c) in self.buffer.char_indices() {
            if is_sentence_boundary(c) {
                return Some(idx + c.len_utf8());
            }
            if is_clause_boundary(c) && idx + c.len_utf8() >= CLAUSE_MIN_CHARS {
                return Some(idx + c.len_utf8());
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flushes_on_sentence_boundary() {
        let mut chunker = SentenceChunker::new();
        let ready = chunker.push("Hello there. How are");
        assert_eq!(ready, vec!["Hello there.".to_string()]);
    }

    #[test]
    fn clause_boundary_only_flushes_past_minimum_length() {
        let mut chunker = SentenceChunker::new();
        let ready = chunker.push("Hi, ");
        assert!(ready.is_empty(), "short clause should not flush early");

        let ready = chunker.push("this is a somewhat longer clause here, yes");
        assert_eq!(ready.len(), 1);
        assert!(ready[0].len() >= CLAUSE_MIN_CHARS - 5);
    }

    #[test]
    fn forces_flush_at_200_chars_with_no_punctuation() {
        let mut chunker = SentenceChunker::new();
        let long_token = "a".repeat(250);
        let ready = chunker.push(&long_token);
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].len(), FORCE_FLUSH_CHARS);
    }

    #[test]
    fn force_flush_does_not_split_a_multibyte_codepoint() {
        let mut chunker = SentenceChunker::new();
        // "e with acute accent" is 2 bytes; repeated enough to cross the
        // force-flush byte offset without landing on a char boundary by luck.
        let long_token = "e\u{0301}".repeat(150);
        let ready = chunker.push(&long_token);
        assert_eq!(ready.len(), 1);
        assert!(ready[0].is_char_boundary(ready[0].len()));
        assert!(std::str::from_utf8(ready[0].as_bytes()).is_ok());
    }

    #[test]
    fn finish_drains_remaining_buffer() {
        let mut chunker = SentenceChunker::new();
        chunker.push("trailing fragment");
        assert_eq!(chunker.finish(), Some("trailing fragment".to_string()));
        assert_eq!(chunker.finish(), None);
    }
}
