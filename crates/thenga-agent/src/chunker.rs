//! Incremental sentence chunking for streamed model output.
//!
//! A chunk is a speakable unit handed to speech synthesis as soon as it is
//! known to be complete. A sentence boundary is a run of `.`, `!` or `?`
//! followed by at least one whitespace character. Text after the last
//! boundary is never emitted early: it may still grow ("Dr" before
//! ". Smith"), so it stays in the buffer until the next boundary arrives or
//! the stream ends.

/// Splits `buffer` into complete sentences and the trailing remainder.
///
/// Single-word fragments (such as "Dr. " or "Hi. ") are folded into the
/// following sentence instead of being emitted on their own, so short
/// abbreviation-like tokens do not produce clipped speech. The function is
/// pure: feeding a growing buffer through repeated calls and keeping the
/// remainder yields the same concatenated output as one call on the final
/// buffer.
pub fn extract_complete_sentences(buffer: &str) -> (Vec<String>, String) {
    let mut segments: Vec<&str> = Vec::new();
    let mut start = 0usize;
    let mut chars = buffer.char_indices().peekable();

    while let Some((idx, ch)) = chars.next() {
        if !is_boundary_punct(ch) {
            continue;
        }
        let mut end = idx + ch.len_utf8();
        while let Some(&(next_idx, next_ch)) = chars.peek() {
            if is_boundary_punct(next_ch) {
                chars.next();
                end = next_idx + next_ch.len_utf8();
            } else {
                break;
            }
        }
        let mut saw_whitespace = false;
        while let Some(&(next_idx, next_ch)) = chars.peek() {
            if next_ch.is_whitespace() {
                chars.next();
                saw_whitespace = true;
                end = next_idx + next_ch.len_utf8();
            } else {
                break;
            }
        }
        if saw_whitespace {
            segments.push(&buffer[start..end]);
            start = end;
        }
    }

    let tail = &buffer[start..];
    let mut sentences = Vec::new();
    let mut carry = String::new();
    for segment in segments {
        carry.push_str(segment);
        if carry.trim().contains(char::is_whitespace) {
            sentences.push(std::mem::take(&mut carry));
        }
    }
    carry.push_str(tail);

    (sentences, carry)
}

fn is_boundary_punct(ch: char) -> bool {
    matches!(ch, '.' | '!' | '?')
}

/// Stateful wrapper used by the turn engine: retains the remainder between
/// deltas so previously emitted sentences are never re-emitted.
#[derive(Debug, Clone, Default)]
pub struct SentenceChunker {
    buffer: String,
}

impl SentenceChunker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a streamed delta and returns the sentences completed by it.
    pub fn push(&mut self, delta: &str) -> Vec<String> {
        self.buffer.push_str(delta);
        let (sentences, remainder) = extract_complete_sentences(&self.buffer);
        self.buffer = remainder;
        sentences
    }

    /// Drains whatever is still buffered at end-of-stream, even without
    /// terminal punctuation.
    pub fn flush(&mut self) -> Option<String> {
        if self.buffer.trim().is_empty() {
            self.buffer.clear();
            return None;
        }
        Some(std::mem::take(&mut self.buffer))
    }

    pub fn remainder(&self) -> &str {
        &self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect_incremental(deltas: &[&str]) -> (Vec<String>, String) {
        let mut chunker = SentenceChunker::new();
        let mut sentences = Vec::new();
        for delta in deltas {
            sentences.extend(chunker.push(delta));
        }
        let remainder = chunker.remainder().to_string();
        (sentences, remainder)
    }

    #[test]
    fn no_boundary_emits_nothing() {
        let (sentences, remainder) = extract_complete_sentences("Dr");
        assert!(sentences.is_empty());
        assert_eq!(remainder, "Dr");
    }

    #[test]
    fn abbreviation_fragment_folds_into_following_sentence() {
        let (sentences, remainder) = extract_complete_sentences("Dr. Smith is here. ");
        assert_eq!(sentences, vec!["Dr. Smith is here. "]);
        assert_eq!(remainder, "");
    }

    #[test]
    fn unterminated_tail_stays_in_remainder() {
        let (sentences, remainder) =
            extract_complete_sentences("The hoodie costs fifty dollars. It ships tomo");
        assert_eq!(sentences, vec!["The hoodie costs fifty dollars. "]);
        assert_eq!(remainder, "It ships tomo");
    }

    #[test]
    fn punctuation_runs_count_as_one_boundary() {
        let (sentences, remainder) = extract_complete_sentences("Wait what?! I had no idea. Wow");
        assert_eq!(sentences, vec!["Wait what?! ", "I had no idea. "]);
        assert_eq!(remainder, "Wow");
    }

    #[test]
    fn period_without_whitespace_is_not_a_boundary() {
        let (sentences, remainder) = extract_complete_sentences("Version 2.5 is out");
        assert!(sentences.is_empty());
        assert_eq!(remainder, "Version 2.5 is out");
    }

    #[test]
    fn incremental_matches_single_pass() {
        let text = "I found two hoodies. The Cloud Hoodie is $50! Would you like details? Let me know";
        let deltas = ["I found t", "wo hoodies. The Cloud H", "oodie is $50! ", "Would you like details? Let me k", "now"];
        assert_eq!(deltas.concat(), text);

        let (incremental, inc_remainder) = collect_incremental(&deltas);
        let (single, remainder) = extract_complete_sentences(text);

        assert_eq!(incremental.concat(), single.concat());
        assert_eq!(inc_remainder, remainder);
        assert_eq!(remainder, "Let me know");
    }

    #[test]
    fn incremental_never_re_emits() {
        let mut chunker = SentenceChunker::new();
        let first = chunker.push("One sentence here. And ano");
        assert_eq!(first, vec!["One sentence here. "]);
        let second = chunker.push("ther one. ");
        assert_eq!(second, vec!["And another one. "]);
        assert!(chunker.push("").is_empty());
    }

    #[test]
    fn flush_drains_unterminated_buffer() {
        let mut chunker = SentenceChunker::new();
        assert!(chunker.push("Cloud Hoodie ($50) and Rebel Hoodie ($85).").is_empty());
        assert_eq!(
            chunker.flush().as_deref(),
            Some("Cloud Hoodie ($50) and Rebel Hoodie ($85).")
        );
        assert!(chunker.flush().is_none());
    }

    #[test]
    fn flush_ignores_whitespace_only_buffer() {
        let mut chunker = SentenceChunker::new();
        chunker.push("   ");
        assert!(chunker.flush().is_none());
    }

    #[test]
    fn consecutive_abbreviations_fold_forward() {
        let (sentences, remainder) =
            extract_complete_sentences("Dr. Smith arrived. Dr. Jones left. ");
        assert_eq!(sentences, vec!["Dr. Smith arrived. ", "Dr. Jones left. "]);
        assert_eq!(remainder, "");
    }
}
