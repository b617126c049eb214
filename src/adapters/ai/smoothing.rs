//! Word-sized chunking of streamed text.
//!
//! Providers emit text in arbitrary fragments. The chunker re-cuts them so
//! each chunk is one word plus the whitespace character that ends it.
//! Concatenating every chunk and the final flush reproduces the input
//! exactly.

/// Buffers text deltas and releases them a word at a time.
#[derive(Debug, Default)]
pub struct WordChunker {
    buffer: String,
}

impl WordChunker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a delta and return every chunk it completes.
    ///
    /// A chunk is the shortest prefix of the buffer that ends in a
    /// whitespace character following at least one non-whitespace one.
    pub fn push(&mut self, delta: &str) -> Vec<String> {
        self.buffer.push_str(delta);

        let mut chunks = Vec::new();
        let mut start = 0;
        let mut seen_word = false;

        for (index, c) in self.buffer.char_indices() {
            if !c.is_whitespace() {
                seen_word = true;
            } else if seen_word {
                let end = index + c.len_utf8();
                chunks.push(self.buffer[start..end].to_string());
                start = end;
                seen_word = false;
            }
        }

        self.buffer.drain(..start);
        chunks
    }

    /// Release whatever is buffered.
    pub fn flush(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buffer))
        }
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn splits_on_word_boundaries() {
        let mut chunker = WordChunker::new();
        assert_eq!(chunker.push("Hello wor"), vec!["Hello "]);
        assert_eq!(chunker.push("ld, how are"), vec!["world, ", "how "]);
        assert_eq!(chunker.flush(), Some("are".to_string()));
        assert_eq!(chunker.flush(), None);
    }

    #[test]
    fn leading_whitespace_joins_the_next_word() {
        let mut chunker = WordChunker::new();
        assert!(chunker.push("  ").is_empty());
        assert_eq!(chunker.push("hi\n\nthere"), vec!["  hi\n"]);
        assert_eq!(chunker.flush(), Some("\nthere".to_string()));
    }

    #[test]
    fn handles_multibyte_characters() {
        let mut chunker = WordChunker::new();
        assert_eq!(chunker.push("héllo wörld "), vec!["héllo ", "wörld "]);
        assert!(chunker.is_empty());
    }

    proptest! {
        #[test]
        fn chunking_preserves_concatenation(pieces in prop::collection::vec(".{0,12}", 0..20)) {
            let mut chunker = WordChunker::new();
            let mut output = String::new();

            for piece in &pieces {
                for chunk in chunker.push(piece) {
                    prop_assert!(chunk.ends_with(char::is_whitespace));
                    output.push_str(&chunk);
                }
            }
            if let Some(rest) = chunker.flush() {
                output.push_str(&rest);
            }

            prop_assert_eq!(output, pieces.concat());
        }
    }
}
