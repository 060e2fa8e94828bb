use ropey::Rope;

use crate::checksum::DocumentChecksum;
use crate::error::{Error, Result};
use crate::operation::{char_len, Operation};

/// In-memory plain-text buffer addressed in chars.
#[derive(Clone, Debug, Default)]
pub struct TextDocument {
    rope: Rope,
}

impl TextDocument {
    pub fn new(content: &str) -> Self {
        Self {
            rope: Rope::from_str(content),
        }
    }

    pub fn len_chars(&self) -> usize {
        self.rope.len_chars()
    }

    pub fn is_empty(&self) -> bool {
        self.rope.len_chars() == 0
    }

    pub fn content(&self) -> String {
        self.rope.to_string()
    }

    pub fn rope(&self) -> &Rope {
        &self.rope
    }

    /// Applies every primitive edit of `op`; on error the document is left unchanged.
    pub fn apply(&mut self, op: &Operation) -> Result<()> {
        let mut next = self.rope.clone();
        for edit in op.text_operations() {
            match edit {
                Operation::Insert { position, text } => {
                    check_bounds(position, 0, next.len_chars())?;
                    next.insert(position, &text);
                }
                Operation::Delete { position, text } => {
                    let len = char_len(&text);
                    check_bounds(position, len, next.len_chars())?;
                    next.remove(position..position + len);
                }
                _ => {}
            }
        }
        self.rope = next;
        Ok(())
    }

    /// Replaces the whole content, e.g. when resynchronizing from the host.
    pub fn replace(&mut self, content: &str) {
        self.rope = Rope::from_str(content);
    }

    pub fn checksum(&self) -> DocumentChecksum {
        DocumentChecksum::of_rope(&self.rope)
    }
}

fn check_bounds(position: usize, len: usize, doc_len: usize) -> Result<()> {
    if position + len > doc_len {
        return Err(Error::OutOfBounds {
            position,
            len,
            doc_len,
        });
    }
    Ok(())
}
