#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A single edit to a plain-text document.
///
/// Positions and lengths count chars (Unicode scalar values), never bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Operation {
    Insert {
        position: usize,
        text: String,
    },
    /// Deletes `text`, which must be the content found at `position`.
    Delete {
        position: usize,
        text: String,
    },
    /// Two edits applied one after the other: `second` is expressed against the state left
    /// by `first`.
    ///
    /// Only produced by transformation, when one edit has to be divided around a concurrent
    /// one.
    Split {
        first: Box<Operation>,
        second: Box<Operation>,
    },
    NoOp,
    /// Carries only a vector time, e.g. to acknowledge without editing.
    Timestamp,
}

impl Operation {
    pub fn insert(position: usize, text: impl Into<String>) -> Self {
        Operation::Insert {
            position,
            text: text.into(),
        }
    }

    pub fn delete(position: usize, text: impl Into<String>) -> Self {
        Operation::Delete {
            position,
            text: text.into(),
        }
    }

    pub(crate) fn split(first: Operation, second: Operation) -> Self {
        Operation::Split {
            first: Box::new(first),
            second: Box::new(second),
        }
    }

    /// Number of chars inserted or deleted by a primitive edit; 0 otherwise.
    pub fn text_len(&self) -> usize {
        match self {
            Operation::Insert { text, .. } | Operation::Delete { text, .. } => char_len(text),
            _ => 0,
        }
    }

    /// Net change of the document length once this operation is applied.
    pub fn len_delta(&self) -> isize {
        match self {
            Operation::Insert { text, .. } => char_len(text) as isize,
            Operation::Delete { text, .. } => -(char_len(text) as isize),
            Operation::Split { first, second } => first.len_delta() + second.len_delta(),
            Operation::NoOp | Operation::Timestamp => 0,
        }
    }

    /// Whether applying this operation leaves every document unchanged.
    pub fn is_noop(&self) -> bool {
        match self {
            Operation::Insert { text, .. } | Operation::Delete { text, .. } => text.is_empty(),
            Operation::Split { first, second } => first.is_noop() && second.is_noop(),
            Operation::NoOp | Operation::Timestamp => true,
        }
    }

    /// Flattens into primitive inserts and deletes, in application order.
    ///
    /// Each returned edit is expressed against the state left by the previous one. Empty
    /// edits are dropped.
    pub fn text_operations(&self) -> Vec<Operation> {
        let mut out = Vec::new();
        self.collect_text_operations(&mut out);
        out
    }

    fn collect_text_operations(&self, out: &mut Vec<Operation>) {
        match self {
            Operation::Insert { text, .. } | Operation::Delete { text, .. } => {
                if !text.is_empty() {
                    out.push(self.clone());
                }
            }
            Operation::Split { first, second } => {
                first.collect_text_operations(out);
                second.collect_text_operations(out);
            }
            Operation::NoOp | Operation::Timestamp => {}
        }
    }

    /// The operation that reverts this one when applied to the resulting document.
    pub fn invert(&self) -> Operation {
        match self {
            Operation::Insert { position, text } => Operation::delete(*position, text.clone()),
            Operation::Delete { position, text } => Operation::insert(*position, text.clone()),
            Operation::Split { first, second } => Operation::split(second.invert(), first.invert()),
            Operation::NoOp => Operation::NoOp,
            Operation::Timestamp => Operation::Timestamp,
        }
    }
}

pub(crate) fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Chars `start..end` of `text`.
pub(crate) fn char_slice(text: &str, start: usize, end: usize) -> String {
    text.chars().skip(start).take(end.saturating_sub(start)).collect()
}
