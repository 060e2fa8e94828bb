use crate::operation::{char_len, char_slice, Operation};

/// Inclusion transformation: rewrites an operation so it applies after a concurrent one.
///
/// `target` and `reference` must have been generated against the same document state. The
/// result expresses `target` against the state reached after applying `reference`. When both
/// edits land on the same position, `target_has_priority == true` orders the target's
/// effect first.
pub trait InclusionTransformation {
    fn transform(
        &self,
        target: &Operation,
        reference: &Operation,
        target_has_priority: bool,
    ) -> Operation;

    /// Adjusts a bare char offset (cursor, selection bound) the same way.
    fn transform_index(&self, index: usize, reference: &Operation, index_has_priority: bool)
        -> usize;
}

/// Text inclusion transformation over Insert/Delete/Split.
#[derive(Clone, Copy, Debug, Default)]
pub struct GotoTransformation;

impl InclusionTransformation for GotoTransformation {
    fn transform(
        &self,
        target: &Operation,
        reference: &Operation,
        target_has_priority: bool,
    ) -> Operation {
        match (target, reference) {
            (Operation::Split { first, second }, _) => {
                // `second` lives in the state after `first`, so the reference has to be
                // moved into that state before transforming `second` against it.
                let first_t = self.transform(first, reference, target_has_priority);
                let reference_t = self.transform(reference, first, !target_has_priority);
                let second_t = self.transform(second, &reference_t, target_has_priority);
                Operation::split(first_t, second_t)
            }
            (_, Operation::Split { first, second }) => {
                let partial = self.transform(target, first, target_has_priority);
                self.transform(&partial, second, target_has_priority)
            }
            (Operation::NoOp | Operation::Timestamp, _)
            | (_, Operation::NoOp | Operation::Timestamp) => target.clone(),
            (
                Operation::Insert { position, text },
                Operation::Insert {
                    position: ref_position,
                    text: ref_text,
                },
            ) => {
                if *position < *ref_position || (*position == *ref_position && target_has_priority)
                {
                    target.clone()
                } else {
                    Operation::insert(position + char_len(ref_text), text.clone())
                }
            }
            (
                Operation::Insert { position, text },
                Operation::Delete {
                    position: ref_position,
                    text: ref_text,
                },
            ) => insert_after_delete(*position, text, *ref_position, char_len(ref_text)),
            (
                Operation::Delete { position, text },
                Operation::Insert {
                    position: ref_position,
                    text: ref_text,
                },
            ) => delete_after_insert(*position, text, *ref_position, char_len(ref_text)),
            (
                Operation::Delete { position, text },
                Operation::Delete {
                    position: ref_position,
                    text: ref_text,
                },
            ) => delete_after_delete(*position, text, *ref_position, char_len(ref_text)),
        }
    }

    fn transform_index(
        &self,
        index: usize,
        reference: &Operation,
        index_has_priority: bool,
    ) -> usize {
        match reference {
            Operation::Insert { position, text } => {
                if index < *position || (index == *position && index_has_priority) {
                    index
                } else {
                    index + char_len(text)
                }
            }
            Operation::Delete { position, text } => {
                let end = position + char_len(text);
                if index <= *position {
                    index
                } else if index >= end {
                    index - char_len(text)
                } else {
                    *position
                }
            }
            Operation::Split { first, second } => {
                let partial = self.transform_index(index, first, index_has_priority);
                self.transform_index(partial, second, index_has_priority)
            }
            Operation::NoOp | Operation::Timestamp => index,
        }
    }
}

fn insert_after_delete(position: usize, text: &str, del_position: usize, del_len: usize) -> Operation {
    if position <= del_position {
        Operation::insert(position, text)
    } else if position >= del_position + del_len {
        Operation::insert(position - del_len, text)
    } else {
        // Inside the deleted range: the inserted text survives at the gap.
        Operation::insert(del_position, text)
    }
}

fn delete_after_insert(position: usize, text: &str, ins_position: usize, ins_len: usize) -> Operation {
    let len = char_len(text);
    if ins_position >= position + len {
        Operation::delete(position, text)
    } else if ins_position <= position {
        Operation::delete(position + ins_len, text)
    } else {
        // The insert lands inside the range: delete around it, head first.
        let cut = ins_position - position;
        Operation::split(
            Operation::delete(position, char_slice(text, 0, cut)),
            Operation::delete(position + ins_len, char_slice(text, cut, len)),
        )
    }
}

fn delete_after_delete(position: usize, text: &str, ref_position: usize, ref_len: usize) -> Operation {
    let len = char_len(text);
    let end = position + len;
    let ref_end = ref_position + ref_len;
    if ref_position >= end {
        Operation::delete(position, text)
    } else if ref_end <= position {
        Operation::delete(position - ref_len, text)
    } else {
        let head = char_slice(text, 0, ref_position.saturating_sub(position));
        let tail = char_slice(text, (ref_end - position).min(len), len);
        let remaining = head + &tail;
        if remaining.is_empty() {
            Operation::NoOp
        } else {
            Operation::delete(position.min(ref_position), remaining)
        }
    }
}
