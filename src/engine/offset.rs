use crate::engine::types::{CandidateMessage, ContextMessage, ResolvedMessage};
use crate::error::{ClassifierError, ClassifierResult};

/// Map a candidate plus a signed offset onto the message it refers to.
///
/// `0` is the candidate itself, negative offsets count back from the end
/// of `context_before` (`-1` is the most recent), positive offsets count
/// forward from the start of `context_after`. Out-of-range offsets are an
/// error; they are never clamped.
pub fn resolve(candidate: &CandidateMessage, offset: i64) -> ClassifierResult<ResolvedMessage> {
    if offset == 0 {
        return Ok(ResolvedMessage {
            id: candidate.message_id,
            sender: candidate.sender.clone(),
            timestamp: candidate.timestamp,
            content: candidate.content.clone(),
        });
    }

    let (context, index) = if offset < 0 {
        let before = &candidate.context_before;
        let back = offset.unsigned_abs() as usize;
        (before, before.len().checked_sub(back))
    } else {
        let after = &candidate.context_after;
        let forward = offset as usize;
        let index = if forward <= after.len() {
            Some(forward - 1)
        } else {
            None
        };
        (after, index)
    };

    match index.and_then(|i| context.get(i)) {
        Some(msg) => Ok(from_context(msg)),
        None => Err(ClassifierError::InvalidOffset {
            offset,
            available: context.len(),
        }),
    }
}

fn from_context(msg: &ContextMessage) -> ResolvedMessage {
    ResolvedMessage {
        id: msg.id,
        sender: msg.sender.clone(),
        timestamp: msg.timestamp,
        content: msg.content.clone(),
    }
}
