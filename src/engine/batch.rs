use crate::engine::types::{CandidateMessage, CandidateType, MessageId};
use crate::error::{ClassifierError, ClassifierResult};

#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub index: usize,
    pub candidate_type: CandidateType,
    pub candidates: Vec<CandidateMessage>,
    pub estimated_tokens: usize,
}

impl Batch {
    pub fn message_ids(&self) -> Vec<MessageId> {
        self.candidates.iter().map(|c| c.message_id).collect()
    }

    pub fn candidate(&self, message_id: MessageId) -> Option<&CandidateMessage> {
        self.candidates.iter().find(|c| c.message_id == message_id)
    }
}

/// Group candidates into type-homogeneous batches of at most
/// `max_batch_candidates`, preserving input order inside each type.
/// Suggestions come before agreements.
///
/// `estimate_prompt_tokens` measures the fully rendered prompt; a batch
/// over `max_batch_tokens` is a configuration error and fails the whole
/// build rather than being split or truncated.
pub fn build_batches<F>(
    candidates: &[CandidateMessage],
    max_batch_candidates: usize,
    max_batch_tokens: usize,
    estimate_prompt_tokens: F,
) -> ClassifierResult<Vec<Batch>>
where
    F: Fn(CandidateType, &[CandidateMessage]) -> usize,
{
    if max_batch_candidates == 0 {
        return Err(ClassifierError::InvalidRequest(
            "batch size must be at least 1".to_string(),
        ));
    }

    let mut batches = Vec::new();
    for kind in [CandidateType::Suggestion, CandidateType::Agreement] {
        let partition: Vec<CandidateMessage> = candidates
            .iter()
            .filter(|c| c.candidate_type == kind)
            .cloned()
            .collect();

        for chunk in partition.chunks(max_batch_candidates) {
            let estimated_tokens = estimate_prompt_tokens(kind, chunk);
            let index = batches.len();
            if estimated_tokens > max_batch_tokens {
                return Err(ClassifierError::InvalidRequest(format!(
                    "batch {} ({} {} candidates) renders to ~{} tokens, over the {} token ceiling; lower the batch size",
                    index + 1,
                    chunk.len(),
                    kind.label(),
                    estimated_tokens,
                    max_batch_tokens
                )));
            }
            batches.push(Batch {
                index,
                candidate_type: kind,
                candidates: chunk.to_vec(),
                estimated_tokens,
            });
        }
    }
    Ok(batches)
}
