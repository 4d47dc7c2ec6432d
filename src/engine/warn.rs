/// A recoverable, per-item problem worth surfacing to operators.
pub struct WarnEvent<'a> {
    pub code: &'a str,
    pub stage: &'a str,
    pub batch: usize,
    pub message: Option<u64>,
    pub reason: &'a str,
}

pub fn emit(event: WarnEvent<'_>) {
    let message_id = event
        .message
        .map(|id| id.to_string())
        .unwrap_or_else(|| "na".to_string());
    tracing::warn!(
        code = event.code,
        stage = event.stage,
        batch = event.batch + 1,
        message_id = %message_id,
        reason = event.reason,
        "item dropped"
    );
}
