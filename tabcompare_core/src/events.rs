use crossbeam::channel::{Receiver, Sender};
use serde::Serialize;
use tabcompare_common::RunState;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub stage: RunState,
    pub detail: String,
    /// Datasets handled so far in this stage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
}

impl ProgressEvent {
    pub fn stage(stage: RunState, detail: impl Into<String>) -> Self {
        Self {
            stage,
            detail: detail.into(),
            current: None,
            total: None,
        }
    }

    pub fn step(stage: RunState, detail: impl Into<String>, current: usize, total: usize) -> Self {
        Self {
            stage,
            detail: detail.into(),
            current: Some(current),
            total: Some(total),
        }
    }
}

pub type ProgressTx = Sender<ProgressEvent>;
pub type ProgressRx = Receiver<ProgressEvent>;

/// Send an event if anyone is listening; a dropped receiver is not an error
pub(crate) fn emit(progress: Option<&ProgressTx>, event: ProgressEvent) {
    if let Some(tx) = progress {
        let _ = tx.send(event);
    }
}
