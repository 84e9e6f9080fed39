//! Helpers for inspecting the events a run published

use bim_acquire::{PipelineEvent, Stage, Subscription};

/// Drain everything already published to `events`
pub fn drain<M>(events: &mut Subscription<M>) -> Vec<PipelineEvent<M>> {
    std::iter::from_fn(|| events.try_recv()).collect()
}

/// Number of completion events in `events`
pub fn finished_count<M>(events: &[PipelineEvent<M>]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, PipelineEvent::ProcessingFinished { .. }))
        .count()
}

/// Stages reported as completed, in publication order
pub fn completed_stages<M>(events: &[PipelineEvent<M>]) -> Vec<Stage> {
    events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::StageCompleted { stage, .. } => Some(*stage),
            _ => None,
        })
        .collect()
}

/// The single failure event in `events`, as `(stage, code)`
pub fn single_failure<M>(events: &[PipelineEvent<M>]) -> (Stage, &'static str) {
    let failures: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::RunFailed { stage, code, .. } => Some((*stage, *code)),
            _ => None,
        })
        .collect();
    assert_eq!(failures.len(), 1, "expected exactly one RunFailed, got {events:?}");
    failures[0]
}
