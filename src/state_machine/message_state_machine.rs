use super::{
    errors::{StateMachineError, StateMachineResult},
    events::MessageEvent,
    states::QueueStatus,
};

/// Transition table for message records
///
/// ```text
/// UNTRIED ──────────┬─ succeed ─────────────▶ PROCESSED
///                   ├─ fail / unroutable ───▶ FAILED
///                   ├─ exhaust ─────────────▶ FAILED
///                   └─ requeue ─────────────▶ QUEUED_FOR_RETRY
/// QUEUED_FOR_RETRY ─┴─ (same four edges, requeue loops back)
/// any but PROCESSED ── force_retry ─────────▶ QUEUED_FOR_RETRY
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageStateMachine;

impl MessageStateMachine {
    pub fn new() -> Self {
        Self
    }

    /// Determine the target state based on current state and event
    pub fn determine_target_state(
        &self,
        current_state: QueueStatus,
        event: &MessageEvent,
    ) -> StateMachineResult<QueueStatus> {
        use QueueStatus::*;

        let target = match (current_state, event) {
            (Untried | QueuedForRetry, MessageEvent::Succeed) => Processed,

            (Untried | QueuedForRetry, MessageEvent::FailPermanently(_)) => Failed,
            (Untried | QueuedForRetry, MessageEvent::Unroutable) => Failed,
            (Untried | QueuedForRetry, MessageEvent::Exhaust(_)) => Failed,

            (Untried | QueuedForRetry, MessageEvent::RequeueTransient(_)) => QueuedForRetry,

            // Operator override; a processed message is never re-run
            (Untried | QueuedForRetry | Failed, MessageEvent::ForceRetry) => QueuedForRetry,

            (from_state, _) => {
                return Err(StateMachineError::InvalidTransition {
                    from: from_state.to_string(),
                    event: event.event_type().to_string(),
                })
            }
        };

        Ok(target)
    }

    /// Whether `event` is accepted from `current_state`
    pub fn can_transition(&self, current_state: QueueStatus, event: &MessageEvent) -> bool {
        self.determine_target_state(current_state, event).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_events() -> Vec<MessageEvent> {
        vec![
            MessageEvent::Succeed,
            MessageEvent::FailPermanently("bad request".to_string()),
            MessageEvent::Unroutable,
            MessageEvent::RequeueTransient("downstream unavailable".to_string()),
            MessageEvent::Exhaust("downstream unavailable".to_string()),
            MessageEvent::ForceRetry,
        ]
    }

    #[test]
    fn test_pending_states_only_reach_known_states() {
        let machine = MessageStateMachine::new();
        for from in [QueueStatus::Untried, QueueStatus::QueuedForRetry] {
            for event in all_events() {
                let target = machine.determine_target_state(from, &event).unwrap();
                assert!(matches!(
                    target,
                    QueueStatus::Processed | QueueStatus::Failed | QueueStatus::QueuedForRetry
                ));
            }
        }
    }

    #[test]
    fn test_terminal_states_only_allow_manual_override() {
        let machine = MessageStateMachine::new();
        for event in all_events() {
            let from_processed = machine.determine_target_state(QueueStatus::Processed, &event);
            assert!(from_processed.is_err(), "PROCESSED accepted {event:?}");

            let from_failed = machine.determine_target_state(QueueStatus::Failed, &event);
            if event == MessageEvent::ForceRetry {
                assert_eq!(from_failed.unwrap(), QueueStatus::QueuedForRetry);
            } else {
                assert!(from_failed.is_err(), "FAILED accepted {event:?}");
            }
        }
    }

    #[test]
    fn test_outcome_transitions() {
        let machine = MessageStateMachine::new();
        assert_eq!(
            machine
                .determine_target_state(QueueStatus::Untried, &MessageEvent::Succeed)
                .unwrap(),
            QueueStatus::Processed
        );
        assert_eq!(
            machine
                .determine_target_state(
                    QueueStatus::QueuedForRetry,
                    &MessageEvent::RequeueTransient("timeout".to_string())
                )
                .unwrap(),
            QueueStatus::QueuedForRetry
        );
        assert_eq!(
            machine
                .determine_target_state(QueueStatus::Untried, &MessageEvent::Unroutable)
                .unwrap(),
            QueueStatus::Failed
        );
    }

    #[test]
    fn test_invalid_transition_error_message() {
        let err = MessageStateMachine::new()
            .determine_target_state(QueueStatus::Processed, &MessageEvent::ForceRetry)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid state transition from PROCESSED on event force_retry"
        );
    }
}
