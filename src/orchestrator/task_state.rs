use serde::{Deserialize, Serialize};
use statig::prelude::*;

use super::motion::MotionStep;
use super::types::TaskError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Store,
    Retrieve,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Store => "store",
            TaskKind::Retrieve => "retrieve",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPhase {
    Pending,
    Reserved,
    Identifying,
    Identified,
    Moving,
    Committing,
    Completed,
    Aborted,
    Failed,
}

impl TaskPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskPhase::Completed | TaskPhase::Aborted | TaskPhase::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPhase::Pending => "pending",
            TaskPhase::Reserved => "reserved",
            TaskPhase::Identifying => "identifying",
            TaskPhase::Identified => "identified",
            TaskPhase::Moving => "moving",
            TaskPhase::Committing => "committing",
            TaskPhase::Completed => "completed",
            TaskPhase::Aborted => "aborted",
            TaskPhase::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TaskPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
    /// Slot validated while holding the workcell
    Reserve,
    StartIdentification,
    Identified { product_code: String },
    NotIdentified,
    StartMotion,
    MotionComplete,
    Committed,
    Fail { step: Option<MotionStep> },
}

impl TaskEvent {
    pub fn name(&self) -> &'static str {
        match self {
            TaskEvent::Reserve => "reserve",
            TaskEvent::StartIdentification => "start_identification",
            TaskEvent::Identified { .. } => "identified",
            TaskEvent::NotIdentified => "not_identified",
            TaskEvent::StartMotion => "start_motion",
            TaskEvent::MotionComplete => "motion_complete",
            TaskEvent::Committed => "committed",
            TaskEvent::Fail { .. } => "fail",
        }
    }
}

/// In-memory control sequence of one store or retrieve task
#[derive(Debug)]
pub struct TaskStateMachine {
    kind: TaskKind,
    slot: String,
    phase: TaskPhase,
    product_code: Option<String>,
    failed_at: Option<MotionStep>,
}

impl TaskStateMachine {
    pub fn new(kind: TaskKind, slot: impl Into<String>) -> Self {
        Self {
            kind,
            slot: slot.into(),
            phase: TaskPhase::Pending,
            product_code: None,
            failed_at: None,
        }
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn slot(&self) -> &str {
        &self.slot
    }

    pub fn phase(&self) -> TaskPhase {
        self.phase
    }

    pub fn product_code(&self) -> Option<&str> {
        self.product_code.as_deref()
    }

    pub fn failed_at(&self) -> Option<MotionStep> {
        self.failed_at
    }

    fn enter(&mut self, phase: TaskPhase) {
        tracing::debug!(
            task = self.kind.as_str(),
            slot = %self.slot,
            from = ?self.phase,
            to = ?phase,
            "Task phase change"
        );
        self.phase = phase;
    }

    fn ignore(&self, event: &TaskEvent) -> Outcome<State> {
        tracing::warn!(
            task = self.kind.as_str(),
            slot = %self.slot,
            phase = ?self.phase,
            event = ?event,
            "Ignoring event not valid in this phase"
        );
        Handled
    }

    fn fail(&mut self, step: Option<MotionStep>) -> Outcome<State> {
        self.failed_at = step;
        self.enter(TaskPhase::Failed);
        Transition(State::failed())
    }
}

/// Feed `event` to `task` and require it to land in `expected`.
///
/// The orchestrator only takes the next step of a task (moving the arm,
/// committing the slot) once this succeeded.
pub fn advance(
    task: &mut StateMachine<TaskStateMachine>,
    event: &TaskEvent,
    expected: TaskPhase,
) -> Result<(), TaskError> {
    let before = task.inner().phase();
    task.handle(event);
    let after = task.inner().phase();
    if after == expected {
        return Ok(());
    }
    Err(TaskError::OutOfSequence {
        slot: task.inner().slot().to_string(),
        phase: before,
        event: event.name(),
    })
}

#[state_machine(initial = "State::pending()")]
impl TaskStateMachine {
    #[state]
    fn pending(&mut self, event: &TaskEvent) -> Outcome<State> {
        match event {
            TaskEvent::Reserve => {
                self.enter(TaskPhase::Reserved);
                Transition(State::reserved())
            }
            TaskEvent::Fail { step } => self.fail(*step),
            _ => self.ignore(event),
        }
    }

    #[state]
    fn reserved(&mut self, event: &TaskEvent) -> Outcome<State> {
        match event {
            TaskEvent::StartIdentification if self.kind == TaskKind::Store => {
                self.enter(TaskPhase::Identifying);
                Transition(State::identifying())
            }
            // retrieve goes straight to motion
            TaskEvent::StartMotion if self.kind == TaskKind::Retrieve => {
                self.enter(TaskPhase::Moving);
                Transition(State::moving())
            }
            TaskEvent::Fail { step } => self.fail(*step),
            _ => self.ignore(event),
        }
    }

    #[state]
    fn identifying(&mut self, event: &TaskEvent) -> Outcome<State> {
        match event {
            TaskEvent::Identified { product_code } => {
                self.product_code = Some(product_code.clone());
                self.enter(TaskPhase::Identified);
                Transition(State::identified())
            }
            TaskEvent::NotIdentified => {
                self.enter(TaskPhase::Aborted);
                Transition(State::aborted())
            }
            TaskEvent::Fail { step } => self.fail(*step),
            _ => self.ignore(event),
        }
    }

    #[state]
    fn identified(&mut self, event: &TaskEvent) -> Outcome<State> {
        match event {
            TaskEvent::StartMotion => {
                self.enter(TaskPhase::Moving);
                Transition(State::moving())
            }
            TaskEvent::Fail { step } => self.fail(*step),
            _ => self.ignore(event),
        }
    }

    #[state]
    fn moving(&mut self, event: &TaskEvent) -> Outcome<State> {
        match event {
            TaskEvent::MotionComplete => {
                self.enter(TaskPhase::Committing);
                Transition(State::committing())
            }
            TaskEvent::Fail { step } => self.fail(*step),
            _ => self.ignore(event),
        }
    }

    #[state]
    fn committing(&mut self, event: &TaskEvent) -> Outcome<State> {
        match event {
            TaskEvent::Committed => {
                self.enter(TaskPhase::Completed);
                Transition(State::completed())
            }
            TaskEvent::Fail { step } => self.fail(*step),
            _ => self.ignore(event),
        }
    }

    #[state]
    fn completed(&mut self, event: &TaskEvent) -> Outcome<State> {
        self.ignore(event)
    }

    #[state]
    fn aborted(&mut self, event: &TaskEvent) -> Outcome<State> {
        self.ignore(event)
    }

    #[state]
    fn failed(&mut self, event: &TaskEvent) -> Outcome<State> {
        self.ignore(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::TaskErrorKind;

    #[test]
    fn test_store_happy_path() {
        let mut sm = TaskStateMachine::new(TaskKind::Store, "A1").state_machine();
        sm.handle(&TaskEvent::Reserve);
        sm.handle(&TaskEvent::StartIdentification);
        sm.handle(&TaskEvent::Identified {
            product_code: "SKU123".to_string(),
        });
        sm.handle(&TaskEvent::StartMotion);
        sm.handle(&TaskEvent::MotionComplete);
        sm.handle(&TaskEvent::Committed);

        assert_eq!(sm.inner().phase(), TaskPhase::Completed);
        assert_eq!(sm.inner().product_code(), Some("SKU123"));
    }

    #[test]
    fn test_not_identified_aborts() {
        let mut sm = TaskStateMachine::new(TaskKind::Store, "A1").state_machine();
        sm.handle(&TaskEvent::Reserve);
        sm.handle(&TaskEvent::StartIdentification);
        sm.handle(&TaskEvent::NotIdentified);
        // terminal: later events change nothing
        sm.handle(&TaskEvent::StartMotion);

        assert_eq!(sm.inner().phase(), TaskPhase::Aborted);
        assert!(sm.inner().phase().is_terminal());
    }

    #[test]
    fn test_retrieve_skips_identification() {
        let mut sm = TaskStateMachine::new(TaskKind::Retrieve, "B1").state_machine();
        sm.handle(&TaskEvent::Reserve);
        sm.handle(&TaskEvent::StartIdentification);
        assert_eq!(sm.inner().phase(), TaskPhase::Reserved);

        sm.handle(&TaskEvent::StartMotion);
        sm.handle(&TaskEvent::Fail {
            step: Some(MotionStep::DescendIntoSlot),
        });
        assert_eq!(sm.inner().phase(), TaskPhase::Failed);
        assert_eq!(sm.inner().failed_at(), Some(MotionStep::DescendIntoSlot));
    }

    #[test]
    fn test_cannot_commit_without_motion() {
        let mut sm = TaskStateMachine::new(TaskKind::Store, "A1").state_machine();
        sm.handle(&TaskEvent::Reserve);
        sm.handle(&TaskEvent::Committed);
        assert_eq!(sm.inner().phase(), TaskPhase::Reserved);
    }

    #[test]
    fn test_advance_refuses_out_of_order_events() {
        let mut sm = TaskStateMachine::new(TaskKind::Store, "A1").state_machine();
        advance(&mut sm, &TaskEvent::Reserve, TaskPhase::Reserved).unwrap();

        // a store may not start moving before it identified the item
        let err = advance(&mut sm, &TaskEvent::StartMotion, TaskPhase::Moving).unwrap_err();
        match &err {
            TaskError::OutOfSequence { slot, phase, event } => {
                assert_eq!(slot, "A1");
                assert_eq!(*phase, TaskPhase::Reserved);
                assert_eq!(*event, "start_motion");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.kind(), TaskErrorKind::Internal);
        assert_eq!(sm.inner().phase(), TaskPhase::Reserved);

        let err = advance(&mut sm, &TaskEvent::MotionComplete, TaskPhase::Committing).unwrap_err();
        assert!(matches!(err, TaskError::OutOfSequence { .. }));
    }

    #[test]
    fn test_advance_through_retrieve() {
        let mut sm = TaskStateMachine::new(TaskKind::Retrieve, "B1").state_machine();
        advance(&mut sm, &TaskEvent::Reserve, TaskPhase::Reserved).unwrap();
        advance(&mut sm, &TaskEvent::StartMotion, TaskPhase::Moving).unwrap();
        advance(&mut sm, &TaskEvent::MotionComplete, TaskPhase::Committing).unwrap();
        advance(&mut sm, &TaskEvent::Committed, TaskPhase::Completed).unwrap();
        assert!(sm.inner().phase().is_terminal());
    }
}
