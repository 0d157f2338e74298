//! Executed schedule annotation and validation.
//!
//! The looper thread runs `uv_run` iterations, each one a fixed sequence of
//! inner stages bracketed by `MARKER_<stage>_BEGIN` / `MARKER_<stage>_END`
//! records. Walking the executed callbacks in execution order tells us which
//! iteration and stage each one ran in, and whether the whole run looks like
//! something libuv could have produced.

use super::callback_tree::{CallbackTraceTree, NodeId};
use crate::parser::{CallbackRecord, CallbackType, LoopStage};
use crate::utils::error::ScheduleError;
use log::debug;

/// Where in the event loop an executed callback ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleStage {
    /// Inside (or, for an end marker, just closing) this loop stage
    Loop(LoopStage),

    /// At or after the process `EXIT` callback
    Exiting,
}

/// One executed callback with its place in the event loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleEvent {
    pub node: NodeId,

    /// 0-based `uv_run` iteration; `None` before the first one begins, and
    /// always for threadpool work and the initial stack
    pub loop_iteration: Option<usize>,

    /// Stage of the most recent marker; `None` where `loop_iteration` is
    pub stage: Option<ScheduleStage>,
}

/// Annotate the executed schedule with loop iteration and stage
///
/// **Public** - main entry point for schedule annotation
///
/// Markers carry their own stage. Other looper callbacks inherit the stage of
/// the most recent marker, begin or end. Threadpool callbacks and the initial
/// stack are left unannotated.
pub fn annotate_schedule(tree: &CallbackTraceTree) -> Vec<ScheduleEvent> {
    let mut iteration: Option<usize> = None;
    let mut stage: Option<ScheduleStage> = None;

    tree.executed_schedule()
        .into_iter()
        .map(|node| {
            let cb_type = &tree.record(node).cb_type;
            match cb_type {
                _ if cb_type.is_threadpool() => ScheduleEvent::unplaced(node),
                CallbackType::InitialStack => ScheduleEvent::unplaced(node),
                CallbackType::ProcessExit => {
                    stage = Some(ScheduleStage::Exiting);
                    ScheduleEvent { node, loop_iteration: iteration, stage }
                }
                CallbackType::Marker { stage: marker, boundary } => {
                    if *marker == LoopStage::UvRun && cb_type.is_begin_marker() {
                        iteration = Some(iteration.map_or(0, |i| i + 1));
                    }
                    debug!("Marker {:?} {:?} in iteration {:?}", marker, boundary, iteration);
                    stage = Some(ScheduleStage::Loop(*marker));
                    ScheduleEvent { node, loop_iteration: iteration, stage }
                }
                _ => ScheduleEvent { node, loop_iteration: iteration, stage },
            }
        })
        .collect()
}

impl ScheduleEvent {
    fn unplaced(node: NodeId) -> Self {
        Self {
            node,
            loop_iteration: None,
            stage: None,
        }
    }
}

/// Check that the executed schedule looks like a legal libuv run
///
/// **Public** - main entry point for schedule validation
///
/// # Rules
/// 1. Execution ids are exactly 0, 1, 2, ... in execution order
/// 2. `INITIAL_STACK` runs first
/// 3. Stages open and close in libuv's order: `UV_RUN` from outside any
///    stage, then each inner stage in turn (wrapping between iterations),
///    with only `UV_RUN` allowed to stay open around another stage
/// 4. Every other looper callback runs inside a stage that admits its type
/// 5. Nothing but threadpool work runs after `EXIT`
///
/// # Errors
/// The first [`ScheduleError`] found, in execution order
pub fn validate_schedule(tree: &CallbackTraceTree) -> Result<(), ScheduleError> {
    let schedule = tree.executed_schedule();
    let mut checker = StageChecker::new();

    for (position, &node) in schedule.iter().enumerate() {
        checker.check(position, tree.record(node))?;
    }

    debug!("Schedule of {} callbacks is valid", schedule.len());
    Ok(())
}

/// Stage bookkeeping while walking a schedule
///
/// **Private** - state machine behind validate_schedule
struct StageChecker {
    /// Open stages, outermost first
    open: Vec<LoopStage>,

    /// Inner stage closed most recently; starts at the last inner stage so
    /// the first iteration needs no special case
    last_ended_inner: LoopStage,

    exiting: bool,
}

impl StageChecker {
    fn new() -> Self {
        Self {
            open: Vec::new(),
            last_ended_inner: LoopStage::RunTimers2,
            exiting: false,
        }
    }

    fn check(&mut self, position: usize, record: &CallbackRecord) -> Result<(), ScheduleError> {
        if usize::try_from(record.exec_id).ok() != Some(position) {
            return Err(ScheduleError::ExecIdGap {
                name: record.name.clone(),
                position,
                exec_id: record.exec_id,
            });
        }

        let cb_type = &record.cb_type;
        if cb_type.is_threadpool() {
            return Ok(());
        }
        if self.exiting {
            return Err(ScheduleError::EventAfterExit {
                name: record.name.clone(),
            });
        }

        match cb_type {
            CallbackType::InitialStack if position != 0 => {
                Err(ScheduleError::InitialStackNotFirst {
                    name: record.name.clone(),
                    position,
                })
            }
            CallbackType::InitialStack => Ok(()),
            CallbackType::ProcessExit => {
                self.exiting = true;
                Ok(())
            }
            CallbackType::Marker { stage, .. } if cb_type.is_begin_marker() => {
                self.begin(record, *stage)
            }
            CallbackType::Marker { stage, .. } => self.end(record, *stage),
            _ if cb_type.is_marker() => Err(ScheduleError::UnknownMarker {
                name: record.name.clone(),
                cb_type: cb_type.to_string(),
            }),
            _ => self.run(record),
        }
    }

    fn begin(&mut self, record: &CallbackRecord, stage: LoopStage) -> Result<(), ScheduleError> {
        let expected = match self.open.as_slice() {
            [] => LoopStage::UvRun,
            [LoopStage::UvRun] => self
                .last_ended_inner
                .next_inner()
                .unwrap_or(LoopStage::RunTimers1),
            [.., open] => {
                return Err(ScheduleError::StageNotEnded {
                    name: record.name.clone(),
                    stage,
                    open: *open,
                })
            }
        };

        if stage != expected {
            return Err(ScheduleError::UnexpectedStage {
                name: record.name.clone(),
                stage,
                expected,
            });
        }

        self.open.push(stage);
        Ok(())
    }

    fn end(&mut self, record: &CallbackRecord, stage: LoopStage) -> Result<(), ScheduleError> {
        let open = self.open.pop().ok_or_else(|| ScheduleError::EndWithoutBegin {
            name: record.name.clone(),
            stage,
        })?;

        if open != stage {
            return Err(ScheduleError::MismatchedEnd {
                name: record.name.clone(),
                stage,
                open,
            });
        }

        if stage.is_inner() {
            self.last_ended_inner = stage;
        }
        Ok(())
    }

    fn run(&self, record: &CallbackRecord) -> Result<(), ScheduleError> {
        let stage = self.open.last().ok_or_else(|| ScheduleError::OutsideStage {
            name: record.name.clone(),
            cb_type: record.cb_type.to_string(),
        })?;

        if !stage.admits(&record.cb_type) {
            return Err(ScheduleError::WrongStage {
                name: record.name.clone(),
                cb_type: record.cb_type.to_string(),
                stage: *stage,
            });
        }
        Ok(())
    }
}
