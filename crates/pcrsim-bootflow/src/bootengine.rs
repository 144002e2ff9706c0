// SPDX-License-Identifier: MIT OR Apache-2.0

//! Boot engine: runs a flow against a simulation state
//!
//! The run loop keeps a cursor `(flow, step index)`. Each iteration
//! computes the actions of the current step, applies them in order and
//! appends one [`StepResult`] to the [`Log`]. A `SetFlow` action replaces
//! the flow after the step completes and restarts the cursor at step 0.
//! The run finishes when the cursor passes the end of the flow, or aborts
//! on the first fatal error.

use std::fmt;

use log::{debug, info, warn};

use crate::action::{Action, ActionCoordinates};
use crate::data::{Actor, MeasuredData, MeasuredDataSlice};
use crate::error::BootflowError;
use crate::flow::Flow;
use crate::state::State;
use crate::trustchain::TrustChainKind;

#[derive(Debug, Clone)]
pub enum RunStatus {
    NotStarted,
    Running,
    Finished,
    Aborted(BootflowError),
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Finished | RunStatus::Aborted(_))
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::NotStarted => write!(f, "not started"),
            RunStatus::Running => write!(f, "running"),
            RunStatus::Finished => write!(f, "finished"),
            RunStatus::Aborted(e) => write!(f, "aborted: {}", e),
        }
    }
}

/// A problem raised while executing a step.
#[derive(Debug, Clone)]
pub struct StepIssue {
    /// `None` when computing the step's actions failed
    pub action_index: Option<usize>,
    pub fatal: bool,
    pub error: BootflowError,
}

impl fmt::Display for StepIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = if self.fatal { "fatal" } else { "issue" };
        match self.action_index {
            Some(idx) => write!(f, "{} in action #{}: {}", severity, idx, self.error),
            None => write!(f, "{}: {}", severity, self.error),
        }
    }
}

/// Everything one step did.
#[derive(Debug, Clone)]
pub struct StepResult {
    pub flow: &'static str,
    pub flow_index: usize,
    pub step_index: usize,
    pub step: String,
    pub actions: Vec<Action>,
    pub measured_data: Vec<MeasuredData>,
    pub issues: Vec<StepIssue>,
}

impl StepResult {
    pub fn has_fatal_issue(&self) -> bool {
        self.issues.iter().any(|i| i.fatal)
    }
}

impl fmt::Display for StepResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{}#{} step {}: {}",
            self.flow, self.flow_index, self.step_index, self.step
        )?;
        for action in &self.actions {
            writeln!(f, "    action: {}", action)?;
        }
        for measured in &self.measured_data {
            writeln!(f, "    measured: {}", measured)?;
        }
        for issue in &self.issues {
            writeln!(f, "    {}", issue)?;
        }
        Ok(())
    }
}

/// Ordered results of every executed step.
#[derive(Debug, Clone, Default)]
pub struct Log(Vec<StepResult>);

impl Log {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, StepResult> {
        self.0.iter()
    }

    pub fn last(&self) -> Option<&StepResult> {
        self.0.last()
    }

    /// Everything consumed by the given trust chain, in measurement order.
    pub fn get_data_measured_with(&self, kind: TrustChainKind) -> MeasuredDataSlice {
        self.0
            .iter()
            .flat_map(|result| result.measured_data.iter())
            .filter(|m| m.trust_chain == kind)
            .cloned()
            .collect()
    }
}

impl<'a> IntoIterator for &'a Log {
    type Item = &'a StepResult;
    type IntoIter = std::slice::Iter<'a, StepResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for Log {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for result in &self.0 {
            write!(f, "{}", result)?;
        }
        Ok(())
    }
}

// =============================================================================
// BootProcess
// =============================================================================

/// One simulation run. Owns its [`State`] for the whole run.
#[derive(Debug)]
pub struct BootProcess {
    state: State,
    log: Log,
    flow_index: usize,
    step_index: usize,
    status: RunStatus,
}

impl BootProcess {
    /// Run whatever flow is set on `state`.
    pub fn new(state: State) -> Self {
        Self {
            state,
            log: Log::default(),
            flow_index: 0,
            step_index: 0,
            status: RunStatus::NotStarted,
        }
    }

    /// Set `flow` on `state`, then run it.
    pub fn with_flow(mut state: State, flow: Flow) -> Self {
        state.set_flow(flow);
        Self::new(state)
    }

    pub fn status(&self) -> &RunStatus {
        &self.status
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn log(&self) -> &Log {
        &self.log
    }

    pub fn into_parts(self) -> (State, Log, RunStatus) {
        (self.state, self.log, self.status)
    }

    /// Execute one step. Returns false once the run has terminated.
    pub fn next_step(&mut self) -> bool {
        if self.status.is_terminal() {
            return false;
        }

        let Some(flow) = self.state.current_flow().cloned() else {
            warn!("boot process has no flow to execute");
            self.terminate(RunStatus::Finished);
            return false;
        };
        if matches!(self.status, RunStatus::NotStarted) {
            info!("starting flow '{}'", flow.name());
            self.status = RunStatus::Running;
        }

        let Some(step) = flow.steps().get(self.step_index) else {
            self.terminate(RunStatus::Finished);
            return false;
        };
        debug!(
            "executing {}#{} step {}: {}",
            flow.name(),
            self.flow_index,
            self.step_index,
            step
        );

        let mut result = StepResult {
            flow: flow.name(),
            flow_index: self.flow_index,
            step_index: self.step_index,
            step: step.to_string(),
            actions: Vec::new(),
            measured_data: Vec::new(),
            issues: Vec::new(),
        };

        let actions = match step.actions(&self.state) {
            Ok(actions) => actions,
            Err(error) => {
                result.issues.push(StepIssue {
                    action_index: None,
                    fatal: true,
                    error: error.clone(),
                });
                self.log.0.push(result);
                self.terminate(RunStatus::Aborted(error));
                return false;
            }
        };

        let mut next_flow = None;
        for (action_index, action) in actions.iter().enumerate() {
            let actor = Actor {
                step: result.step.clone(),
                coords: ActionCoordinates {
                    flow_index: self.flow_index,
                    step_index: self.step_index,
                    action_index,
                },
            };
            match action.apply(&mut self.state, &actor) {
                Ok(outcome) => {
                    result.measured_data.extend(outcome.measured_data);
                    for error in outcome.issues {
                        warn!("{}: {}", actor, error);
                        result.issues.push(StepIssue {
                            action_index: Some(action_index),
                            fatal: false,
                            error,
                        });
                    }
                    if outcome.set_flow.is_some() {
                        next_flow = outcome.set_flow;
                    }
                }
                Err(error) => {
                    result.actions = actions[..=action_index].to_vec();
                    result.issues.push(StepIssue {
                        action_index: Some(action_index),
                        fatal: true,
                        error: error.clone(),
                    });
                    self.log.0.push(result);
                    self.terminate(RunStatus::Aborted(error));
                    return false;
                }
            }
        }
        result.actions = actions;
        self.log.0.push(result);

        match next_flow {
            Some(next) => {
                info!("switching flow '{}' -> '{}'", flow.name(), next.name());
                self.state.set_flow(next);
                self.flow_index += 1;
                self.step_index = 0;
            }
            None => self.step_index += 1,
        }
        true
    }

    /// Run until the flow finishes or aborts.
    pub fn finish(&mut self) -> &RunStatus {
        while self.next_step() {}
        &self.status
    }

    fn terminate(&mut self, status: RunStatus) {
        match &status {
            RunStatus::Aborted(e) => warn!(
                "boot process aborted after {} steps: {}",
                self.log.len(),
                e
            ),
            _ => info!("boot process finished after {} steps", self.log.len()),
        }
        self.state.finish();
        self.status = status;
    }
}
