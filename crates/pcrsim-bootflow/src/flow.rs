// SPDX-License-Identifier: MIT OR Apache-2.0

//! Flows and steps

use std::fmt;
use std::sync::Arc;

use crate::action::Action;
use crate::amd::AmdStep;
use crate::condition::Condition;
use crate::error::BootflowError;
use crate::intel::IntelStep;
use crate::ocp::OcpStep;
use crate::state::State;

/// A named, ordered list of steps. Cloning is cheap.
#[derive(Clone)]
pub struct Flow {
    name: &'static str,
    steps: Arc<[Step]>,
}

impl Flow {
    pub fn new(name: &'static str, steps: Vec<Step>) -> Self {
        Self {
            name,
            steps: steps.into(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl fmt::Debug for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Flow")
            .field("name", &self.name)
            .field("steps", &self.steps.len())
            .finish()
    }
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "flow {}:", self.name)?;
        for (idx, step) in self.steps.iter().enumerate() {
            writeln!(f, "  {:2}. {}", idx, step)?;
        }
        Ok(())
    }
}

/// One decision point of a flow.
#[derive(Debug, Clone)]
pub enum Step {
    /// A fixed list of actions.
    Static(Vec<Action>),
    /// The inner step's actions if the condition holds, nothing otherwise.
    If(Condition, Box<Step>),
    Intel(IntelStep),
    Amd(AmdStep),
    Ocp(OcpStep),
}

impl Step {
    /// Actions to apply, computed against the current state.
    pub fn actions(&self, state: &State) -> Result<Vec<Action>, BootflowError> {
        match self {
            Step::Static(actions) => Ok(actions.clone()),
            Step::If(condition, then) => {
                if condition.check(state) {
                    then.actions(state)
                } else {
                    Ok(Vec::new())
                }
            }
            Step::Intel(step) => step.actions(state),
            Step::Amd(step) => step.actions(state),
            Step::Ocp(step) => step.actions(state),
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Static(actions) => {
                for (idx, action) in actions.iter().enumerate() {
                    if idx > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{}", action)?;
                }
                Ok(())
            }
            Step::If(condition, then) => write!(f, "If({}, {})", condition, then),
            Step::Intel(step) => write!(f, "{}", step),
            Step::Amd(step) => write!(f, "{}", step),
            Step::Ocp(step) => write!(f, "{}", step),
        }
    }
}
