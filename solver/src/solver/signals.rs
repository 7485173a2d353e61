//! Communication channels between solver instances.
//!
//! This is the whole surface shared by cooperating solvers: learnt clauses
//! and incumbent solutions flow out, and the same (plus interruptions) flow
//! in. Each solver runs on its own thread with its own state; nothing else
//! is shared.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::core::literals::Disjunction;
use crate::core::state::Domains;
use crate::core::IntCst;
use env_param::EnvParam;

/// Largest clause that is worth sharing with other solvers.
static MAX_CLAUSE_SHARING_SIZE: EnvParam<usize> = EnvParam::new("VELA_MAX_CLAUSE_SHARING_SIZE", "6");

static THREAD_ID_COUNTER: AtomicUsize = AtomicUsize::new(0);
pub type ThreadId = usize;

fn next_thread_id() -> ThreadId {
    THREAD_ID_COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// A solution is a saved copy of the domains.
pub type SavedAssignment = Domains;

/// Signals that a solver may receive.
pub enum InputSignal {
    /// Stop as soon as possible.
    Interrupt,
    /// A clause learnt by another solver.
    LearnedClause(Arc<Disjunction>),
    /// A solution found by another solver.
    SolutionFound(Arc<SavedAssignment>),
}

/// Handle for sending signals to a solver.
pub struct InputStream {
    pub id: ThreadId,
    pub sender: Sender<InputSignal>,
}

/// A message emitted by a solver.
pub struct SolverOutput {
    pub emitter: ThreadId,
    pub msg: OutputSignal,
}

pub enum OutputSignal {
    /// A clause inferred by this solver.
    LearntClause(Arc<Disjunction>),
    /// A valid (not necessarily optimal) solution with its objective value.
    SolutionFound {
        objective_value: Option<IntCst>,
        assignment: Arc<SavedAssignment>,
    },
}

/// The communication state of one solver: its input channel and an optional
/// output channel to its peers.
pub struct Synchro {
    pub id: ThreadId,
    pub signals: Receiver<InputSignal>,
    sender: Sender<InputSignal>,
    pub output: Option<Sender<SolverOutput>>,
}

impl Synchro {
    pub fn new() -> Self {
        let (sender, signals) = unbounded();
        Synchro {
            id: next_thread_id(),
            signals,
            sender,
            output: None,
        }
    }

    pub fn input_stream(&self) -> InputStream {
        InputStream {
            id: self.id,
            sender: self.sender.clone(),
        }
    }

    pub fn set_output(&mut self, output: Sender<SolverOutput>) {
        self.output = Some(output);
    }

    /// Exports a learnt clause, if it is small enough to be useful to peers.
    pub fn notify_learnt(&self, clause: &Disjunction) {
        if let Some(output) = &self.output {
            if clause.len() <= MAX_CLAUSE_SHARING_SIZE.get() {
                let _ = output.send(SolverOutput {
                    emitter: self.id,
                    msg: OutputSignal::LearntClause(Arc::new(clause.clone())),
                });
            }
        }
    }

    pub fn notify_solution_found(&self, objective_value: Option<IntCst>, assignment: Arc<SavedAssignment>) {
        if let Some(output) = &self.output {
            let _ = output.send(SolverOutput {
                emitter: self.id,
                msg: OutputSignal::SolutionFound {
                    objective_value,
                    assignment,
                },
            });
        }
    }
}

impl Default for Synchro {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Synchro {
    fn clone(&self) -> Self {
        // a cloned solver gets its own input channel but keeps broadcasting
        // to the same output
        let mut fresh = Synchro::new();
        fresh.output = self.output.clone();
        fresh
    }
}
