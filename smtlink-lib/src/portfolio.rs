// BSD 2-Clause License
//
// Copyright (c) 2019, 2020 Alasdair Armstrong
//
// All rights reserved.
//
// Redistribution and use in source and binary forms, with or without
// modification, are permitted provided that the following conditions are
// met:
//
// 1. Redistributions of source code must retain the above copyright
// notice, this list of conditions and the following disclaimer.
//
// 2. Redistributions in binary form must reproduce the above copyright
// notice, this list of conditions and the following disclaimer in the
// documentation and/or other materials provided with the distribution.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS
// "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES, INCLUDING, BUT NOT
// LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR
// A PARTICULAR PURPOSE ARE DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT
// HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
// SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT
// LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR SERVICES; LOSS OF USE,
// DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY
// THEORY OF LIABILITY, WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT
// (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE USE
// OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.


//! A solver interface backed by several candidate backends, each
//! running in its own `smtlink-worker` process. Every solve is a
//! race: the first candidate to answer wins and the others are
//! killed. The winner stays alive to answer model queries until the
//! next race or until the portfolio is closed.
//!
//! The racer trusts its candidates to agree. If the fastest one is
//! wrong, its answer is returned. Candidates that fail are ignored,
//! so a race in which every candidate fails never finishes; callers
//! that need bounded latency must impose their own timeout.

use crossbeam::channel;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command as Process, Stdio};
use std::thread;

use tracing::{debug, warn};

use crate::backend::Backend;
use crate::backends::bounded::{Bounded, Strategy};
use crate::backends;
use crate::config::SolverOptions;
use crate::error::Error;
use crate::formula::{FNode, FormulaManager};
use crate::model::ModelSnapshot;
use crate::protocol::{read_frame, write_frame, Command, Job, Reply};
use crate::solver::Solver;
use crate::stack::AssertionStack;

struct Candidate {
    name: String,
    options: SolverOptions,
}

struct Running {
    name: String,
    child: Child,
    stdin: ChildStdin,
}

struct Survivor {
    name: String,
    child: Child,
    stdin: ChildStdin,
    stdout: ChildStdout,
}

fn terminate(child: &mut Child) {
    // An error here means the process has already gone
    let _ = child.kill();
    let _ = child.wait();
}

pub struct Portfolio {
    worker: PathBuf,
    candidates: Vec<Candidate>,
    assertions: AssertionStack<FNode>,
    survivor: Option<Survivor>,
    last_race: Vec<u32>,
}

impl Portfolio {
    /// Create a portfolio racing the named backends, using
    /// `worker` as the candidate executable.
    pub fn new<P: Into<PathBuf>>(worker: P, names: &[&str], options: SolverOptions) -> Result<Self, Error> {
        if names.is_empty() {
            return Err(Error::Config("a portfolio needs at least one candidate solver".to_string()));
        }
        let mut candidates = Vec::new();
        for name in names {
            if !backends::is_available(name) {
                return Err(Error::UnknownSolver(name.to_string()));
            }
            candidates.push(Candidate { name: name.to_string(), options: options.clone() })
        }
        Ok(Portfolio {
            worker: worker.into(),
            candidates,
            assertions: AssertionStack::new(),
            survivor: None,
            last_race: Vec::new(),
        })
    }

    /// Override the options given to one candidate.
    pub fn with_solver_options(mut self, name: &str, options: SolverOptions) -> Result<Self, Error> {
        match self.candidates.iter_mut().find(|candidate| candidate.name == name) {
            Some(candidate) => candidate.options = options,
            None => return Err(Error::UnknownSolver(name.to_string())),
        }
        Ok(self)
    }

    pub fn add_assertion(&mut self, fm: &FormulaManager, formula: FNode) -> Result<(), Error> {
        if !fm.ty(formula).is_bool() {
            return Err(Error::Type(format!("cannot assert {} of type {}", fm.show(formula), fm.ty(formula))));
        }
        self.assertions.add(formula);
        Ok(())
    }

    pub fn push(&mut self, levels: usize) {
        self.assertions.push(levels)
    }

    pub fn pop(&mut self, levels: usize) -> Result<(), Error> {
        self.assertions.pop(levels)
    }

    pub fn reset_assertions(&mut self) {
        self.assertions.clear()
    }

    fn launch(&self, candidate: &Candidate, job: &Job) -> Result<(Running, ChildStdout), Error> {
        let mut child = Process::new(&self.worker).stdin(Stdio::piped()).stdout(Stdio::piped()).spawn()?;
        let pipes = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => Ok((stdin, stdout)),
            _ => Err(Error::Protocol("worker pipes unavailable".to_string())),
        };
        let (mut stdin, stdout) = match pipes {
            Ok(pipes) => pipes,
            Err(err) => {
                terminate(&mut child);
                return Err(err);
            }
        };
        if let Err(err) = write_frame(&mut stdin, job) {
            terminate(&mut child);
            return Err(err);
        }
        Ok((Running { name: candidate.name.clone(), child, stdin }, stdout))
    }

    /// Race every candidate on the current assertions together with
    /// `assumptions`, returning the answer of the first to finish.
    pub fn solve(&mut self, fm: &mut FormulaManager, assumptions: &[FNode]) -> Result<bool, Error> {
        self.close();

        let mut formulas: Vec<FNode> = self.assertions.iter().copied().collect();
        formulas.extend_from_slice(assumptions);
        let conjunction = fm.and(formulas)?;
        let formula = fm.export(&[conjunction]);

        let (tx, rx) = channel::unbounded();
        let mut running: Vec<Option<Running>> = Vec::new();
        for (i, candidate) in self.candidates.iter().enumerate() {
            let job = Job { backend: candidate.name.clone(), options: candidate.options.clone(), formula: formula.clone() };
            let (process, mut stdout) = match self.launch(candidate, &job) {
                Ok(launched) => launched,
                Err(err) => {
                    for process in running.iter_mut().flatten() {
                        terminate(&mut process.child)
                    }
                    return Err(err);
                }
            };
            let tx = tx.clone();
            thread::spawn(move || {
                let reply = read_frame::<_, Reply>(&mut stdout);
                // The race may already be over
                let _ = tx.send((i, reply, stdout));
            });
            running.push(Some(process))
        }
        // Still held while waiting, so the channel never disconnects
        let _waiting = tx;

        self.last_race = running.iter().flatten().map(|process| process.child.id()).collect();
        debug!(candidates = running.len(), "race started");

        let mut outcome = None;
        while let Ok((i, reply, stdout)) = rx.recv() {
            let name = running[i].as_ref().map(|process| process.name.clone()).unwrap_or_default();
            match reply {
                Ok(Some(Reply::Solved(sat))) => {
                    debug!(winner = %name, sat, "race won");
                    outcome = Some((i, sat, stdout));
                    break;
                }
                Ok(Some(Reply::Failed(message))) => warn!(candidate = %name, %message, "candidate failed"),
                Ok(Some(_)) => warn!(candidate = %name, "candidate sent an unexpected reply"),
                Ok(None) => warn!(candidate = %name, "candidate exited without answering"),
                Err(err) => warn!(candidate = %name, %err, "cannot read from candidate"),
            }
        }

        let winner = outcome.as_ref().map(|(i, _, _)| *i);
        for (i, slot) in running.iter_mut().enumerate() {
            if Some(i) != winner {
                if let Some(mut process) = slot.take() {
                    terminate(&mut process.child);
                    debug!(candidate = %process.name, pid = process.child.id(), "loser terminated")
                }
            }
        }

        match outcome {
            Some((i, sat, stdout)) => {
                if let Some(process) = running[i].take() {
                    self.survivor =
                        Some(Survivor { name: process.name, child: process.child, stdin: process.stdin, stdout })
                }
                Ok(sat)
            }
            None => Err(Error::Protocol("result channel closed during a race".to_string())),
        }
    }

    fn request(&mut self, command: &Command) -> Result<Reply, Error> {
        let survivor = self.survivor.as_mut().ok_or(Error::NoModel)?;
        write_frame(&mut survivor.stdin, command)?;
        read_frame(&mut survivor.stdout)?
            .ok_or_else(|| Error::Protocol(format!("{} closed its channel", survivor.name)))
    }

    /// Evaluate a formula in the winning candidate's model. The
    /// value is rebuilt in `fm`.
    pub fn get_value(&mut self, fm: &mut FormulaManager, formula: FNode) -> Result<FNode, Error> {
        match self.request(&Command::GetValue(fm.export(&[formula])))? {
            Reply::Value(portable) => {
                fm.import(&portable)?.first().copied().ok_or_else(|| Error::Protocol("empty value".to_string()))
            }
            Reply::Error(message) => Err(Error::Remote(message)),
            _ => Err(Error::Protocol("unexpected reply to get_value".to_string())),
        }
    }

    pub fn get_model(&mut self, fm: &mut FormulaManager) -> Result<ModelSnapshot, Error> {
        match self.request(&Command::GetModel)? {
            Reply::Model(portable) => Ok(ModelSnapshot::from_roots(&fm.import(&portable)?)),
            Reply::Error(message) => Err(Error::Remote(message)),
            _ => Err(Error::Protocol("unexpected reply to get_model".to_string())),
        }
    }

    /// The process id of the last race's winner, while it is alive.
    pub fn survivor(&self) -> Option<u32> {
        self.survivor.as_ref().map(|survivor| survivor.child.id())
    }

    pub fn winner(&self) -> Option<&str> {
        self.survivor.as_ref().map(|survivor| survivor.name.as_str())
    }

    /// The process ids of every candidate in the last race.
    pub fn last_race(&self) -> &[u32] {
        &self.last_race
    }

    /// Shut down the surviving candidate, if any.
    pub fn close(&mut self) {
        if let Some(mut survivor) = self.survivor.take() {
            let _ = write_frame(&mut survivor.stdin, &Command::Exit);
            terminate(&mut survivor.child);
            debug!(candidate = %survivor.name, "survivor shut down")
        }
    }
}

impl Drop for Portfolio {
    fn drop(&mut self) {
        self.close()
    }
}

fn candidate<B, R, W>(backend: Result<B, Error>, job: Job, input: &mut R, output: &mut W) -> Result<(), Error>
where
    B: Backend,
    R: Read,
    W: Write,
{
    let mut fm = FormulaManager::new();
    let solved = backend.and_then(|backend| {
        let mut solver = Solver::new(backend, job.options.clone());
        for formula in fm.import(&job.formula)? {
            solver.add_assertion(&mut fm, formula)?
        }
        let sat = solver.solve(&mut fm, &[])?;
        Ok((solver, sat))
    });

    let mut solver = match solved {
        Ok((solver, sat)) => {
            write_frame(output, &Reply::Solved(sat))?;
            solver
        }
        Err(err) => {
            write_frame(output, &Reply::Failed(err.to_string()))?;
            return Err(err);
        }
    };

    loop {
        let reply = match read_frame(input)? {
            None | Some(Command::Exit) => return Ok(()),
            Some(Command::GetValue(portable)) => {
                let value = fm.import(&portable).and_then(|roots| match roots.first() {
                    Some(formula) => solver.get_value(&mut fm, *formula),
                    None => Err(Error::Protocol("empty formula".to_string())),
                });
                match value {
                    Ok(value) => Reply::Value(fm.export(&[value])),
                    Err(err) => Reply::Error(err.to_string()),
                }
            }
            Some(Command::GetModel) => match solver.get_model().and_then(|mut model| model.snapshot(&mut fm)) {
                Ok(snapshot) => Reply::Model(fm.export(&snapshot.roots())),
                Err(err) => Reply::Error(err.to_string()),
            },
        };
        write_frame(output, &reply)?
    }
}

/// The candidate side of the race: read a [Job], solve it, report,
/// then answer commands until told to exit or the input closes.
pub fn serve<R: Read, W: Write>(mut input: R, mut output: W) -> Result<(), Error> {
    let job: Job = match read_frame(&mut input)? {
        Some(job) => job,
        None => return Ok(()),
    };
    debug!(backend = %job.backend, "candidate started");
    match job.backend.as_str() {
        "bounded" => candidate(Bounded::with_strategy(&job.options, Strategy::Ascending), job, &mut input, &mut output),
        "bounded-rev" => {
            candidate(Bounded::with_strategy(&job.options, Strategy::Descending), job, &mut input, &mut output)
        }
        #[cfg(feature = "z3")]
        "z3" => candidate(backends::z3::Z3::new(&job.options), job, &mut input, &mut output),
        name => {
            let err = Error::UnknownSolver(name.to_string());
            write_frame(&mut output, &Reply::Failed(err.to_string()))?;
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::Ty;
    use std::io::Cursor;

    fn replies(mut output: &[u8]) -> Vec<Reply> {
        let mut replies = Vec::new();
        while let Some(reply) = read_frame(&mut output).unwrap() {
            replies.push(reply)
        }
        replies
    }

    #[test]
    fn serve_answers_queries() {
        let mut fm = FormulaManager::new();
        let x = fm.symbol("x", Ty::Int).unwrap();
        let three = fm.int(3).unwrap();
        let f = fm.eq(x, three).unwrap();

        let mut input = Vec::new();
        let job = Job { backend: "bounded".to_string(), options: SolverOptions::default(), formula: fm.export(&[f]) };
        write_frame(&mut input, &job).unwrap();
        write_frame(&mut input, &Command::GetValue(fm.export(&[x]))).unwrap();
        write_frame(&mut input, &Command::GetModel).unwrap();
        write_frame(&mut input, &Command::Exit).unwrap();
        // Never read
        write_frame(&mut input, &Command::GetModel).unwrap();

        let mut output = Vec::new();
        serve(Cursor::new(input), &mut output).unwrap();
        let replies = replies(&output);
        assert_eq!(replies.len(), 3);
        assert!(matches!(replies[0], Reply::Solved(true)));

        match &replies[1] {
            Reply::Value(portable) => assert_eq!(fm.import(portable).unwrap(), vec![three]),
            _ => panic!("expected a value"),
        }
        match &replies[2] {
            Reply::Model(portable) => {
                let snapshot = ModelSnapshot::from_roots(&fm.import(portable).unwrap());
                assert_eq!(snapshot.get(x), Some(three))
            }
            _ => panic!("expected a model"),
        }
    }

    #[test]
    fn serve_reports_failures() {
        let mut fm = FormulaManager::new();
        let t = fm.bool(true).unwrap();
        let mut input = Vec::new();
        let job = Job { backend: "yices".to_string(), options: SolverOptions::default(), formula: fm.export(&[t]) };
        write_frame(&mut input, &job).unwrap();

        let mut output = Vec::new();
        assert!(matches!(serve(Cursor::new(input), &mut output), Err(Error::UnknownSolver(_))));
        assert!(matches!(replies(&output)[..], [Reply::Failed(_)]));

        // A model query on an unsatisfiable job is answered with an error
        let f = fm.bool(false).unwrap();
        let mut input = Vec::new();
        let job = Job { backend: "bounded-rev".to_string(), options: SolverOptions::default(), formula: fm.export(&[f]) };
        write_frame(&mut input, &job).unwrap();
        write_frame(&mut input, &Command::GetModel).unwrap();
        let mut output = Vec::new();
        serve(Cursor::new(input), &mut output).unwrap();
        assert!(matches!(replies(&output)[..], [Reply::Solved(false), Reply::Error(_)]))
    }

    #[test]
    fn candidates_are_validated() {
        let options = SolverOptions::default();
        assert!(matches!(
            Portfolio::new("smtlink-worker", &["bounded", "nope"], options.clone()),
            Err(Error::UnknownSolver(name)) if name == "nope"
        ));
        assert!(matches!(Portfolio::new("smtlink-worker", &[], options.clone()), Err(Error::Config(_))));
        let portfolio = Portfolio::new("smtlink-worker", &["bounded"], options.clone()).unwrap();
        assert!(portfolio.with_solver_options("bounded-rev", options).is_err())
    }

    #[test]
    fn queries_need_a_race() {
        let mut fm = FormulaManager::new();
        let x = fm.symbol("x", Ty::Bool).unwrap();
        let mut portfolio = Portfolio::new("smtlink-worker", &["bounded"], SolverOptions::default()).unwrap();
        assert!(matches!(portfolio.get_value(&mut fm, x), Err(Error::NoModel)));
        let one = fm.int(1).unwrap();
        assert!(matches!(portfolio.add_assertion(&fm, one), Err(Error::Type(_))));
        assert!(portfolio.pop(1).is_err())
    }
}
