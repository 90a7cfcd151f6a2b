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


//! An incremental solver over any [Backend]. It keeps its own
//! assertion stack mirroring the backend's backtracking points, so
//! that named unsat cores can be mapped back to the assertions the
//! caller made.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use tracing::{debug, trace};

use crate::backend::{Backend, SmtResult};
use crate::config::{SolverOptions, UnsatCoreMode};
use crate::convert::Converter;
use crate::error::Error;
use crate::formula::{FNode, FormulaManager, Op, Ty};
use crate::model::Model;
use crate::signature;
use crate::stack::AssertionStack;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Assertion {
    Plain(FNode),
    /// Asserted as `guard => formula`, with `guard` assumed true at
    /// every solve.
    Named { guard: FNode, name: Option<String>, formula: FNode },
}

impl Assertion {
    pub fn formula(&self) -> FNode {
        match self {
            Assertion::Plain(formula) => *formula,
            Assertion::Named { formula, .. } => *formula,
        }
    }
}

/// The most recent state-changing command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LastCommand {
    Assert,
    Declare,
    Push,
    Pop,
    Reset,
    Solve,
}

impl fmt::Display for LastCommand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            LastCommand::Assert => "assert",
            LastCommand::Declare => "declare",
            LastCommand::Push => "push",
            LastCommand::Pop => "pop",
            LastCommand::Reset => "reset",
            LastCommand::Solve => "solve",
        };
        write!(f, "{}", name)
    }
}

pub struct Solver<B: Backend> {
    converter: Converter<B>,
    options: SolverOptions,
    assertions: AssertionStack<Assertion>,
    last_result: Option<bool>,
    last_command: Option<LastCommand>,
    // Set while the temporary scope opened by solve for compound
    // assumptions is still open.
    pending_pop: bool,
}

impl<B: Backend> Solver<B> {
    pub fn new(backend: B, options: SolverOptions) -> Self {
        Solver {
            converter: Converter::new(backend),
            options,
            assertions: AssertionStack::new(),
            last_result: None,
            last_command: None,
            pending_pop: false,
        }
    }

    pub fn options(&self) -> &SolverOptions {
        &self.options
    }

    pub fn backend_name(&self) -> &str {
        self.converter.backend().name()
    }

    pub fn converter(&mut self) -> &mut Converter<B> {
        &mut self.converter
    }

    pub fn last_result(&self) -> Option<bool> {
        self.last_result
    }

    pub fn last_command(&self) -> Option<LastCommand> {
        self.last_command
    }

    pub fn assertions(&self) -> impl Iterator<Item = &Assertion> {
        self.assertions.iter()
    }

    fn clear_pending_pop(&mut self) -> Result<(), Error> {
        if self.pending_pop {
            // Cleared first so a failing pop is not retried forever
            self.pending_pop = false;
            self.pop_scopes(1)?;
        }
        Ok(())
    }

    fn push_scopes(&mut self, levels: usize) -> Result<(), Error> {
        for _ in 0..levels {
            self.converter.backend_mut().push()?
        }
        self.assertions.push(levels);
        Ok(())
    }

    fn pop_scopes(&mut self, levels: usize) -> Result<(), Error> {
        if levels > self.assertions.depth() {
            return Err(Error::Pop { requested: levels, available: self.assertions.depth() });
        }
        for _ in 0..levels {
            self.converter.backend_mut().pop()?
        }
        self.assertions.pop(levels)
    }

    pub fn declare_variable(&mut self, fm: &FormulaManager, symbol: FNode) -> Result<(), Error> {
        self.clear_pending_pop()?;
        self.converter.declare_variable(fm, symbol)?;
        self.last_command = Some(LastCommand::Declare);
        Ok(())
    }

    pub fn add_assertion(&mut self, fm: &mut FormulaManager, formula: FNode) -> Result<(), Error> {
        self.clear_pending_pop()?;
        self.assert_inner(fm, formula, None, true)
    }

    /// Add an assertion that is reported under `name` in named unsat
    /// cores. Outside named mode the name is ignored.
    pub fn add_named_assertion(&mut self, fm: &mut FormulaManager, formula: FNode, name: &str) -> Result<(), Error> {
        self.clear_pending_pop()?;
        self.assert_inner(fm, formula, Some(name.to_string()), true)
    }

    fn assert_inner(
        &mut self,
        fm: &mut FormulaManager,
        formula: FNode,
        name: Option<String>,
        track: bool,
    ) -> Result<(), Error> {
        if !fm.ty(formula).is_bool() {
            return Err(Error::Type(format!("cannot assert {} of type {}", fm.show(formula), fm.ty(formula))));
        }

        let record = if track && self.options.unsat_cores_mode == UnsatCoreMode::Named {
            let guard = fm.fresh_symbol(Ty::Bool, "assertion")?;
            let implication = fm.implies(guard, formula)?;
            let term = self.converter.convert(fm, implication)?;
            self.converter.backend_mut().assert(&term)?;
            Assertion::Named { guard, name, formula }
        } else {
            let term = self.converter.convert(fm, formula)?;
            self.converter.backend_mut().assert(&term)?;
            Assertion::Plain(formula)
        };

        self.assertions.add(record);
        self.last_command = Some(LastCommand::Assert);
        Ok(())
    }

    pub fn push(&mut self, levels: usize) -> Result<(), Error> {
        self.clear_pending_pop()?;
        self.push_scopes(levels)?;
        self.last_command = Some(LastCommand::Push);
        Ok(())
    }

    pub fn pop(&mut self, levels: usize) -> Result<(), Error> {
        self.clear_pending_pop()?;
        self.pop_scopes(levels)?;
        self.last_command = Some(LastCommand::Pop);
        Ok(())
    }

    pub fn reset_assertions(&mut self) -> Result<(), Error> {
        self.pending_pop = false;
        self.converter.backend_mut().reset()?;
        self.assertions.clear();
        self.last_result = None;
        self.last_command = Some(LastCommand::Reset);
        Ok(())
    }

    /// Check satisfiability of the assertions under `assumptions`.
    /// Literal assumptions are passed to the backend directly; any
    /// other assumptions are asserted in a temporary scope which is
    /// closed before the next command changes the solver state.
    pub fn solve(&mut self, fm: &mut FormulaManager, assumptions: &[FNode]) -> Result<bool, Error> {
        self.clear_pending_pop()?;

        let mut assumptions = assumptions.to_vec();
        for record in self.assertions.iter() {
            if let Assertion::Named { guard, .. } = record {
                assumptions.push(*guard)
            }
        }

        let mut literals = Vec::new();
        let mut compound = Vec::new();
        for assumption in assumptions {
            if !fm.ty(assumption).is_bool() {
                return Err(Error::Type(format!("assumption {} is not boolean", fm.show(assumption))));
            }
            if fm.is_literal(assumption) {
                literals.push(self.converter.convert(fm, assumption)?)
            } else {
                compound.push(assumption)
            }
        }

        if !compound.is_empty() {
            self.push_scopes(1)?;
            self.pending_pop = true;
            let conjunction = fm.and(compound)?;
            self.assert_inner(fm, conjunction, None, false)?;
        }

        trace!(backend = self.converter.backend().name(), assumptions = literals.len(), "checking");
        let result = self.converter.backend_mut().check(&literals)?;
        debug!(backend = self.converter.backend().name(), %result, "solved");
        self.last_command = Some(LastCommand::Solve);

        match result {
            SmtResult::Sat => self.last_result = Some(true),
            SmtResult::Unsat => self.last_result = Some(false),
            SmtResult::Unknown => {
                self.last_result = None;
                return Err(Error::Unknown);
            }
        }
        Ok(result == SmtResult::Sat)
    }

    fn check_in_scope(&mut self, fm: &mut FormulaManager, formula: FNode) -> Result<bool, Error> {
        self.push(1)?;
        let result = self.add_assertion(fm, formula).and_then(|_| self.solve(fm, &[]));
        self.pop(1)?;
        result
    }

    pub fn is_sat(&mut self, fm: &mut FormulaManager, formula: FNode) -> Result<bool, Error> {
        self.check_in_scope(fm, formula)
    }

    pub fn is_unsat(&mut self, fm: &mut FormulaManager, formula: FNode) -> Result<bool, Error> {
        self.check_in_scope(fm, formula).map(|sat| !sat)
    }

    pub fn is_valid(&mut self, fm: &mut FormulaManager, formula: FNode) -> Result<bool, Error> {
        let negated = fm.not(formula)?;
        self.is_unsat(fm, negated)
    }

    /// The value of `formula` in the model of the last satisfiable
    /// solve.
    pub fn get_value(&mut self, fm: &mut FormulaManager, formula: FNode) -> Result<FNode, Error> {
        if fm.ty(formula).is_function() {
            return Err(Error::Type(format!("cannot get the value of function {}", fm.show(formula))));
        }
        let term = self.converter.convert(fm, formula)?;
        let value = self.converter.backend_mut().value(&term)?;
        let value = self.converter.back(fm, &value)?;
        let ty = fm.ty(formula).clone();
        signature::widen(fm, value, &ty)
    }

    pub fn get_values(&mut self, fm: &mut FormulaManager, formulas: &[FNode]) -> Result<Vec<(FNode, FNode)>, Error> {
        formulas.iter().map(|f| self.get_value(fm, *f).map(|value| (*f, value))).collect()
    }

    pub fn get_model(&mut self) -> Result<Model<'_, B>, Error> {
        Model::new(&mut self.converter)
    }

    fn check_unsat_core_config(&self) -> Result<(), Error> {
        if self.options.unsat_cores_mode == UnsatCoreMode::Off {
            return Err(Error::NotConfiguredForUnsatCores);
        }
        if self.last_result != Some(false) {
            return Err(Error::Status("the last call to solve() was not unsatisfiable".to_string()));
        }
        match self.last_command {
            Some(LastCommand::Solve) => Ok(()),
            Some(command) => Err(Error::Status(format!(
                "the solver state was modified by a '{}' command after the last call to solve()",
                command
            ))),
            None => Err(Error::Status("solve() has not been called".to_string())),
        }
    }

    /// The formulas of an unsat core of the last solve.
    pub fn unsat_core(&mut self, fm: &mut FormulaManager) -> Result<Vec<FNode>, Error> {
        match self.options.unsat_cores_mode {
            UnsatCoreMode::Off => Err(Error::NotConfiguredForUnsatCores),
            UnsatCoreMode::Named => Ok(self.named_unsat_core(fm)?.into_values().collect()),
            UnsatCoreMode::All => {
                self.check_unsat_core_config()?;
                let terms = self.converter.backend_mut().unsat_core()?;
                let mut seen = HashSet::new();
                let mut core = Vec::new();
                for term in &terms {
                    let f = self.converter.back(fm, term)?;
                    if seen.insert(f) {
                        core.push(f)
                    }
                }
                Ok(core)
            }
        }
    }

    /// An unsat core of the last solve, keyed by assertion name.
    /// Assertions made without a name are called `_a_k`, with `k`
    /// their position on the assertion stack.
    pub fn named_unsat_core(&mut self, fm: &mut FormulaManager) -> Result<BTreeMap<String, FNode>, Error> {
        match self.options.unsat_cores_mode {
            UnsatCoreMode::Off => Err(Error::NotConfiguredForUnsatCores),
            UnsatCoreMode::All => {
                let core = self.unsat_core(fm)?;
                Ok(core.into_iter().enumerate().map(|(i, f)| (format!("_a{}", i), f)).collect())
            }
            UnsatCoreMode::Named => {
                self.check_unsat_core_config()?;
                let terms = self.converter.backend_mut().unsat_assumptions()?;
                let mut guards = HashSet::new();
                for term in &terms {
                    guards.insert(self.converter.back(fm, term)?);
                }

                let mut core = BTreeMap::new();
                for (position, record) in self.assertions.iter().enumerate() {
                    if let Assertion::Named { guard, name, formula } = record {
                        if guards.contains(guard) {
                            let name = name.clone().unwrap_or_else(|| format!("_a_{}", position));
                            core.insert(name, *formula);
                        }
                    }
                }
                Ok(core)
            }
        }
    }
}

impl<B: Backend> Solver<B> {
    /// Enumerate the assignments to the boolean atoms `important`
    /// that extend to a model of the assertions. `callback` receives
    /// each assignment as a list of literals, and stops the
    /// enumeration by returning false. Returns the number of
    /// assignments seen. The assertions are left unchanged.
    pub fn all_sat<F>(&mut self, fm: &mut FormulaManager, important: &[FNode], mut callback: F) -> Result<usize, Error>
    where
        F: FnMut(&[FNode]) -> bool,
    {
        if let Some(atom) = important.iter().find(|atom| !fm.ty(**atom).is_bool()) {
            return Err(Error::Type(format!("all_sat over {} of type {}", fm.show(*atom), fm.ty(*atom))));
        }
        self.push(1)?;
        let result = self.enumerate(fm, important, &mut callback);
        let popped = self.pop(1);
        let count = result?;
        popped?;
        Ok(count)
    }

    fn enumerate<F>(&mut self, fm: &mut FormulaManager, important: &[FNode], callback: &mut F) -> Result<usize, Error>
    where
        F: FnMut(&[FNode]) -> bool,
    {
        let mut count = 0;
        while self.solve(fm, &[])? {
            let mut literals = Vec::with_capacity(important.len());
            let mut blocking = Vec::with_capacity(important.len());
            for atom in important {
                let value = self.get_value(fm, *atom)?;
                if fm.op(value) == &Op::Bool(true) {
                    literals.push(*atom);
                    blocking.push(fm.not(*atom)?)
                } else {
                    literals.push(fm.not(*atom)?);
                    blocking.push(*atom)
                }
            }
            count += 1;
            trace!(count, "all_sat assignment");
            if !callback(&literals) {
                break;
            }
            let clause = fm.or(blocking)?;
            self.assert_inner(fm, clause, None, false)?
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::bounded::Bounded;
    use num_bigint::BigInt;
    use num_rational::BigRational;
    use proptest::prelude::*;

    fn solver(options: SolverOptions) -> Solver<Bounded> {
        Solver::new(Bounded::new(&options).unwrap(), options)
    }

    fn int_vars(fm: &mut FormulaManager) -> (FNode, FNode) {
        (fm.symbol("x", Ty::Int).unwrap(), fm.symbol("y", Ty::Int).unwrap())
    }

    // Refutations by the bounded backend need finite sorts
    fn bv_vars(fm: &mut FormulaManager) -> (FNode, FNode) {
        (fm.symbol("u", Ty::BitVec(4)).unwrap(), fm.symbol("v", Ty::BitVec(4)).unwrap())
    }

    #[test]
    fn sat_then_unsat_with_push_pop() {
        let mut fm = FormulaManager::new();
        let (x, y) = bv_vars(&mut fm);
        let mut s = solver(SolverOptions::default());

        let lt = fm.bvult(x, y).unwrap();
        s.add_assertion(&mut fm, lt).unwrap();
        assert!(s.solve(&mut fm, &[]).unwrap());

        s.push(1).unwrap();
        let gt = fm.bvult(y, x).unwrap();
        s.add_assertion(&mut fm, gt).unwrap();
        assert!(!s.solve(&mut fm, &[]).unwrap());
        assert_eq!(s.last_result(), Some(false));

        s.pop(1).unwrap();
        assert!(s.solve(&mut fm, &[]).unwrap());
        assert_eq!(s.assertions().count(), 1);
        assert!(matches!(s.pop(1), Err(Error::Pop { requested: 1, available: 0 })))
    }

    #[test]
    fn only_booleans_can_be_asserted() {
        let mut fm = FormulaManager::new();
        let (x, _) = int_vars(&mut fm);
        let mut s = solver(SolverOptions::default());
        assert!(matches!(s.add_assertion(&mut fm, x), Err(Error::Type(_))))
    }

    #[test]
    fn values_are_widened_to_real() {
        let mut fm = FormulaManager::new();
        let r = fm.symbol("r", Ty::Real).unwrap();
        let three = fm.int(3).unwrap();
        let three = fm.to_real(three).unwrap();
        let eq = fm.eq(r, three).unwrap();
        let mut s = solver(SolverOptions::default());
        s.add_assertion(&mut fm, eq).unwrap();
        assert!(s.solve(&mut fm, &[]).unwrap());
        let value = s.get_value(&mut fm, r).unwrap();
        assert_eq!(fm.op(value), &Op::Real(BigRational::from_integer(BigInt::from(3))));

        let f = fm.symbol("f", Ty::function(vec![Ty::Int], Ty::Int)).unwrap();
        assert!(matches!(s.get_value(&mut fm, f), Err(Error::Type(_))));
    }

    #[test]
    fn compound_assumptions_are_temporary() {
        let mut fm = FormulaManager::new();
        let (x, y) = bv_vars(&mut fm);
        let p = fm.symbol("p", Ty::Bool).unwrap();
        let mut s = solver(SolverOptions::default());

        let le = fm.bvule(x, y).unwrap();
        let c = fm.implies(p, le).unwrap();
        s.add_assertion(&mut fm, c).unwrap();

        let gt = fm.bvult(y, x).unwrap();
        assert!(!s.solve(&mut fm, &[p, gt]).unwrap());
        assert_eq!(s.assertions().count(), 2);

        // The next command closes the temporary scope
        assert!(s.solve(&mut fm, &[p]).unwrap());
        assert_eq!(s.assertions().count(), 1);
        let not_p = fm.not(p).unwrap();
        assert!(s.solve(&mut fm, &[not_p, gt]).unwrap());
        s.push(1).unwrap();
        assert_eq!(s.assertions().count(), 1);
        s.pop(1).unwrap();
    }

    #[test]
    fn convenience_checks() {
        let mut fm = FormulaManager::new();
        let (x, y) = bv_vars(&mut fm);
        let mut s = solver(SolverOptions::default());
        let le = fm.bvule(x, y).unwrap();
        let ge = fm.bvule(y, x).unwrap();
        let total = fm.or(vec![le, ge]).unwrap();
        assert!(s.is_valid(&mut fm, total).unwrap());
        assert!(!s.is_valid(&mut fm, le).unwrap());
        let both = fm.and(vec![le, ge]).unwrap();
        assert!(s.is_sat(&mut fm, both).unwrap());
        let lt = fm.bvult(x, y).unwrap();
        let gt = fm.bvult(y, x).unwrap();
        let neither = fm.and(vec![lt, gt]).unwrap();
        assert!(s.is_unsat(&mut fm, neither).unwrap());
        assert_eq!(s.assertions().count(), 0)
    }

    #[test]
    fn unknown_is_an_error() {
        let mut fm = FormulaManager::new();
        let (x, y) = int_vars(&mut fm);
        let options = SolverOptions::default().with_option("max_steps", "3");
        let mut s = solver(options);
        let one = fm.int(1).unwrap();
        let sum = fm.plus(vec![x, y]).unwrap();
        let f = fm.eq(sum, one).unwrap();
        let g = fm.gt(x, y).unwrap();
        let h = fm.and(vec![f, g]).unwrap();
        s.add_assertion(&mut fm, h).unwrap();
        assert!(matches!(s.solve(&mut fm, &[]), Err(Error::Unknown)));
        assert_eq!(s.last_result(), None)
    }

    #[test]
    fn failed_solve_closes_its_temporary_scope() {
        let mut fm = FormulaManager::new();
        let (x, y) = int_vars(&mut fm);
        let mut s = solver(SolverOptions::default());
        let lt = fm.lt(x, y).unwrap();
        s.add_assertion(&mut fm, lt).unwrap();

        let one = fm.int(1).unwrap();
        let product = fm.times(vec![x, y]).unwrap();
        let nonlinear = fm.eq(product, one).unwrap();
        assert!(matches!(s.solve(&mut fm, &[nonlinear]), Err(Error::NonLinear(_))));

        assert!(s.solve(&mut fm, &[]).unwrap());
        assert_eq!(s.assertions().cloned().collect::<Vec<_>>(), vec![Assertion::Plain(lt)]);
        assert!(matches!(s.pop(1), Err(Error::Pop { requested: 1, available: 0 })))
    }

    #[test]
    fn all_sat_enumerates_assignments() {
        let mut fm = FormulaManager::new();
        let p = fm.symbol("p", Ty::Bool).unwrap();
        let q = fm.symbol("q", Ty::Bool).unwrap();
        let (u, v) = bv_vars(&mut fm);
        let mut s = solver(SolverOptions::default());

        let either = fm.or(vec![p, q]).unwrap();
        let lt = fm.bvult(u, v).unwrap();
        let q_needs_lt = fm.implies(q, lt).unwrap();
        s.add_assertion(&mut fm, either).unwrap();
        s.add_assertion(&mut fm, q_needs_lt).unwrap();
        let before = s.assertions().cloned().collect::<Vec<_>>();

        let mut seen = Vec::new();
        let count = s.all_sat(&mut fm, &[p, q], |literals| {
            seen.push(literals.to_vec());
            true
        });
        assert_eq!(count.unwrap(), 3);
        let not_p = fm.not(p).unwrap();
        let not_q = fm.not(q).unwrap();
        assert_eq!(seen.len(), 3);
        for expected in &[vec![p, q], vec![p, not_q], vec![not_p, q]] {
            assert!(seen.contains(expected))
        }
        assert_eq!(s.assertions().cloned().collect::<Vec<_>>(), before);

        // Stopping early
        assert_eq!(s.all_sat(&mut fm, &[p, q], |_| false).unwrap(), 1);

        // An unsatisfiable problem has no assignments
        let ge = fm.bvule(v, u).unwrap();
        s.add_assertion(&mut fm, ge).unwrap();
        s.add_assertion(&mut fm, q).unwrap();
        assert_eq!(s.all_sat(&mut fm, &[p], |_| true).unwrap(), 0);

        assert!(matches!(s.all_sat(&mut fm, &[u], |_| true), Err(Error::Type(_))));
        assert!(s.pop(1).is_err())
    }

    fn contradictory(fm: &mut FormulaManager) -> Vec<(FNode, &'static str)> {
        let (x, y) = bv_vars(fm);
        let two = fm.bv(2, 4).unwrap();
        let one = fm.bv(1, 4).unwrap();
        let a = fm.bvult(two, x).unwrap();
        let b = fm.bvult(x, one).unwrap();
        let c = fm.eq(y, one).unwrap();
        vec![(a, "a"), (b, "b"), (c, "c")]
    }

    #[test]
    fn named_unsat_core() {
        let mut fm = FormulaManager::new();
        let mut s = solver(SolverOptions::default().with_unsat_cores(UnsatCoreMode::Named));
        let assertions = contradictory(&mut fm);
        s.add_named_assertion(&mut fm, assertions[0].0, "a").unwrap();
        s.add_assertion(&mut fm, assertions[1].0).unwrap();
        s.add_named_assertion(&mut fm, assertions[2].0, "c").unwrap();
        assert!(!s.solve(&mut fm, &[]).unwrap());

        let core = s.named_unsat_core(&mut fm).unwrap();
        let names: Vec<&str> = core.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["_a_1", "a"]);
        assert_eq!(core["a"], assertions[0].0);
        assert_eq!(core["_a_1"], assertions[1].0);

        let formulas = s.unsat_core(&mut fm).unwrap();
        assert_eq!(formulas.len(), 2);
    }

    #[test]
    fn all_unsat_core() {
        let mut fm = FormulaManager::new();
        let mut s = solver(SolverOptions::default().with_unsat_cores(UnsatCoreMode::All));
        for (f, _) in contradictory(&mut fm) {
            s.add_assertion(&mut fm, f).unwrap();
        }
        assert!(!s.solve(&mut fm, &[]).unwrap());
        let core = s.unsat_core(&mut fm).unwrap();
        assert_eq!(core.len(), 2);
        let named = s.named_unsat_core(&mut fm).unwrap();
        assert_eq!(named.keys().cloned().collect::<Vec<_>>(), vec!["_a0".to_string(), "_a1".to_string()]);
    }

    #[test]
    fn unsat_core_status_errors() {
        let mut fm = FormulaManager::new();
        let (x, y) = bv_vars(&mut fm);
        let lt = fm.bvult(x, y).unwrap();

        let mut s = solver(SolverOptions::default());
        s.add_assertion(&mut fm, lt).unwrap();
        s.solve(&mut fm, &[]).unwrap();
        assert!(matches!(s.unsat_core(&mut fm), Err(Error::NotConfiguredForUnsatCores)));

        let mut s = solver(SolverOptions::default().with_unsat_cores(UnsatCoreMode::Named));
        s.add_assertion(&mut fm, lt).unwrap();
        assert!(s.solve(&mut fm, &[]).unwrap());
        assert!(matches!(s.named_unsat_core(&mut fm), Err(Error::Status(_))));

        let gt = fm.bvult(y, x).unwrap();
        s.add_assertion(&mut fm, gt).unwrap();
        assert!(!s.solve(&mut fm, &[]).unwrap());
        s.push(1).unwrap();
        match s.named_unsat_core(&mut fm) {
            Err(Error::Status(msg)) => assert!(msg.contains("'push'")),
            other => panic!("expected a status error, got {:?}", other),
        }
    }

    #[test]
    fn reset_clears_everything() {
        let mut fm = FormulaManager::new();
        let (x, y) = bv_vars(&mut fm);
        let mut s = solver(SolverOptions::default());
        let lt = fm.bvult(x, y).unwrap();
        let gt = fm.bvult(y, x).unwrap();
        s.push(2).unwrap();
        s.add_assertion(&mut fm, lt).unwrap();
        s.add_assertion(&mut fm, gt).unwrap();
        assert!(!s.solve(&mut fm, &[]).unwrap());
        s.reset_assertions().unwrap();
        assert_eq!(s.assertions().count(), 0);
        assert!(s.solve(&mut fm, &[]).unwrap());
        assert!(s.pop(1).is_err())
    }

    #[derive(Clone, Debug)]
    enum Step {
        Assert(usize),
        Push(usize),
        Pop(usize),
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![(0..5usize).prop_map(Step::Assert), (1..3usize).prop_map(Step::Push), (1..3usize).prop_map(Step::Pop)]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn balanced_push_pop_through_the_solver(initial in prop::collection::vec(0..5usize, 0..3), steps in prop::collection::vec(step(), 0..12)) {
            let mut fm = FormulaManager::new();
            let (u, v) = bv_vars(&mut fm);
            let one = fm.bv(1, 4).unwrap();
            let pool = vec![
                fm.bvult(u, v).unwrap(),
                fm.bvult(v, u).unwrap(),
                fm.eq(u, v).unwrap(),
                fm.eq(u, one).unwrap(),
                fm.bvule(v, one).unwrap(),
            ];

            let mut s = solver(SolverOptions::default());
            for i in initial {
                s.add_assertion(&mut fm, pool[i]).unwrap()
            }
            let before = s.assertions().cloned().collect::<Vec<_>>();
            let sat_before = s.solve(&mut fm, &[]).unwrap();

            s.push(1).unwrap();
            let mut pushed = 0;
            for step in steps {
                match step {
                    Step::Assert(i) => s.add_assertion(&mut fm, pool[i]).unwrap(),
                    Step::Push(n) => {
                        s.push(n).unwrap();
                        pushed += n
                    }
                    Step::Pop(n) => {
                        let n = n.min(pushed);
                        s.pop(n).unwrap();
                        pushed -= n
                    }
                }
                s.solve(&mut fm, &[]).unwrap();
            }
            s.pop(pushed + 1).unwrap();

            prop_assert_eq!(s.assertions().cloned().collect::<Vec<_>>(), before);
            prop_assert_eq!(s.solve(&mut fm, &[]).unwrap(), sat_before);
            prop_assert!(s.pop(1).is_err());
        }
    }
}
