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


//! Backends only accept uninterpreted functions over non-boolean
//! arguments. This pass removes boolean arguments by specialising
//! each such function into one function per assignment of its
//! boolean arguments, and selecting between the specialisations with
//! a tree of `ite`s over the actual arguments.
//!
//! The specialisation of `f` for assignment number `i` is always
//! named `$f#i`, so every application of `f`, in any formula,
//! selects the same function for the same truth values.

use std::collections::HashMap;

use crate::error::Error;
use crate::formula::{FNode, FormulaManager, Op, Ty, RESERVED_PREFIX};

#[derive(Default)]
pub struct UfBoolRewriter {
    memo: HashMap<FNode, FNode>,
}

impl UfBoolRewriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rewrite `f`. Formulas containing no applications with boolean
    /// arguments are returned unchanged.
    pub fn rewrite(&mut self, fm: &mut FormulaManager, f: FNode) -> Result<FNode, Error> {
        if let Some(g) = self.memo.get(&f) {
            return Ok(*g);
        }

        let args = fm.args(f).to_vec();
        let g = if args.is_empty() {
            f
        } else {
            let mut new_args = Vec::with_capacity(args.len());
            for arg in &args {
                new_args.push(self.rewrite(fm, *arg)?)
            }
            if *fm.op(f) == Op::Apply {
                specialise(fm, new_args)?
            } else if new_args == args {
                f
            } else {
                let op = fm.op(f).clone();
                fm.intern(op, new_args)?
            }
        };

        self.memo.insert(f, g);
        Ok(g)
    }
}

fn specialise(fm: &mut FormulaManager, app: Vec<FNode>) -> Result<FNode, Error> {
    let (name, ret) = match fm.op(app[0]) {
        Op::Symbol(name, Ty::Function(_, ret)) => (name.clone(), (**ret).clone()),
        _ => return Err(Error::Type("application of a non-function".to_string())),
    };

    let (bools, others): (Vec<FNode>, Vec<FNode>) = app[1..].iter().partition(|arg| fm.ty(**arg).is_bool());
    if bools.is_empty() {
        return fm.intern(Op::Apply, app);
    }

    let ty = if others.is_empty() {
        ret
    } else {
        Ty::function(others.iter().map(|arg| fm.ty(*arg).clone()).collect(), ret)
    };

    let mut choices = Vec::with_capacity(1 << bools.len());
    for i in 0..(1usize << bools.len()) {
        let symbol = fm.intern(Op::Symbol(format!("{}{}#{}", RESERVED_PREFIX, name, i), ty.clone()), vec![])?;
        choices.push(if others.is_empty() { symbol } else { fm.apply(symbol, others.clone())? })
    }

    // Each boolean argument halves the remaining choices
    for b in &bools {
        let mut next = Vec::with_capacity(choices.len() / 2);
        while let (Some(lhs), Some(rhs)) = (choices.pop(), choices.pop()) {
            next.push(match fm.op(*b) {
                Op::Bool(true) => lhs,
                Op::Bool(false) => rhs,
                _ => fm.ite(*b, lhs, rhs)?,
            })
        }
        choices = next
    }

    choices.pop().ok_or_else(|| Error::Unsupported(format!("specialising {}", name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::bounded::Bounded;
    use crate::config::SolverOptions;
    use crate::solver::Solver;
    use proptest::prelude::*;

    fn solver() -> Solver<Bounded> {
        let options = SolverOptions::default();
        Solver::new(Bounded::new(&options).unwrap(), options)
    }

    // Satisfiability of the rewriting of `f` with some boolean
    // symbols fixed after rewriting
    fn sat_under(fm: &mut FormulaManager, f: FNode, fixed: &[(FNode, bool)]) -> bool {
        let mut subst = HashMap::new();
        for (var, value) in fixed {
            subst.insert(*var, fm.bool(*value).unwrap());
        }
        let rewritten = UfBoolRewriter::new().rewrite(fm, f).unwrap();
        let g = fm.substitute(rewritten, &subst).unwrap();
        solver().is_sat(fm, g).unwrap()
    }

    #[test]
    fn specialisations_are_named_deterministically() {
        let mut fm = FormulaManager::new();
        let h = fm.symbol("h", Ty::function(vec![Ty::Bool, Ty::Int, Ty::Bool], Ty::Int)).unwrap();
        let p = fm.symbol("p", Ty::Bool).unwrap();
        let q = fm.symbol("q", Ty::Bool).unwrap();
        let x = fm.symbol("x", Ty::Int).unwrap();
        let app = fm.apply(h, vec![p, x, q]).unwrap();
        let f = fm.eq(app, x).unwrap();

        let g = UfBoolRewriter::new().rewrite(&mut fm, f).unwrap();
        assert_ne!(f, g);
        for i in 0..4 {
            let specialised = fm.get_symbol(&format!("$h#{}", i)).unwrap();
            assert_eq!(fm.ty(specialised), &Ty::function(vec![Ty::Int], Ty::Int))
        }
        assert!(fm.get_symbol("$h#4").is_none());

        // A second rewriter agrees with the first
        assert_eq!(UfBoolRewriter::new().rewrite(&mut fm, f).unwrap(), g)
    }

    #[test]
    fn constant_arguments_short_circuit() {
        let mut fm = FormulaManager::new();
        let g = fm.symbol("g", Ty::function(vec![Ty::Bool], Ty::Int)).unwrap();
        let t = fm.bool(true).unwrap();
        let app = fm.apply(g, vec![t]).unwrap();
        let rewritten = UfBoolRewriter::new().rewrite(&mut fm, app).unwrap();
        assert!(fm.is_symbol(rewritten));
        assert_eq!(fm.ty(rewritten), &Ty::Int)
    }

    #[test]
    fn one_boolean_argument() {
        let mut fm = FormulaManager::new();
        let g = fm.symbol("g", Ty::function(vec![Ty::Bool], Ty::BitVec(4))).unwrap();
        let p = fm.symbol("p", Ty::Bool).unwrap();
        let t = fm.bool(true).unwrap();
        let one = fm.bv(1, 4).unwrap();
        let two = fm.bv(2, 4).unwrap();
        let gp = fm.apply(g, vec![p]).unwrap();
        let gt = fm.apply(g, vec![t]).unwrap();
        let c1 = fm.eq(gp, one).unwrap();
        let c2 = fm.eq(gt, two).unwrap();
        let f = fm.and(vec![c1, c2]).unwrap();

        // g(p) = 1 /\ g(true) = 2 holds exactly when p is false
        assert!(!sat_under(&mut fm, f, &[(p, true)]));
        assert!(sat_under(&mut fm, f, &[(p, false)]));
    }

    #[test]
    fn two_boolean_arguments() {
        let mut fm = FormulaManager::new();
        let h = fm.symbol("h", Ty::function(vec![Ty::Bool, Ty::BitVec(4), Ty::Bool], Ty::BitVec(4))).unwrap();
        let p = fm.symbol("p", Ty::Bool).unwrap();
        let q = fm.symbol("q", Ty::Bool).unwrap();
        let x = fm.symbol("x", Ty::BitVec(4)).unwrap();
        let one = fm.bv(1, 4).unwrap();
        let two = fm.bv(2, 4).unwrap();
        let hpq = fm.apply(h, vec![p, x, q]).unwrap();
        let hqp = fm.apply(h, vec![q, x, p]).unwrap();
        let c1 = fm.eq(hpq, one).unwrap();
        let c2 = fm.eq(hqp, two).unwrap();
        let f = fm.and(vec![c1, c2]).unwrap();

        // The two applications coincide exactly when p = q
        for (vp, vq) in &[(false, false), (false, true), (true, false), (true, true)] {
            assert_eq!(sat_under(&mut fm, f, &[(p, *vp), (q, *vq)]), vp != vq)
        }
    }

    #[derive(Clone, Debug)]
    enum Step {
        Plus(usize, usize),
        Apply(usize),
        Le(usize, usize),
        And(usize, usize),
        Not(usize),
        Ite(usize, usize, usize),
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![
            (any::<usize>(), any::<usize>()).prop_map(|(a, b)| Step::Plus(a, b)),
            any::<usize>().prop_map(Step::Apply),
            (any::<usize>(), any::<usize>()).prop_map(|(a, b)| Step::Le(a, b)),
            (any::<usize>(), any::<usize>()).prop_map(|(a, b)| Step::And(a, b)),
            any::<usize>().prop_map(Step::Not),
            (any::<usize>(), any::<usize>(), any::<usize>()).prop_map(|(c, a, b)| Step::Ite(c, a, b)),
        ]
    }

    proptest! {
        #[test]
        fn identity_without_boolean_arguments(steps in prop::collection::vec(step(), 1..40)) {
            let mut fm = FormulaManager::new();
            let f = fm.symbol("f", Ty::function(vec![Ty::Int], Ty::Int)).unwrap();
            let mut ints = vec![fm.symbol("x", Ty::Int).unwrap(), fm.symbol("y", Ty::Int).unwrap(), fm.int(1).unwrap()];
            let mut bools = vec![fm.symbol("p", Ty::Bool).unwrap()];

            for step in steps {
                match step {
                    Step::Plus(a, b) => {
                        let (a, b) = (ints[a % ints.len()], ints[b % ints.len()]);
                        ints.push(fm.plus(vec![a, b]).unwrap())
                    }
                    Step::Apply(a) => {
                        let a = ints[a % ints.len()];
                        ints.push(fm.apply(f, vec![a]).unwrap())
                    }
                    Step::Le(a, b) => {
                        let (a, b) = (ints[a % ints.len()], ints[b % ints.len()]);
                        bools.push(fm.le(a, b).unwrap())
                    }
                    Step::And(a, b) => {
                        let (a, b) = (bools[a % bools.len()], bools[b % bools.len()]);
                        bools.push(fm.and(vec![a, b]).unwrap())
                    }
                    Step::Not(a) => {
                        let a = bools[a % bools.len()];
                        bools.push(fm.not(a).unwrap())
                    }
                    Step::Ite(c, a, b) => {
                        let (c, a, b) = (bools[c % bools.len()], ints[a % ints.len()], ints[b % ints.len()]);
                        ints.push(fm.ite(c, a, b).unwrap())
                    }
                }
            }

            let mut rewriter = UfBoolRewriter::new();
            for root in bools.iter().chain(ints.iter()) {
                prop_assert_eq!(rewriter.rewrite(&mut fm, *root).unwrap(), *root)
            }
        }
    }
}
