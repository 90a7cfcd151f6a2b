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


//! Conversion of formulas into backend terms and back.
//!
//! The forward direction is a memoised recursive walk over the
//! formula DAG. The backward direction cannot rely on the backend
//! exposing sharing, and backend terms can be much deeper than the
//! formulas we build, so it uses an explicit stack and a memo table
//! keyed by backend term identity.

use num_bigint::BigInt;
use num_rational::BigRational;
use std::collections::HashMap;

use tracing::warn;

use crate::backend::{Backend, Kind, Numeral, SortShape};
use crate::error::Error;
use crate::formula::{FNode, FormulaManager, Op, Ty};
use crate::rewrite::UfBoolRewriter;
use crate::signature;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Slot {
    Pending,
    Done(FNode),
}

enum Visit<S, D, T> {
    Enter(T),
    Exit(T, Kind<S, D>, Vec<T>),
}

pub fn sort_to_type<B: Backend>(backend: &B, sort: &B::Sort) -> Result<Ty, Error> {
    Ok(match backend.sort_shape(sort)? {
        SortShape::Bool => Ty::Bool,
        SortShape::Int => Ty::Int,
        SortShape::Real => Ty::Real,
        SortShape::BitVec(w) => Ty::BitVec(w),
        SortShape::Array(index, elem) => Ty::array(sort_to_type(backend, &index)?, sort_to_type(backend, &elem)?),
        SortShape::Function(params, ret) => Ty::function(
            params.iter().map(|param| sort_to_type(backend, param)).collect::<Result<_, _>>()?,
            sort_to_type(backend, &ret)?,
        ),
    })
}

fn resolve_decl<B: Backend>(
    backend: &B,
    decl_to_symbol: &mut HashMap<u64, FNode>,
    symbol_to_decl: &mut HashMap<FNode, B::Decl>,
    fm: &mut FormulaManager,
    decl: B::Decl,
) -> Result<FNode, Error> {
    let id = backend.decl_id(&decl);
    if let Some(symbol) = decl_to_symbol.get(&id) {
        return Ok(*symbol);
    }
    // A declaration we did not make ourselves, e.g. one introduced by
    // the backend while solving
    let ty = sort_to_type(backend, &backend.decl_sort(&decl)?)?;
    let symbol = fm.intern(Op::Symbol(backend.decl_name(&decl), ty), vec![])?;
    decl_to_symbol.insert(id, symbol);
    symbol_to_decl.insert(symbol, decl);
    Ok(symbol)
}

fn native_kind<S, D>(op: &Op) -> Option<Kind<S, D>> {
    use Op::*;
    Some(match op {
        Not => Kind::Not,
        Iff => Kind::Iff,
        Equals => Kind::Eq,
        Le => Kind::Leq,
        BvNot => Kind::BvNot,
        BvAnd => Kind::BvAnd,
        BvOr => Kind::BvOr,
        BvXor => Kind::BvXor,
        BvAdd => Kind::BvAdd,
        BvSub => Kind::BvSub,
        BvNeg => Kind::BvNeg,
        BvMul => Kind::BvMul,
        BvUdiv => Kind::BvUdiv,
        BvUrem => Kind::BvUrem,
        BvSdiv => Kind::BvSdiv,
        BvSrem => Kind::BvSrem,
        BvShl => Kind::BvShl,
        BvLshr => Kind::BvLshr,
        BvAshr => Kind::BvAshr,
        BvUlt => Kind::BvUlt,
        BvUle => Kind::BvUle,
        BvSlt => Kind::BvSlt,
        BvSle => Kind::BvSle,
        BvConcat => Kind::BvConcat,
        BvComp => Kind::BvComp,
        BvExtract(hi, lo) => Kind::BvExtract(*hi, *lo),
        BvZeroExtend(n) => Kind::BvZeroExtend(*n),
        BvSignExtend(n) => Kind::BvSignExtend(*n),
        BvRotateLeft(n) => Kind::BvRotateLeft(*n),
        BvRotateRight(n) => Kind::BvRotateRight(*n),
        Select => Kind::ArrayRead,
        Store => Kind::ArrayWrite,
        _ => return None,
    })
}

pub struct Converter<B: Backend> {
    backend: B,
    rewriter: UfBoolRewriter,
    symbol_to_decl: HashMap<FNode, B::Decl>,
    decl_to_symbol: HashMap<u64, FNode>,
    forward: HashMap<FNode, B::Term>,
    // Terms are kept alive alongside their slot so their identities
    // cannot be reused by the backend.
    backward: HashMap<u64, (B::Term, Slot)>,
}

impl<B: Backend> Converter<B> {
    pub fn new(backend: B) -> Self {
        Converter {
            backend,
            rewriter: UfBoolRewriter::new(),
            symbol_to_decl: HashMap::new(),
            decl_to_symbol: HashMap::new(),
            forward: HashMap::new(),
            backward: HashMap::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn type_to_sort(&mut self, ty: &Ty) -> Result<B::Sort, Error> {
        let shape = match ty {
            Ty::Bool => SortShape::Bool,
            Ty::Int => SortShape::Int,
            Ty::Real => SortShape::Real,
            Ty::BitVec(w) => SortShape::BitVec(*w),
            Ty::Array(index, elem) => SortShape::Array(self.type_to_sort(index)?, self.type_to_sort(elem)?),
            Ty::Function(params, ret) => {
                let params = params.iter().map(|param| self.type_to_sort(param)).collect::<Result<_, _>>()?;
                SortShape::Function(params, self.type_to_sort(ret)?)
            }
        };
        self.backend.mk_sort(shape)
    }

    pub fn sort_to_type(&self, sort: &B::Sort) -> Result<Ty, Error> {
        sort_to_type(&self.backend, sort)
    }

    /// Declare a symbol in the backend, unless it already has been.
    pub fn declare_variable(&mut self, fm: &FormulaManager, symbol: FNode) -> Result<B::Decl, Error> {
        if let Some(decl) = self.symbol_to_decl.get(&symbol) {
            return Ok(decl.clone());
        }
        let (name, ty) = match fm.op(symbol) {
            Op::Symbol(name, ty) => (name, ty),
            _ => return Err(Error::Type(format!("cannot declare {}, it is not a symbol", fm.show(symbol)))),
        };
        let sort = self.type_to_sort(ty)?;
        let decl = self.backend.declare(name, &sort)?;
        self.decl_to_symbol.insert(self.backend.decl_id(&decl), symbol);
        self.symbol_to_decl.insert(symbol, decl.clone());
        Ok(decl)
    }

    /// Convert a formula into a backend term, rewriting away boolean
    /// arguments to uninterpreted functions first.
    pub fn convert(&mut self, fm: &mut FormulaManager, formula: FNode) -> Result<B::Term, Error> {
        let rewritten = self.rewriter.rewrite(fm, formula)?;
        if rewritten != formula {
            warn!(formula = %fm.show(formula), "uninterpreted functions with boolean arguments have been rewritten")
        }
        self.walk(fm, rewritten)
    }

    fn walk_all(&mut self, fm: &FormulaManager, args: &[FNode]) -> Result<Vec<B::Term>, Error> {
        args.iter().map(|arg| self.walk(fm, *arg)).collect()
    }

    fn mk(&mut self, kind: Kind<B::Sort, B::Decl>, args: &[B::Term]) -> Result<B::Term, Error> {
        self.backend.mk_term(kind, args)
    }

    fn fold(&mut self, kind: Kind<B::Sort, B::Decl>, args: Vec<B::Term>) -> Result<B::Term, Error> {
        let mut args = args.into_iter();
        let mut acc = args.next().ok_or_else(|| Error::Unsupported(format!("{:?} with no arguments", kind)))?;
        for arg in args {
            acc = self.mk(kind.clone(), &[acc, arg])?
        }
        Ok(acc)
    }

    fn numeral(&mut self, n: i64, ty: &Ty) -> Result<B::Term, Error> {
        let numeral = if *ty == Ty::Real {
            Numeral::Real(BigRational::from_integer(BigInt::from(n)))
        } else {
            Numeral::Int(BigInt::from(n))
        };
        self.mk(Kind::Numeral(numeral), &[])
    }

    fn walk(&mut self, fm: &FormulaManager, f: FNode) -> Result<B::Term, Error> {
        if let Some(term) = self.forward.get(&f) {
            return Ok(term.clone());
        }

        use Op::*;
        let node = &fm[f];
        let term = match &node.op {
            Symbol(_, ty) if ty.is_function() => {
                return Err(Error::Unsupported(format!("function symbol {} used as a value", fm.show(f))))
            }
            Symbol(_, _) => {
                let decl = self.declare_variable(fm, f)?;
                self.mk(Kind::Constant(decl), &[])?
            }
            Bool(true) => self.mk(Kind::True, &[])?,
            Bool(false) => self.mk(Kind::False, &[])?,
            Int(n) => self.mk(Kind::Numeral(Numeral::Int(n.clone())), &[])?,
            Real(q) => self.mk(Kind::Numeral(Numeral::Real(q.clone())), &[])?,
            Bits(value, width) => self.mk(Kind::Numeral(Numeral::Bits(value.clone(), *width)), &[])?,
            And | Or if node.args.is_empty() => self.mk(if node.op == And { Kind::True } else { Kind::False }, &[])?,
            And => {
                let args = self.walk_all(fm, &node.args)?;
                self.fold(Kind::And, args)?
            }
            Or => {
                let args = self.walk_all(fm, &node.args)?;
                self.fold(Kind::Or, args)?
            }
            Implies => {
                let args = self.walk_all(fm, &node.args)?;
                let not_lhs = self.mk(Kind::Not, &args[0..1])?;
                self.mk(Kind::Or, &[not_lhs, args[1].clone()])?
            }
            Ite if node.ty.is_bool() => {
                // (c -> t) /\ (~c -> e)
                let args = self.walk_all(fm, &node.args)?;
                let not_cond = self.mk(Kind::Not, &args[0..1])?;
                let then_branch = self.mk(Kind::Or, &[not_cond, args[1].clone()])?;
                let else_branch = self.mk(Kind::Or, &[args[0].clone(), args[2].clone()])?;
                self.mk(Kind::And, &[then_branch, else_branch])?
            }
            Ite => {
                let args = self.walk_all(fm, &node.args)?;
                self.mk(Kind::Ite, &args)?
            }
            Lt => {
                let args = self.walk_all(fm, &node.args)?;
                let geq = self.mk(Kind::Leq, &[args[1].clone(), args[0].clone()])?;
                self.mk(Kind::Not, &[geq])?
            }
            Plus => {
                let args = self.walk_all(fm, &node.args)?;
                self.fold(Kind::Plus, args)?
            }
            Minus => {
                let args = self.walk_all(fm, &node.args)?;
                let minus_one = self.numeral(-1, &node.ty)?;
                let negated = self.mk(Kind::Times, &[minus_one, args[1].clone()])?;
                self.mk(Kind::Plus, &[args[0].clone(), negated])?
            }
            Times => {
                let args = self.walk_all(fm, &node.args)?;
                let mut symbolic = 0;
                for arg in &args {
                    if !self.backend.is_numeral(arg)? {
                        symbolic += 1
                    }
                }
                if symbolic > 1 {
                    return Err(Error::NonLinear(fm.show(f).to_string()));
                }
                self.fold(Kind::Times, args)?
            }
            // Backends accept integers wherever reals are expected
            ToReal => self.walk(fm, node.args[0])?,
            Apply => {
                let decl = self.declare_variable(fm, node.args[0])?;
                let args = self.walk_all(fm, &node.args[1..])?;
                self.mk(Kind::Uf(decl), &args)?
            }
            ArrayValue(_) => {
                let sort = self.type_to_sort(&node.ty)?;
                let default = self.walk(fm, node.args[0])?;
                let mut array = self.mk(Kind::ArrayConst(sort), &[default])?;
                for pair in node.args[1..].chunks(2) {
                    let index = self.walk(fm, pair[0])?;
                    let elem = self.walk(fm, pair[1])?;
                    array = self.mk(Kind::ArrayWrite, &[array, index, elem])?
                }
                array
            }
            op => match native_kind(op) {
                Some(kind) => {
                    let args = self.walk_all(fm, &node.args)?;
                    self.mk(kind, &args)?
                }
                None => return Err(Error::Unsupported(format!("no conversion for {}", fm.show(f)))),
            },
        };

        self.forward.insert(f, term.clone());
        Ok(term)
    }

    fn converted(&self, term: &B::Term) -> Result<FNode, Error> {
        match self.backward.get(&self.backend.term_id(term)) {
            Some((_, Slot::Done(f))) => Ok(*f),
            _ => Err(Error::Unsupported(format!("backend term {:?} was not converted", term))),
        }
    }

    /// Convert a backend term back into a formula, coercing integer
    /// arguments wherever the recovered signature expects a real.
    pub fn back(&mut self, fm: &mut FormulaManager, term: &B::Term) -> Result<FNode, Error> {
        let mut stack = vec![Visit::Enter(term.clone())];

        while let Some(visit) = stack.pop() {
            match visit {
                Visit::Enter(t) => {
                    let id = self.backend.term_id(&t);
                    if self.backward.contains_key(&id) {
                        continue;
                    }
                    let (kind, children) = self.backend.view(&t)?;
                    self.backward.insert(id, (t.clone(), Slot::Pending));
                    let pending: Vec<B::Term> = children.iter().rev().cloned().collect();
                    stack.push(Visit::Exit(t, kind, children));
                    for child in pending {
                        stack.push(Visit::Enter(child))
                    }
                }

                Visit::Exit(t, kind, children) => {
                    let args = children.iter().map(|child| self.converted(child)).collect::<Result<Vec<_>, _>>()?;

                    let backend = &self.backend;
                    let decl_to_symbol = &mut self.decl_to_symbol;
                    let symbol_to_decl = &mut self.symbol_to_decl;
                    let kind = kind.try_map(
                        |sort| sort_to_type(backend, &sort),
                        |decl| resolve_decl(backend, decl_to_symbol, symbol_to_decl, fm, decl),
                    )?;

                    let sig = signature::infer(fm, &kind, &args)?;
                    let mut coerced = Vec::with_capacity(args.len());
                    for (arg, expected) in args.iter().zip(sig.params.iter()) {
                        coerced.push(signature::coerce(fm, *arg, expected)?)
                    }
                    let f = signature::build(fm, kind, coerced)?;

                    let id = self.backend.term_id(&t);
                    self.backward.insert(id, (t, Slot::Done(f)));
                }
            }
        }

        self.converted(term)
    }

    /// True if the term is an occurrence of a declared non-function
    /// symbol.
    pub fn is_constant(&mut self, term: &B::Term) -> Result<bool, Error> {
        match self.backend.view(term)?.0 {
            Kind::Constant(decl) => {
                let ty = sort_to_type(&self.backend, &self.backend.decl_sort(&decl)?)?;
                Ok(!ty.is_function())
            }
            _ => Ok(false),
        }
    }
}
