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


//! A small hash-consed formula language. Formulas are allocated in
//! an arena owned by a [FormulaManager], and structurally identical
//! formulas are always the same [FNode], so formulas can be copied
//! and compared freely and used as keys for memoisation.

use ahash::AHashMap;
use id_arena::{Arena, Id};
use num_bigint::{BigInt, BigUint};
use num_rational::BigRational;
use num_traits::Signed;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::ops::Index;

use crate::error::Error;

/// Symbols whose names begin with this character can only be created
/// by the library itself.
pub const RESERVED_PREFIX: char = '$';

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Ty {
    Bool,
    Int,
    Real,
    BitVec(u32),
    Array(Box<Ty>, Box<Ty>),
    Function(Vec<Ty>, Box<Ty>),
}

impl Ty {
    pub fn is_bool(&self) -> bool {
        matches!(self, Ty::Bool)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Ty::Int | Ty::Real)
    }

    pub fn is_function(&self) -> bool {
        matches!(self, Ty::Function(_, _))
    }

    pub fn bv_width(&self) -> Option<u32> {
        match self {
            Ty::BitVec(w) => Some(*w),
            _ => None,
        }
    }

    pub fn array(index: Ty, elem: Ty) -> Self {
        Ty::Array(Box::new(index), Box::new(elem))
    }

    pub fn function(params: Vec<Ty>, ret: Ty) -> Self {
        Ty::Function(params, Box::new(ret))
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Ty::Bool => write!(f, "Bool"),
            Ty::Int => write!(f, "Int"),
            Ty::Real => write!(f, "Real"),
            Ty::BitVec(w) => write!(f, "(_ BitVec {})", w),
            Ty::Array(i, e) => write!(f, "(Array {} {})", i, e),
            Ty::Function(params, ret) => {
                write!(f, "(->")?;
                for p in params {
                    write!(f, " {}", p)?
                }
                write!(f, " {})", ret)
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Op {
    Symbol(String, Ty),
    Bool(bool),
    Int(BigInt),
    Real(BigRational),
    Bits(BigUint, u32),
    And,
    Or,
    Not,
    Implies,
    Iff,
    Ite,
    Equals,
    Le,
    Lt,
    Plus,
    Minus,
    Times,
    ToReal,
    /// The first child is the function symbol being applied.
    Apply,
    BvNot,
    BvAnd,
    BvOr,
    BvXor,
    BvAdd,
    BvSub,
    BvNeg,
    BvMul,
    BvUdiv,
    BvUrem,
    BvSdiv,
    BvSrem,
    BvShl,
    BvLshr,
    BvAshr,
    BvUlt,
    BvUle,
    BvSlt,
    BvSle,
    BvConcat,
    BvComp,
    BvExtract(u32, u32),
    BvZeroExtend(u32),
    BvSignExtend(u32),
    BvRotateLeft(u32),
    BvRotateRight(u32),
    Select,
    Store,
    /// A constant array over the given index type. The first child is
    /// the default element, followed by index/element pairs.
    ArrayValue(Ty),
}

impl Op {
    pub fn name(&self) -> &'static str {
        use Op::*;
        match self {
            Symbol(_, _) => "symbol",
            Bool(_) | Int(_) | Real(_) | Bits(_, _) => "constant",
            And => "and",
            Or => "or",
            Not => "not",
            Implies => "=>",
            Iff => "iff",
            Ite => "ite",
            Equals => "=",
            Le => "<=",
            Lt => "<",
            Plus => "+",
            Minus => "-",
            Times => "*",
            ToReal => "to_real",
            Apply => "apply",
            BvNot => "bvnot",
            BvAnd => "bvand",
            BvOr => "bvor",
            BvXor => "bvxor",
            BvAdd => "bvadd",
            BvSub => "bvsub",
            BvNeg => "bvneg",
            BvMul => "bvmul",
            BvUdiv => "bvudiv",
            BvUrem => "bvurem",
            BvSdiv => "bvsdiv",
            BvSrem => "bvsrem",
            BvShl => "bvshl",
            BvLshr => "bvlshr",
            BvAshr => "bvashr",
            BvUlt => "bvult",
            BvUle => "bvule",
            BvSlt => "bvslt",
            BvSle => "bvsle",
            BvConcat => "concat",
            BvComp => "bvcomp",
            BvExtract(_, _) => "extract",
            BvZeroExtend(_) => "zero_extend",
            BvSignExtend(_) => "sign_extend",
            BvRotateLeft(_) => "rotate_left",
            BvRotateRight(_) => "rotate_right",
            Select => "select",
            Store => "store",
            ArrayValue(_) => "array",
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, Op::Bool(_) | Op::Int(_) | Op::Real(_) | Op::Bits(_, _))
    }
}

#[derive(Debug)]
pub struct Node {
    pub op: Op,
    pub args: Vec<FNode>,
    pub ty: Ty,
}

pub type FNode = Id<Node>;

/// A serializable copy of a formula DAG, independent of any
/// manager. Children always refer to earlier entries of `nodes`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortableFormula {
    pub nodes: Vec<(Op, Vec<u32>)>,
    pub roots: Vec<u32>,
}

fn arity(op: &Op, args: &[FNode], n: usize) -> Result<(), Error> {
    if args.len() == n {
        Ok(())
    } else {
        Err(Error::Type(format!("{} expects {} arguments, got {}", op.name(), n, args.len())))
    }
}

fn bv_width(op: &Op, ty: &Ty) -> Result<u32, Error> {
    ty.bv_width().ok_or_else(|| Error::Type(format!("{} expects a bitvector, got {}", op.name(), ty)))
}

fn all_of(op: &Op, tys: &[&Ty], expected: &Ty) -> Result<(), Error> {
    match tys.iter().find(|ty| **ty != expected) {
        Some(ty) => Err(Error::Type(format!("{} expects arguments of type {}, got {}", op.name(), expected, ty))),
        None => Ok(()),
    }
}

macro_rules! unary_constructor {
    ($name: ident, $op: expr) => {
        pub fn $name(&mut self, arg: FNode) -> Result<FNode, Error> {
            self.intern($op, vec![arg])
        }
    };
}

macro_rules! binary_constructor {
    ($name: ident, $op: expr) => {
        pub fn $name(&mut self, lhs: FNode, rhs: FNode) -> Result<FNode, Error> {
            self.intern($op, vec![lhs, rhs])
        }
    };
}

pub struct FormulaManager {
    arena: Arena<Node>,
    table: AHashMap<(Op, Vec<FNode>), FNode>,
    symbols: AHashMap<String, FNode>,
    next_fresh: usize,
}

impl Index<FNode> for FormulaManager {
    type Output = Node;

    fn index(&self, f: FNode) -> &Self::Output {
        &self.arena[f]
    }
}

impl Default for FormulaManager {
    fn default() -> Self {
        Self::new()
    }
}

impl FormulaManager {
    pub fn new() -> Self {
        FormulaManager { arena: Arena::new(), table: AHashMap::new(), symbols: AHashMap::new(), next_fresh: 0 }
    }

    /// The number of distinct formulas allocated so far.
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.len() == 0
    }

    pub fn op(&self, f: FNode) -> &Op {
        &self.arena[f].op
    }

    pub fn args(&self, f: FNode) -> &[FNode] {
        &self.arena[f].args
    }

    pub fn ty(&self, f: FNode) -> &Ty {
        &self.arena[f].ty
    }

    /// Build a formula from an operator and its arguments. Symbols
    /// with reserved names are rejected.
    pub fn mk(&mut self, op: Op, args: Vec<FNode>) -> Result<FNode, Error> {
        if let Op::Symbol(name, _) = &op {
            if name.starts_with(RESERVED_PREFIX) {
                return Err(Error::ReservedName(name.clone()));
            }
        }
        self.intern(op, args)
    }

    pub(crate) fn intern(&mut self, op: Op, args: Vec<FNode>) -> Result<FNode, Error> {
        if let Op::Symbol(name, ty) = &op {
            if let Some(existing) = self.symbols.get(name) {
                let existing_ty = &self.arena[*existing].ty;
                return if existing_ty == ty {
                    Ok(*existing)
                } else {
                    Err(Error::Type(format!("symbol {} already exists with type {}, not {}", name, existing_ty, ty)))
                };
            }
        }

        let key = (op, args);
        if let Some(f) = self.table.get(&key) {
            return Ok(*f);
        }
        let ty = self.infer(&key.0, &key.1)?;
        let f = self.arena.alloc(Node { op: key.0.clone(), args: key.1.clone(), ty });
        if let Op::Symbol(name, _) = &key.0 {
            self.symbols.insert(name.clone(), f);
        }
        self.table.insert(key, f);
        Ok(f)
    }

    fn infer(&self, op: &Op, args: &[FNode]) -> Result<Ty, Error> {
        use Op::*;
        let tys: Vec<&Ty> = args.iter().map(|arg| &self.arena[*arg].ty).collect();

        match op {
            Symbol(_, ty) => {
                arity(op, args, 0)?;
                Ok(ty.clone())
            }
            Bool(_) => arity(op, args, 0).map(|_| Ty::Bool),
            Int(_) => arity(op, args, 0).map(|_| Ty::Int),
            Real(_) => arity(op, args, 0).map(|_| Ty::Real),
            Bits(value, width) => {
                arity(op, args, 0)?;
                if *width == 0 || value.bits() > u64::from(*width) {
                    Err(Error::Type(format!("bitvector constant {} does not fit in {} bits", value, width)))
                } else {
                    Ok(Ty::BitVec(*width))
                }
            }
            And | Or => all_of(op, &tys, &Ty::Bool).map(|_| Ty::Bool),
            Not => {
                arity(op, args, 1)?;
                all_of(op, &tys, &Ty::Bool).map(|_| Ty::Bool)
            }
            Implies | Iff => {
                arity(op, args, 2)?;
                all_of(op, &tys, &Ty::Bool).map(|_| Ty::Bool)
            }
            Ite => {
                arity(op, args, 3)?;
                all_of(op, &tys[0..1], &Ty::Bool)?;
                all_of(op, &tys[2..], tys[1])?;
                Ok(tys[1].clone())
            }
            Equals => {
                arity(op, args, 2)?;
                all_of(op, &tys, tys[0])?;
                if tys[0].is_bool() || tys[0].is_function() {
                    Err(Error::Type(format!("= cannot compare values of type {}", tys[0])))
                } else {
                    Ok(Ty::Bool)
                }
            }
            Le | Lt | Minus => {
                arity(op, args, 2)?;
                all_of(op, &tys, tys[0])?;
                if !tys[0].is_numeric() {
                    Err(Error::Type(format!("{} expects numeric arguments, got {}", op.name(), tys[0])))
                } else if *op == Minus {
                    Ok(tys[0].clone())
                } else {
                    Ok(Ty::Bool)
                }
            }
            Plus | Times => match tys.first() {
                Some(ty) if ty.is_numeric() => all_of(op, &tys, ty).map(|_| (*ty).clone()),
                _ => Err(Error::Type(format!("{} expects at least one numeric argument", op.name()))),
            },
            ToReal => {
                arity(op, args, 1)?;
                all_of(op, &tys, &Ty::Int).map(|_| Ty::Real)
            }
            Apply => match tys.split_first() {
                Some((Ty::Function(params, ret), actuals)) => {
                    if params.len() != actuals.len() || params.iter().zip(actuals.iter()).any(|(p, a)| p != *a) {
                        Err(Error::Type(format!("function of type {} applied to wrong arguments", tys[0])))
                    } else {
                        Ok((**ret).clone())
                    }
                }
                _ => Err(Error::Type("apply expects a function symbol as its first argument".to_string())),
            },
            BvNot | BvNeg | BvRotateLeft(_) | BvRotateRight(_) => {
                arity(op, args, 1)?;
                bv_width(op, tys[0]).map(Ty::BitVec)
            }
            BvAnd | BvOr | BvXor | BvAdd | BvSub | BvMul | BvUdiv | BvUrem | BvSdiv | BvSrem | BvShl | BvLshr
            | BvAshr => {
                arity(op, args, 2)?;
                let w = bv_width(op, tys[0])?;
                all_of(op, &tys, tys[0]).map(|_| Ty::BitVec(w))
            }
            BvUlt | BvUle | BvSlt | BvSle | BvComp => {
                arity(op, args, 2)?;
                bv_width(op, tys[0])?;
                all_of(op, &tys, tys[0])?;
                Ok(if *op == BvComp { Ty::BitVec(1) } else { Ty::Bool })
            }
            BvConcat => {
                arity(op, args, 2)?;
                Ok(Ty::BitVec(bv_width(op, tys[0])? + bv_width(op, tys[1])?))
            }
            BvExtract(hi, lo) => {
                arity(op, args, 1)?;
                let w = bv_width(op, tys[0])?;
                if lo > hi || *hi >= w {
                    Err(Error::Type(format!("cannot extract bits {}..{} from a {} bit vector", hi, lo, w)))
                } else {
                    Ok(Ty::BitVec(hi - lo + 1))
                }
            }
            BvZeroExtend(n) | BvSignExtend(n) => {
                arity(op, args, 1)?;
                Ok(Ty::BitVec(bv_width(op, tys[0])? + n))
            }
            Select => {
                arity(op, args, 2)?;
                match tys[0] {
                    Ty::Array(index, elem) if **index == *tys[1] => Ok((**elem).clone()),
                    _ => Err(Error::Type(format!("cannot select from {} with {}", tys[0], tys[1]))),
                }
            }
            Store => {
                arity(op, args, 3)?;
                match tys[0] {
                    Ty::Array(index, elem) if **index == *tys[1] && **elem == *tys[2] => Ok(tys[0].clone()),
                    _ => Err(Error::Type(format!("cannot store {} at {} in {}", tys[2], tys[1], tys[0]))),
                }
            }
            ArrayValue(index) => {
                if args.len() % 2 != 1 {
                    return Err(Error::Type("array value expects a default and index/element pairs".to_string()));
                }
                let elem = tys[0];
                for pair in tys[1..].chunks(2) {
                    if pair[0] != index || pair[1] != elem {
                        return Err(Error::Type(format!("array assignment {} -> {} in (Array {} {})", pair[0], pair[1], index, elem)));
                    }
                }
                Ok(Ty::array(index.clone(), elem.clone()))
            }
        }
    }

    pub fn symbol<S: Into<String>>(&mut self, name: S, ty: Ty) -> Result<FNode, Error> {
        self.mk(Op::Symbol(name.into(), ty), vec![])
    }

    /// Create a symbol that does not exist yet, with a reserved name
    /// derived from `template`.
    pub fn fresh_symbol(&mut self, ty: Ty, template: &str) -> Result<FNode, Error> {
        loop {
            let name = format!("{}{}_{}", RESERVED_PREFIX, template, self.next_fresh);
            self.next_fresh += 1;
            if !self.symbols.contains_key(&name) {
                return self.intern(Op::Symbol(name, ty), vec![]);
            }
        }
    }

    pub fn get_symbol(&self, name: &str) -> Option<FNode> {
        self.symbols.get(name).copied()
    }

    pub fn symbol_name(&self, f: FNode) -> Option<&str> {
        match self.op(f) {
            Op::Symbol(name, _) => Some(name),
            _ => None,
        }
    }

    pub fn is_symbol(&self, f: FNode) -> bool {
        matches!(self.op(f), Op::Symbol(_, _))
    }

    /// A literal is a boolean symbol or its negation.
    pub fn is_literal(&self, f: FNode) -> bool {
        match self.op(f) {
            Op::Symbol(_, Ty::Bool) => true,
            Op::Not => matches!(self.op(self.args(f)[0]), Op::Symbol(_, Ty::Bool)),
            _ => false,
        }
    }

    pub fn bool(&mut self, b: bool) -> Result<FNode, Error> {
        self.intern(Op::Bool(b), vec![])
    }

    pub fn int(&mut self, n: i64) -> Result<FNode, Error> {
        self.intern(Op::Int(BigInt::from(n)), vec![])
    }

    pub fn int_big(&mut self, n: BigInt) -> Result<FNode, Error> {
        self.intern(Op::Int(n), vec![])
    }

    pub fn real(&mut self, numer: i64, denom: i64) -> Result<FNode, Error> {
        if denom == 0 {
            return Err(Error::Type(format!("real constant {}/0 has a zero denominator", numer)));
        }
        self.real_q(BigRational::new(BigInt::from(numer), BigInt::from(denom)))
    }

    pub fn real_q(&mut self, q: BigRational) -> Result<FNode, Error> {
        self.intern(Op::Real(q), vec![])
    }

    pub fn bv(&mut self, value: u64, width: u32) -> Result<FNode, Error> {
        self.intern(Op::Bits(BigUint::from(value), width), vec![])
    }

    pub fn bv_big(&mut self, value: BigUint, width: u32) -> Result<FNode, Error> {
        self.intern(Op::Bits(value, width), vec![])
    }

    pub fn and(&mut self, args: Vec<FNode>) -> Result<FNode, Error> {
        match args.len() {
            0 => self.bool(true),
            1 => all_of(&Op::And, &[self.ty(args[0])], &Ty::Bool).map(|_| args[0]),
            _ => self.intern(Op::And, args),
        }
    }

    pub fn or(&mut self, args: Vec<FNode>) -> Result<FNode, Error> {
        match args.len() {
            0 => self.bool(false),
            1 => all_of(&Op::Or, &[self.ty(args[0])], &Ty::Bool).map(|_| args[0]),
            _ => self.intern(Op::Or, args),
        }
    }

    unary_constructor!(not, Op::Not);
    binary_constructor!(implies, Op::Implies);
    binary_constructor!(iff, Op::Iff);

    pub fn ite(&mut self, cond: FNode, then_branch: FNode, else_branch: FNode) -> Result<FNode, Error> {
        self.intern(Op::Ite, vec![cond, then_branch, else_branch])
    }

    /// Equality, which is `iff` for booleans.
    pub fn eq(&mut self, lhs: FNode, rhs: FNode) -> Result<FNode, Error> {
        if self.ty(lhs).is_bool() {
            self.iff(lhs, rhs)
        } else {
            self.intern(Op::Equals, vec![lhs, rhs])
        }
    }

    binary_constructor!(le, Op::Le);
    binary_constructor!(lt, Op::Lt);

    pub fn ge(&mut self, lhs: FNode, rhs: FNode) -> Result<FNode, Error> {
        self.le(rhs, lhs)
    }

    pub fn gt(&mut self, lhs: FNode, rhs: FNode) -> Result<FNode, Error> {
        self.lt(rhs, lhs)
    }

    pub fn plus(&mut self, args: Vec<FNode>) -> Result<FNode, Error> {
        self.sum_or_product(Op::Plus, args)
    }

    binary_constructor!(minus, Op::Minus);

    pub fn times(&mut self, args: Vec<FNode>) -> Result<FNode, Error> {
        self.sum_or_product(Op::Times, args)
    }

    fn sum_or_product(&mut self, op: Op, args: Vec<FNode>) -> Result<FNode, Error> {
        if args.len() == 1 {
            let ty = self.ty(args[0]);
            return if ty.is_numeric() {
                Ok(args[0])
            } else {
                Err(Error::Type(format!("{} expects numeric arguments, got {}", op.name(), ty)))
            };
        }
        self.intern(op, args)
    }

    unary_constructor!(to_real, Op::ToReal);

    pub fn apply(&mut self, function: FNode, args: Vec<FNode>) -> Result<FNode, Error> {
        let mut children = Vec::with_capacity(args.len() + 1);
        children.push(function);
        children.extend(args);
        self.intern(Op::Apply, children)
    }

    unary_constructor!(bvnot, Op::BvNot);
    unary_constructor!(bvneg, Op::BvNeg);
    binary_constructor!(bvand, Op::BvAnd);
    binary_constructor!(bvor, Op::BvOr);
    binary_constructor!(bvxor, Op::BvXor);
    binary_constructor!(bvadd, Op::BvAdd);
    binary_constructor!(bvsub, Op::BvSub);
    binary_constructor!(bvmul, Op::BvMul);
    binary_constructor!(bvudiv, Op::BvUdiv);
    binary_constructor!(bvurem, Op::BvUrem);
    binary_constructor!(bvsdiv, Op::BvSdiv);
    binary_constructor!(bvsrem, Op::BvSrem);
    binary_constructor!(bvshl, Op::BvShl);
    binary_constructor!(bvlshr, Op::BvLshr);
    binary_constructor!(bvashr, Op::BvAshr);
    binary_constructor!(bvult, Op::BvUlt);
    binary_constructor!(bvule, Op::BvUle);
    binary_constructor!(bvslt, Op::BvSlt);
    binary_constructor!(bvsle, Op::BvSle);
    binary_constructor!(concat, Op::BvConcat);
    binary_constructor!(bvcomp, Op::BvComp);

    pub fn extract(&mut self, hi: u32, lo: u32, bv: FNode) -> Result<FNode, Error> {
        self.intern(Op::BvExtract(hi, lo), vec![bv])
    }

    pub fn zero_extend(&mut self, by: u32, bv: FNode) -> Result<FNode, Error> {
        self.intern(Op::BvZeroExtend(by), vec![bv])
    }

    pub fn sign_extend(&mut self, by: u32, bv: FNode) -> Result<FNode, Error> {
        self.intern(Op::BvSignExtend(by), vec![bv])
    }

    pub fn rotate_left(&mut self, by: u32, bv: FNode) -> Result<FNode, Error> {
        self.intern(Op::BvRotateLeft(by), vec![bv])
    }

    pub fn rotate_right(&mut self, by: u32, bv: FNode) -> Result<FNode, Error> {
        self.intern(Op::BvRotateRight(by), vec![bv])
    }

    binary_constructor!(select, Op::Select);

    pub fn store(&mut self, array: FNode, index: FNode, elem: FNode) -> Result<FNode, Error> {
        self.intern(Op::Store, vec![array, index, elem])
    }

    pub fn array_value(&mut self, index: Ty, default: FNode, assigns: &[(FNode, FNode)]) -> Result<FNode, Error> {
        let mut args = vec![default];
        for (i, e) in assigns {
            args.push(*i);
            args.push(*e)
        }
        self.intern(Op::ArrayValue(index), args)
    }

    /// Replace every occurrence of the keys of `subst` in `f`.
    pub fn substitute(&mut self, f: FNode, subst: &HashMap<FNode, FNode>) -> Result<FNode, Error> {
        let mut memo = HashMap::new();
        self.substitute_rec(f, subst, &mut memo)
    }

    fn substitute_rec(
        &mut self,
        f: FNode,
        subst: &HashMap<FNode, FNode>,
        memo: &mut HashMap<FNode, FNode>,
    ) -> Result<FNode, Error> {
        if let Some(g) = subst.get(&f).or_else(|| memo.get(&f)) {
            return Ok(*g);
        }
        let args = self.arena[f].args.clone();
        let mut new_args = Vec::with_capacity(args.len());
        for arg in &args {
            new_args.push(self.substitute_rec(*arg, subst, memo)?)
        }
        let g = if new_args == args {
            f
        } else {
            let op = self.arena[f].op.clone();
            self.intern(op, new_args)?
        };
        memo.insert(f, g);
        Ok(g)
    }

    pub fn export(&self, roots: &[FNode]) -> PortableFormula {
        let mut index: AHashMap<FNode, u32> = AHashMap::new();
        let mut nodes = Vec::new();
        let mut stack: Vec<(FNode, bool)> = roots.iter().rev().map(|root| (*root, false)).collect();

        while let Some((f, expanded)) = stack.pop() {
            if index.contains_key(&f) {
                continue;
            }
            let node = &self.arena[f];
            if expanded {
                let args = node.args.iter().map(|arg| index[arg]).collect();
                index.insert(f, nodes.len() as u32);
                nodes.push((node.op.clone(), args))
            } else {
                stack.push((f, true));
                for arg in node.args.iter().rev() {
                    if !index.contains_key(arg) {
                        stack.push((*arg, false))
                    }
                }
            }
        }

        PortableFormula { nodes, roots: roots.iter().map(|root| index[root]).collect() }
    }

    /// Rebuild an exported formula in this manager, returning its
    /// roots. Every node is type checked again on the way in.
    pub fn import(&mut self, portable: &PortableFormula) -> Result<Vec<FNode>, Error> {
        let mut nodes: Vec<FNode> = Vec::with_capacity(portable.nodes.len());
        let lookup = |nodes: &[FNode], i: u32| {
            nodes.get(i as usize).copied().ok_or_else(|| Error::Protocol(format!("dangling formula reference {}", i)))
        };
        for (op, args) in &portable.nodes {
            let args = args.iter().map(|i| lookup(&nodes, *i)).collect::<Result<Vec<_>, _>>()?;
            let f = self.intern(op.clone(), args)?;
            nodes.push(f)
        }
        portable.roots.iter().map(|i| lookup(&nodes, *i)).collect()
    }

    pub fn show(&self, f: FNode) -> Show<'_> {
        Show { fm: self, node: f }
    }
}

pub struct Show<'a> {
    fm: &'a FormulaManager,
    node: FNode,
}

fn write_int(f: &mut fmt::Formatter, n: &BigInt) -> fmt::Result {
    if n.is_negative() {
        write!(f, "(- {})", n.abs())
    } else {
        write!(f, "{}", n)
    }
}

impl<'a> Show<'a> {
    fn child(&self, node: FNode) -> Show<'a> {
        Show { fm: self.fm, node }
    }

    fn write_app(&self, f: &mut fmt::Formatter, head: &str, args: &[FNode]) -> fmt::Result {
        write!(f, "({}", head)?;
        for arg in args {
            write!(f, " {}", self.child(*arg))?
        }
        write!(f, ")")
    }
}

impl<'a> fmt::Display for Show<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use Op::*;
        let node = &self.fm[self.node];
        match &node.op {
            Symbol(name, _) => write!(f, "{}", name),
            Bool(b) => write!(f, "{}", b),
            Int(n) => write_int(f, n),
            Real(q) => {
                if q.is_integer() {
                    write_int(f, q.numer())?;
                    write!(f, ".0")
                } else {
                    write!(f, "(/ ")?;
                    write_int(f, q.numer())?;
                    write!(f, " {})", q.denom())
                }
            }
            Bits(value, width) => write!(f, "#b{:0>width$}", value.to_str_radix(2), width = *width as usize),
            Apply => match node.args.split_first() {
                Some((function, args)) => {
                    let head = self.child(*function).to_string();
                    self.write_app(f, &head, args)
                }
                None => write!(f, "(apply)"),
            },
            BvExtract(hi, lo) => self.write_app(f, &format!("(_ extract {} {})", hi, lo), &node.args),
            BvZeroExtend(n) | BvSignExtend(n) | BvRotateLeft(n) | BvRotateRight(n) => {
                self.write_app(f, &format!("(_ {} {})", node.op.name(), n), &node.args)
            }
            ArrayValue(index) => {
                let pairs = node.args[1..].chunks(2).count();
                for _ in 0..pairs {
                    write!(f, "(store ")?
                }
                write!(f, "((as const (Array {} {})) {})", index, self.fm.ty(node.args[0]), self.child(node.args[0]))?;
                for pair in node.args[1..].chunks(2) {
                    write!(f, " {} {})", self.child(pair[0]), self.child(pair[1]))?
                }
                Ok(())
            }
            op => self.write_app(f, op.name(), &node.args),
        }
    }
}
