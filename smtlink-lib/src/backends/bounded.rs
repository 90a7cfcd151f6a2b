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


//! A bounded model finder implementing [Backend] without any native
//! library. It searches for an assignment to the unknowns of a
//! formula over finite domains: booleans, integers and rationals
//! with small denominators within `bound` of zero, every value of a
//! bit-vector up to 8 bits wide and boundary values above that.
//! Applications of uninterpreted functions and reads from symbolic
//! arrays are unknowns too, constrained to agree whenever their
//! arguments do.
//!
//! Numerals occurring in the formula, and their neighbours, are added
//! to the numeric domains, so witnesses close to the constants of a
//! problem are found even outside `bound`.
//!
//! An exhausted search is `unsat` only when every unknown ranged over
//! its whole sort, that is when all unknowns are booleans or narrow
//! bit-vectors. Otherwise it is `unknown`, as is running out of steps
//! or meeting a construct that cannot be enumerated, such as equality
//! between symbolic arrays.

use num_bigint::{BigInt, BigUint};
use num_rational::BigRational;
use num_traits::{One, Signed, ToPrimitive, Zero};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use tracing::trace;

use crate::backend::{Backend, Kind, Numeral as Num, SmtResult, SortShape};
use crate::config::{parse_bool_option, parse_u64_option, SolverOptions, DIV_BY_ZERO_MODE, DIV_BY_ZERO_MODE_VALUE};
use crate::error::Error;

pub const DEFAULT_BOUND: i64 = 8;
pub const DEFAULT_MAX_STEPS: u64 = 2_000_000;
const MAX_DENOMINATOR: i64 = 4;
const EXHAUSTIVE_WIDTH: u32 = 8;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BSort {
    Bool,
    Int,
    Real,
    BitVec(u32),
    Array(Box<BSort>, Box<BSort>),
    Function(Vec<BSort>, Box<BSort>),
}

impl BSort {
    fn is_numeric(&self) -> bool {
        matches!(self, BSort::Int | BSort::Real)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BDecl(u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BTerm(u32);

/// The order in which candidate values are tried.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    /// Values closest to zero first.
    Ascending,
    /// Values furthest from zero first.
    Descending,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum Value {
    Bool(bool),
    Num(BigRational),
    Bits(BigUint, u32),
    /// A default element and the indices that differ from it.
    Array(Box<Value>, BTreeMap<Value, Value>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum VarKey {
    Term(BTerm),
    /// A read of a symbolic array at an index term.
    Read(BTerm, BTerm),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum Head {
    Function(BDecl),
    Array(BDecl),
}

#[derive(Debug)]
struct Var {
    key: VarKey,
    sort: BSort,
    head: Option<Head>,
    args: Vec<BTerm>,
    height: usize,
}

struct Problem {
    vars: Vec<Var>,
    index: HashMap<VarKey, usize>,
    formulas: Vec<BTerm>,
    /// Numerals occurring in the formulas.
    literals: BTreeSet<BigRational>,
}

type Tables = HashMap<Head, Vec<(Vec<Value>, Value)>>;

#[derive(Clone, Debug)]
pub struct BModel {
    keys: Vec<VarKey>,
    values: Vec<Option<Value>>,
    index: HashMap<VarKey, usize>,
    tables: Tables,
}

enum Outcome {
    Model(BModel),
    Refuted,
    GaveUp(String),
}

enum EvalError {
    Unassigned,
    Unsupported(String),
}

enum Stop {
    Budget,
    Unsupported(String),
}

impl From<EvalError> for Stop {
    fn from(err: EvalError) -> Self {
        match err {
            EvalError::Unassigned => Stop::Unsupported("unknown evaluated before it was assigned".to_string()),
            EvalError::Unsupported(reason) => Stop::Unsupported(reason),
        }
    }
}

/// Values of unknowns during evaluation. In a model, `tables` holds
/// the interpretation of functions and arrays for arguments that
/// were never searched over.
struct Env<'a> {
    index: &'a HashMap<VarKey, usize>,
    values: &'a [Option<Value>],
    tables: Option<&'a Tables>,
}

impl<'a> Env<'a> {
    fn lookup(&self, key: &VarKey) -> Option<Result<Value, EvalError>> {
        self.index.get(key).map(|i| self.values[*i].clone().ok_or(EvalError::Unassigned))
    }

    fn table(&self, head: Head, args: &[Value]) -> Option<Value> {
        self.tables?.get(&head)?.iter().find(|(a, _)| a == args).map(|(_, v)| v.clone())
    }
}

fn ill_sorted() -> EvalError {
    EvalError::Unsupported("ill-sorted term".to_string())
}

fn boolean(v: Value) -> Result<bool, EvalError> {
    match v {
        Value::Bool(b) => Ok(b),
        _ => Err(ill_sorted()),
    }
}

fn number(v: Value) -> Result<BigRational, EvalError> {
    match v {
        Value::Num(q) => Ok(q),
        _ => Err(ill_sorted()),
    }
}

fn bits(v: Value) -> Result<(BigUint, u32), EvalError> {
    match v {
        Value::Bits(b, w) => Ok((b, w)),
        _ => Err(ill_sorted()),
    }
}

fn modulus(w: u32) -> BigUint {
    BigUint::one() << w as usize
}

fn mask(w: u32) -> BigUint {
    modulus(w) - BigUint::one()
}

fn is_negative(v: &BigUint, w: u32) -> bool {
    !(v >> (w - 1) as usize).is_zero()
}

fn to_signed(v: &BigUint, w: u32) -> BigInt {
    if is_negative(v, w) {
        BigInt::from(v.clone()) - BigInt::from(modulus(w))
    } else {
        BigInt::from(v.clone())
    }
}

fn from_signed(i: &BigInt, w: u32) -> BigUint {
    let m = BigInt::from(modulus(w));
    (((i % &m) + &m) % &m).to_biguint().unwrap_or_default()
}

fn bv_neg(v: &BigUint, w: u32) -> BigUint {
    (modulus(w) - v) & mask(w)
}

fn shift_amount(v: &BigUint, w: u32) -> Option<usize> {
    v.to_usize().filter(|n| *n < w as usize)
}

fn default_value(sort: &BSort) -> Value {
    match sort {
        BSort::Bool => Value::Bool(false),
        BSort::Int | BSort::Real => Value::Num(BigRational::zero()),
        BSort::BitVec(w) => Value::Bits(BigUint::zero(), *w),
        BSort::Array(_, elem) => Value::Array(Box::new(default_value(elem)), BTreeMap::new()),
        BSort::Function(_, ret) => default_value(ret),
    }
}

fn join(lhs: &BSort, rhs: &BSort) -> Option<BSort> {
    if lhs == rhs {
        Some(lhs.clone())
    } else if lhs.is_numeric() && rhs.is_numeric() {
        Some(BSort::Real)
    } else {
        None
    }
}

/// Whether the domain of a sort is enumerated completely.
fn is_finite(sort: &BSort) -> bool {
    match sort {
        BSort::Bool => true,
        BSort::BitVec(w) => *w <= EXHAUSTIVE_WIDTH,
        _ => false,
    }
}

fn fits(expected: &BSort, actual: &BSort) -> bool {
    expected == actual || (*expected == BSort::Real && *actual == BSort::Int)
}

struct TermData {
    kind: Kind<BSort, BDecl>,
    args: Vec<BTerm>,
    sort: BSort,
}

struct LastCheck {
    assertions: Vec<BTerm>,
    assumptions: Vec<BTerm>,
    model: Option<BModel>,
}

pub struct Bounded {
    strategy: Strategy,
    bound: i64,
    max_steps: u64,
    seed: Option<u64>,
    produce_models: bool,
    produce_cores: bool,
    decls: Vec<(String, BSort)>,
    decl_names: HashMap<String, BDecl>,
    terms: Vec<TermData>,
    table: HashMap<(Kind<BSort, BDecl>, Vec<BTerm>), BTerm>,
    assertions: Vec<BTerm>,
    scopes: Vec<usize>,
    last: Option<LastCheck>,
}

impl Bounded {
    pub fn new(options: &SolverOptions) -> Result<Self, Error> {
        Self::with_strategy(options, Strategy::Ascending)
    }

    pub fn with_strategy(options: &SolverOptions, strategy: Strategy) -> Result<Self, Error> {
        let mut backend = Bounded {
            strategy,
            bound: DEFAULT_BOUND,
            max_steps: DEFAULT_MAX_STEPS,
            seed: None,
            produce_models: true,
            produce_cores: false,
            decls: Vec::new(),
            decl_names: HashMap::new(),
            terms: Vec::new(),
            table: HashMap::new(),
            assertions: Vec::new(),
            scopes: Vec::new(),
            last: None,
        };
        for (key, value) in options.backend_params() {
            backend.set_option(&key, &value)?
        }
        Ok(backend)
    }

    fn set_option(&mut self, key: &str, value: &str) -> Result<(), Error> {
        let invalid = |reason: &str| Error::Option { key: key.to_string(), value: value.to_string(), reason: reason.to_string() };
        match key {
            "model_generation" => self.produce_models = parse_bool_option(key, value)?,
            "unsat_core_generation" => self.produce_cores = parse_bool_option(key, value)?,
            "random_seed" => self.seed = Some(parse_u64_option(key, value)?),
            "bound" => match parse_u64_option(key, value)? {
                b @ 1..=1024 => self.bound = b as i64,
                _ => return Err(invalid("bound must be between 1 and 1024")),
            },
            "max_steps" => self.max_steps = parse_u64_option(key, value)?,
            DIV_BY_ZERO_MODE if value == DIV_BY_ZERO_MODE_VALUE => (),
            DIV_BY_ZERO_MODE => return Err(invalid("only SMT-LIB division by zero is supported")),
            _ => return Err(invalid("unknown option")),
        }
        Ok(())
    }

    fn term(&self, t: BTerm) -> &TermData {
        &self.terms[t.0 as usize]
    }

    fn sort_of(&self, kind: &Kind<BSort, BDecl>, args: &[BTerm]) -> Result<BSort, Error> {
        use Kind::*;
        let sorts: Vec<&BSort> = args.iter().map(|arg| &self.term(*arg).sort).collect();
        let reject = || Error::Backend(format!("ill-sorted term {:?} applied to {:?}", kind, sorts));
        let arity = |n: usize| if sorts.len() == n { Ok(()) } else { Err(reject()) };
        let width = |n: usize| match sorts.get(n) {
            Some(BSort::BitVec(w)) => Ok(*w),
            _ => Err(reject()),
        };
        let all_bool = || if sorts.iter().all(|s| **s == BSort::Bool) { Ok(BSort::Bool) } else { Err(reject()) };

        match kind {
            True | False => arity(0).map(|_| BSort::Bool),
            Numeral(Num::Int(_)) => arity(0).map(|_| BSort::Int),
            Numeral(Num::Real(_)) => arity(0).map(|_| BSort::Real),
            Numeral(Num::Bits(v, w)) => {
                arity(0)?;
                if *w > 0 && v.bits() <= u64::from(*w) {
                    Ok(BSort::BitVec(*w))
                } else {
                    Err(reject())
                }
            }
            Constant(d) => {
                arity(0)?;
                match &self.decls[d.0 as usize].1 {
                    BSort::Function(_, _) => Err(reject()),
                    sort => Ok(sort.clone()),
                }
            }
            Uf(d) => match &self.decls[d.0 as usize].1 {
                BSort::Function(params, ret)
                    if params.len() == sorts.len() && params.iter().zip(sorts.iter()).all(|(p, s)| fits(p, s)) =>
                {
                    Ok((**ret).clone())
                }
                _ => Err(reject()),
            },
            And | Or if !sorts.is_empty() => all_bool(),
            Not => arity(1).and_then(|_| all_bool()),
            Iff => arity(2).and_then(|_| all_bool()),
            Ite => {
                arity(3)?;
                if *sorts[0] != BSort::Bool {
                    return Err(reject());
                }
                join(sorts[1], sorts[2]).ok_or_else(reject)
            }
            Eq => {
                arity(2)?;
                join(sorts[0], sorts[1]).map(|_| BSort::Bool).ok_or_else(reject)
            }
            Leq => {
                arity(2)?;
                if sorts.iter().all(|s| s.is_numeric()) {
                    Ok(BSort::Bool)
                } else {
                    Err(reject())
                }
            }
            Plus | Times if !sorts.is_empty() && sorts.iter().all(|s| s.is_numeric()) => {
                Ok(if sorts.iter().any(|s| **s == BSort::Real) { BSort::Real } else { BSort::Int })
            }
            BvNot | BvNeg | BvRotateLeft(_) | BvRotateRight(_) => {
                arity(1)?;
                width(0).map(BSort::BitVec)
            }
            BvAnd | BvOr | BvXor | BvAdd | BvSub | BvMul | BvUdiv | BvUrem | BvSdiv | BvSrem | BvShl | BvLshr
            | BvAshr => {
                arity(2)?;
                if width(0)? == width(1)? {
                    Ok(BSort::BitVec(width(0)?))
                } else {
                    Err(reject())
                }
            }
            BvUlt | BvUle | BvSlt | BvSle | BvComp => {
                arity(2)?;
                if width(0)? != width(1)? {
                    Err(reject())
                } else if matches!(kind, BvComp) {
                    Ok(BSort::BitVec(1))
                } else {
                    Ok(BSort::Bool)
                }
            }
            BvConcat => {
                arity(2)?;
                Ok(BSort::BitVec(width(0)? + width(1)?))
            }
            BvExtract(hi, lo) => {
                arity(1)?;
                if lo <= hi && *hi < width(0)? {
                    Ok(BSort::BitVec(hi - lo + 1))
                } else {
                    Err(reject())
                }
            }
            BvZeroExtend(n) | BvSignExtend(n) => {
                arity(1)?;
                Ok(BSort::BitVec(width(0)? + n))
            }
            ArrayRead => {
                arity(2)?;
                match sorts[0] {
                    BSort::Array(index, elem) if fits(index, sorts[1]) => Ok((**elem).clone()),
                    _ => Err(reject()),
                }
            }
            ArrayWrite => {
                arity(3)?;
                match sorts[0] {
                    BSort::Array(index, elem) if fits(index, sorts[1]) && fits(elem, sorts[2]) => Ok(sorts[0].clone()),
                    _ => Err(reject()),
                }
            }
            ArrayConst(sort) => {
                arity(1)?;
                match sort {
                    BSort::Array(_, elem) if fits(elem, sorts[0]) => Ok(sort.clone()),
                    _ => Err(reject()),
                }
            }
            _ => Err(reject()),
        }
    }

    fn domain(&self, sort: &BSort, literals: &BTreeSet<BigRational>, rng: &mut Option<StdRng>) -> Result<Vec<Value>, String> {
        let by_size = |a: &BigRational, b: &BigRational| {
            (a.denom(), a.abs(), a.is_negative()).cmp(&(b.denom(), b.abs(), b.is_negative()))
        };
        let mut nearby: Vec<BigRational> = literals
            .iter()
            .flat_map(|q| vec![q - BigRational::one(), q.clone(), q + BigRational::one()])
            .collect();
        nearby.sort_by(by_size);
        nearby.dedup();
        let bound = BigRational::from_integer(BigInt::from(self.bound));

        let mut values = match sort {
            BSort::Bool => vec![Value::Bool(false), Value::Bool(true)],
            BSort::Int => {
                let mut values = vec![Value::Num(BigRational::zero())];
                for n in 1..=self.bound {
                    values.push(Value::Num(BigRational::from_integer(BigInt::from(n))));
                    values.push(Value::Num(BigRational::from_integer(BigInt::from(-n))))
                }
                for q in nearby {
                    if q.is_integer() && q.abs() > bound {
                        values.push(Value::Num(q))
                    }
                }
                values
            }
            BSort::Real => {
                let mut qs = BTreeSet::new();
                for d in 1..=MAX_DENOMINATOR {
                    for n in -self.bound * d..=self.bound * d {
                        qs.insert(BigRational::new(BigInt::from(n), BigInt::from(d)));
                    }
                }
                let mut ordered: Vec<BigRational> = qs.iter().cloned().collect();
                ordered.sort_by(by_size);
                for q in nearby {
                    if !qs.contains(&q) {
                        ordered.push(q)
                    }
                }
                ordered.into_iter().map(Value::Num).collect()
            }
            BSort::BitVec(w) if *w <= EXHAUSTIVE_WIDTH => {
                (0..(1u32 << w)).map(|n| Value::Bits(BigUint::from(n), *w)).collect()
            }
            BSort::BitVec(w) => {
                let m = mask(*w);
                let half = BigUint::one() << (*w - 1) as usize;
                let mut samples = vec![
                    BigUint::zero(),
                    BigUint::one(),
                    BigUint::from(2u32),
                    &half - BigUint::one(),
                    half,
                    &m - BigUint::one(),
                    m,
                ];
                samples.dedup();
                samples.into_iter().map(|v| Value::Bits(v, *w)).collect()
            }
            BSort::Array(_, _) | BSort::Function(_, _) => {
                return Err(format!("cannot enumerate unknowns of sort {:?}", sort));
            }
        };
        if self.strategy == Strategy::Descending {
            values.reverse()
        }
        if let Some(rng) = rng {
            values.shuffle(rng)
        }
        Ok(values)
    }

    fn height(&self, t: BTerm, memo: &mut HashMap<BTerm, usize>) -> usize {
        if let Some(h) = memo.get(&t) {
            return *h;
        }
        let data = self.term(t);
        let below = data.args.iter().map(|arg| self.height(*arg, memo)).max().unwrap_or(0);
        let h = match data.kind {
            Kind::Constant(_) | Kind::Uf(_) | Kind::ArrayRead => below + 1,
            _ => below,
        };
        memo.insert(t, h);
        h
    }

    /// Find the unknowns of a set of formulas, ordered so that every
    /// unknown comes after the unknowns its arguments depend on.
    fn collect(&self, formulas: &[BTerm]) -> Result<Problem, String> {
        let mut vars: Vec<Var> = Vec::new();
        let mut seen = HashSet::new();
        let mut heights = HashMap::new();
        let mut visited = HashSet::new();
        let mut literals = BTreeSet::new();
        let mut stack = formulas.to_vec();

        while let Some(t) = stack.pop() {
            if !visited.insert(t) {
                continue;
            }
            let data = self.term(t);
            match &data.kind {
                Kind::Numeral(Num::Int(n)) => {
                    literals.insert(BigRational::from_integer(n.clone()));
                }
                Kind::Numeral(Num::Real(q)) => {
                    literals.insert(q.clone());
                }
                Kind::Constant(_) if matches!(data.sort, BSort::Array(_, _)) => (),
                Kind::Constant(_) | Kind::Uf(_) => {
                    let head = match data.kind {
                        Kind::Uf(d) => Some(Head::Function(d)),
                        _ => None,
                    };
                    if seen.insert(VarKey::Term(t)) {
                        let height = self.height(t, &mut heights);
                        vars.push(Var { key: VarKey::Term(t), sort: data.sort.clone(), head, args: data.args.clone(), height })
                    }
                }
                Kind::ArrayRead => {
                    let index = data.args[1];
                    let mut arrays = vec![data.args[0]];
                    while let Some(array) = arrays.pop() {
                        let array_data = self.term(array);
                        match &array_data.kind {
                            Kind::ArrayWrite => arrays.push(array_data.args[0]),
                            Kind::ArrayConst(_) => (),
                            Kind::Ite => arrays.extend_from_slice(&array_data.args[1..]),
                            Kind::Constant(d) => {
                                let key = VarKey::Read(array, index);
                                if seen.insert(key) {
                                    let elem = match &array_data.sort {
                                        BSort::Array(_, elem) => (**elem).clone(),
                                        _ => return Err("read from a non-array".to_string()),
                                    };
                                    let height = self.height(index, &mut heights) + 1;
                                    vars.push(Var { key, sort: elem, head: Some(Head::Array(*d)), args: vec![index], height })
                                }
                            }
                            kind => return Err(format!("cannot read from arrays built by {:?}", kind)),
                        }
                    }
                }
                _ => (),
            }
            stack.extend_from_slice(&data.args)
        }

        vars.sort_by_key(|var| var.height);
        let index = vars.iter().enumerate().map(|(i, var)| (var.key, i)).collect();
        Ok(Problem { vars, index, formulas: formulas.to_vec(), literals })
    }

    fn search(&self, formulas: &[BTerm]) -> Outcome {
        let problem = match self.collect(formulas) {
            Ok(problem) => problem,
            Err(reason) => return Outcome::GaveUp(reason),
        };

        let mut rng = self.seed.map(StdRng::seed_from_u64);
        let mut domains: HashMap<BSort, Vec<Value>> = HashMap::new();
        for var in &problem.vars {
            if !domains.contains_key(&var.sort) {
                match self.domain(&var.sort, &problem.literals, &mut rng) {
                    Ok(domain) => domains.insert(var.sort.clone(), domain),
                    Err(reason) => return Outcome::GaveUp(reason),
                };
            }
        }

        let n = problem.vars.len();
        let complete = problem.vars.iter().all(|var| is_finite(&var.sort));
        let mut state = SearchState { values: vec![None; n], arg_values: vec![None; n], steps: 0 };
        let result = match self.consistent(&problem, &state.values) {
            Ok(true) => self.assign(&problem, &domains, 0, &mut state),
            // False before any unknown is assigned
            Ok(false) => return Outcome::Refuted,
            other => other,
        };
        trace!(unknowns = n, steps = state.steps, "bounded search finished");

        match result {
            Ok(true) => Outcome::Model(build_model(problem, state)),
            Ok(false) if complete => Outcome::Refuted,
            Ok(false) => Outcome::GaveUp("no model within the search bounds".to_string()),
            Err(Stop::Budget) => Outcome::GaveUp(format!("step budget of {} exhausted", self.max_steps)),
            Err(Stop::Unsupported(reason)) => Outcome::GaveUp(reason),
        }
    }

    /// False if some formula is already false under the partial
    /// assignment.
    fn consistent(&self, problem: &Problem, values: &[Option<Value>]) -> Result<bool, Stop> {
        let env = Env { index: &problem.index, values, tables: None };
        for f in &problem.formulas {
            match self.eval(*f, &env) {
                Ok(Value::Bool(false)) => return Ok(false),
                Ok(Value::Bool(true)) | Err(EvalError::Unassigned) => (),
                Ok(_) => return Err(Stop::Unsupported("non-boolean formula".to_string())),
                Err(EvalError::Unsupported(reason)) => return Err(Stop::Unsupported(reason)),
            }
        }
        Ok(true)
    }

    fn assign(
        &self,
        problem: &Problem,
        domains: &HashMap<BSort, Vec<Value>>,
        k: usize,
        state: &mut SearchState,
    ) -> Result<bool, Stop> {
        if k == problem.vars.len() {
            return Ok(true);
        }
        let var = &problem.vars[k];

        let args = match var.head {
            Some(_) => {
                let env = Env { index: &problem.index, values: &state.values, tables: None };
                Some(var.args.iter().map(|arg| self.eval(*arg, &env)).collect::<Result<Vec<_>, _>>()?)
            }
            None => None,
        };

        // Congruence: an earlier application of the same head to the
        // same arguments fixes the value
        let forced = match (&var.head, &args) {
            (Some(head), Some(args)) => (0..k)
                .find(|j| problem.vars[*j].head.as_ref() == Some(head) && state.arg_values[*j].as_ref() == Some(args))
                .and_then(|j| state.values[j].clone()),
            _ => None,
        };
        state.arg_values[k] = args;

        let candidates: &[Value] = match &forced {
            Some(value) => std::slice::from_ref(value),
            None => &domains[&var.sort],
        };

        for value in candidates {
            state.steps += 1;
            if state.steps > self.max_steps {
                return Err(Stop::Budget);
            }
            state.values[k] = Some(value.clone());
            if self.consistent(problem, &state.values)? && self.assign(problem, domains, k + 1, state)? {
                return Ok(true);
            }
        }

        state.values[k] = None;
        state.arg_values[k] = None;
        Ok(false)
    }

    fn eval(&self, t: BTerm, env: &Env) -> Result<Value, EvalError> {
        use Kind::*;
        let data = self.term(t);
        let args = &data.args;
        let arg = |i: usize| self.eval(args[i], env);

        Ok(match &data.kind {
            True => Value::Bool(true),
            False => Value::Bool(false),
            Numeral(Num::Int(n)) => Value::Num(BigRational::from_integer(n.clone())),
            Numeral(Num::Real(q)) => Value::Num(q.clone()),
            Numeral(Num::Bits(v, w)) => Value::Bits(v.clone(), *w),

            Constant(d) => match &data.sort {
                BSort::Array(_, elem) => match env.tables {
                    Some(tables) => {
                        let default = default_value(elem);
                        let mut entries = BTreeMap::new();
                        for (index, value) in tables.get(&Head::Array(*d)).into_iter().flatten() {
                            if *value != default {
                                entries.insert(index[0].clone(), value.clone());
                            }
                        }
                        Value::Array(Box::new(default), entries)
                    }
                    None => return Err(EvalError::Unsupported("extensional use of a symbolic array".to_string())),
                },
                sort => match env.lookup(&VarKey::Term(t)) {
                    Some(value) => value?,
                    None if env.tables.is_some() => default_value(sort),
                    None => return Err(EvalError::Unsupported("constant outside the search".to_string())),
                },
            },

            Uf(d) => match env.lookup(&VarKey::Term(t)) {
                Some(value) => value?,
                None if env.tables.is_some() => {
                    let actuals = args.iter().map(|a| self.eval(*a, env)).collect::<Result<Vec<_>, _>>()?;
                    env.table(Head::Function(*d), &actuals).unwrap_or_else(|| default_value(&data.sort))
                }
                None => return Err(EvalError::Unsupported("application outside the search".to_string())),
            },

            And | Or => {
                let short_circuit = matches!(data.kind, Or);
                let mut unassigned = false;
                for a in args {
                    match self.eval(*a, env) {
                        Ok(Value::Bool(b)) if b == short_circuit => return Ok(Value::Bool(b)),
                        Ok(Value::Bool(_)) => (),
                        Ok(_) => return Err(ill_sorted()),
                        Err(EvalError::Unassigned) => unassigned = true,
                        Err(err) => return Err(err),
                    }
                }
                if unassigned {
                    return Err(EvalError::Unassigned);
                }
                Value::Bool(!short_circuit)
            }
            Not => Value::Bool(!boolean(arg(0)?)?),
            Iff => Value::Bool(boolean(arg(0)?)? == boolean(arg(1)?)?),
            Ite => {
                if boolean(arg(0)?)? {
                    arg(1)?
                } else {
                    arg(2)?
                }
            }
            Eq => Value::Bool(arg(0)? == arg(1)?),
            Leq => Value::Bool(number(arg(0)?)? <= number(arg(1)?)?),
            Plus => {
                let mut sum = BigRational::zero();
                for i in 0..args.len() {
                    sum += number(arg(i)?)?
                }
                Value::Num(sum)
            }
            Times => {
                let mut product = BigRational::one();
                for i in 0..args.len() {
                    product *= number(arg(i)?)?
                }
                Value::Num(product)
            }

            BvNot => {
                let (a, w) = bits(arg(0)?)?;
                Value::Bits(mask(w) ^ a, w)
            }
            BvNeg => {
                let (a, w) = bits(arg(0)?)?;
                Value::Bits(bv_neg(&a, w), w)
            }
            BvAnd | BvOr | BvXor | BvAdd | BvSub | BvMul | BvUdiv | BvUrem | BvSdiv | BvSrem | BvShl | BvLshr
            | BvAshr => {
                let (a, w) = bits(arg(0)?)?;
                let (b, _) = bits(arg(1)?)?;
                Value::Bits(bv_binary(&data.kind, a, b, w), w)
            }
            BvUlt | BvUle | BvSlt | BvSle => {
                let (a, w) = bits(arg(0)?)?;
                let (b, _) = bits(arg(1)?)?;
                Value::Bool(match data.kind {
                    BvUlt => a < b,
                    BvUle => a <= b,
                    BvSlt => to_signed(&a, w) < to_signed(&b, w),
                    _ => to_signed(&a, w) <= to_signed(&b, w),
                })
            }
            BvComp => Value::Bits(if arg(0)? == arg(1)? { BigUint::one() } else { BigUint::zero() }, 1),
            BvConcat => {
                let (a, w1) = bits(arg(0)?)?;
                let (b, w2) = bits(arg(1)?)?;
                Value::Bits((a << w2 as usize) | b, w1 + w2)
            }
            BvExtract(hi, lo) => {
                let (a, _) = bits(arg(0)?)?;
                Value::Bits((a >> *lo as usize) & mask(hi - lo + 1), hi - lo + 1)
            }
            BvZeroExtend(n) => {
                let (a, w) = bits(arg(0)?)?;
                Value::Bits(a, w + n)
            }
            BvSignExtend(n) => {
                let (a, w) = bits(arg(0)?)?;
                Value::Bits(from_signed(&to_signed(&a, w), w + n), w + n)
            }
            BvRotateLeft(n) | BvRotateRight(n) => {
                let (a, w) = bits(arg(0)?)?;
                let by = match data.kind {
                    BvRotateLeft(_) => n % w,
                    _ => (w - n % w) % w,
                };
                if by == 0 {
                    Value::Bits(a, w)
                } else {
                    Value::Bits(((&a << by as usize) | (&a >> (w - by) as usize)) & mask(w), w)
                }
            }

            ArrayRead => self.read(args[0], args[1], env)?,
            ArrayWrite => match arg(0)? {
                Value::Array(default, mut entries) => {
                    let (index, value) = (arg(1)?, arg(2)?);
                    if value == *default {
                        entries.remove(&index);
                    } else {
                        entries.insert(index, value);
                    }
                    Value::Array(default, entries)
                }
                _ => return Err(ill_sorted()),
            },
            ArrayConst(_) => Value::Array(Box::new(arg(0)?), BTreeMap::new()),
        })
    }

    fn read(&self, array: BTerm, index: BTerm, env: &Env) -> Result<Value, EvalError> {
        let data = self.term(array);
        match &data.kind {
            Kind::ArrayWrite => {
                if self.eval(index, env)? == self.eval(data.args[1], env)? {
                    self.eval(data.args[2], env)
                } else {
                    self.read(data.args[0], index, env)
                }
            }
            Kind::ArrayConst(_) => self.eval(data.args[0], env),
            Kind::Ite => {
                if boolean(self.eval(data.args[0], env)?)? {
                    self.read(data.args[1], index, env)
                } else {
                    self.read(data.args[2], index, env)
                }
            }
            Kind::Constant(d) => match env.lookup(&VarKey::Read(array, index)) {
                Some(value) => value,
                None if env.tables.is_some() => {
                    let i = self.eval(index, env)?;
                    match (env.table(Head::Array(*d), &[i]), &data.sort) {
                        (Some(value), _) => Ok(value),
                        (None, BSort::Array(_, elem)) => Ok(default_value(elem)),
                        (None, _) => Err(ill_sorted()),
                    }
                }
                None => Err(EvalError::Unsupported("read outside the search".to_string())),
            },
            kind => Err(EvalError::Unsupported(format!("cannot read from arrays built by {:?}", kind))),
        }
    }

    fn value_to_term(&mut self, value: &Value, sort: &BSort, whole_as_int: bool) -> Result<BTerm, Error> {
        match (value, sort) {
            (Value::Bool(true), _) => self.mk_term(Kind::True, &[]),
            (Value::Bool(false), _) => self.mk_term(Kind::False, &[]),
            (Value::Num(q), _) if q.is_integer() && (whole_as_int || *sort == BSort::Int) => {
                self.mk_term(Kind::Numeral(Num::Int(q.to_integer())), &[])
            }
            (Value::Num(q), BSort::Real) => self.mk_term(Kind::Numeral(Num::Real(q.clone())), &[]),
            (Value::Bits(v, w), _) => self.mk_term(Kind::Numeral(Num::Bits(v.clone(), *w)), &[]),
            (Value::Array(default, entries), BSort::Array(index_sort, elem_sort)) => {
                let default = self.value_to_term(default, elem_sort, false)?;
                let mut array = self.mk_term(Kind::ArrayConst(sort.clone()), &[default])?;
                for (index, elem) in entries {
                    let index = self.value_to_term(index, index_sort, false)?;
                    let elem = self.value_to_term(elem, elem_sort, false)?;
                    array = self.mk_term(Kind::ArrayWrite, &[array, index, elem])?
                }
                Ok(array)
            }
            _ => Err(Error::Backend(format!("value {:?} does not have sort {:?}", value, sort))),
        }
    }

    fn eval_in_model(&mut self, model: &BModel, t: BTerm) -> Result<BTerm, Error> {
        let env = Env { index: &model.index, values: &model.values, tables: Some(&model.tables) };
        let value = match self.eval(t, &env) {
            Ok(value) => value,
            Err(EvalError::Unassigned) => return Err(Error::NoModel),
            Err(EvalError::Unsupported(reason)) => return Err(Error::Backend(reason)),
        };
        let sort = self.term(t).sort.clone();
        self.value_to_term(&value, &sort, true)
    }

    fn last_unsat(&self) -> Result<(Vec<BTerm>, Vec<BTerm>), Error> {
        if !self.produce_cores {
            return Err(Error::Backend("unsat core generation is disabled".to_string()));
        }
        match &self.last {
            Some(LastCheck { assertions, assumptions, model: None }) => Ok((assertions.clone(), assumptions.clone())),
            _ => Err(Error::Backend("the last check was not unsatisfiable".to_string())),
        }
    }

    /// Deletion based core minimisation: drop each candidate in turn
    /// and keep it out if the rest is still unsatisfiable.
    fn minimise(&self, fixed: &[BTerm], candidates: Vec<BTerm>) -> Vec<BTerm> {
        let mut core = candidates;
        let mut i = 0;
        while i < core.len() {
            let mut trial = core.clone();
            trial.remove(i);
            let formulas: Vec<BTerm> = fixed.iter().chain(trial.iter()).copied().collect();
            match self.search(&formulas) {
                Outcome::Refuted => core = trial,
                _ => i += 1,
            }
        }
        core
    }
}

struct SearchState {
    values: Vec<Option<Value>>,
    arg_values: Vec<Option<Vec<Value>>>,
    steps: u64,
}

fn bv_binary(kind: &Kind<BSort, BDecl>, a: BigUint, b: BigUint, w: u32) -> BigUint {
    use Kind::*;
    let m = mask(w);
    match kind {
        BvAnd => a & b,
        BvOr => a | b,
        BvXor => a ^ b,
        BvAdd => (a + b) & m,
        BvSub => (a + modulus(w) - b) & m,
        BvMul => (a * b) & m,
        BvUdiv if b.is_zero() => m,
        BvUdiv => a / b,
        BvUrem if b.is_zero() => a,
        BvUrem => a % b,
        BvSdiv | BvSrem => {
            let (neg_a, neg_b) = (is_negative(&a, w), is_negative(&b, w));
            let abs_a = if neg_a { bv_neg(&a, w) } else { a };
            let abs_b = if neg_b { bv_neg(&b, w) } else { b };
            if matches!(kind, BvSdiv) {
                let q = bv_binary(&BvUdiv, abs_a, abs_b, w);
                if neg_a != neg_b {
                    bv_neg(&q, w)
                } else {
                    q
                }
            } else {
                let r = bv_binary(&BvUrem, abs_a, abs_b, w);
                if neg_a {
                    bv_neg(&r, w)
                } else {
                    r
                }
            }
        }
        BvShl => match shift_amount(&b, w) {
            Some(n) => (a << n) & m,
            None => BigUint::zero(),
        },
        BvLshr => match shift_amount(&b, w) {
            Some(n) => a >> n,
            None => BigUint::zero(),
        },
        BvAshr => match shift_amount(&b, w) {
            Some(n) => from_signed(&(to_signed(&a, w) >> n), w),
            None if is_negative(&a, w) => m,
            None => BigUint::zero(),
        },
        _ => BigUint::zero(),
    }
}

fn build_model(problem: Problem, state: SearchState) -> BModel {
    let mut tables: Tables = HashMap::new();
    for (k, var) in problem.vars.iter().enumerate() {
        if let (Some(head), Some(args), Some(value)) = (&var.head, &state.arg_values[k], &state.values[k]) {
            let table = tables.entry(*head).or_default();
            if !table.iter().any(|(a, _)| a == args) {
                table.push((args.clone(), value.clone()))
            }
        }
    }
    BModel {
        keys: problem.vars.iter().map(|var| var.key).collect(),
        values: state.values,
        index: problem.index,
        tables,
    }
}

impl Backend for Bounded {
    type Sort = BSort;
    type Decl = BDecl;
    type Term = BTerm;
    type Model = BModel;

    fn name(&self) -> &str {
        match self.strategy {
            Strategy::Ascending => "bounded",
            Strategy::Descending => "bounded-rev",
        }
    }

    fn mk_sort(&mut self, shape: SortShape<BSort>) -> Result<BSort, Error> {
        Ok(match shape {
            SortShape::Bool => BSort::Bool,
            SortShape::Int => BSort::Int,
            SortShape::Real => BSort::Real,
            SortShape::BitVec(0) => return Err(Error::Backend("zero width bitvector sort".to_string())),
            SortShape::BitVec(w) => BSort::BitVec(w),
            SortShape::Array(index, elem) => BSort::Array(Box::new(index), Box::new(elem)),
            SortShape::Function(params, ret) => BSort::Function(params, Box::new(ret)),
        })
    }

    fn sort_shape(&self, sort: &BSort) -> Result<SortShape<BSort>, Error> {
        Ok(match sort {
            BSort::Bool => SortShape::Bool,
            BSort::Int => SortShape::Int,
            BSort::Real => SortShape::Real,
            BSort::BitVec(w) => SortShape::BitVec(*w),
            BSort::Array(index, elem) => SortShape::Array((**index).clone(), (**elem).clone()),
            BSort::Function(params, ret) => SortShape::Function(params.clone(), (**ret).clone()),
        })
    }

    fn declare(&mut self, name: &str, sort: &BSort) -> Result<BDecl, Error> {
        if let Some(decl) = self.decl_names.get(name) {
            let existing = &self.decls[decl.0 as usize].1;
            return if existing == sort {
                Ok(*decl)
            } else {
                Err(Error::Backend(format!("{} is already declared with sort {:?}", name, existing)))
            };
        }
        let decl = BDecl(self.decls.len() as u32);
        self.decls.push((name.to_string(), sort.clone()));
        self.decl_names.insert(name.to_string(), decl);
        Ok(decl)
    }

    fn decl_id(&self, decl: &BDecl) -> u64 {
        u64::from(decl.0)
    }

    fn decl_name(&self, decl: &BDecl) -> String {
        self.decls[decl.0 as usize].0.clone()
    }

    fn decl_sort(&self, decl: &BDecl) -> Result<BSort, Error> {
        Ok(self.decls[decl.0 as usize].1.clone())
    }

    fn mk_term(&mut self, kind: Kind<BSort, BDecl>, args: &[BTerm]) -> Result<BTerm, Error> {
        let key = (kind, args.to_vec());
        if let Some(t) = self.table.get(&key) {
            return Ok(*t);
        }
        let sort = self.sort_of(&key.0, &key.1)?;
        let t = BTerm(self.terms.len() as u32);
        self.terms.push(TermData { kind: key.0.clone(), args: key.1.clone(), sort });
        self.table.insert(key, t);
        Ok(t)
    }

    fn view(&mut self, term: &BTerm) -> Result<(Kind<BSort, BDecl>, Vec<BTerm>), Error> {
        let data = self.term(*term);
        Ok((data.kind.clone(), data.args.clone()))
    }

    fn term_sort(&self, term: &BTerm) -> Result<BSort, Error> {
        Ok(self.term(*term).sort.clone())
    }

    fn term_id(&self, term: &BTerm) -> u64 {
        u64::from(term.0)
    }

    fn is_numeral(&mut self, term: &BTerm) -> Result<bool, Error> {
        Ok(matches!(self.term(*term).kind, Kind::Numeral(_)))
    }

    fn assert(&mut self, term: &BTerm) -> Result<(), Error> {
        if self.term(*term).sort != BSort::Bool {
            return Err(Error::Backend(format!("cannot assert a term of sort {:?}", self.term(*term).sort)));
        }
        self.assertions.push(*term);
        Ok(())
    }

    fn push(&mut self) -> Result<(), Error> {
        self.scopes.push(self.assertions.len());
        Ok(())
    }

    fn pop(&mut self) -> Result<(), Error> {
        match self.scopes.pop() {
            Some(len) => {
                self.assertions.truncate(len);
                Ok(())
            }
            None => Err(Error::Backend("no backtrack point to pop".to_string())),
        }
    }

    fn reset(&mut self) -> Result<(), Error> {
        self.assertions.clear();
        self.scopes.clear();
        self.last = None;
        Ok(())
    }

    fn check(&mut self, assumptions: &[BTerm]) -> Result<SmtResult, Error> {
        if let Some(t) = assumptions.iter().find(|t| self.term(**t).sort != BSort::Bool) {
            return Err(Error::Backend(format!("assumption {:?} is not boolean", t)));
        }
        let formulas: Vec<BTerm> = self.assertions.iter().chain(assumptions.iter()).copied().collect();
        self.last = None;

        let (result, model) = match self.search(&formulas) {
            Outcome::Model(model) => (SmtResult::Sat, Some(model)),
            Outcome::Refuted => (SmtResult::Unsat, None),
            Outcome::GaveUp(reason) => {
                trace!(backend = self.name(), %reason, "giving up");
                return Ok(SmtResult::Unknown);
            }
        };
        self.last = Some(LastCheck { assertions: self.assertions.clone(), assumptions: assumptions.to_vec(), model });
        Ok(result)
    }

    fn unsat_core(&mut self) -> Result<Vec<BTerm>, Error> {
        let (assertions, assumptions) = self.last_unsat()?;
        Ok(self.minimise(&assumptions, assertions))
    }

    fn unsat_assumptions(&mut self) -> Result<Vec<BTerm>, Error> {
        let (assertions, assumptions) = self.last_unsat()?;
        Ok(self.minimise(&assertions, assumptions))
    }

    fn value(&mut self, term: &BTerm) -> Result<BTerm, Error> {
        let model = self.model()?;
        self.eval_in_model(&model, *term)
    }

    fn model(&mut self) -> Result<BModel, Error> {
        if !self.produce_models {
            return Err(Error::Backend("model generation is disabled".to_string()));
        }
        match &self.last {
            Some(LastCheck { model: Some(model), .. }) => Ok(model.clone()),
            _ => Err(Error::NoModel),
        }
    }

    fn model_eval(&mut self, model: &BModel, term: &BTerm) -> Result<BTerm, Error> {
        self.eval_in_model(model, *term)
    }

    fn model_entries(&mut self, model: &BModel) -> Result<Vec<(BTerm, BTerm)>, Error> {
        let mut entries = Vec::new();
        let mut arrays = Vec::new();
        for key in &model.keys {
            match key {
                VarKey::Term(t) => entries.push((*t, self.eval_in_model(model, *t)?)),
                VarKey::Read(array, _) => {
                    if !arrays.contains(array) {
                        arrays.push(*array)
                    }
                }
            }
        }
        for array in arrays {
            entries.push((array, self.eval_in_model(model, array)?))
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::{FormulaManager, Ty};
    use crate::solver::Solver;

    fn solver() -> Solver<Bounded> {
        let options = SolverOptions::default();
        Solver::new(Bounded::new(&options).unwrap(), options)
    }

    #[test]
    fn options_are_checked() {
        assert!(matches!(
            Bounded::new(&SolverOptions::default().with_option("verbose", "1")),
            Err(Error::Option { .. })
        ));
        assert!(matches!(
            Bounded::new(&SolverOptions::default().with_option("bound", "0")),
            Err(Error::Option { .. })
        ));
        // The caller cannot change division by zero semantics
        assert!(Bounded::new(&SolverOptions::default().with_option(DIV_BY_ZERO_MODE, "1")).is_ok());
    }

    #[test]
    fn division_by_zero() {
        let mut fm = FormulaManager::new();
        let mut s = solver();
        let x = fm.symbol("x", Ty::BitVec(4)).unwrap();
        let zero = fm.bv(0, 4).unwrap();
        let ones = fm.bv(0xF, 4).unwrap();
        let one = fm.bv(1, 4).unwrap();

        let udiv = fm.bvudiv(x, zero).unwrap();
        let f = fm.eq(udiv, ones).unwrap();
        assert!(s.is_valid(&mut fm, f).unwrap());

        let urem = fm.bvurem(x, zero).unwrap();
        let f = fm.eq(urem, x).unwrap();
        assert!(s.is_valid(&mut fm, f).unwrap());

        let sdiv = fm.bvsdiv(x, zero).unwrap();
        let negative = fm.bvslt(x, zero).unwrap();
        let expected = fm.ite(negative, one, ones).unwrap();
        let f = fm.eq(sdiv, expected).unwrap();
        assert!(s.is_valid(&mut fm, f).unwrap());
    }

    #[test]
    fn bitvector_identities() {
        let mut fm = FormulaManager::new();
        let mut s = solver();
        let x = fm.symbol("x", Ty::BitVec(4)).unwrap();
        let zero4 = fm.bv(0, 4).unwrap();
        let zero8 = fm.bv(0, 8).unwrap();

        let rotated = fm.rotate_left(1, x).unwrap();
        let low = fm.extract(2, 0, x).unwrap();
        let high = fm.extract(3, 3, x).unwrap();
        let spliced = fm.concat(low, high).unwrap();
        let f = fm.eq(rotated, spliced).unwrap();
        assert!(s.is_valid(&mut fm, f).unwrap());

        let back = fm.rotate_right(1, rotated).unwrap();
        let f = fm.eq(back, x).unwrap();
        assert!(s.is_valid(&mut fm, f).unwrap());

        let extended = fm.sign_extend(4, x).unwrap();
        let lhs = fm.bvslt(extended, zero8).unwrap();
        let rhs = fm.bvslt(x, zero4).unwrap();
        let f = fm.iff(lhs, rhs).unwrap();
        assert!(s.is_valid(&mut fm, f).unwrap());

        let neg = fm.bvneg(x).unwrap();
        let sum = fm.bvadd(x, neg).unwrap();
        let f = fm.eq(sum, zero4).unwrap();
        assert!(s.is_valid(&mut fm, f).unwrap())
    }

    #[test]
    fn congruence() {
        let mut fm = FormulaManager::new();
        let mut s = solver();
        let f = fm.symbol("f", Ty::function(vec![Ty::BitVec(4)], Ty::BitVec(4))).unwrap();
        let x = fm.symbol("x", Ty::BitVec(4)).unwrap();
        let y = fm.symbol("y", Ty::BitVec(4)).unwrap();
        let one = fm.bv(1, 4).unwrap();
        let two = fm.bv(2, 4).unwrap();
        let fx = fm.apply(f, vec![x]).unwrap();
        let fy = fm.apply(f, vec![y]).unwrap();
        let c1 = fm.eq(fx, one).unwrap();
        let c2 = fm.eq(fy, two).unwrap();
        s.add_assertion(&mut fm, c1).unwrap();
        s.add_assertion(&mut fm, c2).unwrap();
        assert!(s.solve(&mut fm, &[]).unwrap());
        assert_ne!(s.get_value(&mut fm, x).unwrap(), s.get_value(&mut fm, y).unwrap());

        let same = fm.eq(x, y).unwrap();
        s.add_assertion(&mut fm, same).unwrap();
        assert!(!s.solve(&mut fm, &[]).unwrap())
    }

    #[test]
    fn integer_search_is_never_refuted() {
        let mut fm = FormulaManager::new();
        let mut s = solver();
        let x = fm.symbol("x", Ty::Int).unwrap();
        let y = fm.symbol("y", Ty::Int).unwrap();

        // Numerals of the problem extend the domain beyond the bound
        let hundred = fm.int(100).unwrap();
        let f = fm.eq(x, hundred).unwrap();
        assert!(s.is_sat(&mut fm, f).unwrap());
        s.add_assertion(&mut fm, f).unwrap();
        assert!(s.solve(&mut fm, &[]).unwrap());
        assert_eq!(s.get_value(&mut fm, x).unwrap(), hundred);
        s.reset_assertions().unwrap();

        let ten = fm.int(10).unwrap();
        let f = fm.lt(x, ten).unwrap();
        assert!(!s.is_valid(&mut fm, f).unwrap());

        // No witness in the searched values, but one exists
        let thousand = fm.int(1000).unwrap();
        let sum = fm.plus(vec![x, y]).unwrap();
        let c1 = fm.eq(sum, thousand).unwrap();
        let c2 = fm.eq(x, y).unwrap();
        let f = fm.and(vec![c1, c2]).unwrap();
        assert!(matches!(s.is_sat(&mut fm, f), Err(Error::Unknown)));

        // Genuinely unsatisfiable, but over an infinite sort
        let zero = fm.int(0).unwrap();
        let one = fm.int(1).unwrap();
        let c1 = fm.lt(zero, x).unwrap();
        let c2 = fm.lt(x, one).unwrap();
        let f = fm.and(vec![c1, c2]).unwrap();
        assert!(matches!(s.is_sat(&mut fm, f), Err(Error::Unknown)));
        assert_eq!(s.assertions().count(), 0)
    }

    #[test]
    fn arrays() {
        let mut fm = FormulaManager::new();
        let mut s = solver();
        let a = fm.symbol("a", Ty::array(Ty::Int, Ty::Int)).unwrap();
        let i = fm.symbol("i", Ty::Int).unwrap();
        let j = fm.symbol("j", Ty::Int).unwrap();
        let five = fm.int(5).unwrap();
        let three = fm.int(3).unwrap();
        let stored = fm.store(a, i, five).unwrap();
        let read = fm.select(stored, j).unwrap();
        let c1 = fm.eq(read, five).unwrap();
        let old = fm.select(a, j).unwrap();
        let c2 = fm.eq(old, three).unwrap();
        s.add_assertion(&mut fm, c1).unwrap();
        s.add_assertion(&mut fm, c2).unwrap();
        assert!(s.solve(&mut fm, &[]).unwrap());
        assert_eq!(s.get_value(&mut fm, i).unwrap(), s.get_value(&mut fm, j).unwrap());

        // The array itself is part of the model
        let snapshot = s.get_model().unwrap().snapshot(&mut fm).unwrap();
        let value = snapshot.get(a).unwrap();
        let jv = snapshot.get(j).unwrap();
        let read = fm.select(value, jv).unwrap();
        let f = fm.eq(read, three).unwrap();
        let mut other = solver();
        assert!(other.is_valid(&mut fm, f).unwrap())
    }

    #[test]
    fn symbolic_array_equality_is_unknown() {
        let mut fm = FormulaManager::new();
        let mut s = solver();
        let a = fm.symbol("a", Ty::array(Ty::Int, Ty::Int)).unwrap();
        let b = fm.symbol("b", Ty::array(Ty::Int, Ty::Int)).unwrap();
        let eq = fm.eq(a, b).unwrap();
        s.add_assertion(&mut fm, eq).unwrap();
        assert!(matches!(s.solve(&mut fm, &[]), Err(Error::Unknown)))
    }

    #[test]
    fn strategies_and_seeds() {
        let mut fm = FormulaManager::new();
        let x = fm.symbol("x", Ty::Int).unwrap();
        let zero = fm.int(0).unwrap();
        let f = fm.ge(x, zero).unwrap();

        let options = SolverOptions::default();
        let mut ascending = Solver::new(Bounded::with_strategy(&options, Strategy::Ascending).unwrap(), options.clone());
        let mut descending = Solver::new(Bounded::with_strategy(&options, Strategy::Descending).unwrap(), options);
        ascending.add_assertion(&mut fm, f).unwrap();
        assert!(ascending.solve(&mut fm, &[]).unwrap());
        descending.add_assertion(&mut fm, f).unwrap();
        assert!(descending.solve(&mut fm, &[]).unwrap());
        assert_eq!(ascending.get_value(&mut fm, x).unwrap(), zero);
        let max = fm.int(DEFAULT_BOUND).unwrap();
        assert_eq!(descending.get_value(&mut fm, x).unwrap(), max);
        assert_eq!(descending.backend_name(), "bounded-rev");

        let seeded = SolverOptions::default().with_seed(17);
        let mut values = Vec::new();
        for _ in 0..2 {
            let mut s = Solver::new(Bounded::new(&seeded).unwrap(), seeded.clone());
            s.add_assertion(&mut fm, f).unwrap();
            assert!(s.solve(&mut fm, &[]).unwrap());
            values.push(s.get_value(&mut fm, x).unwrap())
        }
        assert_eq!(values[0], values[1])
    }

    #[test]
    fn reals_have_fractional_values() {
        let mut fm = FormulaManager::new();
        let mut s = solver();
        let r = fm.symbol("r", Ty::Real).unwrap();
        let zero = fm.real(0, 1).unwrap();
        let one = fm.real(1, 1).unwrap();
        let c1 = fm.lt(zero, r).unwrap();
        let c2 = fm.lt(r, one).unwrap();
        let f = fm.and(vec![c1, c2]).unwrap();
        s.add_assertion(&mut fm, f).unwrap();
        assert!(s.solve(&mut fm, &[]).unwrap());
        let half = fm.real(1, 2).unwrap();
        assert_eq!(s.get_value(&mut fm, r).unwrap(), half)
    }
}
