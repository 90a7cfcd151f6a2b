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


//! A [Backend] over the Z3 C API, available with the `z3` feature.
//! The wrappers below own one reference each on the underlying Z3
//! object, which is released when they are dropped. Every handle
//! keeps its [Context] alive, so they can outlive the backend that
//! created them without dangling.

use libc::c_uint;
use num_bigint::{BigInt, BigUint};
use num_rational::BigRational;
use z3_sys::*;

use std::collections::HashSet;
use std::ffi::{CStr, CString};
use std::fmt;
use std::ptr;
use std::rc::Rc;
use std::str::FromStr;

use tracing::debug;

use crate::backend::{Backend, Kind, Numeral as Num, SmtResult, SortShape};
use crate::config::{SolverOptions, DIV_BY_ZERO_MODE, DIV_BY_ZERO_MODE_VALUE};
use crate::error::Error;

fn cstring(s: &str) -> Result<CString, Error> {
    CString::new(s).map_err(|_| Error::Backend(format!("string {:?} contains a nul byte", s)))
}

unsafe fn z3_string(s: Z3_string) -> String {
    if s.is_null() {
        String::new()
    } else {
        CStr::from_ptr(s).to_string_lossy().into_owned()
    }
}

/// Config is a wrapper around the `Z3_config` type from the C
/// API. `Z3_del_config` is called when it is dropped.
pub struct Config {
    z3_cfg: Z3_config,
}

impl Config {
    pub fn new() -> Self {
        unsafe { Config { z3_cfg: Z3_mk_config() } }
    }

    pub fn set_param_value(&self, id: &str, value: &str) -> Result<(), Error> {
        let id = cstring(id)?;
        let value = cstring(value)?;
        unsafe { Z3_set_param_value(self.z3_cfg, id.as_ptr(), value.as_ptr()) }
        Ok(())
    }
}

impl Drop for Config {
    fn drop(&mut self) {
        unsafe { Z3_del_config(self.z3_cfg) }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

/// Context is a wrapper around `Z3_context`. Errors are reported
/// through error codes rather than the default handler, which
/// aborts the process.
pub struct Context {
    z3_ctx: Z3_context,
}

impl Context {
    pub fn new(cfg: Config) -> Self {
        unsafe {
            let z3_ctx = Z3_mk_context_rc(cfg.z3_cfg);
            Z3_set_error_handler(z3_ctx, None);
            Context { z3_ctx }
        }
    }

    fn check(&self) -> Result<(), Error> {
        unsafe {
            let code = Z3_get_error_code(self.z3_ctx);
            if code == ErrorCode::OK {
                Ok(())
            } else {
                Err(Error::Backend(z3_string(Z3_get_error_msg(self.z3_ctx, code))))
            }
        }
    }

    fn symbol(&self, name: &str) -> Result<Z3_symbol, Error> {
        let name = cstring(name)?;
        unsafe { Ok(Z3_mk_string_symbol(self.z3_ctx, name.as_ptr())) }
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        unsafe { Z3_del_context(self.z3_ctx) }
    }
}

pub struct Sort {
    z3_sort: Z3_sort,
    ctx: Rc<Context>,
}

impl Sort {
    unsafe fn wrap(ctx: &Rc<Context>, z3_sort: Z3_sort) -> Result<Self, Error> {
        ctx.check()?;
        Z3_inc_ref(ctx.z3_ctx, Z3_sort_to_ast(ctx.z3_ctx, z3_sort));
        Ok(Sort { z3_sort, ctx: Rc::clone(ctx) })
    }

    fn kind(&self) -> SortKind {
        unsafe { Z3_get_sort_kind(self.ctx.z3_ctx, self.z3_sort) }
    }
}

impl Clone for Sort {
    fn clone(&self) -> Self {
        unsafe {
            Z3_inc_ref(self.ctx.z3_ctx, Z3_sort_to_ast(self.ctx.z3_ctx, self.z3_sort));
            Sort { z3_sort: self.z3_sort, ctx: Rc::clone(&self.ctx) }
        }
    }
}

impl Drop for Sort {
    fn drop(&mut self) {
        unsafe {
            let ctx = self.ctx.z3_ctx;
            Z3_dec_ref(ctx, Z3_sort_to_ast(ctx, self.z3_sort))
        }
    }
}

impl fmt::Debug for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        unsafe { write!(f, "{}", z3_string(Z3_sort_to_string(self.ctx.z3_ctx, self.z3_sort))) }
    }
}

/// Z3 has no sorts for functions, so function declarations carry
/// their signature separately.
#[derive(Clone, Debug)]
pub enum Z3Sort {
    Native(Sort),
    Function(Vec<Z3Sort>, Box<Z3Sort>),
}

impl Z3Sort {
    fn native(&self) -> Result<&Sort, Error> {
        match self {
            Z3Sort::Native(sort) => Ok(sort),
            Z3Sort::Function(_, _) => Err(Error::Backend("function sort used as a value sort".to_string())),
        }
    }
}

pub struct FuncDecl {
    z3_func_decl: Z3_func_decl,
    ctx: Rc<Context>,
}

impl FuncDecl {
    unsafe fn wrap(ctx: &Rc<Context>, z3_func_decl: Z3_func_decl) -> Result<Self, Error> {
        ctx.check()?;
        Z3_inc_ref(ctx.z3_ctx, Z3_func_decl_to_ast(ctx.z3_ctx, z3_func_decl));
        Ok(FuncDecl { z3_func_decl, ctx: Rc::clone(ctx) })
    }

    fn id(&self) -> u32 {
        unsafe { Z3_get_ast_id(self.ctx.z3_ctx, Z3_func_decl_to_ast(self.ctx.z3_ctx, self.z3_func_decl)) }
    }
}

impl Clone for FuncDecl {
    fn clone(&self) -> Self {
        unsafe {
            Z3_inc_ref(self.ctx.z3_ctx, Z3_func_decl_to_ast(self.ctx.z3_ctx, self.z3_func_decl));
            FuncDecl { z3_func_decl: self.z3_func_decl, ctx: Rc::clone(&self.ctx) }
        }
    }
}

impl Drop for FuncDecl {
    fn drop(&mut self) {
        unsafe {
            let ctx = self.ctx.z3_ctx;
            Z3_dec_ref(ctx, Z3_func_decl_to_ast(ctx, self.z3_func_decl))
        }
    }
}

impl fmt::Debug for FuncDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        unsafe { write!(f, "{}", z3_string(Z3_func_decl_to_string(self.ctx.z3_ctx, self.z3_func_decl))) }
    }
}

pub struct Ast {
    z3_ast: Z3_ast,
    ctx: Rc<Context>,
}

impl Ast {
    unsafe fn wrap(ctx: &Rc<Context>, z3_ast: Z3_ast) -> Result<Self, Error> {
        ctx.check()?;
        if z3_ast.is_null() {
            return Err(Error::Backend("z3 returned a null term".to_string()));
        }
        Z3_inc_ref(ctx.z3_ctx, z3_ast);
        Ok(Ast { z3_ast, ctx: Rc::clone(ctx) })
    }

    fn id(&self) -> u32 {
        unsafe { Z3_get_ast_id(self.ctx.z3_ctx, self.z3_ast) }
    }

    fn sort(&self) -> Result<Sort, Error> {
        unsafe { Sort::wrap(&self.ctx, Z3_get_sort(self.ctx.z3_ctx, self.z3_ast)) }
    }

    fn is_int(&self) -> bool {
        self.sort().map(|s| s.kind() == SortKind::Int).unwrap_or(false)
    }

    fn is_real(&self) -> bool {
        self.sort().map(|s| s.kind() == SortKind::Real).unwrap_or(false)
    }

    /// Coerce an integer term where a real is expected.
    fn coerce(&self, target: &Sort) -> Result<Ast, Error> {
        if target.kind() == SortKind::Real && self.is_int() {
            unsafe { Ast::wrap(&self.ctx, Z3_mk_int2real(self.ctx.z3_ctx, self.z3_ast)) }
        } else {
            Ok(self.clone())
        }
    }
}

impl Clone for Ast {
    fn clone(&self) -> Self {
        unsafe {
            Z3_inc_ref(self.ctx.z3_ctx, self.z3_ast);
            Ast { z3_ast: self.z3_ast, ctx: Rc::clone(&self.ctx) }
        }
    }
}

impl Drop for Ast {
    fn drop(&mut self) {
        unsafe { Z3_dec_ref(self.ctx.z3_ctx, self.z3_ast) }
    }
}

impl fmt::Debug for Ast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        unsafe { write!(f, "{}", z3_string(Z3_ast_to_string(self.ctx.z3_ctx, self.z3_ast))) }
    }
}

pub struct Z3Model {
    z3_model: Z3_model,
    ctx: Rc<Context>,
}

impl Drop for Z3Model {
    fn drop(&mut self) {
        unsafe { Z3_model_dec_ref(self.ctx.z3_ctx, self.z3_model) }
    }
}

/// Promote integer arguments to reals when they are mixed with
/// reals, which the Z3 API requires for arithmetic.
fn unify_numeric(args: &[Ast]) -> Result<Vec<Ast>, Error> {
    if args.iter().any(Ast::is_real) {
        args.iter()
            .map(|arg| {
                if arg.is_int() {
                    unsafe { Ast::wrap(&arg.ctx, Z3_mk_int2real(arg.ctx.z3_ctx, arg.z3_ast)) }
                } else {
                    Ok(arg.clone())
                }
            })
            .collect()
    } else {
        Ok(args.to_vec())
    }
}

fn raw(args: &[Ast]) -> Vec<Z3_ast> {
    args.iter().map(|arg| arg.z3_ast).collect()
}

pub struct Z3 {
    ctx: Rc<Context>,
    z3_solver: Z3_solver,
    produce_models: bool,
    produce_cores: bool,
    declared: HashSet<u32>,
    /// Tracking literals for assertions, used for unsat cores.
    trackers: Vec<(Ast, Ast)>,
    tracker_scopes: Vec<usize>,
    last: Option<SmtResult>,
}

impl Drop for Z3 {
    fn drop(&mut self) {
        unsafe { Z3_solver_dec_ref(self.ctx.z3_ctx, self.z3_solver) }
    }
}

impl Z3 {
    pub fn new(options: &SolverOptions) -> Result<Self, Error> {
        let cfg = Config::new();
        let mut produce_models = true;
        let mut produce_cores = false;
        let mut params = Vec::new();
        for (key, value) in options.backend_params() {
            match key.as_str() {
                "model_generation" => produce_models = crate::config::parse_bool_option(&key, &value)?,
                "unsat_core_generation" => produce_cores = crate::config::parse_bool_option(&key, &value)?,
                DIV_BY_ZERO_MODE if value == DIV_BY_ZERO_MODE_VALUE => (),
                DIV_BY_ZERO_MODE => {
                    return Err(Error::Option {
                        key,
                        value,
                        reason: "only SMT-LIB division by zero is supported".to_string(),
                    })
                }
                _ => params.push((key, value)),
            }
        }
        cfg.set_param_value("model", if produce_models { "true" } else { "false" })?;
        cfg.set_param_value("unsat_core", if produce_cores { "true" } else { "false" })?;
        let ctx = Rc::new(Context::new(cfg));

        let z3_solver = unsafe {
            let z3_solver = Z3_mk_solver(ctx.z3_ctx);
            ctx.check()?;
            Z3_solver_inc_ref(ctx.z3_ctx, z3_solver);
            z3_solver
        };
        let backend = Z3 {
            ctx,
            z3_solver,
            produce_models,
            produce_cores,
            declared: HashSet::new(),
            trackers: Vec::new(),
            tracker_scopes: Vec::new(),
            last: None,
        };
        backend.set_params(&params)?;
        Ok(backend)
    }

    fn set_params(&self, params: &[(String, String)]) -> Result<(), Error> {
        if params.is_empty() {
            return Ok(());
        }
        let c = self.ctx.z3_ctx;
        unsafe {
            let z3_params = Z3_mk_params(c);
            Z3_params_inc_ref(c, z3_params);
            let mut result = Ok(());
            for (key, value) in params {
                let k = self.ctx.symbol(key)?;
                if let Ok(b) = value.parse::<bool>() {
                    Z3_params_set_bool(c, z3_params, k, b)
                } else if let Ok(n) = value.parse::<c_uint>() {
                    Z3_params_set_uint(c, z3_params, k, n)
                } else if let Ok(x) = value.parse::<f64>() {
                    Z3_params_set_double(c, z3_params, k, x)
                } else {
                    Z3_params_set_symbol(c, z3_params, k, self.ctx.symbol(value)?)
                }
                Z3_solver_set_params(c, self.z3_solver, z3_params);
                if let Err(err) = self.ctx.check() {
                    result = Err(Error::Option { key: key.clone(), value: value.clone(), reason: err.to_string() });
                    break;
                }
            }
            Z3_params_dec_ref(c, z3_params);
            result
        }
    }

    fn wrap(&self, z3_ast: Z3_ast) -> Result<Ast, Error> {
        unsafe { Ast::wrap(&self.ctx, z3_ast) }
    }

    fn mk_numeral(&self, numeral: &Num) -> Result<Ast, Error> {
        let c = self.ctx.z3_ctx;
        unsafe {
            let (digits, z3_sort) = match numeral {
                Num::Int(n) => (n.to_string(), Z3_mk_int_sort(c)),
                Num::Real(q) => (q.to_string(), Z3_mk_real_sort(c)),
                Num::Bits(v, w) => (v.to_string(), Z3_mk_bv_sort(c, *w)),
            };
            let sort = Sort::wrap(&self.ctx, z3_sort)?;
            let digits = cstring(&digits)?;
            self.wrap(Z3_mk_numeral(c, digits.as_ptr(), sort.z3_sort))
        }
    }

    fn read_numeral(&self, ast: &Ast) -> Result<Num, Error> {
        let digits = unsafe { z3_string(Z3_get_numeral_string(self.ctx.z3_ctx, ast.z3_ast)) };
        let bad = || Error::Backend(format!("cannot read numeral {}", digits));
        let sort = ast.sort()?;
        match sort.kind() {
            SortKind::Int => BigInt::from_str(&digits).map(Num::Int).map_err(|_| bad()),
            SortKind::Real => BigRational::from_str(&digits).map(Num::Real).map_err(|_| bad()),
            SortKind::BV => {
                let width = unsafe { Z3_get_bv_sort_size(self.ctx.z3_ctx, sort.z3_sort) };
                BigUint::from_str(&digits).map(|v| Num::Bits(v, width)).map_err(|_| bad())
            }
            _ => Err(bad()),
        }
    }

    fn fresh_tracker(&self) -> Result<Ast, Error> {
        let c = self.ctx.z3_ctx;
        let prefix = cstring("track")?;
        unsafe {
            let sort = Sort::wrap(&self.ctx, Z3_mk_bool_sort(c))?;
            self.wrap(Z3_mk_fresh_const(c, prefix.as_ptr(), sort.z3_sort))
        }
    }

    fn ast_vector(&self, vector: Z3_ast_vector) -> Result<Vec<Ast>, Error> {
        let c = self.ctx.z3_ctx;
        unsafe {
            self.ctx.check()?;
            Z3_ast_vector_inc_ref(c, vector);
            let size = Z3_ast_vector_size(c, vector);
            let result = (0..size).map(|i| self.wrap(Z3_ast_vector_get(c, vector, i))).collect();
            Z3_ast_vector_dec_ref(c, vector);
            result
        }
    }

    fn core(&self) -> Result<Vec<Ast>, Error> {
        if self.last != Some(SmtResult::Unsat) {
            return Err(Error::Backend("the last check was not unsatisfiable".to_string()));
        }
        unsafe { self.ast_vector(Z3_solver_get_unsat_core(self.ctx.z3_ctx, self.z3_solver)) }
    }

    fn app_args(&self, app: Z3_app) -> Result<Vec<Ast>, Error> {
        let c = self.ctx.z3_ctx;
        unsafe { (0..Z3_get_app_num_args(c, app)).map(|i| self.wrap(Z3_get_app_arg(c, app, i))).collect() }
    }

    /// Replace an `as-array` reference to an auxiliary function in a
    /// model by an explicit constant array with stores.
    fn expand_array(&mut self, model: &Z3Model, value: Ast) -> Result<Ast, Error> {
        let c = self.ctx.z3_ctx;
        unsafe {
            if Z3_get_ast_kind(c, value.z3_ast) != AstKind::App {
                return Ok(value);
            }
            let decl = Z3_get_app_decl(c, Z3_to_app(c, value.z3_ast));
            if Z3_get_decl_kind(c, decl) != DeclKind::AS_ARRAY {
                return Ok(value);
            }
            let function = FuncDecl::wrap(&self.ctx, Z3_get_decl_func_decl_parameter(c, decl, 0))?;
            let interp = Z3_model_get_func_interp(c, model.z3_model, function.z3_func_decl);
            self.ctx.check()?;
            if interp.is_null() {
                return Err(Error::Backend(format!("no interpretation for {:?}", function)));
            }
            Z3_func_interp_inc_ref(c, interp);
            let result = self.expand_interp(&value, interp);
            Z3_func_interp_dec_ref(c, interp);
            result
        }
    }

    unsafe fn expand_interp(&mut self, array: &Ast, interp: Z3_func_interp) -> Result<Ast, Error> {
        let c = self.ctx.z3_ctx;
        let sort = array.sort()?;
        let default = self.wrap(Z3_func_interp_get_else(c, interp))?;
        let mut result = self.wrap(Z3_mk_const_array(c, Z3_get_array_sort_domain(c, sort.z3_sort), default.z3_ast))?;
        for i in 0..Z3_func_interp_get_num_entries(c, interp) {
            let entry = Z3_func_interp_get_entry(c, interp, i);
            Z3_func_entry_inc_ref(c, entry);
            let stored = (|| {
                let index = self.wrap(Z3_func_entry_get_arg(c, entry, 0))?;
                let elem = self.wrap(Z3_func_entry_get_value(c, entry))?;
                self.wrap(Z3_mk_store(c, result.z3_ast, index.z3_ast, elem.z3_ast))
            })();
            Z3_func_entry_dec_ref(c, entry);
            result = stored?
        }
        Ok(result)
    }
}

impl Backend for Z3 {
    type Sort = Z3Sort;
    type Decl = FuncDecl;
    type Term = Ast;
    type Model = Z3Model;

    fn name(&self) -> &str {
        "z3"
    }

    fn mk_sort(&mut self, shape: SortShape<Z3Sort>) -> Result<Z3Sort, Error> {
        let c = self.ctx.z3_ctx;
        unsafe {
            let z3_sort = match shape {
                SortShape::Bool => Z3_mk_bool_sort(c),
                SortShape::Int => Z3_mk_int_sort(c),
                SortShape::Real => Z3_mk_real_sort(c),
                SortShape::BitVec(w) => Z3_mk_bv_sort(c, w),
                SortShape::Array(index, elem) => Z3_mk_array_sort(c, index.native()?.z3_sort, elem.native()?.z3_sort),
                SortShape::Function(params, ret) => return Ok(Z3Sort::Function(params, Box::new(ret))),
            };
            Sort::wrap(&self.ctx, z3_sort).map(Z3Sort::Native)
        }
    }

    fn sort_shape(&self, sort: &Z3Sort) -> Result<SortShape<Z3Sort>, Error> {
        let c = self.ctx.z3_ctx;
        let sort = match sort {
            Z3Sort::Native(sort) => sort,
            Z3Sort::Function(params, ret) => return Ok(SortShape::Function(params.clone(), (**ret).clone())),
        };
        unsafe {
            Ok(match sort.kind() {
                SortKind::Bool => SortShape::Bool,
                SortKind::Int => SortShape::Int,
                SortKind::Real => SortShape::Real,
                SortKind::BV => SortShape::BitVec(Z3_get_bv_sort_size(c, sort.z3_sort)),
                SortKind::Array => SortShape::Array(
                    Z3Sort::Native(Sort::wrap(&self.ctx, Z3_get_array_sort_domain(c, sort.z3_sort))?),
                    Z3Sort::Native(Sort::wrap(&self.ctx, Z3_get_array_sort_range(c, sort.z3_sort))?),
                ),
                _ => return Err(Error::Unsupported(format!("z3 sort {:?}", sort))),
            })
        }
    }

    fn declare(&mut self, name: &str, sort: &Z3Sort) -> Result<FuncDecl, Error> {
        let c = self.ctx.z3_ctx;
        let symbol = self.ctx.symbol(name)?;
        let (params, ret) = match sort {
            Z3Sort::Native(sort) => (Vec::new(), sort),
            Z3Sort::Function(params, ret) => {
                (params.iter().map(|p| p.native().map(|s| s.z3_sort)).collect::<Result<Vec<_>, _>>()?, ret.native()?)
            }
        };
        let decl = unsafe {
            FuncDecl::wrap(&self.ctx, Z3_mk_func_decl(c, symbol, params.len() as c_uint, params.as_ptr(), ret.z3_sort))?
        };
        self.declared.insert(decl.id());
        Ok(decl)
    }

    fn decl_id(&self, decl: &FuncDecl) -> u64 {
        u64::from(decl.id())
    }

    fn decl_name(&self, decl: &FuncDecl) -> String {
        let c = self.ctx.z3_ctx;
        unsafe {
            let symbol = Z3_get_decl_name(c, decl.z3_func_decl);
            match Z3_get_symbol_kind(c, symbol) {
                SymbolKind::Int => format!("k!{}", Z3_get_symbol_int(c, symbol)),
                _ => z3_string(Z3_get_symbol_string(c, symbol)),
            }
        }
    }

    fn decl_sort(&self, decl: &FuncDecl) -> Result<Z3Sort, Error> {
        let c = self.ctx.z3_ctx;
        unsafe {
            let ret = Z3Sort::Native(Sort::wrap(&self.ctx, Z3_get_range(c, decl.z3_func_decl))?);
            let arity = Z3_get_domain_size(c, decl.z3_func_decl);
            if arity == 0 {
                return Ok(ret);
            }
            let params = (0..arity)
                .map(|i| Sort::wrap(&self.ctx, Z3_get_domain(c, decl.z3_func_decl, i)).map(Z3Sort::Native))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Z3Sort::Function(params, Box::new(ret)))
        }
    }

    fn mk_term(&mut self, kind: Kind<Z3Sort, FuncDecl>, args: &[Ast]) -> Result<Ast, Error> {
        use Kind::*;
        let c = self.ctx.z3_ctx;
        let expected = match &kind {
            True | False | Numeral(_) | Constant(_) => Some(0),
            Not | BvNot | BvNeg | BvExtract(_, _) | BvZeroExtend(_) | BvSignExtend(_) | BvRotateLeft(_)
            | BvRotateRight(_) | ArrayConst(_) => Some(1),
            Ite | ArrayWrite => Some(3),
            And | Or | Plus | Times | Uf(_) => None,
            _ => Some(2),
        };
        if expected.map_or(args.is_empty(), |n| n != args.len()) {
            return Err(Error::Backend(format!("{:?} applied to {} arguments", kind, args.len())));
        }
        let a = raw(args);

        let z3_ast = unsafe {
            match kind {
                True => Z3_mk_true(c),
                False => Z3_mk_false(c),
                Numeral(n) => return self.mk_numeral(&n),
                Constant(d) => Z3_mk_app(c, d.z3_func_decl, 0, ptr::null()),
                Uf(d) => {
                    let args = match self.decl_sort(&d)? {
                        Z3Sort::Function(params, _) if params.len() == args.len() => params
                            .iter()
                            .zip(args)
                            .map(|(p, arg)| arg.coerce(p.native()?))
                            .collect::<Result<Vec<_>, _>>()?,
                        _ => return Err(Error::Backend(format!("{:?} applied to {} arguments", d, args.len()))),
                    };
                    let a = raw(&args);
                    Z3_mk_app(c, d.z3_func_decl, a.len() as c_uint, a.as_ptr())
                }
                And => Z3_mk_and(c, a.len() as c_uint, a.as_ptr()),
                Or => Z3_mk_or(c, a.len() as c_uint, a.as_ptr()),
                Not => Z3_mk_not(c, a[0]),
                Iff => Z3_mk_iff(c, a[0], a[1]),
                Ite => {
                    let branches = unify_numeric(&args[1..])?;
                    Z3_mk_ite(c, a[0], branches[0].z3_ast, branches[1].z3_ast)
                }
                Eq => {
                    let sides = unify_numeric(args)?;
                    Z3_mk_eq(c, sides[0].z3_ast, sides[1].z3_ast)
                }
                Leq => {
                    let sides = unify_numeric(args)?;
                    Z3_mk_le(c, sides[0].z3_ast, sides[1].z3_ast)
                }
                Plus | Times => {
                    let args = raw(&unify_numeric(args)?);
                    if matches!(kind, Plus) {
                        Z3_mk_add(c, args.len() as c_uint, args.as_ptr())
                    } else {
                        Z3_mk_mul(c, args.len() as c_uint, args.as_ptr())
                    }
                }
                BvNot => Z3_mk_bvnot(c, a[0]),
                BvNeg => Z3_mk_bvneg(c, a[0]),
                BvAnd => Z3_mk_bvand(c, a[0], a[1]),
                BvOr => Z3_mk_bvor(c, a[0], a[1]),
                BvXor => Z3_mk_bvxor(c, a[0], a[1]),
                BvAdd => Z3_mk_bvadd(c, a[0], a[1]),
                BvSub => Z3_mk_bvsub(c, a[0], a[1]),
                BvMul => Z3_mk_bvmul(c, a[0], a[1]),
                BvUdiv => Z3_mk_bvudiv(c, a[0], a[1]),
                BvUrem => Z3_mk_bvurem(c, a[0], a[1]),
                BvSdiv => Z3_mk_bvsdiv(c, a[0], a[1]),
                BvSrem => Z3_mk_bvsrem(c, a[0], a[1]),
                BvShl => Z3_mk_bvshl(c, a[0], a[1]),
                BvLshr => Z3_mk_bvlshr(c, a[0], a[1]),
                BvAshr => Z3_mk_bvashr(c, a[0], a[1]),
                BvUlt => Z3_mk_bvult(c, a[0], a[1]),
                BvUle => Z3_mk_bvule(c, a[0], a[1]),
                BvSlt => Z3_mk_bvslt(c, a[0], a[1]),
                BvSle => Z3_mk_bvsle(c, a[0], a[1]),
                BvConcat => Z3_mk_concat(c, a[0], a[1]),
                BvComp => {
                    let one = self.mk_numeral(&Num::Bits(BigUint::from(1u32), 1))?;
                    let zero = self.mk_numeral(&Num::Bits(BigUint::from(0u32), 1))?;
                    let eq = self.wrap(Z3_mk_eq(c, a[0], a[1]))?;
                    Z3_mk_ite(c, eq.z3_ast, one.z3_ast, zero.z3_ast)
                }
                BvExtract(hi, lo) => Z3_mk_extract(c, hi, lo, a[0]),
                BvZeroExtend(n) => Z3_mk_zero_ext(c, n, a[0]),
                BvSignExtend(n) => Z3_mk_sign_ext(c, n, a[0]),
                BvRotateLeft(n) => Z3_mk_rotate_left(c, n, a[0]),
                BvRotateRight(n) => Z3_mk_rotate_right(c, n, a[0]),
                ArrayRead | ArrayWrite => {
                    let sort = args[0].sort()?;
                    let index = args[1].coerce(&Sort::wrap(&self.ctx, Z3_get_array_sort_domain(c, sort.z3_sort))?)?;
                    if matches!(kind, ArrayRead) {
                        Z3_mk_select(c, a[0], index.z3_ast)
                    } else {
                        let range = Sort::wrap(&self.ctx, Z3_get_array_sort_range(c, sort.z3_sort))?;
                        let elem = args[2].coerce(&range)?;
                        Z3_mk_store(c, a[0], index.z3_ast, elem.z3_ast)
                    }
                }
                ArrayConst(sort) => {
                    let sort = sort.native()?;
                    let range = Sort::wrap(&self.ctx, Z3_get_array_sort_range(c, sort.z3_sort))?;
                    let elem = args[0].coerce(&range)?;
                    Z3_mk_const_array(c, Z3_get_array_sort_domain(c, sort.z3_sort), elem.z3_ast)
                }
            }
        };
        self.wrap(z3_ast)
    }

    fn view(&mut self, term: &Ast) -> Result<(Kind<Z3Sort, FuncDecl>, Vec<Ast>), Error> {
        use Kind::*;
        let c = self.ctx.z3_ctx;
        unsafe {
            match Z3_get_ast_kind(c, term.z3_ast) {
                AstKind::Numeral => return Ok((Kind::Numeral(self.read_numeral(term)?), Vec::new())),
                AstKind::App => (),
                _ => return Err(Error::Unsupported(format!("z3 term {:?}", term))),
            }
            let app = Z3_to_app(c, term.z3_ast);
            let decl = FuncDecl::wrap(&self.ctx, Z3_get_app_decl(c, app))?;
            let args = self.app_args(app)?;
            let param = |i: c_uint| Z3_get_decl_int_parameter(c, decl.z3_func_decl, i) as u32;
            let minus_one = |this: &mut Self| this.mk_term(Numeral(Num::Int(BigInt::from(-1))), &[]);

            Ok(match Z3_get_decl_kind(c, decl.z3_func_decl) {
                DeclKind::TRUE => (True, args),
                DeclKind::FALSE => (False, args),
                DeclKind::AND => (And, args),
                DeclKind::OR => (Or, args),
                DeclKind::NOT => (Not, args),
                DeclKind::IFF => (Iff, args),
                DeclKind::XOR => (Not, vec![self.mk_term(Iff, &args)?]),
                DeclKind::IMPLIES => (Or, vec![self.mk_term(Not, &args[..1])?, args[1].clone()]),
                DeclKind::ITE => (Ite, args),
                DeclKind::EQ => (Eq, args),
                DeclKind::DISTINCT if args.len() == 2 => (Not, vec![self.mk_term(Eq, &args)?]),
                DeclKind::DISTINCT => {
                    let mut conjuncts = Vec::new();
                    for i in 0..args.len() {
                        for j in i + 1..args.len() {
                            let eq = self.mk_term(Eq, &[args[i].clone(), args[j].clone()])?;
                            conjuncts.push(self.mk_term(Not, &[eq])?)
                        }
                    }
                    (And, conjuncts)
                }
                DeclKind::LE => (Leq, args),
                DeclKind::GE => (Leq, vec![args[1].clone(), args[0].clone()]),
                DeclKind::LT => (Not, vec![self.mk_term(Leq, &[args[1].clone(), args[0].clone()])?]),
                DeclKind::GT => (Not, vec![self.mk_term(Leq, &args)?]),
                DeclKind::ADD => (Plus, args),
                DeclKind::MUL => (Times, args),
                DeclKind::SUB => {
                    let m = minus_one(self)?;
                    let mut terms = vec![args[0].clone()];
                    for arg in &args[1..] {
                        terms.push(self.mk_term(Times, &[m.clone(), arg.clone()])?)
                    }
                    (Plus, terms)
                }
                DeclKind::UMINUS => (Times, vec![minus_one(self)?, args[0].clone()]),
                DeclKind::TO_REAL => return self.view(&args[0]),
                DeclKind::BNUM => return Ok((Numeral(self.read_numeral(term)?), Vec::new())),
                DeclKind::BNOT => (BvNot, args),
                DeclKind::BNEG => (BvNeg, args),
                DeclKind::BAND => (BvAnd, args),
                DeclKind::BOR => (BvOr, args),
                DeclKind::BXOR => (BvXor, args),
                DeclKind::BNAND => (BvNot, vec![self.mk_term(BvAnd, &args)?]),
                DeclKind::BNOR => (BvNot, vec![self.mk_term(BvOr, &args)?]),
                DeclKind::BXNOR => (BvNot, vec![self.mk_term(BvXor, &args)?]),
                DeclKind::BADD => (BvAdd, args),
                DeclKind::BSUB => (BvSub, args),
                DeclKind::BMUL => (BvMul, args),
                DeclKind::BUDIV => (BvUdiv, args),
                DeclKind::BUREM => (BvUrem, args),
                DeclKind::BSDIV => (BvSdiv, args),
                DeclKind::BSREM => (BvSrem, args),
                DeclKind::BSHL => (BvShl, args),
                DeclKind::BLSHR => (BvLshr, args),
                DeclKind::BASHR => (BvAshr, args),
                DeclKind::ULEQ => (BvUle, args),
                DeclKind::UGEQ => (BvUle, vec![args[1].clone(), args[0].clone()]),
                DeclKind::ULT => (BvUlt, args),
                DeclKind::UGT => (BvUlt, vec![args[1].clone(), args[0].clone()]),
                DeclKind::SLEQ => (BvSle, args),
                DeclKind::SGEQ => (BvSle, vec![args[1].clone(), args[0].clone()]),
                DeclKind::SLT => (BvSlt, args),
                DeclKind::SGT => (BvSlt, vec![args[1].clone(), args[0].clone()]),
                DeclKind::BCOMP => (BvComp, args),
                DeclKind::CONCAT if args.len() > 2 => {
                    let mut rest = args[args.len() - 1].clone();
                    for arg in args[1..args.len() - 1].iter().rev() {
                        rest = self.mk_term(BvConcat, &[arg.clone(), rest])?
                    }
                    (BvConcat, vec![args[0].clone(), rest])
                }
                DeclKind::CONCAT => (BvConcat, args),
                DeclKind::EXTRACT => (BvExtract(param(0), param(1)), args),
                DeclKind::ZERO_EXT => (BvZeroExtend(param(0)), args),
                DeclKind::SIGN_EXT => (BvSignExtend(param(0)), args),
                DeclKind::ROTATE_LEFT => (BvRotateLeft(param(0)), args),
                DeclKind::ROTATE_RIGHT => (BvRotateRight(param(0)), args),
                DeclKind::SELECT => (ArrayRead, args),
                DeclKind::STORE => (ArrayWrite, args),
                DeclKind::CONST_ARRAY => (ArrayConst(Z3Sort::Native(term.sort()?)), args),
                DeclKind::UNINTERPRETED if args.is_empty() => (Constant(decl), args),
                DeclKind::UNINTERPRETED => (Uf(decl), args),
                _ => return Err(Error::Unsupported(format!("z3 operator {:?}", decl))),
            })
        }
    }

    fn term_sort(&self, term: &Ast) -> Result<Z3Sort, Error> {
        term.sort().map(Z3Sort::Native)
    }

    fn term_id(&self, term: &Ast) -> u64 {
        u64::from(term.id())
    }

    fn is_numeral(&mut self, term: &Ast) -> Result<bool, Error> {
        unsafe { Ok(Z3_is_numeral_ast(self.ctx.z3_ctx, term.z3_ast)) }
    }

    fn assert(&mut self, term: &Ast) -> Result<(), Error> {
        let c = self.ctx.z3_ctx;
        unsafe {
            if self.produce_cores {
                let tracker = self.fresh_tracker()?;
                Z3_solver_assert_and_track(c, self.z3_solver, term.z3_ast, tracker.z3_ast);
                self.trackers.push((tracker, term.clone()))
            } else {
                Z3_solver_assert(c, self.z3_solver, term.z3_ast)
            }
        }
        self.ctx.check()
    }

    fn push(&mut self) -> Result<(), Error> {
        unsafe { Z3_solver_push(self.ctx.z3_ctx, self.z3_solver) }
        self.tracker_scopes.push(self.trackers.len());
        self.ctx.check()
    }

    fn pop(&mut self) -> Result<(), Error> {
        let len = self.tracker_scopes.pop().ok_or_else(|| Error::Backend("no backtrack point to pop".to_string()))?;
        self.trackers.truncate(len);
        unsafe { Z3_solver_pop(self.ctx.z3_ctx, self.z3_solver, 1) }
        self.ctx.check()
    }

    fn reset(&mut self) -> Result<(), Error> {
        unsafe { Z3_solver_reset(self.ctx.z3_ctx, self.z3_solver) }
        self.trackers.clear();
        self.tracker_scopes.clear();
        self.last = None;
        self.ctx.check()
    }

    fn check(&mut self, assumptions: &[Ast]) -> Result<SmtResult, Error> {
        let a = raw(assumptions);
        let result = unsafe {
            let result = Z3_solver_check_assumptions(self.ctx.z3_ctx, self.z3_solver, a.len() as c_uint, a.as_ptr());
            self.ctx.check()?;
            if result == Z3_L_TRUE {
                SmtResult::Sat
            } else if result == Z3_L_FALSE {
                SmtResult::Unsat
            } else {
                let reason = z3_string(Z3_solver_get_reason_unknown(self.ctx.z3_ctx, self.z3_solver));
                debug!(%reason, "z3 returned unknown");
                SmtResult::Unknown
            }
        };
        self.last = Some(result);
        Ok(result)
    }

    fn unsat_core(&mut self) -> Result<Vec<Ast>, Error> {
        if !self.produce_cores {
            return Err(Error::Backend("unsat core generation is disabled".to_string()));
        }
        let core: HashSet<u32> = self.core()?.iter().map(Ast::id).collect();
        Ok(self.trackers.iter().filter(|(tracker, _)| core.contains(&tracker.id())).map(|(_, t)| t.clone()).collect())
    }

    fn unsat_assumptions(&mut self) -> Result<Vec<Ast>, Error> {
        let trackers: HashSet<u32> = self.trackers.iter().map(|(tracker, _)| tracker.id()).collect();
        Ok(self.core()?.into_iter().filter(|lit| !trackers.contains(&lit.id())).collect())
    }

    fn value(&mut self, term: &Ast) -> Result<Ast, Error> {
        let model = self.model()?;
        self.model_eval(&model, term)
    }

    fn model(&mut self) -> Result<Z3Model, Error> {
        if !self.produce_models {
            return Err(Error::Backend("model generation is disabled".to_string()));
        }
        if self.last != Some(SmtResult::Sat) {
            return Err(Error::NoModel);
        }
        let c = self.ctx.z3_ctx;
        unsafe {
            let z3_model = Z3_solver_get_model(c, self.z3_solver);
            self.ctx.check()?;
            if z3_model.is_null() {
                return Err(Error::NoModel);
            }
            Z3_model_inc_ref(c, z3_model);
            Ok(Z3Model { z3_model, ctx: Rc::clone(&self.ctx) })
        }
    }

    fn model_eval(&mut self, model: &Z3Model, term: &Ast) -> Result<Ast, Error> {
        let c = self.ctx.z3_ctx;
        let value = unsafe {
            let mut result: Z3_ast = ptr::null_mut();
            if !Z3_model_eval(c, model.z3_model, term.z3_ast, true, &mut result) {
                self.ctx.check()?;
                return Err(Error::Backend(format!("cannot evaluate {:?}", term)));
            }
            self.wrap(result)?
        };
        self.expand_array(model, value)
    }

    fn model_entries(&mut self, model: &Z3Model) -> Result<Vec<(Ast, Ast)>, Error> {
        let c = self.ctx.z3_ctx;
        let m = model.z3_model;
        let mut entries = Vec::new();
        unsafe {
            for i in 0..Z3_model_get_num_consts(c, m) {
                let decl = FuncDecl::wrap(&self.ctx, Z3_model_get_const_decl(c, m, i))?;
                if !self.declared.contains(&decl.id()) {
                    continue;
                }
                let constant = self.wrap(Z3_mk_app(c, decl.z3_func_decl, 0, ptr::null()))?;
                let value = self.wrap(Z3_model_get_const_interp(c, m, decl.z3_func_decl))?;
                let value = self.expand_array(model, value)?;
                entries.push((constant, value))
            }

            for i in 0..Z3_model_get_num_funcs(c, m) {
                let decl = FuncDecl::wrap(&self.ctx, Z3_model_get_func_decl(c, m, i))?;
                if !self.declared.contains(&decl.id()) {
                    continue;
                }
                let interp = Z3_model_get_func_interp(c, m, decl.z3_func_decl);
                self.ctx.check()?;
                if interp.is_null() {
                    continue;
                }
                Z3_func_interp_inc_ref(c, interp);
                let mut result = Ok(());
                for j in 0..Z3_func_interp_get_num_entries(c, interp) {
                    let entry = Z3_func_interp_get_entry(c, interp, j);
                    Z3_func_entry_inc_ref(c, entry);
                    let app = (|| {
                        let args = (0..Z3_func_entry_get_num_args(c, entry))
                            .map(|k| self.wrap(Z3_func_entry_get_arg(c, entry, k)))
                            .collect::<Result<Vec<_>, _>>()?;
                        let a = raw(&args);
                        let app = self.wrap(Z3_mk_app(c, decl.z3_func_decl, a.len() as c_uint, a.as_ptr()))?;
                        Ok((app, self.wrap(Z3_func_entry_get_value(c, entry))?))
                    })();
                    Z3_func_entry_dec_ref(c, entry);
                    match app {
                        Ok(pair) => entries.push(pair),
                        Err(err) => {
                            result = Err(err);
                            break;
                        }
                    }
                }
                Z3_func_interp_dec_ref(c, interp);
                result?
            }
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UnsatCoreMode;
    use crate::formula::{FormulaManager, Ty};
    use crate::solver::Solver;

    fn solver(options: SolverOptions) -> Solver<Z3> {
        Solver::new(Z3::new(&options).unwrap(), options)
    }

    #[test]
    fn linear_arithmetic() {
        let mut fm = FormulaManager::new();
        let mut s = solver(SolverOptions::default());
        let x = fm.symbol("x", Ty::Int).unwrap();
        let r = fm.symbol("r", Ty::Real).unwrap();
        let zero = fm.int(0).unwrap();
        let one = fm.int(1).unwrap();
        let above = fm.gt(x, zero).unwrap();
        let below = fm.lt(x, one).unwrap();
        let f = fm.and(vec![above, below]).unwrap();
        assert!(s.is_unsat(&mut fm, f).unwrap());

        let half = fm.real(1, 2).unwrap();
        let doubled = fm.plus(vec![r, r]).unwrap();
        let f = fm.eq(doubled, one).unwrap();
        s.add_assertion(&mut fm, f).unwrap();
        assert!(s.solve(&mut fm, &[]).unwrap());
        assert_eq!(s.get_value(&mut fm, r).unwrap(), half)
    }

    #[test]
    fn bitvector_division_by_zero() {
        let mut fm = FormulaManager::new();
        let mut s = solver(SolverOptions::default());
        let x = fm.symbol("x", Ty::BitVec(32)).unwrap();
        let zero = fm.bv(0, 32).unwrap();
        let ones = fm.bv(0xFFFF_FFFF, 32).unwrap();
        let udiv = fm.bvudiv(x, zero).unwrap();
        let f = fm.eq(udiv, ones).unwrap();
        assert!(s.is_valid(&mut fm, f).unwrap())
    }

    #[test]
    fn arrays_and_functions_in_models() {
        let mut fm = FormulaManager::new();
        let mut s = solver(SolverOptions::default());
        let a = fm.symbol("a", Ty::array(Ty::Int, Ty::Int)).unwrap();
        let f = fm.symbol("f", Ty::function(vec![Ty::Int], Ty::Int)).unwrap();
        let three = fm.int(3).unwrap();
        let seven = fm.int(7).unwrap();
        let read = fm.select(a, three).unwrap();
        let c1 = fm.eq(read, seven).unwrap();
        let app = fm.apply(f, vec![read]).unwrap();
        let c2 = fm.eq(app, three).unwrap();
        s.add_assertion(&mut fm, c1).unwrap();
        s.add_assertion(&mut fm, c2).unwrap();
        assert!(s.solve(&mut fm, &[]).unwrap());

        let snapshot = s.get_model().unwrap().snapshot(&mut fm).unwrap();
        let value = snapshot.get(a).unwrap();
        let check = fm.select(value, three).unwrap();
        assert_eq!(s.get_value(&mut fm, check).unwrap(), seven);
        assert!(!snapshot.contains(f))
    }

    #[test]
    fn tracked_cores() {
        let mut fm = FormulaManager::new();
        let mut s = solver(SolverOptions::default().with_unsat_cores(UnsatCoreMode::All));
        let x = fm.symbol("x", Ty::Bool).unwrap();
        let y = fm.symbol("y", Ty::Bool).unwrap();
        let not_x = fm.not(x).unwrap();
        s.add_assertion(&mut fm, x).unwrap();
        s.add_assertion(&mut fm, y).unwrap();
        s.add_assertion(&mut fm, not_x).unwrap();
        assert!(!s.solve(&mut fm, &[]).unwrap());
        let core = s.unsat_core(&mut fm).unwrap();
        assert!(core.contains(&x) && core.contains(&not_x))
    }
}
