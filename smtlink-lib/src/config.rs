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


//! This module defines the options a solver is constructed with,
//! and loads them from a TOML file when required.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::prelude::*;
use std::path::Path;

use crate::error::Error;

/// The parameter controlling bit-vector division by zero. It is
/// always passed to a backend last, with the value below, so that
/// `bvudiv x 0` is all ones and `bvurem x 0` is `x`.
pub const DIV_BY_ZERO_MODE: &str = "theory.bv.div_by_zero_mode";
pub const DIV_BY_ZERO_MODE_VALUE: &str = "0";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnsatCoreMode {
    Off,
    /// The backend reports the asserted formulas of a core directly.
    All,
    /// Assertions are tracked by guard symbols so cores can be
    /// reported by name.
    Named,
}

impl Default for UnsatCoreMode {
    fn default() -> Self {
        UnsatCoreMode::Off
    }
}

impl fmt::Display for UnsatCoreMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            UnsatCoreMode::Off => write!(f, "off"),
            UnsatCoreMode::All => write!(f, "all"),
            UnsatCoreMode::Named => write!(f, "named"),
        }
    }
}

fn default_generate_models() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SolverOptions {
    #[serde(default = "default_generate_models")]
    pub generate_models: bool,
    #[serde(default)]
    pub unsat_cores_mode: UnsatCoreMode,
    #[serde(default)]
    pub random_seed: Option<u64>,
    /// Backend specific options, passed through verbatim.
    #[serde(default)]
    pub solver_options: BTreeMap<String, String>,
}

impl Default for SolverOptions {
    fn default() -> Self {
        SolverOptions {
            generate_models: true,
            unsat_cores_mode: UnsatCoreMode::Off,
            random_seed: None,
            solver_options: BTreeMap::new(),
        }
    }
}

impl SolverOptions {
    pub fn with_unsat_cores(mut self, mode: UnsatCoreMode) -> Self {
        self.unsat_cores_mode = mode;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.random_seed = Some(seed);
        self
    }

    pub fn with_option<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.solver_options.insert(key.into(), value.into());
        self
    }

    pub fn from_toml(contents: &str) -> Result<Self, Error> {
        Ok(toml::from_str(contents)?)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let mut contents = String::new();
        File::open(path.as_ref())
            .and_then(|mut f| f.read_to_string(&mut contents))
            .map_err(|e| Error::Config(format!("{}: {}", path.as_ref().display(), e)))?;
        SolverOptions::from_toml(&contents)
    }

    /// The complete, ordered list of parameters a backend should be
    /// configured with.
    pub fn backend_params(&self) -> Vec<(String, String)> {
        let mut params = vec![
            ("model_generation".to_string(), self.generate_models.to_string()),
            ("unsat_core_generation".to_string(), (self.unsat_cores_mode != UnsatCoreMode::Off).to_string()),
        ];
        if let Some(seed) = self.random_seed {
            params.push(("random_seed".to_string(), seed.to_string()))
        }
        for (key, value) in &self.solver_options {
            if key != DIV_BY_ZERO_MODE {
                params.push((key.clone(), value.clone()))
            }
        }
        params.push((DIV_BY_ZERO_MODE.to_string(), DIV_BY_ZERO_MODE_VALUE.to_string()));
        params
    }
}

pub fn parse_bool_option(key: &str, value: &str) -> Result<bool, Error> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(Error::Option { key: key.to_string(), value: value.to_string(), reason: "expected a boolean".to_string() }),
    }
}

pub fn parse_u64_option(key: &str, value: &str) -> Result<u64, Error> {
    value.parse::<u64>().map_err(|e| Error::Option { key: key.to_string(), value: value.to_string(), reason: e.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_options() {
        let opts = SolverOptions::from_toml(
            r#"
            unsat_cores_mode = "named"
            random_seed = 7

            [solver_options]
            bound = "3"
            "#,
        )
        .unwrap();
        assert!(opts.generate_models);
        assert_eq!(opts.unsat_cores_mode, UnsatCoreMode::Named);
        assert_eq!(opts.random_seed, Some(7));
        assert_eq!(opts.solver_options.get("bound").map(String::as_str), Some("3"));
    }

    #[test]
    fn unknown_field_is_a_config_error() {
        match SolverOptions::from_toml("unsat_cores = \"all\"") {
            Err(Error::Config(_)) => (),
            other => panic!("expected a config error, got {:?}", other),
        }
    }

    #[test]
    fn div_by_zero_mode_is_forced_last() {
        let opts = SolverOptions::default().with_option(DIV_BY_ZERO_MODE, "1").with_option("bound", "2");
        let params = opts.backend_params();
        let last = params.last().unwrap();
        assert_eq!(last, &(DIV_BY_ZERO_MODE.to_string(), "0".to_string()));
        assert_eq!(params.iter().filter(|(k, _)| k == DIV_BY_ZERO_MODE).count(), 1);
        assert_eq!(params[0], ("model_generation".to_string(), "true".to_string()));
        assert_eq!(params[1], ("unsat_core_generation".to_string(), "false".to_string()));
        assert!(params.contains(&("bound".to_string(), "2".to_string())))
    }
}
