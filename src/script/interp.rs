//! Tree-walking evaluator for parsed transformation programs.
//!
//! The loaded dataset is bound as both `table` and `df`, and the pandas
//! module as `pd`. Statements run top to bottom; the program's answer is
//! whatever ends up bound to `result`.

use std::{collections::HashMap, rc::Rc};

use anyhow::{Context, Result, anyhow, bail};
use log::debug;

use super::{
    ast::{Expr, Literal, LogicalOp, Program, Statement, StatementKind, Target},
    builtins,
    ops,
    series,
    table_ops,
    value::{Args, Module, ScriptValue, expect_int, expect_str},
};
use crate::{
    data::Value,
    error::ScoutError,
    frame::Dataset,
    transform::string_ops::{StrOp, StrPredicate},
};

/// Name the program must bind its answer to.
pub const RESULT_NAME: &str = "result";

/// What a program run produced. `output` holds every line printed before
/// the run finished or failed.
#[derive(Debug)]
pub struct Outcome {
    pub result: crate::error::Result<ScriptValue>,
    /// Lines written by `print`.
    pub output: Vec<String>,
}

pub struct Interpreter {
    env: HashMap<String, ScriptValue>,
    output: Vec<String>,
}

impl Interpreter {
    pub fn new(dataset: Dataset) -> Self {
        let table = Rc::new(dataset);
        let mut env = HashMap::new();
        env.insert("table".to_string(), ScriptValue::Table(Rc::clone(&table)));
        env.insert("df".to_string(), ScriptValue::Table(table));
        env.insert("pd".to_string(), ScriptValue::Module(Module::Pandas));
        Self {
            env,
            output: Vec::new(),
        }
    }

    /// Runs every statement and returns the value bound to `result`, along
    /// with the printed output even when a statement fails.
    pub fn run(mut self, program: &Program) -> Outcome {
        let result = self.run_statements(program);
        Outcome {
            result,
            output: self.output,
        }
    }

    fn run_statements(&mut self, program: &Program) -> crate::error::Result<ScriptValue> {
        for statement in &program.statements {
            debug!("Executing line {}: {}", statement.line, statement.text);
            self.execute(statement)
                .map_err(|err| runtime_error(&err, Some(statement)))?;
        }
        self.env.remove(RESULT_NAME).ok_or_else(|| ScoutError::RuntimeExecution {
            message: format!(
                "the code never assigned '{RESULT_NAME}'; end it with a line such as `{RESULT_NAME} = table.head()`"
            ),
            line: None,
            statement: None,
            trace: Vec::new(),
        })
    }

    fn execute(&mut self, statement: &Statement) -> Result<()> {
        match &statement.kind {
            StatementKind::Import { module, alias } => {
                if module != "pandas" {
                    bail!("import of '{module}' is not allowed; only pandas is available");
                }
                let name = alias.clone().unwrap_or_else(|| module.clone());
                self.env.insert(name, ScriptValue::Module(Module::Pandas));
                Ok(())
            }
            StatementKind::Expr(expr) => self.eval(expr).map(|_| ()),
            StatementKind::Assign { target, value } => {
                let value = self.eval(value)?;
                match target {
                    Target::Name(name) => {
                        self.env.insert(name.clone(), value);
                        Ok(())
                    }
                    Target::Item { object, key } => self.assign_item(object, key, value),
                }
            }
        }
    }

    fn assign_item(&mut self, object: &Expr, key: &Expr, value: ScriptValue) -> Result<()> {
        let Expr::Name(name) = object else {
            bail!("item assignment needs a named table on the left, as in `table['col'] = ...`");
        };
        let key = self.eval(key)?;
        let slot = self
            .env
            .get_mut(name)
            .ok_or_else(|| anyhow!("name '{name}' is not defined"))?;
        match slot {
            ScriptValue::Table(table) => {
                let column = expect_str(&key, "column name")?;
                let updated = table_ops::assign_column(&**table, &column, &value)
                    .with_context(|| format!("{name}['{column}'] = ..."))?;
                *table = Rc::new(updated);
            }
            ScriptValue::Mapping(entries) => {
                let key = mapping_key(&key)?;
                match entries.iter_mut().find(|(existing, _)| *existing == key) {
                    Some((_, slot)) => *slot = value,
                    None => entries.push((key, value)),
                }
            }
            other => bail!("a {} does not support item assignment", other.kind()),
        }
        Ok(())
    }

    fn eval(&mut self, expr: &Expr) -> Result<ScriptValue> {
        match expr {
            Expr::Literal(literal) => Ok(match literal {
                Literal::Int(i) => ScriptValue::int(*i),
                Literal::Float(f) => ScriptValue::Scalar(Some(Value::Float(*f))),
                Literal::Str(s) => ScriptValue::string(s.clone()),
                Literal::Bool(b) => ScriptValue::bool(*b),
                Literal::None => ScriptValue::none(),
            }),
            Expr::Name(name) => self.lookup(name),
            Expr::List(items) => Ok(ScriptValue::List(
                items.iter().map(|item| self.eval(item)).collect::<Result<_>>()?,
            )),
            Expr::Dict(entries) => {
                let mut mapping: Vec<(String, ScriptValue)> = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    let key = mapping_key(&self.eval(key)?)?;
                    let value = self.eval(value)?;
                    match mapping.iter_mut().find(|(existing, _)| *existing == key) {
                        Some((_, slot)) => *slot = value,
                        None => mapping.push((key, value)),
                    }
                }
                Ok(ScriptValue::Mapping(mapping))
            }
            Expr::Unary { op, operand } => ops::unary(*op, &self.eval(operand)?),
            Expr::Binary { op, left, right } => {
                let (left, right) = (self.eval(left)?, self.eval(right)?);
                ops::binary(*op, &left, &right)
            }
            Expr::Compare { op, left, right } => {
                let (left, right) = (self.eval(left)?, self.eval(right)?);
                ops::comparison(*op, &left, &right)
            }
            Expr::Logical { op, left, right } => {
                let left = self.eval(left)?;
                let truthy = left.truthy().with_context(|| {
                    format!(
                        "'{}' needs single values; use {} between masks",
                        if *op == LogicalOp::And { "and" } else { "or" },
                        if *op == LogicalOp::And { "&" } else { "|" }
                    )
                })?;
                match (op, truthy) {
                    (LogicalOp::And, false) | (LogicalOp::Or, true) => Ok(left),
                    _ => self.eval(right),
                }
            }
            Expr::Index { object, key } => {
                let (object, key) = (self.eval(object)?, self.eval(key)?);
                index(&object, &key)
            }
            Expr::Attribute { object, name } => {
                let object = self.eval(object)?;
                attribute(&object, name).with_context(|| format!("{}.{name}", object.kind()))
            }
            Expr::Call { func, args, kwargs } => {
                let positional = args.iter().map(|arg| self.eval(arg)).collect::<Result<Vec<_>>>()?;
                let keywords = kwargs
                    .iter()
                    .map(|(name, arg)| Ok((name.clone(), self.eval(arg)?)))
                    .collect::<Result<Vec<_>>>()?;
                let args = Args::new(positional, keywords);
                match func.as_ref() {
                    Expr::Name(name) if !self.env.contains_key(name) && builtins::is_builtin(name) => {
                        builtins::call(name, &args, &mut self.output)
                            .with_context(|| format!("{name}()"))
                    }
                    Expr::Attribute { object, name } => {
                        let object = self.eval(object)?;
                        call_method(&object, name, &args)
                            .with_context(|| format!("{}.{name}()", object.kind()))
                    }
                    other => {
                        let callee = self.eval(other)?;
                        bail!("a {} is not callable", callee.kind())
                    }
                }
            }
        }
    }

    fn lookup(&self, name: &str) -> Result<ScriptValue> {
        if let Some(value) = self.env.get(name) {
            return Ok(value.clone());
        }
        if builtins::is_builtin(name) {
            bail!("builtin '{name}' can only be called, as in {name}(...)");
        }
        let mut known = self.env.keys().map(String::as_str).collect::<Vec<_>>();
        known.sort_unstable();
        bail!("name '{name}' is not defined; defined names: {}", known.join(", "))
    }
}

fn mapping_key(key: &ScriptValue) -> Result<String> {
    match key {
        ScriptValue::Scalar(Some(value)) => Ok(value.as_display()),
        other => bail!("mapping keys must be single values, not a {}", other.kind()),
    }
}

fn index(object: &ScriptValue, key: &ScriptValue) -> Result<ScriptValue> {
    match object {
        ScriptValue::Table(table) => table_ops::index(table, key),
        ScriptValue::Series(series) => series::index(series, key),
        ScriptValue::GroupBy(groupby) => Ok(ScriptValue::GroupBy(groupby.select(key)?)),
        ScriptValue::List(items) => {
            let position = expect_int(key, "list index")?;
            let resolved = if position < 0 {
                items.len() as i64 + position
            } else {
                position
            };
            usize::try_from(resolved)
                .ok()
                .and_then(|idx| items.get(idx))
                .cloned()
                .ok_or_else(|| anyhow!("list index {position} out of range for {} items", items.len()))
        }
        ScriptValue::Mapping(entries) => {
            let key = mapping_key(key)?;
            entries
                .iter()
                .find(|(existing, _)| *existing == key)
                .map(|(_, value)| value.clone())
                .ok_or_else(|| anyhow!("key '{key}' not found"))
        }
        other => bail!("a {} cannot be indexed", other.kind()),
    }
}

fn attribute(object: &ScriptValue, name: &str) -> Result<ScriptValue> {
    match object {
        ScriptValue::Table(table) => table_ops::attribute(table, name),
        ScriptValue::Series(series) => series::attribute(series, name),
        ScriptValue::GroupBy(groupby) => groupby.attribute(name),
        ScriptValue::Module(Module::Pandas) if name == "NA" || name == "NaT" => Ok(ScriptValue::none()),
        other => bail!("a {} has no attribute '{name}'", other.kind()),
    }
}

fn call_method(object: &ScriptValue, method: &str, args: &Args) -> Result<ScriptValue> {
    match object {
        ScriptValue::Table(table) => table_ops::call(table, method, args),
        ScriptValue::Series(series) => series::call(series, method, args),
        ScriptValue::StrAccessor(series) => series::str_call(series, method, args),
        ScriptValue::GroupBy(groupby) => groupby.call(method, args),
        ScriptValue::Module(Module::Pandas) => builtins::pandas_call(method, args),
        ScriptValue::Mapping(entries) => mapping_method(entries, method, args),
        ScriptValue::Scalar(Some(Value::String(text))) => string_method(text, method, args),
        other => bail!("a {} has no method '{method}'", other.kind()),
    }
}

fn mapping_method(entries: &[(String, ScriptValue)], method: &str, args: &Args) -> Result<ScriptValue> {
    match method {
        "keys" => {
            args.check(method, 0, &[])?;
            Ok(ScriptValue::List(entries.iter().map(|(key, _)| ScriptValue::string(key.clone())).collect()))
        }
        "values" => {
            args.check(method, 0, &[])?;
            Ok(ScriptValue::List(entries.iter().map(|(_, value)| value.clone()).collect()))
        }
        "get" => {
            args.check(method, 2, &[])?;
            let key = mapping_key(args.required(0, "key", method)?)?;
            Ok(entries
                .iter()
                .find(|(existing, _)| *existing == key)
                .map(|(_, value)| value.clone())
                .or_else(|| args.get(1, "default").cloned())
                .unwrap_or_else(ScriptValue::none))
        }
        other => bail!("a mapping has no method '{other}'"),
    }
}

fn string_method(text: &str, method: &str, args: &Args) -> Result<ScriptValue> {
    let transformed = |op: StrOp| Ok(ScriptValue::string(op.apply(text).into_owned()));
    match method {
        "lower" | "upper" | "strip" => {
            args.check(method, 0, &[])?;
            transformed(match method {
                "lower" => StrOp::Lower,
                "upper" => StrOp::Upper,
                _ => StrOp::Strip,
            })
        }
        "replace" => {
            args.check(method, 2, &[])?;
            let from = expect_str(args.required(0, "old", method)?, "old")?;
            let to = expect_str(args.required(1, "new", method)?, "new")?;
            transformed(StrOp::Replace { from, to })
        }
        "startswith" | "endswith" => {
            args.check(method, 1, &[])?;
            let affix = expect_str(args.required(0, "prefix", method)?, "prefix")?;
            let predicate = if method == "startswith" {
                StrPredicate::StartsWith(affix)
            } else {
                StrPredicate::EndsWith(affix)
            };
            Ok(ScriptValue::bool(predicate.test(text)))
        }
        other => bail!("a string has no method '{other}'"),
    }
}

/// Runtime failure with the innermost cause as the message and the call chain as trace.
fn runtime_error(err: &anyhow::Error, statement: Option<&Statement>) -> ScoutError {
    let mut trace = err.chain().map(ToString::to_string).collect::<Vec<_>>();
    let message = trace.pop().unwrap_or_else(|| err.to_string());
    ScoutError::RuntimeExecution {
        message,
        line: statement.map(|s| s.line),
        statement: statement.map(|s| s.text.clone()),
        trace,
    }
}
