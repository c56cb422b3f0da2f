use std::rc::Rc;

use anyhow::{Result, anyhow, bail};

use super::groupby::GroupBy;
use crate::{
    data::{Value, format_float},
    frame::{Dataset, Series},
    table::render_table,
};

/// Rows shown when a table or series is printed.
const PRINT_ROWS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Module {
    Pandas,
}

/// Every value a transformation program can hold.
#[derive(Debug, Clone)]
pub enum ScriptValue {
    Table(Rc<Dataset>),
    Series(Series),
    GroupBy(GroupBy),
    StrAccessor(Series),
    Mapping(Vec<(String, ScriptValue)>),
    List(Vec<ScriptValue>),
    Scalar(Option<Value>),
    Module(Module),
}

impl ScriptValue {
    pub fn table(dataset: Dataset) -> Self {
        ScriptValue::Table(Rc::new(dataset))
    }

    pub fn none() -> Self {
        ScriptValue::Scalar(None)
    }

    pub fn int(value: i64) -> Self {
        ScriptValue::Scalar(Some(Value::Integer(value)))
    }

    pub fn bool(value: bool) -> Self {
        ScriptValue::Scalar(Some(Value::Boolean(value)))
    }

    pub fn string(value: impl Into<String>) -> Self {
        ScriptValue::Scalar(Some(Value::String(value.into())))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ScriptValue::Table(_) => "table",
            ScriptValue::Series(_) => "series",
            ScriptValue::GroupBy(_) => "groupby",
            ScriptValue::StrAccessor(_) => "str accessor",
            ScriptValue::Mapping(_) => "mapping",
            ScriptValue::List(_) => "list",
            ScriptValue::Scalar(_) => "scalar",
            ScriptValue::Module(_) => "module",
        }
    }

    /// Python-style truthiness; whole tables and series are ambiguous.
    pub fn truthy(&self) -> Result<bool> {
        match self {
            ScriptValue::Scalar(None) => Ok(false),
            ScriptValue::Scalar(Some(value)) => Ok(match value {
                Value::Boolean(b) => *b,
                Value::Integer(i) => *i != 0,
                Value::Float(f) => *f != 0.0,
                Value::String(s) => !s.is_empty(),
                Value::Date(_) | Value::DateTime(_) => true,
            }),
            ScriptValue::List(items) => Ok(!items.is_empty()),
            ScriptValue::Mapping(entries) => Ok(!entries.is_empty()),
            ScriptValue::Module(_) => Ok(true),
            other => bail!(
                "the truth value of a {} is ambiguous; use & | ~ for element-wise logic or .any()/.all()",
                other.kind()
            ),
        }
    }

    /// Text written by `print` and `str`.
    pub fn display(&self) -> String {
        match self {
            ScriptValue::Scalar(value) => scalar_display(value),
            ScriptValue::List(items) => format!(
                "[{}]",
                items.iter().map(ScriptValue::repr).collect::<Vec<_>>().join(", ")
            ),
            ScriptValue::Mapping(entries) => format!(
                "{{{}}}",
                entries
                    .iter()
                    .map(|(key, value)| format!("'{key}': {}", value.repr()))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            ScriptValue::Table(dataset) => table_display(dataset),
            ScriptValue::Series(series) | ScriptValue::StrAccessor(series) => series_display(series),
            ScriptValue::GroupBy(groupby) => {
                format!("<groupby by {}>", groupby.keys.join(", "))
            }
            ScriptValue::Module(Module::Pandas) => "<module 'pandas'>".to_string(),
        }
    }

    fn repr(&self) -> String {
        match self {
            ScriptValue::Scalar(Some(Value::String(s))) => format!("'{s}'"),
            other => other.display(),
        }
    }
}

pub fn scalar_display(value: &Option<Value>) -> String {
    match value {
        None => "None".to_string(),
        Some(Value::Boolean(true)) => "True".to_string(),
        Some(Value::Boolean(false)) => "False".to_string(),
        Some(Value::Float(f)) => format_float(*f),
        Some(other) => other.as_display(),
    }
}

fn table_display(dataset: &Dataset) -> String {
    let mut headers = vec![String::new()];
    headers.extend(dataset.column_names());
    let shown = dataset.row_count().min(PRINT_ROWS);
    let rows = (0..shown)
        .map(|row| {
            let mut cells = vec![row.to_string()];
            cells.extend(
                dataset
                    .columns()
                    .iter()
                    .map(|c| scalar_display(&c.data.get(row))),
            );
            cells
        })
        .collect::<Vec<_>>();
    let mut rendered = render_table(&headers, &rows);
    if shown < dataset.row_count() {
        rendered.push_str("...\n");
    }
    rendered.push_str(&format!(
        "[{} rows x {} columns]",
        dataset.row_count(),
        dataset.column_count()
    ));
    rendered
}

fn series_display(series: &Series) -> String {
    let shown = series.len().min(PRINT_ROWS);
    let headers = vec![
        series.index.name().unwrap_or_default().to_string(),
        series.name.clone().unwrap_or_default(),
    ];
    let rows = (0..shown)
        .map(|idx| {
            vec![
                scalar_display(&series.index.label(idx)),
                scalar_display(&series.data.get(idx)),
            ]
        })
        .collect::<Vec<_>>();
    let mut rendered = render_table(&headers, &rows);
    if shown < series.len() {
        rendered.push_str("...\n");
    }
    rendered.push_str(&format!(
        "Name: {}, Length: {}, dtype: {}",
        series.name.as_deref().unwrap_or("None"),
        series.len(),
        series.data.dtype()
    ));
    rendered
}

/// Call arguments after evaluation.
#[derive(Debug, Clone, Default)]
pub struct Args {
    positional: Vec<ScriptValue>,
    keywords: Vec<(String, ScriptValue)>,
}

impl Args {
    pub fn new(positional: Vec<ScriptValue>, keywords: Vec<(String, ScriptValue)>) -> Self {
        Self {
            positional,
            keywords,
        }
    }

    pub fn positional(&self) -> &[ScriptValue] {
        &self.positional
    }

    pub fn keywords(&self) -> &[(String, ScriptValue)] {
        &self.keywords
    }

    /// Rejects surplus positional arguments and unknown keywords.
    pub fn check(&self, method: &str, max_positional: usize, keywords: &[&str]) -> Result<()> {
        if self.positional.len() > max_positional {
            bail!(
                "{method}() takes at most {max_positional} positional argument(s) but {} were given",
                self.positional.len()
            );
        }
        if let Some((name, _)) = self
            .keywords
            .iter()
            .find(|(name, _)| !keywords.contains(&name.as_str()))
        {
            bail!("{method}() got an unexpected keyword argument '{name}'");
        }
        Ok(())
    }

    /// Argument by position, falling back to its keyword name.
    pub fn get(&self, position: usize, name: &str) -> Option<&ScriptValue> {
        self.positional.get(position).or_else(|| {
            self.keywords
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value)
        })
    }

    pub fn required(&self, position: usize, name: &str, method: &str) -> Result<&ScriptValue> {
        self.get(position, name)
            .ok_or_else(|| anyhow!("{method}() missing required argument '{name}'"))
    }
}

pub fn expect_scalar(value: &ScriptValue, what: &str) -> Result<Option<Value>> {
    match value {
        ScriptValue::Scalar(v) => Ok(v.clone()),
        other => bail!("{what} must be a single value, not a {}", other.kind()),
    }
}

pub fn expect_str(value: &ScriptValue, what: &str) -> Result<String> {
    match value {
        ScriptValue::Scalar(Some(Value::String(s))) => Ok(s.clone()),
        other => bail!("{what} must be a string, got {}", describe(other)),
    }
}

pub fn expect_int(value: &ScriptValue, what: &str) -> Result<i64> {
    match value {
        ScriptValue::Scalar(Some(Value::Integer(i))) => Ok(*i),
        ScriptValue::Scalar(Some(Value::Float(f))) if f.fract() == 0.0 && f.is_finite() => Ok(*f as i64),
        other => bail!("{what} must be an integer, got {}", describe(other)),
    }
}

pub fn expect_usize(value: &ScriptValue, what: &str) -> Result<usize> {
    let raw = expect_int(value, what)?;
    usize::try_from(raw).map_err(|_| anyhow!("{what} must not be negative, got {raw}"))
}

pub fn expect_bool(value: &ScriptValue, what: &str) -> Result<bool> {
    match value {
        ScriptValue::Scalar(Some(Value::Boolean(b))) => Ok(*b),
        other => bail!("{what} must be True or False, got {}", describe(other)),
    }
}

/// A column name or a list of column names.
pub fn expect_names(value: &ScriptValue, what: &str) -> Result<Vec<String>> {
    match value {
        ScriptValue::Scalar(Some(Value::String(s))) => Ok(vec![s.clone()]),
        ScriptValue::List(items) => items.iter().map(|item| expect_str(item, what)).collect(),
        ScriptValue::Series(series) => series
            .values()
            .into_iter()
            .map(|v| match v {
                Some(Value::String(s)) => Ok(s),
                other => Err(anyhow!("{what} must contain strings, got {}", scalar_display(&other))),
            })
            .collect(),
        other => bail!("{what} must be a column name or a list of names, got {}", describe(other)),
    }
}

/// Plain values from a list or series.
pub fn expect_values(value: &ScriptValue, what: &str) -> Result<Vec<Option<Value>>> {
    match value {
        ScriptValue::List(items) => items.iter().map(|item| expect_scalar(item, what)).collect(),
        ScriptValue::Series(series) => Ok(series.values()),
        other => bail!("{what} must be a list, got {}", describe(other)),
    }
}

pub fn describe(value: &ScriptValue) -> String {
    match value {
        ScriptValue::Scalar(None) => "None".to_string(),
        ScriptValue::Scalar(Some(v)) => format!("{} {}", v.type_tag(), scalar_display(&Some(v.clone()))),
        other => format!("a {}", other.kind()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness_follows_python_for_scalars() {
        assert!(!ScriptValue::none().truthy().expect("none"));
        assert!(!ScriptValue::string("").truthy().expect("empty"));
        assert!(ScriptValue::int(3).truthy().expect("int"));
        let table = ScriptValue::table(Dataset::default());
        assert!(table.truthy().is_err());
    }

    #[test]
    fn args_resolve_positionally_then_by_keyword() {
        let args = Args::new(
            vec![ScriptValue::int(5)],
            vec![("ascending".into(), ScriptValue::bool(false))],
        );
        assert!(args.check("head", 1, &["ascending"]).is_ok());
        assert!(args.check("head", 0, &["ascending"]).is_err());
        assert!(args.check("head", 1, &[]).is_err());
        assert_eq!(expect_usize(args.get(0, "n").expect("n"), "n").expect("usize"), 5);
        assert!(!expect_bool(args.get(1, "ascending").expect("kw"), "ascending").expect("bool"));
        assert!(args.required(2, "by", "sort_values").is_err());
    }

    #[test]
    fn display_uses_python_spelling() {
        let list = ScriptValue::List(vec![
            ScriptValue::string("a"),
            ScriptValue::bool(true),
            ScriptValue::none(),
            ScriptValue::Scalar(Some(Value::Float(2.0))),
        ]);
        assert_eq!(list.display(), "['a', True, None, 2.0]");
    }
}
