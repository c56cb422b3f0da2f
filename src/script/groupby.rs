//! Split-apply-combine over a table's key columns.
//!
//! Groups come out in ascending key order and rows whose key holds a null
//! are left out, matching `pandas.DataFrame.groupby` defaults. A single key
//! reduced over a single selected column yields a series labelled by the
//! key; everything else yields a table with the key columns first.

use std::rc::Rc;

use anyhow::{Result, bail};

use super::{
    series::labelled,
    value::{Args, ScriptValue, expect_bool, expect_names, expect_str},
};
use crate::{
    data::Value,
    frame::{Column, ColumnData, Dataset},
    stats::{Aggregation, aggregate_column},
};

#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    All,
    Single(String),
    Many(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct GroupBy {
    pub table: Rc<Dataset>,
    pub keys: Vec<String>,
    pub selection: Selection,
    pub as_index: bool,
}

type Groups = Vec<(Vec<Option<Value>>, Vec<usize>)>;

impl GroupBy {
    pub fn new(table: Rc<Dataset>, keys: Vec<String>, as_index: bool) -> Result<Self> {
        if keys.is_empty() {
            bail!("groupby needs at least one key column");
        }
        for key in &keys {
            table.column(key)?;
        }
        Ok(Self {
            table,
            keys,
            selection: Selection::All,
            as_index,
        })
    }

    /// `grouped['col']` or `grouped[['a', 'b']]`.
    pub fn select(&self, key: &ScriptValue) -> Result<GroupBy> {
        let selection = match key {
            ScriptValue::Scalar(_) => Selection::Single(expect_str(key, "column")?),
            other => Selection::Many(expect_names(other, "columns")?),
        };
        let names = match &selection {
            Selection::Single(name) => std::slice::from_ref(name),
            Selection::Many(names) => names.as_slice(),
            Selection::All => &[],
        };
        for name in names {
            self.table.column(name)?;
            if self.keys.contains(name) {
                bail!("column '{name}' is a grouping key and cannot be selected");
            }
        }
        Ok(GroupBy {
            selection,
            ..self.clone()
        })
    }

    pub fn attribute(&self, name: &str) -> Result<ScriptValue> {
        if self.table.column_index(name).is_some() {
            return Ok(ScriptValue::GroupBy(self.select(&ScriptValue::string(name))?));
        }
        bail!("groupby object has no attribute '{name}'")
    }

    pub fn call(&self, method: &str, args: &Args) -> Result<ScriptValue> {
        match method {
            "size" => {
                args.check(method, 0, &[])?;
                let groups = self.groups()?;
                let sizes = groups
                    .iter()
                    .map(|(_, rows)| Some(Value::Integer(rows.len() as i64)))
                    .collect();
                self.assemble(&groups, vec![("size".to_string(), sizes)], true)
            }
            "agg" | "aggregate" => {
                args.check(method, 1, &["func"])?;
                self.agg(args.required(0, "func", method)?)
            }
            other => {
                let aggregation: Aggregation = other.parse()?;
                args.check(method, 0, &["numeric_only"])?;
                let numeric_only = args
                    .get(usize::MAX, "numeric_only")
                    .map(|v| expect_bool(v, "numeric_only"))
                    .transpose()?;
                self.reduce(aggregation, numeric_only)
            }
        }
    }

    fn groups(&self) -> Result<Groups> {
        Ok(self
            .table
            .group_indices(&self.keys)?
            .into_iter()
            .map(|(key, rows)| (key.into_iter().map(|k| k.0).collect(), rows))
            .collect())
    }

    /// Columns a whole-table reduction covers; numeric reductions skip text columns.
    fn value_columns(&self, aggregation: Aggregation, numeric_only: Option<bool>) -> Vec<String> {
        match &self.selection {
            Selection::Single(name) => vec![name.clone()],
            Selection::Many(names) => names.clone(),
            Selection::All => {
                let numeric = numeric_only.unwrap_or(matches!(
                    aggregation,
                    Aggregation::Sum | Aggregation::Mean | Aggregation::Median | Aggregation::Std
                ));
                self.table
                    .columns()
                    .iter()
                    .filter(|c| !self.keys.contains(&c.name))
                    .filter(|c| !numeric || c.data.column_type().is_numeric())
                    .map(|c| c.name.clone())
                    .collect()
            }
        }
    }

    fn reduce_column(
        &self,
        groups: &Groups,
        column: &str,
        aggregation: Aggregation,
    ) -> Result<Vec<Option<Value>>> {
        let data = &self.table.column(column)?.data;
        groups
            .iter()
            .map(|(_, rows)| Ok(aggregate_column(aggregation, &data.take(rows)?)?))
            .collect()
    }

    fn reduce(&self, aggregation: Aggregation, numeric_only: Option<bool>) -> Result<ScriptValue> {
        let groups = self.groups()?;
        let columns = self
            .value_columns(aggregation, numeric_only)
            .into_iter()
            .map(|name| {
                let values = self.reduce_column(&groups, &name, aggregation)?;
                Ok((name, values))
            })
            .collect::<Result<Vec<_>>>()?;
        let single = matches!(self.selection, Selection::Single(_));
        self.assemble(&groups, columns, single)
    }

    fn agg(&self, spec: &ScriptValue) -> Result<ScriptValue> {
        let groups = self.groups()?;
        match spec {
            ScriptValue::Scalar(_) => {
                let aggregation: Aggregation = expect_str(spec, "func")?.parse()?;
                self.reduce(aggregation, None)
            }
            ScriptValue::List(_) => {
                let aggregations = parse_aggregations(spec)?;
                let mut columns = Vec::new();
                let selected = self.value_columns(Aggregation::Count, None);
                for name in &selected {
                    for aggregation in &aggregations {
                        let label = if selected.len() == 1 {
                            aggregation.to_string()
                        } else {
                            format!("{name}_{aggregation}")
                        };
                        columns.push((label, self.reduce_column(&groups, name, *aggregation)?));
                    }
                }
                self.assemble(&groups, columns, false)
            }
            ScriptValue::Mapping(entries) => {
                let mut columns = Vec::new();
                for (name, funcs) in entries {
                    if self.keys.contains(name) {
                        bail!("column '{name}' is a grouping key and cannot be aggregated");
                    }
                    let aggregations = parse_aggregations(funcs)?;
                    for aggregation in &aggregations {
                        let label = if matches!(funcs, ScriptValue::List(_)) {
                            format!("{name}_{aggregation}")
                        } else {
                            name.clone()
                        };
                        columns.push((label, self.reduce_column(&groups, name, *aggregation)?));
                    }
                }
                self.assemble(&groups, columns, false)
            }
            other => bail!("agg() expects a name, a list of names or a dict, got a {}", other.kind()),
        }
    }

    fn assemble(
        &self,
        groups: &Groups,
        columns: Vec<(String, Vec<Option<Value>>)>,
        single: bool,
    ) -> Result<ScriptValue> {
        if single && self.as_index && self.keys.len() == 1 && columns.len() == 1 {
            let labels = groups.iter().map(|(key, _)| key[0].clone()).collect();
            let Some((name, values)) = columns.into_iter().next() else {
                bail!("no aggregated column");
            };
            let name = (name != "size").then_some(name);
            return Ok(ScriptValue::Series(labelled(
                name,
                Some(self.keys[0].clone()),
                labels,
                values,
            )?));
        }
        let mut out = Vec::with_capacity(self.keys.len() + columns.len());
        for (position, key) in self.keys.iter().enumerate() {
            let values = groups
                .iter()
                .map(|(k, _)| k[position].clone())
                .collect::<Vec<_>>();
            let ty = self.table.column(key)?.data.column_type();
            let data = ColumnData::from_values(ty, values.clone())
                .unwrap_or_else(|_| ColumnData::from_values_inferred(values));
            out.push(Column::new(key.clone(), data));
        }
        for (name, values) in columns {
            out.push(Column::new(name, ColumnData::from_values_inferred(values)));
        }
        Ok(ScriptValue::table(Dataset::new(out)?))
    }
}

fn parse_aggregations(spec: &ScriptValue) -> Result<Vec<Aggregation>> {
    expect_names(spec, "aggregation")?
        .iter()
        .map(|name| Ok(name.parse::<Aggregation>()?))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sales() -> Rc<Dataset> {
        Rc::new(
            Dataset::new(vec![
                Column::new(
                    "region",
                    ColumnData::text(
                        ["West", "East", "West", "East", "North"]
                            .iter()
                            .map(|s| Some(s.to_string()))
                            .collect(),
                    ),
                ),
                Column::new(
                    "channel",
                    ColumnData::text(
                        ["web", "store", "store", "web", "web"]
                            .iter()
                            .map(|s| Some(s.to_string()))
                            .collect(),
                    ),
                ),
                Column::new(
                    "amount",
                    ColumnData::int64(vec![Some(10), Some(20), Some(5), None, Some(7)]),
                ),
            ])
            .expect("dataset"),
        )
    }

    #[test]
    fn single_key_single_column_yields_keyed_series() {
        let grouped = GroupBy::new(sales(), vec!["region".into()], true)
            .and_then(|g| g.select(&ScriptValue::string("amount")))
            .expect("groupby");
        let ScriptValue::Series(totals) = grouped.call("sum", &Args::default()).expect("sum") else {
            panic!("expected series");
        };
        assert_eq!(
            totals.index.labels(),
            vec![
                Some(Value::String("East".into())),
                Some(Value::String("North".into())),
                Some(Value::String("West".into())),
            ]
        );
        assert_eq!(totals.data, ColumnData::int64(vec![Some(20), Some(7), Some(15)]));
    }

    #[test]
    fn whole_table_mean_skips_text_columns() {
        let grouped = GroupBy::new(sales(), vec!["region".into()], true).expect("groupby");
        let ScriptValue::Table(means) = grouped.call("mean", &Args::default()).expect("mean") else {
            panic!("expected table");
        };
        assert_eq!(means.column_names(), vec!["region", "amount"]);
    }

    #[test]
    fn agg_with_mapping_and_size() {
        let grouped = GroupBy::new(sales(), vec!["region".into(), "channel".into()], true)
            .expect("groupby");
        let spec = ScriptValue::Mapping(vec![(
            "amount".into(),
            ScriptValue::List(vec![ScriptValue::string("sum"), ScriptValue::string("count")]),
        )]);
        let ScriptValue::Table(summary) = grouped.agg(&spec).expect("agg") else {
            panic!("expected table");
        };
        assert_eq!(
            summary.column_names(),
            vec!["region", "channel", "amount_sum", "amount_count"]
        );
        assert_eq!(summary.row_count(), 5);
        assert!(grouped.call("median_abs", &Args::default()).is_err());
        assert!(GroupBy::new(sales(), vec!["missing".into()], true).is_err());
    }
}
