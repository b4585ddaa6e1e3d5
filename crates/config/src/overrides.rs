//! Generic `key.path=value` overrides applied to the config toml before it's
//! deserialized.

use toml::{value::Table, Value};

use crate::ConfigError;

/// Parses an override like `tracker.invalid_retention_secs=60` into its key
/// path and value.
///
/// The value is parsed as a toml value if it can be, otherwise it is kept as
/// a bare string so that `-o logging.service_label=dev` works without quotes.
pub fn parse_override(s: &str) -> Result<(Vec<String>, Value), ConfigError> {
    let (key, raw_val) = s
        .split_once('=')
        .ok_or_else(|| ConfigError::InvalidOverride(s.to_owned()))?;

    let path: Vec<String> = key.trim().split('.').map(str::to_owned).collect();
    if path.iter().any(|seg| seg.is_empty()) {
        return Err(ConfigError::InvalidOverride(s.to_owned()));
    }

    Ok((path, parse_value(raw_val.trim())))
}

fn parse_value(raw: &str) -> Value {
    // Go through a throwaway document since toml can't parse bare values.
    let doc = format!("v = {raw}");
    toml::from_str::<Table>(&doc)
        .ok()
        .and_then(|mut t| t.remove("v"))
        .unwrap_or_else(|| Value::String(raw.to_owned()))
}

/// Sets `value` at `path` inside `table`, creating intermediate tables.
pub fn apply_override(path: &[String], value: Value, table: &mut Table) -> Result<(), ConfigError> {
    let Some((last, parents)) = path.split_last() else {
        return Err(ConfigError::InvalidOverride(String::new()));
    };

    let mut cur = table;
    for (i, seg) in parents.iter().enumerate() {
        let entry = cur
            .entry(seg.clone())
            .or_insert_with(|| Value::Table(Table::new()));
        cur = match entry {
            Value::Table(t) => t,
            _ => {
                return Err(ConfigError::TraverseNonTableAt {
                    key: seg.clone(),
                    path: path[..i].join("."),
                })
            }
        };
    }

    cur.insert(last.clone(), value);
    Ok(())
}
