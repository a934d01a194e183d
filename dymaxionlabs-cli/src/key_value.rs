//! `key=value` command-line options.

use anyhow::{format_err, Error, Result};
use serde_json::{Map, Value};
use std::str::FromStr;
use tracing::warn;

/// A `key=value` pair from the command line. The value is parsed as JSON if
/// possible.
#[derive(Debug)]
pub struct KeyValue {
    /// The part before the first `=`.
    pub key: String,

    /// The part after the first `=`.
    pub value: Value,
}

impl KeyValue {
    /// Collect a list of pairs into a JSON object. Later keys win.
    pub fn into_object(pairs: Vec<KeyValue>) -> Map<String, Value> {
        pairs.into_iter().map(|kv| (kv.key, kv.value)).collect()
    }
}

/// Lets `structopt` parse arguments directly into `KeyValue`.
impl FromStr for KeyValue {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let split = s.splitn(2, '=').collect::<Vec<&str>>();
        if split.len() != 2 || split[0].is_empty() {
            return Err(format_err!("{:?} must have form \"key=value\"", s));
        }
        let key = split[0].to_owned();
        let value = match serde_json::from_str(split[1]) {
            Ok(value) => value,
            Err(err) => {
                warn!("treating {:?} as a string (not JSON: {})", split[1], err);
                Value::String(split[1].to_owned())
            }
        };
        Ok(KeyValue { key, value })
    }
}

#[test]
fn parses_json_values() {
    let examples = &[
        ("x=null", Value::Null),
        ("x=true", Value::Bool(true)),
        ("x=0.5", serde_json::json!(0.5)),
        ("x=[\"pool\"]", serde_json::json!(["pool"])),
        ("x={\"a\":1}", serde_json::json!({ "a": 1 })),
        ("x=\"hi\"", Value::String("hi".to_owned())),
    ];
    for (input, expected) in examples {
        let parsed = input.parse::<KeyValue>().unwrap();
        assert_eq!(parsed.key, "x");
        assert_eq!(&parsed.value, expected);
    }
}

#[test]
fn falls_back_to_strings() {
    let parsed = "site=north=field".parse::<KeyValue>().unwrap();
    assert_eq!(parsed.key, "site");
    assert_eq!(parsed.value, Value::String("north=field".to_owned()));
}

#[test]
fn rejects_missing_keys() {
    assert!("novalue".parse::<KeyValue>().is_err());
    assert!("=1".parse::<KeyValue>().is_err());
}

#[test]
fn later_keys_win() {
    let pairs = vec!["a=1".parse().unwrap(), "a=2".parse().unwrap()];
    let object = KeyValue::into_object(pairs);
    assert_eq!(object.get("a"), Some(&serde_json::json!(2)));
}
