//! Functions callable from templates.
//!
//! Store helpers:
//! - `StoreGet key` - value of one key as text, `""` if absent or no store
//! - `StoreList prefix` - values of the direct children, in backend order
//! - `RemoveNewline s` - `s` without one trailing newline
//!
//! Builtins: `not`, `and`, `or`, `eq`, `ne`, `len`, `index`.

use std::collections::HashMap;

use confvol_store::{KvStore, SharedStore};
use serde_json::Value;

use crate::value;

/// A template function. Errors are plain messages; the executor adds the
/// template position.
pub type Helper = Box<dyn Fn(&[Value]) -> Result<Value, String> + Send + Sync>;

pub(crate) struct Funcs {
    helpers: HashMap<String, Helper>,
}

impl Funcs {
    pub fn new(store: Option<SharedStore>) -> Self {
        let mut funcs = Self {
            helpers: HashMap::new(),
        };
        funcs.add_builtins();
        funcs.add_store_helpers(store);
        funcs
    }

    pub fn insert(&mut self, name: impl Into<String>, helper: Helper) {
        self.helpers.insert(name.into(), helper);
    }

    pub fn get(&self, name: &str) -> Option<&Helper> {
        self.helpers.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.helpers.contains_key(name)
    }

    fn add_store_helpers(&mut self, store: Option<SharedStore>) {
        let get_store = store.clone();
        self.insert(
            "StoreGet",
            Box::new(move |args: &[Value]| {
                let key = string_arg("StoreGet", args)?;
                let Some(store) = &get_store else {
                    return Ok(Value::String(String::new()));
                };
                match store.get(key) {
                    Ok(pair) => utf8_value(&pair.key, &pair.value),
                    Err(_) => Ok(Value::String(String::new())),
                }
            }),
        );

        let list_store = store;
        self.insert(
            "StoreList",
            Box::new(move |args: &[Value]| {
                let prefix = string_arg("StoreList", args)?;
                let Some(store) = &list_store else {
                    return Ok(Value::Array(Vec::new()));
                };
                let values = store
                    .list(prefix)
                    .unwrap_or_default()
                    .iter()
                    .map(|pair| utf8_value(&pair.key, &pair.value))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::Array(values))
            }),
        );

        self.insert(
            "RemoveNewline",
            Box::new(|args: &[Value]| {
                let s = string_arg("RemoveNewline", args)?;
                Ok(Value::String(s.strip_suffix('\n').unwrap_or(s).to_string()))
            }),
        );
    }

    fn add_builtins(&mut self) {
        self.insert(
            "not",
            Box::new(|args: &[Value]| {
                arity("not", args, 1)?;
                Ok(Value::Bool(!value::truthy(&args[0])))
            }),
        );

        self.insert(
            "and",
            Box::new(|args: &[Value]| {
                let last = args.last().ok_or("wrong number of args for and: want at least 1")?;
                Ok(args
                    .iter()
                    .find(|a| !value::truthy(a))
                    .unwrap_or(last)
                    .clone())
            }),
        );

        self.insert(
            "or",
            Box::new(|args: &[Value]| {
                let last = args.last().ok_or("wrong number of args for or: want at least 1")?;
                Ok(args
                    .iter()
                    .find(|a| value::truthy(a))
                    .unwrap_or(last)
                    .clone())
            }),
        );

        self.insert(
            "eq",
            Box::new(|args: &[Value]| match args {
                [first, rest @ ..] if !rest.is_empty() => {
                    Ok(Value::Bool(rest.iter().any(|v| value::equal(first, v))))
                }
                _ => Err("wrong number of args for eq: want at least 2".to_string()),
            }),
        );

        self.insert(
            "ne",
            Box::new(|args: &[Value]| {
                arity("ne", args, 2)?;
                Ok(Value::Bool(!value::equal(&args[0], &args[1])))
            }),
        );

        self.insert(
            "len",
            Box::new(|args: &[Value]| {
                arity("len", args, 1)?;
                let n = match &args[0] {
                    Value::String(s) => s.len(),
                    Value::Array(items) => items.len(),
                    Value::Object(map) => map.len(),
                    other => return Err(format!("len of type {}", value::kind(other))),
                };
                Ok(Value::from(n))
            }),
        );

        self.insert(
            "index",
            Box::new(|args: &[Value]| {
                let (first, keys) = args
                    .split_first()
                    .ok_or("wrong number of args for index: want at least 1")?;
                let mut current = first.clone();
                for key in keys {
                    current = index_one(current, key)?;
                }
                Ok(current)
            }),
        );
    }
}

/// Store values are bytes; templates only see them when they are UTF-8.
fn utf8_value(key: &str, bytes: &[u8]) -> Result<Value, String> {
    std::str::from_utf8(bytes)
        .map(|s| Value::String(s.to_string()))
        .map_err(|e| format!("value of {} is not valid UTF-8: {}", key, e))
}

fn arity(name: &str, args: &[Value], want: usize) -> Result<(), String> {
    if args.len() != want {
        return Err(format!(
            "wrong number of args for {}: want {} got {}",
            name,
            want,
            args.len()
        ));
    }
    Ok(())
}

fn string_arg<'v>(name: &str, args: &'v [Value]) -> Result<&'v str, String> {
    arity(name, args, 1)?;
    args[0]
        .as_str()
        .ok_or_else(|| format!("{} expects a string, got {}", name, value::kind(&args[0])))
}

fn index_one(container: Value, key: &Value) -> Result<Value, String> {
    match container {
        Value::Array(mut items) => {
            let i = key
                .as_u64()
                .ok_or_else(|| format!("cannot index array with {}", value::kind(key)))?;
            let len = items.len();
            usize::try_from(i)
                .ok()
                .filter(|i| *i < len)
                .map(|i| items.swap_remove(i))
                .ok_or_else(|| format!("index out of range: {}", i))
        }
        Value::Object(mut map) => {
            let k = key
                .as_str()
                .ok_or_else(|| format!("cannot index map with {}", value::kind(key)))?;
            Ok(map.remove(k).unwrap_or(Value::Null))
        }
        Value::Null => Err("index of untyped nil".to_string()),
        other => Err(format!("can't index item of type {}", value::kind(&other))),
    }
}
