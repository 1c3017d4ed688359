use std::{collections::HashMap, str::FromStr};

use serde_json::Value;

use super::error::TypeError;
use crate::constants::{NOT_BLANK, NOT_NULL};

pub type FormData = HashMap<String, Value>;

/// Typed access to a decoded JSON object. Getters return `Ok(None)` when the
/// key is absent so callers decide what "required" means for them.
pub struct Form {
    inner: HashMap<String, Value>,
}

impl Form {
    pub fn from_data(data: FormData) -> Self {
        Self { inner: data }
    }

    pub fn has(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }

    /// Trimmed, non-blank string.
    pub fn get_str(&self, key: &str) -> Result<Option<String>, TypeError> {
        match self.inner.get(key) {
            None => Ok(None),
            Some(Value::Null) => Err(TypeError::new(NOT_NULL)),
            Some(Value::String(v)) => {
                let v = v.trim();
                if v.is_empty() {
                    return Err(TypeError::new(NOT_BLANK));
                }
                Ok(Some(v.to_string()))
            }
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            Some(_) => Err(TypeError::new("Not a valid string.")),
        }
    }

    /// String taken verbatim, used for secrets.
    pub fn get_raw_str(&self, key: &str) -> Result<Option<String>, TypeError> {
        match self.inner.get(key) {
            None => Ok(None),
            Some(Value::Null) => Err(TypeError::new(NOT_NULL)),
            Some(Value::String(v)) if v.is_empty() => Err(TypeError::new(NOT_BLANK)),
            Some(Value::String(v)) => Ok(Some(v.to_owned())),
            Some(_) => Err(TypeError::new("Not a valid string.")),
        }
    }

    /// Optional text column: `null` clears it, blank strings are kept as is.
    pub fn get_nullable_str(&self, key: &str) -> Result<Option<Option<String>>, TypeError> {
        match self.inner.get(key) {
            None => Ok(None),
            Some(Value::Null) => Ok(Some(None)),
            Some(Value::String(v)) => Ok(Some(Some(v.trim().to_string()))),
            Some(_) => Err(TypeError::new("Not a valid string.")),
        }
    }

    /// Whole number given either as a JSON number or a numeric string.
    pub fn get_integer<T>(&self, key: &str) -> Result<Option<T>, TypeError>
    where
        T: FromStr + TryFrom<i64>,
    {
        let invalid = || TypeError::new("A valid integer is required.");

        match self.inner.get(key) {
            None => Ok(None),
            Some(Value::Null) => Err(TypeError::new(NOT_NULL)),
            Some(Value::Number(n)) => {
                let whole = match n.as_i64() {
                    Some(v) => v,
                    None => match n.as_f64() {
                        Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => f as i64,
                        _ => return Err(invalid()),
                    },
                };
                T::try_from(whole).map(Some).map_err(|_e| invalid())
            }
            Some(Value::String(v)) => v.trim().parse().map(Some).map_err(|_e| invalid()),
            Some(_) => Err(invalid()),
        }
    }

    /// Value parsed from its textual form, numbers included.
    pub fn get_number<T>(&self, key: &str) -> Result<Option<T>, TypeError>
    where
        T: FromStr<Err = TypeError>,
    {
        match self.inner.get(key) {
            None => Ok(None),
            Some(Value::Null) => Err(TypeError::new(NOT_NULL)),
            Some(Value::Number(n)) => n.to_string().parse().map(Some),
            Some(Value::String(v)) => v.trim().parse().map(Some),
            Some(_) => Err(TypeError::new("A valid number is required.")),
        }
    }

    /// List of nested objects.
    pub fn get_list(&self, key: &str) -> Result<Option<Vec<Form>>, TypeError> {
        match self.inner.get(key) {
            None => Ok(None),
            Some(Value::Null) => Err(TypeError::new(NOT_NULL)),
            Some(Value::Array(items)) => {
                let mut forms = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::Object(map) => forms.push(Form::from_data(
                            map.iter().map(|(k, v)| (k.to_owned(), v.to_owned())).collect(),
                        )),
                        _ => {
                            return Err(TypeError::new(
                                "Invalid data. Expected a dictionary, but got a list item.",
                            ))
                        }
                    }
                }
                Ok(Some(forms))
            }
            Some(_) => Err(TypeError::new("Expected a list of items.")),
        }
    }
}
