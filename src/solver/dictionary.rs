use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::solver::primitives::FieldElement;

#[derive(Debug, thiserror::Error)]
pub enum DictionaryError {
    #[error("keyword '{key}' is undefined in dictionary {path}")]
    MissingKey { key: String, path: String },
    #[error("entry '{key}' in dictionary {path} is invalid: {reason}")]
    BadEntry {
        key: String,
        path: String,
        reason: String,
    },
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Keyed configuration block backed by JSON.
///
/// `path` is a slash-separated location (file name plus sub-dictionary keys)
/// used in error messages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dictionary {
    path: String,
    entries: Map<String, Value>,
}

impl Dictionary {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            entries: Map::new(),
        }
    }

    pub fn from_value(path: impl Into<String>, value: Value) -> Result<Self, DictionaryError> {
        let path = path.into();
        match value {
            Value::Object(entries) => Ok(Self { path, entries }),
            other => Err(DictionaryError::BadEntry {
                key: String::new(),
                reason: format!("expected a dictionary, found {other}"),
                path,
            }),
        }
    }

    pub fn from_json_str(path: impl Into<String>, text: &str) -> Result<Self, DictionaryError> {
        let path = path.into();
        let value: Value = serde_json::from_str(text).map_err(|source| DictionaryError::Parse {
            path: path.clone(),
            source,
        })?;
        Self::from_value(path, value)
    }

    pub fn read(path: &Path) -> Result<Self, DictionaryError> {
        let name = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|source| DictionaryError::Io {
            path: name.clone(),
            source,
        })?;
        Self::from_json_str(name, &text)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn found(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn lookup<T: DeserializeOwned>(&self, key: &str) -> Result<T, DictionaryError> {
        let value = self.entries.get(key).ok_or_else(|| self.missing(key))?;
        self.convert(key, value)
    }

    /// Returns `default` only when the key is absent; a malformed entry is an error.
    pub fn lookup_or_default<T: DeserializeOwned>(
        &self,
        key: &str,
        default: T,
    ) -> Result<T, DictionaryError> {
        match self.entries.get(key) {
            Some(value) => self.convert(key, value),
            None => Ok(default),
        }
    }

    pub fn sub_dict(&self, key: &str) -> Result<Dictionary, DictionaryError> {
        let value = self.entries.get(key).ok_or_else(|| self.missing(key))?;
        match value {
            Value::Object(entries) => Ok(Dictionary {
                path: format!("{}/{}", self.path, key),
                entries: entries.clone(),
            }),
            other => Err(self.bad(key, format!("expected a sub-dictionary, found {other}"))),
        }
    }

    pub fn sub_dict_or_empty(&self, key: &str) -> Result<Dictionary, DictionaryError> {
        if self.found(key) {
            self.sub_dict(key)
        } else {
            Ok(Dictionary::new(format!("{}/{}", self.path, key)))
        }
    }

    pub fn set<T: Serialize>(&mut self, key: &str, value: T) -> Result<(), DictionaryError> {
        let value = serde_json::to_value(value).map_err(|err| self.bad(key, err.to_string()))?;
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    pub fn set_value(&mut self, key: &str, value: Value) {
        self.entries.insert(key.to_string(), value);
    }

    pub fn set_sub_dict(&mut self, key: &str, dict: Dictionary) {
        self.entries
            .insert(key.to_string(), Value::Object(dict.entries));
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key)
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.entries.clone())
    }

    /// Reads a per-face or per-cell field of `size` elements.
    ///
    /// Accepted forms: a single element (uniform), a list of elements, or the
    /// explicit `{"uniform": e}` / `{"nonuniform": [e, ...]}` objects. A scalar is
    /// a number, other ranks are flat component arrays.
    pub fn read_field<T: FieldElement>(&self, key: &str, size: usize) -> Result<Vec<T>, DictionaryError> {
        let value = self.entries.get(key).ok_or_else(|| self.missing(key))?;
        self.field_from_value(key, value, size)
    }

    /// Element count of a non-uniform field entry, `None` for uniform or absent entries.
    pub fn list_len<T: FieldElement>(&self, key: &str) -> Option<usize> {
        let value = self.entries.get(key)?;
        let list = match value {
            Value::Object(map) => map.get("nonuniform")?,
            other if is_element_list::<T>(other) => other,
            _ => return None,
        };
        list.as_array().map(Vec::len)
    }

    pub fn read_element<T: FieldElement>(&self, key: &str) -> Result<T, DictionaryError> {
        let value = self.entries.get(key).ok_or_else(|| self.missing(key))?;
        element_from_value::<T>(value).map_err(|reason| self.bad(key, reason))
    }

    pub fn write_field<T: FieldElement>(&mut self, key: &str, values: &[T]) {
        let value = match values.split_first() {
            Some((first, rest)) if rest.iter().all(|v| v == first) => {
                serde_json::json!({ "uniform": element_to_value(first) })
            }
            _ => serde_json::json!({
                "nonuniform": values.iter().map(element_to_value).collect::<Vec<_>>()
            }),
        };
        self.entries.insert(key.to_string(), value);
    }

    fn field_from_value<T: FieldElement>(
        &self,
        key: &str,
        value: &Value,
        size: usize,
    ) -> Result<Vec<T>, DictionaryError> {
        if let Value::Object(map) = value {
            if let Some(uniform) = map.get("uniform") {
                let element = element_from_value::<T>(uniform).map_err(|r| self.bad(key, r))?;
                return Ok(vec![element; size]);
            }
            if let Some(list) = map.get("nonuniform") {
                return self.list_from_value(key, list, size);
            }
            return Err(self.bad(key, "expected 'uniform' or 'nonuniform'".to_string()));
        }

        if is_element_list::<T>(value) {
            self.list_from_value(key, value, size)
        } else {
            let element = element_from_value::<T>(value).map_err(|r| self.bad(key, r))?;
            Ok(vec![element; size])
        }
    }

    fn list_from_value<T: FieldElement>(
        &self,
        key: &str,
        value: &Value,
        size: usize,
    ) -> Result<Vec<T>, DictionaryError> {
        let Value::Array(items) = value else {
            return Err(self.bad(key, format!("expected a list, found {value}")));
        };
        if items.len() != size {
            return Err(self.bad(
                key,
                format!("size {} is not equal to the given value of {size}", items.len()),
            ));
        }
        items
            .iter()
            .map(|item| element_from_value::<T>(item).map_err(|r| self.bad(key, r)))
            .collect()
    }

    fn convert<T: DeserializeOwned>(&self, key: &str, value: &Value) -> Result<T, DictionaryError> {
        T::deserialize(value).map_err(|err| self.bad(key, err.to_string()))
    }

    fn missing(&self, key: &str) -> DictionaryError {
        DictionaryError::MissingKey {
            key: key.to_string(),
            path: self.path.clone(),
        }
    }

    fn bad(&self, key: &str, reason: String) -> DictionaryError {
        DictionaryError::BadEntry {
            key: key.to_string(),
            path: self.path.clone(),
            reason,
        }
    }
}

fn is_element_list<T: FieldElement>(value: &Value) -> bool {
    match value {
        Value::Array(items) if T::N_COMPONENTS == 1 => items.iter().all(Value::is_number),
        Value::Array(items) => items.is_empty() || items.iter().all(Value::is_array),
        _ => false,
    }
}

pub fn element_from_value<T: FieldElement>(value: &Value) -> Result<T, String> {
    let components: Vec<f64> = match value {
        Value::Number(n) => vec![n.as_f64().ok_or_else(|| format!("bad number {n}"))?],
        Value::Array(items) => items
            .iter()
            .map(|item| item.as_f64().ok_or_else(|| format!("bad component {item}")))
            .collect::<Result<_, _>>()?,
        other => return Err(format!("expected a {}, found {other}", T::TYPE_NAME)),
    };
    if components.len() != T::N_COMPONENTS {
        return Err(format!(
            "a {} needs {} components, found {}",
            T::TYPE_NAME,
            T::N_COMPONENTS,
            components.len()
        ));
    }
    Ok(T::from_components(&components))
}

pub fn element_to_value<T: FieldElement>(element: &T) -> Value {
    if T::N_COMPONENTS == 1 {
        Value::from(element.component(0))
    } else {
        Value::from(element.to_components())
    }
}
