//! Path access on the opaque zone and zonegroup documents.
//!
//! The documents are kept as [`serde_json::Value`] so fields this operator
//! does not own survive a get/modify/set cycle untouched.

use serde_json::{Map, Value};

use super::error::{JsonPathSnafu, Result};

fn document_name(doc: &Value) -> String {
    doc.get("name")
        .and_then(Value::as_str)
        .unwrap_or("document")
        .to_string()
}

fn path_error(doc: &Value, path: &[&str], message: &str) -> super::error::Error {
    JsonPathSnafu {
        document: document_name(doc),
        path: path.join("."),
        message,
    }
    .build()
}

pub fn get<'a>(doc: &'a Value, path: &[&str]) -> Result<&'a Value> {
    let mut current = doc;
    for segment in path {
        current = current
            .get(segment)
            .ok_or_else(|| path_error(doc, path, "not found"))?;
    }
    Ok(current)
}

pub fn get_str<'a>(doc: &'a Value, path: &[&str]) -> Result<&'a str> {
    get(doc, path)?
        .as_str()
        .ok_or_else(|| path_error(doc, path, "not a string"))
}

pub fn get_array<'a>(doc: &'a Value, path: &[&str]) -> Result<&'a Vec<Value>> {
    get(doc, path)?
        .as_array()
        .ok_or_else(|| path_error(doc, path, "not an array"))
}

pub fn get_object<'a>(doc: &'a Value, path: &[&str]) -> Result<&'a Map<String, Value>> {
    get(doc, path)?
        .as_object()
        .ok_or_else(|| path_error(doc, path, "not an object"))
}

/// Sets `value` at `path`, creating missing intermediate objects, and returns the previous value.
pub fn set(doc: &mut Value, path: &[&str], value: Value) -> Result<Option<Value>> {
    let Some((last, parents)) = path.split_last() else {
        return Ok(Some(std::mem::replace(doc, value)));
    };
    let name = document_name(doc);
    let mut current = doc;
    for segment in parents {
        let object = current.as_object_mut().ok_or_else(|| {
            JsonPathSnafu {
                document: name.clone(),
                path: path.join("."),
                message: format!("{segment} is not inside an object"),
            }
            .build()
        })?;
        current = object
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    let object = current.as_object_mut().ok_or_else(|| {
        JsonPathSnafu {
            document: name,
            path: path.join("."),
            message: "parent is not an object",
        }
        .build()
    })?;
    Ok(object.insert(last.to_string(), value))
}
