use crate::calc::{self, CalcError};
use crate::ipc::error::err;
use crate::ipc::types::AppState;
use rusqlite::Connection;
use serde_json::Value;

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn response(self, id: &str) -> Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<CalcError> for HandlerErr {
    fn from(e: CalcError) -> Self {
        Self {
            code: "bad_params",
            message: e.message,
            details: e.details,
        }
    }
}

pub fn db_err(code: &'static str) -> impl Fn(rusqlite::Error) -> HandlerErr {
    move |e| HandlerErr::new(code, e.to_string())
}

pub fn conn(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub fn required_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    match params.get(key).and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => Ok(v.to_string()),
        _ => Err(HandlerErr::new("bad_params", format!("missing {}", key))),
    }
}

/// Trimmed, non-empty display text such as a name or code.
pub fn required_text(params: &Value, key: &str) -> Result<String, HandlerErr> {
    let raw = match params.get(key) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return Err(HandlerErr::new("bad_params", format!("missing {}", key))),
    };
    if raw.is_empty() {
        return Err(HandlerErr::new(
            "bad_params",
            format!("{} must not be empty", key),
        ));
    }
    Ok(raw)
}

pub fn optional_number(params: &Value, key: &str) -> Result<Option<f64>, HandlerErr> {
    Ok(calc::parse_optional_number(params.get(key), key)?)
}

pub fn required_number(params: &Value, key: &str) -> Result<f64, HandlerErr> {
    optional_number(params, key)?
        .ok_or_else(|| HandlerErr::new("bad_params", format!("missing {}", key)))
}

pub fn optional_bool(params: &Value, key: &str) -> Result<Option<bool>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        // Checkbox-style form values.
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "" | "false" | "off" | "0" => Ok(Some(false)),
            "true" | "on" | "1" => Ok(Some(true)),
            _ => Err(HandlerErr::new(
                "bad_params",
                format!("{} must be a boolean", key),
            )),
        },
        Some(_) => Err(HandlerErr::new(
            "bad_params",
            format!("{} must be a boolean", key),
        )),
    }
}

pub fn respond(id: &str, result: Result<Value, HandlerErr>) -> Value {
    match result {
        Ok(v) => crate::ipc::error::ok(id, v),
        Err(e) => e.response(id),
    }
}
