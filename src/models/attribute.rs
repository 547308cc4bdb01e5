// src/models/attribute.rs

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

/// Atributos já projetados de uma entidade (chave -> valor JSON).
pub type AttributeMap = BTreeMap<String, Value>;

// ---
// 1. AttributeScope
// ---
// A ordem de declaração é a precedência no merge: CLIENT vence SERVER,
// que vence SHARED. `Ord` derivado segue essa ordem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttributeScope {
    ClientScope,
    ServerScope,
    SharedScope,
}

impl AttributeScope {
    /// Código usado na coluna `attribute_type` da tabela `attribute_kv`.
    pub fn code(&self) -> i32 {
        match self {
            AttributeScope::ClientScope => 1,
            AttributeScope::ServerScope => 2,
            AttributeScope::SharedScope => 3,
        }
    }
}

// ---
// 2. KvEntry (Linha crua do armazenamento de atributos)
// ---
#[derive(Debug, Clone, Default, PartialEq, FromRow)]
pub struct KvEntry {
    pub key: String,
    pub str_v: Option<String>,
    pub bool_v: Option<bool>,
    pub dbl_v: Option<f64>,
    pub long_v: Option<i64>,
    pub json_v: Option<Value>,
    pub last_update_ts: i64,
}

impl KvEntry {
    /// Primeiro valor preenchido, na ordem string -> bool -> double -> long -> json.
    /// Sem nenhum valor, projeta `null` (a chave continua presente).
    pub fn value(&self) -> Value {
        if let Some(s) = &self.str_v {
            return Value::String(s.clone());
        }
        if let Some(b) = self.bool_v {
            return Value::Bool(b);
        }
        if let Some(d) = self.dbl_v {
            // NaN/infinito não tem representação JSON.
            return serde_json::Number::from_f64(d)
                .map(Value::Number)
                .unwrap_or(Value::Null);
        }
        if let Some(l) = self.long_v {
            return Value::from(l);
        }
        if let Some(j) = &self.json_v {
            return j.clone();
        }
        Value::Null
    }

    pub fn string(key: &str, value: &str) -> Self {
        Self {
            key: key.to_string(),
            str_v: Some(value.to_string()),
            ..Default::default()
        }
    }

    pub fn boolean(key: &str, value: bool) -> Self {
        Self {
            key: key.to_string(),
            bool_v: Some(value),
            ..Default::default()
        }
    }

    pub fn double(key: &str, value: f64) -> Self {
        Self {
            key: key.to_string(),
            dbl_v: Some(value),
            ..Default::default()
        }
    }

    pub fn long(key: &str, value: i64) -> Self {
        Self {
            key: key.to_string(),
            long_v: Some(value),
            ..Default::default()
        }
    }
}
