// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the hiden-rga project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Process-variable database
//!
//! A process variable (PV) is a named, typed value with a time stamp. Two
//! kinds of writes exist:
//!
//! - [`PvDatabase::put`] comes from outside (an operator, the Modbus
//!   server) and is announced to subscribers as a [`PutEvent`], which is
//!   how the IOC reacts to control PVs.
//! - [`PvDatabase::write`] is a readback update made by the IOC itself and
//!   is not announced.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use log::debug;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;

/// Capacity of the put-event channel
const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PvValue {
    Int(i64),
    Float(f64),
    Text(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PvKind {
    Int,
    Float,
    Text,
}

impl PvValue {
    pub fn kind(&self) -> PvKind {
        match self {
            PvValue::Int(_) => PvKind::Int,
            PvValue::Float(_) => PvKind::Float,
            PvValue::Text(_) => PvKind::Text,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PvValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PvValue::Int(value) => Some(*value as f64),
            PvValue::Float(value) => Some(*value),
            PvValue::Text(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PvValue::Text(value) => Some(value),
            _ => None,
        }
    }
}

impl std::fmt::Display for PvValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PvValue::Int(value) => write!(f, "{}", value),
            PvValue::Float(value) => write!(f, "{}", value),
            PvValue::Text(value) => write!(f, "{}", value),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessVariable {
    pub name: String,
    pub doc: String,
    pub value: PvValue,
    /// Longest accepted text, for text PVs
    pub max_length: Option<usize>,
    pub timestamp: DateTime<Utc>,
    /// Time of the last write, `None` while the PV holds its initial value
    pub updated: Option<DateTime<Utc>>,
}

impl ProcessVariable {
    pub fn new(name: impl Into<String>, value: PvValue, doc: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            doc: doc.into(),
            value,
            max_length: None,
            timestamp: Utc::now(),
            updated: None,
        }
    }

    pub fn int(name: impl Into<String>, value: i64, doc: impl Into<String>) -> Self {
        Self::new(name, PvValue::Int(value), doc)
    }

    pub fn float(name: impl Into<String>, value: f64, doc: impl Into<String>) -> Self {
        Self::new(name, PvValue::Float(value), doc)
    }

    pub fn text(name: impl Into<String>, value: impl Into<String>, doc: impl Into<String>) -> Self {
        Self::new(name, PvValue::Text(value.into()), doc)
    }

    pub fn max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    pub fn kind(&self) -> PvKind {
        self.value.kind()
    }

    fn check(&self, value: &PvValue) -> Result<(), PvError> {
        if value.kind() != self.kind() {
            return Err(PvError::TypeMismatch {
                name: self.name.clone(),
                expected: self.kind(),
                found: value.kind(),
            });
        }
        if let (Some(max), PvValue::Text(text)) = (self.max_length, value) {
            if text.chars().count() > max {
                return Err(PvError::TooLong {
                    name: self.name.clone(),
                    max,
                });
            }
        }
        Ok(())
    }
}

/// An external write to a PV
#[derive(Debug, Clone, PartialEq)]
pub struct PutEvent {
    pub name: String,
    pub value: PvValue,
}

#[derive(Debug, Error, PartialEq)]
pub enum PvError {
    #[error("unknown process variable {0}")]
    UnknownPv(String),

    #[error("{name} holds {expected:?} values, not {found:?}")]
    TypeMismatch {
        name: String,
        expected: PvKind,
        found: PvKind,
    },

    #[error("value for {name} is longer than {max} characters")]
    TooLong { name: String, max: usize },

    #[error("process variable {0} already exists")]
    Duplicate(String),
}

/// Thread-safe set of process variables
///
/// Reads and writes are synchronous so they can be served from the Modbus
/// request handler.
pub struct PvDatabase {
    pvs: RwLock<HashMap<String, ProcessVariable>>,
    events: broadcast::Sender<PutEvent>,
}

impl Default for PvDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl PvDatabase {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            pvs: RwLock::new(HashMap::new()),
            events,
        }
    }

    pub fn add(&self, pv: ProcessVariable) -> Result<(), PvError> {
        let mut pvs = self.pvs.write().unwrap_or_else(PoisonError::into_inner);
        if pvs.contains_key(&pv.name) {
            return Err(PvError::Duplicate(pv.name));
        }
        debug!("Adding PV {} = {}", pv.name, pv.value);
        pvs.insert(pv.name.clone(), pv);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<ProcessVariable> {
        self.pvs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn value(&self, name: &str) -> Option<PvValue> {
        self.pvs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(|pv| pv.value.clone())
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .pvs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Copy of every PV, sorted by name
    pub fn snapshot(&self) -> Vec<ProcessVariable> {
        let mut pvs: Vec<ProcessVariable> = self
            .pvs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        pvs.sort_by(|a, b| a.name.cmp(&b.name));
        pvs
    }

    /// External write: stored, then announced to subscribers
    pub fn put(&self, name: &str, value: PvValue) -> Result<(), PvError> {
        self.store(name, value.clone())?;
        debug!("Put {} = {}", name, value);
        // Nobody listening is not an error
        let _ = self.events.send(PutEvent {
            name: name.to_string(),
            value,
        });
        Ok(())
    }

    /// Readback write, not announced
    pub fn write(&self, name: &str, value: PvValue) -> Result<(), PvError> {
        self.store(name, value)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PutEvent> {
        self.events.subscribe()
    }

    fn store(&self, name: &str, value: PvValue) -> Result<(), PvError> {
        let mut pvs = self.pvs.write().unwrap_or_else(PoisonError::into_inner);
        let pv = pvs
            .get_mut(name)
            .ok_or_else(|| PvError::UnknownPv(name.to_string()))?;
        pv.check(&value)?;
        let now = Utc::now();
        pv.value = value;
        pv.timestamp = now;
        pv.updated = Some(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn database() -> PvDatabase {
        let db = PvDatabase::new();
        db.add(ProcessVariable::int("RGA:Acquire", 0, "acquire")).unwrap();
        db.add(ProcessVariable::float("RGA:MID1-I", 0.0, "reading")).unwrap();
        db.add(ProcessVariable::text("RGA:ExpName", "file56.exp", "experiment").max_length(16))
            .unwrap();
        db
    }

    #[test]
    fn duplicates_are_rejected() {
        let db = database();
        assert_eq!(
            db.add(ProcessVariable::int("RGA:Acquire", 1, "again")),
            Err(PvError::Duplicate("RGA:Acquire".to_string()))
        );
    }

    #[test]
    fn writes_are_type_checked() {
        let db = database();
        assert!(matches!(
            db.write("RGA:MID1-I", PvValue::Int(3)),
            Err(PvError::TypeMismatch { .. })
        ));
        assert!(matches!(
            db.put("RGA:ExpName", PvValue::Text("x".repeat(17))),
            Err(PvError::TooLong { max: 16, .. })
        ));
        assert_eq!(
            db.put("RGA:Nope", PvValue::Int(1)),
            Err(PvError::UnknownPv("RGA:Nope".to_string()))
        );

        db.write("RGA:MID1-I", PvValue::Float(1.5e-9)).unwrap();
        assert_eq!(db.value("RGA:MID1-I"), Some(PvValue::Float(1.5e-9)));
    }

    #[test]
    fn update_time_starts_unset() {
        let db = database();
        assert_eq!(db.get("RGA:MID1-I").unwrap().updated, None);

        db.write("RGA:MID1-I", PvValue::Float(1.0e-9)).unwrap();
        let pv = db.get("RGA:MID1-I").unwrap();
        assert_eq!(pv.updated, Some(pv.timestamp));
    }

    #[test]
    fn only_puts_are_announced() {
        let db = database();
        let mut events = db.subscribe();

        db.write("RGA:MID1-I", PvValue::Float(2.0)).unwrap();
        db.put("RGA:Acquire", PvValue::Int(1)).unwrap();

        let event = events.try_recv().unwrap();
        assert_eq!(
            event,
            PutEvent {
                name: "RGA:Acquire".to_string(),
                value: PvValue::Int(1)
            }
        );
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn names_and_snapshot_are_sorted() {
        let db = database();
        assert_eq!(
            db.names(),
            vec!["RGA:Acquire", "RGA:ExpName", "RGA:MID1-I"]
        );
        assert_eq!(db.snapshot().len(), 3);
        assert_eq!(PvValue::Int(2).as_f64(), Some(2.0));
    }
}
