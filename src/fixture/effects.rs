//! Transient operations running against a fixture.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Which container an operation lives in.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OpKind {
    /// A value ramp on a single channel.
    Effect,
    /// A rule that rewrites the whole fixture state while it applies.
    StateEffect,
}

/// Lifecycle marker carried by operation events.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Lifecycle {
    New,
    Done,
}

/// Parameters of a running operation. Missing values stay `None`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Operation {
    #[serde(default, deserialize_with = "lenient_bound")]
    pub start: Option<i64>,
    #[serde(default, deserialize_with = "lenient_bound")]
    pub end: Option<i64>,
    #[serde(default, deserialize_with = "lenient_bound")]
    pub done: Option<i64>,
    #[serde(default)]
    pub duration: Option<f64>,
}

/// Byte bounds sometimes arrive as floats; truncate those, keep null as `None`.
fn lenient_bound<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    let number: Option<serde_json::Number> = Option::deserialize(deserializer)?;
    Ok(number.and_then(|n| n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))))
}

fn write_opt<T: fmt::Display>(f: &mut fmt::Formatter, value: &Option<T>) -> fmt::Result {
    match value {
        Some(value) => write!(f, "{}", value),
        None => Ok(()),
    }
}

/// `start->end->done duration`
impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write_opt(f, &self.start)?;
        f.write_str("->")?;
        write_opt(f, &self.end)?;
        f.write_str("->")?;
        write_opt(f, &self.done)?;
        f.write_str(" ")?;
        write_opt(f, &self.duration)
    }
}

/// Active effects and state effects of one fixture, keyed by operation name.
#[derive(Debug, Clone, Default)]
pub struct EffectRegistry {
    effects: BTreeMap<String, Operation>,
    state_effects: BTreeMap<String, Operation>,
}

impl EffectRegistry {
    pub fn new() -> EffectRegistry {
        EffectRegistry::default()
    }

    fn container(&self, kind: OpKind) -> &BTreeMap<String, Operation> {
        match kind {
            OpKind::Effect => &self.effects,
            OpKind::StateEffect => &self.state_effects,
        }
    }

    fn container_mut(&mut self, kind: OpKind) -> &mut BTreeMap<String, Operation> {
        match kind {
            OpKind::Effect => &mut self.effects,
            OpKind::StateEffect => &mut self.state_effects,
        }
    }

    /// Apply one lifecycle event.
    ///
    /// `New` inserts or replaces the entry, `Done` removes it. Returns false
    /// when a `Done` names an operation that is not running.
    pub fn apply(&mut self, kind: OpKind, op_name: &str, lifecycle: Lifecycle, payload: Operation) -> bool {
        let container = self.container_mut(kind);
        match lifecycle {
            Lifecycle::New => {
                container.insert(op_name.to_string(), payload);
                true
            }
            Lifecycle::Done => container.remove(op_name).is_some(),
        }
    }

    pub fn get(&self, kind: OpKind, op_name: &str) -> Option<&Operation> {
        self.container(kind).get(op_name)
    }

    pub fn iter(&self, kind: OpKind) -> impl Iterator<Item = (&String, &Operation)> {
        self.container(kind).iter()
    }

    pub fn len(&self, kind: OpKind) -> usize {
        self.container(kind).len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty() && self.state_effects.is_empty()
    }

    /// Human-readable summary lines, one per running operation.
    pub fn lines(&self, kind: OpKind) -> Vec<String> {
        self.iter(kind)
            .map(|(name, op)| format!("{} {}", name, op))
            .collect()
    }

    pub fn clear(&mut self) {
        self.effects.clear();
        self.state_effects.clear();
    }
}
