//! Decoding of single command records.

use serde::Deserialize;
use serde_json::{Map, Value};

use super::{ParserError, ParserResult};
use crate::fixture::{self, ChannelState, FixtureDescriptor, Lifecycle, OpEvent, OpKind, Operation};

/// Abstract commands recognized by the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Replace the fixtures named in the list.
    Lights {
        fixtures: Vec<FixtureDescriptor>,
        suspended: Option<bool>,
    },
    /// A batch of monitor events, in emission order.
    Monitor { events: Vec<MonitorEvent> },
    /// Manual control of the operator form.
    Control(ManualControl),
    /// The server went away; forget everything.
    Quit,
    /// The server rejected something we sent.
    Error {
        code: Option<String>,
        argument: Value,
        error: Option<String>,
    },
    /// Acknowledgement of a control command.
    Ok,
    /// Reply to an `echo` control command.
    Echo { args: Vec<Value> },
    /// Any command type we do not know about.
    Unknown { command: String },
}

/// Operator form controls, driven by a hardware controller on the server side.
#[derive(Debug, Clone, PartialEq)]
pub enum ManualControl {
    Select { name: String },
    Deselect,
    Focus { field: Option<String> },
    Property { name: String },
    Duration { value: String, unit: String },
    Save,
    Cancel,
}

/// One entry of a `MONITOR` batch.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    /// Changed channel values of a fixture.
    State { name: String, state: ChannelState },
    /// An effect or state effect started or finished.
    Operation { name: String, event: OpEvent },
    /// Audio analyzer bins.
    Audio { bins: Vec<f64> },
    /// Output to the fixtures was paused or resumed.
    Suspended { suspended: bool },
    /// Some op we do not render.
    Other { op: String },
}

/// Wire shape of a monitor event.
#[derive(Deserialize, Debug)]
struct RawEvent {
    #[serde(default)]
    name: Option<String>,
    op: String,
    #[serde(default)]
    op_state: Value,
    #[serde(default)]
    op_name: Option<String>,
    #[serde(default)]
    state: Value,
}

impl MonitorEvent {
    /// Decode a single monitor event object.
    pub fn decode(value: Value) -> ParserResult<MonitorEvent> {
        let raw: RawEvent = serde_json::from_value(value)?;
        match raw.op.as_str() {
            "STATE" => Ok(MonitorEvent::State {
                name: require_name(&raw)?,
                state: fixture::channel_state(raw.state)?,
            }),
            "EFFECT" | "STATE_EFFECT" => {
                let kind = if raw.op == "EFFECT" {
                    OpKind::Effect
                } else {
                    OpKind::StateEffect
                };
                let name = require_name(&raw)?;
                let lifecycle: Lifecycle = serde_json::from_value(raw.op_state)
                    .map_err(|_| bad_argument(&raw.op, "op_state must be NEW or DONE"))?;
                let op_name = raw
                    .op_name
                    .ok_or_else(|| bad_argument(&raw.op, "missing op_name"))?;
                let state = match raw.state {
                    Value::Null => Operation::default(),
                    state => serde_json::from_value(state)?,
                };
                Ok(MonitorEvent::Operation {
                    name,
                    event: OpEvent {
                        kind,
                        op_name,
                        lifecycle,
                        state,
                    },
                })
            }
            "AUDIO" => {
                let bins = match raw.state.get("bins") {
                    Some(Value::Array(bins)) => bins.iter().filter_map(Value::as_f64).collect(),
                    _ => vec![],
                };
                Ok(MonitorEvent::Audio { bins })
            }
            "SUSPENDED" => Ok(MonitorEvent::Suspended {
                suspended: truthy(&raw.op_state),
            }),
            _ => Ok(MonitorEvent::Other { op: raw.op.clone() }),
        }
    }
}

fn require_name(raw: &RawEvent) -> ParserResult<String> {
    raw.name
        .clone()
        .ok_or_else(|| bad_argument(&raw.op, "missing fixture name"))
}

fn bad_argument(command: &str, reason: &str) -> ParserError {
    ParserError::BadArgument {
        command: command.to_string(),
        reason: reason.to_string(),
    }
}

/// Loose boolean, as sent by a dynamically typed peer.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        Value::Null => false,
    }
}

fn string_value(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn string_arg(args: &[Value], index: usize) -> Option<String> {
    string_value(args.get(index))
}

/// Monitor ops that may also arrive as records of their own.
const EVENT_TYPES: [&str; 4] = ["STATE", "EFFECT", "STATE_EFFECT", "AUDIO"];

impl Command {
    /// Decode one record: `{"command": type, "args": [...], "kwargs": {...}}`.
    ///
    /// `type` is accepted in place of `command`.
    pub fn decode(line: &str) -> ParserResult<Command> {
        let mut fields: Map<String, Value> = serde_json::from_str(line)?;

        let command = match fields.remove("command") {
            Some(Value::String(command)) => command,
            _ => match fields.remove("type") {
                Some(Value::String(command)) => command,
                _ => return Err(ParserError::MissingCommand),
            },
        };

        let args = match fields.remove("args") {
            None | Some(Value::Null) => vec![],
            Some(Value::Array(args)) => args,
            Some(_) => return Err(bad_argument(&command, "args must be a list")),
        };

        let kwargs = match fields.remove("kwargs") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(kwargs)) => kwargs,
            Some(_) => return Err(bad_argument(&command, "kwargs must be a mapping")),
        };

        Command::from_parts(command, args, kwargs, fields)
    }

    fn from_parts(
        command: String,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
        rest: Map<String, Value>,
    ) -> ParserResult<Command> {
        let cmd = match command.as_str() {
            "LIGHTS" => {
                let fixtures = decode_descriptors(args);
                let suspended = kwargs
                    .get("suspended")
                    .or_else(|| kwargs.get("SUSPENDED"))
                    .map(truthy);
                Command::Lights {
                    fixtures,
                    suspended,
                }
            }
            "MONITOR" => Command::Monitor {
                events: decode_events(args, None),
            },
            op if EVENT_TYPES.contains(&op) => {
                let events = if args.is_empty() {
                    // The record itself is the event.
                    let mut event = rest;
                    event.extend(kwargs);
                    vec![Value::Object(event)]
                } else {
                    args
                };
                Command::Monitor {
                    events: decode_events(events, Some(op)),
                }
            }
            "C_SELECT" => Command::Control(ManualControl::Select {
                name: string_arg(&args, 0).ok_or_else(|| bad_argument(&command, "missing light name"))?,
            }),
            "C_DESELECT" => Command::Control(ManualControl::Deselect),
            "C_FOCUS" => Command::Control(ManualControl::Focus {
                field: string_arg(&args, 0),
            }),
            "C_PROPERTY" => Command::Control(ManualControl::Property {
                name: string_arg(&args, 0).unwrap_or_default(),
            }),
            "C_DURATION" => Command::Control(ManualControl::Duration {
                value: string_arg(&args, 0).unwrap_or_default(),
                unit: string_arg(&args, 1).unwrap_or_default(),
            }),
            "C_SAVE" => Command::Control(ManualControl::Save),
            "C_CANCEL" => Command::Control(ManualControl::Cancel),
            "QUIT" => Command::Quit,
            "ERROR" => Command::Error {
                code: string_value(kwargs.get("code")),
                argument: kwargs.get("argument").cloned().unwrap_or_default(),
                error: string_value(kwargs.get("error")),
            },
            "OK" => Command::Ok,
            "echo_response" => Command::Echo { args },
            _ => Command::Unknown {
                command: command.clone(),
            },
        };
        Ok(cmd)
    }
}

/// Decode every fixture on its own; a broken descriptor is logged and skipped.
fn decode_descriptors(values: Vec<Value>) -> Vec<FixtureDescriptor> {
    let mut fixtures = Vec::with_capacity(values.len());
    for value in values {
        match serde_json::from_value(value) {
            Ok(fixture) => fixtures.push(fixture),
            Err(err) => log::error!("[parser] Skipping light: {}", err),
        }
    }
    fixtures
}

/// Decode every event on its own; a broken event is logged and skipped.
fn decode_events(values: Vec<Value>, default_op: Option<&str>) -> Vec<MonitorEvent> {
    let mut events = Vec::with_capacity(values.len());
    for mut value in values {
        if let (Some(op), Value::Object(fields)) = (default_op, &mut value) {
            fields
                .entry("op")
                .or_insert_with(|| Value::String(op.to_string()));
        }
        match MonitorEvent::decode(value) {
            Ok(event) => events.push(event),
            Err(err) => log::error!("[parser] Skipping monitor event: {}", err),
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranges::{parse_gobo, RangeTable};

    #[test]
    fn test_lights_record() {
        let cmd = Command::decode(
            r#"{"command": "LIGHTS", "args": [{"name": "L1", "type": "mh", "functions": ["pan"],
                "state": {"pan": 3}, "speeds": {"pan": [0.5, 4]}, "enums": {}}],
                "kwargs": {"suspended": true}}"#,
        )
        .unwrap();
        match cmd {
            Command::Lights { fixtures, suspended } => {
                assert_eq!(fixtures.len(), 1);
                assert_eq!(fixtures[0].name, "L1");
                assert_eq!(fixtures[0].speeds["pan"], (0.5, 4.0));
                assert_eq!(suspended, Some(true));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_lights_keep_enum_order() {
        let cmd = Command::decode(
            r#"{"command": "LIGHTS", "args": [{"name": "L1", "functions": ["gobo"],
                "enums": {"gobo": {"zeta": [0, 20], "alpha": [10, 30]}}}]}"#,
        )
        .unwrap();
        let fixtures = match cmd {
            Command::Lights { fixtures, .. } => fixtures,
            other => panic!("unexpected {:?}", other),
        };
        let spec = &fixtures[0].enums["gobo"];
        let labels: Vec<_> = spec.entries.iter().map(|e| e.0.as_str()).collect();
        assert_eq!(labels, ["zeta", "alpha"]);

        let table = RangeTable::build(spec, parse_gobo);
        assert_eq!(table.lookup(15).unwrap().gobo, "alpha");
        assert_eq!(table.lookup(5).unwrap().gobo, "zeta");
    }

    #[test]
    fn test_lights_skip_broken_descriptor() {
        let cmd = Command::decode(
            r#"{"command": "LIGHTS", "args": [
                {"type": "mh", "functions": ["pan"]},
                {"name": "L2", "functions": "dim"},
                {"name": "L3", "type": "par", "functions": ["dim"]}
            ]}"#,
        )
        .unwrap();
        match cmd {
            Command::Lights { fixtures, suspended } => {
                let names: Vec<_> = fixtures.iter().map(|f| f.name.as_str()).collect();
                assert_eq!(names, ["L3"]);
                assert_eq!(suspended, None);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_type_key_and_defaults() {
        assert_eq!(Command::decode(r#"{"type": "QUIT"}"#).unwrap(), Command::Quit);
        assert_eq!(
            Command::decode(r#"{"command": "C_SELECT", "args": ["L2"]}"#).unwrap(),
            Command::Control(ManualControl::Select { name: "L2".to_string() })
        );
        assert_eq!(
            Command::decode(r#"{"command": "C_DURATION", "args": [5, "s"]}"#).unwrap(),
            Command::Control(ManualControl::Duration {
                value: "5".to_string(),
                unit: "s".to_string()
            })
        );
        assert_eq!(
            Command::decode(r#"{"command": "FROBNICATE"}"#).unwrap(),
            Command::Unknown { command: "FROBNICATE".to_string() }
        );
    }

    #[test]
    fn test_decode_failures() {
        assert!(matches!(Command::decode("{\"command\": "), Err(ParserError::Json(_))));
        assert!(matches!(Command::decode("{\"args\": []}"), Err(ParserError::MissingCommand)));
        assert!(matches!(Command::decode("[1, 2]"), Err(ParserError::Json(_))));
        assert!(matches!(
            Command::decode(r#"{"command": "MONITOR", "args": 4}"#),
            Err(ParserError::BadArgument { .. })
        ));
        assert!(matches!(
            Command::decode(r#"{"command": "C_SELECT"}"#),
            Err(ParserError::BadArgument { .. })
        ));
    }

    #[test]
    fn test_monitor_batch_isolates_bad_events() {
        let cmd = Command::decode(
            r#"{"command": "MONITOR", "args": [
                {"type": "MovingHead", "name": "L1", "op": "STATE", "op_state": null, "op_name": null, "state": {"dim": 255}},
                {"name": "L1", "op": "EFFECT", "op_state": "MAYBE", "op_name": "x", "state": {}},
                {"type": null, "name": null, "op": "AUDIO", "op_state": null, "op_name": null, "state": {"bins": [0.5, 1]}},
                {"type": null, "name": null, "op": "SUSPENDED", "op_state": true, "op_name": null, "state": {}},
                {"name": "L1", "op": "STATE_EFFECT", "op_state": "NEW", "op_name": "Blackout", "state": {}}
            ], "kwargs": {}}"#,
        )
        .unwrap();

        let events = match cmd {
            Command::Monitor { events } => events,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(events.len(), 4);
        assert_eq!(
            events[0],
            MonitorEvent::State {
                name: "L1".to_string(),
                state: [("dim".to_string(), 255)].into()
            }
        );
        assert_eq!(events[1], MonitorEvent::Audio { bins: vec![0.5, 1.0] });
        assert_eq!(events[2], MonitorEvent::Suspended { suspended: true });
        match &events[3] {
            MonitorEvent::Operation { name, event } => {
                assert_eq!(name, "L1");
                assert_eq!(event.kind, OpKind::StateEffect);
                assert_eq!(event.lifecycle, Lifecycle::New);
                assert_eq!(event.state, Operation::default());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_event_as_record() {
        let cmd = Command::decode(r#"{"type": "STATE", "name": "L1", "state": {"pan": 10}}"#).unwrap();
        assert_eq!(
            cmd,
            Command::Monitor {
                events: vec![MonitorEvent::State {
                    name: "L1".to_string(),
                    state: [("pan".to_string(), 10)].into()
                }]
            }
        );

        let cmd = Command::decode(
            r#"{"type": "EFFECT", "args": [{"name": "L1", "op_name": "fade", "op_state": "DONE",
                "state": {"start": 0, "end": 255, "done": 0, "duration": 1.5}}]}"#,
        )
        .unwrap();
        match cmd {
            Command::Monitor { events } => match &events[0] {
                MonitorEvent::Operation { event, .. } => {
                    assert_eq!(event.kind, OpKind::Effect);
                    assert_eq!(event.lifecycle, Lifecycle::Done);
                    assert_eq!(event.state.end, Some(255));
                }
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_error_record() {
        let cmd = Command::decode(
            r#"{"command": "ERROR", "args": [], "kwargs": {"code": "badcommand", "argument": "frob", "error": "Invalid command"}}"#,
        )
        .unwrap();
        assert_eq!(
            cmd,
            Command::Error {
                code: Some("badcommand".to_string()),
                argument: Value::String("frob".to_string()),
                error: Some("Invalid command".to_string()),
            }
        );
    }
}
