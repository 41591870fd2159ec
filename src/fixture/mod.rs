//! Live model of a single lighting fixture.

use std::any::Any;
use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::ranges::RangeSpec;

pub mod effects;
pub use self::effects::{EffectRegistry, Lifecycle, OpKind, Operation};

/// Channel name -> raw value.
pub type ChannelState = BTreeMap<String, i64>;

/// Fixture metadata as announced by a `LIGHTS` command.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct FixtureDescriptor {
    /// Fixture model, e.g. `MovingHead`.
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Unique name for the lifetime of a session.
    pub name: String,
    /// Supported channels.
    #[serde(default)]
    pub functions: Vec<String>,
    /// Initial channel values.
    #[serde(default, deserialize_with = "channel_state")]
    pub state: ChannelState,
    /// Channel -> transition time bounds `[min, max]`, scaled by the `speed` channel.
    #[serde(default)]
    pub speeds: BTreeMap<String, (f64, f64)>,
    /// Channel -> label ranges for enumerated channels (`color`, `gobo`).
    #[serde(default)]
    pub enums: BTreeMap<String, RangeSpec>,
}

/// Decode a channel map, keeping numeric values only. Floats are truncated.
pub fn channel_state<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ChannelState, D::Error> {
    let raw = Option::<BTreeMap<String, serde_json::Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(raw
        .into_iter()
        .filter_map(|(channel, value)| {
            let value = value.as_i64().or_else(|| value.as_f64().map(|f| f as i64))?;
            Some((channel, value))
        })
        .collect())
}

/// Operation lifecycle event for one fixture.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct OpEvent {
    pub kind: OpKind,
    pub op_name: String,
    pub lifecycle: Lifecycle,
    pub state: Operation,
}

/// Renderers observing a fixture.
///
/// Observers are notified synchronously, in the order they were attached.
pub trait Output {
    /// Redraw from the current fixture state.
    fn render(&mut self, fixture: &Fixture);
    /// An operation started or finished. `render` follows right after.
    fn monitor_event(&mut self, _fixture: &Fixture, _event: &OpEvent) {}
    /// The fixture is going away.
    fn destroy(&mut self) {}
    /// Access to the concrete output, for callers that know what they attached.
    fn as_any(&self) -> &dyn Any;
}

/// Handle returned by `Fixture::subscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputId(usize);

/// A fixture's metadata, mutable channel state, running operations and observers.
pub struct Fixture {
    pub name: String,
    pub kind: String,
    pub functions: Vec<String>,
    pub speeds: BTreeMap<String, (f64, f64)>,
    pub enums: BTreeMap<String, RangeSpec>,
    state: ChannelState,
    effects: EffectRegistry,
    selected: bool,
    outputs: Vec<(OutputId, Box<dyn Output>)>,
    next_output: usize,
}

impl Fixture {
    /// Build a fixture from its descriptor. Initial values for channels the
    /// fixture does not support are dropped.
    pub fn new(descriptor: FixtureDescriptor) -> Fixture {
        let FixtureDescriptor {
            kind,
            name,
            functions,
            state,
            speeds,
            enums,
        } = descriptor;

        let state = state
            .into_iter()
            .filter(|(channel, _)| functions.contains(channel))
            .collect();

        Fixture {
            name,
            kind,
            functions,
            speeds,
            enums,
            state,
            effects: EffectRegistry::new(),
            selected: false,
            outputs: vec![],
            next_output: 0,
        }
    }

    pub fn has_function(&self, channel: &str) -> bool {
        self.functions.iter().any(|f| f == channel)
    }

    /// True if the fixture supports every channel in `channels`.
    pub fn has_functions(&self, channels: &[&str]) -> bool {
        channels.iter().all(|c| self.has_function(c))
    }

    pub fn state(&self) -> &ChannelState {
        &self.state
    }

    pub fn channel(&self, channel: &str) -> Option<i64> {
        self.state.get(channel).copied()
    }

    pub fn effects(&self) -> &EffectRegistry {
        &self.effects
    }

    pub fn is_selected(&self) -> bool {
        self.selected
    }

    /// Merge new channel values and re-render.
    ///
    /// Values are stored as given, out-of-range numbers included. Channels the
    /// fixture does not support are ignored. Returns the number of values taken.
    pub fn patch(&mut self, delta: &ChannelState) -> usize {
        let mut taken = 0;
        for (channel, value) in delta {
            if self.has_function(channel) {
                self.state.insert(channel.clone(), *value);
                taken += 1;
            }
        }
        self.render();
        taken
    }

    /// Record an operation lifecycle event and let the observers know.
    pub fn apply_operation(&mut self, event: &OpEvent) {
        self.effects
            .apply(event.kind, &event.op_name, event.lifecycle, event.state.clone());

        let mut outputs = std::mem::take(&mut self.outputs);
        for (_, output) in outputs.iter_mut() {
            output.monitor_event(self, event);
            output.render(self);
        }
        self.outputs = outputs;
    }

    pub fn set_selected(&mut self, selected: bool) {
        self.selected = selected;
        self.render();
    }

    /// Attach an observer. It renders once straight away.
    pub fn subscribe(&mut self, mut output: Box<dyn Output>) -> OutputId {
        let id = OutputId(self.next_output);
        self.next_output += 1;
        output.render(self);
        self.outputs.push((id, output));
        id
    }

    /// Detach an observer, handing it back to the caller.
    pub fn unsubscribe(&mut self, id: OutputId) -> Option<Box<dyn Output>> {
        let index = self.outputs.iter().position(|(output_id, _)| *output_id == id)?;
        Some(self.outputs.remove(index).1)
    }

    /// Look up an attached observer by its concrete type.
    pub fn output<T: Output + 'static>(&self, id: OutputId) -> Option<&T> {
        self.outputs
            .iter()
            .find(|(output_id, _)| *output_id == id)
            .and_then(|(_, output)| output.as_any().downcast_ref::<T>())
    }

    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    /// Notify every observer of the current state.
    pub fn render(&mut self) {
        let mut outputs = std::mem::take(&mut self.outputs);
        for (_, output) in outputs.iter_mut() {
            output.render(self);
        }
        self.outputs = outputs;
    }

    /// Release every observer.
    pub fn destroy(&mut self) {
        for (_, mut output) in self.outputs.drain(..) {
            output.destroy();
        }
        self.effects.clear();
    }
}

impl std::fmt::Debug for Fixture {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Fixture")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("state", &self.state)
            .field("effects", &self.effects)
            .field("outputs", &self.outputs.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Records what it was told, in order, into a shared log.
    struct Recorder {
        tag: &'static str,
        log: Rc<RefCell<Vec<String>>>,
    }

    impl Output for Recorder {
        fn render(&mut self, fixture: &Fixture) {
            self.log
                .borrow_mut()
                .push(format!("{} {:?}", self.tag, fixture.channel("dim")));
        }

        fn monitor_event(&mut self, _fixture: &Fixture, event: &OpEvent) {
            self.log.borrow_mut().push(format!("{} op {}", self.tag, event.op_name));
        }

        fn destroy(&mut self) {
            self.log.borrow_mut().push(format!("{} destroyed", self.tag));
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn par() -> Fixture {
        let descriptor: FixtureDescriptor = serde_json::from_str(
            r#"{"type": "RGBPar", "name": "par1", "functions": ["dim", "red"],
                "state": {"dim": 10, "red": 0, "uv": 99}}"#,
        )
        .unwrap();
        Fixture::new(descriptor)
    }

    #[test]
    fn test_initial_state_drops_unknown_channels() {
        let fixture = par();
        assert_eq!(fixture.channel("dim"), Some(10));
        assert_eq!(fixture.channel("uv"), None);
        assert_eq!(fixture.kind, "RGBPar");
    }

    #[test]
    fn test_patch_merges_and_passes_through() {
        let mut fixture = par();
        let delta: ChannelState = [("dim".to_string(), 300), ("pan".to_string(), 5)].into();
        assert_eq!(fixture.patch(&delta), 1);
        assert_eq!(fixture.channel("dim"), Some(300));
        assert_eq!(fixture.channel("red"), Some(0));
        assert_eq!(fixture.channel("pan"), None);
    }

    #[test]
    fn test_observers_in_registration_order() {
        let log = Rc::new(RefCell::new(vec![]));
        let mut fixture = par();
        fixture.subscribe(Box::new(Recorder { tag: "a", log: log.clone() }));
        let b = fixture.subscribe(Box::new(Recorder { tag: "b", log: log.clone() }));
        log.borrow_mut().clear();

        fixture.patch(&[("dim".to_string(), 20)].into());
        fixture.apply_operation(&OpEvent {
            kind: OpKind::Effect,
            op_name: "fade".to_string(),
            lifecycle: Lifecycle::New,
            state: Operation::default(),
        });
        assert!(fixture.unsubscribe(b).is_some());
        fixture.destroy();

        assert_eq!(
            *log.borrow(),
            [
                "a Some(20)",
                "b Some(20)",
                "a op fade",
                "a Some(20)",
                "b op fade",
                "b Some(20)",
                "a destroyed",
            ]
        );
        assert_eq!(fixture.output_count(), 0);
    }

    #[test]
    fn test_output_downcast() {
        let log = Rc::new(RefCell::new(vec![]));
        let mut fixture = par();
        let id = fixture.subscribe(Box::new(Recorder { tag: "x", log }));
        assert_eq!(fixture.output::<Recorder>(id).unwrap().tag, "x");
    }

    #[test]
    fn test_descriptor_defaults() {
        let descriptor: FixtureDescriptor = serde_json::from_str(r#"{"name": "bare"}"#).unwrap();
        assert!(descriptor.functions.is_empty());
        assert!(descriptor.enums.is_empty());
        assert!(serde_json::from_str::<FixtureDescriptor>(r#"{"type": "x"}"#).is_err());
    }
}
