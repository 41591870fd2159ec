//! The Dispatcher applies decoded commands to the fixture registry.

use std::collections::BTreeMap;

use log::{debug, info, trace, warn};
use thiserror::Error;
use tokio::sync::watch;

use crate::fixture::{Fixture, FixtureDescriptor, OutputId};
use crate::output::{ControlSink, LightStatus, MovingHeadOutput, MovingHeadView, StatusMessage, TableOutput};
use crate::parser::{Command, ManualControl, MonitorEvent, ParserError};

mod registry;
pub use self::registry::FixtureRegistry;

/// Result type for dispatching a raw record.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Only decoding can fail. Events naming unknown fixtures are not errors.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error(transparent)]
    Parser(#[from] ParserError),
}

/// What handling a command did to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Something changed.
    Applied,
    /// Nothing to do: unknown fixture, unknown command or a plain acknowledgement.
    Ignored,
    /// The session ended and the registry is empty now.
    Reset,
}

/// Routes commands to fixtures and collaborators.
pub struct Dispatcher {
    /// Fixtures of the current session.
    registry: FixtureRegistry,
    /// Moving head observer of each fixture that has one.
    heads: BTreeMap<String, OutputId>,
    /// Overview of every fixture announced so far.
    table: Option<TableOutput>,
    /// Receiver for audio, suspension and operator form traffic.
    control: Box<dyn ControlSink>,
    /// Snapshot bus for outside watchers.
    status: Option<watch::Sender<StatusMessage>>,
    /// Token of the current session.
    session: String,
    suspended: bool,
}

impl Dispatcher {
    pub fn new(control: Box<dyn ControlSink>) -> Dispatcher {
        Dispatcher {
            registry: FixtureRegistry::new(),
            heads: BTreeMap::new(),
            table: None,
            control,
            status: None,
            session: String::new(),
            suspended: false,
        }
    }

    /// Publish a registry snapshot after every change.
    pub fn with_status(mut self, sender: watch::Sender<StatusMessage>) -> Dispatcher {
        self.status = Some(sender);
        self
    }

    pub fn set_session(&mut self, token: &str) {
        self.session = token.to_string();
    }

    pub fn registry(&self) -> &FixtureRegistry {
        &self.registry
    }

    pub fn table(&self) -> Option<&TableOutput> {
        self.table.as_ref()
    }

    pub fn suspended(&self) -> bool {
        self.suspended
    }

    /// Current view of a moving head, if the fixture has one.
    pub fn moving_head(&self, name: &str) -> Option<&MovingHeadView> {
        let id = self.heads.get(name)?;
        self.registry
            .get(name)?
            .output::<MovingHeadOutput>(*id)
            .map(MovingHeadOutput::view)
    }

    /// Decode a record and handle it.
    pub fn take_record(&mut self, line: &str) -> DispatchResult<Outcome> {
        let cmd = Command::decode(line)?;
        Ok(self.handle(cmd))
    }

    /// Apply one command.
    pub fn handle(&mut self, cmd: Command) -> Outcome {
        let outcome = match cmd {
            Command::Lights {
                fixtures,
                suspended,
            } => {
                self.take_lights(fixtures);
                if let Some(suspended) = suspended {
                    self.set_suspended(suspended);
                }
                Outcome::Applied
            }
            Command::Monitor { events } => {
                let mut outcome = Outcome::Ignored;
                for event in events {
                    if self.take_event(event) == Outcome::Applied {
                        outcome = Outcome::Applied;
                    }
                }
                outcome
            }
            Command::Control(control) => self.take_control(control),
            Command::Quit => {
                info!("[dispatch] Session ended by the server");
                self.reset();
                Outcome::Reset
            }
            Command::Error {
                code,
                argument,
                error,
            } => {
                warn!("[dispatch] Server error {:?} ({}): {:?}", code, argument, error);
                Outcome::Ignored
            }
            Command::Ok => {
                debug!("[dispatch] OK");
                Outcome::Ignored
            }
            Command::Echo { args } => {
                debug!("[dispatch] Echo: {:?}", args);
                Outcome::Ignored
            }
            Command::Unknown { command } => {
                warn!("[dispatch] Unknown command type {}", command);
                Outcome::Ignored
            }
        };

        if outcome == Outcome::Applied {
            self.publish_status();
        }
        outcome
    }

    /// Create or replace fixtures by name and rebuild the table over all of them.
    fn take_lights(&mut self, descriptors: Vec<FixtureDescriptor>) {
        // Row observers have to go before any fixture is swapped out.
        if let Some(table) = self.table.take() {
            for (name, id) in table.output_ids() {
                if let Some(fixture) = self.registry.get_mut(&name) {
                    if let Some(mut output) = fixture.unsubscribe(id) {
                        output.destroy();
                    }
                }
            }
        }

        for descriptor in descriptors {
            let mut fixture = Fixture::new(descriptor);
            if MovingHeadOutput::applies_to(&fixture) {
                let output = MovingHeadOutput::new(&fixture);
                let id = fixture.subscribe(Box::new(output));
                self.heads.insert(fixture.name.clone(), id);
            } else {
                self.heads.remove(&fixture.name);
            }
            if self.registry.insert(fixture).is_some() {
                debug!("[dispatch] Replaced a fixture");
            }
        }

        self.table = Some(TableOutput::new(self.registry.iter_mut()));
        info!("[dispatch] {} fixtures known", self.registry.len());
    }

    fn take_event(&mut self, event: MonitorEvent) -> Outcome {
        match event {
            MonitorEvent::State { name, state } => match self.registry.get_mut(&name) {
                Some(fixture) => {
                    fixture.patch(&state);
                    self.control.state(&name, &state);
                    Outcome::Applied
                }
                None => {
                    trace!("[dispatch] State for unknown fixture {}", name);
                    Outcome::Ignored
                }
            },
            MonitorEvent::Operation { name, event } => match self.registry.get_mut(&name) {
                Some(fixture) => {
                    fixture.apply_operation(&event);
                    Outcome::Applied
                }
                None => {
                    trace!("[dispatch] {:?} for unknown fixture {}", event.kind, name);
                    Outcome::Ignored
                }
            },
            MonitorEvent::Audio { bins } => {
                self.control.audio(&bins);
                Outcome::Ignored
            }
            MonitorEvent::Suspended { suspended } => {
                self.set_suspended(suspended);
                Outcome::Applied
            }
            MonitorEvent::Other { op } => {
                debug!("[dispatch] Unhandled monitor op {}", op);
                Outcome::Ignored
            }
        }
    }

    fn take_control(&mut self, control: ManualControl) -> Outcome {
        match &control {
            ManualControl::Select { name } => {
                self.deselect_all();
                match self.registry.get_mut(name) {
                    Some(fixture) => fixture.set_selected(true),
                    None => {
                        trace!("[dispatch] Select for unknown fixture {}", name);
                        return Outcome::Applied;
                    }
                }
            }
            ManualControl::Deselect => self.deselect_all(),
            _ => {}
        }
        self.control.control(&control);
        Outcome::Applied
    }

    fn deselect_all(&mut self) {
        for fixture in self.registry.iter_mut() {
            if fixture.is_selected() {
                fixture.set_selected(false);
            }
        }
    }

    fn set_suspended(&mut self, suspended: bool) {
        self.suspended = suspended;
        self.control.suspended(suspended);
    }

    /// Tear down every fixture and observer.
    pub fn reset(&mut self) {
        self.table = None;
        self.heads.clear();
        self.registry.clear();
        self.control.reset();
        self.publish_status();
    }

    /// Snapshot of the registry.
    pub fn status(&self) -> StatusMessage {
        StatusMessage {
            session: self.session.clone(),
            suspended: self.suspended,
            lights: self.registry.iter().map(LightStatus::from_fixture).collect(),
        }
    }

    fn publish_status(&self) {
        if let Some(sender) = &self.status {
            // Nobody watching is fine.
            sender.send(self.status()).ok();
        }
    }
}
