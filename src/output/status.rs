//! Registry snapshots for watchers outside the session loop.

use std::time::Duration;

use log::info;
use serde::Serialize;
use tokio::sync::watch::Receiver;

use crate::fixture::{ChannelState, Fixture, OpKind};

#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct StatusMessage {
    /// Token of the epoch the snapshot belongs to.
    pub session: String,
    pub suspended: bool,
    pub lights: Vec<LightStatus>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct LightStatus {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub state: ChannelState,
    pub effects: Vec<String>,
    pub state_effects: Vec<String>,
    pub selected: bool,
}

impl LightStatus {
    pub fn from_fixture(fixture: &Fixture) -> LightStatus {
        LightStatus {
            name: fixture.name.clone(),
            kind: fixture.kind.clone(),
            state: fixture.state().clone(),
            effects: fixture.effects().lines(OpKind::Effect),
            state_effects: fixture.effects().lines(OpKind::StateEffect),
            selected: fixture.is_selected(),
        }
    }
}

impl StatusMessage {
    /// Operations running across all fixtures.
    pub fn running(&self) -> usize {
        self.lights
            .iter()
            .map(|light| light.effects.len() + light.state_effects.len())
            .sum()
    }
}

/// Log a one-line summary whenever the status changed, at most once per `interval`.
pub async fn log_status(mut receiver: Receiver<StatusMessage>, interval: Duration) {
    while receiver.changed().await.is_ok() {
        let line = {
            let status = receiver.borrow_and_update();
            format!(
                "[status] session {}: {} lights, {} operations running{}",
                status.session,
                status.lights.len(),
                status.running(),
                if status.suspended { ", suspended" } else { "" }
            )
        };
        info!("{}", line);
        tokio::time::sleep(interval).await;
    }
}
