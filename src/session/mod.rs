//! The session loop ties a transport to the parser and the dispatcher.
//!
//! A session lives through any number of epochs. An epoch ends when the
//! connection is lost or the server sends QUIT. Either way the registry is torn
//! down, a new client token is drawn and everything still in flight from the
//! old connection is dropped.

use std::io;
use std::mem;

use crossbeam_channel::unbounded;
use log::{debug, error, info, warn};
use tokio::sync::watch;

use crate::config::Root;
use crate::dispatcher::{Dispatcher, Outcome};
use crate::output::StatusMessage;
use crate::parser::CommandParser;
use crate::transport::{start_transport_thread, Epoch, StreamMessage};

/// Client tokens are drawn from `0..TOKEN_RANGE`.
const TOKEN_RANGE: u32 = 1 << 20;

pub struct Session {
    parser: CommandParser,
    dispatcher: Dispatcher,
    epochs: watch::Sender<Epoch>,
    epoch: Epoch,
}

fn new_token() -> String {
    rand::random_range(0..TOKEN_RANGE).to_string()
}

impl Session {
    pub fn new(mut dispatcher: Dispatcher) -> Session {
        let epoch = Epoch {
            id: 1,
            token: new_token(),
        };
        dispatcher.set_session(&epoch.token);
        let (epochs, _) = watch::channel(epoch.clone());

        Session {
            parser: CommandParser::new(),
            dispatcher,
            epochs,
            epoch,
        }
    }

    /// Follow epoch changes, e.g. from a transport.
    pub fn subscribe(&self) -> watch::Receiver<Epoch> {
        self.epochs.subscribe()
    }

    pub fn epoch(&self) -> &Epoch {
        &self.epoch
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Handle one message from the transport.
    pub fn take_message(&mut self, message: StreamMessage) {
        if message.epoch() != self.epoch.id {
            debug!(
                "[session] Dropping message from epoch {} (current {})",
                message.epoch(),
                self.epoch.id
            );
            return;
        }

        match message {
            StreamMessage::Delivery { total, .. } => {
                self.parser.take_total(&total);
                self.dispatch();
            }
            StreamMessage::Chunk { data, .. } => {
                self.parser.take_chunk(&data);
                self.dispatch();
            }
            StreamMessage::Completed { .. } => self.parser.finish(),
            StreamMessage::Disconnected { .. } => {
                warn!("[session] Connection lost, starting over.");
                self.reset();
            }
        }
    }

    /// Run the commands framed by the last message, in order.
    fn dispatch(&mut self) {
        let cmds = mem::take(&mut self.parser.cmds);
        for cmd in cmds {
            if self.dispatcher.handle(cmd) == Outcome::Reset {
                info!("[session] Server ended session {}.", self.epoch.token);
                self.reset();
                // The rest belongs to the session that just ended.
                return;
            }
        }
    }

    /// Tear everything down and move to a new epoch.
    pub fn reset(&mut self) {
        self.dispatcher.reset();
        self.parser.reset();

        self.epoch = Epoch {
            id: self.epoch.id + 1,
            token: new_token(),
        };
        self.dispatcher.set_session(&self.epoch.token);
        debug!("[session] Epoch {} with token {}", self.epoch.id, self.epoch.token);
        // No subscribers yet is fine.
        self.epochs.send_replace(self.epoch.clone());
    }
}

/// Read the configured stream and feed it to `dispatcher` until the transport stops.
pub fn run(config: &Root, dispatcher: Dispatcher) -> io::Result<()> {
    let (sender, receiver) = unbounded::<StreamMessage>();
    let (status_sender, status_receiver) = watch::channel(StatusMessage::default());

    let mut session = Session::new(dispatcher.with_status(status_sender));
    let transport_handle = start_transport_thread(
        &config.monitor,
        sender,
        session.subscribe(),
        status_receiver,
    );

    // Ends once the transport thread drops its sender.
    for message in receiver.iter() {
        session.take_message(message);
    }

    transport_handle.join().map_err(|_| {
        error!("[session] Transport thread panicked.");
        io::Error::new(io::ErrorKind::Other, "transport thread panicked")
    })
}
