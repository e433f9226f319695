use itertools::Itertools;
use std::sync::Arc;
use tracing::debug;

use crate::clients::Clients;
use crate::commands::{CommandError, Registry};
use crate::frame::Frame;
use crate::grammar;
use crate::store::{Db, State, Store};

/// What a handler gets to see of the server while it runs.
pub struct Context<'a> {
    pub state: &'a mut State,
    /// The database selected by the calling connection.
    pub db_index: usize,
    /// Stable key of the calling connection.
    pub client: &'a str,
    pub clients: &'a Clients,
    pub registry: &'a Registry,
    /// Upper case name of the running command.
    pub command: &'static str,
}

impl Context<'_> {
    pub fn db(&mut self) -> Result<&mut Db, CommandError> {
        self.state.db(self.db_index)
    }
}

/// Routes requests to command handlers. Cloning is cheap; every clone shares the same keyspace,
/// client table and command registry.
#[derive(Clone)]
pub struct Dispatcher {
    store: Store,
    clients: Clients,
    registry: Arc<Registry>,
}

impl Dispatcher {
    pub fn new(store: Store, clients: Clients) -> Dispatcher {
        Dispatcher {
            store,
            clients,
            registry: Arc::new(Registry::new()),
        }
    }

    pub fn clients(&self) -> &Clients {
        &self.clients
    }

    /// Runs one request on behalf of `client` and returns the reply. Failures of any kind are
    /// turned into error replies here.
    pub fn dispatch(&self, client: &str, request: Frame) -> Frame {
        match self.execute(client, request) {
            Ok(frame) => frame,
            Err(e) => {
                debug!("Command failed: {}", e);
                Frame::Error(e.to_string())
            }
        }
    }

    fn execute(&self, client: &str, request: Frame) -> crate::Result<Frame> {
        let mut tokens = tokens(request)?;
        if tokens.is_empty() {
            return Err(CommandError::InvalidRequest.into());
        }

        let name = tokens[0].to_uppercase();
        let two_words = tokens
            .get(1)
            .map(|sub| format!("{} {}", name, sub.to_uppercase()))
            .and_then(|n| self.registry.get(&n));

        let (command, skip) = match two_words {
            Some(command) => (command, 2),
            None => match self.registry.get(&name) {
                Some(command) => (command, 1),
                None if self.registry.has_subcommands(&name) => {
                    return Err(CommandError::UnknownSubcommand {
                        subcommand: tokens.get(1).cloned().unwrap_or_default(),
                        command: name,
                    }
                    .into())
                }
                None => {
                    return Err(CommandError::UnknownCommand {
                        args: tokens[1..].iter().map(|t| format!("'{}'", t)).join(" "),
                        command: tokens[0].clone(),
                    }
                    .into())
                }
            },
        };

        let args = grammar::parse(command.name, &command.parts, tokens.split_off(skip))?;

        let mut state = self.store.lock();
        let mut ctx = Context {
            state: &mut state,
            db_index: self.clients.selected_db(client),
            client,
            clients: &self.clients,
            registry: &self.registry,
            command: command.name,
        };

        (command.handler)(&mut ctx, &args)
    }
}

/// The strings of a request array.
fn tokens(request: Frame) -> Result<Vec<String>, CommandError> {
    let Frame::Array(frames) = request else {
        return Err(CommandError::InvalidRequest);
    };

    frames
        .into_iter()
        .map(|frame| match frame {
            Frame::Simple(s) => Ok(s),
            Frame::Bulk(bytes) => {
                String::from_utf8(bytes.to_vec()).map_err(|_| CommandError::InvalidUtf8)
            }
            Frame::Integer(i) => Ok(i.to_string()),
            _ => Err(CommandError::InvalidRequest),
        })
        .collect()
}
