pub mod connection;
pub mod hashes;
pub mod keys;
pub mod lists;
pub mod server;
pub mod sets;
pub mod sorted_sets;
pub mod strings;
pub mod unsupported;

use rand::seq::{IteratorRandom, SliceRandom};
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error as ThisError;

use crate::dispatcher::Context;
use crate::frame::Frame;
use crate::grammar::{Args, Part};
use crate::zset::format_score;

/// Errors raised while parsing or running a command. They never escape the dispatcher: each one
/// is sent back to the client as an error reply and the connection stays usable.
#[derive(Debug, ThisError, PartialEq)]
pub enum CommandError {
    #[error("ERR unknown command '{command}', with args beginning with: {args}")]
    UnknownCommand { command: String, args: String },
    #[error("ERR unknown subcommand '{subcommand}'. Try {command} HELP.")]
    UnknownSubcommand { command: String, subcommand: String },
    #[error("ERR wrong number of arguments for '{0}' command")]
    WrongArity(String),
    #[error("ERR syntax error")]
    Syntax,
    #[error("ERR syntax error, unexpected '{0}'")]
    UnknownTerm(String),
    #[error("ERR Protocol error: expected a non-empty array of strings")]
    InvalidRequest,
    #[error("ERR invalid UTF-8 in command argument")]
    InvalidUtf8,
    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,
    #[error("ERR value is not an integer or out of range")]
    NotInteger,
    #[error("ERR value is not a valid float")]
    NotFloat,
    #[error("ERR increment or decrement would overflow")]
    Overflow,
    #[error("ERR min or max is not a float")]
    InvalidScoreRange,
    #[error("ERR min or max not valid string range item")]
    InvalidLexRange,
    #[error("ERR min is greater than max")]
    InvertedRange,
    #[error("ERR resulting score is not a number (NaN)")]
    NaNScore,
    #[error("ERR {0}")]
    OutOfRange(String),
    #[error("ERR invalid expire time in '{0}' command")]
    InvalidExpireTime(String),
    #[error("ERR no such key")]
    NoSuchKey,
    #[error("ERR index out of range")]
    IndexOutOfRange,
    #[error("ERR DB index is out of range")]
    InvalidDbIndex,
    #[error("ERR command '{0}' is not implemented")]
    NotImplemented(String),
    #[error("{0}")]
    Custom(String),
}

/// A command body. Handlers run with the keyspace locked and must not block.
pub type Handler = fn(&mut Context, &Args) -> crate::Result<Frame>;

pub struct Command {
    /// Upper case name; two word commands are stored as `"CLIENT SETNAME"`.
    pub name: &'static str,
    pub parts: Vec<Part>,
    pub handler: Handler,
}

/// Every command the server knows about, indexed by upper case name.
pub struct Registry {
    commands: HashMap<&'static str, Command>,
}

impl Registry {
    pub fn new() -> Registry {
        let mut registry = Registry {
            commands: HashMap::new(),
        };

        strings::register(&mut registry);
        lists::register(&mut registry);
        hashes::register(&mut registry);
        sets::register(&mut registry);
        sorted_sets::register(&mut registry);
        keys::register(&mut registry);
        server::register(&mut registry);
        connection::register(&mut registry);
        unsupported::register(&mut registry);

        registry
    }

    pub fn add(&mut self, name: &'static str, parts: Vec<Part>, handler: Handler) {
        self.commands.insert(
            name,
            Command {
                name,
                parts,
                handler,
            },
        );
    }

    /// Registers a command that accepts any arguments and always replies "not implemented".
    pub fn stub(&mut self, name: &'static str) {
        self.add(name, vec![Part::rest()], not_implemented);
    }

    pub fn get(&self, name: &str) -> Option<&Command> {
        self.commands.get(name)
    }

    /// Whether `name` is the first word of some two word command.
    pub fn has_subcommands(&self, name: &str) -> bool {
        self.commands
            .keys()
            .any(|k| k.split_once(' ').is_some_and(|(first, _)| first == name))
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

fn not_implemented(ctx: &mut Context, _args: &Args) -> crate::Result<Frame> {
    Err(CommandError::NotImplemented(ctx.command.to_string()).into())
}

pub(crate) fn parse_int<T: FromStr>(s: &str) -> Result<T, CommandError> {
    s.parse::<T>().map_err(|_| CommandError::NotInteger)
}

pub(crate) fn parse_float(s: &str) -> Result<f64, CommandError> {
    match s.parse::<f64>() {
        Ok(f) if !f.is_nan() => Ok(f),
        _ => Err(CommandError::NotFloat),
    }
}

/// A non-negative count, as taken by `LPOP key count` and friends.
pub(crate) fn parse_count(s: &str) -> Result<usize, CommandError> {
    let count: i64 = parse_int(s)?;
    usize::try_from(count)
        .map_err(|_| CommandError::OutOfRange("value is out of range, must be positive".into()))
}

/// `LIMIT offset count` as a pair of integers.
pub(crate) fn parse_limit(values: &[String]) -> Result<(i64, i64), CommandError> {
    match values {
        [offset, count] => Ok((parse_int(offset)?, parse_int(count)?)),
        _ => Err(CommandError::Syntax),
    }
}

/// Largest number of possibly repeated picks a negative count may ask for.
pub(crate) const MAX_REPEATED_SAMPLE: u64 = 1 << 24;

/// Picks `count` random elements of `items`: distinct ones when `count` is positive, possibly
/// repeated ones when it is negative. A positive count never yields more than `items.len()`.
pub(crate) fn random_sample<T: Clone>(items: &[T], count: i64) -> Result<Vec<T>, CommandError> {
    let mut rng = rand::thread_rng();
    if count >= 0 {
        let amount = usize::try_from(count).map_or(items.len(), |n| n.min(items.len()));
        return Ok(items.iter().cloned().choose_multiple(&mut rng, amount));
    }

    let amount = count.unsigned_abs();
    if amount > MAX_REPEATED_SAMPLE {
        return Err(CommandError::OutOfRange("value is out of range".into()));
    }
    if items.is_empty() {
        return Ok(Vec::new());
    }

    Ok((0..amount)
        .filter_map(|_| items.choose(&mut rng).cloned())
        .collect())
}

/// Member/score pairs as a flat array, with or without the scores.
pub(crate) fn scored_reply(entries: Vec<(String, f64)>, with_scores: bool) -> Frame {
    let mut frames = Vec::with_capacity(entries.len() * if with_scores { 2 } else { 1 });
    for (member, score) in entries {
        frames.push(Frame::bulk(member));
        if with_scores {
            frames.push(Frame::bulk(format_score(score)));
        }
    }
    Frame::Array(frames)
}

#[cfg(test)]
pub(crate) mod test_utils {
    use bytes::Bytes;
    use std::sync::Arc;

    use crate::clients::{ClientIds, Clients};
    use crate::dispatcher::Dispatcher;
    use crate::frame::Frame;
    use crate::store::Store;

    pub const CLIENT: &str = "127.0.0.1:50000";

    pub fn dispatcher() -> Dispatcher {
        let clients = Clients::new(Arc::new(ClientIds::new()));
        clients.register(CLIENT);
        Dispatcher::new(Store::new(), clients)
    }

    pub fn request(parts: &[&str]) -> Frame {
        Frame::Array(
            parts
                .iter()
                .map(|p| Frame::Bulk(Bytes::from(p.to_string())))
                .collect(),
        )
    }

    /// Sends a request split on whitespace.
    pub fn run(dispatcher: &Dispatcher, command: &str) -> Frame {
        let parts: Vec<&str> = command.split_whitespace().collect();
        dispatcher.dispatch(CLIENT, request(&parts))
    }

    pub fn bulk(s: &str) -> Frame {
        Frame::Bulk(Bytes::from(s.to_string()))
    }

    pub fn bulks(items: &[&str]) -> Frame {
        Frame::Array(items.iter().map(|s| bulk(s)).collect())
    }

    pub fn ok() -> Frame {
        Frame::Simple("OK".to_string())
    }

    /// Sorts the elements of an array reply, for commands without a defined order.
    pub fn sorted(frame: Frame) -> Frame {
        match frame {
            Frame::Array(mut items) => {
                items.sort_by_key(|f| f.to_string());
                Frame::Array(items)
            }
            other => other,
        }
    }

    pub fn is_error(frame: &Frame) -> bool {
        matches!(frame, Frame::Error(_))
    }
}
