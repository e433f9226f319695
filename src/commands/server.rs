//! Administrative commands: databases, runtime configuration and server introspection.

use itertools::Itertools;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::commands::keys::parse_db;
use crate::commands::Registry;
use crate::dispatcher::Context;
use crate::frame::Frame;
use crate::grammar::{Args, Part};

const VERSION: &str = "7.2.4";

pub fn register(registry: &mut Registry) {
    registry.add("DBSIZE", vec![], dbsize);
    registry.add("FLUSHDB", vec![Part::flags(&["ASYNC", "SYNC"])], flushdb);
    registry.add("FLUSHALL", vec![Part::flags(&["ASYNC", "SYNC"])], flushall);
    registry.add(
        "SWAPDB",
        vec![Part::value("index1"), Part::value("index2")],
        swapdb,
    );
    registry.add("TIME", vec![], time);
    registry.add("INFO", vec![Part::rest()], info);
    registry.add("CONFIG GET", vec![Part::list(1)], config_get);
    registry.add("CONFIG SET", vec![Part::list(2)], config_set);
    registry.add("COMMAND COUNT", vec![], command_count);
}

fn dbsize(ctx: &mut Context, _args: &Args) -> crate::Result<Frame> {
    Ok(Frame::Integer(ctx.db()?.len() as i64))
}

/// Deletes every key of the selected database. `ASYNC` and `SYNC` are accepted; both flush
/// right away.
fn flushdb(ctx: &mut Context, _args: &Args) -> crate::Result<Frame> {
    ctx.db()?.clear();
    Ok(Frame::ok())
}

fn flushall(ctx: &mut Context, _args: &Args) -> crate::Result<Frame> {
    ctx.state.flush_all();
    Ok(Frame::ok())
}

/// Swaps two databases. Connections keep their selected index, so they see the other
/// database's data from now on.
///
/// Ref: <https://redis.io/docs/latest/commands/swapdb/>
fn swapdb(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let a = parse_db(args.value("index1"))?;
    let b = parse_db(args.value("index2"))?;

    ctx.state.swap(a, b)?;
    Ok(Frame::ok())
}

/// The current server time as a two element array: Unix seconds and the microseconds elapsed
/// in the current second.
fn time(_ctx: &mut Context, _args: &Args) -> crate::Result<Frame> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();

    Ok(Frame::Array(vec![
        Frame::bulk(now.as_secs().to_string()),
        Frame::bulk(now.subsec_micros().to_string()),
    ]))
}

/// Returns information and statistics about the server, in the `# Section` / `field:value`
/// format Redis clients parse. Without arguments every section is returned.
///
/// Ref: <https://redis.io/docs/latest/commands/info/>
fn info(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let wanted: Vec<String> = args.list().iter().map(|s| s.to_lowercase()).collect();
    let everything = wanted.is_empty()
        || wanted
            .iter()
            .any(|s| matches!(s.as_str(), "all" | "everything" | "default"));

    let config = ctx.state.config();
    let port = config.value("port").unwrap_or_default().to_string();
    let maxclients = config.value("maxclients").unwrap_or_default().to_string();

    let keyspace = ctx
        .state
        .keyspace()
        .into_iter()
        .map(|(index, keys, expires)| {
            format!("db{}:keys={},expires={},avg_ttl=0", index, keys, expires)
        })
        .join("\r\n");

    let sections = [
        (
            "server",
            format!(
                "redis_version:{}\r\nredis_mode:standalone\r\nos:{}\r\narch_bits:{}\r\n\
                 process_id:{}\r\ntcp_port:{}",
                VERSION,
                std::env::consts::OS,
                usize::BITS,
                std::process::id(),
                port
            ),
        ),
        (
            "clients",
            format!(
                "connected_clients:{}\r\nmaxclients:{}",
                ctx.clients.len(),
                maxclients
            ),
        ),
        ("persistence", "loading:0\r\naof_enabled:0".to_string()),
        ("replication", "role:master\r\nconnected_slaves:0".to_string()),
        ("keyspace", keyspace),
    ];

    let body = sections
        .iter()
        .filter(|(name, _)| everything || wanted.iter().any(|w| w.as_str() == *name))
        .map(|(name, fields)| {
            let mut title = name.to_string();
            title[..1].make_ascii_uppercase();
            if fields.is_empty() {
                format!("# {}\r\n", title)
            } else {
                format!("# {}\r\n{}\r\n", title, fields)
            }
        })
        .join("\r\n");

    Ok(Frame::bulk(body))
}

/// Reads runtime configuration parameters matching any of the given glob patterns, as a flat
/// `name, value` array.
///
/// Ref: <https://redis.io/docs/latest/commands/config-get/>
fn config_get(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let config = ctx.state.config();

    let entries: Vec<String> = args
        .list()
        .iter()
        .flat_map(|pattern| config.get(pattern))
        .unique_by(|(name, _)| name.clone())
        .flat_map(|(name, value)| [name, value])
        .collect();

    Ok(Frame::bulk_array(entries))
}

/// Sets runtime configuration parameters. Either every pair is applied or, when one names an
/// unknown parameter, none is.
fn config_set(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let mut config = ctx.state.config().clone();
    for (name, value) in args.list().iter().tuples() {
        config.set(name, value)?;
    }

    *ctx.state.config_mut() = config;
    Ok(Frame::ok())
}

fn command_count(ctx: &mut Context, _args: &Args) -> crate::Result<Frame> {
    Ok(Frame::Integer(ctx.registry.len() as i64))
}

#[cfg(test)]
mod tests {
    use crate::commands::test_utils::*;
    use crate::frame::Frame;

    fn info_text(frame: Frame) -> String {
        match frame {
            Frame::Bulk(bytes) => String::from_utf8(bytes.to_vec()).unwrap(),
            other => panic!("unexpected reply {:?}", other),
        }
    }

    #[test]
    fn flush_and_size() {
        let d = dispatcher();
        run(&d, "MSET a 1 b 2");
        run(&d, "SELECT 1");
        run(&d, "SET c 3");

        assert_eq!(run(&d, "DBSIZE"), Frame::Integer(1));
        assert_eq!(run(&d, "FLUSHDB"), ok());
        assert_eq!(run(&d, "DBSIZE"), Frame::Integer(0));

        run(&d, "SELECT 0");
        assert_eq!(run(&d, "DBSIZE"), Frame::Integer(2));
        assert_eq!(run(&d, "FLUSHALL ASYNC"), ok());
        assert_eq!(run(&d, "DBSIZE"), Frame::Integer(0));
        assert!(is_error(&run(&d, "FLUSHALL ASYNC SYNC")));
    }

    #[test]
    fn swapdb() {
        let d = dispatcher();
        run(&d, "SET k v");

        assert_eq!(run(&d, "SWAPDB 0 3"), ok());
        assert_eq!(run(&d, "EXISTS k"), Frame::Integer(0));
        run(&d, "SELECT 3");
        assert_eq!(run(&d, "GET k"), bulk("v"));
        assert_eq!(
            run(&d, "SWAPDB 0 16"),
            Frame::Error("ERR DB index is out of range".to_string())
        );
    }

    #[test]
    fn time() {
        let d = dispatcher();

        match run(&d, "TIME") {
            Frame::Array(parts) => assert_eq!(parts.len(), 2),
            other => panic!("unexpected reply {:?}", other),
        }
    }

    #[test]
    fn info_sections() {
        let d = dispatcher();
        run(&d, "SET a 1");
        run(&d, "SET b 2 EX 100");

        let all = info_text(run(&d, "INFO"));
        assert!(all.contains("# Server\r\n"));
        assert!(all.contains("redis_version:"));
        assert!(all.contains("connected_clients:1"));
        assert!(all.contains("db0:keys=2,expires=1,avg_ttl=0"));

        let keyspace = info_text(run(&d, "INFO keyspace"));
        assert!(keyspace.starts_with("# Keyspace\r\n"));
        assert!(!keyspace.contains("# Server"));
    }

    #[test]
    fn config() {
        let d = dispatcher();

        assert_eq!(
            run(&d, "CONFIG GET maxclients"),
            bulks(&["maxclients", "10000"])
        );
        assert_eq!(run(&d, "CONFIG SET maxclients 5 appendonly yes"), ok());
        assert_eq!(
            run(&d, "CONFIG GET max* appendonly maxclients"),
            bulks(&["maxclients", "5", "appendonly", "yes"])
        );
        assert_eq!(run(&d, "CONFIG GET nope"), Frame::Array(vec![]));

        assert!(is_error(&run(&d, "CONFIG SET maxclients 7 nope 1")));
        assert_eq!(
            run(&d, "CONFIG GET maxclients"),
            bulks(&["maxclients", "5"])
        );
        assert!(is_error(&run(&d, "CONFIG SET maxclients")));
        assert!(is_error(&run(&d, "CONFIG NOPE")));
    }

    #[test]
    fn command_count() {
        let d = dispatcher();

        assert!(matches!(run(&d, "COMMAND COUNT"), Frame::Integer(n) if n > 100));
    }
}
