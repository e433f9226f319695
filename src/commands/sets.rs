//! Set commands. Unions, intersections and differences go through the same algebra as sorted
//! sets, with every member scoring 1.

use rand::seq::IteratorRandom;

use crate::commands::{parse_count, parse_int, random_sample, CommandError, Registry};
use crate::dispatcher::Context;
use crate::frame::Frame;
use crate::grammar::{Args, Part};
use crate::store::Db;
use crate::value::{Data, Set, Value};
use crate::zset::{self, Aggregate, Input, Scored};

#[derive(Debug, Clone, Copy)]
enum Operation {
    Union,
    Intersection,
    Difference,
}

pub fn register(registry: &mut Registry) {
    let key = || Part::value("key");
    let keys = || vec![Part::list(1)];
    let store = || vec![Part::value("destination"), Part::list(1)];

    registry.add("SADD", vec![key(), Part::list(1)], sadd);
    registry.add("SCARD", vec![key()], scard);
    registry.add("SDIFF", keys(), sdiff);
    registry.add("SDIFFSTORE", store(), sdiffstore);
    registry.add("SINTER", keys(), sinter);
    registry.add("SINTERSTORE", store(), sinterstore);
    registry.add(
        "SINTERCARD",
        vec![Part::counted_list("numkeys"), Part::option("LIMIT", 1)],
        sintercard,
    );
    registry.add("SISMEMBER", vec![key(), Part::value("member")], sismember);
    registry.add("SMEMBERS", vec![key()], smembers);
    registry.add("SMISMEMBER", vec![key(), Part::list(1)], smismember);
    registry.add(
        "SMOVE",
        vec![
            Part::value("source"),
            Part::value("destination"),
            Part::value("member"),
        ],
        smove,
    );
    registry.add("SPOP", vec![key(), Part::anonymous("count")], spop);
    registry.add("SRANDMEMBER", vec![key(), Part::anonymous("count")], srandmember);
    registry.add("SREM", vec![key(), Part::list(1)], srem);
    registry.add("SUNION", keys(), sunion);
    registry.add("SUNIONSTORE", store(), sunionstore);
}

/// Copies of the sets stored at `keys`. Missing keys read as empty sets.
fn load(db: &mut Db, keys: &[String]) -> Result<Vec<Set>, CommandError> {
    keys.iter()
        .map(|key| Ok(db.read::<Set>(key)?.cloned().unwrap_or_default()))
        .collect()
}

fn combine(db: &mut Db, keys: &[String], operation: Operation) -> Result<Set, CommandError> {
    let sets = load(db, keys)?;
    let inputs: Vec<Input> = sets.iter().map(|set| (set as &dyn Scored, 1.0)).collect();

    let result = match operation {
        Operation::Union => zset::union(&inputs, Aggregate::Sum),
        Operation::Intersection => zset::intersect(&inputs, Aggregate::Sum),
        Operation::Difference => zset::difference(&inputs),
    };

    Ok(result.iter().map(|(member, _)| member.to_string()).collect())
}

fn members_reply(ctx: &mut Context, args: &Args, operation: Operation) -> crate::Result<Frame> {
    let result = combine(ctx.db()?, args.list(), operation)?;
    Ok(Frame::bulk_array(result))
}

/// Stores the result at `destination`, replacing whatever was there. An empty result deletes
/// the destination.
fn store_reply(ctx: &mut Context, args: &Args, operation: Operation) -> crate::Result<Frame> {
    let db = ctx.db()?;
    let result = combine(db, args.list(), operation)?;
    let len = result.len();

    db.compute(args.value("destination"), |slot| {
        *slot = Some(Value::new(Data::Set(result)));
        Ok(())
    })?;

    Ok(Frame::Integer(len as i64))
}

fn sunion(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    members_reply(ctx, args, Operation::Union)
}

fn sinter(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    members_reply(ctx, args, Operation::Intersection)
}

fn sdiff(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    members_reply(ctx, args, Operation::Difference)
}

fn sunionstore(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    store_reply(ctx, args, Operation::Union)
}

fn sinterstore(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    store_reply(ctx, args, Operation::Intersection)
}

fn sdiffstore(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    store_reply(ctx, args, Operation::Difference)
}

/// Cardinality of the intersection, capped at `LIMIT` when one is given (0 means no cap).
///
/// Ref: <https://redis.io/docs/latest/commands/sintercard/>
fn sintercard(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let limit = match args.option_value("LIMIT") {
        Some(limit) => {
            let limit: i64 = parse_int(limit)?;
            if limit < 0 {
                return Err(CommandError::OutOfRange("LIMIT can't be negative".into()).into());
            }
            limit as usize
        }
        None => 0,
    };

    let len = combine(ctx.db()?, args.list(), Operation::Intersection)?.len();
    let len = if limit > 0 { len.min(limit) } else { len };

    Ok(Frame::Integer(len as i64))
}

fn sadd(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let added = ctx.db()?.modify(args.value("key"), |set: &mut Set| {
        Ok(args
            .list()
            .iter()
            .filter(|member| set.insert(member.to_string()))
            .count())
    })?;

    Ok(Frame::Integer(added as i64))
}

fn srem(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let removed = ctx
        .db()?
        .modify_existing(args.value("key"), |set: &mut Set| {
            Ok(args
                .list()
                .iter()
                .filter(|member| set.remove(member.as_str()))
                .count())
        })?
        .unwrap_or(0);

    Ok(Frame::Integer(removed as i64))
}

fn scard(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let len = ctx
        .db()?
        .read::<Set>(args.value("key"))?
        .map_or(0, |set| set.len());

    Ok(Frame::Integer(len as i64))
}

fn smembers(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let members: Vec<String> = ctx
        .db()?
        .read::<Set>(args.value("key"))?
        .map(|set| set.iter().cloned().collect())
        .unwrap_or_default();

    Ok(Frame::bulk_array(members))
}

fn sismember(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let member = ctx
        .db()?
        .read::<Set>(args.value("key"))?
        .is_some_and(|set| set.contains(args.value("member")));

    Ok(Frame::Integer(member as i64))
}

fn smismember(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let set = ctx.db()?.read::<Set>(args.value("key"))?;

    let replies: Vec<Frame> = args
        .list()
        .iter()
        .map(|member| Frame::Integer(set.is_some_and(|s| s.contains(member)) as i64))
        .collect();

    Ok(Frame::Array(replies))
}

/// Moves `member` from `source` to `destination`. Both keys are type checked before anything
/// changes.
fn smove(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let member = args.value("member");
    let db = ctx.db()?;

    db.read::<Set>(args.value("destination"))?;
    let moved = db
        .modify_existing(args.value("source"), |set: &mut Set| Ok(set.remove(member)))?
        .unwrap_or(false);

    if moved {
        db.modify(args.value("destination"), |set: &mut Set| {
            set.insert(member.to_string());
            Ok(())
        })?;
    }

    Ok(Frame::Integer(moved as i64))
}

/// Removes and returns random members. Without a count the reply is a single member.
fn spop(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let count = args.anonymous().map(parse_count).transpose()?;

    let popped = ctx
        .db()?
        .modify_existing(args.value("key"), |set: &mut Set| {
            let amount = count.unwrap_or(1).min(set.len());
            let picked: Vec<String> = set
                .iter()
                .cloned()
                .choose_multiple(&mut rand::thread_rng(), amount);
            for member in &picked {
                set.remove(member);
            }
            Ok(picked)
        })?
        .unwrap_or_default();

    Ok(match count {
        Some(_) => Frame::bulk_array(popped),
        None => Frame::optional_bulk(popped.into_iter().next()),
    })
}

fn srandmember(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let count = args.anonymous().map(parse_int::<i64>).transpose()?;

    let members: Vec<String> = ctx
        .db()?
        .read::<Set>(args.value("key"))?
        .map(|set| set.iter().cloned().collect())
        .unwrap_or_default();

    Ok(match count {
        Some(count) => Frame::bulk_array(random_sample(&members, count)?),
        None => Frame::optional_bulk(random_sample(&members, 1)?.pop()),
    })
}
