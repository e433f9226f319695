//! Sorted set commands.

use crate::commands::{
    parse_count, parse_float, parse_int, parse_limit, random_sample, scored_reply, CommandError,
    Registry,
};
use crate::dispatcher::Context;
use crate::frame::Frame;
use crate::grammar::{Args, Part};
use crate::store::Db;
use crate::value::{Data, Value};
use crate::zset::{
    self, format_score, parse_score, Aggregate, Input, LexRange, Limit, Scored, ScoreRange,
    SortedSet,
};

/// How `ZRANGE` and its older siblings interpret their two boundaries.
#[derive(Debug, Clone, Copy, PartialEq)]
enum By {
    Rank,
    Score,
    Lex,
}

#[derive(Debug, Clone, Copy)]
struct RangeQuery {
    by: By,
    rev: bool,
    limit: Option<Limit>,
}

#[derive(Debug, Clone, Copy)]
enum Operation {
    Union,
    Intersection,
    Difference,
}

pub fn register(registry: &mut Registry) {
    let key = || Part::value("key");
    let bounds = || vec![Part::value("key"), Part::value("min"), Part::value("max")];
    let pop = || vec![Part::value("key"), Part::anonymous("count")];

    registry.add(
        "ZADD",
        vec![
            key(),
            Part::flags(&["NX", "XX"]),
            Part::flags(&["GT", "LT"]),
            Part::flag("CH"),
            Part::flag("INCR"),
            Part::list(2),
        ],
        zadd,
    );
    registry.add("ZCARD", vec![key()], zcard);
    registry.add("ZCOUNT", bounds(), zcount);
    registry.add("ZLEXCOUNT", bounds(), zlexcount);
    registry.add(
        "ZINCRBY",
        vec![key(), Part::value("increment"), Part::value("member")],
        zincrby,
    );
    registry.add("ZSCORE", vec![key(), Part::value("member")], zscore);
    registry.add("ZMSCORE", vec![key(), Part::list(1)], zmscore);
    registry.add(
        "ZRANK",
        vec![key(), Part::value("member"), Part::flag("WITHSCORE")],
        zrank,
    );
    registry.add(
        "ZREVRANK",
        vec![key(), Part::value("member"), Part::flag("WITHSCORE")],
        zrank,
    );
    registry.add("ZREM", vec![key(), Part::list(1)], zrem);
    registry.add(
        "ZREMRANGEBYRANK",
        vec![key(), Part::value("start"), Part::value("stop")],
        zremrangebyrank,
    );
    registry.add("ZREMRANGEBYSCORE", bounds(), zremrangebyscore);
    registry.add("ZREMRANGEBYLEX", bounds(), zremrangebylex);
    registry.add("ZPOPMIN", pop(), zpop);
    registry.add("ZPOPMAX", pop(), zpop);
    registry.add(
        "ZMPOP",
        vec![
            Part::counted_list("numkeys"),
            Part::term(&["MIN", "MAX"]),
            Part::option("COUNT", 1),
        ],
        zmpop,
    );
    registry.add(
        "ZRANDMEMBER",
        vec![key(), Part::anonymous_with_terms("count", &["WITHSCORES"])],
        zrandmember,
    );

    registry.add(
        "ZRANGE",
        vec![
            key(),
            Part::value("start"),
            Part::value("stop"),
            Part::flags(&["BYSCORE", "BYLEX"]),
            Part::flag("REV"),
            Part::option("LIMIT", 2),
            Part::flag("WITHSCORES"),
        ],
        zrange,
    );
    registry.add(
        "ZRANGESTORE",
        vec![
            Part::value("destination"),
            Part::value("key"),
            Part::value("start"),
            Part::value("stop"),
            Part::flags(&["BYSCORE", "BYLEX"]),
            Part::flag("REV"),
            Part::option("LIMIT", 2),
        ],
        zrangestore,
    );
    registry.add(
        "ZREVRANGE",
        vec![
            key(),
            Part::value("start"),
            Part::value("stop"),
            Part::flag("WITHSCORES"),
        ],
        zrange,
    );
    let by_score = || {
        vec![
            Part::value("key"),
            Part::value("start"),
            Part::value("stop"),
            Part::flag("WITHSCORES"),
            Part::option("LIMIT", 2),
        ]
    };
    registry.add("ZRANGEBYSCORE", by_score(), zrange);
    registry.add("ZREVRANGEBYSCORE", by_score(), zrange);
    let by_lex = || {
        vec![
            Part::value("key"),
            Part::value("start"),
            Part::value("stop"),
            Part::option("LIMIT", 2),
        ]
    };
    registry.add("ZRANGEBYLEX", by_lex(), zrange);
    registry.add("ZREVRANGEBYLEX", by_lex(), zrange);

    let combine = || {
        vec![
            Part::counted_list("numkeys"),
            Part::option_list("WEIGHTS"),
            Part::option_terms("AGGREGATE", Aggregate::all_variants()),
            Part::flag("WITHSCORES"),
        ]
    };
    let combine_store = || {
        vec![
            Part::value("destination"),
            Part::counted_list("numkeys"),
            Part::option_list("WEIGHTS"),
            Part::option_terms("AGGREGATE", Aggregate::all_variants()),
        ]
    };
    registry.add("ZUNION", combine(), zunion);
    registry.add("ZUNIONSTORE", combine_store(), zunionstore);
    registry.add("ZINTER", combine(), zinter);
    registry.add("ZINTERSTORE", combine_store(), zinterstore);
    registry.add(
        "ZINTERCARD",
        vec![Part::counted_list("numkeys"), Part::option("LIMIT", 1)],
        zintercard,
    );
    registry.add(
        "ZDIFF",
        vec![Part::counted_list("numkeys"), Part::flag("WITHSCORES")],
        zdiff,
    );
    registry.add(
        "ZDIFFSTORE",
        vec![Part::value("destination"), Part::counted_list("numkeys")],
        zdiffstore,
    );
}

fn store_zset(db: &mut Db, key: &str, zset: SortedSet) -> crate::Result<()> {
    db.compute(key, |slot| {
        *slot = Some(Value::new(Data::ZSet(zset)));
        Ok(())
    })
}

/// Adds members with their scores, or updates the scores of existing ones.
///
/// NX and XX restrict the update to new or existing members. GT and LT only move an existing
/// member's score up or down. CH counts changed members instead of added ones, and INCR turns
/// the command into `ZINCRBY`, replying with the new score.
///
/// Ref: <https://redis.io/docs/latest/commands/zadd/>
fn zadd(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let nx = args.has("NX");
    let xx = args.has("XX");
    let gt = args.has("GT");
    let lt = args.has("LT");
    let incr = args.has("INCR");

    if nx && (gt || lt) {
        return Err(CommandError::Custom(
            "ERR GT, LT, and/or NX options at the same time are not compatible".to_string(),
        )
        .into());
    }

    let pairs = args
        .list()
        .chunks(2)
        .map(|pair| Ok((parse_score(&pair[0])?, pair[1].as_str())))
        .collect::<Result<Vec<_>, CommandError>>()?;

    if incr && pairs.len() != 1 {
        return Err(CommandError::Custom(
            "ERR INCR option supports a single increment-element pair".to_string(),
        )
        .into());
    }

    let (added, changed, last) = ctx
        .db()?
        .modify(args.value("key"), |zset: &mut SortedSet| {
            let mut added = 0;
            let mut changed = 0;
            let mut last = None;

            for (score, member) in &pairs {
                let current = zset.score(member);
                if (nx && current.is_some()) || (xx && current.is_none()) {
                    continue;
                }

                let next = if incr {
                    let next = current.unwrap_or(0.0) + score;
                    if next.is_nan() {
                        return Err(CommandError::NaNScore.into());
                    }
                    next
                } else {
                    *score
                };

                if let Some(current) = current {
                    if (gt && next <= current) || (lt && next >= current) {
                        continue;
                    }
                    if current != next {
                        changed += 1;
                    }
                } else {
                    added += 1;
                    changed += 1;
                }

                zset.insert(member, next);
                last = Some(next);
            }

            Ok((added, changed, last))
        })?;

    if incr {
        return Ok(Frame::optional_bulk(last.map(format_score)));
    }

    let count = if args.has("CH") { changed } else { added };
    Ok(Frame::Integer(count))
}

fn zincrby(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let delta = parse_score(args.value("increment"))?;
    let member = args.value("member");

    let score = ctx
        .db()?
        .modify(args.value("key"), |zset: &mut SortedSet| {
            Ok(zset.incr(member, delta)?)
        })?;

    Ok(Frame::bulk(format_score(score)))
}

fn zcard(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let len = ctx
        .db()?
        .read::<SortedSet>(args.value("key"))?
        .map_or(0, SortedSet::len);

    Ok(Frame::Integer(len as i64))
}

fn zcount(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let range = ScoreRange::parse(args.value("min"), args.value("max"))?;

    let count = ctx
        .db()?
        .read::<SortedSet>(args.value("key"))?
        .map_or(0, |zset| zset.count_by_score(&range));

    Ok(Frame::Integer(count as i64))
}

fn zlexcount(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let range = LexRange::parse(args.value("min"), args.value("max"))?;

    let count = ctx
        .db()?
        .read::<SortedSet>(args.value("key"))?
        .map_or(0, |zset| zset.count_by_lex(&range));

    Ok(Frame::Integer(count as i64))
}

fn zscore(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let score = ctx
        .db()?
        .read::<SortedSet>(args.value("key"))?
        .and_then(|zset| zset.score(args.value("member")));

    Ok(Frame::optional_bulk(score.map(format_score)))
}

fn zmscore(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let zset = ctx.db()?.read::<SortedSet>(args.value("key"))?;

    let scores: Vec<Frame> = args
        .list()
        .iter()
        .map(|member| Frame::optional_bulk(zset.and_then(|z| z.score(member)).map(format_score)))
        .collect();

    Ok(Frame::Array(scores))
}

/// Serves `ZRANK` and `ZREVRANK`.
fn zrank(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let rev = ctx.command == "ZREVRANK";
    let member = args.value("member");

    let found = ctx
        .db()?
        .read::<SortedSet>(args.value("key"))?
        .and_then(|zset| Some((zset.rank(member, rev)?, zset.score(member)?)));

    Ok(match found {
        None => Frame::Null,
        Some((rank, _)) if !args.has("WITHSCORE") => Frame::Integer(rank as i64),
        Some((rank, score)) => Frame::Array(vec![
            Frame::Integer(rank as i64),
            Frame::bulk(format_score(score)),
        ]),
    })
}

fn zrem(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let removed = ctx
        .db()?
        .modify_existing(args.value("key"), |zset: &mut SortedSet| {
            Ok(zset.remove_all(args.list().iter().map(String::as_str)))
        })?
        .unwrap_or(0);

    Ok(Frame::Integer(removed as i64))
}

/// Removes the members selected by `select` from the sorted set at `key`.
fn remove_range(
    ctx: &mut Context,
    key: &str,
    select: impl FnOnce(&SortedSet) -> Vec<String>,
) -> crate::Result<Frame> {
    let removed = ctx
        .db()?
        .modify_existing(key, |zset: &mut SortedSet| {
            let members = select(zset);
            Ok(zset.remove_all(members.iter().map(String::as_str)))
        })?
        .unwrap_or(0);

    Ok(Frame::Integer(removed as i64))
}

fn zremrangebyrank(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let start: i64 = parse_int(args.value("start"))?;
    let stop: i64 = parse_int(args.value("stop"))?;

    remove_range(ctx, args.value("key"), |zset| {
        members(zset.range_by_rank(start, stop, false))
    })
}

fn zremrangebyscore(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let range = ScoreRange::parse(args.value("min"), args.value("max"))?;

    remove_range(ctx, args.value("key"), |zset| {
        members(zset.range_by_score(&range, false, None))
    })
}

fn zremrangebylex(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let range = LexRange::parse(args.value("min"), args.value("max"))?;

    remove_range(ctx, args.value("key"), |zset| {
        zset.range_by_lex(&range, false, None)
    })
}

fn members(entries: Vec<(String, f64)>) -> Vec<String> {
    entries.into_iter().map(|(member, _)| member).collect()
}

/// Serves `ZPOPMIN` and `ZPOPMAX`.
fn zpop(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let max = ctx.command == "ZPOPMAX";
    let count = args.anonymous().map(parse_count).transpose()?.unwrap_or(1);

    let popped = ctx
        .db()?
        .modify_existing(args.value("key"), |zset: &mut SortedSet| {
            Ok(zset.pop(count, max))
        })?
        .unwrap_or_default();

    Ok(scored_reply(popped, true))
}

/// Pops from the first non-empty sorted set among the given keys. The reply pairs the key with
/// the popped `[member, score]` entries.
///
/// Ref: <https://redis.io/docs/latest/commands/zmpop/>
fn zmpop(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let max = args.term(0) == "MAX";
    let count = match args.option_value("COUNT") {
        Some(count) => match parse_count(count)? {
            0 => {
                return Err(
                    CommandError::OutOfRange("count should be greater than 0".into()).into(),
                )
            }
            n => n,
        },
        None => 1,
    };

    let db = ctx.db()?;
    for key in args.list() {
        let popped = db.modify_existing(key, |zset: &mut SortedSet| Ok(zset.pop(count, max)))?;

        if let Some(popped) = popped {
            let entries: Vec<Frame> = popped
                .into_iter()
                .map(|(member, score)| {
                    Frame::Array(vec![Frame::bulk(member), Frame::bulk(format_score(score))])
                })
                .collect();
            return Ok(Frame::Array(vec![
                Frame::bulk(key.clone()),
                Frame::Array(entries),
            ]));
        }
    }

    Ok(Frame::NullArray)
}

/// Random members, following the same count rules as `SRANDMEMBER`.
fn zrandmember(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let count = args.anonymous().map(parse_int::<i64>).transpose()?;
    let with_scores = args.has_anonymous_term("WITHSCORES");

    let entries: Vec<(String, f64)> = ctx
        .db()?
        .read::<SortedSet>(args.value("key"))?
        .map(|zset| zset.iter().map(|(m, s)| (m.to_string(), s)).collect())
        .unwrap_or_default();

    match count {
        Some(count) => Ok(scored_reply(random_sample(&entries, count)?, with_scores)),
        None => Ok(Frame::optional_bulk(
            random_sample(&entries, 1)?.pop().map(|(member, _)| member),
        )),
    }
}

/// Builds the range query of `ZRANGE` style commands. The legacy commands carry their mode and
/// direction in their name, `ZRANGE` and `ZRANGESTORE` in their options.
fn range_query(command: &str, args: &Args) -> Result<RangeQuery, CommandError> {
    let (by, rev) = match command {
        "ZREVRANGE" => (By::Rank, true),
        "ZRANGEBYSCORE" => (By::Score, false),
        "ZREVRANGEBYSCORE" => (By::Score, true),
        "ZRANGEBYLEX" => (By::Lex, false),
        "ZREVRANGEBYLEX" => (By::Lex, true),
        _ => {
            let by = if args.has("BYSCORE") {
                By::Score
            } else if args.has("BYLEX") {
                By::Lex
            } else {
                By::Rank
            };
            (by, args.has("REV"))
        }
    };

    let limit = match args.option("LIMIT") {
        Some(values) => {
            if by == By::Rank {
                return Err(CommandError::Custom(
                    "ERR syntax error, LIMIT is only supported in combination with either \
                     BYSCORE or BYLEX"
                        .to_string(),
                ));
            }
            let (offset, count) = parse_limit(values)?;
            Some(Limit { offset, count })
        }
        None => None,
    };

    if by == By::Lex && args.has("WITHSCORES") {
        return Err(CommandError::Custom(
            "ERR syntax error, WITHSCORES not supported in combination with BYLEX".to_string(),
        ));
    }

    Ok(RangeQuery { by, rev, limit })
}

/// Runs `query` against `zset`. In reverse mode score and lex boundaries are given highest
/// first, so `start` is the maximum.
fn run_query(
    zset: &SortedSet,
    start: &str,
    stop: &str,
    query: &RangeQuery,
) -> Result<Vec<(String, f64)>, CommandError> {
    let (min, max) = if query.rev { (stop, start) } else { (start, stop) };

    Ok(match query.by {
        By::Rank => zset.range_by_rank(parse_int(start)?, parse_int(stop)?, query.rev),
        By::Score => zset.range_by_score(&ScoreRange::parse(min, max)?, query.rev, query.limit),
        By::Lex => zset
            .range_by_lex(&LexRange::parse(min, max)?, query.rev, query.limit)
            .into_iter()
            .map(|member| {
                let score = zset.score(&member).unwrap_or_default();
                (member, score)
            })
            .collect(),
    })
}

/// Serves `ZRANGE` and the legacy `ZREVRANGE`, `ZRANGEBYSCORE`, `ZREVRANGEBYSCORE`,
/// `ZRANGEBYLEX` and `ZREVRANGEBYLEX`.
///
/// Ref: <https://redis.io/docs/latest/commands/zrange/>
fn zrange(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let query = range_query(ctx.command, args)?;

    // Boundaries are validated even when the key is missing.
    let empty = SortedSet::new();
    let zset = ctx
        .db()?
        .read::<SortedSet>(args.value("key"))?
        .unwrap_or(&empty);
    let entries = run_query(zset, args.value("start"), args.value("stop"), &query)?;

    Ok(scored_reply(entries, args.has("WITHSCORES")))
}

fn zrangestore(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let query = range_query(ctx.command, args)?;
    let db = ctx.db()?;

    let empty = SortedSet::new();
    let zset = db.read::<SortedSet>(args.value("key"))?.unwrap_or(&empty);
    let entries = run_query(zset, args.value("start"), args.value("stop"), &query)?;

    let mut result = SortedSet::new();
    for (member, score) in &entries {
        result.insert(member, *score);
    }
    let len = result.len();
    store_zset(db, args.value("destination"), result)?;

    Ok(Frame::Integer(len as i64))
}

/// Copies of the collections at `keys`. Plain sets take part with every member scoring 1;
/// missing keys read as empty.
fn load(db: &mut Db, keys: &[String]) -> Result<Vec<Box<dyn Scored>>, CommandError> {
    keys.iter()
        .map(|key| {
            let operand: Box<dyn Scored> = match db.get(key).map(|value| &value.data) {
                None => Box::new(SortedSet::new()),
                Some(Data::ZSet(zset)) => Box::new(zset.clone()),
                Some(Data::Set(set)) => Box::new(set.clone()),
                Some(_) => return Err(CommandError::WrongType),
            };
            Ok(operand)
        })
        .collect()
}

fn weights(args: &Args, numkeys: usize) -> Result<Vec<f64>, CommandError> {
    match args.option("WEIGHTS") {
        Some(values) => {
            if values.len() != numkeys {
                return Err(CommandError::Syntax);
            }
            values
                .iter()
                .map(|w| {
                    parse_float(w).map_err(|_| {
                        CommandError::Custom("ERR weight value is not a float".to_string())
                    })
                })
                .collect()
        }
        None => Ok(vec![1.0; numkeys]),
    }
}

fn combine(db: &mut Db, args: &Args, operation: Operation) -> Result<SortedSet, CommandError> {
    let keys = args.list();
    let weights = weights(args, keys.len())?;
    let aggregate = match args.option_value("AGGREGATE") {
        Some(aggregate) => aggregate
            .parse::<Aggregate>()
            .map_err(|_| CommandError::Syntax)?,
        None => Aggregate::default(),
    };

    let operands = load(db, keys)?;
    let inputs: Vec<Input> = operands
        .iter()
        .zip(weights)
        .map(|(operand, weight)| (operand.as_ref(), weight))
        .collect();

    Ok(match operation {
        Operation::Union => zset::union(&inputs, aggregate),
        Operation::Intersection => zset::intersect(&inputs, aggregate),
        Operation::Difference => zset::difference(&inputs),
    })
}

fn combine_reply(ctx: &mut Context, args: &Args, operation: Operation) -> crate::Result<Frame> {
    let result = combine(ctx.db()?, args, operation)?;
    let entries = result.iter().map(|(m, s)| (m.to_string(), s)).collect();

    Ok(scored_reply(entries, args.has("WITHSCORES")))
}

fn combine_store(ctx: &mut Context, args: &Args, operation: Operation) -> crate::Result<Frame> {
    let db = ctx.db()?;
    let result = combine(db, args, operation)?;
    let len = result.len();
    store_zset(db, args.value("destination"), result)?;

    Ok(Frame::Integer(len as i64))
}

fn zunion(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    combine_reply(ctx, args, Operation::Union)
}

fn zinter(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    combine_reply(ctx, args, Operation::Intersection)
}

fn zdiff(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    combine_reply(ctx, args, Operation::Difference)
}

fn zunionstore(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    combine_store(ctx, args, Operation::Union)
}

fn zinterstore(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    combine_store(ctx, args, Operation::Intersection)
}

fn zdiffstore(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    combine_store(ctx, args, Operation::Difference)
}

fn zintercard(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
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

    let len = combine(ctx.db()?, args, Operation::Intersection)?.len();
    let len = if limit > 0 { len.min(limit) } else { len };

    Ok(Frame::Integer(len as i64))
}
