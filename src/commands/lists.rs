//! List commands.

use enum_variants::VariantNames;
use strum_macros::EnumString;

use crate::commands::{parse_count, parse_int, CommandError, Registry};
use crate::dispatcher::Context;
use crate::frame::Frame;
use crate::grammar::{Args, Part};
use crate::value::{normalize_range, List};

#[derive(Debug, Clone, Copy, PartialEq, EnumString, VariantNames)]
#[strum(ascii_case_insensitive)]
enum End {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, EnumString, VariantNames)]
#[strum(ascii_case_insensitive)]
enum Position {
    Before,
    After,
}

fn parse_term<T: std::str::FromStr>(term: &str) -> Result<T, CommandError> {
    term.parse().map_err(|_| CommandError::Syntax)
}

pub fn register(registry: &mut Registry) {
    let key = || Part::value("key");
    let push = || vec![Part::value("key"), Part::list(1)];
    let pop = || vec![Part::value("key"), Part::anonymous("count")];

    registry.add("LINDEX", vec![key(), Part::value("index")], lindex);
    registry.add(
        "LINSERT",
        vec![
            key(),
            Part::term(Position::all_variants()),
            Part::value("pivot"),
            Part::value("element"),
        ],
        linsert,
    );
    registry.add("LLEN", vec![key()], llen);
    registry.add(
        "LMOVE",
        vec![
            Part::value("source"),
            Part::value("destination"),
            Part::term(End::all_variants()),
            Part::term(End::all_variants()),
        ],
        lmove,
    );
    registry.add(
        "RPOPLPUSH",
        vec![Part::value("source"), Part::value("destination")],
        rpoplpush,
    );
    registry.add(
        "LMPOP",
        vec![
            Part::counted_list("numkeys"),
            Part::term(End::all_variants()),
            Part::option("COUNT", 1),
        ],
        lmpop,
    );
    registry.add("LPOP", pop(), lpop);
    registry.add("RPOP", pop(), lpop);
    registry.add(
        "LPOS",
        vec![
            key(),
            Part::value("element"),
            Part::option("RANK", 1),
            Part::option("COUNT", 1),
            Part::option("MAXLEN", 1),
        ],
        lpos,
    );
    registry.add("LPUSH", push(), lpush);
    registry.add("RPUSH", push(), lpush);
    registry.add("LPUSHX", push(), lpush);
    registry.add("RPUSHX", push(), lpush);
    registry.add(
        "LRANGE",
        vec![key(), Part::value("start"), Part::value("stop")],
        lrange,
    );
    registry.add(
        "LREM",
        vec![key(), Part::value("count"), Part::value("element")],
        lrem,
    );
    registry.add(
        "LSET",
        vec![key(), Part::value("index"), Part::value("element")],
        lset,
    );
    registry.add(
        "LTRIM",
        vec![key(), Part::value("start"), Part::value("stop")],
        ltrim,
    );
}

fn pop_end(list: &mut List, end: End) -> Option<String> {
    match end {
        End::Left => list.pop_front(),
        End::Right => list.pop_back(),
    }
}

fn push_end(list: &mut List, end: End, element: String) {
    match end {
        End::Left => list.push_front(element),
        End::Right => list.push_back(element),
    }
}

/// Resolves a possibly negative index into a position inside a list of `len` elements.
fn resolve_index(index: i64, len: usize) -> Option<usize> {
    let index = if index < 0 {
        len as i64 + index
    } else {
        index
    };
    (0..len as i64).contains(&index).then_some(index as usize)
}

/// Serves LPUSH, RPUSH, LPUSHX and RPUSHX. The X variants only push onto existing lists.
fn lpush(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let end = if ctx.command.starts_with('L') {
        End::Left
    } else {
        End::Right
    };
    let only_existing = ctx.command.ends_with('X');
    let db = ctx.db()?;
    let key = args.value("key");

    let push = |list: &mut List| {
        for element in args.list() {
            push_end(list, end, element.clone());
        }
        Ok(list.len())
    };

    let len = if only_existing {
        db.modify_existing(key, push)?.unwrap_or(0)
    } else {
        db.modify(key, push)?
    };

    Ok(Frame::Integer(len as i64))
}

/// Serves LPOP and RPOP. Without a count the reply is a single element, with one it is an
/// array.
fn lpop(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let end = if ctx.command == "LPOP" {
        End::Left
    } else {
        End::Right
    };
    let count = args.anonymous().map(parse_count).transpose()?;

    let popped = ctx.db()?.modify_existing(args.value("key"), |list: &mut List| {
        let n = count.unwrap_or(1).min(list.len());
        Ok((0..n).filter_map(|_| pop_end(list, end)).collect::<Vec<_>>())
    })?;

    Ok(match (popped, count) {
        (None, None) => Frame::Null,
        (None, Some(_)) => Frame::NullArray,
        (Some(mut popped), None) => Frame::optional_bulk(popped.pop()),
        (Some(popped), Some(_)) => Frame::bulk_array(popped),
    })
}

fn llen(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let len = ctx
        .db()?
        .read::<List>(args.value("key"))?
        .map_or(0, |list| list.len());

    Ok(Frame::Integer(len as i64))
}

fn lindex(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let index: i64 = parse_int(args.value("index"))?;

    let element = ctx
        .db()?
        .read::<List>(args.value("key"))?
        .and_then(|list| resolve_index(index, list.len()).and_then(|i| list.get(i)))
        .cloned();

    Ok(Frame::optional_bulk(element))
}

/// Returns the specified elements of the list stored at key. The offsets start and stop are
/// zero-based indexes and may be negative to count from the tail.
///
/// Ref: <https://redis.io/docs/latest/commands/lrange/>
fn lrange(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let start: i64 = parse_int(args.value("start"))?;
    let stop: i64 = parse_int(args.value("stop"))?;

    let elements: Vec<String> = match ctx.db()?.read::<List>(args.value("key"))? {
        Some(list) => match normalize_range(start, stop, list.len()) {
            Some((start, stop)) => list.range(start..=stop).cloned().collect(),
            None => vec![],
        },
        None => vec![],
    };

    Ok(Frame::bulk_array(elements))
}

fn linsert(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let position: Position = parse_term(args.term(0))?;
    let pivot = args.value("pivot");
    let element = args.value("element");

    let len = ctx
        .db()?
        .modify_existing(args.value("key"), |list: &mut List| {
            let Some(at) = list.iter().position(|e| e == pivot) else {
                return Ok(-1);
            };
            let at = match position {
                Position::Before => at,
                Position::After => at + 1,
            };
            list.insert(at, element.to_string());
            Ok(list.len() as i64)
        })?
        .unwrap_or(0);

    Ok(Frame::Integer(len))
}

/// Atomically moves an element from one end of `source` to one end of `destination`. The
/// destination type is checked before anything is popped.
fn move_element(
    ctx: &mut Context,
    source: &str,
    destination: &str,
    from: End,
    to: End,
) -> crate::Result<Frame> {
    let db = ctx.db()?;
    db.read::<List>(destination)?;

    let Some(element) = db
        .modify_existing(source, |list: &mut List| Ok(pop_end(list, from)))?
        .flatten()
    else {
        return Ok(Frame::Null);
    };

    db.modify(destination, |list: &mut List| {
        push_end(list, to, element.clone());
        Ok(())
    })?;

    Ok(Frame::bulk(element))
}

fn lmove(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let from: End = parse_term(args.term(0))?;
    let to: End = parse_term(args.term(1))?;

    move_element(
        ctx,
        args.value("source"),
        args.value("destination"),
        from,
        to,
    )
}

fn rpoplpush(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    move_element(
        ctx,
        args.value("source"),
        args.value("destination"),
        End::Right,
        End::Left,
    )
}

/// Pops from the first non-empty list among the given keys.
///
/// Ref: <https://redis.io/docs/latest/commands/lmpop/>
fn lmpop(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let end: End = parse_term(args.term(0))?;
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
        let popped = db.modify_existing(key, |list: &mut List| {
            let n = count.min(list.len());
            Ok((0..n).filter_map(|_| pop_end(list, end)).collect::<Vec<_>>())
        })?;

        if let Some(popped) = popped {
            return Ok(Frame::Array(vec![
                Frame::bulk(key.clone()),
                Frame::bulk_array(popped),
            ]));
        }
    }

    Ok(Frame::NullArray)
}

/// Returns the index of matching elements inside a list.
///
/// RANK picks the nth match, negative ranks search from the tail. COUNT returns several matches
/// (0 means all of them). MAXLEN bounds the number of compared elements.
///
/// Ref: <https://redis.io/docs/latest/commands/lpos/>
fn lpos(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let rank: i64 = args.option_value("RANK").map(parse_int::<i64>).transpose()?.unwrap_or(1);
    if rank == 0 {
        return Err(CommandError::OutOfRange(
            "RANK can't be zero: use 1 to start from the first match, 2 from the second ... \
             or use negative to start from the end of the list"
                .into(),
        )
        .into());
    }
    let count = args.option_value("COUNT").map(parse_count).transpose()?;
    let maxlen = args
        .option_value("MAXLEN")
        .map(parse_count)
        .transpose()?
        .unwrap_or(0);

    let element = args.value("element");
    let list = ctx.db()?.read::<List>(args.value("key"))?;

    let mut matches = vec![];
    if let Some(list) = list {
        let len = list.len();
        let limit = if maxlen == 0 { len } else { maxlen.min(len) };
        let wanted = match count {
            Some(0) => usize::MAX,
            Some(n) => n,
            None => 1,
        };
        let indexes: Box<dyn Iterator<Item = usize>> = if rank > 0 {
            Box::new(0..limit)
        } else {
            Box::new((len - limit..len).rev())
        };
        let skip = (rank.unsigned_abs() - 1) as usize;

        matches = indexes
            .filter(|i| list[*i] == element)
            .skip(skip)
            .take(wanted)
            .map(|i| Frame::Integer(i as i64))
            .collect();
    }

    Ok(match count {
        Some(_) => Frame::Array(matches),
        None => matches.pop().unwrap_or(Frame::Null),
    })
}

/// Removes the first `count` occurrences of `element`; from the tail when `count` is negative,
/// all of them when zero.
///
/// Ref: <https://redis.io/docs/latest/commands/lrem/>
fn lrem(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let count: i64 = parse_int(args.value("count"))?;
    let element = args.value("element");

    let removed = ctx
        .db()?
        .modify_existing(args.value("key"), |list: &mut List| {
            let matches = list.iter().filter(|e| e.as_str() == element).count();
            let limit = match count {
                0 => matches,
                _ => matches.min(usize::try_from(count.unsigned_abs()).unwrap_or(usize::MAX)),
            };
            // Counting from the tail means keeping the leading matches.
            let skip = if count < 0 { matches - limit } else { 0 };

            let mut seen = 0;
            list.retain(|e| {
                if e.as_str() != element {
                    return true;
                }
                seen += 1;
                seen <= skip || seen > skip + limit
            });
            Ok(limit)
        })?
        .unwrap_or(0);

    Ok(Frame::Integer(removed as i64))
}

fn lset(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let index: i64 = parse_int(args.value("index"))?;
    let element = args.value("element");

    ctx.db()?
        .modify_existing(args.value("key"), |list: &mut List| {
            let i = resolve_index(index, list.len()).ok_or(CommandError::IndexOutOfRange)?;
            list[i] = element.to_string();
            Ok(())
        })?
        .ok_or(CommandError::NoSuchKey)?;

    Ok(Frame::ok())
}

/// Trim an existing list so that it will contain only the specified range of elements.
///
/// Ref: <https://redis.io/docs/latest/commands/ltrim/>
fn ltrim(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let start: i64 = parse_int(args.value("start"))?;
    let stop: i64 = parse_int(args.value("stop"))?;

    ctx.db()?
        .modify_existing(args.value("key"), |list: &mut List| {
            match normalize_range(start, stop, list.len()) {
                Some((start, stop)) => {
                    list.truncate(stop + 1);
                    list.drain(..start);
                }
                None => list.clear(),
            }
            Ok(())
        })?;

    Ok(Frame::ok())
}

#[cfg(test)]
mod tests {
    use crate::commands::test_utils::*;
    use crate::frame::Frame;

    #[test]
    fn push_range_pop() {
        let d = dispatcher();

        assert_eq!(run(&d, "RPUSH mylist a b c"), Frame::Integer(3));
        assert_eq!(run(&d, "LRANGE mylist 0 -1"), bulks(&["a", "b", "c"]));
        assert_eq!(run(&d, "LPOP mylist 2"), bulks(&["a", "b"]));
        assert_eq!(run(&d, "LLEN mylist"), Frame::Integer(1));
    }

    #[test]
    fn pop_variants() {
        let d = dispatcher();

        assert_eq!(run(&d, "LPOP nolist"), Frame::Null);
        assert_eq!(run(&d, "LPOP nolist 2"), Frame::NullArray);

        run(&d, "LPUSH l c b a");
        assert_eq!(run(&d, "LRANGE l 0 -1"), bulks(&["a", "b", "c"]));
        assert_eq!(run(&d, "RPOP l"), bulk("c"));
        assert_eq!(run(&d, "RPOP l 5"), bulks(&["b", "a"]));
        assert_eq!(run(&d, "EXISTS l"), Frame::Integer(0));
        assert!(is_error(&run(&d, "LPOP l -1")));
    }

    #[test]
    fn pushx_requires_existing_list() {
        let d = dispatcher();

        assert_eq!(run(&d, "LPUSHX l a"), Frame::Integer(0));
        assert_eq!(run(&d, "EXISTS l"), Frame::Integer(0));
        run(&d, "RPUSH l a");
        assert_eq!(run(&d, "RPUSHX l b c"), Frame::Integer(3));
    }

    #[test]
    fn index_insert_set() {
        let d = dispatcher();
        run(&d, "RPUSH l a b c");

        assert_eq!(run(&d, "LINDEX l 0"), bulk("a"));
        assert_eq!(run(&d, "LINDEX l -1"), bulk("c"));
        assert_eq!(run(&d, "LINDEX l 10"), Frame::Null);

        assert_eq!(run(&d, "LINSERT l before b x"), Frame::Integer(4));
        assert_eq!(run(&d, "LINSERT l AFTER c y"), Frame::Integer(5));
        assert_eq!(run(&d, "LINSERT l AFTER zz y"), Frame::Integer(-1));
        assert_eq!(run(&d, "LINSERT nolist AFTER a y"), Frame::Integer(0));
        assert!(is_error(&run(&d, "LINSERT l MIDDLE a y")));
        assert_eq!(run(&d, "LRANGE l 0 -1"), bulks(&["a", "x", "b", "c", "y"]));

        assert_eq!(run(&d, "LSET l -1 z"), ok());
        assert_eq!(run(&d, "LINDEX l 4"), bulk("z"));
        assert_eq!(
            run(&d, "LSET l 9 z"),
            Frame::Error("ERR index out of range".to_string())
        );
        assert_eq!(
            run(&d, "LSET nolist 0 z"),
            Frame::Error("ERR no such key".to_string())
        );
    }

    #[test]
    fn move_between_lists() {
        let d = dispatcher();
        run(&d, "RPUSH src one two three");

        assert_eq!(run(&d, "RPOPLPUSH src dst"), bulk("three"));
        assert_eq!(run(&d, "LMOVE src dst LEFT RIGHT"), bulk("one"));
        assert_eq!(run(&d, "LRANGE dst 0 -1"), bulks(&["three", "one"]));
        assert_eq!(run(&d, "LMOVE src src RIGHT LEFT"), bulk("two"));
        assert_eq!(run(&d, "LMOVE empty dst LEFT LEFT"), Frame::Null);

        run(&d, "SET str v");
        assert!(is_error(&run(&d, "LMOVE src str LEFT LEFT")));
        assert_eq!(run(&d, "LLEN src"), Frame::Integer(1));
    }

    #[test]
    fn lmpop() {
        let d = dispatcher();
        run(&d, "RPUSH b 1 2 3");

        assert_eq!(
            run(&d, "LMPOP 2 a b RIGHT COUNT 2"),
            Frame::Array(vec![bulk("b"), bulks(&["3", "2"])])
        );
        assert_eq!(
            run(&d, "LMPOP 1 b LEFT"),
            Frame::Array(vec![bulk("b"), bulks(&["1"])])
        );
        assert_eq!(run(&d, "LMPOP 2 a b LEFT"), Frame::NullArray);
    }

    #[test]
    fn lpos() {
        let d = dispatcher();
        run(&d, "RPUSH l a b c d 1 2 3 4 3 3 3");

        assert_eq!(run(&d, "LPOS l 3"), Frame::Integer(6));
        assert_eq!(
            run(&d, "LPOS l 3 COUNT 0 RANK 2"),
            Frame::Array(vec![
                Frame::Integer(8),
                Frame::Integer(9),
                Frame::Integer(10)
            ])
        );
        assert_eq!(run(&d, "LPOS l 3 RANK -1"), Frame::Integer(10));
        assert_eq!(run(&d, "LPOS l 3 MAXLEN 5"), Frame::Null);
        assert_eq!(run(&d, "LPOS l zz COUNT 2"), Frame::Array(vec![]));
        assert!(is_error(&run(&d, "LPOS l 3 RANK 0")));
    }

    #[test]
    fn lrem_and_ltrim() {
        let d = dispatcher();
        run(&d, "RPUSH l hello hello foo hello");

        assert_eq!(run(&d, "LREM l -2 hello"), Frame::Integer(2));
        assert_eq!(run(&d, "LRANGE l 0 -1"), bulks(&["hello", "foo"]));

        run(&d, "RPUSH m x a x b x c x");
        assert_eq!(run(&d, "LREM m 2 x"), Frame::Integer(2));
        assert_eq!(run(&d, "LRANGE m 0 -1"), bulks(&["a", "b", "x", "c", "x"]));
        assert_eq!(run(&d, "LREM m 0 x"), Frame::Integer(2));
        assert_eq!(run(&d, "LRANGE m 0 -1"), bulks(&["a", "b", "c"]));
        assert_eq!(run(&d, "LREM m 5 zz"), Frame::Integer(0));

        run(&d, "RPUSH t one two three");
        assert_eq!(run(&d, "LTRIM t 1 -1"), ok());
        assert_eq!(run(&d, "LRANGE t 0 -1"), bulks(&["two", "three"]));
        assert_eq!(run(&d, "LTRIM t 5 10"), ok());
        assert_eq!(run(&d, "EXISTS t"), Frame::Integer(0));
    }
}
