//! Commands the server recognises but does not implement. Each one accepts any arguments and
//! replies with a "not implemented" error, so clients get a clear answer instead of an unknown
//! command.

use crate::commands::Registry;

const BLOCKING: &[&str] = &[
    "BLMOVE",
    "BLMPOP",
    "BLPOP",
    "BRPOP",
    "BRPOPLPUSH",
    "BZMPOP",
    "BZPOPMAX",
    "BZPOPMIN",
];

const KEYSPACE: &[&str] = &[
    "DUMP",
    "HSCAN",
    "MIGRATE",
    "OBJECT ENCODING",
    "OBJECT FREQ",
    "OBJECT HELP",
    "OBJECT IDLETIME",
    "OBJECT REFCOUNT",
    "RESTORE",
    "SCAN",
    "SORT",
    "SORT_RO",
    "SSCAN",
    "WAIT",
    "WAITAOF",
    "ZSCAN",
];

const SERVER: &[&str] = &[
    "ACL CAT",
    "ACL DELUSER",
    "ACL GETUSER",
    "ACL LIST",
    "ACL SETUSER",
    "ACL USERS",
    "ACL WHOAMI",
    "AUTH",
    "BGREWRITEAOF",
    "BGSAVE",
    "CLIENT KILL",
    "CLIENT PAUSE",
    "CLIENT UNPAUSE",
    "COMMAND DOCS",
    "COMMAND INFO",
    "COMMAND LIST",
    "CONFIG RESETSTAT",
    "CONFIG REWRITE",
    "HELLO",
    "LASTSAVE",
    "MEMORY USAGE",
    "MODULE LIST",
    "MODULE LOAD",
    "MONITOR",
    "SAVE",
    "SHUTDOWN",
    "SLOWLOG GET",
];

const CLUSTER: &[&str] = &[
    "ASKING",
    "CLUSTER INFO",
    "CLUSTER NODES",
    "CLUSTER SLOTS",
    "CLUSTER SHARDS",
    "READONLY",
    "READWRITE",
    "REPLICAOF",
    "SLAVEOF",
];

const SCRIPTING: &[&str] = &[
    "EVAL",
    "EVALSHA",
    "EVALSHA_RO",
    "EVAL_RO",
    "FCALL",
    "FCALL_RO",
    "FUNCTION DELETE",
    "FUNCTION LIST",
    "FUNCTION LOAD",
    "SCRIPT EXISTS",
    "SCRIPT FLUSH",
    "SCRIPT LOAD",
];

const PUBSUB: &[&str] = &[
    "PSUBSCRIBE",
    "PUBLISH",
    "PUBSUB CHANNELS",
    "PUBSUB NUMSUB",
    "PUNSUBSCRIBE",
    "SPUBLISH",
    "SSUBSCRIBE",
    "SUBSCRIBE",
    "SUNSUBSCRIBE",
    "UNSUBSCRIBE",
];

const TRANSACTIONS: &[&str] = &["DISCARD", "EXEC", "MULTI", "UNWATCH", "WATCH"];

const STREAMS: &[&str] = &[
    "XACK",
    "XADD",
    "XAUTOCLAIM",
    "XCLAIM",
    "XDEL",
    "XGROUP CREATE",
    "XGROUP DESTROY",
    "XINFO STREAM",
    "XLEN",
    "XPENDING",
    "XRANGE",
    "XREAD",
    "XREADGROUP",
    "XREVRANGE",
    "XTRIM",
];

const GEO: &[&str] = &[
    "GEOADD",
    "GEODIST",
    "GEOHASH",
    "GEOPOS",
    "GEORADIUS",
    "GEORADIUSBYMEMBER",
    "GEOSEARCH",
    "GEOSEARCHSTORE",
];

const BITMAPS: &[&str] = &[
    "BITCOUNT",
    "BITFIELD",
    "BITFIELD_RO",
    "BITOP",
    "BITPOS",
    "GETBIT",
    "SETBIT",
];

const HYPERLOGLOG: &[&str] = &["PFADD", "PFCOUNT", "PFMERGE"];

const JSON: &[&str] = &[
    "JSON.ARRAPPEND",
    "JSON.DEL",
    "JSON.GET",
    "JSON.MGET",
    "JSON.NUMINCRBY",
    "JSON.OBJKEYS",
    "JSON.SET",
    "JSON.STRLEN",
    "JSON.TYPE",
];

const SEARCH: &[&str] = &[
    "FT.AGGREGATE",
    "FT.CREATE",
    "FT.DROPINDEX",
    "FT.INFO",
    "FT.SEARCH",
    "FT._LIST",
];

const PROBABILISTIC: &[&str] = &[
    "BF.ADD",
    "BF.EXISTS",
    "BF.RESERVE",
    "CF.ADD",
    "CF.EXISTS",
    "CF.RESERVE",
    "CMS.INCRBY",
    "CMS.QUERY",
    "TDIGEST.ADD",
    "TDIGEST.CREATE",
    "TOPK.ADD",
    "TOPK.RESERVE",
];

pub fn register(registry: &mut Registry) {
    let families = [
        BLOCKING,
        KEYSPACE,
        SERVER,
        CLUSTER,
        SCRIPTING,
        PUBSUB,
        TRANSACTIONS,
        STREAMS,
        GEO,
        BITMAPS,
        HYPERLOGLOG,
        JSON,
        SEARCH,
        PROBABILISTIC,
    ];

    for name in families.into_iter().flatten().copied() {
        registry.stub(name);
    }
}
