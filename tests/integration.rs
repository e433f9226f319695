use std::collections::HashSet;
use std::net::SocketAddr;

use redis::aio::MultiplexedConnection;
use redis::{RedisError, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, Duration};
use zedis::config::Config;
use zedis::server::serve;

/// Starts a server on a free port. Each test gets its own server, so tests can run in parallel.
async fn start() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(serve(listener, Config::default()));

    addr
}

async fn connect(addr: SocketAddr) -> Result<MultiplexedConnection, RedisError> {
    let client = redis::Client::open(format!("redis://{}/", addr))?;
    client.get_multiplexed_async_connection().await
}

async fn query<T: redis::FromRedisValue>(
    con: &mut MultiplexedConnection,
    args: &[&str],
) -> Result<T, RedisError> {
    let mut cmd = redis::cmd(args[0]);
    for arg in &args[1..] {
        cmd.arg(*arg);
    }
    cmd.query_async(con).await
}

#[tokio::test]
async fn test_strings() {
    let mut con = connect(start().await).await.unwrap();

    let ok: String = query(&mut con, &["SET", "foo", "bar"]).await.unwrap();
    assert_eq!(ok, "OK");

    let value: String = query(&mut con, &["GET", "foo"]).await.unwrap();
    assert_eq!(value, "bar");

    let len: i64 = query(&mut con, &["APPEND", "foo", "baz"]).await.unwrap();
    assert_eq!(len, 6);

    let value: String = query(&mut con, &["GET", "foo"]).await.unwrap();
    assert_eq!(value, "barbaz");
}

#[tokio::test]
async fn test_lists() {
    let mut con = connect(start().await).await.unwrap();

    let len: i64 = query(&mut con, &["RPUSH", "mylist", "a", "b", "c"])
        .await
        .unwrap();
    assert_eq!(len, 3);

    let all: Vec<String> = query(&mut con, &["LRANGE", "mylist", "0", "-1"])
        .await
        .unwrap();
    assert_eq!(all, vec!["a", "b", "c"]);

    let popped: Vec<String> = query(&mut con, &["LPOP", "mylist", "2"]).await.unwrap();
    assert_eq!(popped, vec!["a", "b"]);

    let len: i64 = query(&mut con, &["LLEN", "mylist"]).await.unwrap();
    assert_eq!(len, 1);
}

#[tokio::test]
async fn test_sorted_sets() {
    let mut con = connect(start().await).await.unwrap();

    let added: i64 = query(&mut con, &["ZADD", "z", "1", "a", "2", "b", "3", "c"])
        .await
        .unwrap();
    assert_eq!(added, 3);

    let with_scores: Vec<String> = query(&mut con, &["ZRANGE", "z", "0", "-1", "WITHSCORES"])
        .await
        .unwrap();
    assert_eq!(with_scores, vec!["a", "1", "b", "2", "c", "3"]);

    let by_score: Vec<String> = query(&mut con, &["ZRANGEBYSCORE", "z", "2", "3"])
        .await
        .unwrap();
    assert_eq!(by_score, vec!["b", "c"]);

    let removed: i64 = query(&mut con, &["ZREM", "z", "b"]).await.unwrap();
    assert_eq!(removed, 1);

    let card: i64 = query(&mut con, &["ZCARD", "z"]).await.unwrap();
    assert_eq!(card, 2);
}

#[tokio::test]
async fn test_sets() {
    let mut con = connect(start().await).await.unwrap();

    let added: i64 = query(&mut con, &["SADD", "s", "a", "b", "c"]).await.unwrap();
    assert_eq!(added, 3);
    let added: i64 = query(&mut con, &["SADD", "s2", "b", "c", "d"]).await.unwrap();
    assert_eq!(added, 3);

    let inter: HashSet<String> = query(&mut con, &["SINTER", "s", "s2"]).await.unwrap();
    assert_eq!(inter, HashSet::from(["b".to_string(), "c".to_string()]));

    let stored: i64 = query(&mut con, &["SDIFFSTORE", "d", "s", "s2"])
        .await
        .unwrap();
    assert_eq!(stored, 1);

    let members: Vec<String> = query(&mut con, &["SMEMBERS", "d"]).await.unwrap();
    assert_eq!(members, vec!["a"]);
}

#[tokio::test]
async fn test_expire_and_ttl() {
    let mut con = connect(start().await).await.unwrap();

    let set: i64 = query(&mut con, &["EXPIRE", "k", "100"]).await.unwrap();
    assert_eq!(set, 0);

    let _: String = query(&mut con, &["SET", "k", "v"]).await.unwrap();
    let set: i64 = query(&mut con, &["EXPIRE", "k", "100"]).await.unwrap();
    assert_eq!(set, 1);

    let ttl: i64 = query(&mut con, &["TTL", "k"]).await.unwrap();
    assert!(ttl > 0 && ttl <= 100, "unexpected ttl {}", ttl);
}

#[tokio::test]
async fn test_expired_keys_disappear() {
    let mut con = connect(start().await).await.unwrap();

    let _: String = query(&mut con, &["SET", "k", "v", "PX", "50"]).await.unwrap();
    sleep(Duration::from_millis(100)).await;

    let value: Value = query(&mut con, &["GET", "k"]).await.unwrap();
    assert_eq!(value, Value::Nil);

    let exists: i64 = query(&mut con, &["EXISTS", "k"]).await.unwrap();
    assert_eq!(exists, 0);
}

#[tokio::test]
async fn test_unknown_command() {
    let mut con = connect(start().await).await.unwrap();

    let err = query::<Value>(&mut con, &["FOO", "bar"]).await.unwrap_err();
    assert!(err.to_string().contains("FOO"), "unexpected error {}", err);

    let pong: String = query(&mut con, &["PING"]).await.unwrap();
    assert_eq!(pong, "PONG");
}

#[tokio::test]
async fn test_wrong_type() {
    let mut con = connect(start().await).await.unwrap();

    let _: i64 = query(&mut con, &["RPUSH", "list", "a"]).await.unwrap();

    let err = query::<Value>(&mut con, &["GET", "list"]).await.unwrap_err();
    assert!(err.to_string().contains("WRONGTYPE"), "unexpected error {}", err);
}

#[tokio::test]
async fn test_connections_share_keyspace() {
    let addr = start().await;
    let mut first = connect(addr).await.unwrap();
    let mut second = connect(addr).await.unwrap();

    let _: String = query(&mut first, &["SET", "shared", "1"]).await.unwrap();
    let value: String = query(&mut second, &["GET", "shared"]).await.unwrap();
    assert_eq!(value, "1");

    // The selected database is per connection.
    let _: String = query(&mut second, &["SELECT", "1"]).await.unwrap();
    let value: Value = query(&mut second, &["GET", "shared"]).await.unwrap();
    assert_eq!(value, Value::Nil);
    let value: String = query(&mut first, &["GET", "shared"]).await.unwrap();
    assert_eq!(value, "1");
}

#[tokio::test]
async fn test_pipelined_raw_requests() {
    let addr = start().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    stream
        .write_all(b"*1\r\n$4\r\nPING\r\n*2\r\n$4\r\nECHO\r\n$2\r\nhi\r\n*1\r\n$4\r\nQUIT\r\n")
        .await
        .unwrap();

    // QUIT closes the connection once its reply is written.
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await.unwrap();
    assert_eq!(buf, b"+PONG\r\n$2\r\nhi\r\n+OK\r\n".to_vec());
}

#[tokio::test]
async fn test_malformed_frame_closes_connection() {
    let addr = start().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    stream.write_all(b"?garbage\r\n").await.unwrap();

    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await.unwrap();
    assert!(buf.starts_with(b"-ERR "));
}
