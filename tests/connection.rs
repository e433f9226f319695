use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::time::{sleep, Duration};

use zedis::codec::FrameCodec;
use zedis::connection::Connection;
use zedis::frame::Frame;

/// A connection whose peer writes whatever is pushed into the returned channel. Dropping the
/// sender closes the peer side of the socket.
async fn feed(codec: FrameCodec) -> (UnboundedSender<Vec<u8>>, Connection) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let local_addr = listener.local_addr().unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();

    tokio::spawn(async move {
        if let Ok((mut socket, _)) = listener.accept().await {
            while let Some(data) = rx.recv().await {
                if socket.write_all(&data).await.is_err() {
                    break;
                }
            }
        }
    });

    let stream = TcpStream::connect(local_addr).await.unwrap();

    (tx, Connection::with_codec(stream, codec))
}

async fn read_one(bytes: &[u8]) -> Option<Frame> {
    let (tx, mut connection) = feed(FrameCodec::default()).await;
    tx.send(bytes.to_vec()).unwrap();

    connection.read_frame().await.unwrap()
}

fn bulk(s: &'static str) -> Frame {
    Frame::Bulk(Bytes::from(s))
}

#[tokio::test]
async fn test_read_scalars() {
    assert_eq!(
        read_one(b"+OK\r\n").await,
        Some(Frame::Simple("OK".to_string()))
    );
    assert_eq!(
        read_one(b"-ERR boom\r\n").await,
        Some(Frame::Error("ERR boom".to_string()))
    );
    assert_eq!(read_one(b":-42\r\n").await, Some(Frame::Integer(-42)));
    assert_eq!(read_one(b"$5\r\nhello\r\n").await, Some(bulk("hello")));
    assert_eq!(read_one(b"$0\r\n\r\n").await, Some(bulk("")));
}

#[tokio::test]
async fn test_read_nulls() {
    assert_eq!(read_one(b"$-1\r\n").await, Some(Frame::Null));
    assert_eq!(read_one(b"*-1\r\n").await, Some(Frame::NullArray));
    assert_eq!(read_one(b"*0\r\n").await, Some(Frame::Array(vec![])));
}

#[tokio::test]
async fn test_read_nested_array() {
    let actual = read_one(b"*2\r\n$4\r\nZPOP\r\n*2\r\n$1\r\na\r\n:1\r\n").await;
    let expected = Frame::Array(vec![
        bulk("ZPOP"),
        Frame::Array(vec![bulk("a"), Frame::Integer(1)]),
    ]);

    assert_eq!(actual, Some(expected));
}

#[tokio::test]
async fn test_read_back_to_back_requests() {
    let (tx, mut connection) = feed(FrameCodec::default()).await;

    // Both requests arrive in a single write.
    tx.send(b"*2\r\n$3\r\nGET\r\n$1\r\na\r\n*2\r\n$3\r\nGET\r\n$1\r\nb\r\n".to_vec())
        .unwrap();

    for key in ["a", "b"] {
        let actual = connection.read_frame().await.unwrap();
        let expected = Frame::Array(vec![bulk("GET"), Frame::Bulk(Bytes::from(key))]);
        assert_eq!(actual, Some(expected));
    }
}

#[tokio::test]
async fn test_read_split_frame() {
    let (tx, mut connection) = feed(FrameCodec::default()).await;

    // "*3\r\n$3\r\nSET\r\n$5\r\nmykey\r\n$7\r\nmyvalue\r\n", cut mid-token.
    let parts: [&[u8]; 3] = [b"*3\r\n$3\r\nSE", b"T\r\n$5\r\nmyke", b"y\r\n$7\r\nmyvalue\r\n"];

    tokio::spawn(async move {
        for part in parts {
            tx.send(part.to_vec()).unwrap();
            sleep(Duration::from_millis(50)).await;
        }
    });

    let actual = connection.read_frame().await.unwrap();
    let expected = Frame::Array(vec![bulk("SET"), bulk("mykey"), bulk("myvalue")]);
    assert_eq!(actual, Some(expected));
}

#[tokio::test]
async fn test_read_invalid_data_type() {
    let (tx, mut connection) = feed(FrameCodec::default()).await;
    tx.send(b"?what\r\n".to_vec()).unwrap();

    assert!(connection.read_frame().await.is_err());
}

#[tokio::test]
async fn test_read_oversized_frame() {
    let (tx, mut connection) = feed(FrameCodec::new(16)).await;

    tx.send(b"*2\r\n$3\r\nGET\r\n$20\r\naaaaaaaaaaaaaaaaaaaa\r\n".to_vec())
        .unwrap();

    assert!(connection.read_frame().await.is_err());
}

#[tokio::test]
async fn test_read_deeply_nested_array() {
    let (tx, mut connection) = feed(FrameCodec::default()).await;

    let mut data = b"*1\r\n".repeat(500_000);
    data.extend_from_slice(b":1\r\n");
    tx.send(data).unwrap();

    assert!(connection.read_frame().await.is_err());
}

#[tokio::test]
async fn test_read_after_peer_closes() {
    let (tx, mut connection) = feed(FrameCodec::default()).await;

    tx.send(b":7\r\n".to_vec()).unwrap();
    drop(tx);

    assert_eq!(connection.read_frame().await.unwrap(), Some(Frame::Integer(7)));
    assert_eq!(connection.read_frame().await.unwrap(), None);
}

#[tokio::test]
async fn test_write_frame() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let local_addr = listener.local_addr().unwrap();

    let reader = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        socket.read_to_end(&mut buf).await.unwrap();
        buf
    });

    let stream = TcpStream::connect(local_addr).await.unwrap();
    let mut connection = Connection::new(stream);
    connection
        .write_frame(Frame::Array(vec![
            bulk("hello"),
            Frame::Null,
            Frame::Integer(-3),
            Frame::NullArray,
        ]))
        .await
        .unwrap();
    drop(connection);

    let written = reader.await.unwrap();
    assert_eq!(written, b"*4\r\n$5\r\nhello\r\n$-1\r\n:-3\r\n*-1\r\n".to_vec());
}
