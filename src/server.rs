use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, instrument, warn};

use crate::clients::{ClientIds, Clients};
use crate::codec::FrameCodec;
use crate::config::Config;
use crate::connection::Connection;
use crate::dispatcher::Dispatcher;
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// Installs the log subscriber, binds the configured address and serves until the process ends.
pub async fn run(config: Config) -> Result<(), Error> {
    let _ = tracing_subscriber::fmt()
        .try_init()
        .map_err(|e| debug!("Failed to initialize global tracing: {}", e));

    let listener = TcpListener::bind((config.bind.as_str(), config.port)).await?;

    info!("Zedis server listening on {}", listener.local_addr()?);

    serve(listener, config).await
}

/// Accepts connections on an already bound listener. Every connection runs on its own task and
/// shares one keyspace with the others.
pub async fn serve(listener: TcpListener, config: Config) -> Result<(), Error> {
    let store = Store::new();
    {
        let mut state = store.lock();
        let runtime = state.config_mut();
        runtime.set("port", &listener.local_addr()?.port().to_string())?;
        runtime.set("bind", &config.bind)?;
    }

    let clients = Clients::new(Arc::new(ClientIds::new()));
    let dispatcher = Dispatcher::new(store, clients);

    loop {
        let (socket, client_address) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                error!("Failed to accept connection: {}", e);
                continue;
            }
        };
        info!("Accepted connection from {:?}", client_address);

        let dispatcher = dispatcher.clone();
        let codec = FrameCodec::new(config.max_frame_size);

        tokio::spawn(async move {
            if let Err(e) = handle_connection(socket, client_address, dispatcher, codec).await {
                error!("Connection failed: {}", e);
            }
        });
    }
}

#[instrument(
    name = "connection",
    skip(stream, dispatcher, codec),
    fields(client_id, client_address)
)]
async fn handle_connection(
    stream: TcpStream,
    client_address: SocketAddr,
    dispatcher: Dispatcher,
    codec: FrameCodec,
) -> Result<(), Error> {
    let addr = client_address.to_string();
    let id = dispatcher.clients().register(&addr);

    tracing::Span::current()
        .record("client_id", id)
        .record("client_address", addr.as_str());

    let mut conn = Connection::with_codec(stream, codec);
    let res = process(&mut conn, &addr, &dispatcher).await;

    dispatcher.clients().remove(&addr);
    info!("Connection closed");

    res
}

/// Reads requests and writes replies until the peer hangs up, sends `QUIT`, or breaks framing.
async fn process(conn: &mut Connection, addr: &str, dispatcher: &Dispatcher) -> Result<(), Error> {
    loop {
        let frame = match conn.read_frame().await {
            Ok(Some(frame)) => frame,
            Ok(None) => return Ok(()),
            Err(e) => {
                warn!("Failed to read frame: {}", e);
                // The stream can't be resynchronised, tell the client why before hanging up.
                let _ = conn.write_frame(Frame::Error(format!("ERR {}", e))).await;
                return Ok(());
            }
        };

        debug!("Received frame from client: {}", frame);
        let quit = is_quit(&frame);

        let res = dispatcher.dispatch(addr, frame);
        debug!("Sending response to client: {}", res);
        conn.write_frame(res).await?;

        if quit {
            return Ok(());
        }
    }
}

fn is_quit(frame: &Frame) -> bool {
    let Frame::Array(parts) = frame else {
        return false;
    };

    match parts.first() {
        Some(Frame::Bulk(name)) => name.eq_ignore_ascii_case(b"QUIT"),
        Some(Frame::Simple(name)) => name.eq_ignore_ascii_case("QUIT"),
        _ => false,
    }
}
