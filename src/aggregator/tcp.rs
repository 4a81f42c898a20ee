//! The messaging transport over TCP.
//!
//! Frames are a little-endian `u32` length followed by one archived
//! [`AggregatorRequest`] or [`AggregatorResponse`].

use super::messaging::{AggregatorClient, AggregatorRendezvous, AggregatorRequest, AggregatorResponse};
use crate::{
    archive::{from_bytes, to_bytes, Writable},
    error::{Error, Result},
};
use log::{debug, info, warn};
use std::{
    io::{self, Read, Write},
    net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
};

fn write_frame<T: Writable>(stream: &mut TcpStream, value: &T) -> Result<()> {
    let body = to_bytes(value);
    let len = u32::try_from(body.len())
        .map_err(|_| Error::Sync(format!("frame of {} bytes too large", body.len())))?;
    stream.write_all(&len.to_le_bytes())?;
    stream.write_all(&body)?;
    stream.flush()?;
    Ok(())
}

/// Reads one frame, or `None` if the peer closed the connection between
/// frames.
fn read_frame<T: Writable>(stream: &mut TcpStream) -> Result<Option<T>> {
    let mut len = [0u8; 4];
    match stream.read_exact(&mut len) {
        Ok(()) => (),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let mut body = vec![0u8; u32::from_le_bytes(len) as usize];
    stream.read_exact(&mut body)?;
    from_bytes(&body).map(Some)
}

/// Serves aggregator requests of non-root workers for the root.
///
/// Each connection is handled on its own thread and may carry any number of
/// requests. The server stops accepting on [`shutdown`](Self::shutdown) or
/// drop.
pub struct TcpAggregatorServer {
    local_addr: SocketAddr,
    stopped: Arc<AtomicBool>,
    acceptor: Option<JoinHandle<()>>,
}

impl TcpAggregatorServer {
    pub fn bind<A: ToSocketAddrs>(addr: A, rendezvous: Arc<AggregatorRendezvous>) -> Result<Self> {
        let listener = TcpListener::bind(addr)?;
        let local_addr = listener.local_addr()?;
        let stopped = Arc::new(AtomicBool::new(false));
        let acceptor = {
            let stopped = stopped.clone();
            thread::spawn(move || accept_loop(listener, rendezvous, stopped))
        };
        info!("aggregator server listening on {}", local_addr);
        Ok(Self {
            local_addr,
            stopped,
            acceptor: Some(acceptor),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown(&mut self) {
        if let Some(acceptor) = self.acceptor.take() {
            self.stopped.store(true, Ordering::SeqCst);
            // wake the blocking accept
            let _ = TcpStream::connect(self.local_addr);
            let _ = acceptor.join();
            info!("aggregator server on {} stopped", self.local_addr);
        }
    }
}

impl Drop for TcpAggregatorServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn accept_loop(listener: TcpListener, rendezvous: Arc<AggregatorRendezvous>, stopped: Arc<AtomicBool>) {
    for stream in listener.incoming() {
        if stopped.load(Ordering::SeqCst) {
            break;
        }
        match stream {
            Ok(stream) => {
                let rendezvous = rendezvous.clone();
                thread::spawn(move || {
                    if let Err(e) = serve(stream, &rendezvous) {
                        warn!("aggregator connection closed: {}", e);
                    }
                });
            }
            Err(e) => warn!("failed to accept aggregator connection: {}", e),
        }
    }
}

fn serve(mut stream: TcpStream, rendezvous: &AggregatorRendezvous) -> Result<()> {
    let peer = stream.peer_addr()?;
    debug!("serving aggregator requests from {}", peer);
    while let Some(request) = read_frame::<AggregatorRequest>(&mut stream)? {
        let response = AggregatorResponse::from(rendezvous.submit(request));
        write_frame(&mut stream, &response)?;
    }
    debug!("{} disconnected", peer);
    Ok(())
}

/// A non-root worker's connection to the root's [`TcpAggregatorServer`].
pub struct TcpAggregatorClient {
    stream: TcpStream,
}

impl TcpAggregatorClient {
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        Ok(Self { stream })
    }
}

impl AggregatorClient for TcpAggregatorClient {
    fn request(&mut self, request: AggregatorRequest) -> Result<Vec<u8>> {
        write_frame(&mut self.stream, &request)?;
        match read_frame::<AggregatorResponse>(&mut self.stream)? {
            Some(AggregatorResponse::Merged(bytes)) => Ok(bytes),
            Some(AggregatorResponse::Failed(message)) => Err(Error::Sync(message)),
            None => Err(Error::Sync("aggregator server closed the connection".to_string())),
        }
    }
}
