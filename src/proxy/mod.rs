use bytes::Bytes;
use futures::TryStreamExt;
use http_body_util::{combinators::UnsyncBoxBody, BodyExt, Empty, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::transport::BodyStream;

pub mod dispatcher;
pub mod forward;
pub mod router;

pub use dispatcher::Dispatcher;
pub use forward::Forwarder;
pub use router::DatRouter;

/// Outbound response body: streamed, never buffered.
pub type ProxyBody = UnsyncBoxBody<Bytes, io::Error>;

pub fn empty_body() -> ProxyBody {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed_unsync()
}

pub fn stream_body(body: BodyStream) -> ProxyBody {
    StreamBody::new(body.map_ok(Frame::data)).boxed_unsync()
}

pub struct ProxyServer {
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
}

impl ProxyServer {
    pub async fn bind(addr: &str, dispatcher: Arc<Dispatcher>) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "Proxy listening");
        Ok(Self {
            listener,
            dispatcher,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until a shutdown signal arrives. Each connection is
    /// served on its own task.
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Shutdown initiated, stopping accept loop");
                    break;
                }

                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            warn!(error = %e, "Failed to accept connection");
                            continue;
                        }
                    };
                    let dispatcher = self.dispatcher.clone();

                    tokio::spawn(async move {
                        let service = service_fn(move |req: Request<Incoming>| {
                            let dispatcher = dispatcher.clone();
                            async move { Ok::<_, Infallible>(dispatcher.dispatch(req).await) }
                        });

                        if let Err(e) = http1::Builder::new()
                            .serve_connection(TokioIo::new(stream), service)
                            .await
                        {
                            debug!(%peer, error = %e, "Connection closed with error");
                        }
                    });
                }
            }
        }

        Ok(())
    }
}
