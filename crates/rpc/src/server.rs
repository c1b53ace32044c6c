//! TCP front door for the worker RPC surface. One task per accepted
//! connection, each bounded by a semaphore so a burst of reconnecting
//! workers cannot unbounded-spawn; each call on a connection is handled
//! serially against the shared [`TaskAttemptListener`], matching the
//! request/response-per-frame contract workers expect.

use crate::codec::{self, Request, Response};
use crate::listener::TaskAttemptListener;
use am_common::metrics::{RPC_CALLS_TOTAL, RPC_LATENCY_SECONDS};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

pub async fn serve(listener: Arc<TaskAttemptListener>, addr: SocketAddr, max_concurrent: usize) -> anyhow::Result<()> {
    let tcp = TcpListener::bind(addr).await?;
    let permits = Arc::new(Semaphore::new(max_concurrent));
    info!(%addr, max_concurrent, "worker rpc server listening");

    loop {
        let (socket, peer) = tcp.accept().await?;
        let listener = listener.clone();
        let permits = permits.clone();
        tokio::spawn(async move {
            let Ok(permit) = permits.acquire_owned().await else { return };
            if let Err(err) = handle_connection(socket, peer, listener).await {
                warn!(%peer, error = %err, "worker rpc connection ended with an error");
            }
            drop(permit);
        });
    }
}

async fn handle_connection(socket: TcpStream, peer: SocketAddr, listener: Arc<TaskAttemptListener>) -> anyhow::Result<()> {
    debug!(%peer, "worker rpc connection accepted");
    let mut framed = codec::framed(socket);

    while let Some(frame) = framed.next().await {
        let frame = frame?;
        let request = match codec::decode_request(&frame) {
            Ok(req) => req,
            Err(err) => {
                error!(%peer, error = %err, "failed to decode worker rpc request");
                let resp = codec::encode_response(&Response::Error(err.to_string()))?;
                framed.send(resp.into()).await?;
                continue;
            }
        };

        let (operation, response) = dispatch(&listener, request).await;
        let outcome = if matches!(response, Response::Error(_)) { "error" } else { "ok" };
        RPC_CALLS_TOTAL.with_label_values(&[operation, outcome]).inc();

        let bytes = codec::encode_response(&response)?;
        framed.send(bytes.into()).await?;
    }

    debug!(%peer, "worker rpc connection closed");
    Ok(())
}

async fn dispatch(listener: &Arc<TaskAttemptListener>, request: Request) -> (&'static str, Response) {
    match request {
        Request::GetTask(ctx) => {
            let timer = RPC_LATENCY_SECONDS.with_label_values(&["get_task"]).start_timer();
            let task = listener.get_task(ctx);
            timer.observe_duration();
            ("get_task", Response::GetTask(task))
        }
        Request::CanCommit(attempt) => {
            let timer = RPC_LATENCY_SECONDS.with_label_values(&["can_commit"]).start_timer();
            let granted = listener.can_commit(attempt).await;
            timer.observe_duration();
            ("can_commit", Response::CanCommit(granted))
        }
        Request::Heartbeat(req) => {
            let timer = RPC_LATENCY_SECONDS.with_label_values(&["heartbeat"]).start_timer();
            let result = listener.heartbeat(req);
            timer.observe_duration();
            match result {
                Ok(resp) => ("heartbeat", Response::Heartbeat(resp)),
                Err(err) => ("heartbeat", Response::Error(err.to_string())),
            }
        }
    }
}
