// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Prometheus text-exposition HTTP endpoint (spec.md §6's `--prom-address`,
//! SPEC_FULL.md §9's ambient metrics surface). One handler, one route:
//! every request gets the current `Metrics::encode()` snapshot.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use qrunner_engine::Metrics;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

async fn serve(metrics: Arc<Metrics>, _req: Request<hyper::body::Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    Ok(Response::new(Full::new(Bytes::from(metrics.encode()))))
}

/// Binds `addr` and serves metrics until `cancel` fires. A bind failure is
/// returned to the caller rather than panicking — the daemon should still
/// be able to run with metrics disabled by simply not passing
/// `--prom-address`, but a bad address for one that *was* passed is a
/// startup error.
pub async fn run(addr: SocketAddr, metrics: Arc<Metrics>, cancel: CancellationToken) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "metrics endpoint listening");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, _peer) = match accepted {
                    Ok(pair) => pair,
                    Err(err) => {
                        warn!(error = %err, "metrics endpoint accept failed");
                        continue;
                    }
                };
                let io = TokioIo::new(stream);
                let metrics = metrics.clone();
                tokio::spawn(async move {
                    let service = service_fn(move |req| serve(metrics.clone(), req));
                    if let Err(err) = hyper_util::server::conn::auto::Builder::new(hyper_util::rt::TokioExecutor::new())
                        .serve_connection(io, service)
                        .await
                    {
                        warn!(error = %err, "metrics endpoint connection failed");
                    }
                });
            }
            _ = cancel.cancelled() => return Ok(()),
        }
    }
}

#[cfg(test)]
#[path = "metrics_server_tests.rs"]
mod tests;
