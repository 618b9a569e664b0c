//! Volume plugin protocol over a Unix socket
//!
//! Requests are `POST /<Method>` with a JSON body; every response is JSON and
//! carries an `Err` field that is empty on success.

use std::collections::HashMap;
use std::convert::Infallible;
use std::io;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::UnixListener;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::driver::Driver;
use crate::error::DriverError;

/// Media type used by the plugin protocol
pub const PLUGIN_CONTENT_TYPE: &str = "application/vnd.docker.plugins.v1.1+json";

#[derive(Debug, Deserialize)]
struct CreateRequest {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Opts", default)]
    opts: Option<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct NameRequest {
    #[serde(rename = "Name")]
    name: String,
    /// Caller ID on mount/unmount; not used for counting
    #[serde(rename = "ID", default)]
    id: String,
}

fn ok(value: Value) -> (StatusCode, Value) {
    (StatusCode::OK, value)
}

fn failure(err: &DriverError) -> (StatusCode, Value) {
    debug!("Returning {} error: {}", err.kind(), err);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({ "Err": err.to_string() }),
    )
}

fn bad_request(msg: String) -> (StatusCode, Value) {
    (StatusCode::BAD_REQUEST, json!({ "Err": msg }))
}

fn decode<'a, T: Deserialize<'a>>(body: &'a [u8]) -> Result<T, (StatusCode, Value)> {
    serde_json::from_slice(body).map_err(|e| bad_request(format!("invalid request: {}", e)))
}

/// Route one request to the driver
pub async fn dispatch(driver: &Driver, path: &str, body: &[u8]) -> (StatusCode, Value) {
    match path {
        "/Plugin.Activate" => ok(json!({ "Implements": ["VolumeDriver"] })),
        "/VolumeDriver.Create" => {
            let req: CreateRequest = match decode(body) {
                Ok(r) => r,
                Err(resp) => return resp,
            };
            match driver.create(&req.name, &req.opts.unwrap_or_default()) {
                Ok(()) => ok(json!({ "Err": "" })),
                Err(e) => failure(&e),
            }
        }
        "/VolumeDriver.Remove" => {
            let req: NameRequest = match decode(body) {
                Ok(r) => r,
                Err(resp) => return resp,
            };
            match driver.remove(&req.name) {
                Ok(()) => ok(json!({ "Err": "" })),
                Err(e) => failure(&e),
            }
        }
        "/VolumeDriver.Mount" => {
            let req: NameRequest = match decode(body) {
                Ok(r) => r,
                Err(resp) => return resp,
            };
            debug!("Mount request for {} from {:?}", req.name, req.id);
            match driver.mount(&req.name).await {
                Ok(mountpoint) => ok(json!({ "Mountpoint": mountpoint, "Err": "" })),
                Err(e) => failure(&e),
            }
        }
        "/VolumeDriver.Unmount" => {
            let req: NameRequest = match decode(body) {
                Ok(r) => r,
                Err(resp) => return resp,
            };
            debug!("Unmount request for {} from {:?}", req.name, req.id);
            match driver.unmount(&req.name).await {
                Ok(()) => ok(json!({ "Err": "" })),
                Err(e) => failure(&e),
            }
        }
        "/VolumeDriver.Path" => {
            let req: NameRequest = match decode(body) {
                Ok(r) => r,
                Err(resp) => return resp,
            };
            match driver.path(&req.name) {
                Ok(mountpoint) => ok(json!({ "Mountpoint": mountpoint, "Err": "" })),
                Err(e) => failure(&e),
            }
        }
        "/VolumeDriver.Get" => {
            let req: NameRequest = match decode(body) {
                Ok(r) => r,
                Err(resp) => return resp,
            };
            match driver.get(&req.name) {
                Ok(info) => ok(json!({
                    "Volume": {
                        "Name": info.name,
                        "Mountpoint": info.mountpoint,
                        "Status": {},
                    },
                    "Err": "",
                })),
                Err(e) => failure(&e),
            }
        }
        "/VolumeDriver.List" => ok(json!({ "Volumes": driver.list(), "Err": "" })),
        "/VolumeDriver.Capabilities" => ok(json!({ "Capabilities": driver.capabilities() })),
        other => (
            StatusCode::NOT_FOUND,
            json!({ "Err": format!("unknown method {}", other) }),
        ),
    }
}

fn json_response(status: StatusCode, value: &Value) -> Response<Full<Bytes>> {
    let body = serde_json::to_vec(value).unwrap_or_else(|_| b"{}".to_vec());
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(PLUGIN_CONTENT_TYPE));
    response
}

async fn handle(
    driver: Arc<Driver>,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let path = req.uri().path().to_string();
    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            let (status, value) = bad_request(format!("failed to read body: {}", e));
            return Ok(json_response(status, &value));
        }
    };

    let (status, value) = dispatch(&driver, &path, &body).await;
    Ok(json_response(status, &value))
}

/// Bind the plugin socket, replacing a stale socket file
pub fn bind(socket: &Path) -> io::Result<UnixListener> {
    if let Some(parent) = socket.parent() {
        std::fs::create_dir_all(parent)?;
    }
    match std::fs::remove_file(socket) {
        Ok(()) => debug!("Removed stale socket {:?}", socket),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    UnixListener::bind(socket)
}

/// Accept connections until `shutdown` is notified.
///
/// Each connection is served on its own task, so a slow mount never blocks
/// other requests.
pub async fn serve(listener: UnixListener, driver: Arc<Driver>, shutdown: Arc<Notify>) {
    loop {
        tokio::select! {
            _ = shutdown.notified() => {
                info!("Plugin server shutting down");
                return;
            }
            accepted = listener.accept() => {
                let stream = match accepted {
                    Ok((stream, _)) => stream,
                    Err(e) => {
                        warn!("Failed to accept plugin connection: {}", e);
                        continue;
                    }
                };

                let driver = driver.clone();
                tokio::spawn(async move {
                    let service = service_fn(move |req| handle(driver.clone(), req));
                    if let Err(e) = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await
                    {
                        debug!("Plugin connection closed with error: {}", e);
                    }
                });
            }
        }
    }
}
