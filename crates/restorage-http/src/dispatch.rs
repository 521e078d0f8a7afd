//! Route dispatch onto the blocking engine.
//!
//! Every engine call runs inside `tokio::task::spawn_blocking`. Uploads are
//! pumped frame by frame from the request body into a bounded channel that a
//! [`ChannelReader`] drains on the blocking side; downloads run the other way.
//! A full channel applies backpressure to the producer in both directions.

use std::fmt;
use std::io::{self, Read};
use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use http_body::Body;
use http_body_util::BodyExt;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

use restorage_core::{GetResult, ObjectInfo, ObjectStore, PutResult, StoreError, StoreResult};

use crate::body::{ChannelReader, RestorageBody};
use crate::codec::{attributes_from_headers, content_range, parse_range, write_object_headers};
use crate::response::{ApiError, empty_response, json_response, set_header, with_body};
use crate::router::Route;
use crate::service::RestorageHttpConfig;

/// Body of `GET /objects/{bucket}/{key}/hash`.
#[derive(Debug, Serialize)]
pub struct HashResponse {
    /// Digest algorithm name.
    pub algorithm: &'static str,
    /// Lowercase hex digest of the payload.
    pub digest: String,
}

/// Body of `DELETE /objects/{bucket}/{key}`.
#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    /// Payload size of the deleted object.
    pub deleted: u64,
}

/// Body of `GET /_health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `"running"`.
    pub status: &'static str,
    /// Service version.
    pub version: &'static str,
}

/// Execute a resolved route against the engine.
pub async fn dispatch_route<B>(
    store: Arc<dyn ObjectStore>,
    config: &RestorageHttpConfig,
    route: Route,
    headers: &HeaderMap,
    body: B,
) -> Result<http::Response<RestorageBody>, ApiError>
where
    B: Body<Data = Bytes> + Send,
    B::Error: fmt::Display,
{
    tracing::debug!(operation = route.name(), "dispatching request");

    match route {
        Route::Health => json_response(
            StatusCode::OK,
            &HealthResponse {
                status: "running",
                version: env!("CARGO_PKG_VERSION"),
            },
        ),
        Route::CreateBucket { bucket } => {
            let info = run_blocking(move || store.create_bucket(&bucket)).await?;
            json_response(StatusCode::OK, &info)
        }
        Route::GetBucket { bucket } => {
            let name = bucket.clone();
            let info = run_blocking(move || store.get_bucket_info(&name)).await?;
            match info {
                Some(info) => json_response(StatusCode::OK, &info),
                None => Err(StoreError::BucketNotFound { bucket }.into()),
            }
        }
        Route::HeadBucket { bucket } => {
            let info = run_blocking(move || store.get_bucket_info(&bucket)).await?;
            let status = if info.is_some() {
                StatusCode::OK
            } else {
                StatusCode::NOT_FOUND
            };
            Ok(empty_response(status))
        }
        Route::DeleteBucket { bucket } => {
            run_blocking(move || store.delete_bucket(&bucket)).await?;
            Ok(empty_response(StatusCode::NO_CONTENT))
        }
        Route::PutObject { bucket, key } => {
            let result = upload(store, config, bucket, key, headers, body, UploadMode::Replace).await?;
            json_response(StatusCode::OK, &result)
        }
        Route::AppendObject { bucket, key } => {
            let result = upload(store, config, bucket, key, headers, body, UploadMode::Append).await?;
            json_response(StatusCode::OK, &result)
        }
        Route::GetObject { bucket, key } => download(store, config, bucket, key, headers).await,
        Route::HeadObject { bucket, key } => {
            let info = run_blocking(move || store.get_meta(&bucket, &key)).await?;
            let mut response = empty_response(StatusCode::OK);
            write_object_headers(&mut response, &info);
            Ok(response)
        }
        Route::GetObjectMeta { bucket, key } => {
            let info: ObjectInfo = run_blocking(move || store.get_meta(&bucket, &key)).await?;
            json_response(StatusCode::OK, &info)
        }
        Route::GetObjectHash { bucket, key } => {
            let algorithm = store.hash_algorithm().as_str();
            let digest = run_blocking(move || store.compute_hash(&bucket, &key)).await?;
            json_response(StatusCode::OK, &HashResponse { algorithm, digest })
        }
        Route::DeleteObject { bucket, key } => {
            let deleted = run_blocking(move || store.delete(&bucket, &key)).await?;
            json_response(StatusCode::OK, &DeleteResponse { deleted })
        }
    }
}

/// Run an engine call on the blocking pool.
async fn run_blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> StoreResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::internal(format!("Storage task failed: {e}")))?
        .map_err(ApiError::from)
}

#[derive(Debug, Clone, Copy)]
enum UploadMode {
    Replace,
    Append,
}

async fn upload<B>(
    store: Arc<dyn ObjectStore>,
    config: &RestorageHttpConfig,
    bucket: String,
    key: String,
    headers: &HeaderMap,
    body: B,
    mode: UploadMode,
) -> Result<PutResult, ApiError>
where
    B: Body<Data = Bytes> + Send,
    B::Error: fmt::Display,
{
    let attrs = attributes_from_headers(headers)?;
    let (tx, rx) = mpsc::channel(config.channel_depth);

    let task = tokio::task::spawn_blocking(move || {
        let mut reader = ChannelReader::new(rx);
        match mode {
            UploadMode::Replace => store.put(&bucket, &key, &mut reader, &attrs),
            UploadMode::Append => store.append(&bucket, &key, &mut reader, &attrs),
        }
    });

    let mut body = std::pin::pin!(body);
    while let Some(frame) = body.frame().await {
        let chunk = match frame {
            Ok(frame) => match frame.into_data() {
                Ok(data) => Ok(data),
                Err(_) => continue,
            },
            Err(e) => {
                tracing::debug!(error = %e, "request body failed mid-upload");
                Err(io::Error::other(format!("Failed to read request body: {e}")))
            }
        };
        let failed = chunk.is_err();
        // A closed channel means the engine stopped early; its result says why.
        if tx.send(chunk).await.is_err() || failed {
            break;
        }
    }
    drop(tx);

    task.await
        .map_err(|e| ApiError::internal(format!("Storage task failed: {e}")))?
        .map_err(ApiError::from)
}

async fn download(
    store: Arc<dyn ObjectStore>,
    config: &RestorageHttpConfig,
    bucket: String,
    key: String,
    headers: &HeaderMap,
) -> Result<http::Response<RestorageBody>, ApiError> {
    let range = parse_range(headers)?;
    let (start, end) = match range {
        Some((start, end)) => (Some(start), end),
        None => (None, None),
    };

    let (tx, rx) = mpsc::channel(config.channel_depth);
    let (ready_tx, ready_rx) = oneshot::channel::<StoreResult<ObjectInfo>>();
    let chunk_size = config.chunk_size.max(1);

    tokio::task::spawn_blocking(move || match store.get(&bucket, &key, start, end) {
        Err(err) => {
            let _ = ready_tx.send(Err(err));
        }
        Ok(GetResult { info, body }) => {
            if ready_tx.send(Ok(info)).is_ok() {
                pump_download(body, &tx, chunk_size);
            }
        }
    });

    let info = ready_rx
        .await
        .map_err(|_| ApiError::internal("Storage task ended before responding"))??;

    // A Range header must select at least one byte.
    if let Some((start, end)) = range.filter(|_| info.content_length == 0) {
        let end = end.map(|e| e.to_string()).unwrap_or_default();
        return Err(ApiError::RangeNotSatisfiable(format!("bytes={start}-{end}")));
    }

    let status = if range.is_some() {
        StatusCode::PARTIAL_CONTENT
    } else {
        StatusCode::OK
    };
    let mut response = with_body(status, RestorageBody::streaming(rx, info.content_length));
    write_object_headers(&mut response, &info);
    if let Some((start, _)) = range {
        set_header(&mut response, http::header::CONTENT_RANGE, &content_range(start, &info));
    }
    Ok(response)
}

/// Copy an engine stream into the response channel until EOF, a read
/// error, or the client going away.
fn pump_download(mut body: Box<dyn Read + Send>, tx: &mpsc::Sender<io::Result<Bytes>>, chunk_size: usize) {
    let mut buf = vec![0u8; chunk_size];
    loop {
        match body.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if tx.blocking_send(Ok(Bytes::copy_from_slice(&buf[..n]))).is_err() {
                    tracing::debug!("client dropped download");
                    break;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                tracing::warn!(error = %e, "object read failed mid-download");
                let _ = tx.blocking_send(Err(e));
                break;
            }
        }
    }
}
