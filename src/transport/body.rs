//! Streaming response bodies and incremental gzip decoding.

use bytes::{Bytes, BytesMut};
use flate2::write::GzDecoder;
use futures::stream::{self, Stream, StreamExt, TryStreamExt};
use std::io::{self, Write};
use std::pin::Pin;

pub type BodyStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// Wrap an in-memory payload as a single-chunk body.
pub fn full(data: impl Into<Bytes>) -> BodyStream {
    let data = data.into();
    Box::pin(stream::once(async move { Ok(data) }))
}

pub fn empty() -> BodyStream {
    Box::pin(stream::empty())
}

pub async fn collect(mut body: BodyStream) -> io::Result<Bytes> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = body.try_next().await? {
        buf.extend_from_slice(&chunk);
    }
    Ok(buf.freeze())
}

/// Decompress a gzip body chunk by chunk without buffering the whole payload.
pub fn gunzip(body: BodyStream) -> BodyStream {
    let decoder = Some(GzDecoder::new(Vec::new()));

    Box::pin(stream::unfold(
        (body, decoder),
        |(mut body, mut decoder)| async move {
            loop {
                let dec = decoder.as_mut()?;
                match body.next().await {
                    Some(Ok(chunk)) => {
                        if let Err(err) = dec.write_all(&chunk) {
                            return Some((Err(err), (body, None)));
                        }
                        let out = std::mem::take(dec.get_mut());
                        if !out.is_empty() {
                            return Some((Ok(Bytes::from(out)), (body, decoder)));
                        }
                    }
                    Some(Err(err)) => return Some((Err(err), (body, None))),
                    None => {
                        let mut dec = decoder.take()?;
                        if let Err(err) = dec.try_finish() {
                            return Some((Err(err), (body, None)));
                        }
                        let out = std::mem::take(dec.get_mut());
                        if out.is_empty() {
                            return None;
                        }
                        return Some((Ok(Bytes::from(out)), (body, None)));
                    }
                }
            }
        },
    ))
}
