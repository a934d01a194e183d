//! An [`Encoder`] that writes one JSON value per line.

use anyhow::Error;
use bytes::{BufMut, BytesMut};
use serde::Serialize;
use std::marker::PhantomData;
use tokio_util::codec::Encoder;

/// Writes a [line-delimited JSON stream][json], so we can send listings of
/// files, estimators and tasks to stdout through a `FramedWrite`.
///
/// [json]: https://en.wikipedia.org/wiki/JSON_streaming
pub struct LineDelimitedJsonCodec<T: Serialize> {
    _placeholder: PhantomData<T>,
}

impl<T: Serialize> LineDelimitedJsonCodec<T> {
    /// Create a new `LineDelimitedJsonCodec`.
    pub fn new() -> Self {
        Self {
            _placeholder: PhantomData,
        }
    }
}

impl<T: Serialize> Encoder<T> for LineDelimitedJsonCodec<T> {
    type Error = Error;

    fn encode(&mut self, item: T, buf: &mut BytesMut) -> Result<(), Error> {
        let json = serde_json::to_vec(&item)?;
        buf.reserve(json.len() + 1);
        buf.put(&json[..]);
        buf.put_u8(b'\n');
        Ok(())
    }
}

#[test]
fn writes_one_value_per_line() {
    let mut codec = LineDelimitedJsonCodec::new();
    let mut buf = BytesMut::new();
    codec.encode(serde_json::json!({ "path": "a.tif" }), &mut buf).unwrap();
    codec.encode(serde_json::json!(null), &mut buf).unwrap();
    assert_eq!(&buf[..], b"{\"path\":\"a.tif\"}\nnull\n");
}
