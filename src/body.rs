use std::{
    any::Any,
    fmt,
    io::{self, Cursor, Read, Seek, SeekFrom},
    sync::{Arc, Mutex},
};

use bytes::Bytes;
use serde::Serialize;
use tokio::task;

use crate::{Error, Result};

/// Readable and seekable payload source.
pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek> ReadSeek for T {}

type Factory = Arc<dyn Fn() -> io::Result<Bytes> + Send + Sync>;

/// Request payload in any of the supported shapes.
///
/// Converted once into a [`ReplayableBody`] when attached to a
/// [`Request`](crate::Request).
pub enum RequestBody {
    Empty,
    /// In-memory bytes; replayed by cheap clones.
    Bytes(Bytes),
    /// Rewound to the start before every read.
    Seekable(Box<dyn ReadSeek + Send>),
    /// Forward-only source; buffered in full on materialization.
    Reader(Box<dyn Read + Send>),
    /// Caller-supplied producer, invoked once per attempt.
    Factory { factory: Factory, len: Option<u64> },
}

impl RequestBody {
    pub fn seekable<R>(reader: R) -> Self
    where
        R: Read + Seek + Send + 'static,
    {
        Self::Seekable(Box::new(reader))
    }

    pub fn reader<R>(reader: R) -> Self
    where
        R: Read + Send + 'static,
    {
        Self::Reader(Box::new(reader))
    }

    /// Wraps a producer that must return the same bytes on every call.
    pub fn factory<F>(factory: F, len: Option<u64>) -> Self
    where
        F: Fn() -> io::Result<Bytes> + Send + Sync + 'static,
    {
        Self::Factory {
            factory: Arc::new(factory),
            len,
        }
    }

    /// Serializes `value` as a JSON payload.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        serde_json::to_vec(value)
            .map(|encoded| Self::Bytes(Bytes::from(encoded)))
            .map_err(|err| Error::body(io::Error::new(io::ErrorKind::InvalidData, err)))
    }

    /// Resolves a dynamically typed payload into one of the known shapes.
    ///
    /// Accepts `RequestBody`, `Bytes`, `Vec<u8>`, `String`, `&'static str`,
    /// `&'static [u8]`, `Cursor<Vec<u8>>`, `std::fs::File` and `()`.
    pub fn from_any(value: Box<dyn Any + Send>) -> Result<Self> {
        let value = match value.downcast::<RequestBody>() {
            Ok(body) => return Ok(*body),
            Err(value) => value,
        };
        let value = match value.downcast::<Bytes>() {
            Ok(bytes) => return Ok((*bytes).into()),
            Err(value) => value,
        };
        let value = match value.downcast::<Vec<u8>>() {
            Ok(bytes) => return Ok((*bytes).into()),
            Err(value) => value,
        };
        let value = match value.downcast::<String>() {
            Ok(text) => return Ok((*text).into()),
            Err(value) => value,
        };
        let value = match value.downcast::<&'static str>() {
            Ok(text) => return Ok((*text).into()),
            Err(value) => value,
        };
        let value = match value.downcast::<&'static [u8]>() {
            Ok(bytes) => return Ok((*bytes).into()),
            Err(value) => value,
        };
        let value = match value.downcast::<Cursor<Vec<u8>>>() {
            Ok(cursor) => return Ok((*cursor).into()),
            Err(value) => value,
        };
        let value = match value.downcast::<std::fs::File>() {
            Ok(file) => return Ok(Self::seekable(*file)),
            Err(value) => value,
        };
        match value.downcast::<()>() {
            Ok(_) => Ok(Self::Empty),
            Err(_) => Err(Error::UnsupportedBody(
                "expected bytes, text, a cursor, a file or a RequestBody".to_owned(),
            )),
        }
    }
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Self::Seekable(_) => f.write_str("Seekable(..)"),
            Self::Reader(_) => f.write_str("Reader(..)"),
            Self::Factory { len, .. } => f.debug_struct("Factory").field("len", len).finish(),
        }
    }
}

impl From<()> for RequestBody {
    fn from(_: ()) -> Self {
        Self::Empty
    }
}

impl From<Bytes> for RequestBody {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes.into())
    }
}

impl From<String> for RequestBody {
    fn from(text: String) -> Self {
        Self::Bytes(text.into())
    }
}

impl From<&'static str> for RequestBody {
    fn from(text: &'static str) -> Self {
        Self::Bytes(Bytes::from_static(text.as_bytes()))
    }
}

impl From<&'static [u8]> for RequestBody {
    fn from(bytes: &'static [u8]) -> Self {
        Self::Bytes(Bytes::from_static(bytes))
    }
}

impl From<Cursor<Vec<u8>>> for RequestBody {
    /// Keeps only the unread remainder of the buffer.
    fn from(cursor: Cursor<Vec<u8>>) -> Self {
        let position = usize::try_from(cursor.position()).unwrap_or(usize::MAX);
        let mut bytes = Bytes::from(cursor.into_inner());
        Self::Bytes(bytes.split_off(position.min(bytes.len())))
    }
}

#[derive(Clone)]
enum Source {
    Buffered(Bytes),
    /// Blocking producer, run on the blocking pool for every attempt.
    Blocking(Factory),
}

/// Body that yields identical bytes on every [`open`](ReplayableBody::open).
#[derive(Clone)]
pub struct ReplayableBody {
    source: Source,
    len: Option<u64>,
}

impl ReplayableBody {
    /// Produces a fresh copy of the payload for one attempt.
    ///
    /// Seekable sources and factories may block, so they are read through
    /// [`tokio::task::spawn_blocking`] and never stall the calling worker.
    pub async fn open(&self) -> Result<Bytes> {
        match &self.source {
            Source::Buffered(bytes) => Ok(bytes.clone()),
            Source::Blocking(factory) => {
                let factory = Arc::clone(factory);
                task::spawn_blocking(move || factory())
                    .await
                    .map_err(|err| Error::body(io::Error::new(io::ErrorKind::Other, err)))?
                    .map_err(Error::body)
            }
        }
    }

    /// Payload length when known without reading it.
    pub fn len(&self) -> Option<u64> {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == Some(0)
    }
}

impl fmt::Debug for ReplayableBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplayableBody")
            .field("len", &self.len)
            .finish()
    }
}

/// Turns a payload into a replayable body.
///
/// Forward-only readers are drained here, so any read error surfaces before
/// the first attempt.
pub fn materialize(body: RequestBody) -> Result<ReplayableBody> {
    match body {
        RequestBody::Empty => Ok(from_bytes(Bytes::new())),
        RequestBody::Bytes(bytes) => Ok(from_bytes(bytes)),
        RequestBody::Reader(mut reader) => {
            let mut buffer = Vec::new();
            reader.read_to_end(&mut buffer).map_err(Error::body)?;
            Ok(from_bytes(buffer.into()))
        }
        RequestBody::Seekable(mut reader) => {
            let len = reader.seek(SeekFrom::End(0)).map_err(Error::body)?;
            reader.rewind().map_err(Error::body)?;
            let reader = Mutex::new(reader);
            Ok(ReplayableBody {
                source: Source::Blocking(Arc::new(move || -> io::Result<Bytes> {
                    let mut reader = reader.lock().map_err(|_| {
                        io::Error::new(io::ErrorKind::Other, "seekable body lock poisoned")
                    })?;
                    reader.rewind()?;
                    let mut buffer = Vec::with_capacity(usize::try_from(len).unwrap_or(0));
                    reader.read_to_end(&mut buffer)?;
                    Ok(buffer.into())
                })),
                len: Some(len),
            })
        }
        RequestBody::Factory { factory, len } => Ok(ReplayableBody {
            source: Source::Blocking(factory),
            len,
        }),
    }
}

fn from_bytes(bytes: Bytes) -> ReplayableBody {
    let len = bytes.len() as u64;
    ReplayableBody {
        source: Source::Buffered(bytes),
        len: Some(len),
    }
}
