//! Session inputs.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::AsyncRead;

use crate::args::ArgList;

/// Boxed byte source piped into the engine's stdin.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Token passed to the engine in place of a live input stream.
pub(crate) const STDIN_TOKEN: &str = "pipe:0";

/// A live byte-stream input.
///
/// Clones share the same underlying reader: whichever run starts first takes
/// it, later runs see it as consumed.
#[derive(Clone)]
pub struct InputStream {
    inner: Arc<Mutex<Option<BoxedReader>>>,
}

impl InputStream {
    pub fn new(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(Box::new(reader)))),
        }
    }

    /// Take the reader out, leaving the stream consumed.
    pub(crate) fn take(&self) -> Option<BoxedReader> {
        self.inner.lock().take()
    }

    pub fn is_consumed(&self) -> bool {
        self.inner.lock().is_none()
    }
}

impl fmt::Debug for InputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputStream")
            .field("consumed", &self.is_consumed())
            .finish()
    }
}

/// Where an input reads from.
#[derive(Debug, Clone)]
pub enum Source {
    /// A file path or URI.
    Path(String),
    /// A live byte stream fed through stdin.
    Stream(InputStream),
}

/// One engine input and its input-scoped options.
#[derive(Debug, Clone)]
pub struct Input {
    pub(crate) source: Source,
    pub(crate) is_file: bool,
    pub(crate) options: ArgList,
}

impl Input {
    pub(crate) fn from_path(source: String) -> Self {
        let is_file = is_file_target(&source);
        Self {
            source: Source::Path(source),
            is_file,
            options: ArgList::new(),
        }
    }

    pub(crate) fn from_stream(stream: InputStream) -> Self {
        Self {
            source: Source::Stream(stream),
            is_file: false,
            options: ArgList::new(),
        }
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    /// Path of this input, if it is not a stream.
    pub fn path(&self) -> Option<&str> {
        match &self.source {
            Source::Path(p) => Some(p),
            Source::Stream(_) => None,
        }
    }

    pub fn is_file(&self) -> bool {
        self.is_file
    }

    pub fn is_stream(&self) -> bool {
        matches!(self.source, Source::Stream(_))
    }

    pub fn options(&self) -> &ArgList {
        &self.options
    }

    /// The token identifying this input on the command line.
    pub(crate) fn source_token(&self) -> &str {
        match &self.source {
            Source::Path(p) => p,
            Source::Stream(_) => STDIN_TOKEN,
        }
    }
}

/// Whether a source or target string designates a local file.
///
/// Anything carrying a protocol prefix of two or more letters (`http:`,
/// `rtmp:`, `pipe:`) is not a file, except the explicit `file:` protocol.
/// Single letters are left alone so Windows drive letters stay files.
pub(crate) fn is_file_target(target: &str) -> bool {
    let Some((scheme, _)) = target.split_once(':') else {
        return true;
    };
    if scheme.len() < 2 || !scheme.chars().all(|c| c.is_ascii_alphabetic()) {
        return true;
    }
    scheme.eq_ignore_ascii_case("file")
}
