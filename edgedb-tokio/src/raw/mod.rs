/*!
The raw connection: a single authenticated protocol session, owned by one
executor at a time. The pooling layer (external to this crate) serialises
all calls on it; inside, every exchange is strictly request/response with
an explicit `Sync` or `Flush` boundary.
*/

mod connection;
mod framer;
mod queries;

pub use framer::{FrameStatus, Framer, MAX_FRAME_SIZE};
pub use queries::TransactionResult;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};

use edgedb_dsn::Config;
use edgedb_protocol::codec::{Codec, CodecCache};
use edgedb_protocol::common::Cardinality;
use edgedb_protocol::features::ProtocolVersion;
use edgedb_protocol::server_message::TransactionState;

use crate::cache::QueryCache;

/// Default bound on a single socket read while waiting for the server.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(15);

pub(crate) trait Stream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> Stream for T {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    Normal,
    /// A request was interrupted mid-exchange or a fatal error occurred;
    /// the connection must be discarded.
    Dirty,
    Terminated,
}

/// Proof that a request is in flight; returned by `begin_request` and
/// consumed when the connection returns to rest.
pub(crate) struct Guard;

/// One open connection to a server.
#[derive(derive_more::Debug)]
pub struct Connection {
    #[debug(skip)]
    pub(crate) stream: Box<dyn Stream>,
    pub(crate) framer: Framer,
    pub(crate) proto: ProtocolVersion,
    pub(crate) mode: Mode,
    pub(crate) transaction_state: TransactionState,
    /// Opaque per-session blob the server sends after authentication. Its
    /// post-handshake role is unspecified; it is preserved verbatim.
    pub(crate) server_key_data: Option<[u8; 32]>,
    /// Settings reported during await-ready. Parsed to preserve framing and
    /// retained, but not yet interpreted.
    pub(crate) server_params: HashMap<Bytes, Bytes>,
    pub(crate) read_timeout: Duration,
    pub(crate) config: Config,
    pub(crate) codec_cache: Arc<CodecCache>,
    pub(crate) query_cache: Arc<QueryCache>,
}

/// The outcome of one executed command: the status line, the raw rows, and
/// the codec to decode them with. Rows are kept verbatim; decoding is the
/// caller's choice.
#[derive(Debug)]
pub struct Response {
    pub status_data: Bytes,
    pub cardinality: Option<Cardinality>,
    pub data: Vec<Bytes>,
    pub output_codec: Option<Arc<dyn Codec>>,
}

impl Connection {
    pub fn proto(&self) -> &ProtocolVersion {
        &self.proto
    }
    pub fn transaction_state(&self) -> TransactionState {
        self.transaction_state
    }
    pub fn server_key_data(&self) -> Option<&[u8; 32]> {
        self.server_key_data.as_ref()
    }
    pub fn server_params(&self) -> &HashMap<Bytes, Bytes> {
        &self.server_params
    }
    /// Whether the connection may accept another request.
    pub fn is_consistent(&self) -> bool {
        self.mode == Mode::Normal
    }
}

impl Response {
    /// Decodes every row with the attached output codec.
    pub fn decode(&self) -> Result<Vec<edgedb_protocol::Value>, edgedb_errors::Error> {
        use edgedb_errors::{ErrorKind, NoDataError, ProtocolEncodingError};

        let codec = self
            .output_codec
            .as_ref()
            .ok_or_else(|| NoDataError::with_message("statement returns no decodable data"))?;
        self.data
            .iter()
            .map(|chunk| {
                codec
                    .decode(chunk)
                    .map_err(ProtocolEncodingError::with_source)
            })
            .collect()
    }
}
