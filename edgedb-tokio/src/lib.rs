/*!
EdgeDB client for tokio: the raw connection, its caches and
authentication.

A [`raw::Connection`] is one authenticated protocol session. It is owned by
a single executor at a time; pooling and retry policy belong to the layer
above. Connect parameters come from [`edgedb_dsn::Builder`]; the codec and
query caches are process-wide handles shared between connections:

```rust,no_run
# async fn run() -> Result<(), edgedb_errors::Error> {
use std::sync::Arc;

let config = edgedb_tokio::Builder::new()
    .instance("my_instance".parse().expect("valid name"))
    .build()?;
let codec_cache = Arc::new(edgedb_tokio::CodecCache::new());
let query_cache = Arc::new(edgedb_tokio::QueryCache::new());
let mut conn =
    edgedb_tokio::raw::Connection::connect(&config, codec_cache, query_cache).await?;
# Ok(())
# }
```
*/

mod cache;
pub mod raw;
pub mod scram;
pub mod tls;

pub mod errors {
    pub use edgedb_errors::*;
}

pub use cache::{PreparedQuery, QueryCache, QueryKey};
pub use edgedb_dsn::{Builder, Config, InstanceName, TlsSecurity};
pub use edgedb_protocol::codec::CodecCache;
pub use raw::{Connection, Response, TransactionResult};
