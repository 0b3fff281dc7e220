/*!
The process-wide prepared-query cache. Entries are immutable once inserted
and are shared between connections; the codec cache lives in
[edgedb_protocol::codec::CodecCache] and is passed around alongside this
one.
*/

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use edgedb_protocol::codec::Codec;
use edgedb_protocol::common::{Cardinality, IoFormat};

/// Identity of a prepared statement.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    pub statement: String,
    pub cardinality: Cardinality,
    pub io_format: IoFormat,
}

/// A statement the server has compiled for us, together with the codecs its
/// descriptors resolved to.
#[derive(Debug)]
pub struct PreparedQuery {
    /// The result cardinality the server reported.
    pub cardinality: Cardinality,
    pub input_typedesc_id: Uuid,
    pub output_typedesc_id: Uuid,
    pub input_codec: Arc<dyn Codec>,
    pub output_codec: Arc<dyn Codec>,
}

#[derive(Debug, Default)]
pub struct QueryCache {
    queries: Mutex<HashMap<QueryKey, Arc<PreparedQuery>>>,
}

impl QueryCache {
    pub fn new() -> QueryCache {
        QueryCache::default()
    }

    pub fn get(&self, key: &QueryKey) -> Option<Arc<PreparedQuery>> {
        self.queries.lock().expect("query cache poisoned").get(key).cloned()
    }

    /// Last writer wins; concurrent inserts under one key hold identical
    /// values because codecs are canonicalised by type id.
    pub fn add(&self, key: QueryKey, query: Arc<PreparedQuery>) {
        self.queries
            .lock()
            .expect("query cache poisoned")
            .insert(key, query);
    }

    /// Drops a statement, e.g. after the server reported its compiled form
    /// outdated.
    pub fn clear(&self, key: &QueryKey) {
        self.queries.lock().expect("query cache poisoned").remove(key);
    }
}
