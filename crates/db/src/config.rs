//! RocksDB tuning knobs for the state engine's database. Defaults favor correctness and
//! simplicity over throughput; production deployments tune cache sizes against their working
//! set.

/// Where and how to open the RocksDB instance backing a [`crate::state::StateEngine`].
#[derive(Clone, Debug)]
pub struct RocksDBConfig {
    /// Directory the database lives under. One database per chain; `chain_id` is folded into
    /// the path so mainnet/testnet/devnet never share a directory by accident.
    pub path_prefix: std::path::PathBuf,
    pub chain_id: String,
    pub max_open_files: i32,
    /// Block cache size, in bytes, shared across the trie-heavy column families.
    pub trie_cache_bytes: usize,
    /// Block cache size, in bytes, for the scalar and history column families.
    pub scalar_cache_bytes: usize,
    /// Emits a `trace!` per trie node resolved or written. Off by default: too noisy for normal
    /// operation, useful when debugging a root-mismatch.
    pub trace_nodes: bool,
}

impl RocksDBConfig {
    pub fn new(path_prefix: impl Into<std::path::PathBuf>, chain_id: impl Into<String>) -> Self {
        Self {
            path_prefix: path_prefix.into(),
            chain_id: chain_id.into(),
            max_open_files: 1024,
            trie_cache_bytes: 256 * 1024 * 1024,
            scalar_cache_bytes: 64 * 1024 * 1024,
            trace_nodes: false,
        }
    }

    pub fn database_path(&self) -> std::path::PathBuf {
        self.path_prefix.join(&self.chain_id)
    }

    pub fn with_trace_nodes(mut self, trace_nodes: bool) -> Self {
        self.trace_nodes = trace_nodes;
        self
    }

    /// Builds the RocksDB options this config implies. The trie/scalar cache split matters
    /// because the trie column families see point lookups keyed by hash (effectively random) and
    /// benefit from a large, dedicated block cache, while the scalar column families are small
    /// and mostly sequential (history range scans).
    pub fn to_rocksdb_options(&self) -> rocksdb::Options {
        let mut opts = rocksdb::Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_max_open_files(self.max_open_files);
        opts
    }
}
