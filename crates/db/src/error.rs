use sse_primitives::{Address, BlockNumber};
use starknet_types_core::felt::Felt;

/// Everything that can go wrong in the state engine, matching the error kinds it must surface
/// (never silently swallow) to its caller.
#[derive(thiserror::Error, Debug)]
pub enum StateEngineError {
    /// The pre- or post-condition on the global root failed. Fatal for the caller: the enclosing
    /// KV transaction is never committed when this is returned.
    #[error("mismatched root at block {block}: expected {expected:#x}, found {found:#x}")]
    MismatchedRoot { block: BlockNumber, expected: starknet_types_core::felt::Felt, found: starknet_types_core::felt::Felt },

    /// A diff mutates a contract that has not been deployed.
    #[error("invalid diff: contract {address} referenced by {operation} is not deployed at block {block}")]
    InvalidDiff { address: Address, operation: &'static str, block: BlockNumber },

    /// The KV store returned a value that fails to decode, or a trie child pointer dangles.
    #[error("corruption in {context}: {detail}")]
    Corruption { context: String, detail: String },

    /// Underlying KV I/O failure. The caller decides whether to retry the whole `Update`.
    #[error("storage I/O error: {0}")]
    Storage(#[from] rocksdb::Error),

    /// A value codec failed to encode or decode a stored record.
    #[error("codec error in {context}: {source}")]
    Codec { context: &'static str, #[source] source: bincode::Error },

    #[error("attempted to revert block {requested}, but the engine is at block {current:?}")]
    NotAtExpectedBlock { requested: BlockNumber, current: Option<BlockNumber> },
}

impl StateEngineError {
    /// Builds a [`StateEngineError::MismatchedRoot`] and logs it at `warn!`: every call site that
    /// is about to reject an `Update`/`Revert` on a root mismatch goes through here rather than
    /// constructing the variant directly, so the log is never forgotten at a new call site.
    pub fn mismatched_root(block: BlockNumber, expected: Felt, found: Felt) -> Self {
        tracing::warn!(block = %block, expected = %expected, found = %found, "mismatched root");
        Self::MismatchedRoot { block, expected, found }
    }

    /// Builds a [`StateEngineError::Corruption`] and logs it at `warn!`, for the same reason
    /// [`StateEngineError::mismatched_root`] does.
    pub fn corruption(context: impl Into<String>, detail: impl Into<String>) -> Self {
        let context = context.into();
        let detail = detail.into();
        tracing::warn!(context = %context, detail = %detail, "corruption detected");
        Self::Corruption { context, detail }
    }

    pub fn codec(context: &'static str, source: bincode::Error) -> Self {
        Self::Codec { context, source }
    }
}

/// A queried entity that legitimately does not exist. Kept distinct from [`StateEngineError`]
/// because `NotFound` is an expected, non-fatal outcome for the `StateHistoryReader` surface:
/// callers branch on it, they don't treat it as a failure to log or retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotFound;

pub type Result<T> = std::result::Result<T, StateEngineError>;
