use crate::macros::felt_newtype;

felt_newtype!(
    /// A contract's address in the global contracts trie.
    Address
);
