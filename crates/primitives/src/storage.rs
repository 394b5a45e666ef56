use crate::macros::felt_newtype;

felt_newtype!(
    /// A key into a contract's storage trie.
    StorageKey
);

felt_newtype!(
    /// The value stored at a [`StorageKey`]. `StorageValue::ZERO` means "absent".
    StorageValue
);
