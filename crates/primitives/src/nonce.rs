use crate::macros::felt_newtype;

felt_newtype!(
    /// A contract's transaction nonce. Defaults to zero for never-mutated contracts.
    Nonce
);
