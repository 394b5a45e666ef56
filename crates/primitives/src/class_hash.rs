use crate::macros::felt_newtype;

felt_newtype!(
    /// The hash identity of a declared [`crate::class::Class`].
    ClassHash
);

felt_newtype!(
    /// Hash of a Cairo1 class' compiled (Sierra -> CASM) representation.
    CompiledClassHash
);
