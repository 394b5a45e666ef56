/// Declares a `Copy` newtype wrapping a [`starknet_types_core::felt::Felt`], with the usual set
/// of trait impls every Felt-keyed domain type in this crate needs (hashing, ordering,
/// hex `Display`, and conversions to/from the bare `Felt`).
macro_rules! felt_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub starknet_types_core::felt::Felt);

        impl $name {
            /// The distinguished zero value.
            pub const ZERO: Self = Self(starknet_types_core::felt::Felt::ZERO);

            pub const fn new(felt: starknet_types_core::felt::Felt) -> Self {
                Self(felt)
            }

            pub const fn as_felt(&self) -> starknet_types_core::felt::Felt {
                self.0
            }

            pub fn is_zero(&self) -> bool {
                self.0 == starknet_types_core::felt::Felt::ZERO
            }

            /// Canonical 32-byte big-endian encoding, used for KV keys so that byte-lexicographic
            /// order matches numeric order.
            pub fn to_be_bytes(&self) -> [u8; 32] {
                self.0.to_bytes_be()
            }

            pub fn from_be_bytes(bytes: [u8; 32]) -> Self {
                Self(starknet_types_core::felt::Felt::from_bytes_be(&bytes))
            }
        }

        impl From<starknet_types_core::felt::Felt> for $name {
            fn from(felt: starknet_types_core::felt::Felt) -> Self {
                Self(felt)
            }
        }

        impl From<$name> for starknet_types_core::felt::Felt {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(starknet_types_core::felt::Felt::from(value))
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({:#x})", stringify!($name), self.0)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{:#x}", self.0)
            }
        }
    };
}

pub(crate) use felt_newtype;
