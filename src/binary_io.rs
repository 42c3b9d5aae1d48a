//! Small helpers for fixed-layout binary encode/decode, in the same style
//! the teacher codebase uses for its TCP packet framing: a `nom`
//! combinator per type, wired up through a couple of declarative macros so
//! that the parser and the `Option`-returning convenience constructor stay
//! in sync.

/// Implemented by every type with a fixed, self-contained binary layout.
pub trait NomFromBytes: Sized {
    fn nom_from_bytes(input: &[u8]) -> Option<Self>;
}

/// Implemented by every type that can serialize itself to bytes.
pub trait ToBytes {
    fn to_bytes(&self) -> Vec<u8>;
}

/// Defines `$name::nom_parse_bytes` (usable from `call!` in other parsers)
/// and the `NomFromBytes` impl that drives it to completion.
#[macro_export]
macro_rules! nom_from_bytes (
    ($name:ident, $submac:ident!( $($args:tt)* )) => (
        impl $name {
            #[allow(unused)]
            pub fn nom_parse_bytes(input: &[u8]) -> ::nom::IResult<&[u8], $name> {
                $submac!(input, $($args)*)
            }
        }

        impl $crate::binary_io::NomFromBytes for $name {
            fn nom_from_bytes(input: &[u8]) -> Option<$name> {
                match $name::nom_parse_bytes(input) {
                    ::nom::IResult::Done(_, value) => Some(value),
                    _ => None,
                }
            }
        }
    );
);

/// Defines the `ToBytes` impl for `$name` from a block that pushes into
/// `$result`.
#[macro_export]
macro_rules! to_bytes (
    ($name:ident, $result:ident, $self_:ident $body:block) => (
        impl $crate::binary_io::ToBytes for $name {
            fn to_bytes(&self) -> Vec<u8> {
                #[allow(unused)]
                let $self_ = self;
                let mut $result: Vec<u8> = Vec::new();
                $body
                $result
            }
        }
    );
);
