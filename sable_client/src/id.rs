//! Sequential identifiers used inside a connection.

use std::sync::atomic::{AtomicI64, Ordering};

macro_rules! sequential_id {
    ($id:ident, $generator:ident) => {
        #[derive(PartialEq, Eq, Hash, Debug, Clone, Copy, PartialOrd, Ord)]
        pub struct $id(i64);

        impl $id {
            pub fn new(value: i64) -> Self {
                Self(value)
            }

            pub fn value(&self) -> i64 {
                self.0
            }
        }

        impl std::fmt::Display for $id {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        #[derive(Debug)]
        pub struct $generator(AtomicI64);

        impl $generator {
            pub fn new(start: i64) -> Self {
                Self(AtomicI64::new(start))
            }

            pub fn next(&self) -> $id {
                $id::new(self.0.fetch_add(1, Ordering::SeqCst))
            }
        }
    };
}

// Identifies a handler within the registry, for targeted removal
sequential_id!(CallbackId, CallbackIdGenerator);

// Identifies one connect..disconnect lifetime of a socket
sequential_id!(SessionId, SessionIdGenerator);
