// File: src/core/ids.rs

//! Identifier types for chat sessions and messages.
//!
//! Strongly-typed UUID newtypes so a `MessageId` can never be passed where a
//! `SessionId` is expected. Identifiers are random (v4) because session ids
//! are handed to clients before anything is stored.
//!
//! Identifiers are stored as TEXT in `SQLite`.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declare a UUID newtype with a consistent API.
macro_rules! define_uuid_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[repr(transparent)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl Default for $name {
            #[inline]
            fn default() -> Self {
                Self::new()
            }
        }

        impl $name {
            /// Create a new random identifier.
            #[inline]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID.
            #[inline]
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Borrow the underlying UUID.
            #[inline]
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            #[inline]
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$name> for Uuid {
            #[inline]
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            #[inline]
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

define_uuid_id!(
    /// Identifier for a chat session.
    ///
    /// Sent to the client in the `init` event before any model output.
    SessionId
);

define_uuid_id!(
    /// Identifier for a message inside a session.
    MessageId
);

// ===== sqlx integration =====================================================

mod sqlx_impl {
    use super::{MessageId, SessionId};

    use sqlx::encode::IsNull;
    use sqlx::error::BoxDynError;
    use sqlx::sqlite::{Sqlite, SqliteTypeInfo, SqliteValueRef};
    use sqlx::{Database, Decode, Encode, Type};

    macro_rules! impl_sqlx_uuid_newtype {
        ($t:ty) => {
            impl Type<Sqlite> for $t {
                fn type_info() -> SqliteTypeInfo {
                    <String as Type<Sqlite>>::type_info()
                }

                fn compatible(ty: &SqliteTypeInfo) -> bool {
                    <String as Type<Sqlite>>::compatible(ty)
                }
            }

            impl<'q> Encode<'q, Sqlite> for $t {
                fn encode_by_ref(
                    &self,
                    buf: &mut <Sqlite as Database>::ArgumentBuffer<'q>,
                ) -> Result<IsNull, BoxDynError> {
                    <String as Encode<'q, Sqlite>>::encode(self.0.to_string(), buf)
                }
            }

            impl<'r> Decode<'r, Sqlite> for $t {
                fn decode(value: SqliteValueRef<'r>) -> Result<Self, BoxDynError> {
                    let text = <&str as Decode<'r, Sqlite>>::decode(value)?;
                    Ok(Self(uuid::Uuid::parse_str(text)?))
                }
            }
        };
    }

    impl_sqlx_uuid_newtype!(SessionId);
    impl_sqlx_uuid_newtype!(MessageId);
}
