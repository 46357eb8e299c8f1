//! Newtype IDs for type-safe entity references.
//!
//! Use the `define_id!` macro to create type-safe ID wrappers that prevent
//! accidentally mixing IDs from different entity types. The commerce backend
//! hands out opaque string tokens, so every wrapper holds an owned `String`.

use uuid::Uuid;

/// Macro to define a type-safe ID wrapper.
///
/// Creates a newtype wrapper around `String` with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Debug`, `Clone`, `PartialEq`, `Eq`, `Hash`
/// - Conversion methods: `new()`, `as_str()`, `into_inner()`
/// - `From<String>`, `From<&str>` and `Into<String>` implementations
///
/// # Example
///
/// ```rust
/// # use marmalade_core::define_id;
/// define_id!(OrderId);
/// define_id!(ShipmentId);
///
/// let order_id = OrderId::new("gid://order/1");
/// let shipment_id = ShipmentId::new("gid://shipment/1");
///
/// // These are different types, so this won't compile:
/// // let _: OrderId = shipment_id;
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            Hash,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new ID from a string value.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Get the underlying string value.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume the ID and return the underlying string.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

// Define standard entity IDs
define_id!(CartId);
define_id!(LineId);
define_id!(MerchandiseId);
define_id!(GiftCardId);
define_id!(SubmissionId);

/// Prefix carried by temporary line ids generated for optimistic overlay
/// lines. Backend-assigned ids never start with this prefix.
const SYNTHETIC_LINE_PREFIX: &str = "optimistic:";

impl SubmissionId {
    /// Generate a fresh submission id (UUID v4).
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl LineId {
    /// Build the deterministic temporary id for the `index`-th line added
    /// optimistically by `submission`. The same inputs always produce the
    /// same id, so overlay recomputation is stable across renders.
    #[must_use]
    pub fn synthetic(submission: &SubmissionId, index: usize) -> Self {
        Self(format!("{SYNTHETIC_LINE_PREFIX}{submission}:{index}"))
    }

    /// Whether this id was produced by [`LineId::synthetic`] rather than
    /// assigned by the backend.
    #[must_use]
    pub fn is_synthetic(&self) -> bool {
        self.0.starts_with(SYNTHETIC_LINE_PREFIX)
    }
}
