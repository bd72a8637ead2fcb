//! Macro for implementing Display and FromStr for string-coded enums
//!
//! Statuses, priorities and action types are stored as text by the SQLite
//! queue store and appear in log fields, so each gets a single canonical
//! spelling.
//!
//! # Example
//!
//! ```rust
//! use checksync_domain::impl_domain_status_conversions;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! pub enum Phase {
//!     Idle,
//!     Syncing,
//! }
//!
//! impl_domain_status_conversions!(Phase {
//!     Idle => "idle",
//!     Syncing => "syncing",
//! });
//!
//! assert_eq!(Phase::Syncing.to_string(), "syncing");
//! assert_eq!("IDLE".parse::<Phase>(), Ok(Phase::Idle));
//! ```

/// Implements Display and FromStr traits for string-coded enums
///
/// - Display writes the canonical lowercase spelling
/// - FromStr parses case-insensitively and names the enum in its error
#[macro_export]
macro_rules! impl_domain_status_conversions {
    ($enum_name:ident { $($variant:ident => $str:expr),+ $(,)? }) => {
        impl $enum_name {
            /// Canonical string form.
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $str,)+
                }
            }
        }

        impl std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $enum_name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_lowercase().as_str() {
                    $($str => Ok(Self::$variant),)+
                    _ => Err(format!("Invalid {}: {}", stringify!($enum_name), s)),
                }
            }
        }
    };
}
