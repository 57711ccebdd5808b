//! Macro for the closed string enumerations of the data model
//!
//! Classification enums, statuses and the like travel as lowercase
//! snake_case strings (in logs, in condition values, in config files). The
//! macro keeps `Display`, `FromStr`, `as_str` and the variant list in one
//! place so the spellings cannot drift apart.
//!
//! # Example
//!
//! ```rust
//! use faultline_domain::impl_domain_status_conversions;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! pub enum Lane {
//!     Primary,
//!     Fallback,
//! }
//!
//! impl_domain_status_conversions!(Lane {
//!     Primary => "primary",
//!     Fallback => "fallback",
//! });
//!
//! assert_eq!(Lane::Fallback.as_str(), "fallback");
//! assert_eq!("PRIMARY".parse::<Lane>(), Ok(Lane::Primary));
//! assert_eq!(Lane::ALL.len(), 2);
//! ```

/// Implements `Display`, `FromStr`, `as_str()` and `ALL` for a unit enum
///
/// Parsing is case-insensitive; the error names the enum and the rejected
/// input.
#[macro_export]
macro_rules! impl_domain_status_conversions {
    ($enum_name:ident { $($variant:ident => $str:literal),+ $(,)? }) => {
        impl $enum_name {
            /// Every variant, in declaration order
            pub const ALL: &'static [$enum_name] = &[$(Self::$variant),+];

            /// Canonical lowercase spelling
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
