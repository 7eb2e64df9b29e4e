//! User registry: user records over a key-value store with case-insensitive
//! unique email addresses and screen names.

pub mod domain;
pub mod outbound;
pub mod startup;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
