//! Unwrap helpers with good error messages.
//!
//! These replace `unwrap()` and `expect()` in test code; `#[track_caller]`
//! keeps the panic location on the calling line.

use std::fmt::Debug;
use std::future::Future;
use std::str::FromStr;

/// Unwrap a `Result`, panicking with the error value.
///
/// # Example
///
/// ```rust
/// use superbird_test_helpers::must;
///
/// let result: Result<i32, &str> = Ok(42);
/// assert_eq!(must(result), 42);
/// ```
///
/// # Panics
///
/// Panics if the result is `Err`.
#[track_caller]
pub fn must<T, E: Debug>(result: Result<T, E>) -> T {
    match result {
        Ok(v) => v,
        Err(e) => panic!("must: unexpected Err: {e:?}"),
    }
}

/// Unwrap an `Option`, panicking with `msg` if `None`.
///
/// # Panics
///
/// Panics if the option is `None`.
#[track_caller]
pub fn must_some<T>(option: Option<T>, msg: &str) -> T {
    match option {
        Some(v) => v,
        None => panic!("must_some: {msg}"),
    }
}

/// Parse a string into a type, panicking on failure.
///
/// ```rust
/// use superbird_test_helpers::must_parse;
/// use superbird_provision::Slot;
///
/// let slot: Slot = must_parse("b");
/// assert_eq!(slot, Slot::B);
/// ```
///
/// # Panics
///
/// Panics if parsing fails.
#[track_caller]
pub fn must_parse<T: FromStr>(s: &str) -> T
where
    T::Err: Debug,
{
    s.parse()
        .unwrap_or_else(|e| panic!("must_parse: failed to parse {s:?}: {e:?}"))
}

/// Await a future returning `Result`, panicking on `Err`.
///
/// # Panics
///
/// Panics if the future resolves to `Err`.
pub async fn must_async<F, T, E>(future: F) -> T
where
    F: Future<Output = Result<T, E>>,
    E: Debug,
{
    match future.await {
        Ok(v) => v,
        Err(e) => panic!("must_async: unexpected Err: {e:?}"),
    }
}
