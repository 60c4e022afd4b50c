//! Single blind retry for storage writes.

use log::warn;

use crate::StoreError;

/// Run `write`, repeating it once if the first attempt fails transiently.
///
/// A second failure of any kind is returned as is. Reads should not go
/// through here.
///
/// # Examples
/// ```
/// use wayfare_core::{StoreError, retry_once};
///
/// let mut attempts = 0;
/// let result = retry_once("put app", || {
///     attempts += 1;
///     if attempts == 1 {
///         Err(StoreError::Timeout { operation: "put app" })
///     } else {
///         Ok(attempts)
///     }
/// });
/// assert_eq!(result.ok(), Some(2));
/// ```
pub fn retry_once<T, F>(operation: &str, mut write: F) -> Result<T, StoreError>
where
    F: FnMut() -> Result<T, StoreError>,
{
    match write() {
        Err(error) if error.is_transient() => {
            warn!("{operation} failed transiently ({error}); retrying once");
            write()
        }
        outcome => outcome,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::{cell::Cell, rc::Rc};

    type Outcome = Result<u8, StoreError>;

    fn scripted(outcomes: Vec<Outcome>) -> (impl FnMut() -> Outcome, Rc<Cell<usize>>) {
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let mut outcomes = outcomes.into_iter();
        let write = move || {
            counter.set(counter.get() + 1);
            outcomes.next().unwrap_or(Ok(0))
        };
        (write, calls)
    }

    fn timeout() -> StoreError {
        StoreError::Timeout { operation: "put" }
    }

    fn unavailable() -> StoreError {
        StoreError::Unavailable { operation: "put" }
    }

    #[rstest]
    fn success_runs_once() {
        let (write, calls) = scripted(vec![Ok(1)]);
        assert_eq!(retry_once("put", write).ok(), Some(1));
        assert_eq!(calls.get(), 1);
    }

    #[rstest]
    fn transient_failure_is_retried_once() {
        let (write, calls) = scripted(vec![Err(timeout()), Ok(2)]);
        assert_eq!(retry_once("put", write).ok(), Some(2));
        assert_eq!(calls.get(), 2);
    }

    #[rstest]
    fn second_timeout_is_fatal() {
        let (write, calls) = scripted(vec![Err(timeout()), Err(timeout()), Ok(3)]);
        assert!(matches!(retry_once("put", write), Err(StoreError::Timeout { .. })));
        assert_eq!(calls.get(), 2);
    }

    #[rstest]
    fn fatal_failures_are_not_retried() {
        let (write, calls) = scripted(vec![Err(unavailable()), Ok(4)]);
        assert!(matches!(
            retry_once("put", write),
            Err(StoreError::Unavailable { .. })
        ));
        assert_eq!(calls.get(), 1);
    }
}
