use std::time::{SystemTime, UNIX_EPOCH};

/// A trait for time sources that stamp generated and used records.
///
/// The unit is **milliseconds since the UNIX epoch**. Plug in
/// [`SystemClock`] in production, or a fixed clock in tests.
///
/// # Example
///
/// ```
/// use healthid::TimeSource;
///
/// struct FixedTime;
/// impl TimeSource for FixedTime {
///     fn current_millis(&self) -> u64 {
///         1234
///     }
/// }
///
/// assert_eq!(FixedTime.current_millis(), 1234);
/// ```
pub trait TimeSource {
    /// Returns the current time in milliseconds since the UNIX epoch.
    fn current_millis(&self) -> u64;
}

/// Wall-clock time source backed by [`SystemTime`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn current_millis(&self) -> u64 {
        // A clock set before 1970 stamps records with zero rather than failing
        // the allocation.
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_millis() as u64)
    }
}

impl<T: TimeSource + ?Sized> TimeSource for std::sync::Arc<T> {
    fn current_millis(&self) -> u64 {
        (**self).current_millis()
    }
}
