//! Time source abstraction.

/// Monotonic time source in milliseconds.
///
/// The runtime never reads the wall clock directly; restart timers compare
/// against whatever `Clock` it was given. Tests drive time by hand with
/// [`MockClock`](crate::hal::MockClock), services use
/// [`SystemClock`](crate::hal::SystemClock).
///
/// # Example
///
/// ```rust
/// use railyard::hal::MockClock;
/// use railyard::traits::Clock;
///
/// let mut clock = MockClock::new();
/// assert_eq!(clock.now_ms(), 0);
///
/// clock.advance(100);
/// assert_eq!(clock.now_ms(), 100);
/// ```
pub trait Clock {
    /// Returns current time in milliseconds since an arbitrary epoch.
    ///
    /// Must be monotonically increasing.
    fn now_ms(&self) -> u64;
}
