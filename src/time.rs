pub use std::time::Instant;

/// Source of "seconds since start". Real runs use [`MonotonicSource`]; tests
/// substitute scripted sources to provoke clock faults.
pub trait TimeSource {
    fn elapsed_seconds(&self) -> f64;
}

pub struct MonotonicSource {
    start: Instant,
}

impl MonotonicSource {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for MonotonicSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for MonotonicSource {
    fn elapsed_seconds(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTime {
    pub elapsed: f64,
    pub delta: f64,
}

/// Per-frame clock. `delta` is never negative: a source that runs backwards is
/// a clock fault and yields a zero delta for that frame.
pub struct FrameClock {
    source: Box<dyn TimeSource>,
    previous: f64,
    faults: u64,
}

impl FrameClock {
    pub fn new(source: Box<dyn TimeSource>) -> Self {
        Self {
            source,
            previous: 0.0,
            faults: 0,
        }
    }

    pub fn monotonic() -> Self {
        Self::new(Box::new(MonotonicSource::new()))
    }

    pub fn tick(&mut self) -> FrameTime {
        let elapsed = self.source.elapsed_seconds();
        let delta = self.advance_to(elapsed);
        FrameTime { elapsed, delta }
    }

    /// Records `elapsed` as the latest reading and returns the clamped delta.
    pub fn advance_to(&mut self, elapsed: f64) -> f64 {
        if elapsed.is_nan() {
            self.faults += 1;
            log::warn!("Clock fault: time source returned NaN, using zero delta");
            return 0.0;
        }

        let previous = std::mem::replace(&mut self.previous, elapsed);
        let raw = elapsed - previous;

        if raw < 0.0 {
            self.faults += 1;
            log::warn!(
                "Clock fault: elapsed time went from {:.6}s to {:.6}s, using zero delta",
                previous,
                elapsed
            );
            return 0.0;
        }

        raw
    }

    pub fn previous_elapsed(&self) -> f64 {
        self.previous
    }

    pub fn faults(&self) -> u64 {
        self.faults
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    struct Scripted(RefCell<VecDeque<f64>>);

    impl TimeSource for Scripted {
        fn elapsed_seconds(&self) -> f64 {
            self.0.borrow_mut().pop_front().unwrap_or(0.0)
        }
    }

    fn scripted(values: &[f64]) -> FrameClock {
        FrameClock::new(Box::new(Scripted(RefCell::new(
            values.iter().copied().collect(),
        ))))
    }

    #[test]
    fn deltas_accumulate_to_elapsed() {
        let mut clock = scripted(&[0.016, 0.033, 0.050]);
        let total: f64 = (0..3).map(|_| clock.tick().delta).sum();
        assert!((total - 0.050).abs() < 1e-12);
        assert_eq!(clock.faults(), 0);
    }

    #[test]
    fn backwards_clock_clamps_delta_to_zero() {
        let mut clock = scripted(&[1.0, 0.5, 0.75]);
        assert!((clock.tick().delta - 1.0).abs() < 1e-12);
        assert_eq!(clock.tick().delta, 0.0);
        assert_eq!(clock.faults(), 1);
        // Resumes from the faulted reading instead of jumping back.
        assert!((clock.tick().delta - 0.25).abs() < 1e-12);
    }

    #[test]
    fn nan_reading_is_a_fault() {
        let mut clock = FrameClock::new(Box::new(MonotonicSource::new()));
        assert_eq!(clock.advance_to(f64::NAN), 0.0);
        assert_eq!(clock.faults(), 1);
    }

    #[test]
    fn monotonic_source_never_goes_backwards() {
        let mut clock = FrameClock::monotonic();
        for _ in 0..100 {
            assert!(clock.tick().delta >= 0.0);
        }
    }
}
