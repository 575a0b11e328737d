use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Monotonic clock with a blocking sleep and a record of frame times.
pub trait Timer: Clone + Send + Sync {
    type Timestamp: Copy + Clone + Send + Sync;
    fn now(&self) -> Self::Timestamp;
    fn elapsed(&self, ts: Self::Timestamp) -> Duration;
    fn sleep(&self, d: Duration);
    fn record_frame(&mut self, d: Duration);
    fn frame_stats(&self) -> FrameStats;
}

/// Display frame timing summary, nanoseconds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameStats {
    pub frames: usize,
    pub average_frame_time_ns: f64,
    pub jitter_ns: f64,
    pub min_frame_time_ns: f64,
    pub max_frame_time_ns: f64,
    pub effective_fps: f64,
}

impl FrameStats {
    pub(crate) fn from_frames<'a>(frames: impl ExactSizeIterator<Item = &'a Duration>) -> Self {
        let n = frames.len();
        if n == 0 {
            return FrameStats::default();
        }
        let times: Vec<f64> = frames.map(|d| d.as_nanos() as f64).collect();
        let avg = times.iter().sum::<f64>() / n as f64;
        let var = times.iter().map(|x| (x - avg).powi(2)).sum::<f64>() / n as f64;
        let (min, max) = times
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &t| (lo.min(t), hi.max(t)));
        FrameStats {
            frames: n,
            average_frame_time_ns: avg,
            jitter_ns: var.sqrt(),
            min_frame_time_ns: min,
            max_frame_time_ns: max,
            effective_fps: if avg > 0.0 { 1e9 / avg } else { 0.0 },
        }
    }
}

/// Wall clock used for live sessions. Sleeps target an absolute deadline so
/// that wake-up latency does not accumulate over the audio and pump delays.
#[derive(Debug, Clone)]
pub struct HighPrecisionTimer {
    origin: Instant,
    samples: VecDeque<Duration>,
    capacity: usize,
}

impl Timer for HighPrecisionTimer {
    type Timestamp = u64;

    fn now(&self) -> u64 {
        self.origin.elapsed().as_nanos() as u64
    }

    fn elapsed(&self, ts: u64) -> Duration {
        Duration::from_nanos(self.now().saturating_sub(ts))
    }

    fn sleep(&self, d: Duration) {
        if !d.is_zero() {
            sleep_until(Instant::now() + d);
        }
    }

    fn record_frame(&mut self, d: Duration) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(d);
    }

    fn frame_stats(&self) -> FrameStats {
        FrameStats::from_frames(self.samples.iter())
    }
}

impl HighPrecisionTimer {
    pub fn new() -> Self {
        Self::with_capacity(1000)
    }

    /// Keeps the last `capacity` frame times.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            origin: Instant::now(),
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }
}

impl Default for HighPrecisionTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "linux")]
fn sleep_until(deadline: Instant) {
    use libc::{CLOCK_MONOTONIC, EINTR, TIMER_ABSTIME, clock_gettime, clock_nanosleep, timespec};

    let remaining = deadline.saturating_duration_since(Instant::now());
    let mut now = timespec { tv_sec: 0, tv_nsec: 0 };
    // SAFETY: `now` is a valid out-pointer for the duration of the call.
    if unsafe { clock_gettime(CLOCK_MONOTONIC, &mut now) } != 0 {
        std::thread::sleep(remaining);
        return;
    }
    let nsec = now.tv_nsec as u64 + u64::from(remaining.subsec_nanos());
    let target = timespec {
        tv_sec: now.tv_sec + remaining.as_secs() as libc::time_t + (nsec / 1_000_000_000) as libc::time_t,
        tv_nsec: (nsec % 1_000_000_000) as libc::c_long,
    };
    loop {
        // SAFETY: `target` outlives the call; the remainder is unused with TIMER_ABSTIME.
        let rc = unsafe { clock_nanosleep(CLOCK_MONOTONIC, TIMER_ABSTIME, &target, std::ptr::null_mut()) };
        if rc != EINTR {
            break;
        }
    }
}

#[cfg(target_os = "macos")]
fn sleep_until(deadline: Instant) {
    use mach2::mach_time::{mach_absolute_time, mach_timebase_info, mach_timebase_info_data_t};

    let remaining = deadline.saturating_duration_since(Instant::now());
    if let Some(coarse) = remaining.checked_sub(Duration::from_millis(1)) {
        std::thread::sleep(coarse);
    }
    let left = deadline.saturating_duration_since(Instant::now());
    let mut timebase = mach_timebase_info_data_t { numer: 0, denom: 0 };
    // SAFETY: plain reads of the monotonic clock and its timebase.
    unsafe {
        mach_timebase_info(&mut timebase);
        if timebase.numer == 0 {
            return;
        }
        let start = mach_absolute_time();
        let ticks = left.as_nanos() as u64 * u64::from(timebase.denom) / u64::from(timebase.numer);
        while mach_absolute_time() - start < ticks {
            std::hint::spin_loop();
        }
    }
}

/// Coarse sleep, then spin out the last millisecond.
#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn sleep_until(deadline: Instant) {
    let remaining = deadline.saturating_duration_since(Instant::now());
    if let Some(coarse) = remaining.checked_sub(Duration::from_millis(1)) {
        std::thread::sleep(coarse);
    }
    while Instant::now() < deadline {
        std::hint::spin_loop();
    }
}
