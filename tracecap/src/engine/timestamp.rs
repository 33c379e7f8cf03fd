//! Timestamp sources
//!
//! Two readings feed every timed record:
//! - [`capture_low_res`]: monotonic clock in nanoseconds, discriminator 0
//! - [`capture_high_res`]: hardware cycle counter, discriminator 1
//!
//! The high resolution path is best effort: it reads the counter whether or
//! not `init` found an invariant clock (see [`crate::engine::cpu`]).

use tracecap_common::{EventTimestamp, TimestampSource};

/// Which clock an instrumentation call reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Resolution {
    #[default]
    Low,
    /// The `hr_*` variants of the API
    High,
}

impl Resolution {
    #[inline]
    #[must_use]
    pub fn now(self) -> EventTimestamp {
        match self {
            Resolution::Low => capture_low_res(),
            Resolution::High => capture_high_res(),
        }
    }
}

/// Read the coarse monotonic clock
#[inline]
#[must_use]
pub fn capture_low_res() -> EventTimestamp {
    EventTimestamp::new(monotonic_nanos(), TimestampSource::WallClock)
}

/// Read the CPU cycle counter
#[inline]
#[must_use]
pub fn capture_high_res() -> EventTimestamp {
    EventTimestamp::new(cycle_counter(), TimestampSource::InvariantCycles)
}

#[cfg(unix)]
#[allow(unsafe_code, clippy::cast_sign_loss)]
fn monotonic_nanos() -> u64 {
    let mut ts = libc::timespec { tv_sec: 0, tv_nsec: 0 };
    // SAFETY: `ts` is a valid out-pointer and CLOCK_MONOTONIC is always available.
    unsafe {
        libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts);
    }
    (ts.tv_sec as u64).wrapping_mul(1_000_000_000).wrapping_add(ts.tv_nsec as u64)
}

#[cfg(not(unix))]
fn monotonic_nanos() -> u64 {
    use std::sync::OnceLock;
    use std::time::Instant;

    static ANCHOR: OnceLock<Instant> = OnceLock::new();
    let anchor = ANCHOR.get_or_init(Instant::now);
    u64::try_from(anchor.elapsed().as_nanos()).unwrap_or(u64::MAX)
}

#[cfg(target_arch = "x86_64")]
#[allow(unsafe_code)]
fn cycle_counter() -> u64 {
    // SAFETY: rdtsc is available on every x86_64 CPU and has no side effects.
    unsafe { core::arch::x86_64::_rdtsc() }
}

#[cfg(target_arch = "aarch64")]
#[allow(unsafe_code)]
fn cycle_counter() -> u64 {
    let ticks: u64;
    // SAFETY: cntvct_el0 is readable from EL0 on every aarch64 OS we target.
    unsafe {
        core::arch::asm!("mrs {}, cntvct_el0", out(reg) ticks, options(nomem, nostack));
    }
    ticks
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
fn cycle_counter() -> u64 {
    monotonic_nanos()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_low_res_discriminator() {
        for _ in 0..100 {
            let ts = capture_low_res();
            assert_eq!(ts.discriminator(), 0);
            assert_eq!(ts.source(), TimestampSource::WallClock);
        }
    }

    #[test]
    fn test_high_res_discriminator() {
        for _ in 0..100 {
            let ts = capture_high_res();
            assert_eq!(ts.discriminator(), 1);
            assert!(ts.is_high_res());
        }
    }

    #[test]
    fn test_low_res_is_monotonic() {
        let first = capture_low_res();
        let second = capture_low_res();
        assert!(second.ticks_since(first).is_some());
    }

    #[test]
    fn test_resolution_selects_source() {
        assert!(!Resolution::Low.now().is_high_res());
        assert!(Resolution::High.now().is_high_res());
        assert_eq!(Resolution::default(), Resolution::Low);
    }
}
