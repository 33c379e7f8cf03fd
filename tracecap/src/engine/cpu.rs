//! CPU capability probing
//!
//! Detects whether the cycle counter is invariant (constant rate across power
//! states) and whether AMD instruction-based sampling is present, and reads
//! the clock frequency reported by the OS for display purposes.
//!
//! Missing abilities are not errors: the corresponding flag is left unset.

use anyhow::{Context, Result};
use std::fmt;
use std::fs;
use std::ops::{BitOr, BitOrAssign};

/// Set of detected CPU abilities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Abilities(u32);

impl Abilities {
    pub const NONE: Abilities = Abilities(0);
    /// Cycle counter ticks at a constant rate
    pub const INVARIANT_CPU_CLOCK: Abilities = Abilities(1);
    /// AMD instruction-based sampling
    pub const IBS: Abilities = Abilities(2);

    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Abilities(bits)
    }

    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn contains(self, other: Abilities) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Abilities {
    type Output = Abilities;

    fn bitor(self, rhs: Self) -> Self::Output {
        Abilities(self.0 | rhs.0)
    }
}

impl BitOrAssign for Abilities {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for Abilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let mut names = Vec::new();
        if self.contains(Abilities::INVARIANT_CPU_CLOCK) {
            names.push("invariant-clock");
        }
        if self.contains(Abilities::IBS) {
            names.push("ibs");
        }
        f.write_str(&names.join("|"))
    }
}

/// Probe the CPU for every ability the engine knows about
#[must_use]
pub fn detect_abilities() -> Abilities {
    let mut abilities = Abilities::NONE;
    if has_invariant_clock() {
        abilities |= Abilities::INVARIANT_CPU_CLOCK;
    }
    if has_ibs() {
        abilities |= Abilities::IBS;
    }
    abilities
}

#[cfg(target_arch = "x86_64")]
#[allow(unsafe_code, unused_unsafe)]
fn has_invariant_clock() -> bool {
    use core::arch::x86_64::__cpuid;

    // SAFETY: cpuid is available on every x86_64 CPU.
    let (max_extended, features) = unsafe { (__cpuid(0x8000_0000).eax, __cpuid(1)) };

    // Leaf 1 EDX bit 4: time stamp counter present
    if (features.edx >> 4) & 1 == 0 || max_extended < 0x8000_0007 {
        return false;
    }

    // Leaf 0x80000007 EDX bit 8: invariant TSC
    let power = unsafe { __cpuid(0x8000_0007) };
    (power.edx >> 8) & 1 == 1
}

// The generic timer on aarch64 runs at a fixed frequency by architecture.
#[cfg(target_arch = "aarch64")]
fn has_invariant_clock() -> bool {
    true
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
fn has_invariant_clock() -> bool {
    false
}

#[cfg(target_arch = "x86_64")]
#[allow(unsafe_code, unused_unsafe)]
fn has_ibs() -> bool {
    use core::arch::x86_64::__cpuid;

    // SAFETY: cpuid is available on every x86_64 CPU.
    let max_extended = unsafe { __cpuid(0x8000_0000).eax };
    if max_extended < 0x8000_0001 {
        return false;
    }

    // Leaf 0x80000001 ECX bit 10: IBS (AMD only)
    let extended = unsafe { __cpuid(0x8000_0001) };
    (extended.ecx >> 10) & 1 == 1
}

#[cfg(not(target_arch = "x86_64"))]
fn has_ibs() -> bool {
    false
}

/// Read the maximum CPU frequency in Hz from
/// /sys/devices/system/cpu/cpu0/cpufreq/cpuinfo_max_freq
///
/// Used only to convert cycle counts for display; correctness never depends
/// on it.
///
/// # Errors
/// Returns an error if the cpufreq interface is missing (containers, VMs,
/// non-Linux systems) or holds something other than a kHz value.
pub fn invariant_clock_frequency() -> Result<u64> {
    let content = fs::read_to_string("/sys/devices/system/cpu/cpu0/cpufreq/cpuinfo_max_freq")
        .context("Failed to read /sys/devices/system/cpu/cpu0/cpufreq/cpuinfo_max_freq")?;
    parse_khz(&content)
}

/// Parse a sysfs kHz value like "3600000\n" into Hz
fn parse_khz(content: &str) -> Result<u64> {
    let khz: u64 = content
        .trim()
        .parse()
        .with_context(|| format!("Invalid cpufreq value: {:?}", content.trim()))?;
    Ok(khz * 1_000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abilities_set_operations() {
        let mut abilities = Abilities::NONE;
        assert!(abilities.is_empty());
        assert_eq!(abilities.to_string(), "none");

        abilities |= Abilities::IBS;
        assert!(abilities.contains(Abilities::IBS));
        assert!(!abilities.contains(Abilities::INVARIANT_CPU_CLOCK));

        let both = abilities | Abilities::INVARIANT_CPU_CLOCK;
        assert_eq!(both.bits(), 3);
        assert_eq!(both.to_string(), "invariant-clock|ibs");
        assert_eq!(Abilities::from_bits(3), both);
    }

    #[test]
    fn test_detect_abilities_is_stable() {
        // Hardware dependent; the probe must at least agree with itself.
        assert_eq!(detect_abilities(), detect_abilities());
    }

    #[test]
    fn test_parse_khz() {
        assert_eq!(parse_khz("3600000\n").unwrap(), 3_600_000_000);
        assert!(parse_khz("fast").is_err());
    }

    #[test]
    fn test_invariant_clock_frequency() {
        // cpufreq is often absent in containers; only check the value when present.
        if let Ok(hz) = invariant_clock_frequency() {
            assert!(hz > 0);
        }
    }
}
