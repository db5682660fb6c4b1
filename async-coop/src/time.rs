//! Ticks and tick conversions
//!
//! The tick counter is free running and wraps around; two instants are compared through their
//! signed difference, so every live deadline must lie within `MAX_DELAY` ticks of "now".

use core::cmp::Ordering;

/// The runtime's monotonic time unit; the length of a tick is defined by the port
pub type Ticks = u32;

/// Longest delay a single timed wait can request; longer requests are clamped to this
pub const MAX_DELAY: Ticks = i32::MAX as Ticks;

/// Converts milliseconds into ticks, saturating at `Ticks::MAX`
pub fn ms_to_ticks(ms: u32, ticks_per_sec: u32) -> Ticks {
    saturate(u64::from(ms) * u64::from(ticks_per_sec) / 1000)
}

/// Converts seconds into ticks, saturating at `Ticks::MAX`
pub fn sec_to_ticks(sec: u32, ticks_per_sec: u32) -> Ticks {
    saturate(u64::from(sec) * u64::from(ticks_per_sec))
}

/// Converts ticks into milliseconds, saturating at `u32::MAX`
pub fn ticks_to_ms(ticks: Ticks, ticks_per_sec: u32) -> u32 {
    if ticks_per_sec == 0 {
        return u32::MAX;
    }
    saturate(u64::from(ticks) * 1000 / u64::from(ticks_per_sec))
}

/// Converts ticks into whole seconds
pub fn ticks_to_sec(ticks: Ticks, ticks_per_sec: u32) -> u32 {
    if ticks_per_sec == 0 {
        return u32::MAX;
    }
    ticks / ticks_per_sec
}

fn saturate(x: u64) -> u32 {
    u32::try_from(x).unwrap_or(u32::MAX)
}

/// Orders two deadlines by their wrapping distance
pub(crate) fn deadline_cmp(a: Ticks, b: Ticks) -> Ordering {
    (a.wrapping_sub(b) as i32).cmp(&0)
}

/// Has `deadline` been reached at `now`?
pub(crate) fn expired(deadline: Ticks, now: Ticks) -> bool {
    deadline_cmp(deadline, now) != Ordering::Greater
}

/// Ticks left until `deadline`, zero if it already passed
pub(crate) fn remaining(deadline: Ticks, now: Ticks) -> Ticks {
    let diff = deadline.wrapping_sub(now) as i32;
    if diff > 0 {
        diff as Ticks
    } else {
        0
    }
}

/// Deadline for a delay that starts at `now`
pub(crate) fn deadline_after(now: Ticks, delay: Ticks) -> Ticks {
    now.wrapping_add(delay.min(MAX_DELAY))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions() {
        assert_eq!(ms_to_ticks(250, 1000), 250);
        assert_eq!(ms_to_ticks(1000, 1024), 1024);
        assert_eq!(ms_to_ticks(1, 1024), 1);
        assert_eq!(sec_to_ticks(3, 1024), 3072);
        assert_eq!(ticks_to_ms(1024, 1024), 1000);
        assert_eq!(ticks_to_sec(2047, 1024), 1);
    }

    #[test]
    fn conversions_saturate() {
        assert_eq!(ms_to_ticks(u32::MAX, 1_000_000), Ticks::MAX);
        assert_eq!(sec_to_ticks(u32::MAX, 1024), Ticks::MAX);
        assert_eq!(ticks_to_ms(Ticks::MAX, 1), u32::MAX);
        assert_eq!(ticks_to_ms(10, 0), u32::MAX);
    }

    #[test]
    fn comparisons_wrap() {
        let near_end = u32::MAX - 5;
        let after_wrap = near_end.wrapping_add(10);

        assert_eq!(deadline_cmp(near_end, after_wrap), Ordering::Less);
        assert!(!expired(after_wrap, near_end));
        assert!(expired(near_end, after_wrap));
        assert_eq!(remaining(after_wrap, near_end), 10);
        assert_eq!(remaining(near_end, after_wrap), 0);
    }

    #[test]
    fn long_delays_are_clamped() {
        assert_eq!(deadline_after(0, Ticks::MAX), MAX_DELAY);
        assert!(!expired(deadline_after(100, Ticks::MAX), 100));
    }
}
