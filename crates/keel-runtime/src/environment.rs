//! Process-environment checks made once per start.

use keel_framework::TimeoutPolicy;
use tracing::{debug, warn};

use crate::config::Profile;

/// Setting this variable relaxes registration timeouts.
pub const INSPECT_VAR: &str = "KEEL_INSPECT";

/// Derives the registration timeout policy.
///
/// Timeouts are not enforced in production, under a debugger, or when
/// `KEEL_INSPECT` is set.
pub fn timeout_policy(profile: &Profile) -> TimeoutPolicy {
    let inspect = std::env::var_os(INSPECT_VAR).is_some();
    policy_for(profile, inspect, debugger_attached())
}

fn policy_for(profile: &Profile, inspect: bool, debugger: bool) -> TimeoutPolicy {
    if *profile == Profile::Production || inspect || debugger {
        debug!(profile = %profile, inspect, debugger, "Registration timeouts relaxed");
        TimeoutPolicy::relaxed()
    } else {
        TimeoutPolicy::enforced()
    }
}

/// Whether a tracer such as gdb or lldb is attached to this process.
#[cfg(target_os = "linux")]
pub fn debugger_attached() -> bool {
    std::fs::read_to_string("/proc/self/status")
        .map(|status| tracer_pid(&status).is_some_and(|pid| pid != 0))
        .unwrap_or(false)
}

/// Whether a tracer such as gdb or lldb is attached to this process.
#[cfg(not(target_os = "linux"))]
pub fn debugger_attached() -> bool {
    false
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn tracer_pid(status: &str) -> Option<u32> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("TracerPid:"))
        .and_then(|pid| pid.trim().parse().ok())
}

/// Warns about profiles outside the known set.
pub fn check_profile(profile: &Profile) {
    if !profile.is_known() {
        warn!(
            profile = %profile,
            "Profile should be empty or one of {}",
            Profile::KNOWN.join(", ")
        );
    }
}
