//! OS-level resource ceilings applied to sandboxed child processes.
//!
//! Ceilings are a second line of defence behind the wall-clock timeout. When
//! they cannot be applied the step still runs and the timeout stays
//! authoritative.

use serde::{Deserialize, Serialize};
use tokio::process::Command;

/// 4 GiB. Toolchains such as the JVM, Node and Go reserve large virtual
/// ranges at startup that are not physical memory pressure.
pub const DEFAULT_ADDRESS_SPACE_BYTES: u64 = 4 * 1024 * 1024 * 1024;

pub const DEFAULT_CPU_SECONDS: u64 = 60;

/// CPU-time and virtual-address-space ceilings for one child process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ResourceLimits {
    pub enabled: bool,
    /// `RLIMIT_CPU`, in seconds of CPU time.
    pub cpu_seconds: u64,
    /// `RLIMIT_AS`, in bytes.
    pub address_space_bytes: u64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            enabled: true,
            cpu_seconds: DEFAULT_CPU_SECONDS,
            address_space_bytes: DEFAULT_ADDRESS_SPACE_BYTES,
        }
    }
}

impl ResourceLimits {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Arrange for the ceilings to be set in the child before it execs.
    ///
    /// Requested values above the current hard limit are clamped, since an
    /// unprivileged process cannot raise its hard limit. Problems are logged and
    /// never returned.
    #[cfg(unix)]
    pub fn install(&self, cmd: &mut Command) {
        if !self.enabled {
            return;
        }

        let cpu = clamp_to_hard(
            "cpu",
            current_hard_limit(Resource::Cpu),
            self.cpu_seconds as libc::rlim_t,
        );
        let address_space = clamp_to_hard(
            "address_space",
            current_hard_limit(Resource::AddressSpace),
            self.address_space_bytes as libc::rlim_t,
        );

        // SAFETY: the hook runs in the child between fork and exec. It only
        // calls setrlimit(2), which is async-signal-safe, and does not allocate.
        // Failures are swallowed so the step still runs under the timeout.
        unsafe {
            cmd.pre_exec(move || {
                let cpu_limit = libc::rlimit {
                    rlim_cur: cpu,
                    rlim_max: cpu,
                };
                let _ = libc::setrlimit(libc::RLIMIT_CPU, &cpu_limit);
                let as_limit = libc::rlimit {
                    rlim_cur: address_space,
                    rlim_max: address_space,
                };
                let _ = libc::setrlimit(libc::RLIMIT_AS, &as_limit);
                Ok(())
            });
        }
    }

    #[cfg(not(unix))]
    pub fn install(&self, _cmd: &mut Command) {
        if self.enabled {
            crate::obs::emit_limits_degraded("resource ceilings are not supported on this platform");
        }
    }
}

#[cfg(unix)]
#[derive(Debug, Clone, Copy)]
enum Resource {
    Cpu,
    AddressSpace,
}

/// Hard limit for `resource`, or `None` if it cannot be read.
#[cfg(unix)]
fn current_hard_limit(resource: Resource) -> Option<libc::rlim_t> {
    let mut current = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    // SAFETY: getrlimit writes into the provided, properly initialised struct.
    let rc = unsafe {
        match resource {
            Resource::Cpu => libc::getrlimit(libc::RLIMIT_CPU, &mut current),
            Resource::AddressSpace => libc::getrlimit(libc::RLIMIT_AS, &mut current),
        }
    };
    if rc == 0 {
        Some(current.rlim_max)
    } else {
        None
    }
}

#[cfg(unix)]
fn clamp_to_hard(name: &str, hard: Option<libc::rlim_t>, requested: libc::rlim_t) -> libc::rlim_t {
    match hard {
        None => {
            crate::obs::emit_limits_degraded(&format!(
                "could not read current {name} limit; applying requested value blindly"
            ));
            requested
        }
        Some(hard) if hard != libc::RLIM_INFINITY && requested > hard => {
            crate::obs::emit_limits_degraded(&format!(
                "requested {name} limit {requested} exceeds hard limit {hard}; clamping"
            ));
            hard
        }
        Some(_) => requested,
    }
}
