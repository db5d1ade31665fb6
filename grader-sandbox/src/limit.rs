use rlimit::Resource;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Hard ceilings for one untrusted process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub cpu_time: u64,      // seconds
    pub address_space: u64, // bytes
    pub processes: u64,     // number
    pub file_size: u64,     // bytes
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            cpu_time: 2,
            address_space: 200 * 1024 * 1024,
            processes: 20,
            file_size: 10 * 1024 * 1024,
        }
    }
}

/// The subset of a [`ResourceLimits`] policy that this host can enforce.
#[derive(Debug, Clone)]
pub struct AppliedLimits {
    entries: Vec<(Resource, u64)>,
}

impl ResourceLimits {
    fn entries(&self) -> [(Resource, u64); 4] {
        [
            (Resource::CPU, self.cpu_time),
            (Resource::AS, self.address_space),
            (Resource::NPROC, self.processes),
            (Resource::FSIZE, self.file_size),
        ]
    }

    /// Runs in the parent. Unsupported resources are dropped here so the
    /// child only has to call `setrlimit`.
    pub fn prepare(&self) -> AppliedLimits {
        let entries = self
            .entries()
            .into_iter()
            .filter(|&(resource, value)| {
                let supported = resource.is_supported();
                if !supported {
                    warn!(
                        resource = resource.as_name(),
                        value, "resource limit is not supported on this host, skipped"
                    );
                }
                supported
            })
            .collect();
        AppliedLimits { entries }
    }
}

impl AppliedLimits {
    /// Installs every limit on the calling process. Soft and hard limits are
    /// equal. A limit the kernel refuses is skipped, the rest still apply.
    ///
    /// Only async-signal-safe calls are made here: it runs between `fork`
    /// and `exec`.
    pub fn apply(&self) {
        for &(resource, value) in &self.entries {
            // can not raise a hard limit without privileges
            let value = match resource.get() {
                Ok((_, hard)) => value.min(hard),
                Err(_) => value,
            };
            let _ = resource.set(value, value);
        }
    }

    pub fn resources(&self) -> impl Iterator<Item = Resource> + '_ {
        self.entries.iter().map(|&(r, _)| r)
    }
}
