//! CPU-profile recording for `-profile`, Unix-only. Grounded in the
//! `pprof::ProfilerGuardBuilder` + flamegraph-report shape.

use std::path::{Path, PathBuf};

use crate::error::{Result, RpmError};

#[cfg(unix)]
pub struct ProfileGuard {
    path: PathBuf,
    guard: pprof::ProfilerGuard<'static>,
}

#[cfg(unix)]
impl ProfileGuard {
    pub fn start(path: &Path) -> Result<Self> {
        let guard = pprof::ProfilerGuardBuilder::default()
            .frequency(1000)
            .blocklist(&["libc", "libgcc", "pthread", "vdso"])
            .build()
            .map_err(|e| RpmError::ProfileOpen(e.to_string()))?;
        Ok(Self {
            path: path.to_path_buf(),
            guard,
        })
    }

    pub fn finish(self) -> Result<()> {
        let report = self
            .guard
            .report()
            .build()
            .map_err(|e| RpmError::ProfileOpen(e.to_string()))?;
        let file = std::fs::File::create(&self.path).map_err(|e| RpmError::ProfileOpen(e.to_string()))?;
        report.flamegraph(file).map_err(|e| RpmError::ProfileOpen(e.to_string()))?;
        Ok(())
    }
}

#[cfg(not(unix))]
pub struct ProfileGuard;

#[cfg(not(unix))]
impl ProfileGuard {
    pub fn start(_path: &Path) -> Result<Self> {
        Err(RpmError::ProfileOpen("CPU profiling is only supported on Unix".to_string()))
    }

    pub fn finish(self) -> Result<()> {
        Ok(())
    }
}
