//! In-memory collaborators for tests and dry runs (feature `test-utils`).
//!
//! Both record what was done to them so tests can assert on the exact order
//! of side effects, and both support injected failures to simulate an
//! interruption at a given step.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::bootloader::{Bootloader, BootloaderError, KERNEL_STATUS_VAR};
use crate::config::BootContext;
use crate::modeenv::{Modeenv, ModeenvStore, StoreError};
use crate::primitives::ArtifactPlacement;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BootloaderOp {
    GetBootVars,
    SetBootVars,
    Kernel,
    TryKernel,
    EnableKernel,
    EnableTryKernel,
    DisableTryKernel,
}

impl BootloaderOp {
    fn name(&self) -> &'static str {
        match self {
            BootloaderOp::GetBootVars => "get boot variables",
            BootloaderOp::SetBootVars => "set boot variables",
            BootloaderOp::Kernel => "identify kernel",
            BootloaderOp::TryKernel => "identify try-kernel",
            BootloaderOp::EnableKernel => "enable kernel",
            BootloaderOp::EnableTryKernel => "enable try-kernel",
            BootloaderOp::DisableTryKernel => "disable try-kernel",
        }
    }

    /// Whether the operation changes bootloader state.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            BootloaderOp::SetBootVars
                | BootloaderOp::EnableKernel
                | BootloaderOp::EnableTryKernel
                | BootloaderOp::DisableTryKernel
        )
    }
}

#[derive(Debug, Default)]
struct BootloaderState {
    vars: HashMap<String, String>,
    kernel: Option<ArtifactPlacement>,
    try_kernel: Option<ArtifactPlacement>,
    ops: Vec<BootloaderOp>,
    failing: HashSet<BootloaderOp>,
}

#[derive(Debug, Default)]
pub struct InMemoryBootloader {
    state: Mutex<BootloaderState>,
}

impl InMemoryBootloader {
    pub fn with_kernel(kernel: ArtifactPlacement) -> Self {
        let bl = InMemoryBootloader::default();
        bl.lock().kernel = Some(kernel);
        bl
    }

    fn lock(&self) -> MutexGuard<'_, BootloaderState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Logs `op` and fails it if a failure was injected.
    fn enter(&self, op: BootloaderOp) -> Result<MutexGuard<'_, BootloaderState>, BootloaderError> {
        let mut state = self.lock();
        state.ops.push(op);
        if state.failing.contains(&op) {
            return Err(BootloaderError::operation(op.name(), "injected failure"));
        }
        Ok(state)
    }

    pub fn fail_on(&self, op: BootloaderOp) {
        self.lock().failing.insert(op);
    }

    pub fn clear_failures(&self) {
        self.lock().failing.clear();
    }

    /// Sets a variable behind the crate's back, as the boot script does.
    pub fn set_var(&self, name: &str, value: &str) {
        self.lock().vars.insert(name.to_string(), value.to_string());
    }

    pub fn var(&self, name: &str) -> String {
        self.lock().vars.get(name).cloned().unwrap_or_default()
    }

    pub fn kernel_status(&self) -> String {
        self.var(KERNEL_STATUS_VAR)
    }

    pub fn enabled_kernel(&self) -> Option<ArtifactPlacement> {
        self.lock().kernel.clone()
    }

    pub fn try_kernel_ref(&self) -> Option<ArtifactPlacement> {
        self.lock().try_kernel.clone()
    }

    pub fn set_try_kernel_ref(&self, kernel: Option<ArtifactPlacement>) {
        self.lock().try_kernel = kernel;
    }

    pub fn ops(&self) -> Vec<BootloaderOp> {
        self.lock().ops.clone()
    }

    pub fn mutating_ops(&self) -> Vec<BootloaderOp> {
        self.lock().ops.iter().copied().filter(BootloaderOp::is_mutation).collect()
    }
}

impl Bootloader for InMemoryBootloader {
    fn name(&self) -> &str {
        "in-memory"
    }

    fn get_boot_vars(&self, names: &[&str]) -> Result<HashMap<String, String>, BootloaderError> {
        let state = self.enter(BootloaderOp::GetBootVars)?;
        Ok(names
            .iter()
            .map(|name| (name.to_string(), state.vars.get(*name).cloned().unwrap_or_default()))
            .collect())
    }

    fn set_boot_vars(&self, values: &HashMap<String, String>) -> Result<(), BootloaderError> {
        let mut state = self.enter(BootloaderOp::SetBootVars)?;
        state.vars.extend(values.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }

    fn kernel(&self) -> Result<ArtifactPlacement, BootloaderError> {
        let state = self.enter(BootloaderOp::Kernel)?;
        state
            .kernel
            .clone()
            .ok_or_else(|| BootloaderError::operation("identify kernel", "no kernel is enabled"))
    }

    fn try_kernel(&self) -> Result<ArtifactPlacement, BootloaderError> {
        let state = self.enter(BootloaderOp::TryKernel)?;
        state.try_kernel.clone().ok_or(BootloaderError::NoTryKernelRef)
    }

    fn enable_kernel(&self, kernel: &ArtifactPlacement) -> Result<(), BootloaderError> {
        let mut state = self.enter(BootloaderOp::EnableKernel)?;
        state.kernel = Some(kernel.clone());
        Ok(())
    }

    fn enable_try_kernel(&self, kernel: &ArtifactPlacement) -> Result<(), BootloaderError> {
        let mut state = self.enter(BootloaderOp::EnableTryKernel)?;
        state.try_kernel = Some(kernel.clone());
        Ok(())
    }

    fn disable_try_kernel(&self) -> Result<(), BootloaderError> {
        let mut state = self.enter(BootloaderOp::DisableTryKernel)?;
        state.try_kernel = None;
        Ok(())
    }
}

/// Modeenv held in memory, counting writes.
#[derive(Debug, Default)]
pub struct MemoryModeenvStore {
    record: Mutex<Option<Modeenv>>,
    writes: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MemoryModeenvStore {
    pub fn new(record: Modeenv) -> Self {
        MemoryModeenvStore { record: Mutex::new(Some(record)), ..Default::default() }
    }

    /// A store with no record, as on a device that was never initialized.
    pub fn empty() -> Self {
        MemoryModeenvStore::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Modeenv>> {
        self.record.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> Option<Modeenv> {
        self.lock().clone()
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl ModeenvStore for MemoryModeenvStore {
    fn read(&self) -> Result<Modeenv, StoreError> {
        self.lock().clone().ok_or_else(|| StoreError::NotFound(PathBuf::from("<memory>")))
    }

    fn write(&self, modeenv: &Modeenv) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            let err = std::io::Error::other("injected failure");
            return Err(StoreError::io(err, "write", std::path::Path::new("<memory>")));
        }
        *self.lock() = Some(modeenv.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Builds a context sharing the given fakes, so tests keep handles to inspect
/// them.
pub fn context(bootloader: &Arc<InMemoryBootloader>, store: &Arc<MemoryModeenvStore>) -> BootContext {
    BootContext::new(bootloader.clone(), store.clone())
}
