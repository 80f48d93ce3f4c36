#![cfg(unix)]

use std::fs;

use bootstate_core::bootloader::{Bootloader, BootloaderError, ExtractedKernelBootloader, KERNEL_STATUS_VAR};
use bootstate_core::modeenv::{FileModeenvStore, Modeenv, ModeenvStore};
use bootstate_core::{
    boot_target_for, ArtifactPlacement, BootContext, BootPaths, BootStateError, BootStatus, CommitPlan, Revision,
    TargetKind,
};

fn placement(name: &str, rev: i32) -> ArtifactPlacement {
    ArtifactPlacement::new(name, Revision::store(rev)).unwrap()
}

fn extract(bl: &ExtractedKernelBootloader, kernel: &ArtifactPlacement) {
    let dir = bl.asset_dir(kernel);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("kernel.efi"), kernel.filename()).unwrap();
}

#[test]
fn links_follow_enable_and_disable() {
    let dir = tempfile::tempdir().unwrap();
    let bl = ExtractedKernelBootloader::new(dir.path());
    let k1 = placement("pc-kernel", 1);
    let k2 = placement("pc-kernel", 2);

    assert!(matches!(bl.try_kernel(), Err(BootloaderError::NoTryKernelRef)));
    assert!(bl.enable_kernel(&k1).is_err(), "assets must be extracted first");

    extract(&bl, &k1);
    extract(&bl, &k2);
    bl.enable_kernel(&k1).unwrap();
    bl.enable_try_kernel(&k2).unwrap();
    assert_eq!(bl.kernel().unwrap(), k1);
    assert_eq!(bl.try_kernel().unwrap(), k2);

    // Re-enabling replaces the link in place.
    bl.enable_kernel(&k2).unwrap();
    assert_eq!(bl.kernel().unwrap(), k2);

    bl.disable_try_kernel().unwrap();
    bl.disable_try_kernel().unwrap();
    assert!(matches!(bl.try_kernel(), Err(BootloaderError::NoTryKernelRef)));
}

#[test]
fn dangling_reference_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let bl = ExtractedKernelBootloader::new(dir.path());
    std::os::unix::fs::symlink("not-a-kernel/kernel.efi", dir.path().join("try-kernel.efi")).unwrap();
    assert!(matches!(bl.try_kernel(), Err(BootloaderError::InvalidReference { .. })));
}

#[test]
fn boot_vars_merge_and_default_to_empty() {
    let dir = tempfile::tempdir().unwrap();
    let bl = ExtractedKernelBootloader::new(dir.path());
    let vars = bl.get_boot_vars(&[KERNEL_STATUS_VAR]).unwrap();
    assert_eq!(vars[KERNEL_STATUS_VAR], "");

    bl.set_boot_vars(&[("other".to_string(), "x".to_string())].into()).unwrap();
    bl.set_boot_vars(&[(KERNEL_STATUS_VAR.to_string(), "try".to_string())].into()).unwrap();
    let vars = bl.get_boot_vars(&[KERNEL_STATUS_VAR, "other"]).unwrap();
    assert_eq!(vars[KERNEL_STATUS_VAR], "try");
    assert_eq!(vars["other"], "x");
}

#[test]
fn kernel_try_and_commit_on_disk() {
    let root = tempfile::tempdir().unwrap();
    let paths = BootPaths::under(root.path());
    let bl = ExtractedKernelBootloader::new(&paths.kernel_dir);
    let k1 = placement("pc-kernel", 1);
    let k2 = placement("pc-kernel", 2);
    extract(&bl, &k1);
    extract(&bl, &k2);
    bl.enable_kernel(&k1).unwrap();

    let store = FileModeenvStore::new(&paths.modeenv_file);
    store
        .write(&Modeenv {
            base: placement("core20", 1).filename(),
            current_kernels: vec![k1.filename()],
            ..Modeenv::default()
        })
        .unwrap();

    let ctx = BootContext::from_paths(&paths);
    let (reboot, update) = boot_target_for(TargetKind::Kernel, &ctx).set_next(k2.clone()).unwrap();
    assert!(reboot);
    update.commit().unwrap();
    assert_eq!(bl.try_kernel().unwrap(), k2);
    assert_eq!(store.read().unwrap().current_kernels, vec![k1.filename(), k2.filename()]);

    // The boot script marks the attempt.
    bl.set_boot_vars(&[(KERNEL_STATUS_VAR.to_string(), "trying".to_string())].into()).unwrap();
    let mut target = boot_target_for(TargetKind::Kernel, &ctx);
    assert_eq!(target.revisions().unwrap().status, BootStatus::Trying);

    let mut plan = CommitPlan::new();
    target.mark_successful(&mut plan).unwrap();
    plan.commit().unwrap();

    assert_eq!(bl.kernel().unwrap(), k2);
    assert!(matches!(bl.try_kernel(), Err(BootloaderError::NoTryKernelRef)));
    assert_eq!(bl.get_boot_vars(&[KERNEL_STATUS_VAR]).unwrap()[KERNEL_STATUS_VAR], "");
    assert_eq!(store.read().unwrap().current_kernels, vec![k2.filename()]);
}

#[test]
fn malformed_bootenv_is_a_capability_error() {
    let root = tempfile::tempdir().unwrap();
    let paths = BootPaths::under(root.path());
    let bl = ExtractedKernelBootloader::new(&paths.kernel_dir);
    let k1 = placement("pc-kernel", 1);
    extract(&bl, &k1);
    bl.enable_kernel(&k1).unwrap();
    fs::write(paths.kernel_dir.join("bootenv.json"), b"{\"kernel_status\": ").unwrap();
    FileModeenvStore::new(&paths.modeenv_file)
        .write(&Modeenv {
            base: placement("core20", 1).filename(),
            current_kernels: vec![k1.filename()],
            ..Modeenv::default()
        })
        .unwrap();

    let ctx = BootContext::from_paths(&paths);
    let err = boot_target_for(TargetKind::Kernel, &ctx).revisions().unwrap_err();
    assert!(matches!(err, BootStateError::Capability { .. }), "unexpected error: {err}");

    // Staging must not paper over it with a default status either.
    let err = boot_target_for(TargetKind::Kernel, &ctx).set_next(placement("pc-kernel", 2)).unwrap_err();
    assert!(matches!(err, BootStateError::Capability { .. }), "unexpected error: {err}");
}
