use std::fs;

use partition_registry::{Role, SECTOR_SIZE};

use super::fake::{fill_tree, random_bytes, read_tree, Bench, Entry, FakeOperator, MIB};
use super::{files_with_extension, leftover_scratch};
use crate::{Command, DeviceState, Error, Selection, Step, UbiState, Warning};

#[test]
fn backup_then_restore_brings_everything_back() {
    let bench = Bench::mid703();
    let registry = &bench.registry;
    let sd = registry.sd();
    let nand = bench.backing(&registry.lookup(Role::Rootfs).ubi_volume().unwrap().mount_source());
    let system = bench.backing(&sd.system.device);
    let data = bench.backing(&sd.data.device);

    bench.scribble_flash(Role::Kernel, 4096);
    fill_tree(&nand, 12);
    fill_tree(&system, 9);
    fill_tree(&data, 7);
    let kernel_before = bench.flash_contents(Role::Kernel);
    let trees_before = [read_tree(&nand), read_tree(&system), read_tree(&data)];

    let mut device = bench.device();
    let mut ui = FakeOperator::new().directory(bench.home());
    let outcome = device.create_backup(&mut ui, Selection::ALL).unwrap();

    assert!(!outcome.failed());
    for step in ["kernel", "nand", "system", "data", "archive"] {
        assert_eq!(outcome.step(step), Some(&Step::Succeeded), "{step}");
    }
    assert_eq!(device.ubi_state(), UbiState::Detached);
    assert!(device.executor().mounted().is_empty());
    assert!(!leftover_scratch(&bench.home()));

    let archives = files_with_extension(&bench.home(), "mfw");
    assert_eq!(archives.len(), 1);
    let name = archives[0].file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("Backup_"), "{name}");

    // trash the device
    bench.scribble_flash(Role::Kernel, 4096);
    for tree in [&nand, &system, &data] {
        fs::remove_dir_all(tree).unwrap();
        fs::create_dir_all(tree).unwrap();
        fs::write(tree.join("stray"), b"stray").unwrap();
    }

    let mut device = bench.device();
    let mut ui = FakeOperator::new().file(&archives[0]);
    let outcome = device.restore_backup(&mut ui).unwrap();

    assert!(!outcome.failed());
    assert!(outcome.warnings().is_empty());
    assert_eq!(bench.flash_contents(Role::Kernel), kernel_before);
    assert_eq!(
        [read_tree(&nand), read_tree(&system), read_tree(&data)],
        trees_before
    );
    assert_eq!(device.ubi_state(), UbiState::Detached);
    assert!(device.executor().mounted().is_empty());
    assert!(!leftover_scratch(&bench.home()));
}

#[test]
fn empty_selection_packs_an_empty_archive() {
    let bench = Bench::mid703();
    let mut device = bench.device();
    let mut ui = FakeOperator::new().directory(bench.home());

    let outcome = device.create_backup(&mut ui, Selection::default()).unwrap();
    assert_eq!(outcome.steps().len(), 1);
    assert_eq!(outcome.step("archive"), Some(&Step::Succeeded));

    let commands = device.executor().commands();
    assert_eq!(commands.len(), 1);
    assert!(matches!(
        &commands[0],
        Command::TarCreate { members: Some(members), .. } if members.is_empty()
    ));

    let archives = files_with_extension(&bench.home(), "mfw");
    assert_eq!(archives.len(), 1);
    let entries: Vec<Entry> = postcard::from_bytes(&fs::read(&archives[0]).unwrap()).unwrap();
    assert!(entries.is_empty());
}

#[test]
fn failed_component_leaves_nothing_behind() {
    let bench = Bench::mid703();
    let data_mount = bench.registry.mounts().data.clone();
    let mut device = bench.device();
    device
        .executor_mut()
        .fail_when(move |c| matches!(c, Command::TarCreate { dir, .. } if *dir == data_mount));

    let mut ui = FakeOperator::new().directory(bench.home());
    let failure = device.create_backup(&mut ui, Selection::ALL).unwrap_err();

    assert_eq!(failure.device, DeviceState::Unmodified);
    assert!(matches!(failure.error, Error::CommandFailed { status: 1, .. }));
    assert!(files_with_extension(&bench.home(), "mfw").is_empty());
    assert!(!leftover_scratch(&bench.home()));
    assert!(device.executor().mounted().is_empty());
    assert_eq!(device.ubi_state(), UbiState::Detached);
}

#[test]
fn failed_final_archive_is_removed() {
    let bench = Bench::mid703();
    let home = bench.home();
    let mut device = bench.device();
    device.executor_mut().fail_when(move |c| {
        matches!(c, Command::TarCreate { archive, .. } if archive.starts_with(&home)
            && archive.extension().map_or(false, |ext| ext == "mfw"))
    });

    let mut ui = FakeOperator::new().directory(bench.home());
    let failure = device.create_backup(&mut ui, Selection::DATA).unwrap_err();

    assert_eq!(failure.device, DeviceState::Unmodified);
    assert!(files_with_extension(&bench.home(), "mfw").is_empty());
    assert!(ui.heard("Cleaning up failed backup archive"));
}

#[test]
fn declined_backup_runs_nothing() {
    let bench = Bench::mid703();
    let mut device = bench.device();
    let mut ui = FakeOperator::new().answers(&[false]);

    let failure = device.create_backup(&mut ui, Selection::ALL).unwrap_err();
    assert!(failure.is_cancelled());
    assert_eq!(failure.device, DeviceState::Unmodified);
    assert!(device.executor().commands().is_empty());
    assert!(!leftover_scratch(&bench.home()));
}

#[test]
fn missing_data_partition_is_refused_up_front() {
    let bench = Bench::mid703();
    fs::remove_dir_all(&bench.registry.sd().data.presence).unwrap();
    let mut device = bench.device();
    let mut ui = FakeOperator::new().directory(bench.home());

    let failure = device.create_backup(&mut ui, Selection::DATA).unwrap_err();
    assert!(matches!(failure.error, Error::StorageUnreachable(_)));
    assert!(ui.prompts.is_empty());
    assert!(device.executor().commands().is_empty());
}

#[test]
fn backup_without_nand_skips_it() {
    let bench = Bench::mid703();
    bench.unplug(Role::Rootfs);
    let mut device = bench.device();
    let mut ui = FakeOperator::new().directory(bench.home());

    let outcome = device.create_backup(&mut ui, Selection::SYSTEM).unwrap();
    assert_eq!(outcome.step("nand"), Some(&Step::Skipped("no NAND".into())));
    assert!(!device
        .executor()
        .commands()
        .iter()
        .any(|c| matches!(c, Command::UbiAttach { .. })));
}

#[test]
fn kernel_is_read_from_the_sd_mirror_without_mtd() {
    let bench = Bench::mid703();
    bench.unplug(Role::Kernel);
    let kernel = bench.registry.lookup(Role::Kernel);
    let first_block = 1 + kernel.offset / SECTOR_SIZE;
    assert_eq!(first_block, 18433);

    let mirror = random_bytes(kernel.size as usize);
    {
        use std::io::{Seek, SeekFrom, Write};
        let mut sd = fs::OpenOptions::new()
            .write(true)
            .open(&bench.registry.sd().device)
            .unwrap();
        sd.seek(SeekFrom::Start(first_block * SECTOR_SIZE)).unwrap();
        sd.write_all(&mirror).unwrap();
    }

    let mut device = bench.device();
    let mut ui = FakeOperator::new().directory(bench.home());
    device.backup_single(&mut ui, Role::Kernel).unwrap();

    assert!(device.executor().commands().iter().any(|c| matches!(
        c,
        Command::DiskRead { block_size: 512, count: 12288, skip: 18433, .. }
    )));
    assert_eq!(fs::read(bench.home().join("zImage")).unwrap(), mirror);
}

#[test]
fn size_estimate_follows_selection() {
    let bench = Bench::mid703();
    let device = bench.device();
    let kernel = 6 * MIB;
    let nand = 64 * MIB;
    let system = 256 * MIB;
    let data = 256 * MIB;

    assert_eq!(
        device.estimate_backup_size(Selection::SYSTEM),
        Some(kernel + nand + system)
    );
    assert_eq!(device.estimate_backup_size(Selection::DATA), Some(data));
    assert_eq!(device.estimate_backup_size(Selection::default()), Some(0));

    let bench = Bench::pc();
    let device = bench.device();
    assert_eq!(device.estimate_backup_size(Selection::SYSTEM), Some(system));
}

#[test]
fn unknown_size_asks_before_backing_up() {
    let bench = Bench::mid703();
    fs::remove_file(bench.registry.sd().data.presence.join("size")).unwrap();

    let mut device = bench.device();
    let mut ui = FakeOperator::new()
        .directory(bench.home())
        .answers(&[true, false]);
    let failure = device.create_backup(&mut ui, Selection::DATA).unwrap_err();
    assert!(failure.is_cancelled());
    assert_eq!(failure.device, DeviceState::Unmodified);
    assert!(ui.heard("insufficient space for creating a backup"));
    assert_eq!(ui.prompts.last().unwrap(), "Continue anyway?");
    assert!(device.executor().commands().is_empty());
    assert!(!leftover_scratch(&bench.home()));

    let mut ui = FakeOperator::new().directory(bench.home());
    let outcome = device.create_backup(&mut ui, Selection::DATA).unwrap();
    assert_eq!(
        outcome.warnings(),
        [Warning::InsufficientSpace("for creating a backup".into())]
    );
    assert_eq!(outcome.step("data"), Some(&Step::Succeeded));
    assert_eq!(files_with_extension(&bench.home(), "mfw").len(), 1);
}

#[test]
fn backup_then_restore_on_a_device_without_flash() {
    let bench = Bench::pc();
    let sd = bench.registry.sd();
    let system = bench.backing(&sd.system.device);
    let data = bench.backing(&sd.data.device);
    fill_tree(&system, 8);
    fill_tree(&data, 5);
    let trees_before = [read_tree(&system), read_tree(&data)];

    let mut device = bench.device();
    let mut ui = FakeOperator::new().directory(bench.home());
    let outcome = device.create_backup(&mut ui, Selection::ALL).unwrap();
    assert_eq!(
        outcome.step("kernel"),
        Some(&Step::Skipped("no kernel partition".into()))
    );
    assert_eq!(outcome.step("nand"), Some(&Step::Skipped("no NAND".into())));
    let archives = files_with_extension(&bench.home(), "mfw");
    assert_eq!(archives.len(), 1);

    for tree in [&system, &data] {
        fs::remove_dir_all(tree).unwrap();
        fs::create_dir_all(tree).unwrap();
        fs::write(tree.join("stray"), b"stray").unwrap();
    }

    let mut device = bench.device();
    let mut ui = FakeOperator::new().file(&archives[0]);
    let outcome = device.restore_backup(&mut ui).unwrap();
    assert!(!outcome.failed());
    assert_eq!([read_tree(&system), read_tree(&data)], trees_before);
    assert!(device.executor().mounted().is_empty());
    assert!(!leftover_scratch(&bench.home()));
}
