use std::fs;

use partition_registry::{Filesystem, SECTOR_SIZE};

use super::fake::{fill_tree, write_sectors, Bench, FakeOperator, MIB};
use crate::{Command, DeviceState, Error, Step};

#[test]
fn dalvik_cache_is_emptied_but_kept() {
    let bench = Bench::mid703();
    let data = bench.backing(&bench.registry.sd().data.device);
    fill_tree(&data.join("dalvik-cache"), 6);
    fs::write(data.join("settings.db"), b"keep").unwrap();

    let mut device = bench.device();
    let mut ui = FakeOperator::new();
    let outcome = device.wipe_dalvik_cache(&mut ui).unwrap();
    assert_eq!(outcome.step("dalvik-cache"), Some(&Step::Succeeded));

    assert!(data.join("dalvik-cache").is_dir());
    assert_eq!(fs::read_dir(data.join("dalvik-cache")).unwrap().count(), 0);
    assert_eq!(fs::read(data.join("settings.db")).unwrap(), b"keep");
    assert!(device.executor().mounted().is_empty());

    let mounts = bench.registry.mounts();
    assert!(device.executor().commands().iter().any(|c| *c
        == Command::Mount {
            source: bench.registry.sd().data.device.clone(),
            mountpoint: mounts.data.clone(),
            fs: None,
            options: None,
        }));
}

#[test]
fn wipes_format_their_partition() {
    let bench = Bench::mid703();
    let sd = bench.registry.sd();
    let data = bench.backing(&sd.data.device);
    let cache = bench.backing(&sd.cache.device);
    fs::write(data.join("user.db"), b"x").unwrap();
    fs::write(cache.join("cached"), b"x").unwrap();

    let mut device = bench.device();
    device.wipe_data(&mut FakeOperator::new()).unwrap();
    assert!(!data.join("user.db").exists());
    assert!(cache.join("cached").exists());

    device.wipe_cache(&mut FakeOperator::new()).unwrap();
    assert!(!cache.join("cached").exists());

    assert_eq!(
        device.executor().commands(),
        [
            Command::Format {
                device: sd.data.device.clone(),
                fs: Filesystem::Ext4,
            },
            Command::Format {
                device: sd.cache.device.clone(),
                fs: Filesystem::Ext4,
            },
        ]
    );

    let failure = device
        .wipe_data(&mut FakeOperator::new().answers(&[false]))
        .unwrap_err();
    assert!(failure.is_cancelled());
    assert_eq!(device.executor().commands().len(), 2);
}

#[test]
fn sd_card_cannot_be_repartitioned_under_the_log() {
    let bench = Bench::mid703();
    let mut device = bench.device();
    let mut ui = FakeOperator::new();

    let failure = device.partition_sd_card(&mut ui, true).unwrap_err();
    assert!(matches!(failure.error, Error::InUse(_)));
    assert_eq!(failure.device, DeviceState::Unmodified);
    assert!(ui.heard("Insert an external SD card"));
    assert!(device.executor().commands().is_empty());
}

#[test]
fn sd_card_layout_is_asked_again_until_it_fits() {
    let bench = Bench::mid703();
    let sd = bench.registry.sd();
    write_sectors(&sd.presence, 1024 * MIB / SECTOR_SIZE);

    let mut device = bench.device();
    // 256/1024/512 leaves nothing, 96/512/192 leaves 188 MB
    let mut ui = FakeOperator::new().choices(&[6, 6, 6, 1, 2, 1]);
    let outcome = device.partition_sd_card(&mut ui, false).unwrap();

    assert!(ui.heard("There is no room left for user area"));
    assert!(ui.heard("This leaves 188 MB for the user area"));
    assert!(ui
        .prompts
        .iter()
        .any(|p| p == "Select size of 'cache' partition in MB"));
    assert_eq!(outcome.step("partition"), Some(&Step::Succeeded));
    for name in ["user area", "cache", "data", "system"] {
        assert_eq!(
            outcome.step(&format!("format {name}")),
            Some(&Step::Succeeded),
            "{name}"
        );
    }

    let commands = device.executor().commands();
    assert_eq!(
        commands[0],
        Command::Script {
            script: bench.registry.scripts().partition.clone(),
            args: vec![
                sd.device.to_string_lossy().into_owned(),
                "96".into(),
                "512".into(),
                "192".into(),
            ],
        }
    );
    assert_eq!(
        commands[1],
        Command::Format {
            device: sd.user_area.device.clone(),
            fs: Filesystem::Vfat,
        }
    );
    assert_eq!(commands.len(), 5);
}

#[test]
fn sd_card_formats_are_all_attempted() {
    let bench = Bench::mid703();
    let cache = bench.registry.sd().cache.device.clone();
    let mut device = bench.device();
    device
        .executor_mut()
        .fail_when(move |c| matches!(c, Command::Format { device, .. } if *device == cache));

    let mut ui = FakeOperator::new().choices(&[0, 0, 0]);
    let failure = device.partition_sd_card(&mut ui, false).unwrap_err();

    assert_eq!(failure.device, DeviceState::PossiblyInconsistent);
    assert!(matches!(failure.error, Error::CommandFailed { .. }));
    let formats = device
        .executor()
        .commands()
        .iter()
        .filter(|c| matches!(c, Command::Format { .. }))
        .count();
    assert_eq!(formats, 4);
}

#[test]
fn backing_out_of_a_size_menu_cancels() {
    let bench = Bench::mid703();
    let mut device = bench.device();
    let mut ui = FakeOperator::new().choices(&[0]);

    let failure = device.partition_sd_card(&mut ui, false).unwrap_err();
    assert!(failure.is_cancelled());
    assert_eq!(failure.device, DeviceState::Unmodified);
    assert!(device.executor().commands().is_empty());
}

#[test]
fn unknown_card_size_is_refused() {
    let bench = Bench::mid703();
    write_sectors(&bench.registry.sd().presence, 0);
    let mut device = bench.device();
    let mut ui = FakeOperator::new();

    let failure = device.partition_sd_card(&mut ui, false).unwrap_err();
    assert!(matches!(failure.error, Error::StorageUnreachable(_)));
    assert!(ui.heard("Unable to determine size of internal SD card"));
}

#[test]
fn shutdown_and_kernel_messages() {
    let bench = Bench::pc();
    let mut device = bench.device();
    device.dump_kernel_messages().unwrap();
    device.shutdown().unwrap();
    assert_eq!(
        device.executor().commands(),
        [Command::KernelMessages, Command::Reboot]
    );
}
