use std::path::PathBuf;

use device_backup::partition_registry::Role;
use device_backup::{Device, Executor, Failure, Operator, Outcome, Selection};
use log::{error, info, warn};

use crate::ui::Console;

pub struct Session {
    pub log: PathBuf,
    pub log_on_internal: bool,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Action {
    FlashRom,
    ApplyPatch,
    WipeData,
    WipeCache,
    Backup(Selection),
    Restore,
    BackupPartition(Role),
    FlashPartition(Role),
    ShowLog,
    WipeDalvikCache,
    PartitionSdCard,
    FixPermissions,
    FileInspector,
    KernelMessages,
    Shutdown,
}

enum Item {
    Action(&'static str, Action),
    Menu(&'static str, &'static [Item]),
}

impl Item {
    fn label(&self) -> &'static str {
        match self {
            Item::Action(label, _) | Item::Menu(label, _) => *label,
        }
    }
}

const BACKUPS: &[Item] = &[
    Item::Action("Create system backup", Action::Backup(Selection::SYSTEM)),
    Item::Action("Create data backup", Action::Backup(Selection::DATA)),
    Item::Action("Create data+system backup", Action::Backup(Selection::ALL)),
    Item::Action("Restore backup", Action::Restore),
];

const PARTITIONS: &[Item] = &[
    Item::Action("Backup logo", Action::BackupPartition(Role::Logo)),
    Item::Action("Backup kernel", Action::BackupPartition(Role::Kernel)),
    Item::Action("Backup recovery", Action::BackupPartition(Role::Recovery)),
    Item::Action("Backup bootargs", Action::BackupPartition(Role::BootArgs)),
    Item::Action("Backup parameters", Action::BackupPartition(Role::Param)),
    Item::Action("Backup bootloader", Action::BackupPartition(Role::Bootloader)),
    Item::Action("Flash logo", Action::FlashPartition(Role::Logo)),
    Item::Action("Flash kernel", Action::FlashPartition(Role::Kernel)),
    Item::Action("Flash recovery", Action::FlashPartition(Role::Recovery)),
    Item::Action("Flash bootargs", Action::FlashPartition(Role::BootArgs)),
    Item::Action("Flash parameters", Action::FlashPartition(Role::Param)),
];

const ADVANCED: &[Item] = &[
    Item::Action("Show log", Action::ShowLog),
    Item::Action("Wipe dalvik-cache", Action::WipeDalvikCache),
    Item::Action("Partition SD card", Action::PartitionSdCard),
    Item::Action("Fix ROM permissions", Action::FixPermissions),
    Item::Action("File inspector", Action::FileInspector),
    Item::Action("Dump kernel messages", Action::KernelMessages),
];

const MAIN: &[Item] = &[
    Item::Action("Flash ROM", Action::FlashRom),
    Item::Action("Apply patch/update", Action::ApplyPatch),
    Item::Action("Wipe data/factory reset", Action::WipeData),
    Item::Action("Wipe cache", Action::WipeCache),
    Item::Menu("Backup/Restore", BACKUPS),
    Item::Menu("Partitions and Storage", PARTITIONS),
    Item::Menu("Advanced", ADVANCED),
    Item::Action("Shutdown", Action::Shutdown),
];

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Flow {
    Continue,
    Exit,
}

/// Shows the main menu until the device shuts down or the operator backs out.
pub fn run<E: Executor>(device: &mut Device<'_, E>, console: &mut Console, session: &Session) {
    let title = format!("MID Recovery {}", clap::crate_version!());
    show(device, console, session, &title, MAIN, true);
}

fn show<E: Executor>(
    device: &mut Device<'_, E>,
    console: &mut Console,
    session: &Session,
    title: &str,
    items: &[Item],
    top: bool,
) -> Flow {
    let mut labels: Vec<String> = items.iter().map(|item| item.label().to_owned()).collect();
    if !top {
        labels.push("(Back)".to_owned());
    }

    loop {
        let Some(index) = console.choose(title, &labels) else {
            return Flow::Continue;
        };
        let flow = match items.get(index) {
            None => return Flow::Continue,
            Some(Item::Menu(label, children)) => show(device, console, session, label, children, false),
            Some(Item::Action(label, action)) => {
                info!("Selected '{label}'");
                perform(device, console, session, *action)
            }
        };
        if flow == Flow::Exit {
            return Flow::Exit;
        }
    }
}

fn perform<E: Executor>(
    device: &mut Device<'_, E>,
    console: &mut Console,
    session: &Session,
    action: Action,
) -> Flow {
    let result = match action {
        Action::FlashRom => device.flash_rom(console),
        Action::ApplyPatch => device.apply_patch(console),
        Action::WipeData => device.wipe_data(console),
        Action::WipeCache => device.wipe_cache(console),
        Action::Backup(selection) => device.create_backup(console, selection),
        Action::Restore => device.restore_backup(console),
        Action::BackupPartition(role) => device.backup_single(console, role),
        Action::FlashPartition(Role::BootArgs) => device.flash_boot_args(console),
        Action::FlashPartition(role) => device.flash_single(console, role),
        Action::WipeDalvikCache => device.wipe_dalvik_cache(console),
        Action::PartitionSdCard => device.partition_sd_card(console, session.log_on_internal),
        Action::FixPermissions => device.fix_permissions(console),
        Action::ShowLog => {
            log::logger().flush();
            console.present_file(&session.log);
            return Flow::Continue;
        }
        Action::FileInspector => {
            if let Some(file) = console.choose_file(device.home(), &[]) {
                console.present_file(&file);
            }
            return Flow::Continue;
        }
        Action::KernelMessages => {
            match device.dump_kernel_messages() {
                Ok(()) => console.say("Kernel messages were added to the log."),
                Err(err) => console.say(&format!("Failed to read kernel messages: {err}")),
            }
            console.pause();
            return Flow::Continue;
        }
        Action::Shutdown => {
            info!("Shutting down");
            log::logger().flush();
            return match device.shutdown() {
                Ok(()) => Flow::Exit,
                Err(err) => {
                    console.say(&format!("Failed to shut down: {err}"));
                    console.pause();
                    Flow::Continue
                }
            };
        }
    };
    report(console, result);
    Flow::Continue
}

fn report(console: &mut Console, result: Result<Outcome, Failure>) {
    match result {
        Ok(outcome) => {
            for (name, step) in outcome.steps() {
                info!("{name}: {step:?}");
            }
            console.say("Success!");
        }
        Err(failure) if failure.is_cancelled() => {
            info!("Cancelled");
            return;
        }
        Err(failure) => {
            error!("{}", failure.error);
            warn!("{:?}", failure.device);
            console.say(&failure.error.to_string());
            console.say(failure.device.note());
        }
    }
    console.pause();
}
