//! Repartitioning of the internal SD card.
//!
//! The card is split into a FAT user area followed by `cache`, `data` and
//! `system`. The partition script keeps [`RESERVED_HEAD_MB`] in front of the
//! first partition and [`RESERVED_TAIL_MB`] behind the last one.

use std::ops::RangeInclusive;

use log::{info, warn};
use partition_registry::Filesystem;

use crate::command::Command;
use crate::device::Device;
use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::operator::Operator;
use crate::outcome::{Failure, Outcome};
use crate::probe;

pub const RESERVED_HEAD_MB: u64 = 32;
pub const RESERVED_TAIL_MB: u64 = 4;

const MIB: u64 = 1024 * 1024;

fn sizes(range: RangeInclusive<u64>, step: usize) -> Vec<u64> {
    range.step_by(step).collect()
}

pub fn cache_sizes() -> Vec<u64> {
    sizes(64..=256, 32)
}

pub fn data_sizes() -> Vec<u64> {
    sizes(256..=1024, 128)
}

pub fn system_sizes() -> Vec<u64> {
    sizes(128..=512, 64)
}

/// Partition sizes in MiB.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Layout {
    pub cache: u64,
    pub data: u64,
    pub system: u64,
    pub user_area: u64,
}

/// Fits the chosen partitions onto a card of `device_mb`. The user area
/// gets what is left and must not end up empty.
pub fn plan_layout(device_mb: u64, cache: u64, data: u64, system: u64) -> Result<Layout> {
    let used = RESERVED_HEAD_MB + cache + data + system + RESERVED_TAIL_MB;
    match device_mb.checked_sub(used) {
        Some(user_area) if user_area > 0 => Ok(Layout {
            cache,
            data,
            system,
            user_area,
        }),
        _ => Err(Error::InsufficientSpace(format!(
            "no room left for user area on internal SD card \
             (cache={cache}, data={data}, system={system} and detected card size = {device_mb})"
        ))),
    }
}

impl<'r, E: Executor> Device<'r, E> {
    /// Repartitions and formats the internal SD card with sizes the operator
    /// picks.
    ///
    /// Refused while the operation log lives on the card.
    pub fn partition_sd_card(
        &mut self,
        ui: &mut impl Operator,
        log_on_internal: bool,
    ) -> Result<Outcome, Failure> {
        if log_on_internal {
            ui.say(
                "Because the recovery log is being stored in the internal SD card, it is \
                 not possible to re-partition the SD card. Insert an external SD card, \
                 reboot, and try again.",
            );
            return Err(Failure::unmodified(Error::InUse(
                "internal SD card holds the recovery log".into(),
            )));
        }

        let sd = self.registry.sd();
        let device_mb = probe::block_device_size(&sd.presence).unwrap_or(0) / MIB;
        if device_mb == 0 {
            ui.say("Unable to determine size of internal SD card.");
            return Err(Failure::unmodified(Error::StorageUnreachable(
                "internal SD card".into(),
            )));
        }

        ui.say(
            "If your firmware is installed on the 'system' partition of the internal SD \
             card it *WILL* be erased, and you will have to flash again or restore a backup.",
        );
        if !ui.confirm("Repartition the internal SD card?") {
            return Err(Failure::unmodified(Error::Cancelled));
        }

        let layout = loop {
            let cache = pick_size(ui, "cache", &cache_sizes())?;
            let data = pick_size(ui, "data", &data_sizes())?;
            let system = pick_size(ui, "system", &system_sizes())?;

            let layout = match plan_layout(device_mb, cache, data, system) {
                Ok(layout) => layout,
                Err(err) => {
                    warn!("{err}");
                    ui.say(&format!(
                        "There is no room left for user area on internal SD card. \
                         Please enter the sizes for cache, data and system again \
                         (cache={cache}, data={data}, system={system} and detected \
                         card size = {device_mb})"
                    ));
                    continue;
                }
            };

            ui.say(&format!(
                "You selected cache = {cache} MB, data = {data} MB and system = {system} MB. \
                 This leaves {} MB for the user area of internal SD.",
                layout.user_area
            ));
            if ui.confirm("Continue with this layout?") {
                break layout;
            }
        };

        let mut outcome = Outcome::default();
        self.apply_layout(ui, &layout, &mut outcome)
            .map_err(Failure::inconsistent)?;
        Ok(outcome)
    }

    fn apply_layout(
        &mut self,
        ui: &mut impl Operator,
        layout: &Layout,
        outcome: &mut Outcome,
    ) -> Result<()> {
        let registry = self.registry;
        let sd = registry.sd();
        info!("partitioning internal SD card as {layout:?}");

        ui.say("Making partitions...");
        let partitioned = self.run(Command::Script {
            script: registry.scripts().partition.clone(),
            args: vec![
                sd.device.to_string_lossy().into_owned(),
                layout.cache.to_string(),
                layout.data.to_string(),
                layout.system.to_string(),
            ],
        });
        outcome.track("partition", partitioned)?;

        let mut errors = Vec::new();
        for (label, partition) in [
            ("user area", &sd.user_area),
            ("'cache' partition", &sd.cache),
            ("'data' partition", &sd.data),
            ("'system' partition", &sd.system),
        ] {
            ui.say(&format!("Formatting {label}..."));
            let fs = partition.filesystem().unwrap_or(Filesystem::Vfat);
            let formatted = self.format(&partition.device, fs);
            if let Err(err) = outcome.track(format!("format {}", partition.name), formatted) {
                errors.push(err);
            }
        }
        Error::collect(errors)
    }
}

fn pick_size(ui: &mut impl Operator, name: &str, sizes: &[u64]) -> Result<u64, Failure> {
    let title = format!("Select size of '{name}' partition in MB");
    let options: Vec<String> = sizes.iter().map(u64::to_string).collect();
    let index = ui
        .choose(&title, &options)
        .ok_or_else(|| Failure::unmodified(Error::Cancelled))?;
    sizes
        .get(index)
        .copied()
        .ok_or_else(|| Failure::unmodified(Error::Logic("size choice out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::quickcheck;

    #[test]
    fn size_menus() {
        assert_eq!(cache_sizes(), [64, 96, 128, 160, 192, 224, 256]);
        assert_eq!(data_sizes(), [256, 384, 512, 640, 768, 896, 1024]);
        assert_eq!(system_sizes(), [128, 192, 256, 320, 384, 448, 512]);
    }

    #[test]
    fn leaves_the_rest_to_the_user_area() {
        let layout = plan_layout(4096, 96, 512, 256).unwrap();
        assert_eq!(layout.user_area, 3196);
    }

    #[test]
    fn rejects_full_cards() {
        assert!(matches!(
            plan_layout(1024, 256, 512, 220),
            Err(Error::InsufficientSpace(_))
        ));
        assert!(plan_layout(1024, 256, 512, 219).is_ok());
        assert!(plan_layout(100, 64, 256, 128).is_err());
    }

    quickcheck! {
        fn layout_accounts_for_every_megabyte(device: u32, c: u8, d: u8, s: u8) -> bool {
            let (device, c, d, s) = (device as u64, c as u64, d as u64, s as u64);
            match plan_layout(device, c, d, s) {
                Ok(layout) => {
                    layout.user_area > 0
                        && RESERVED_HEAD_MB + c + d + s + RESERVED_TAIL_MB + layout.user_area == device
                }
                Err(_) => device <= RESERVED_HEAD_MB + c + d + s + RESERVED_TAIL_MB,
            }
        }
    }
}
