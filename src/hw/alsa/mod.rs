mod pcm;

pub use pcm::{AlsaHwParams, AlsaPcm};

use crate::error::HwResult;
use crate::format::Direction;
use crate::hw::traits::{AudioBackend, DeviceId};
use alsa::card::{self, Card};
use alsa::ctl::{Ctl, DeviceIter};
use alsa::device_name::HintIter;
use tracing::debug;

const SYSDEFAULT_PREFIX: &str = "sysdefault:CARD=";

fn alsa_direction(direction: Direction) -> alsa::Direction {
    match direction {
        Direction::Playback => alsa::Direction::Playback,
        Direction::Capture => alsa::Direction::Capture,
    }
}

/// Raw `hw:C,D` devices of the local ALSA installation.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlsaBackend;

impl AlsaBackend {
    pub fn new() -> Self {
        Self
    }

    fn card_ctl(card: i32) -> Option<Ctl> {
        match Ctl::from_card(&Card::new(card), false) {
            Ok(ctl) => Some(ctl),
            Err(e) => {
                debug!("ALSA ctl for card {} unavailable: {}", card, e);
                None
            }
        }
    }
}

impl AudioBackend for AlsaBackend {
    type Handle = AlsaPcm;

    const LABEL: &'static str = "ALSA";
    const WORKER_THREAD_NAME: &'static str = "alsa-pcm";

    fn open(&self, id: DeviceId, direction: Direction) -> HwResult<AlsaPcm> {
        AlsaPcm::open(&id.hw_name(), direction)
    }

    fn device_ids(&self) -> Vec<DeviceId> {
        let mut ids = Vec::new();
        for card in card::Iter::new() {
            let card = match card {
                Ok(card) => card,
                Err(e) => {
                    debug!("ALSA card iteration stopped: {}", e);
                    break;
                }
            };
            let Some(ctl) = Self::card_ctl(card.get_index()) else {
                continue;
            };
            ids.extend(DeviceIter::new(&ctl).map(|device| DeviceId::new(card.get_index(), device)));
        }
        ids
    }

    /// `"<card name>, <pcm name>"`, the same text ALSA puts in name hints.
    fn device_name(&self, id: DeviceId) -> Option<String> {
        let ctl = Self::card_ctl(id.card)?;
        let card_name = ctl.card_info().ok()?.get_name().ok()?.to_string();
        let pcm_name = [Direction::Playback, Direction::Capture]
            .into_iter()
            .find_map(|direction| {
                let info = ctl
                    .pcm_info(id.device as u32, 0, alsa_direction(direction))
                    .ok()?;
                info.get_name().ok().map(str::to_string)
            })?;
        Some(format!("{card_name}, {pcm_name}"))
    }

    fn supports_direction(&self, id: DeviceId, direction: Direction) -> bool {
        Self::card_ctl(id.card).is_some_and(|ctl| {
            ctl.pcm_info(id.device as u32, 0, alsa_direction(direction))
                .is_ok()
        })
    }

    /// The device whose name matches the description of a `sysdefault` hint.
    fn default_device_id(&self, direction: Direction) -> Option<DeviceId> {
        let hints = match HintIter::new_str(None, "pcm") {
            Ok(hints) => hints,
            Err(e) => {
                debug!("ALSA name hints unavailable: {}", e);
                return None;
            }
        };
        let candidates: Vec<(DeviceId, String)> = self
            .device_ids()
            .into_iter()
            .filter(|id| self.supports_direction(*id, direction))
            .filter_map(|id| self.device_name(id).map(|name| (id, name)))
            .collect();

        for hint in hints {
            let (Some(name), Some(desc)) = (hint.name, hint.desc) else {
                continue;
            };
            if !name.starts_with(SYSDEFAULT_PREFIX) {
                continue;
            }
            if hint
                .direction
                .is_some_and(|d| d != alsa_direction(direction))
            {
                continue;
            }
            let desc = desc.lines().next().unwrap_or_default();
            if let Some((id, _)) = candidates.iter().find(|(_, name)| name == desc) {
                return Some(*id);
            }
        }
        None
    }
}
