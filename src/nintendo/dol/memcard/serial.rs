use crate::nintendo::dol::memcard::constants::{SERIAL_LENGTH, TIMER_CLOCK, gamecube_epoch};
use chrono::{DateTime, Utc};

const LCG_MULTIPLY: u64 = 1103515245;
const LCG_ADD: u64 = 12345;
const LCG_SHIFT: u32 = 16;
const LCG_MASK: u64 = 0x7FFF;

/// Per-byte keystream derived from the format time.
struct SerialKeystream {
    state: u64,
}

impl SerialKeystream {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn step(value: u64) -> u64 {
        value.wrapping_mul(LCG_MULTIPLY).wrapping_add(LCG_ADD) >> LCG_SHIFT
    }
}

impl Iterator for SerialKeystream {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        let delta = Self::step(self.state);
        self.state = Self::step(delta) & LCG_MASK;
        Some(delta as u8)
    }
}

/// Binds a 12-byte flash ID to a format time, producing the header serial.
pub fn compute_serial(flash_id: &[u8; SERIAL_LENGTH], format_time: u64) -> [u8; SERIAL_LENGTH] {
    let mut serial = [0u8; SERIAL_LENGTH];
    for ((out, id), delta) in serial
        .iter_mut()
        .zip(flash_id)
        .zip(SerialKeystream::new(format_time))
    {
        *out = id.wrapping_add(delta);
    }
    serial
}

/// Recovers the flash ID from a header serial and the format time it was bound to.
pub fn extract_flash_id(serial: &[u8; SERIAL_LENGTH], format_time: u64) -> [u8; SERIAL_LENGTH] {
    let mut flash_id = [0u8; SERIAL_LENGTH];
    for ((out, s), delta) in flash_id
        .iter_mut()
        .zip(serial)
        .zip(SerialKeystream::new(format_time))
    {
        *out = s.wrapping_sub(delta);
    }
    flash_id
}

/// Converts a wall-clock time into console timer ticks since the GameCube epoch.
pub fn format_time_from(time: DateTime<Utc>) -> u64 {
    let seconds = (time - gamecube_epoch()).num_seconds().max(0) as u64;
    TIMER_CLOCK * 1000 * seconds
}

pub fn format_time_now() -> u64 {
    format_time_from(Utc::now())
}
