// Random scan generators for exercising the pipeline without a reader.

use chrono::Utc;
use rand::Rng;

use crate::model::{ScanEvent, ScanMode};

const EPC_HEX_DIGITS: usize = 22;

/// `E2` followed by 22 uppercase hex digits.
pub fn random_epc<R: Rng + ?Sized>(rng: &mut R) -> String {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    let mut epc = String::with_capacity(2 + EPC_HEX_DIGITS);
    epc.push_str("E2");
    for _ in 0..EPC_HEX_DIGITS {
        epc.push(char::from(HEX[rng.gen_range(0..16)]));
    }
    epc
}

/// Between `-30.00` and `-99.99`, two decimals.
pub fn random_rssi<R: Rng + ?Sized>(rng: &mut R) -> String {
    let hundredths: u32 = rng.gen_range(3000..=9999);
    format!("-{}.{:02}", hundredths / 100, hundredths % 100)
}

pub fn random_mode<R: Rng + ?Sized>(rng: &mut R) -> ScanMode {
    match rng.gen_range(0..3) {
        0 => ScanMode::Single,
        1 => ScanMode::Continuous,
        _ => ScanMode::Inventory,
    }
}

/// A plausible scan stamped now. With `epc` set, only RSSI and mode vary.
pub fn random_scan<R: Rng + ?Sized>(rng: &mut R, epc: Option<&str>) -> ScanEvent {
    let epc = epc.map_or_else(|| random_epc(rng), str::to_owned);
    ScanEvent::new(epc, random_rssi(rng), Utc::now()).with_mode(random_mode(rng))
}
