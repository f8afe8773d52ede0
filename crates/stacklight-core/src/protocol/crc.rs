//! Modbus CRC16
//!
//! Polynomial 0xA001 (reflected 0x8005), seed 0xFFFF, no final XOR.
//! Appended to frames low byte first.

/// Initial accumulator value
pub const CRC16_INIT: u16 = 0xFFFF;

/// Reflected Modbus polynomial
pub const CRC16_POLY: u16 = 0xA001;

/// Calculate the Modbus CRC16 of `data`
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc = CRC16_INIT;

    for &byte in data {
        crc ^= byte as u16;
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ CRC16_POLY;
            } else {
                crc >>= 1;
            }
        }
    }

    crc
}
