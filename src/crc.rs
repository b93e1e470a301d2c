/// Modbus CRC-16 (polynomial 0xA001, seed 0xFFFF) over `data`.
///
/// The result is byte-swapped: `value >> 8` is the byte sent first on the wire
/// and `value & 0xFF` the byte sent last.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= byte as u16;
        for _ in 0..8 {
            if (crc & 0x0001) != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc.swap_bytes()
}
