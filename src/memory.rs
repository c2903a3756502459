// Memory-mapped I/O registers
pub const DDRB: u16 = 0x00;
pub const PORTB: u16 = 0x01;
pub const PINB: u16 = 0x02;
pub const PCICR: u16 = 0x03;
pub const PCMSK0: u16 = 0x04;

/// Pin-change interrupt enable bit in PCICR.
pub const PCIE0: u8 = 0;

pub const DEFAULT_DATA_MEMORY_SIZE: usize = 2000;

/// Flat byte-addressable data space. The lowest addresses double as the
/// port and pin-change interrupt registers.
#[derive(Debug, Clone)]
pub struct DataMemory {
    data: Vec<u8>,
}

impl DataMemory {
    pub fn new(size: usize) -> Self {
        DataMemory {
            data: vec![0; size],
        }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn contains(&self, address: u16) -> bool {
        (address as usize) < self.data.len()
    }

    // Out-of-range reads yield zero
    pub fn read(&self, address: u16) -> u8 {
        match self.data.get(address as usize) {
            Some(&value) => value,
            None => {
                log::debug!("read from unmapped data address 0x{:04X}", address);
                0
            }
        }
    }

    // Out-of-range writes are dropped
    pub fn write(&mut self, address: u16, value: u8) {
        match self.data.get_mut(address as usize) {
            Some(slot) => *slot = value,
            None => log::debug!(
                "ignored write of 0x{:02X} to unmapped data address 0x{:04X}",
                value,
                address
            ),
        }
    }

    // Read a 16-bit value in little-endian format
    pub fn read_u16(&self, address: u16) -> u16 {
        let low = self.read(address) as u16;
        let high = self.read(address.wrapping_add(1)) as u16;
        (high << 8) | low
    }

    // Write a 16-bit value in little-endian format
    pub fn write_u16(&mut self, address: u16, value: u16) {
        self.write(address, (value & 0xFF) as u8);
        self.write(address.wrapping_add(1), (value >> 8) as u8);
    }

    pub fn reset(&mut self) {
        self.data.iter_mut().for_each(|b| *b = 0);
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

impl Default for DataMemory {
    fn default() -> Self {
        DataMemory::new(DEFAULT_DATA_MEMORY_SIZE)
    }
}
