use crate::region::BANK_COUNT;

/// The assignment of one bank, as encoded in its 2-bit configuration field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BankKind {
    /// `0b00`: the bank is not mapped.
    Unused,
    /// `0b01`: tightly-coupled instruction memory.
    InstructionTcm,
    /// `0b10`: general-purpose RAM. Only these banks back the heap.
    Ram,
    /// `0b11`: tightly-coupled data memory.
    DataTcm,
}

impl BankKind {
    #[inline]
    const fn from_bits(bits: u32) -> Self {
        match bits & 0b11 {
            0b00 => Self::Unused,
            0b01 => Self::InstructionTcm,
            0b10 => Self::Ram,
            _ => Self::DataTcm,
        }
    }

    #[inline]
    const fn bits(self) -> u32 {
        match self {
            Self::Unused => 0b00,
            Self::InstructionTcm => 0b01,
            Self::Ram => 0b10,
            Self::DataTcm => 0b11,
        }
    }
}

/// A snapshot of the bank configuration register.
///
/// Field `i` occupies `bits[2 * i..2 * i + 2]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BankConfig(u32);

impl BankConfig {
    /// Wrap a raw register value.
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Get the assignment of bank `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= BANK_COUNT`.
    #[inline]
    pub fn kind(self, index: usize) -> BankKind {
        assert!(index < BANK_COUNT, "bank index out of range");
        BankKind::from_bits(self.0 >> (index * 2))
    }

    /// Return a copy with bank `index` assigned to `kind`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= BANK_COUNT`.
    #[inline]
    pub fn with(self, index: usize, kind: BankKind) -> Self {
        assert!(index < BANK_COUNT, "bank index out of range");
        let shift = index * 2;
        Self((self.0 & !(0b11 << shift)) | (kind.bits() << shift))
    }

    /// Iterate over the indices of banks assigned to general-purpose RAM, in
    /// ascending order.
    pub fn ram_banks(self) -> impl Iterator<Item = usize> {
        (0..BANK_COUNT).filter(move |&i| self.kind(i) == BankKind::Ram)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_fields() {
        let config = BankConfig::from_raw(0b11_10_01_00);
        assert_eq!(config.kind(0), BankKind::Unused);
        assert_eq!(config.kind(1), BankKind::InstructionTcm);
        assert_eq!(config.kind(2), BankKind::Ram);
        assert_eq!(config.kind(3), BankKind::DataTcm);
        assert_eq!(config.kind(15), BankKind::Unused);
    }

    #[test]
    fn with_replaces_one_field() {
        let config = BankConfig::from_raw(u32::MAX).with(4, BankKind::Unused);
        assert_eq!(config.raw(), !(0b11 << 8));
        let config = config.with(4, BankKind::Ram);
        assert_eq!(config.kind(4), BankKind::Ram);
        assert_eq!(config.kind(5), BankKind::DataTcm);
    }

    #[test]
    fn ram_banks() {
        let config = BankConfig::default()
            .with(1, BankKind::Ram)
            .with(2, BankKind::DataTcm)
            .with(15, BankKind::Ram);
        let banks: std::vec::Vec<_> = config.ram_banks().collect();
        assert_eq!(banks, [1, 15]);

        // Every field set to `0b10`
        assert_eq!(BankConfig::from_raw(0xaaaa_aaaa).ram_banks().count(), 16);
        assert_eq!(BankConfig::from_raw(0x5555_5555).ram_banks().count(), 0);
    }
}
