//! Integer ALU shared by OP and OP-IMM.

/// Compute `a op b` for the funct3-selected operation.
///
/// `allow_sub` distinguishes OP (where funct7 bit 30 selects SUB/SRA) from
/// OP-IMM (where it only selects SRAI; there is no SUB-immediate). Shift
/// amounts use the low five bits of `b` in both forms.
#[must_use]
pub fn compute(funct3: u32, funct7: u32, a: u32, b: u32, allow_sub: bool) -> u32 {
    let bit30 = funct7 & 0x20 != 0;
    let shamt = b & 0x1F;
    match funct3 {
        0b000 => {
            if allow_sub && bit30 {
                a.wrapping_sub(b)
            } else {
                a.wrapping_add(b)
            }
        }
        0b001 => a << shamt,
        0b010 => u32::from((a as i32) < (b as i32)),
        0b011 => u32::from(a < b),
        0b100 => a ^ b,
        0b101 => {
            if bit30 {
                ((a as i32) >> shamt) as u32
            } else {
                a >> shamt
            }
        }
        0b110 => a | b,
        _ => a & b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUB_SRA: u32 = 0x20;

    #[test]
    fn add_and_sub() {
        assert_eq!(compute(0b000, 0, 2, 3, true), 5);
        assert_eq!(compute(0b000, SUB_SRA, 2, 3, true), 0xFFFF_FFFF);
        // OP-IMM: bit 30 does not mean subtract.
        assert_eq!(compute(0b000, SUB_SRA, 2, 3, false), 5);
        assert_eq!(compute(0b000, 0, 0xFFFF_FFFF, 1, true), 0);
    }

    #[test]
    fn set_less_than_signed_and_unsigned() {
        // -1 < 1 signed, but 0xFFFFFFFF > 1 unsigned.
        assert_eq!(compute(0b010, 0, 0xFFFF_FFFF, 1, true), 1);
        assert_eq!(compute(0b011, 0, 0xFFFF_FFFF, 1, true), 0);
        assert_eq!(compute(0b011, 0, 1, 2, true), 1);
    }

    #[test]
    fn shifts_use_low_five_bits() {
        assert_eq!(compute(0b001, 0, 1, 33, true), 2);
        assert_eq!(compute(0b101, 0, 0x8000_0000, 31, true), 1);
        // Arithmetic right shift drags the sign bit.
        assert_eq!(compute(0b101, SUB_SRA, 0x8000_0000, 31, true), 0xFFFF_FFFF);
    }

    #[test]
    fn bitwise_ops() {
        assert_eq!(compute(0b100, 0, 0b1100, 0b1010, true), 0b0110);
        assert_eq!(compute(0b110, 0, 0b1100, 0b1010, true), 0b1110);
        assert_eq!(compute(0b111, 0, 0b1100, 0b1010, true), 0b1000);
    }
}
