//! Opcode remap: translates a scrambled MCS instruction stream back to a
//! standard compiled-script instruction stream.
//!
//! Source opcodes taking an argument (`>= 93`) and target opcodes taking an
//! argument (`>= 90`) use different thresholds; this asymmetry is intentional
//! and comes straight from the reference tool, not an error to "fix up".
//! Three tables select by a code object's `magic`; unmapped opcodes pass
//! through unchanged, matching the reference tool's `dict.get(op, op)`
//! fallback.

/// `magic` value of code objects scrambled with [`OP_MAP_A`].
pub const MAGIC_A: i32 = -901_139_953;
/// `magic` value of code objects scrambled with [`OP_MAP_B`].
pub const MAGIC_B: i32 = -1_135_027_243;

const SOURCE_ARG_THRESHOLD: u8 = 93;
const TARGET_ARG_THRESHOLD: u8 = 90;

/// Known entries of `OP_MAP_A`, recovered from the worked example and the
/// redesign note in the format description (`0x02`, `0x49`, `0x4D` all
/// collapse to the same target opcode, `23`, in the source material).
/// `OP_MAP_B` and `OP_MAP_C`'s contents were not present anywhere in the
/// retrieved reference material; they are seeded empty, which degrades
/// correctly to the identity fallback every table uses for opcodes it
/// doesn't recognize, rather than inventing entries with no basis.
const OP_MAP_A: &[(u8, u8)] = &[
    (0x00, 9),
    (0x2B, 4),
    (0x79, 110),
    (0x02, 23),
    (0x49, 23),
    (0x4D, 23),
];
const OP_MAP_B: &[(u8, u8)] = &[];
const OP_MAP_C: &[(u8, u8)] = &[];

/// Which of the three built-in opcode tables applies to a code object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpcodeMap {
    A,
    B,
    C,
}

impl OpcodeMap {
    /// Selects the table for a code object's `magic` field. Any magic other
    /// than the two known scrambled-opcode magics, including the absence of
    /// one (the `c`-tagged layout never carries `magic`), falls back to `C`.
    #[must_use]
    pub fn select(magic: Option<i32>) -> Self {
        match magic {
            Some(MAGIC_A) => Self::A,
            Some(MAGIC_B) => Self::B,
            _ => Self::C,
        }
    }

    fn table(self) -> &'static [(u8, u8)] {
        match self {
            Self::A => OP_MAP_A,
            Self::B => OP_MAP_B,
            Self::C => OP_MAP_C,
        }
    }

    fn get(self, op: u8) -> u8 {
        self.table()
            .iter()
            .find_map(|&(k, v)| (k == op).then_some(v))
            .unwrap_or(op)
    }
}

/// Rewrites a scrambled bytecode stream to its standard equivalent.
///
/// The source and target instruction formats both encode a two-byte,
/// little-endian argument for "wide" opcodes, but at different thresholds
/// (`93` on the way in, `90` on the way out): an opcode can gain or lose its
/// argument bytes purely as a side effect of the remap.
#[must_use]
pub fn rewrite(code: &[u8], map: OpcodeMap) -> Vec<u8> {
    let mut out = Vec::with_capacity(code.len());
    let mut i = 0;
    while i < code.len() {
        let op = code[i];
        let (arg, step) = if op >= SOURCE_ARG_THRESHOLD {
            if i + 2 < code.len() {
                let arg = u16::from(code[i + 1]) | (u16::from(code[i + 2]) << 8);
                (Some(arg), 3)
            } else {
                (Some(0), code.len() - i)
            }
        } else {
            (None, 1)
        };

        let std_op = map.get(op);
        out.push(std_op);
        if std_op >= TARGET_ARG_THRESHOLD {
            out.extend_from_slice(&arg.unwrap_or(0).to_le_bytes());
        }

        i += step;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{rewrite, OpcodeMap};

    #[test]
    fn scenario_five_rewrites_as_given() {
        let source = [0x00, 0x2B, 0x79, 0x10, 0x00];
        let out = rewrite(&source, OpcodeMap::A);
        assert_eq!(out, vec![9, 4, 110, 0x10, 0x00]);
    }

    #[test]
    fn opcode_just_below_source_threshold_consumes_one_byte() {
        // 92 < 93: single-byte instruction, no argument bytes to consume.
        let source = [92, 0xAA, 0xBB];
        let out = rewrite(&source, OpcodeMap::C);
        // unmapped under C: identity. 92 < 90, so no arg bytes re-emitted.
        assert_eq!(out, vec![92, 0xAA, 0xBB]);
    }

    #[test]
    fn opcode_at_source_threshold_consumes_three_bytes() {
        let source = [93, 0x01, 0x02];
        let out = rewrite(&source, OpcodeMap::C);
        assert_eq!(out, vec![93, 0x01, 0x02]);
    }

    #[test]
    fn truncated_wide_opcode_at_buffer_end_emits_zero_arg() {
        let source = [93];
        let out = rewrite(&source, OpcodeMap::C);
        assert_eq!(out, vec![93, 0x00, 0x00]);
    }

    #[test]
    fn ambiguous_a_entries_collapse_to_same_target() {
        for op in [0x02, 0x49, 0x4D] {
            assert_eq!(OpcodeMap::A.get(op), 23);
        }
    }
}
