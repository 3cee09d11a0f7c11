//! Writes a decoded [`crate::marshal`] object graph back out as a byte-exact
//! standard compiled-script image: the 8-byte prefix, then the object graph
//! encoded with the canonical (`c`-tagged) code object layout, with embedded
//! code objects passed through the [`crate::opcode`] rewriter first.
//!
//! There is exactly one producer-side tag per conceptual type; the `M`/`o`
//! code-object layouts and the interned/encrypted byte-string tags
//! (`t`/`m`/`b`/`1`/XOR) the decoder accepts on the way in collapse back to
//! their plain form (`s`, `c`) on the way out; by construction nothing in
//! this crate ever encounters [`crate::marshal::MarshalObject::Ref`] or
//! `Null` outside of decode. Numbers and the `StopIteration` sentinel are
//! likewise normalized on the way out: any integer that fits in 32 bits
//! writes as `i`, anything wider as a `l` bigint; any float writes as `f`
//! decimal text; `StopIteration` writes as `N`, the same as `None`.

use crate::{
    marshal::{BigIntValue, CodeObject, MarshalObject},
    opcode::{self, OpcodeMap},
};

const PREFIX: [u8; 8] = [0x03, 0xF3, 0x0D, 0x0A, 0x00, 0x00, 0x00, 0x00];

/// Encodes `root` as a complete compiled-script image, prefix included.
#[must_use]
pub fn emit(root: &MarshalObject) -> Vec<u8> {
    let mut out = Vec::from(PREFIX);
    write_object(root, &mut out);
    out
}

fn write_bytes_tag(bytes: &[u8], out: &mut Vec<u8>) {
    out.push(b's');
    out.extend_from_slice(&(bytes.len() as i32).to_le_bytes());
    out.extend_from_slice(bytes);
}

fn write_seq(tag: u8, items: &[MarshalObject], out: &mut Vec<u8>) {
    out.push(tag);
    out.extend_from_slice(&(items.len() as i32).to_le_bytes());
    for item in items {
        write_object(item, out);
    }
}

fn write_bigint(value: &BigIntValue, out: &mut Vec<u8>) {
    out.push(b'l');
    let n = i32::try_from(value.digits.len()).unwrap_or(i32::MAX);
    out.extend_from_slice(&(if value.negative { -n } else { n }).to_le_bytes());
    for digit in &value.digits {
        out.extend_from_slice(&(digit & 0x7FFF).to_le_bytes());
    }
}

/// Splits an `i64` magnitude into 15-bit little-endian digits, the same
/// layout [`write_bigint`] expects, for integers too wide for a plain `i`.
fn bigint_from_i64(value: i64) -> BigIntValue {
    let negative = value < 0;
    let mut magnitude = value.unsigned_abs();
    let mut digits = Vec::new();
    while magnitude > 0 {
        digits.push((magnitude & 0x7FFF) as u16);
        magnitude >>= 15;
    }
    BigIntValue { negative, digits }
}

/// Writes a float under the text `f` tag, the only float tag the reference
/// emitter ever produces (binary `g` doubles are normalized away).
fn write_float_text(bytes: &[u8], out: &mut Vec<u8>) {
    out.push(b'f');
    out.push(bytes.len() as u8);
    out.extend_from_slice(bytes);
}

fn write_object(obj: &MarshalObject, out: &mut Vec<u8>) {
    match obj {
        MarshalObject::Null => unreachable!("dict-end sentinel never reaches the emitter"),
        MarshalObject::Ref(_) => unreachable!("references are resolved inline by the decoder"),
        MarshalObject::None => out.push(b'N'),
        MarshalObject::True => out.push(b'T'),
        MarshalObject::False => out.push(b'F'),
        MarshalObject::Ellipsis => out.push(b'.'),
        // The reference emitter has no sentinel tag of its own for
        // `StopIteration`; its catch-all `else` arm falls through to `None`.
        MarshalObject::StopIterationSentinel => out.push(b'N'),
        MarshalObject::I32(v) => {
            out.push(b'i');
            out.extend_from_slice(&v.to_le_bytes());
        }
        MarshalObject::I64(v) => match i32::try_from(*v) {
            Ok(v32) => {
                out.push(b'i');
                out.extend_from_slice(&v32.to_le_bytes());
            }
            Err(_) => write_bigint(&bigint_from_i64(*v), out),
        },
        MarshalObject::BigInt(b) => write_bigint(b, out),
        MarshalObject::F64Text(s) => write_float_text(s.as_bytes(), out),
        MarshalObject::F64Binary(v) => write_float_text(format!("{v:?}").as_bytes(), out),
        MarshalObject::Bytes(b) | MarshalObject::InternedBytes(b) => write_bytes_tag(b, out),
        MarshalObject::Unicode(s) => write_bytes_tag(s.as_bytes(), out),
        MarshalObject::Tuple(items) => write_seq(b'(', items, out),
        MarshalObject::List(items) => write_seq(b'[', items, out),
        MarshalObject::Set(items) => write_seq(b'<', items, out),
        MarshalObject::FrozenSet(items) => write_seq(b'>', items, out),
        MarshalObject::Dict(pairs) => {
            out.push(b'{');
            for (k, v) in pairs {
                write_object(k, out);
                write_object(v, out);
            }
            out.push(b'0');
        }
        MarshalObject::Code(code) => write_code(code, out),
    }
}

fn write_code(code: &CodeObject, out: &mut Vec<u8>) {
    out.push(b'c');
    out.extend_from_slice(&code.argcount.to_le_bytes());
    out.extend_from_slice(&code.nlocals.to_le_bytes());
    out.extend_from_slice(&code.stacksize.to_le_bytes());
    out.extend_from_slice(&code.flags.to_le_bytes());

    let map = OpcodeMap::select(code.magic);
    let transformed = opcode::rewrite(code.code.as_bytes(), map);
    write_bytes_tag(&transformed, out);

    write_seq(b'(', &code.consts, out);
    write_seq(b'(', &code.names, out);
    write_seq(b'(', &code.varnames, out);
    write_seq(b'(', &code.freevars, out);
    write_seq(b'(', &code.cellvars, out);
    write_object(&code.filename, out);
    write_object(&code.name, out);
    out.extend_from_slice(&code.firstlineno.to_le_bytes());
    write_object(&code.lnotab, out);
}

#[cfg(test)]
mod tests {
    use super::emit;
    use crate::marshal::{CodeObject, MarshalDecoder, MarshalObject};

    #[test]
    fn prefix_is_byte_exact() {
        let out = emit(&MarshalObject::None);
        assert_eq!(&out[..8], &[0x03, 0xF3, 0x0D, 0x0A, 0x00, 0x00, 0x00, 0x00]);
        assert_eq!(&out[8..], &[b'N']);
    }

    #[test]
    fn dict_round_trips_through_decode_emit_decode() {
        let original = MarshalObject::Dict(vec![
            (
                MarshalObject::Bytes(b"x".to_vec()),
                MarshalObject::I32(1),
            ),
            (
                MarshalObject::Bytes(b"y".to_vec()),
                MarshalObject::Tuple(vec![
                    MarshalObject::None,
                    MarshalObject::True,
                    MarshalObject::False,
                ]),
            ),
        ]);

        let encoded = emit(&original);
        let report = MarshalDecoder::decode(&encoded[8..]).unwrap();
        assert!(report.is_clean());
        assert_eq!(report.value, original);
    }

    #[test]
    fn code_object_emits_canonical_c_tag_and_rewrites_opcodes() {
        let code = CodeObject {
            argcount: 1,
            nlocals: 2,
            stacksize: 3,
            flags: 0,
            code: MarshalObject::Bytes(vec![0x00, 0x2B, 0x79, 0x10, 0x00]),
            consts: vec![],
            names: vec![],
            varnames: vec![],
            freevars: vec![],
            cellvars: vec![],
            filename: MarshalObject::Bytes(b"m.py".to_vec()),
            name: MarshalObject::Bytes(b"m".to_vec()),
            firstlineno: 1,
            lnotab: MarshalObject::Bytes(vec![]),
            magic: Some(crate::opcode::MAGIC_A),
        };
        let encoded = emit(&MarshalObject::Code(Box::new(code)));
        assert_eq!(encoded[8], b'c');

        let report = MarshalDecoder::decode(&encoded[8..]).unwrap();
        let MarshalObject::Code(decoded) = report.value else {
            panic!("expected code object");
        };
        // the `c` layout never carries magic, even though we wrote one in.
        assert_eq!(decoded.magic, None);
        assert_eq!(
            decoded.code,
            MarshalObject::Bytes(vec![9, 4, 110, 0x10, 0x00])
        );
    }

    #[test]
    fn wide_i64_normalizes_to_bigint() {
        // Past i32::MAX, so this must collapse to the 'l' bigint tag rather
        // than the 8-byte 'I' layout the reference emitter never produces.
        let out = emit(&MarshalObject::I64(1i64 << 40));
        assert_eq!(out[8], b'l');

        let report = MarshalDecoder::decode(&out[8..]).unwrap();
        assert_eq!(
            report.value,
            MarshalObject::BigInt(crate::marshal::BigIntValue {
                negative: false,
                digits: vec![0, 0, 0x400],
            })
        );
    }

    #[test]
    fn narrow_i64_normalizes_to_plain_int() {
        let out = emit(&MarshalObject::I64(-7));
        assert_eq!(out[8], b'i');
        let report = MarshalDecoder::decode(&out[8..]).unwrap();
        assert_eq!(report.value, MarshalObject::I32(-7));
    }

    #[test]
    fn binary_float_normalizes_to_text_tag() {
        let out = emit(&MarshalObject::F64Binary(1.5));
        assert_eq!(out[8], b'f');
        assert_eq!(out[9], 3); // length-prefix byte for "1.5"
        assert_eq!(&out[10..13], b"1.5");
    }

    #[test]
    fn stop_iteration_sentinel_normalizes_to_none() {
        let out = emit(&MarshalObject::StopIterationSentinel);
        assert_eq!(&out[8..], &[b'N']);
    }
}
