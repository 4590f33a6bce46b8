//! Conversion between [`Value`]s and native bytes.
//!
//! Every argument, return value, ivar and struct field is moved through a
//! byte slice laid out exactly like the native value. Buffers are `u64`
//! backed so any scalar or pointer can be read from them in place.

#![allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_possible_wrap)]

use super::api::RawId;
use super::context::{RuntimeContext, c_string};
use super::encoding::{AggregateLayout, MarshalDescriptor, MarshalKind, Primitive};
use super::selector::Sel;
use super::value::{StructValue, Value};
use crate::error::{Error, Result};
use std::ffi::{CStr, CString, c_char, c_long, c_ulong};
use std::mem::size_of;
use std::sync::Arc;

/// Storage that must outlive a native call: C strings and struct buffers
/// passed by pointer.
#[derive(Debug, Default)]
pub(crate) struct Scratch {
    strings: Vec<CString>,
    buffers: Vec<Vec<u64>>,
}

impl Scratch {
    pub(crate) fn is_empty(&self) -> bool {
        self.strings.is_empty() && self.buffers.is_empty()
    }

    pub(crate) fn absorb(&mut self, other: Scratch) {
        self.strings.extend(other.strings);
        self.buffers.extend(other.buffers);
    }

    fn keep_string(&mut self, s: CString) -> usize {
        let ptr = s.as_ptr() as usize;
        self.strings.push(s);
        ptr
    }

    fn keep_buffer(&mut self, buffer: Vec<u64>) -> usize {
        let ptr = buffer.as_ptr() as usize;
        self.buffers.push(buffer);
        ptr
    }
}

/// A zeroed buffer of at least `size` bytes, never empty.
pub(crate) fn slot(size: usize) -> Vec<u64> {
    vec![0; size.div_ceil(8).max(1)]
}

pub(crate) fn bytes(slot: &[u64]) -> &[u8] {
    // SAFETY: u8 has no alignment or validity requirements
    unsafe { std::slice::from_raw_parts(slot.as_ptr().cast(), size_of_val(slot)) }
}

pub(crate) fn bytes_mut(slot: &mut [u64]) -> &mut [u8] {
    // SAFETY: u8 has no alignment or validity requirements
    unsafe { std::slice::from_raw_parts_mut(slot.as_mut_ptr().cast(), size_of_val(slot)) }
}

pub(crate) fn write_address(out: &mut [u8], address: usize) {
    out[..size_of::<usize>()].copy_from_slice(&address.to_ne_bytes());
}

pub(crate) fn read_address(bytes: &[u8]) -> usize {
    let mut raw = [0; size_of::<usize>()];
    raw.copy_from_slice(&bytes[..size_of::<usize>()]);
    usize::from_ne_bytes(raw)
}

/// Narrows an integer return that the call interface widened to a full register.
pub(crate) fn narrow(primitive: Primitive, wide: usize, out: &mut [u8]) {
    let wide = wide as u64;
    match primitive.size() {
        1 => out[..1].copy_from_slice(&(wide as u8).to_ne_bytes()),
        2 => out[..2].copy_from_slice(&(wide as u16).to_ne_bytes()),
        4 => out[..4].copy_from_slice(&(wide as u32).to_ne_bytes()),
        _ => out[..8].copy_from_slice(&wide.to_ne_bytes()),
    }
}

/// Widens a narrow integer for a register-sized return slot.
pub(crate) fn widen(primitive: Primitive, bytes: &[u8]) -> usize {
    match decode_primitive(primitive, bytes) {
        Value::Int(i) => i as usize,
        Value::UInt(u) => u as usize,
        Value::Bool(b) => usize::from(b),
        _ => 0,
    }
}

/// True for integer kinds the call interface returns widened to a register.
pub(crate) fn is_widened(primitive: Primitive) -> bool {
    !primitive.is_float() && primitive != Primitive::Void && primitive.size() < size_of::<usize>()
}

macro_rules! put {
    ($out:expr, $ty:ty, $value:expr) => {{
        let raw = ($value as $ty).to_ne_bytes();
        $out[..raw.len()].copy_from_slice(&raw);
        true
    }};
}

macro_rules! get {
    ($bytes:expr, $ty:ty) => {{
        let mut raw = [0u8; size_of::<$ty>()];
        raw.copy_from_slice(&$bytes[..size_of::<$ty>()]);
        <$ty>::from_ne_bytes(raw)
    }};
}

/// Writes a scalar. Returns false if `value` has no sensible conversion.
pub(crate) fn encode_primitive(primitive: Primitive, value: &Value, out: &mut [u8]) -> bool {
    match primitive {
        Primitive::Void => false,
        Primitive::Bool => value.as_bool().is_some_and(|b| put!(out, u8, u8::from(b))),
        Primitive::Float => value.as_f64().is_some_and(|x| put!(out, f32, x)),
        Primitive::Double => value.as_f64().is_some_and(|x| put!(out, f64, x)),
        _ => {
            let bits = match *value {
                Value::Int(i) => i as u64,
                Value::UInt(u) => u,
                Value::Bool(b) => u64::from(b),
                _ => return false,
            };
            match primitive {
                Primitive::Char => put!(out, i8, bits),
                Primitive::UChar => put!(out, u8, bits),
                Primitive::Short => put!(out, i16, bits),
                Primitive::UShort => put!(out, u16, bits),
                Primitive::Int => put!(out, i32, bits),
                Primitive::UInt => put!(out, u32, bits),
                Primitive::Long => put!(out, c_long, bits),
                Primitive::ULong => put!(out, c_ulong, bits),
                Primitive::LongLong => put!(out, i64, bits),
                _ => put!(out, u64, bits),
            }
        }
    }
}

/// Reads a scalar.
pub(crate) fn decode_primitive(primitive: Primitive, bytes: &[u8]) -> Value {
    match primitive {
        Primitive::Void => Value::Nil,
        Primitive::Bool => Value::Bool(get!(bytes, u8) != 0),
        Primitive::Float => Value::Float(f64::from(get!(bytes, f32))),
        Primitive::Double => Value::Float(get!(bytes, f64)),
        Primitive::Char => Value::Int(i64::from(get!(bytes, i8))),
        Primitive::UChar => Value::UInt(u64::from(get!(bytes, u8))),
        Primitive::Short => Value::Int(i64::from(get!(bytes, i16))),
        Primitive::UShort => Value::UInt(u64::from(get!(bytes, u16))),
        Primitive::Int => Value::Int(i64::from(get!(bytes, i32))),
        Primitive::UInt => Value::UInt(u64::from(get!(bytes, u32))),
        Primitive::Long => Value::Int(get!(bytes, c_long) as i64),
        Primitive::ULong => Value::UInt(get!(bytes, c_ulong) as u64),
        Primitive::LongLong => Value::Int(get!(bytes, i64)),
        Primitive::ULongLong => Value::UInt(get!(bytes, u64)),
    }
}

/// Writes `value` as `descriptor` into `out`.
///
/// `index` is the argument position reported on type mismatches.
pub(crate) fn encode(
    ctx: &RuntimeContext,
    descriptor: &MarshalDescriptor,
    value: &Value,
    index: usize,
    out: &mut [u8],
    scratch: &mut Scratch,
) -> Result<()> {
    let mismatch = || Error::ArgumentTypeMismatch {
        index,
        expected: descriptor.encoding().to_string(),
        found: value.kind_name(),
    };

    let address = match (descriptor.kind(), value) {
        (MarshalKind::Primitive(p), _) => {
            return if encode_primitive(p, value, out) { Ok(()) } else { Err(mismatch()) };
        }
        (MarshalKind::Aggregate, Value::Struct(s)) => {
            let layout = descriptor.layout().ok_or_else(mismatch)?;
            if layout.size() != s.layout().size() || layout.fields().len() != s.fields().len() {
                return Err(mismatch());
            }
            return encode_fields(ctx, layout, s.fields(), index, out, scratch);
        }
        (MarshalKind::Aggregate, _) => return Err(mismatch()),

        (_, Value::Nil) => 0,
        (_, Value::Pointer(p)) => *p,
        (MarshalKind::Object | MarshalKind::Class | MarshalKind::Pointer, Value::Object(id)) => id.address(),
        (MarshalKind::Selector, Value::Selector(name) | Value::Str(name)) => ctx.selector(name)?.as_ptr() as usize,
        (MarshalKind::CString | MarshalKind::Pointer, Value::Str(s)) => scratch.keep_string(c_string(s)?),
        (MarshalKind::Pointer, Value::Struct(s)) => {
            let mut buffer = slot(s.layout().size());
            encode_fields(ctx, s.layout(), s.fields(), index, bytes_mut(&mut buffer), scratch)?;
            scratch.keep_buffer(buffer)
        }
        _ => return Err(mismatch()),
    };
    write_address(out, address);
    Ok(())
}

fn encode_fields(
    ctx: &RuntimeContext,
    layout: &AggregateLayout,
    values: &[Value],
    index: usize,
    out: &mut [u8],
    scratch: &mut Scratch,
) -> Result<()> {
    for (field, value) in layout.fields().iter().zip(values) {
        // unset scalar fields stay zero
        if value.is_nil() && matches!(field.descriptor.kind(), MarshalKind::Primitive(_) | MarshalKind::Aggregate) {
            continue;
        }
        let end = field.offset + field.descriptor.size();
        encode(ctx, &field.descriptor, value, index, &mut out[field.offset..end], scratch)?;
    }
    Ok(())
}

/// Reads a `descriptor` value from `bytes`.
///
/// # Safety
///
/// Pointer-typed values in `bytes` must be null or valid for their type:
/// live objects, selectors, NUL-terminated strings, or structs of the
/// registered layout.
pub(crate) unsafe fn decode(ctx: &RuntimeContext, descriptor: &MarshalDescriptor, bytes: &[u8]) -> Result<Value> {
    if let MarshalKind::Primitive(p) = descriptor.kind() {
        return Ok(decode_primitive(p, bytes));
    }
    if descriptor.kind() == MarshalKind::Aggregate {
        let layout = descriptor.layout().ok_or_else(|| Error::UnsupportedType {
            encoding: descriptor.encoding().to_string(),
        })?;
        // SAFETY: caller contract
        return unsafe { decode_struct(ctx, layout, bytes) };
    }

    let address = read_address(bytes);
    if address == 0 {
        return Ok(Value::Nil);
    }
    Ok(match descriptor.kind() {
        MarshalKind::Object | MarshalKind::Class => ctx.wrap(address as RawId).into(),
        MarshalKind::Selector => Sel::from_raw(address as *const _)
            .map_or(Value::Nil, |sel| Value::Selector(sel.name(ctx))),
        MarshalKind::CString => {
            // SAFETY: caller contract
            let s = unsafe { CStr::from_ptr(address as *const c_char) };
            Value::Str(s.to_string_lossy().into_owned())
        }
        _ => match descriptor.layout() {
            Some(layout) => {
                // SAFETY: caller contract
                let pointee = unsafe { std::slice::from_raw_parts(address as *const u8, layout.size()) };
                // SAFETY: caller contract
                unsafe { decode_struct(ctx, layout, pointee) }?
            }
            None => Value::Pointer(address),
        },
    })
}

unsafe fn decode_struct(ctx: &RuntimeContext, layout: &Arc<AggregateLayout>, bytes: &[u8]) -> Result<Value> {
    let fields = layout
        .fields()
        .iter()
        .map(|field| {
            let end = field.offset + field.descriptor.size();
            // SAFETY: caller contract
            unsafe { decode(ctx, &field.descriptor, &bytes[field.offset..end]) }
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Value::Struct(StructValue::new(Arc::clone(layout), fields)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::encoding::translate;

    fn round_trip(encoding: &str, native: &[u8]) {
        let primitive = translate(encoding).unwrap().primitive_kind().unwrap();
        let value = decode_primitive(primitive, native);
        let mut out = [0u8; 8];
        assert!(encode_primitive(primitive, &value, &mut out), "{encoding}: {value:?}");
        assert_eq!(&out[..native.len()], native, "{encoding} via {value:?}");
    }

    #[test]
    fn test_primitive_round_trip() {
        round_trip("c", &(-5i8).to_ne_bytes());
        round_trip("C", &250u8.to_ne_bytes());
        round_trip("s", &(-30_000i16).to_ne_bytes());
        round_trip("S", &65_000u16.to_ne_bytes());
        round_trip("i", &i32::MIN.to_ne_bytes());
        round_trip("I", &u32::MAX.to_ne_bytes());
        round_trip("l", &(-7 as c_long).to_ne_bytes());
        round_trip("L", &(c_ulong::MAX).to_ne_bytes());
        round_trip("q", &i64::MIN.to_ne_bytes());
        round_trip("Q", &u64::MAX.to_ne_bytes());
        round_trip("f", &1.25f32.to_ne_bytes());
        round_trip("d", &(-0.1f64).to_ne_bytes());
        round_trip("B", &[1]);
        round_trip("B", &[0]);
    }

    #[test]
    fn test_encode_rejects_mismatched_values() {
        let mut out = [0u8; 8];
        assert!(!encode_primitive(Primitive::Int, &Value::Str("1".into()), &mut out));
        assert!(!encode_primitive(Primitive::Void, &Value::Int(0), &mut out));
        assert!(!encode_primitive(Primitive::Double, &Value::Nil, &mut out));
    }

    #[test]
    fn test_integers_truncate_to_width() {
        let mut out = [0u8; 8];
        assert!(encode_primitive(Primitive::UChar, &Value::Int(0x1ff), &mut out));
        assert_eq!(out[0], 0xff);
        assert!(encode_primitive(Primitive::Short, &Value::Int(-1), &mut out));
        assert_eq!(decode_primitive(Primitive::Short, &out), Value::Int(-1));
        assert_eq!(decode_primitive(Primitive::UShort, &out), Value::UInt(0xffff));
    }

    #[test]
    fn test_narrow_and_widen() {
        let mut out = [0u8; 8];
        narrow(Primitive::Int, usize::MAX, &mut out);
        assert_eq!(decode_primitive(Primitive::Int, &out), Value::Int(-1));
        assert_eq!(widen(Primitive::Char, &(-2i8).to_ne_bytes()), (-2isize) as usize);
        assert!(is_widened(Primitive::Bool));
        assert!(!is_widened(Primitive::Float));
        assert!(!is_widened(Primitive::ULongLong));
    }

    #[test]
    fn test_slot_sizes() {
        assert_eq!(slot(0).len(), 1);
        assert_eq!(slot(8).len(), 1);
        assert_eq!(slot(9).len(), 2);
        let mut buffer = slot(16);
        write_address(bytes_mut(&mut buffer), 0xdead_beef);
        assert_eq!(read_address(bytes(&buffer)), 0xdead_beef);
    }
}
