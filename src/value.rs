//! An owned, dynamically-typed representation of any dbus value.
//!
//! The `Marshal`/`Unmarshal` traits are for code that knows its types ahead
//! of time. Introspective tools (`dbus-monitor`-style code, generic property
//! bags, anything that forwards values without caring what's inside) need a
//! type they can hold without committing to a static shape. [`Value`] is
//! that type: one tag per dbus type, built eagerly, never a dynamic trait
//! object, so matching on it is exhaustive.

use std::collections::HashMap;

use crate::signature::{self, Base, Container, Type};
use crate::wire::marshal::traits::Marshal;
use crate::wire::marshal::MarshalContext;
use crate::wire::unmarshal::traits::Unmarshal;
use crate::wire::unmarshal::{self, UnmarshalContext, UnmarshalResult};
use crate::wire::util;
use crate::wire::MAX_ARRAY_LENGTH_BYTES as MAX_ARRAY_BYTES;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Byte(u8),
    Bool(bool),
    Int16(i16),
    Uint16(u16),
    Int32(i32),
    Uint32(u32),
    Int64(i64),
    Uint64(u64),
    /// Bit pattern of an f64, so `Value` can derive `PartialEq` without
    /// fighting NaN.
    Double(u64),
    String(String),
    ObjectPath(String),
    Signature(String),
    UnixFd(u32),
    Array(Vec<Value>, Type),
    Struct(Vec<Value>),
    Dict(Vec<(Value, Value)>, Base, Type),
    Variant(Box<Value>),
}

impl Value {
    pub fn value_signature(&self) -> Type {
        match self {
            Value::Byte(_) => Type::Base(Base::Byte),
            Value::Bool(_) => Type::Base(Base::Boolean),
            Value::Int16(_) => Type::Base(Base::Int16),
            Value::Uint16(_) => Type::Base(Base::Uint16),
            Value::Int32(_) => Type::Base(Base::Int32),
            Value::Uint32(_) => Type::Base(Base::Uint32),
            Value::Int64(_) => Type::Base(Base::Int64),
            Value::Uint64(_) => Type::Base(Base::Uint64),
            Value::Double(_) => Type::Base(Base::Double),
            Value::String(_) => Type::Base(Base::String),
            Value::ObjectPath(_) => Type::Base(Base::ObjectPath),
            Value::Signature(_) => Type::Base(Base::Signature),
            Value::UnixFd(_) => Type::Base(Base::UnixFd),
            Value::Array(_, elem) => Type::Container(Container::Array(Box::new(elem.clone()))),
            Value::Struct(elems) => Type::Container(Container::Struct(
                elems.iter().map(Value::value_signature).collect(),
            )),
            Value::Dict(_, k, v) => Type::Container(Container::Dict(*k, Box::new(v.clone()))),
            Value::Variant(_) => Type::Container(Container::Variant),
        }
    }
}

/// Marshals `v`. There is no `Marshal` impl for `Value` itself: that trait's
/// `signature()`/`alignment()` are per-Rust-type, static functions, and a
/// `Value` can be any dbus type depending on which variant it holds at
/// runtime -- exactly the dynamically-typed case the trait isn't for. Callers
/// that need a `Value` inside a `v` slot go through
/// [`crate::message_builder::MarshalledMessageBody::push_variant_value`].
pub fn marshal_value(v: &Value, ctx: &mut MarshalContext) -> Result<(), crate::Error> {
    match v {
        Value::Byte(n) => n.marshal(ctx),
        Value::Bool(b) => b.marshal(ctx),
        Value::Int16(n) => n.marshal(ctx),
        Value::Uint16(n) => n.marshal(ctx),
        Value::Int32(n) => n.marshal(ctx),
        Value::Uint32(n) => n.marshal(ctx),
        Value::Int64(n) => n.marshal(ctx),
        Value::Uint64(n) => n.marshal(ctx),
        Value::Double(bits) => {
            ctx.align_to(8);
            util::write_u64(*bits, ctx.byteorder, ctx.buf);
            Ok(())
        }
        Value::String(s) => s.marshal(ctx),
        Value::ObjectPath(s) => {
            ctx.align_to(4);
            util::write_string(s, ctx.byteorder, ctx.buf);
            Ok(())
        }
        Value::Signature(s) => {
            util::write_signature(s, ctx.buf);
            Ok(())
        }
        Value::UnixFd(idx) => idx.marshal(ctx),
        Value::Array(elems, elem_ty) => {
            ctx.align_to(4);
            let size_pos = ctx.buf.len();
            ctx.buf.extend_from_slice(&[0, 0, 0, 0]);
            ctx.align_to(elem_ty.get_alignment());
            let start = ctx.buf.len();
            for e in elems {
                marshal_value(e, ctx)?;
            }
            let len = (ctx.buf.len() - start) as u32;
            util::insert_u32(ctx.byteorder, len, &mut ctx.buf[size_pos..size_pos + 4]);
            Ok(())
        }
        Value::Struct(elems) => {
            ctx.align_to(8);
            for e in elems {
                marshal_value(e, ctx)?;
            }
            Ok(())
        }
        Value::Dict(entries, _, _) => {
            ctx.align_to(4);
            let size_pos = ctx.buf.len();
            ctx.buf.extend_from_slice(&[0, 0, 0, 0]);
            ctx.align_to(8);
            let start = ctx.buf.len();
            for (k, val) in entries {
                ctx.align_to(8);
                marshal_value(k, ctx)?;
                marshal_value(val, ctx)?;
            }
            let len = (ctx.buf.len() - start) as u32;
            util::insert_u32(ctx.byteorder, len, &mut ctx.buf[size_pos..size_pos + 4]);
            Ok(())
        }
        Value::Variant(inner) => {
            let mut sig = String::new();
            inner.value_signature().to_str(&mut sig);
            util::write_signature(&sig, ctx.buf);
            ctx.align_to(inner.value_signature().get_alignment());
            marshal_value(inner, ctx)
        }
    }
}

/// Unmarshals a `Value` whose type is `typ`. There is no blanket
/// `Unmarshal` impl for `Value` itself: a bare variant slot carries its own
/// inline signature (see [`unmarshal_variant_value`]), but a `Value` store
/// behind a known field of a struct/dict/array needs the caller to supply
/// the type it already knows from the surrounding signature.
pub fn unmarshal_typed<'r>(
    ctx: &mut UnmarshalContext<'r>,
    typ: &Type,
) -> UnmarshalResult<Value> {
    match typ {
        Type::Base(Base::Byte) => u8::unmarshal(ctx).map(|(n, v)| (n, Value::Byte(v))),
        Type::Base(Base::Boolean) => bool::unmarshal(ctx).map(|(n, v)| (n, Value::Bool(v))),
        Type::Base(Base::Int16) => i16::unmarshal(ctx).map(|(n, v)| (n, Value::Int16(v))),
        Type::Base(Base::Uint16) => u16::unmarshal(ctx).map(|(n, v)| (n, Value::Uint16(v))),
        Type::Base(Base::Int32) => i32::unmarshal(ctx).map(|(n, v)| (n, Value::Int32(v))),
        Type::Base(Base::Uint32) => u32::unmarshal(ctx).map(|(n, v)| (n, Value::Uint32(v))),
        Type::Base(Base::Int64) => i64::unmarshal(ctx).map(|(n, v)| (n, Value::Int64(v))),
        Type::Base(Base::Uint64) => u64::unmarshal(ctx).map(|(n, v)| (n, Value::Uint64(v))),
        Type::Base(Base::Double) => {
            let padding = ctx.align_to(8)?;
            let (bytes, bits) = util::parse_u64(&ctx.buf[ctx.offset..], ctx.byteorder)?;
            ctx.offset += bytes;
            Ok((padding + bytes, Value::Double(bits)))
        }
        Type::Base(Base::String) => String::unmarshal(ctx).map(|(n, v)| (n, Value::String(v))),
        Type::Base(Base::ObjectPath) => {
            let padding = ctx.align_to(4)?;
            let (bytes, path) = util::unmarshal_string(ctx.byteorder, &ctx.buf[ctx.offset..])?;
            ctx.offset += bytes;
            crate::validation::validate_object_path(&path)?;
            Ok((padding + bytes, Value::ObjectPath(path)))
        }
        Type::Base(Base::Signature) => {
            let (bytes, sig) = util::unmarshal_signature(&ctx.buf[ctx.offset..])?;
            let sig = sig.to_owned();
            ctx.offset += bytes;
            Ok((bytes, Value::Signature(sig)))
        }
        Type::Base(Base::UnixFd) => u32::unmarshal(ctx).map(|(n, v)| (n, Value::UnixFd(v))),
        Type::Container(Container::Array(elem)) => {
            let start_offset = ctx.offset;
            ctx.align_to(4)?;
            let (len_bytes, len) = util::parse_u32(&ctx.buf[ctx.offset..], ctx.byteorder)?;
            ctx.offset += len_bytes;
            if len > MAX_ARRAY_BYTES {
                return Err(unmarshal::Error::NotEnoughBytesForCollection);
            }
            ctx.align_to(elem.get_alignment())?;
            let end = ctx.offset + len as usize;
            let mut out = Vec::new();
            while ctx.offset < end {
                let (_, v) = unmarshal_typed(ctx, elem)?;
                out.push(v);
            }
            Ok((ctx.offset - start_offset, Value::Array(out, (**elem).clone())))
        }
        Type::Container(Container::Struct(fields)) => {
            let start_offset = ctx.offset;
            ctx.align_to(8)?;
            let mut out = Vec::new();
            for f in fields {
                let (_, v) = unmarshal_typed(ctx, f)?;
                out.push(v);
            }
            Ok((ctx.offset - start_offset, Value::Struct(out)))
        }
        Type::Container(Container::Dict(k, v)) => {
            let start_offset = ctx.offset;
            ctx.align_to(4)?;
            let (len_bytes, len) = util::parse_u32(&ctx.buf[ctx.offset..], ctx.byteorder)?;
            ctx.offset += len_bytes;
            ctx.align_to(8)?;
            let end = ctx.offset + len as usize;
            let mut out = Vec::new();
            while ctx.offset < end {
                ctx.align_to(8)?;
                let (_, kval) = unmarshal_typed(ctx, &Type::Base(*k))?;
                let (_, vval) = unmarshal_typed(ctx, v)?;
                out.push((kval, vval));
            }
            Ok((ctx.offset - start_offset, Value::Dict(out, *k, (**v).clone())))
        }
        Type::Container(Container::Variant) => {
            let (n, v) = unmarshal_variant_value(ctx)?;
            Ok((n, Value::Variant(Box::new(v))))
        }
    }
}

/// Unmarshals a `v` slot: the inline signature string followed by the value
/// it describes.
pub fn unmarshal_variant_value<'r>(ctx: &mut UnmarshalContext<'r>) -> UnmarshalResult<Value> {
    let start_offset = ctx.offset;
    let (sig_bytes, sig_str) = util::unmarshal_signature(&ctx.buf[ctx.offset..])?;
    ctx.offset += sig_bytes;

    let mut types = signature::Type::parse_description(sig_str)?;
    if types.len() != 1 {
        return Err(unmarshal::Error::WrongSignature);
    }
    let typ = types.remove(0);
    let (_, val) = unmarshal_typed(ctx, &typ)?;
    Ok((ctx.offset - start_offset, val))
}

/// Shorthand used by [`crate::properties`] for a bag of named, variant-typed
/// values, as returned by `Properties.GetAll`.
pub type PropMap = HashMap<String, Value>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ByteOrder;

    #[test]
    fn round_trips_a_struct_of_scalars() {
        let orig = Value::Struct(vec![
            Value::Uint32(7),
            Value::String("hi".to_owned()),
            Value::Bool(true),
        ]);

        let mut fds = Vec::new();
        let mut buf = Vec::new();
        let mut ctx = MarshalContext {
            buf: &mut buf,
            fds: &mut fds,
            byteorder: ByteOrder::LittleEndian,
        };
        marshal_value(&orig, &mut ctx).unwrap();

        let typ = orig.value_signature();
        let mut uctx = UnmarshalContext {
            buf: &buf,
            fds: &[],
            byteorder: ByteOrder::LittleEndian,
            offset: 0,
        };
        let (_, decoded) = unmarshal_typed(&mut uctx, &typ).unwrap();
        assert_eq!(orig, decoded);
    }

    #[test]
    fn round_trips_a_variant() {
        let orig = Value::Variant(Box::new(Value::String("nested".to_owned())));

        let mut fds = Vec::new();
        let mut buf = Vec::new();
        let mut ctx = MarshalContext {
            buf: &mut buf,
            fds: &mut fds,
            byteorder: ByteOrder::LittleEndian,
        };
        marshal_value(&orig, &mut ctx).unwrap();

        let mut uctx = UnmarshalContext {
            buf: &buf,
            fds: &[],
            byteorder: ByteOrder::LittleEndian,
            offset: 0,
        };
        let (_, decoded) = unmarshal_variant_value(&mut uctx).unwrap();
        assert_eq!(Value::String("nested".to_owned()), decoded);
    }
}
