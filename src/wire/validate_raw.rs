//! Structural validation of raw marshalled bytes against a signature, without
//! building any typed value out of them.
//!
//! Used while unmarshalling header fields this library does not recognize:
//! the D-Bus spec still requires the message to be rejected if the unknown
//! field's value is not a well-formed variant, even though the contents are
//! discarded.

use crate::signature::{Base, Container, Type};
use crate::wire::unmarshal::Error;
use crate::wire::util::*;
use crate::wire::MAX_ARRAY_LENGTH_BYTES;
use crate::ByteOrder;

/// Walks `buf` starting at `offset` as if it held a value of type `sig`,
/// checking alignment and length-prefixes without materialising the value.
/// Returns the number of bytes consumed. On error, the first element of the
/// tuple is the number of bytes consumed up to the failure point.
pub fn validate_marshalled(
    byteorder: ByteOrder,
    offset: usize,
    buf: &[u8],
    sig: &Type,
) -> Result<usize, (usize, Error)> {
    let start = offset;
    let mut offset = offset;
    match sig {
        Type::Base(b) => {
            let padding =
                align_offset(b.get_alignment(), buf, offset).map_err(|e| (offset - start, e))?;
            offset += padding;
            let consumed = match b {
                Base::Byte => {
                    if buf.len() <= offset {
                        return Err((offset - start, Error::NotEnoughBytes));
                    }
                    1
                }
                Base::Boolean => {
                    let (c, v) =
                        parse_u32(&buf[offset..], byteorder).map_err(|e| (offset - start, e))?;
                    if v > 1 {
                        return Err((offset - start, Error::InvalidBoolean));
                    }
                    c
                }
                Base::Int16 | Base::Uint16 => {
                    parse_u16(&buf[offset..], byteorder).map_err(|e| (offset - start, e))?.0
                }
                Base::Int32 | Base::Uint32 | Base::UnixFd => {
                    parse_u32(&buf[offset..], byteorder).map_err(|e| (offset - start, e))?.0
                }
                Base::Int64 | Base::Uint64 | Base::Double => {
                    parse_u64(&buf[offset..], byteorder).map_err(|e| (offset - start, e))?.0
                }
                Base::String => {
                    unmarshal_string(byteorder, &buf[offset..])
                        .map_err(|e| (offset - start, e))?
                        .0
                }
                Base::ObjectPath => {
                    let (c, path) = unmarshal_string(byteorder, &buf[offset..])
                        .map_err(|e| (offset - start, e))?;
                    crate::validation::validate_object_path(&path)
                        .map_err(|_| (offset - start, Error::InvalidHeaderField))?;
                    c
                }
                Base::Signature => {
                    let (c, s) =
                        unmarshal_signature(&buf[offset..]).map_err(|e| (offset - start, e))?;
                    crate::validation::validate_signature(s)
                        .map_err(|_| (offset - start, Error::NoSignature))?;
                    c
                }
            };
            offset += consumed;
        }
        Type::Container(c) => match c {
            Container::Variant => {
                let (sig_bytes, sig_str) =
                    unmarshal_signature(&buf[offset..]).map_err(|e| (offset - start, e))?;
                offset += sig_bytes;
                let mut types = Type::parse_description(sig_str)
                    .map_err(|_| (offset - start, Error::NoSignature))?;
                if types.len() != 1 {
                    return Err((offset - start, Error::NoSignature));
                }
                let inner = types.remove(0);
                let consumed = validate_marshalled(byteorder, offset, buf, &inner)
                    .map_err(|(c, e)| (offset - start + c, e))?;
                offset += consumed;
            }
            Container::Array(elem) => {
                let padding = align_offset(4, buf, offset).map_err(|e| (offset - start, e))?;
                offset += padding;
                let (len_bytes, len) =
                    parse_u32(&buf[offset..], byteorder).map_err(|e| (offset - start, e))?;
                offset += len_bytes;
                if len > MAX_ARRAY_LENGTH_BYTES {
                    return Err((offset - start, Error::NotEnoughBytesForCollection));
                }
                let elem_padding = align_offset(elem.get_alignment(), buf, offset)
                    .map_err(|e| (offset - start, e))?;
                offset += elem_padding;
                let array_end = offset + len as usize;
                if buf.len() < array_end {
                    return Err((offset - start, Error::NotEnoughBytesForCollection));
                }
                while offset < array_end {
                    let consumed = validate_marshalled(byteorder, offset, buf, elem.as_ref())
                        .map_err(|(c, e)| (offset - start + c, e))?;
                    offset += consumed;
                }
            }
            Container::Dict(key, val) => {
                let padding = align_offset(4, buf, offset).map_err(|e| (offset - start, e))?;
                offset += padding;
                let (len_bytes, len) =
                    parse_u32(&buf[offset..], byteorder).map_err(|e| (offset - start, e))?;
                offset += len_bytes;
                if len > MAX_ARRAY_LENGTH_BYTES {
                    return Err((offset - start, Error::NotEnoughBytesForCollection));
                }
                let entry_padding = align_offset(8, buf, offset).map_err(|e| (offset - start, e))?;
                offset += entry_padding;
                let dict_end = offset + len as usize;
                if buf.len() < dict_end {
                    return Err((offset - start, Error::NotEnoughBytesForCollection));
                }
                while offset < dict_end {
                    let entry_padding =
                        align_offset(8, buf, offset).map_err(|e| (offset - start, e))?;
                    offset += entry_padding;
                    let key_type = Type::Base(*key);
                    let consumed = validate_marshalled(byteorder, offset, buf, &key_type)
                        .map_err(|(c, e)| (offset - start + c, e))?;
                    offset += consumed;
                    let consumed = validate_marshalled(byteorder, offset, buf, val.as_ref())
                        .map_err(|(c, e)| (offset - start + c, e))?;
                    offset += consumed;
                }
            }
            Container::Struct(fields) => {
                let padding = align_offset(8, buf, offset).map_err(|e| (offset - start, e))?;
                offset += padding;
                if fields.is_empty() {
                    return Err((offset - start, Error::EmptyStruct));
                }
                for field_ty in fields {
                    let consumed = validate_marshalled(byteorder, offset, buf, field_ty)
                        .map_err(|(c, e)| (offset - start + c, e))?;
                    offset += consumed;
                }
            }
        },
    }
    Ok(offset - start)
}
