//! The get path: reference to node.
//!
//! Idents decode without touching the region, inline scalars with one 8-byte read.
//! Arrays, strings and binaries become views after reading only their record header;
//! proxies, params, closures and calls are decoded eagerly.

use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};

use crate::array::Array;
use crate::binary::Binary;
use crate::error::{Error, Result};
use crate::index::MIN_BUCKETS;
use crate::node::{Call, Node, Proxy};
use crate::record::{
    FLAG_INDEXED, IDENT_EMPTY_ARRAY, IDENT_EMPTY_BINARY, IDENT_EMPTY_STRING, IDENT_FALSE,
    IDENT_TRUE, IDENT_VOID, PARAM_IDENT_BASE, PARAM_IDENT_LIMIT, RECORD_HEADER_SIZE, RecordHeader,
    Tag,
};
use crate::reference::{Kind, Reference};
use crate::text::Text;
use crate::view::{Context, View};

pub(crate) fn decode(ctx: &Context, reference: Reference) -> Result<Node> {
    if reference.kind() == Kind::Ident {
        return decode_ident(reference);
    }
    if let Some(node) = ctx.cached(reference) {
        return Ok(node);
    }
    let node = match reference.kind() {
        Kind::Addr => decode_record(ctx, reference)?,
        kind => decode_scalar(ctx, reference, kind)?,
    };
    ctx.remember(reference, &node);
    Ok(node)
}

fn decode_ident(reference: Reference) -> Result<Node> {
    let payload = reference.payload();
    Ok(match payload {
        0 => return Err(Error::invalid(reference, "null reference")),
        IDENT_VOID => Node::Void,
        IDENT_TRUE => Node::Bool(true),
        IDENT_FALSE => Node::Bool(false),
        IDENT_EMPTY_ARRAY => Node::Array(Array::empty()),
        IDENT_EMPTY_STRING => Node::String(Text::empty()),
        IDENT_EMPTY_BINARY => Node::Binary(Binary::empty()),
        p if (PARAM_IDENT_BASE..PARAM_IDENT_BASE + PARAM_IDENT_LIMIT as u64).contains(&p) => {
            Node::Param((p - PARAM_IDENT_BASE) as u32)
        }
        _ => return Err(Error::invalid(reference, "unknown ident")),
    })
}

fn decode_scalar(ctx: &Context, reference: Reference, kind: Kind) -> Result<Node> {
    let addr = reference.payload();
    ctx.store.check(reference, addr, 8)?;
    let bits = ctx.store.region().read_u64(addr)?;
    Ok(match kind {
        Kind::Integer => Node::Integer(bits as i64),
        Kind::Decimal => Node::Decimal(f64::from_bits(bits)),
        Kind::Duration => Node::Duration(bits as i64),
        Kind::Datetime => Node::Datetime(bits as i64),
        Kind::Object => Node::Object(bits),
        Kind::Handler => {
            let function = Reference::from_raw(bits);
            check_child(reference, function)?;
            Node::Handler(Arc::new(decode(ctx, function)?))
        }
        Kind::Ident | Kind::Addr => return Err(Error::invalid(reference, "not a scalar")),
    })
}

fn decode_record(ctx: &Context, reference: Reference) -> Result<Node> {
    let addr = reference.payload();
    ctx.store.check(reference, addr, RECORD_HEADER_SIZE)?;
    let mut raw = [0u8; RECORD_HEADER_SIZE as usize];
    ctx.store.region().read_bytes(addr, &mut raw)?;
    let header = RecordHeader::decode(&raw);
    let tag = Tag::from_u32(header.tag)
        .ok_or_else(|| Error::invalid(reference, format!("unknown type tag {}", header.tag)))?;

    let data = addr + RECORD_HEADER_SIZE;
    let length = header.length as u64;
    let view = |len: u64| View {
        context: ctx.clone(),
        reference,
        data,
        len: len as usize,
        hash: header.hash,
    };
    let payload = |len: u64| ctx.store.check(reference, data, len);

    Ok(match tag {
        Tag::Array => {
            payload(8 * length)?;
            let table = if header.flags & FLAG_INDEXED != 0 {
                let table = data + 8 * length;
                check_table(ctx, reference, table, length)?;
                Some(table)
            } else {
                None
            };
            Node::Array(Array::mapped(view(length), table))
        }
        Tag::String8 | Tag::String16 | Tag::String32 => {
            let width = match tag {
                Tag::String8 => 1,
                Tag::String16 => 2,
                _ => 4,
            };
            payload(length * width as u64)?;
            Node::String(Text::mapped(view(length), width))
        }
        Tag::Binary => {
            payload(length)?;
            Node::Binary(Binary::mapped(view(length)))
        }
        Tag::Future => return Err(Error::UnsupportedNode("future")),
        Tag::Native => return Err(Error::UnsupportedNode("native")),
        Tag::Proxy => {
            let refs = read_refs(ctx, reference, data, 3)?;
            let id = decode(ctx, refs[0])?;
            let name = match decode(ctx, refs[1])? {
                Node::String(name) => name,
                _ => return Err(Error::invalid(reference, "proxy name is not a string")),
            };
            let target = if refs[2].is_null() {
                None
            } else {
                Some(decode(ctx, refs[2])?)
            };
            Node::Proxy(Proxy::new(id, name, target))
        }
        Tag::Param => Node::Param(header.length),
        Tag::Closure => {
            let refs = read_refs(ctx, reference, data, 1)?;
            Node::Closure(Arc::new(decode(ctx, refs[0])?))
        }
        Tag::Concat | Tag::Composite => {
            let refs = read_refs(ctx, reference, data, 1 + header.length as usize)?;
            let function = decode(ctx, refs[0])?;
            let params = refs[1..]
                .iter()
                .map(|param| decode(ctx, *param))
                .collect::<Result<Vec<_>>>()?;
            let call = Call::new(function, params);
            if tag == Tag::Concat {
                Node::Concat(call)
            } else {
                Node::Composite(call)
            }
        }
    })
}

/// Checks that a well-formed bucket table for `length` members lies at `addr`.
fn check_table(ctx: &Context, reference: Reference, addr: u64, length: u64) -> Result<()> {
    ctx.store.check(reference, addr, 4)?;
    let count = ctx.store.region().read_u32(addr)?;
    if !count.is_power_of_two() || count < MIN_BUCKETS {
        return Err(Error::invalid(reference, format!("bad bucket count {count}")));
    }
    ctx.store.check(reference, addr, 4 * (2 + count as u64 + length))
}

/// Fails unless `child` was written before its `parent`.
///
/// Writers put children first, so every stored reference points below the record
/// holding it. Anything else is corrupt and could make decoding recurse forever.
pub(crate) fn check_child(parent: Reference, child: Reference) -> Result<()> {
    if child.kind() != Kind::Ident && child.payload() >= parent.payload() {
        return Err(Error::invalid(
            parent,
            format!("child {child} does not precede its record"),
        ));
    }
    Ok(())
}

/// Reads `count` consecutive child references at `addr` in one access.
fn read_refs(
    ctx: &Context,
    reference: Reference,
    addr: u64,
    count: usize,
) -> Result<Vec<Reference>> {
    ctx.store.check(reference, addr, 8 * count as u64)?;
    let mut raw = vec![0u8; 8 * count];
    ctx.store.region().read_bytes(addr, &mut raw)?;
    raw.chunks_exact(8)
        .map(|word| {
            let child = Reference::from_raw(LittleEndian::read_u64(word));
            check_child(reference, child)?;
            Ok(child)
        })
        .collect()
}
