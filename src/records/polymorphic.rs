//! # Polymorphic Codec
//!
//! A polymorphic field holds one of a closed, numbered set of struct types.
//! On the wire it is the variant tag followed directly by that variant's
//! record bytes, with no offset or length in between:
//!
//! ```text
//! +---------------+------------------------------+
//! | VarInt tag    | variant record (full layout) |
//! +---------------+------------------------------+
//! ```
//!
//! In memory the tag travels with the record in [`Variant`], so encoding
//! never inspects a record to work out which variant it is. The tag must map
//! to the record's struct in the family table; a tag the family does not know
//! is `UnknownVariantTag` and nothing after it can be interpreted.

use eyre::{bail, ensure, Result};

use crate::encoding::varint;
use crate::error::ProtocolError;
use crate::records::layout::{read_record, record_size, write_record};
use crate::records::schema::{Catalog, FamilyId, FamilyLayout, StructId};
use crate::records::validate::{Mode, Walker};
use crate::records::value::Variant;

impl Catalog {
    pub fn serialize_variant(
        &self,
        family: FamilyId,
        variant: &Variant,
        out: &mut Vec<u8>,
    ) -> Result<()> {
        let start = out.len();
        let result = write_variant(self, family, variant, out, 0);
        if result.is_err() {
            out.truncate(start);
        }
        result
    }

    pub fn compute_variant_size(&self, family: FamilyId, variant: &Variant) -> Result<usize> {
        variant_size(self, family, variant, 0)
    }

    pub fn deserialize_variant(&self, family: FamilyId, buf: &[u8], offset: usize) -> Result<Variant> {
        read_variant(self, family, buf, offset, 0).map(|(variant, _)| variant)
    }

    /// `length(tag) + compute_bytes_consumed(variant)`.
    pub fn variant_bytes_consumed(&self, family: FamilyId, buf: &[u8], offset: usize) -> Result<usize> {
        let end = Walker::new(self, Mode::Measure).variant_end(family, buf, offset, 0)?;
        Ok(end - offset)
    }

    pub fn validate_variant(&self, family: FamilyId, buf: &[u8], offset: usize) -> Result<()> {
        Walker::new(self, Mode::Validate)
            .variant_end(family, buf, offset, 0)
            .map(|_| ())
    }
}

/// Resolves a tag to its variant struct, failing on tags the family lacks.
pub(crate) fn variant_struct(family: &FamilyLayout, tag: u32) -> Result<StructId> {
    match family.struct_for(tag) {
        Some(id) => Ok(id),
        None => bail!(ProtocolError::UnknownVariantTag {
            family: family.name().to_string(),
            tag,
        }),
    }
}

fn checked_tag(catalog: &Catalog, family: FamilyId, variant: &Variant) -> Result<()> {
    let family = catalog.family(family)?;
    let expected = variant_struct(family, variant.tag)?;
    ensure!(
        variant.record.struct_id() == expected,
        ProtocolError::TypeMismatch {
            expected: "record matching its variant tag",
        }
    );
    Ok(())
}

pub(crate) fn write_variant(
    catalog: &Catalog,
    family: FamilyId,
    variant: &Variant,
    out: &mut Vec<u8>,
    depth: usize,
) -> Result<()> {
    checked_tag(catalog, family, variant)?;
    varint::write(out, variant.tag);
    write_record(catalog, &variant.record, out, depth)
}

pub(crate) fn variant_size(
    catalog: &Catalog,
    family: FamilyId,
    variant: &Variant,
    depth: usize,
) -> Result<usize> {
    checked_tag(catalog, family, variant)?;
    Ok(varint::size(variant.tag) + record_size(catalog, &variant.record, depth)?)
}

pub(crate) fn read_variant(
    catalog: &Catalog,
    family: FamilyId,
    buf: &[u8],
    pos: usize,
    depth: usize,
) -> Result<(Variant, usize)> {
    let family = catalog.family(family)?;
    let (tag, tag_len) = varint::read(buf, pos)?;
    let id = variant_struct(family, tag)?;
    let (record, end) = read_record(catalog, id, buf, pos + tag_len, depth)?;
    Ok((Variant { tag, record }, end))
}
