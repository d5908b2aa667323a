//! # Catalog and Compiled Layouts
//!
//! The [`Catalog`] turns [`StructDef`]/[`FamilyDef`] descriptions into compiled
//! [`StructLayout`]s once, at startup. Every offset the codec needs is computed
//! here so encode, decode and validation only look values up.
//!
//! ## Layout Internals
//!
//! For each struct:
//!
//! - `bitmask_size`: `nullable_count.div_ceil(8)` bytes, placed first
//! - `null_bit`: per nullable field, its bit index in declaration order
//! - `Placement::Fixed { offset, size }`: static offset from record start
//! - `Placement::Variable { slot }`: index into the offset table
//! - `fixed_end`: bitmask plus all fixed fields; the offset table starts here
//! - `variable_block_start`: `fixed_end + 4 * variable_field_count`, the
//!   `FIXED_BLOCK_SIZE` that every relative offset is measured from
//! - `max_size`: upper bound on serialized bytes, capped at `MAX_PACKET_SIZE`
//!
//! ## Fixed-Size Detection
//!
//! A struct is fixed-size when all of its fields are primitives or fixed-size
//! structs. Fixed-size structs are embedded inline; everything else goes
//! through an offset slot. Detection walks struct references depth first and
//! treats a struct that is still being visited as variable, so any struct on a
//! reference cycle is variable-size and recursion always passes through an
//! offset slot:
//!
//! ```text
//! TagPattern ──operands──> [TagPattern]     array: variable
//!            └──not──────> TagPattern       in progress: variable
//! ```
//!
//! ## Build Errors
//!
//! Duplicate struct, family or field names, unresolved references, enum tables
//! outside 1..=256, maxima above `MAX_COLLECTION_LEN` and duplicate variant
//! tags all fail `CatalogBuilder::build`.

use eyre::{bail, ensure, Result, WrapErr};
use hashbrown::{HashMap, HashSet};

use crate::config::{MAX_COLLECTION_LEN, MAX_ENUM_VARIANTS, MAX_PACKET_SIZE, OFFSET_SLOT_SIZE};
use crate::encoding::varint;
use crate::error::ProtocolError;
use crate::records::types::{FamilyDef, FieldType, StructDef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StructId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FamilyId(pub u32);

/// A field type with struct and family names resolved to ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Bool,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    Float32,
    Float64,
    Uuid,
    Enum {
        variants: usize,
    },
    FixedAscii {
        len: usize,
    },
    String {
        max_len: usize,
    },
    VarAscii {
        max_len: usize,
    },
    Array {
        element: Box<FieldKind>,
        max_count: usize,
    },
    Dict {
        key: Box<FieldKind>,
        value: Box<FieldKind>,
        max_count: usize,
    },
    Struct(StructId),
    Polymorphic(FamilyId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Fixed { offset: usize, size: usize },
    Variable { slot: usize },
}

#[derive(Debug, Clone)]
pub struct FieldLayout {
    pub name: String,
    pub kind: FieldKind,
    pub nullable: bool,
    pub null_bit: Option<usize>,
    pub placement: Placement,
}

#[derive(Debug, Clone)]
pub struct StructLayout {
    pub(crate) id: StructId,
    pub(crate) name: String,
    pub(crate) fields: Vec<FieldLayout>,
    pub(crate) bitmask_size: usize,
    pub(crate) fixed_end: usize,
    pub(crate) variable_field_count: usize,
    pub(crate) variable_block_start: usize,
    pub(crate) max_size: usize,
}

impl StructLayout {
    pub fn id(&self) -> StructId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldLayout] {
        &self.fields
    }

    pub fn field(&self, idx: usize) -> Option<&FieldLayout> {
        self.fields.get(idx)
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn bitmask_size(&self) -> usize {
        self.bitmask_size
    }

    pub fn variable_field_count(&self) -> usize {
        self.variable_field_count
    }

    /// `FIXED_BLOCK_SIZE`: bitmask, fixed fields and offset slots.
    pub fn variable_block_start(&self) -> usize {
        self.variable_block_start
    }

    pub fn slot_position(&self, slot: usize) -> usize {
        self.fixed_end + slot * OFFSET_SLOT_SIZE
    }

    pub fn fixed_size(&self) -> Option<usize> {
        (self.variable_field_count == 0).then_some(self.variable_block_start)
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }
}

#[derive(Debug, Clone)]
pub struct FamilyLayout {
    pub(crate) id: FamilyId,
    pub(crate) name: String,
    pub(crate) variants: Vec<(u32, StructId)>,
    pub(crate) by_tag: HashMap<u32, StructId>,
    pub(crate) max_size: usize,
}

impl FamilyLayout {
    pub fn id(&self) -> FamilyId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn variants(&self) -> &[(u32, StructId)] {
        &self.variants
    }

    pub fn struct_for(&self, tag: u32) -> Option<StructId> {
        self.by_tag.get(&tag).copied()
    }

    pub fn tag_of(&self, struct_id: StructId) -> Option<u32> {
        self.variants
            .iter()
            .find(|(_, id)| *id == struct_id)
            .map(|(tag, _)| *tag)
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }
}

/// Compiled, immutable set of record layouts and polymorphic families.
#[derive(Debug, Clone)]
pub struct Catalog {
    structs: Vec<StructLayout>,
    families: Vec<FamilyLayout>,
    struct_names: HashMap<String, StructId>,
    family_names: HashMap<String, FamilyId>,
}

impl Catalog {
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::default()
    }

    pub fn struct_id(&self, name: &str) -> Option<StructId> {
        self.struct_names.get(name).copied()
    }

    pub fn family_id(&self, name: &str) -> Option<FamilyId> {
        self.family_names.get(name).copied()
    }

    pub fn require_struct(&self, name: &str) -> Result<StructId> {
        match self.struct_id(name) {
            Some(id) => Ok(id),
            None => bail!("struct '{}' not found in catalog", name),
        }
    }

    pub fn require_family(&self, name: &str) -> Result<FamilyId> {
        match self.family_id(name) {
            Some(id) => Ok(id),
            None => bail!("family '{}' not found in catalog", name),
        }
    }

    pub fn layout(&self, id: StructId) -> Result<&StructLayout> {
        match self.structs.get(id.0 as usize) {
            Some(layout) => Ok(layout),
            None => bail!(ProtocolError::IllegalArgument(format!(
                "struct id {} is not part of this catalog",
                id.0
            ))),
        }
    }

    pub fn family(&self, id: FamilyId) -> Result<&FamilyLayout> {
        match self.families.get(id.0 as usize) {
            Some(family) => Ok(family),
            None => bail!(ProtocolError::IllegalArgument(format!(
                "family id {} is not part of this catalog",
                id.0
            ))),
        }
    }

    pub fn structs(&self) -> &[StructLayout] {
        &self.structs
    }

    pub fn families(&self) -> &[FamilyLayout] {
        &self.families
    }

    /// Static encoded size of a kind, `None` when it is variable.
    pub(crate) fn fixed_kind_size(&self, kind: &FieldKind) -> Option<usize> {
        match kind {
            FieldKind::Struct(id) => self.structs.get(id.0 as usize)?.fixed_size(),
            other => primitive_kind_size(other),
        }
    }
}

fn primitive_kind_size(kind: &FieldKind) -> Option<usize> {
    match kind {
        FieldKind::Bool | FieldKind::Int8 | FieldKind::UInt8 | FieldKind::Enum { .. } => Some(1),
        FieldKind::Int16 | FieldKind::UInt16 => Some(2),
        FieldKind::Int32 | FieldKind::UInt32 | FieldKind::Float32 => Some(4),
        FieldKind::Int64 | FieldKind::Float64 => Some(8),
        FieldKind::Uuid => Some(crate::config::UUID_SIZE),
        FieldKind::FixedAscii { len } => Some(*len),
        FieldKind::String { .. }
        | FieldKind::VarAscii { .. }
        | FieldKind::Array { .. }
        | FieldKind::Dict { .. }
        | FieldKind::Struct(_)
        | FieldKind::Polymorphic(_) => None,
    }
}

#[derive(Debug, Default)]
pub struct CatalogBuilder {
    structs: Vec<StructDef>,
    families: Vec<FamilyDef>,
}

struct Resolved {
    name: String,
    fields: Vec<(String, FieldKind, bool)>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    New,
    InProgress,
    Done,
}

impl CatalogBuilder {
    pub fn with_struct(mut self, def: StructDef) -> Self {
        self.structs.push(def);
        self
    }

    pub fn with_family(mut self, def: FamilyDef) -> Self {
        self.families.push(def);
        self
    }

    pub fn build(self) -> Result<Catalog> {
        let mut struct_names = HashMap::with_capacity(self.structs.len());
        for (idx, def) in self.structs.iter().enumerate() {
            let exists = struct_names
                .insert(def.name.clone(), StructId(idx as u32))
                .is_some();
            ensure!(!exists, "struct '{}' already defined", def.name);
        }

        let mut family_names = HashMap::with_capacity(self.families.len());
        for (idx, def) in self.families.iter().enumerate() {
            let exists = family_names
                .insert(def.name.clone(), FamilyId(idx as u32))
                .is_some();
            ensure!(!exists, "family '{}' already defined", def.name);
        }

        let resolved = self
            .structs
            .iter()
            .map(|def| resolve_struct(def, &struct_names, &family_names))
            .collect::<Result<Vec<_>>>()?;

        let mut family_variants = Vec::with_capacity(self.families.len());
        for def in &self.families {
            family_variants.push(resolve_family(def, &struct_names)?);
        }

        let fixed = detect_fixed_structs(&resolved);
        let mut compiler = LayoutCompiler {
            resolved: &resolved,
            fixed: &fixed,
            fixed_sizes: vec![None; resolved.len()],
        };
        let mut structs = Vec::with_capacity(resolved.len());
        for idx in 0..resolved.len() {
            structs.push(compiler.compile(idx));
        }

        let mut families = self
            .families
            .iter()
            .zip(family_variants)
            .enumerate()
            .map(|(idx, (def, variants))| FamilyLayout {
                id: FamilyId(idx as u32),
                name: def.name.clone(),
                by_tag: variants.iter().copied().collect(),
                variants,
                max_size: 0,
            })
            .collect::<Vec<_>>();

        let mut sizer = MaxSizer {
            structs: &structs,
            families: &families,
            struct_state: vec![Visit::New; structs.len()],
            struct_max: vec![0; structs.len()],
        };
        let struct_max = (0..structs.len())
            .map(|idx| sizer.struct_max(idx))
            .collect::<Vec<_>>();
        let family_max = (0..families.len())
            .map(|idx| sizer.family_max(idx))
            .collect::<Vec<_>>();

        for (layout, max) in structs.iter_mut().zip(struct_max) {
            layout.max_size = cap(max);
        }
        for (family, max) in families.iter_mut().zip(family_max) {
            family.max_size = cap(max);
        }

        Ok(Catalog {
            structs,
            families,
            struct_names,
            family_names,
        })
    }
}

fn cap(size: u64) -> usize {
    size.min(MAX_PACKET_SIZE as u64) as usize
}

fn resolve_struct(
    def: &StructDef,
    structs: &HashMap<String, StructId>,
    families: &HashMap<String, FamilyId>,
) -> Result<Resolved> {
    let mut seen = HashSet::with_capacity(def.fields.len());
    let mut fields = Vec::with_capacity(def.fields.len());

    for field in &def.fields {
        ensure!(
            seen.insert(field.name.as_str()),
            "field '{}' declared twice in struct '{}'",
            field.name,
            def.name
        );
        let kind = resolve_type(&field.ty, structs, families)
            .wrap_err_with(|| format!("in field '{}.{}'", def.name, field.name))?;
        fields.push((field.name.clone(), kind, field.nullable));
    }

    Ok(Resolved {
        name: def.name.clone(),
        fields,
    })
}

fn resolve_type(
    ty: &FieldType,
    structs: &HashMap<String, StructId>,
    families: &HashMap<String, FamilyId>,
) -> Result<FieldKind> {
    let check_max = |max: usize| -> Result<()> {
        ensure!(
            max <= MAX_COLLECTION_LEN,
            "declared maximum {} exceeds shared ceiling {}",
            max,
            MAX_COLLECTION_LEN
        );
        Ok(())
    };

    Ok(match ty {
        FieldType::Bool => FieldKind::Bool,
        FieldType::Int8 => FieldKind::Int8,
        FieldType::UInt8 => FieldKind::UInt8,
        FieldType::Int16 => FieldKind::Int16,
        FieldType::UInt16 => FieldKind::UInt16,
        FieldType::Int32 => FieldKind::Int32,
        FieldType::UInt32 => FieldKind::UInt32,
        FieldType::Int64 => FieldKind::Int64,
        FieldType::Float32 => FieldKind::Float32,
        FieldType::Float64 => FieldKind::Float64,
        FieldType::Uuid => FieldKind::Uuid,
        FieldType::Enum { name, variants } => {
            ensure!(
                (1..=MAX_ENUM_VARIANTS).contains(variants),
                "enum '{}' must have 1..={} values, got {}",
                name,
                MAX_ENUM_VARIANTS,
                variants
            );
            FieldKind::Enum {
                variants: *variants,
            }
        }
        FieldType::FixedAscii { len } => {
            check_max(*len)?;
            FieldKind::FixedAscii { len: *len }
        }
        FieldType::String { max_len } => {
            check_max(*max_len)?;
            FieldKind::String { max_len: *max_len }
        }
        FieldType::VarAscii { max_len } => {
            check_max(*max_len)?;
            FieldKind::VarAscii { max_len: *max_len }
        }
        FieldType::Array { element, max_count } => {
            check_max(*max_count)?;
            FieldKind::Array {
                element: Box::new(resolve_type(element, structs, families)?),
                max_count: *max_count,
            }
        }
        FieldType::Dict {
            key,
            value,
            max_count,
        } => {
            check_max(*max_count)?;
            let key = resolve_type(key, structs, families)?;
            ensure!(
                is_scalar(&key),
                "dictionary keys must be numbers, enums, uuids or strings"
            );
            FieldKind::Dict {
                key: Box::new(key),
                value: Box::new(resolve_type(value, structs, families)?),
                max_count: *max_count,
            }
        }
        FieldType::Struct(name) => match structs.get(name.as_str()) {
            Some(id) => FieldKind::Struct(*id),
            None => bail!("unknown struct '{}'", name),
        },
        FieldType::Polymorphic(name) => match families.get(name.as_str()) {
            Some(id) => FieldKind::Polymorphic(*id),
            None => bail!("unknown family '{}'", name),
        },
    })
}

fn is_scalar(kind: &FieldKind) -> bool {
    !matches!(
        kind,
        FieldKind::Array { .. }
            | FieldKind::Dict { .. }
            | FieldKind::Struct(_)
            | FieldKind::Polymorphic(_)
    )
}

fn resolve_family(
    def: &FamilyDef,
    structs: &HashMap<String, StructId>,
) -> Result<Vec<(u32, StructId)>> {
    ensure!(!def.variants.is_empty(), "family '{}' has no variants", def.name);

    let mut tags = HashSet::with_capacity(def.variants.len());
    let mut members = HashSet::with_capacity(def.variants.len());
    let mut variants = Vec::with_capacity(def.variants.len());

    for (tag, record) in &def.variants {
        ensure!(
            tags.insert(*tag),
            ProtocolError::DuplicateVariantTag {
                family: def.name.clone(),
                tag: *tag,
            }
        );
        let Some(&id) = structs.get(record.as_str()) else {
            bail!("unknown struct '{}' in family '{}'", record, def.name);
        };
        ensure!(
            members.insert(id),
            "struct '{}' appears twice in family '{}'",
            record,
            def.name
        );
        variants.push((*tag, id));
    }

    Ok(variants)
}

fn detect_fixed_structs(resolved: &[Resolved]) -> Vec<bool> {
    fn visit(idx: usize, resolved: &[Resolved], state: &mut [Visit], fixed: &mut [bool]) -> bool {
        match state[idx] {
            Visit::Done => return fixed[idx],
            Visit::InProgress => return false,
            Visit::New => {}
        }
        state[idx] = Visit::InProgress;

        let mut all_fixed = true;
        for (_, kind, _) in &resolved[idx].fields {
            let field_fixed = match kind {
                FieldKind::Struct(id) => visit(id.0 as usize, resolved, state, fixed),
                other => primitive_kind_size(other).is_some(),
            };
            all_fixed &= field_fixed;
        }

        state[idx] = Visit::Done;
        fixed[idx] = all_fixed;
        all_fixed
    }

    let mut state = vec![Visit::New; resolved.len()];
    let mut fixed = vec![false; resolved.len()];
    for idx in 0..resolved.len() {
        visit(idx, resolved, &mut state, &mut fixed);
    }
    fixed
}

struct LayoutCompiler<'a> {
    resolved: &'a [Resolved],
    fixed: &'a [bool],
    fixed_sizes: Vec<Option<usize>>,
}

impl LayoutCompiler<'_> {
    fn kind_size(&mut self, kind: &FieldKind) -> Option<usize> {
        match kind {
            FieldKind::Struct(id) if self.fixed[id.0 as usize] => {
                Some(self.fixed_struct_size(id.0 as usize))
            }
            other => primitive_kind_size(other),
        }
    }

    // Only reached for fixed structs, whose references form no cycle.
    fn fixed_struct_size(&mut self, idx: usize) -> usize {
        if let Some(size) = self.fixed_sizes[idx] {
            return size;
        }
        let resolved = self.resolved;
        let fields = &resolved[idx].fields;
        let nullable = fields.iter().filter(|(_, _, n)| *n).count();
        let mut size = nullable.div_ceil(8);
        for (_, kind, _) in fields {
            size += self.kind_size(kind).unwrap_or(0);
        }
        self.fixed_sizes[idx] = Some(size);
        size
    }

    fn compile(&mut self, idx: usize) -> StructLayout {
        let resolved = self.resolved;
        let def = &resolved[idx];
        let nullable_count = def.fields.iter().filter(|(_, _, n)| *n).count();
        let bitmask_size = nullable_count.div_ceil(8);

        let mut fields = Vec::with_capacity(def.fields.len());
        let mut offset = bitmask_size;
        let mut next_bit = 0;
        let mut next_slot = 0;

        for (name, kind, nullable) in &def.fields {
            let null_bit = nullable.then(|| {
                next_bit += 1;
                next_bit - 1
            });
            let placement = match self.kind_size(kind) {
                Some(size) => {
                    let placement = Placement::Fixed { offset, size };
                    offset += size;
                    placement
                }
                None => {
                    next_slot += 1;
                    Placement::Variable {
                        slot: next_slot - 1,
                    }
                }
            };
            fields.push(FieldLayout {
                name: name.clone(),
                kind: kind.clone(),
                nullable: *nullable,
                null_bit,
                placement,
            });
        }

        StructLayout {
            id: StructId(idx as u32),
            name: def.name.clone(),
            fields,
            bitmask_size,
            fixed_end: offset,
            variable_field_count: next_slot,
            variable_block_start: offset + next_slot * OFFSET_SLOT_SIZE,
            max_size: 0,
        }
    }
}

struct MaxSizer<'a> {
    structs: &'a [StructLayout],
    families: &'a [FamilyLayout],
    struct_state: Vec<Visit>,
    struct_max: Vec<u64>,
}

impl MaxSizer<'_> {
    const UNBOUNDED: u64 = MAX_PACKET_SIZE as u64;

    fn struct_max(&mut self, idx: usize) -> u64 {
        match self.struct_state[idx] {
            Visit::Done => return self.struct_max[idx],
            Visit::InProgress => return Self::UNBOUNDED,
            Visit::New => {}
        }
        self.struct_state[idx] = Visit::InProgress;

        let structs = self.structs;
        let layout = &structs[idx];
        let mut total = layout.variable_block_start as u64;
        for field in &layout.fields {
            if let Placement::Variable { .. } = field.placement {
                total = total.saturating_add(self.kind_max(&field.kind));
            }
        }

        let total = total.min(Self::UNBOUNDED);
        self.struct_state[idx] = Visit::Done;
        self.struct_max[idx] = total;
        total
    }

    fn family_max(&mut self, idx: usize) -> u64 {
        let families = self.families;
        let family = &families[idx];
        let mut largest = 0u64;
        let mut tag_size = 1u64;
        for (tag, id) in &family.variants {
            tag_size = tag_size.max(varint::size(*tag) as u64);
            largest = largest.max(self.struct_max(id.0 as usize));
        }
        tag_size.saturating_add(largest).min(Self::UNBOUNDED)
    }

    fn kind_max(&mut self, kind: &FieldKind) -> u64 {
        let prefix = |max: usize| varint::size(max as u32) as u64;
        match kind {
            FieldKind::String { max_len } | FieldKind::VarAscii { max_len } => {
                prefix(*max_len).saturating_add(*max_len as u64)
            }
            FieldKind::Array { element, max_count } => {
                let element = self.kind_max(element);
                prefix(*max_count).saturating_add(element.saturating_mul(*max_count as u64))
            }
            FieldKind::Dict {
                key,
                value,
                max_count,
            } => {
                let entry = self.kind_max(key).saturating_add(self.kind_max(value));
                prefix(*max_count).saturating_add(entry.saturating_mul(*max_count as u64))
            }
            FieldKind::Struct(id) => self.struct_max(id.0 as usize),
            FieldKind::Polymorphic(id) => self.family_max(id.0 as usize),
            other => primitive_kind_size(other).unwrap_or(0) as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::kind_of;
    use crate::records::types::FieldType;

    fn vec3() -> StructDef {
        StructDef::new("Vec3")
            .field("x", FieldType::Float32)
            .field("y", FieldType::Float32)
            .field("z", FieldType::Float32)
    }

    #[test]
    fn fixed_offsets_follow_bitmask_in_declaration_order() {
        let catalog = Catalog::builder()
            .with_struct(
                StructDef::new("Mixed")
                    .optional("a", FieldType::Int32)
                    .field("b", FieldType::Bool)
                    .optional("c", FieldType::string())
                    .field("d", FieldType::Int64),
            )
            .build()
            .unwrap();
        let layout = catalog.layout(catalog.struct_id("Mixed").unwrap()).unwrap();

        assert_eq!(layout.bitmask_size(), 1);
        assert_eq!(
            layout.field(0).unwrap().placement,
            Placement::Fixed { offset: 1, size: 4 }
        );
        assert_eq!(
            layout.field(1).unwrap().placement,
            Placement::Fixed { offset: 5, size: 1 }
        );
        assert_eq!(
            layout.field(2).unwrap().placement,
            Placement::Variable { slot: 0 }
        );
        assert_eq!(
            layout.field(3).unwrap().placement,
            Placement::Fixed { offset: 6, size: 8 }
        );
        assert_eq!(layout.field(0).unwrap().null_bit, Some(0));
        assert_eq!(layout.field(2).unwrap().null_bit, Some(1));
        assert_eq!(layout.field(3).unwrap().null_bit, None);
        assert_eq!(layout.slot_position(0), 14);
        assert_eq!(layout.variable_block_start(), 18);
        assert_eq!(layout.fixed_size(), None);
    }

    #[test]
    fn nine_nullable_fields_need_two_bitmask_bytes() {
        let mut def = StructDef::new("Wide");
        for i in 0..9 {
            def = def.optional(format!("f{}", i), FieldType::Bool);
        }
        let catalog = Catalog::builder().with_struct(def).build().unwrap();
        let layout = &catalog.structs()[0];

        assert_eq!(layout.bitmask_size(), 2);
        assert_eq!(layout.fixed_size(), Some(11));
    }

    #[test]
    fn fixed_nested_struct_is_inline() {
        let catalog = Catalog::builder()
            .with_struct(
                StructDef::new("Transform")
                    .optional("position", FieldType::record("Vec3"))
                    .field("scale", FieldType::Float32),
            )
            .with_struct(vec3())
            .build()
            .unwrap();
        let layout = catalog
            .layout(catalog.struct_id("Transform").unwrap())
            .unwrap();

        assert_eq!(
            layout.field(0).unwrap().placement,
            Placement::Fixed {
                offset: 1,
                size: 12
            }
        );
        assert_eq!(layout.fixed_size(), Some(17));
    }

    #[test]
    fn self_referencing_struct_is_variable() {
        let catalog = Catalog::builder()
            .with_struct(
                StructDef::new("Node")
                    .field("value", FieldType::Int32)
                    .optional("next", FieldType::record("Node")),
            )
            .build()
            .unwrap();
        let layout = &catalog.structs()[0];

        assert_eq!(
            layout.field(1).unwrap().placement,
            Placement::Variable { slot: 0 }
        );
        assert_eq!(layout.max_size(), MAX_PACKET_SIZE);
    }

    #[test]
    fn mutually_recursive_structs_are_both_variable() {
        let catalog = Catalog::builder()
            .with_struct(StructDef::new("A").optional("b", FieldType::record("B")))
            .with_struct(StructDef::new("B").optional("a", FieldType::record("A")))
            .build()
            .unwrap();

        assert!(catalog.structs().iter().all(|s| s.fixed_size().is_none()));
    }

    #[test]
    fn max_size_sums_variable_maxima() {
        let catalog = Catalog::builder()
            .with_struct(
                StructDef::new("Chat")
                    .field("channel", FieldType::UInt8)
                    .optional("text", FieldType::string_max(200)),
            )
            .build()
            .unwrap();

        assert_eq!(catalog.structs()[0].max_size(), 1 + 1 + 4 + 2 + 200);
    }

    #[test]
    fn duplicate_struct_name_fails() {
        let err = Catalog::builder()
            .with_struct(vec3())
            .with_struct(vec3())
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("struct 'Vec3' already defined"));
    }

    #[test]
    fn unknown_struct_reference_fails_with_field_path() {
        let err = Catalog::builder()
            .with_struct(StructDef::new("Holder").field("inner", FieldType::record("Missing")))
            .build()
            .unwrap_err();
        let message = crate::error::describe(&err);
        assert!(message.contains("Holder.inner"));
        assert!(message.contains("unknown struct 'Missing'"));
    }

    #[test]
    fn maximum_above_shared_ceiling_fails() {
        let err = Catalog::builder()
            .with_struct(
                StructDef::new("Huge").field("s", FieldType::string_max(MAX_COLLECTION_LEN + 1)),
            )
            .build()
            .unwrap_err();
        assert!(crate::error::describe(&err).contains("exceeds shared ceiling"));
    }

    #[test]
    fn duplicate_variant_tag_fails() {
        let err = Catalog::builder()
            .with_struct(vec3())
            .with_struct(StructDef::new("Other").field("v", FieldType::Int8))
            .with_family(FamilyDef::new("Shape").variant(0, "Vec3").variant(0, "Other"))
            .build()
            .unwrap_err();
        assert_eq!(
            kind_of(&err),
            Some(&ProtocolError::DuplicateVariantTag {
                family: "Shape".to_string(),
                tag: 0
            })
        );
    }

    #[test]
    fn enum_with_zero_values_fails() {
        let err = Catalog::builder()
            .with_struct(StructDef::new("E").field("k", FieldType::enumeration("Kind", 0)))
            .build()
            .unwrap_err();
        assert!(crate::error::describe(&err).contains("enum 'Kind'"));
    }

    #[test]
    fn struct_dictionary_key_fails() {
        let err = Catalog::builder()
            .with_struct(vec3())
            .with_struct(StructDef::new("Map").field(
                "m",
                FieldType::dict(FieldType::record("Vec3"), FieldType::Int32),
            ))
            .build()
            .unwrap_err();
        assert!(crate::error::describe(&err).contains("dictionary keys must be"));
    }

    #[test]
    fn duplicate_field_name_fails() {
        let err = Catalog::builder()
            .with_struct(
                StructDef::new("Dup")
                    .field("a", FieldType::Int8)
                    .field("a", FieldType::Int16),
            )
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("declared twice"));
    }

    #[test]
    fn family_lookup_by_tag_and_struct() {
        let catalog = Catalog::builder()
            .with_struct(vec3())
            .with_struct(StructDef::new("Other").field("v", FieldType::Int8))
            .with_family(FamilyDef::new("Shape").variant(4, "Vec3").variant(7, "Other"))
            .build()
            .unwrap();
        let family = catalog
            .family(catalog.family_id("Shape").unwrap())
            .unwrap();
        let other = catalog.struct_id("Other").unwrap();

        assert_eq!(family.struct_for(7), Some(other));
        assert_eq!(family.struct_for(5), None);
        assert_eq!(family.tag_of(other), Some(7));
        assert_eq!(family.max_size(), 1 + 12);
    }

    #[test]
    fn unknown_struct_id_is_illegal_argument() {
        let catalog = Catalog::builder().with_struct(vec3()).build().unwrap();
        let err = catalog.layout(StructId(9)).unwrap_err();
        assert!(matches!(
            kind_of(&err),
            Some(ProtocolError::IllegalArgument(_))
        ));
    }
}
