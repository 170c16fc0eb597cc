//! Selective Relation Decoding
//!
//! Relations are the only elements decoded in full, and usually only a small
//! fraction of them is wanted. Two entry points share one parser:
//!
//! - **Filtered scan**: every relation blob, with tag filters and no id allow-list
//! - **Targeted load**: the blobs that bucket a set of wanted ids, with the
//!   allow-list and no tag filters
//!
//! ## Rejection Cost
//!
//! Each relation is sliced out of its group by its length prefix before any of
//! its fields are read. Rejecting a relation by id reads only the id; rejecting
//! it by tags reads its key indices and never touches members.
//!
//! ## Transitive Closure
//!
//! [`RelationLoader::load`] follows relation members that are themselves
//! relations. After each pass the unresolved child ids are bucketed through the
//! [`OffsetIndex`] and loaded by a targeted pass. Every id is requested at most
//! once, so the loop ends even when a referenced relation is not in the file.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use nightwatch_core::varint::decode_varint_u64;
use nightwatch_core::wire::{self, DeltaIds, PackedVarints, WireType};
use nightwatch_core::{ElementFilter, ElementKind, Error, Member, Relation, Tags};
use tracing::{info, warn};

use crate::blob::{BlobDecoder, BlobReader};
use crate::config::IndexConfig;
use crate::filter::{BlobTagFilter, IndexedTagFilters, KeyMatch};
use crate::gate::DecodeGate;
use crate::index::OffsetIndex;
use crate::pool::BufferPool;

const BLOCK: &str = "primitive block";
const GROUP: &str = "primitive group";
const RELATION: &str = "relation";

/// Decode the relations of one blob payload.
///
/// `wanted` restricts the result to those ids; `filters` keeps only relations
/// whose tags match. Other element kinds in the block are skipped.
pub fn parse_relations(
    payload: &[u8],
    wanted: Option<&HashSet<i64>>,
    filters: Option<&IndexedTagFilters>,
) -> nightwatch_core::Result<Vec<Relation>> {
    let mut cur = payload;
    let mut string_table = None;
    let mut groups = Vec::new();

    while !cur.is_empty() {
        let key = wire::read_key(&mut cur, BLOCK)?;
        match (key.field, key.wire_type) {
            (1, WireType::LengthDelimited) => {
                string_table = Some(wire::read_len_delimited(&mut cur)?)
            }
            (2, WireType::LengthDelimited) => groups.push(wire::read_len_delimited(&mut cur)?),
            (17..=20, WireType::Varint) => wire::skip_value(&mut cur, key.wire_type)?,
            _ => return Err(key.unexpected(BLOCK)),
        }
    }

    let strings = match string_table {
        Some(table) => read_string_table(table)?,
        None => Vec::new(),
    };
    let tag_filter = filters.map(|f| f.resolve(&strings));
    if tag_filter.as_ref().is_some_and(BlobTagFilter::is_empty) {
        return Ok(Vec::new());
    }

    let parser = RelationParser {
        strings: &strings,
        wanted,
        tag_filter: tag_filter.as_ref(),
    };

    let mut relations = Vec::new();
    for mut group in groups {
        while !group.is_empty() {
            let key = wire::read_key(&mut group, GROUP)?;
            match (key.field, key.wire_type) {
                (4, WireType::LengthDelimited) => {
                    let record = wire::read_len_delimited(&mut group)?;
                    if let Some(relation) = parser.parse(record)? {
                        relations.push(relation);
                    }
                }
                // nodes, dense nodes, ways, changesets
                (1 | 2 | 3 | 5, WireType::LengthDelimited) => {
                    wire::skip_value(&mut group, key.wire_type)?
                }
                _ => return Err(key.unexpected(GROUP)),
            }
        }
    }
    Ok(relations)
}

/// Split a `StringTable` message into its entries without decoding them
fn read_string_table(mut table: &[u8]) -> nightwatch_core::Result<Vec<&[u8]>> {
    let mut strings = Vec::new();
    while !table.is_empty() {
        let (field, value) = wire::read_bytes_field(&mut table, "string table")?;
        if field != 1 {
            return Err(Error::UnexpectedField {
                context: "string table",
                field,
                wire_type: WireType::LengthDelimited.as_u8(),
            });
        }
        strings.push(value);
    }
    Ok(strings)
}

struct RelationParser<'a> {
    strings: &'a [&'a [u8]],
    wanted: Option<&'a HashSet<i64>>,
    tag_filter: Option<&'a BlobTagFilter>,
}

/// Field slices of one relation, borrowed from the record
#[derive(Default)]
struct RelationFields<'a> {
    keys: &'a [u8],
    vals: &'a [u8],
    roles: &'a [u8],
    memids: &'a [u8],
    types: &'a [u8],
}

impl<'a> RelationParser<'a> {
    fn parse(&self, mut record: &'a [u8]) -> nightwatch_core::Result<Option<Relation>> {
        wire::expect_key(&mut record, 1, WireType::Varint, RELATION)?;
        let id = decode_varint_u64(&mut record)? as i64;
        if self.wanted.is_some_and(|wanted| !wanted.contains(&id)) {
            return Ok(None);
        }

        let mut fields = RelationFields::default();
        let mut accepted = self.tag_filter.is_none();
        let mut pending_values = None;
        while !record.is_empty() {
            let key = wire::read_key(&mut record, RELATION)?;
            if key.wire_type != WireType::LengthDelimited {
                return Err(key.unexpected(RELATION));
            }
            let value = wire::read_len_delimited(&mut record)?;
            match key.field {
                2 => {
                    fields.keys = value;
                    if let Some(filter) = self.tag_filter {
                        match match_keys(filter, value)? {
                            KeyStage::Accepted => accepted = true,
                            KeyStage::Rejected => return Ok(None),
                            KeyStage::Pending(expected) => pending_values = Some(expected),
                        }
                    }
                }
                3 => fields.vals = value,
                // info
                4 => {}
                8 => fields.roles = value,
                9 => fields.memids = value,
                10 => fields.types = value,
                _ => return Err(key.unexpected(RELATION)),
            }
        }

        if !accepted {
            let by_value = match &pending_values {
                Some(expected) => match_values(expected, fields.vals)?,
                None => false,
            };
            if !by_value {
                return Ok(None);
            }
        }

        Ok(Some(Relation {
            id,
            tags: self.decode_tags(&fields)?,
            members: self.decode_members(&fields)?,
        }))
    }

    fn decode_tags(&self, fields: &RelationFields<'_>) -> nightwatch_core::Result<Tags> {
        let keys = collect_indices(fields.keys)?;
        let vals = collect_indices(fields.vals)?;
        if keys.len() != vals.len() {
            return Err(Error::Schema(format!(
                "relation has {} tag keys but {} values",
                keys.len(),
                vals.len()
            )));
        }

        let mut tags = Tags::with_capacity(keys.len());
        for (key, val) in keys.into_iter().zip(vals) {
            tags.insert(self.string(key)?, self.string(val)?);
        }
        Ok(tags)
    }

    fn decode_members(&self, fields: &RelationFields<'_>) -> nightwatch_core::Result<Vec<Member>> {
        let roles = collect_indices(fields.roles)?;
        let ids = DeltaIds::new(fields.memids).collect::<nightwatch_core::Result<Vec<_>>>()?;
        let types = PackedVarints::new(fields.types)
            .map(|t| t.and_then(ElementKind::from_member_type))
            .collect::<nightwatch_core::Result<Vec<_>>>()?;
        if roles.len() != ids.len() || ids.len() != types.len() {
            return Err(Error::Schema(format!(
                "relation member arrays disagree: {} roles, {} ids, {} types",
                roles.len(),
                ids.len(),
                types.len()
            )));
        }

        roles
            .into_iter()
            .zip(ids)
            .zip(types)
            .map(|((role, id), kind)| Ok(Member::new(id, self.string(role)?, kind)))
            .collect()
    }

    fn string(&self, index: u32) -> nightwatch_core::Result<&'a str> {
        let bytes = self.strings.get(index as usize).ok_or_else(|| {
            Error::Schema(format!(
                "string index {} outside table of {}",
                index,
                self.strings.len()
            ))
        })?;
        std::str::from_utf8(bytes).map_err(|_| Error::InvalidUtf8)
    }
}

enum KeyStage {
    Accepted,
    Rejected,
    /// Accepted if the value at one of these key positions is in its set
    Pending(Vec<(usize, HashSet<u32>)>),
}

fn match_keys(filter: &BlobTagFilter, keys: &[u8]) -> nightwatch_core::Result<KeyStage> {
    let mut expected = Vec::new();
    for (position, key) in PackedVarints::new(keys).enumerate() {
        let Ok(key) = u32::try_from(key?) else {
            continue;
        };
        match filter.match_key(key) {
            KeyMatch::Accept => return Ok(KeyStage::Accepted),
            KeyMatch::Values(values) => expected.push((position, values.clone())),
            KeyMatch::Miss => {}
        }
    }
    if expected.is_empty() {
        Ok(KeyStage::Rejected)
    } else {
        Ok(KeyStage::Pending(expected))
    }
}

fn match_values(expected: &[(usize, HashSet<u32>)], vals: &[u8]) -> nightwatch_core::Result<bool> {
    let mut remaining = expected.iter().peekable();
    for (position, value) in PackedVarints::new(vals).enumerate() {
        let value = value?;
        let Some((expected_position, accepted)) = remaining.peek() else {
            break;
        };
        if position == *expected_position {
            if u32::try_from(value).is_ok_and(|v| accepted.contains(&v)) {
                return Ok(true);
            }
            remaining.next();
        }
    }
    Ok(false)
}

fn collect_indices(packed: &[u8]) -> nightwatch_core::Result<Vec<u32>> {
    PackedVarints::new(packed)
        .map(|v| {
            let v = v?;
            u32::try_from(v)
                .map_err(|_| Error::Schema(format!("string index {} out of range", v)))
        })
        .collect()
}

/// Loads relations from a container through its [`OffsetIndex`]
pub struct RelationLoader<'a> {
    index: &'a OffsetIndex,
    config: IndexConfig,
    pool: Arc<BufferPool>,
    decoder: BlobDecoder,
}

impl<'a> RelationLoader<'a> {
    pub fn new(index: &'a OffsetIndex, config: IndexConfig) -> Self {
        let pool = BufferPool::new(config.pool_buffers_per_class);
        let decoder = BlobDecoder::zlib(Arc::clone(&pool));
        Self {
            index,
            config,
            pool,
            decoder,
        }
    }

    pub fn with_decoder(mut self, decoder: BlobDecoder) -> Self {
        self.pool = Arc::clone(decoder.pool());
        self.decoder = decoder;
        self
    }

    /// Every relation matching `filters`, plus all relations they transitively contain
    pub async fn load(&self, filters: &[ElementFilter]) -> crate::Result<HashMap<i64, Relation>> {
        let indexed = IndexedTagFilters::for_kind(filters, ElementKind::Relation).map(Arc::new);
        let offsets: Vec<u64> = self
            .index
            .offsets(ElementKind::Relation)
            .map(to_file_offset)
            .collect::<crate::Result<_>>()?;

        let work = offsets.into_iter().map(|offset| (offset, None)).collect();
        let scanned = self.run_pass(work, indexed).await?;
        info!(
            path = ?self.index.path(),
            blobs = self.index.table(ElementKind::Relation).len(),
            relations = scanned.len(),
            "Scanned relation blobs"
        );

        let mut relations = HashMap::with_capacity(scanned.len());
        insert_all(&mut relations, scanned);
        self.close_over_children(relations, HashSet::new()).await
    }

    /// The relations with the given ids, plus all relations they transitively contain
    pub async fn load_by_id(
        &self,
        ids: impl IntoIterator<Item = i64>,
    ) -> crate::Result<HashMap<i64, Relation>> {
        let ids: HashSet<i64> = ids.into_iter().collect();
        let loaded = self.load_targeted(&ids).await?;
        let mut relations = HashMap::with_capacity(loaded.len());
        insert_all(&mut relations, loaded);
        self.close_over_children(relations, ids).await
    }

    async fn close_over_children(
        &self,
        mut relations: HashMap<i64, Relation>,
        mut requested: HashSet<i64>,
    ) -> crate::Result<HashMap<i64, Relation>> {
        let mut pass = 1;
        loop {
            let pending: HashSet<i64> = relations
                .values()
                .flat_map(Relation::child_relations)
                .filter(|id| !relations.contains_key(id) && !requested.contains(id))
                .collect();
            if pending.is_empty() {
                break;
            }

            requested.extend(&pending);
            let loaded = self.load_targeted(&pending).await?;
            info!(
                pass,
                pending = pending.len(),
                loaded = loaded.len(),
                total = relations.len() + loaded.len(),
                "Resolved child relations"
            );
            insert_all(&mut relations, loaded);
            pass += 1;
        }

        let missing: Vec<i64> = requested
            .iter()
            .filter(|id| !relations.contains_key(id))
            .copied()
            .collect();
        if !missing.is_empty() {
            warn!(
                path = ?self.index.path(),
                missing = missing.len(),
                first_missing = missing.iter().min().copied(),
                "Referenced relations not found in container"
            );
        }
        Ok(relations)
    }

    async fn load_targeted(&self, ids: &HashSet<i64>) -> crate::Result<Vec<Relation>> {
        let buckets = self.index.bucket_offsets(ids.iter().copied(), ElementKind::Relation);
        let work = buckets
            .into_iter()
            .map(|bucket| Ok((to_file_offset(bucket.offset)?, Some(Arc::new(bucket.ids)))))
            .collect::<crate::Result<Vec<_>>>()?;
        self.run_pass(work, None).await
    }

    /// Read each listed blob in offset order and parse it on the decode workers
    async fn run_pass(
        &self,
        mut work: Vec<(u64, Option<Arc<HashSet<i64>>>)>,
        filters: Option<Arc<IndexedTagFilters>>,
    ) -> crate::Result<Vec<Relation>> {
        if work.is_empty() {
            return Ok(Vec::new());
        }
        work.sort_unstable_by_key(|(offset, _)| *offset);

        let mut reader = BlobReader::open(self.index.path(), Arc::clone(&self.pool)).await?;
        let mut gate = DecodeGate::new(self.config.max_concurrent_decodes);
        for (offset, wanted) in work {
            let blob = reader.blob_at(offset).await?;
            let decoder = self.decoder.clone();
            let filters = filters.clone();
            gate.dispatch(move || {
                let decoded = decoder.decode(&blob.data)?;
                drop(blob);
                Ok(parse_relations(
                    decoded.payload(),
                    wanted.as_deref(),
                    filters.as_deref(),
                )?)
            })
            .await?;
        }

        Ok(gate.finish().await?.into_iter().flatten().collect())
    }
}

fn insert_all(relations: &mut HashMap<i64, Relation>, loaded: Vec<Relation>) {
    for relation in loaded {
        relations.entry(relation.id).or_insert(relation);
    }
}

fn to_file_offset(offset: i64) -> crate::Result<u64> {
    u64::try_from(offset).map_err(|_| crate::Error::InvalidOffset(offset))
}

/// Load every relation matching `filters` and everything they contain
pub async fn load_relations(
    filters: &[ElementFilter],
    index: &OffsetIndex,
    config: IndexConfig,
) -> crate::Result<HashMap<i64, Relation>> {
    RelationLoader::new(index, config).load(filters).await
}

/// Load the relations with the given ids and everything they contain
pub async fn load_relations_by_id(
    ids: impl IntoIterator<Item = i64>,
    index: &OffsetIndex,
    config: IndexConfig,
) -> crate::Result<HashMap<i64, Relation>> {
    RelationLoader::new(index, config).load_by_id(ids).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::BlockBuilder;
    use nightwatch_core::Way;

    fn admin_boundary() -> Tags {
        [("boundary", "administrative"), ("admin_level", "8")]
            .into_iter()
            .collect()
    }

    fn block_with_relations() -> Vec<u8> {
        let mut block = BlockBuilder::new();
        block.relation(
            10,
            &[
                Member::new(1, "outer", ElementKind::Way),
                Member::new(20, "subarea", ElementKind::Relation),
            ],
            &admin_boundary(),
        );
        block.relation(
            20,
            &[Member::new(5, "label", ElementKind::Node)],
            &[("type", "multipolygon")].into_iter().collect(),
        );
        block.relation(30, &[], &Tags::default());
        block.encode()
    }

    fn relation_filter(filter: ElementFilter) -> IndexedTagFilters {
        IndexedTagFilters::for_kind(&[filter], ElementKind::Relation).unwrap()
    }

    #[test]
    fn test_parse_all() {
        let relations = parse_relations(&block_with_relations(), None, None).unwrap();
        assert_eq!(relations.len(), 3);

        let first = &relations[0];
        assert_eq!(first.id, 10);
        assert_eq!(first.tags, admin_boundary());
        assert_eq!(
            first.members,
            vec![
                Member::new(1, "outer", ElementKind::Way),
                Member::new(20, "subarea", ElementKind::Relation),
            ]
        );
        assert_eq!(first.child_relations().collect::<Vec<_>>(), vec![20]);
        assert!(relations[2].members.is_empty());
    }

    #[test]
    fn test_allow_list() {
        let wanted = HashSet::from([20, 99]);
        let relations = parse_relations(&block_with_relations(), Some(&wanted), None).unwrap();
        assert_eq!(relations.len(), 1);
        assert_eq!(relations[0].id, 20);
    }

    #[test]
    fn test_key_filter_accepts() {
        let filter = relation_filter(ElementFilter::new(ElementKind::Relation).with_key("boundary"));
        let relations = parse_relations(&block_with_relations(), None, Some(&filter)).unwrap();
        assert_eq!(relations.iter().map(|r| r.id).collect::<Vec<_>>(), vec![10]);
    }

    #[test]
    fn test_value_filter_rejects_other_values() {
        let filter = relation_filter(
            ElementFilter::new(ElementKind::Relation).with_values("boundary", ["postal_code"]),
        );
        let relations = parse_relations(&block_with_relations(), None, Some(&filter)).unwrap();
        assert!(relations.is_empty());

        let filter = relation_filter(
            ElementFilter::new(ElementKind::Relation)
                .with_values("boundary", ["postal_code", "administrative"]),
        );
        let relations = parse_relations(&block_with_relations(), None, Some(&filter)).unwrap();
        assert_eq!(relations.len(), 1);
    }

    #[test]
    fn test_value_must_sit_at_key_position() {
        // "8" is a value of admin_level, not of boundary
        let filter = relation_filter(
            ElementFilter::new(ElementKind::Relation).with_values("boundary", ["8"]),
        );
        let relations = parse_relations(&block_with_relations(), None, Some(&filter)).unwrap();
        assert!(relations.is_empty());
    }

    #[test]
    fn test_other_groups_are_skipped() {
        let mut block = BlockBuilder::new();
        block.dense_nodes(&[1, 2, 3]);
        block.ways(&[Way::new(4, vec![1, 2])]);
        block.relation(5, &[], &Tags::default());
        let relations = parse_relations(&block.encode(), None, None).unwrap();
        assert_eq!(relations.len(), 1);
    }

    #[test]
    fn test_mismatched_member_arrays_are_fatal() {
        use nightwatch_core::wire::{put_bytes_field, put_packed_delta_ids, put_packed_varints, put_varint_field};

        let mut relation = Vec::new();
        put_varint_field(&mut relation, 1, 7);
        put_packed_varints(&mut relation, 8, [0u64, 0]);
        put_packed_delta_ids(&mut relation, 9, &[1]);
        put_packed_varints(&mut relation, 10, [1u64]);
        let mut group = Vec::new();
        put_bytes_field(&mut group, 4, &relation);
        let mut table = Vec::new();
        put_bytes_field(&mut table, 1, b"");
        let mut block = Vec::new();
        put_bytes_field(&mut block, 1, &table);
        put_bytes_field(&mut block, 2, &group);

        assert!(matches!(
            parse_relations(&block, None, None).unwrap_err(),
            Error::Schema(_)
        ));
    }

    #[test]
    fn test_rejected_by_id_skips_malformed_body() {
        use nightwatch_core::wire::{put_bytes_field, put_varint_field};

        let mut relation = Vec::new();
        put_varint_field(&mut relation, 1, 7);
        // Garbage member arrays are never read for a rejected id
        put_bytes_field(&mut relation, 9, &[0xff]);
        let mut group = Vec::new();
        put_bytes_field(&mut group, 4, &relation);
        let mut block = Vec::new();
        put_bytes_field(&mut block, 2, &group);

        let wanted = HashSet::from([8]);
        assert!(parse_relations(&block, Some(&wanted), None).unwrap().is_empty());
    }

    /// One relation keyed `key_index` -> `val_index` whose member ids are not valid varints
    fn block_with_garbage_members(key_index: u64, val_index: u64) -> Vec<u8> {
        use nightwatch_core::wire::{put_bytes_field, put_packed_varints, put_varint_field};

        let mut strings = Vec::new();
        for s in ["", "type", "multipolygon", "boundary", "administrative", "postal_code"] {
            put_bytes_field(&mut strings, 1, s.as_bytes());
        }

        let mut relation = Vec::new();
        put_varint_field(&mut relation, 1, 7);
        put_packed_varints(&mut relation, 2, [key_index]);
        put_packed_varints(&mut relation, 3, [val_index]);
        put_bytes_field(&mut relation, 8, &[0]);
        put_bytes_field(&mut relation, 9, &[0xff]);
        put_bytes_field(&mut relation, 10, &[1]);
        let mut group = Vec::new();
        put_bytes_field(&mut group, 4, &relation);

        let mut block = Vec::new();
        put_bytes_field(&mut block, 1, &strings);
        put_bytes_field(&mut block, 2, &group);
        block
    }

    #[test]
    fn test_rejected_by_key_skips_malformed_members() {
        // type=multipolygon against a filter on boundary
        let block = block_with_garbage_members(1, 2);
        let filter = relation_filter(ElementFilter::new(ElementKind::Relation).with_key("boundary"));
        assert!(parse_relations(&block, None, Some(&filter)).unwrap().is_empty());

        // Accepted relations do decode their members
        assert!(parse_relations(&block, None, None).is_err());
    }

    #[test]
    fn test_rejected_by_value_skips_malformed_members() {
        // boundary=administrative against boundary=postal_code
        let block = block_with_garbage_members(3, 4);
        let filter = relation_filter(
            ElementFilter::new(ElementKind::Relation).with_values("boundary", ["postal_code"]),
        );
        assert!(parse_relations(&block, None, Some(&filter)).unwrap().is_empty());
    }
}
