//! Integration tests for building and caching the offset index

use std::path::{Path, PathBuf};

use nightwatch_core::{ElementKind, Member, Tags, Way};
use nightwatch_pbf::writer::encode_blob_header;
use nightwatch_pbf::{
    BlobEncoding, BlockBuilder, ContainerWriter, Error, IndexBuilder, IndexConfig,
};
use tempfile::TempDir;

fn config() -> IndexConfig {
    IndexConfig {
        max_concurrent_decodes: 8,
        ..Default::default()
    }
}

fn write_container(dir: &Path, blocks: &[BlockBuilder]) -> (PathBuf, Vec<u64>) {
    let mut writer = ContainerWriter::new(Vec::new(), BlobEncoding::Zlib).unwrap();
    let offsets = blocks
        .iter()
        .map(|block| writer.push_block(block).unwrap())
        .collect();
    let path = dir.join("extract.pbf");
    std::fs::write(&path, writer.finish().unwrap()).unwrap();
    (path, offsets)
}

fn node_blocks(count: i64) -> Vec<BlockBuilder> {
    (0..count)
        .map(|i| {
            let mut block = BlockBuilder::new();
            block.dense_nodes(&[i * 1_000 + 1, i * 1_000 + 2, i * 1_000 + 500]);
            block
        })
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_node_only_container() {
    let dir = TempDir::new().unwrap();
    let (path, offsets) = write_container(dir.path(), &node_blocks(40));

    let index = IndexBuilder::new(config()).build(&path).await.unwrap();

    let nodes = index.table(ElementKind::Node);
    assert_eq!(nodes.len(), 40);
    assert!(nodes.windows(2).all(|w| w[0].first_id < w[1].first_id));
    for (i, entry) in nodes.iter().enumerate() {
        assert_eq!(entry.first_id, i as i64 * 1_000 + 1);
        assert_eq!(entry.offset, offsets[i] as i64);
    }
    assert!(index.table(ElementKind::Way).is_empty());
    assert!(index.table(ElementKind::Relation).is_empty());
}

#[tokio::test]
async fn test_mixed_container() {
    let dir = TempDir::new().unwrap();
    let mut nodes = BlockBuilder::new();
    nodes.dense_nodes(&[1, 2, 3]);
    let mut ways = BlockBuilder::new();
    ways.ways(&[Way::new(10, vec![1, 2]), Way::new(11, vec![2, 3])]);
    let mut relations = BlockBuilder::new();
    relations.relation(
        20,
        &[Member::new(10, "outer", ElementKind::Way)],
        &Tags::default(),
    );

    let (path, offsets) = write_container(dir.path(), &[nodes, ways, relations]);
    let index = IndexBuilder::new(config()).build(&path).await.unwrap();

    assert_eq!(index.lookup(ElementKind::Node, 2), Some(offsets[0] as i64));
    assert_eq!(index.lookup(ElementKind::Way, 11), Some(offsets[1] as i64));
    assert_eq!(index.lookup(ElementKind::Relation, 20), Some(offsets[2] as i64));
    assert_eq!(index.path(), path.as_path());
}

#[tokio::test]
async fn test_cache_is_written_and_reused() {
    let dir = TempDir::new().unwrap();
    let (path, _) = write_container(dir.path(), &node_blocks(5));
    let cache_path = dir.path().join("extract.pbf.index");

    let built = IndexBuilder::new(config()).build(&path).await.unwrap();
    assert!(cache_path.exists());
    assert_eq!(
        std::fs::metadata(&cache_path).unwrap().len(),
        12 + 5 * 16
    );

    // With the container gone, only the cache can answer
    std::fs::remove_file(&path).unwrap();
    let cached = IndexBuilder::new(config()).build(&path).await.unwrap();
    assert_eq!(cached, built);

    let rebuild = IndexConfig {
        ignore_cache: true,
        ..config()
    };
    assert!(matches!(
        IndexBuilder::new(rebuild).build(&path).await,
        Err(Error::Io(_))
    ));
}

#[tokio::test]
async fn test_write_cache_disabled() {
    let dir = TempDir::new().unwrap();
    let (path, _) = write_container(dir.path(), &node_blocks(2));
    let config = IndexConfig {
        write_cache: false,
        ..config()
    };

    IndexBuilder::new(config).build(&path).await.unwrap();
    assert!(!dir.path().join("extract.pbf.index").exists());
}

#[tokio::test]
async fn test_header_only_container() {
    let dir = TempDir::new().unwrap();
    let (path, _) = write_container(dir.path(), &[]);
    let index = IndexBuilder::new(config()).build(&path).await.unwrap();
    for kind in ElementKind::ALL {
        assert!(index.table(kind).is_empty());
    }
}

#[tokio::test]
async fn test_truncated_header_blob_is_fatal_and_not_cached() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cut.pbf");

    let header = encode_blob_header("OSMHeader", 4_096);
    let mut bytes = (header.len() as u32).to_be_bytes().to_vec();
    bytes.extend_from_slice(&header);
    bytes.extend_from_slice(&[0u8; 10]);
    std::fs::write(&path, bytes).unwrap();

    let config = config();
    let err = IndexBuilder::new(config.clone()).build(&path).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Decode(nightwatch_core::Error::Truncated {
            needed: 4_096,
            available: 10
        })
    ));
    assert!(!config.cache_path(&path).exists());
}

#[tokio::test]
async fn test_container_without_header_blob() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("headless.pbf");

    let mut block = BlockBuilder::new();
    block.dense_nodes(&[1]);
    let blob = nightwatch_pbf::writer::encode_blob(&block.encode(), BlobEncoding::Raw).unwrap();
    let header = encode_blob_header("OSMData", blob.len());
    let mut bytes = (header.len() as u32).to_be_bytes().to_vec();
    bytes.extend_from_slice(&header);
    bytes.extend_from_slice(&blob);
    std::fs::write(&path, bytes).unwrap();

    let err = IndexBuilder::new(config()).build(&path).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Decode(nightwatch_core::Error::UnexpectedBlobType { .. })
    ));
}

#[tokio::test]
async fn test_truncated_container_is_fatal() {
    let dir = TempDir::new().unwrap();
    let (path, _) = write_container(dir.path(), &node_blocks(3));
    let bytes = std::fs::read(&path).unwrap();
    std::fs::write(&path, &bytes[..bytes.len() - 7]).unwrap();

    let err = IndexBuilder::new(config()).build(&path).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Decode(nightwatch_core::Error::Truncated { .. })
    ));
}

fn container_with_trailing_blob(dir: &Path, blob: &[u8]) -> PathBuf {
    let mut writer = ContainerWriter::new(Vec::new(), BlobEncoding::Zlib).unwrap();
    writer.push_block(&node_blocks(1)[0]).unwrap();
    writer.push_raw_blob("OSMData", blob).unwrap();

    let path = dir.join("corrupt.pbf");
    std::fs::write(&path, writer.finish().unwrap()).unwrap();
    path
}

#[tokio::test]
async fn test_size_mismatch_is_fatal() {
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use nightwatch_core::wire::{put_bytes_field, put_varint_field};
    use std::io::Write;

    let payload = node_blocks(1)[0].encode();
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&payload).unwrap();

    let mut blob = Vec::new();
    put_varint_field(&mut blob, 2, payload.len() as u64 + 100);
    put_bytes_field(&mut blob, 3, &encoder.finish().unwrap());

    let dir = TempDir::new().unwrap();
    let path = container_with_trailing_blob(dir.path(), &blob);
    let err = IndexBuilder::new(config()).build(&path).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Decode(nightwatch_core::Error::SizeMismatch { .. })
    ));
}

#[tokio::test]
async fn test_corrupt_blob_is_fatal() {
    use nightwatch_core::wire::{put_bytes_field, put_varint_field};

    let mut blob = Vec::new();
    put_varint_field(&mut blob, 2, 4_096);
    put_bytes_field(&mut blob, 3, b"not deflate");

    let dir = TempDir::new().unwrap();
    let path = container_with_trailing_blob(dir.path(), &blob);
    let err = IndexBuilder::new(config()).build(&path).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Decode(nightwatch_core::Error::Decompression(_))
    ));
}

#[tokio::test]
async fn test_build_index_convenience() {
    let dir = TempDir::new().unwrap();
    let (path, _) = write_container(dir.path(), &node_blocks(3));
    let index = nightwatch_pbf::build_index(&path, true).await.unwrap();
    assert_eq!(index.table(ElementKind::Node).len(), 3);
}
