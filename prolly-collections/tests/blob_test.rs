//! Blob behavior tests
//!
//! Byte-level chunking, the seekable reader, and splice determinism.

use prolly_collections::{Blob, MemoryStore};
use prolly_core::store::ChunkStore;
use std::io::SeekFrom;
use std::sync::Arc;

fn store() -> Arc<dyn ChunkStore> {
    Arc::new(MemoryStore::new())
}

/// Deterministic pseudo-random bytes for multi-chunk fixtures
fn noise(len: usize, seed: u64) -> Vec<u8> {
    let mut state = seed;
    (0..len)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (state >> 33) as u8
        })
        .collect()
}

/// 1000 recognizable bytes: position i holds (i * 7 + 3) mod 256
fn patterned() -> Vec<u8> {
    (0u64..1000).map(|i| (i * 7 + 3) as u8).collect()
}

#[tokio::test]
async fn test_bytes_round_trip() {
    let data = patterned();
    let blob = Blob::new(store(), data.clone()).await.unwrap();
    assert_eq!(blob.len(), 1000);
    assert_eq!(blob.bytes().await.unwrap(), data);
}

#[tokio::test]
async fn test_read_at_window() {
    let data = noise(60_000, 0x1234);
    let blob = Blob::new(store(), data.clone()).await.unwrap();
    assert_eq!(
        blob.read_at(30_000, 64).await.unwrap(),
        &data[30_000..30_064]
    );
    // clamps at the end
    assert_eq!(blob.read_at(59_990, 100).await.unwrap(), &data[59_990..]);
    assert!(blob.read_at(60_000, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_blob() {
    let blob = Blob::empty(store());
    assert!(blob.is_empty());
    let mut reader = blob.reader().await.unwrap();
    assert_eq!(reader.read().await.unwrap(), None);
}

#[tokio::test]
async fn test_reader_seek_and_read() {
    let data = patterned();
    let blob = Blob::new(store(), data.clone()).await.unwrap();
    let mut reader = blob.reader().await.unwrap();

    // absolute seek: the next read starts exactly there
    reader.seek(SeekFrom::Start(500)).await.unwrap();
    let chunk = reader.read().await.unwrap().unwrap();
    assert_eq!(chunk[0], data[500]);

    // relative to the end
    let pos = reader.seek(SeekFrom::End(-100)).await.unwrap();
    assert_eq!(pos, 900);
    let chunk = reader.read().await.unwrap().unwrap();
    assert_eq!(chunk[0], data[900]);

    // relative to the current position (now at the end)
    let pos = reader.seek(SeekFrom::Current(-1000)).await.unwrap();
    assert_eq!(pos, 0);
    let chunk = reader.read().await.unwrap().unwrap();
    assert_eq!(chunk[0], data[0]);
}

#[tokio::test]
async fn test_seek_edges() {
    let blob = Blob::new(store(), patterned()).await.unwrap();
    let mut reader = blob.reader().await.unwrap();

    // negative target fails fast
    assert!(reader.seek(SeekFrom::Current(-1)).await.is_err());
    assert!(reader.seek(SeekFrom::End(-2000)).await.is_err());

    // past-end clamps; reading there yields nothing
    let pos = reader.seek(SeekFrom::Start(10_000)).await.unwrap();
    assert_eq!(pos, 1000);
    assert_eq!(reader.read().await.unwrap(), None);
}

#[tokio::test]
async fn test_multi_chunk_blob() {
    let data = noise(60_000, 0xfeed);
    let blob = Blob::new(store(), data.clone()).await.unwrap();
    assert!(blob.sequence().is_meta(), "60k noise bytes should chunk");

    // reading chunk-at-a-time reassembles the contents
    let mut reader = blob.reader().await.unwrap();
    let mut assembled = Vec::new();
    let mut chunks = 0;
    while let Some(chunk) = reader.read().await.unwrap() {
        assert!(!chunk.is_empty());
        assembled.extend_from_slice(&chunk);
        chunks += 1;
    }
    assert_eq!(assembled, data);
    assert!(chunks > 4, "expected several chunks, got {}", chunks);
    assert_eq!(reader.position(), blob.len());
}

#[tokio::test]
async fn test_read_resumes_mid_chunk_after_seek() {
    let data = noise(60_000, 0xbeef);
    let blob = Blob::new(store(), data.clone()).await.unwrap();
    let mut reader = blob.reader().await.unwrap();

    reader.seek(SeekFrom::Start(31_337)).await.unwrap();
    let chunk = reader.read().await.unwrap().unwrap();
    assert_eq!(chunk[..], data[31_337..31_337 + chunk.len()]);

    // the following read continues where the chunk ended
    let next_start = 31_337 + chunk.len();
    if let Some(next) = reader.read().await.unwrap() {
        assert_eq!(next[..], data[next_start..next_start + next.len()]);
    }
}

#[tokio::test]
async fn test_splice_determinism() {
    let st = store();
    let data = noise(40_000, 0xabcd);
    let blob = Blob::new(st.clone(), data.clone()).await.unwrap();

    // cut 100 bytes out of the middle, then put them back
    let cut = blob.splice(20_000, 100, vec![]).await.unwrap();
    assert_eq!(cut.len(), 39_900);
    let restored = cut
        .splice(20_000, 0, data[20_000..20_100].to_vec())
        .await
        .unwrap();
    assert_eq!(restored.hash(), blob.hash());

    // an edited blob matches bulk construction of the edited bytes
    let mut edited = data;
    edited.splice(10_000..10_010, [0xAA; 4]);
    let spliced = blob
        .splice(10_000, 10, vec![0xAA; 4])
        .await
        .unwrap();
    let reference = Blob::new(st, edited).await.unwrap();
    assert_eq!(spliced.hash(), reference.hash());
}

#[tokio::test]
async fn test_splice_bounds_checked() {
    let blob = Blob::new(store(), patterned()).await.unwrap();
    assert!(blob.splice(1001, 0, vec![]).await.is_err());
    assert!(blob.splice(900, 200, vec![]).await.is_err());
}
