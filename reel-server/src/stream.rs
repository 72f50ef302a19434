//! The request-scoped stream reader.
//!
//! A [`Stream`] presents a seekable, randomly-readable byte view over the
//! chunked, encrypted storage: reads are translated into chunk fetches
//! through the hot cache and stitched back together. Each successful chunk
//! fetch kicks a background prefetch of the next few chunks; prefetch tasks
//! observe a cancellation token tied to the stream's lifetime.

use std::collections::HashSet;
use std::io::SeekFrom;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use reel_cache::HotCache;
use reel_content::StreamDescriptor;
use reel_types::{MAX_BLOB_SIZE, MAX_CHUNK_SIZE};
use tokio_util::sync::CancellationToken;

use crate::error::PlayerError;
use crate::mime::{extension_by_type, patch_media_type};
use crate::player::Player;
use crate::resolve::Claim;

/// A decrypted chunk handed out by the stream.
///
/// Holds a shared reference into the hot cache; the bytes are immutable and
/// survive eviction for as long as this handle lives.
pub struct ReadableChunk(Arc<Vec<u8>>);

impl ReadableChunk {
    fn new(bytes: Arc<Vec<u8>>) -> Self {
        Self(bytes)
    }

    /// Plaintext length of the chunk.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the chunk is empty (never true for a healthy chunk).
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copy at most `min(max_len, len - offset)` bytes starting at `offset`
    /// into the front of `dest`. Fails when `offset` is past the end.
    pub fn read(
        &self,
        offset: usize,
        max_len: usize,
        dest: &mut [u8],
    ) -> Result<usize, PlayerError> {
        if offset >= self.0.len() {
            return Err(PlayerError::OutOfBounds);
        }
        let n = max_len.min(self.0.len() - offset).min(dest.len());
        dest[..n].copy_from_slice(&self.0[offset..offset + n]);
        Ok(n)
    }
}

/// The chunk span one read covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StreamRange {
    first_chunk: u64,
    last_chunk: u64,
    first_chunk_offset: u64,
    last_chunk_read_len: u64,
}

impl StreamRange {
    /// Requires `len > 0`.
    fn compute(offset: u64, len: usize) -> Self {
        let chunk = MAX_CHUNK_SIZE as u64;
        let end = offset + len as u64;
        let last_chunk = (end - 1) / chunk;
        Self {
            first_chunk: offset / chunk,
            last_chunk,
            first_chunk_offset: offset % chunk,
            last_chunk_read_len: end - last_chunk * chunk,
        }
    }

    /// (offset within chunk, bytes to read) for chunk `i` of the span.
    fn byte_range_for_chunk(&self, i: u64) -> (usize, usize) {
        let offset = if i == self.first_chunk {
            self.first_chunk_offset
        } else {
            0
        };
        let up_to = if i == self.last_chunk {
            self.last_chunk_read_len
        } else {
            MAX_CHUNK_SIZE as u64
        };
        (offset as usize, (up_to - offset) as usize)
    }
}

/// A single stream being served to a single request.
pub struct Stream {
    player: Arc<Player>,
    claim: Claim,
    /// The URI this stream was resolved from.
    pub uri: String,
    size: u64,
    content_type: String,
    sd: Option<Arc<StreamDescriptor>>,
    offset: u64,
    prefetched: HashSet<usize>,
    cancel: CancellationToken,
}

impl Stream {
    pub(crate) fn new(player: Arc<Player>, uri: String, claim: Claim) -> Self {
        Self {
            content_type: patch_media_type(&claim.media_type),
            size: claim.source_size.unwrap_or(0),
            uri,
            player,
            claim,
            sd: None,
            offset: 0,
            prefetched: HashSet::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Download the stream descriptor and determine the stream size, using
    /// legacy fallbacks for streams without authoritative metadata.
    pub async fn prepare(&mut self) -> Result<(), PlayerError> {
        let sd = self.player.hot().get_sd_blob(&self.claim.sd_hash).await?;
        self.sd = Some(sd);
        self.set_size().await;
        Ok(())
    }

    async fn set_size(&mut self) {
        if self.size > 0 {
            return;
        }

        if let Some(size) = self.claim.source_size {
            if size > 0 {
                self.size = size;
                return;
            }
        }

        match self.size_from_last_chunk().await {
            Ok(size) => {
                self.size = size;
                return;
            }
            Err(e) => {
                tracing::info!(
                    "couldn't figure out stream {} size from last chunk: {e}",
                    self.uri
                );
            }
        }

        let sd = self.sd.as_ref().expect("descriptor fetched in prepare");
        let mut size: u64 = 0;
        for info in sd.content_blobs() {
            if info.length == MAX_BLOB_SIZE {
                size += MAX_CHUNK_SIZE as u64;
            } else {
                size += info.length.saturating_sub(1) as u64;
            }
        }
        // Last padding is unguessable.
        self.size = size.saturating_sub(16);
    }

    /// Exact size from the descriptor and the decrypted last chunk.
    async fn size_from_last_chunk(&mut self) -> Result<u64, PlayerError> {
        let n = self.descriptor()?.content_blob_count();
        if n == 0 {
            return Ok(0);
        }
        let last = self.get_chunk(n - 1).await?;
        Ok(MAX_CHUNK_SIZE as u64 * (n as u64 - 1) + last.len() as u64)
    }

    fn descriptor(&self) -> Result<Arc<StreamDescriptor>, PlayerError> {
        self.sd
            .clone()
            .ok_or_else(|| PlayerError::Internal("stream not prepared".to_string()))
    }

    /// Total stream size in bytes. Zero until [`prepare`](Self::prepare) for
    /// streams without claim metadata.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Content type for the response, legacy types patched.
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// The resolved claim.
    pub fn claim(&self) -> &Claim {
        &self.claim
    }

    /// Stream creation time, for the `Last-Modified` header.
    pub fn timestamp(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(self.claim.timestamp.max(0) as u64)
    }

    /// Name of the original file, suitable for saving under on a filesystem.
    pub fn filename(&self) -> String {
        if let Some(name) = &self.claim.file_name {
            if !name.is_empty() {
                return name.clone();
            }
        }
        if let Some(sd) = &self.sd {
            if !sd.suggested_file_name.is_empty() {
                return sd.suggested_file_name.clone();
            }
        }
        let name = &self.claim.normalized_name;
        match extension_by_type(&self.content_type) {
            Some(ext) => format!("{name}.{ext}"),
            None => name.clone(),
        }
    }

    /// Reposition the stream.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64, PlayerError> {
        if self.size == 0 {
            return Err(PlayerError::StreamSizeZero);
        }

        let new_offset = match pos {
            SeekFrom::Start(offset) => {
                if offset > self.size {
                    return Err(PlayerError::OutOfBounds);
                }
                offset as i64
            }
            SeekFrom::Current(delta) => {
                if delta.unsigned_abs() > self.size {
                    return Err(PlayerError::OutOfBounds);
                }
                self.offset as i64 + delta
            }
            SeekFrom::End(delta) => {
                if delta.unsigned_abs() > self.size {
                    return Err(PlayerError::OutOfBounds);
                }
                self.size as i64 + delta
            }
        };

        if new_offset < 0 {
            return Err(PlayerError::SeekingBeforeStart);
        }

        self.offset = new_offset as u64;
        Ok(self.offset)
    }

    /// Read into `dest` at the current offset, advancing it. Returns 0 at
    /// end of stream.
    pub async fn read(&mut self, dest: &mut [u8]) -> Result<usize, PlayerError> {
        if self.offset >= self.size {
            return Ok(0);
        }
        let want = dest.len().min((self.size - self.offset) as usize);
        if want == 0 {
            return Ok(0);
        }

        let range = StreamRange::compute(self.offset, want);
        let read = match self.read_from_chunks(range, &mut dest[..want]).await {
            Ok(read) => read,
            Err(e) => {
                tracing::error!(
                    "failed to read from stream {} at offset {}: {e}",
                    self.uri,
                    self.offset
                );
                return Err(e);
            }
        };

        self.offset += read as u64;
        self.player
            .metrics()
            .out_bytes
            .fetch_add(read as u64, Ordering::Relaxed);

        if read == 0 {
            tracing::error!(
                "read 0 bytes from stream {} at offset {}, bailing out",
                self.uri,
                self.offset
            );
        }
        Ok(read)
    }

    /// One read, with a single retry after purging a chunk that yielded
    /// zero bytes (suspected cache corruption).
    async fn read_from_chunks(
        &mut self,
        range: StreamRange,
        dest: &mut [u8],
    ) -> Result<usize, PlayerError> {
        let mut read = 0;

        for _ in 0..2 {
            let (suspect, n) = self.attempt_read(range, dest).await?;
            read = n;
            if n > 0 {
                break;
            }

            self.remove_chunk(suspect as usize).await?;
            tracing::warn!(
                "read 0 bytes for {} at chunk {suspect} offset {}, purged and retrying",
                self.uri,
                self.offset
            );
        }

        Ok(read)
    }

    /// Walk the chunk span, copying slices into `dest`. Returns the index
    /// where the walk stopped and the bytes copied.
    async fn attempt_read(
        &mut self,
        range: StreamRange,
        dest: &mut [u8],
    ) -> Result<(u64, usize), PlayerError> {
        let mut read = 0usize;
        let mut i = range.first_chunk;

        while i <= range.last_chunk {
            let (offset, max_len) = range.byte_range_for_chunk(i);
            let chunk = self.get_chunk(i as usize).await?;
            let n = chunk.read(offset, max_len, &mut dest[read..])?;
            if n == 0 {
                break;
            }
            read += n;
            i += 1;
        }

        Ok((i, read))
    }

    /// Purge a chunk from the hot cache and the disk store.
    async fn remove_chunk(&self, index: usize) -> Result<(), PlayerError> {
        let sd = self.descriptor()?;
        if index >= sd.content_blob_count() {
            return Err(PlayerError::OutOfBounds);
        }
        let info = &sd.blobs[index];
        let hash = info
            .hash
            .as_ref()
            .ok_or_else(|| PlayerError::Internal("content blob without hash".to_string()))?;
        self.player.hot().clear_chunk(hash, &info.iv).await;
        Ok(())
    }

    /// Fetch the nth chunk of the stream, kicking prefetch of its successors.
    pub async fn get_chunk(&mut self, index: usize) -> Result<ReadableChunk, PlayerError> {
        let sd = self.descriptor()?;
        if index >= sd.content_blob_count() {
            return Err(PlayerError::OutOfBounds);
        }
        let info = &sd.blobs[index];
        let hash = info
            .hash
            .as_ref()
            .ok_or_else(|| PlayerError::Internal("content blob without hash".to_string()))?;

        let chunk = self.player.hot().get_chunk(hash, &sd.key, &info.iv).await?;

        self.maybe_prefetch(index + 1);
        Ok(ReadableChunk::new(chunk))
    }

    /// Schedule a background prefetch starting at `next`, once per index per
    /// stream.
    fn maybe_prefetch(&mut self, next: usize) {
        if !self.player.prefetch_enabled() {
            return;
        }
        let Some(sd) = self.sd.clone() else { return };
        if next >= sd.content_blob_count() {
            return;
        }
        if !self.prefetched.insert(next) {
            return;
        }

        let hot = Arc::clone(self.player.hot());
        let window = self.player.prefetch_window();
        let cancel = self.cancel.clone();
        let uri = self.uri.clone();
        tokio::spawn(prefetch_chunks(hot, sd, next, window, cancel, uri));
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        // Prefetch tasks observe this at their next iteration boundary.
        self.cancel.cancel();
    }
}

/// Fetch up to `window` chunks starting at `start`, skipping chunks that are
/// already hot. Errors end the task and never reach a response.
async fn prefetch_chunks(
    hot: Arc<HotCache>,
    sd: Arc<StreamDescriptor>,
    start: usize,
    window: usize,
    cancel: CancellationToken,
    uri: String,
) {
    let end = start.saturating_add(window).min(sd.content_blob_count());
    if start >= end {
        return;
    }
    tracing::debug!("prefetching {} chunks for {uri}", end - start);

    for info in &sd.blobs[start..end] {
        if cancel.is_cancelled() {
            tracing::debug!("prefetch for {uri} cancelled");
            return;
        }
        let Some(hash) = info.hash.as_ref() else {
            return;
        };
        if hot.is_chunk_cached(hash, &info.iv) {
            tracing::debug!("chunk {hash} already hot, not prefetching");
            continue;
        }
        if let Err(e) = hot.get_chunk(hash, &sd.key, &info.iv).await {
            tracing::error!("failed to prefetch chunk {hash}: {e}");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::FreeStreamVerifier;
    use crate::config::Config;
    use crate::resolve::StreamResolver;
    use crate::transcoder::NoopTranscoder;
    use async_trait::async_trait;
    use reel_cache::fixture::{seed_store, StreamFixture};
    use reel_cache::HotCacheConfig as CacheSizing;
    use reel_store::{BlobStore, MemStore};

    /// Resolver that never resolves; stream tests construct claims directly.
    struct NoResolver;

    #[async_trait]
    impl StreamResolver for NoResolver {
        async fn resolve(&self, uri: &str) -> Result<Claim, PlayerError> {
            Err(PlayerError::StreamNotFound {
                uri: uri.to_string(),
            })
        }
    }

    fn test_player(origin: MemStore, prefetch: bool) -> Arc<Player> {
        let mut config = Config::default();
        config.prefetch.enabled = prefetch;
        let hot = Arc::new(HotCache::new(Arc::new(origin), CacheSizing::default()));
        Arc::new(Player::new(
            config,
            hot,
            Arc::new(NoResolver),
            Arc::new(FreeStreamVerifier),
            Arc::new(NoopTranscoder),
        ))
    }

    fn test_claim(fixture: &StreamFixture, size: Option<u64>) -> Claim {
        Claim {
            name: "Test-Stream".into(),
            normalized_name: "test-stream".into(),
            sd_hash: fixture.sd_hash,
            media_type: "video/mp4".into(),
            source_size: size,
            file_name: None,
            timestamp: 1_600_000_000,
            fee_amount: 0.0,
        }
    }

    async fn prepared_stream(
        fixture: &StreamFixture,
        size: Option<u64>,
        prefetch: bool,
    ) -> Stream {
        let origin = MemStore::new();
        seed_store(&origin, fixture).await;
        let player = test_player(origin, prefetch);
        let mut stream = Stream::new(player, "test-stream".into(), test_claim(fixture, size));
        stream.prepare().await.unwrap();
        stream
    }

    fn random_bytes(len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        getrandom::getrandom(&mut buf).unwrap();
        buf
    }

    #[test]
    fn stream_range_single_chunk() {
        let r = StreamRange::compute(0, 20);
        assert_eq!(r.first_chunk, 0);
        assert_eq!(r.last_chunk, 0);
        assert_eq!(r.byte_range_for_chunk(0), (0, 20));
    }

    #[test]
    fn stream_range_across_boundary() {
        let chunk = MAX_CHUNK_SIZE as u64;
        let r = StreamRange::compute(chunk - 10, 20);
        assert_eq!(r.first_chunk, 0);
        assert_eq!(r.last_chunk, 1);
        assert_eq!(r.byte_range_for_chunk(0), (MAX_CHUNK_SIZE - 10, 10));
        assert_eq!(r.byte_range_for_chunk(1), (0, 10));
    }

    #[test]
    fn stream_range_at_exact_boundary() {
        let chunk = MAX_CHUNK_SIZE as u64;
        let r = StreamRange::compute(chunk, 100);
        assert_eq!(r.first_chunk, 1);
        assert_eq!(r.last_chunk, 1);
        assert_eq!(r.byte_range_for_chunk(1), (0, 100));
    }

    #[test]
    fn readable_chunk_read_bounds() {
        let chunk = ReadableChunk::new(Arc::new(b"0123456789".to_vec()));
        let mut dest = [0u8; 4];

        assert_eq!(chunk.read(0, 4, &mut dest).unwrap(), 4);
        assert_eq!(&dest, b"0123");

        // Clamped to what's left past the offset.
        assert_eq!(chunk.read(8, 4, &mut dest).unwrap(), 2);
        assert_eq!(&dest[..2], b"89");

        assert!(matches!(
            chunk.read(10, 1, &mut dest),
            Err(PlayerError::OutOfBounds)
        ));
    }

    #[tokio::test]
    async fn read_whole_small_stream() {
        let data = random_bytes(100_000);
        let fixture = StreamFixture::build(&[0x01; 16], &data);
        let mut stream = prepared_stream(&fixture, None, false).await;

        assert_eq!(stream.size(), 100_000);
        let mut out = vec![0u8; 100_000];
        let n = stream.read(&mut out).await.unwrap();
        assert_eq!(n, 100_000);
        assert_eq!(out, data);

        // At end of stream, reads return 0.
        let mut more = [0u8; 16];
        assert_eq!(stream.read(&mut more).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn split_reads_equal_one_big_read() {
        let data = random_bytes(50_000);
        let fixture = StreamFixture::build(&[0x02; 16], &data);
        let mut stream = prepared_stream(&fixture, None, false).await;

        let mut first = vec![0u8; 20_000];
        let mut second = vec![0u8; 30_000];
        assert_eq!(stream.read(&mut first).await.unwrap(), 20_000);
        assert_eq!(stream.read(&mut second).await.unwrap(), 30_000);

        assert_eq!(&first[..], &data[..20_000]);
        assert_eq!(&second[..], &data[20_000..]);
    }

    #[tokio::test]
    async fn read_across_chunk_boundary_stitches_bytes() {
        let data = random_bytes(MAX_CHUNK_SIZE + 50_000);
        let fixture = StreamFixture::build(&[0x03; 16], &data);
        let mut stream = prepared_stream(&fixture, None, false).await;

        assert_eq!(stream.size() as usize, data.len());

        stream
            .seek(SeekFrom::Start(MAX_CHUNK_SIZE as u64 - 100))
            .unwrap();
        let mut out = vec![0u8; 200];
        assert_eq!(stream.read(&mut out).await.unwrap(), 200);
        assert_eq!(
            out,
            &data[MAX_CHUNK_SIZE - 100..MAX_CHUNK_SIZE + 100]
        );
    }

    #[tokio::test]
    async fn seek_validation() {
        let data = random_bytes(1_000);
        let fixture = StreamFixture::build(&[0x04; 16], &data);
        let mut stream = prepared_stream(&fixture, None, false).await;

        assert_eq!(stream.seek(SeekFrom::Start(500)).unwrap(), 500);
        assert_eq!(stream.seek(SeekFrom::Current(-100)).unwrap(), 400);
        assert_eq!(stream.seek(SeekFrom::End(-1_000)).unwrap(), 0);

        assert!(matches!(
            stream.seek(SeekFrom::Start(1_001)),
            Err(PlayerError::OutOfBounds)
        ));
        assert!(matches!(
            stream.seek(SeekFrom::Current(-401)),
            Err(PlayerError::SeekingBeforeStart)
        ));
        assert!(matches!(
            stream.seek(SeekFrom::Current(1_001)),
            Err(PlayerError::OutOfBounds)
        ));
    }

    #[tokio::test]
    async fn zero_length_stream_is_eof() {
        let fixture = StreamFixture::build(&[0x05; 16], b"");
        let mut stream = prepared_stream(&fixture, None, false).await;

        assert_eq!(stream.size(), 0);
        let mut out = [0u8; 16];
        assert_eq!(stream.read(&mut out).await.unwrap(), 0);
        assert!(matches!(
            stream.seek(SeekFrom::Start(0)),
            Err(PlayerError::StreamSizeZero)
        ));
    }

    #[tokio::test]
    async fn claim_size_takes_precedence() {
        let data = random_bytes(10_000);
        let fixture = StreamFixture::build(&[0x06; 16], &data);
        // A claim-declared size wins even when the chunks disagree.
        let stream = prepared_stream(&fixture, Some(9_999), false).await;
        assert_eq!(stream.size(), 9_999);
    }

    #[tokio::test]
    async fn size_from_last_chunk_when_claim_is_silent() {
        let data = random_bytes(2 * MAX_CHUNK_SIZE + 5_000);
        let fixture = StreamFixture::build(&[0x07; 16], &data);
        let stream = prepared_stream(&fixture, None, false).await;
        assert_eq!(stream.size() as usize, data.len());
    }

    #[tokio::test]
    async fn size_heuristic_when_last_chunk_is_unavailable() {
        let data = random_bytes(2 * MAX_CHUNK_SIZE + 5_000);
        let fixture = StreamFixture::build(&[0x08; 16], &data);

        let origin = MemStore::new();
        seed_store(&origin, &fixture).await;
        // The last content blob cannot be fetched, forcing the estimate.
        let (last_hash, last_bytes) = fixture.blobs.last().unwrap();
        origin.delete(last_hash).await.unwrap();

        let player = test_player(origin, false);
        let mut stream = Stream::new(player, "legacy".into(), test_claim(&fixture, None));
        stream.prepare().await.unwrap();

        // Two full blobs count as a full chunk each; the short one counts
        // length - 1; 16 is shaved for the unguessable final padding.
        let expected = 2 * MAX_CHUNK_SIZE as u64 + (last_bytes.len() as u64 - 1) - 16;
        assert_eq!(stream.size(), expected);
    }

    #[tokio::test]
    async fn prefetch_fills_cache_and_skips_hot_chunks() {
        let data = random_bytes(2 * MAX_CHUNK_SIZE + 5_000);
        let fixture = StreamFixture::build(&[0x09; 16], &data);
        let mut stream = prepared_stream(&fixture, Some(data.len() as u64), true).await;

        let mut out = vec![0u8; 100];
        stream.read(&mut out).await.unwrap();

        // The read of chunk 0 schedules chunks 1 and 2.
        let sd = stream.descriptor().unwrap();
        let hot = Arc::clone(stream.player.hot());
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        loop {
            let all_hot = sd.content_blobs()[1..]
                .iter()
                .all(|info| hot.is_chunk_cached(info.hash.as_ref().unwrap(), &info.iv));
            if all_hot {
                break;
            }
            assert!(
                std::time::Instant::now() < deadline,
                "prefetch did not complete"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn filename_falls_back_to_claim_name_with_extension() {
        let data = random_bytes(1_000);
        let fixture = StreamFixture::build_named(&[0x0A; 16], &data, "");
        let origin = MemStore::new();
        seed_store(&origin, &fixture).await;
        let player = test_player(origin, false);

        let mut claim = test_claim(&fixture, None);
        claim.file_name = None;
        let mut stream = Stream::new(player, "test".into(), claim);
        stream.prepare().await.unwrap();

        assert_eq!(stream.filename(), "test-stream.mp4");
    }

    #[tokio::test]
    async fn filename_prefers_claim_source_name() {
        let data = random_bytes(1_000);
        let fixture = StreamFixture::build(&[0x0B; 16], &data);
        let origin = MemStore::new();
        seed_store(&origin, &fixture).await;
        let player = test_player(origin, false);

        let mut claim = test_claim(&fixture, None);
        claim.file_name = Some("My Movie!.mp4".into());
        let mut stream = Stream::new(player, "test".into(), claim);
        stream.prepare().await.unwrap();

        assert_eq!(stream.filename(), "My Movie!.mp4");
    }
}
