use crate::config::PollConfig;
use crate::errors::{BridgeError, ProtocolViolation, violation};
use crate::layout::SegmentLayout;
use common::wait::{PollOutcome, wait_for_resource};
use memmap2::{MmapMut, MmapOptions};
use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

#[cfg(not(target_endian = "little"))]
compile_error!("flag words are accessed as native atomics and the wire format is little-endian");

enum Mapping {
    File(MmapMut),
    #[cfg(windows)]
    Tagged(crate::tagged::TaggedMapping),
}

/// The mapped shared segment.
///
/// SAFETY & MEMORY ORDERING:
///
/// The peer writes to this memory concurrently, so every access goes through
/// the raw base pointer: plain fields with volatile copies, flag words with
/// atomics. Ownership of each field is decided by the protocol, never by a
/// lock; see the handshake and command modules for who writes what.
///
/// Publishing follows the usual pattern: write the payload, then store the
/// flag with `Release`. Observing a flag uses `Acquire`, after which the
/// payload the peer wrote before it is visible.
///
/// Dropping the segment unmaps it. Views handed out by [`Segment::slice`]
/// borrow the segment and so cannot outlive the mapping.
pub struct Segment {
    _mapping: Mapping,
    base: NonNull<u8>,
    len: usize,
    layout: SegmentLayout,
}

// The mapping is process-shared memory; all access is through atomics or
// volatile copies at bounds-checked offsets.
unsafe impl Send for Segment {}
unsafe impl Sync for Segment {}

/// Why a poll for the peer's shared object has not succeeded yet.
enum Pending {
    Missing,
    Unsized,
}

impl std::fmt::Display for Pending {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Pending::Missing => f.write_str("not created yet"),
            Pending::Unsized => f.write_str("created but not sized yet"),
        }
    }
}

impl Segment {
    /// Attach to the simulator's named segment.
    ///
    /// On POSIX the simulator creates `/dev/shm/<name>`; this polls for it
    /// until `poll.open_timeout`. On Windows the named mapping is opened, or
    /// created if this side comes first.
    pub fn open(
        name: &str,
        layout: SegmentLayout,
        poll: &PollConfig,
        cancel: &AtomicBool,
    ) -> Result<Self, BridgeError> {
        #[cfg(windows)]
        {
            let _ = (poll, cancel);
            let mapping = crate::tagged::TaggedMapping::create_or_open(name, layout.total_size())?;
            let base = NonNull::new(mapping.as_mut_ptr()).ok_or_else(|| {
                BridgeError::IoError(io::Error::other("MapViewOfFile returned null"))
            })?;
            tracing::info!(name, size = layout.total_size(), "Mapped tagged segment");
            Ok(Self {
                base,
                len: layout.total_size(),
                layout,
                _mapping: Mapping::Tagged(mapping),
            })
        }

        #[cfg(not(windows))]
        {
            Self::open_path(
                crate::paths::shm_path(name),
                layout,
                poll.open_timeout,
                poll.open_interval,
                cancel,
            )
        }
    }

    /// Poll for a peer-created backing file and map it read/write.
    ///
    /// A zero-length file counts as not created yet: the peer is between
    /// creating and sizing it. A file of the wrong size is fatal.
    pub fn open_path(
        path: impl AsRef<Path>,
        layout: SegmentLayout,
        timeout: Option<Duration>,
        interval: Duration,
        cancel: &AtomicBool,
    ) -> Result<Self, BridgeError> {
        let path = path.as_ref();
        let name = format!("shared segment {}", path.display());

        let outcome = wait_for_resource(
            || Self::try_map_existing(path, layout),
            interval,
            timeout,
            cancel,
            &name,
        );

        match outcome {
            PollOutcome::Ready(result) => result,
            PollOutcome::TimedOut(waited) => Err(BridgeError::NotFound {
                path: path.to_path_buf(),
                waited,
            }),
            PollOutcome::Cancelled => Err(BridgeError::Cancelled),
        }
    }

    fn try_map_existing(
        path: &Path,
        layout: SegmentLayout,
    ) -> Result<Result<Self, BridgeError>, Pending> {
        let file = match OpenOptions::new().read(true).write(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(Pending::Missing),
            Err(e) => return Ok(Err(e.into())),
        };

        let actual = match file.metadata() {
            Ok(meta) => meta.len() as usize,
            Err(e) => return Ok(Err(e.into())),
        };
        if actual == 0 {
            return Err(Pending::Unsized);
        }

        let expected = layout.total_size();
        if actual != expected {
            return Ok(Err(violation(ProtocolViolation::SegmentSize {
                expected,
                actual,
            })));
        }

        Ok(unsafe { MmapOptions::new().len(expected).map_mut(&file) }
            .map_err(BridgeError::from)
            .and_then(|mmap| Self::from_mmap(mmap, layout)))
    }

    /// Create (or reuse) a backing file sized for `layout` and map it.
    ///
    /// This is the peer-side half of [`Segment::open_path`].
    pub fn create_path(path: impl AsRef<Path>, layout: SegmentLayout) -> Result<Self, BridgeError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.as_ref())?;

        let size = layout.total_size() as u64;
        if file.metadata()?.len() != size {
            file.set_len(size)?;
        }

        let mmap = unsafe { MmapOptions::new().map_mut(&file)? };
        Self::from_mmap(mmap, layout)
    }

    fn from_mmap(mut mmap: MmapMut, layout: SegmentLayout) -> Result<Self, BridgeError> {
        let len = mmap.len();
        let base = NonNull::new(mmap.as_mut_ptr())
            .ok_or_else(|| BridgeError::IoError(io::Error::other("mmap returned null")))?;

        Ok(Self {
            _mapping: Mapping::File(mmap),
            base,
            len,
            layout,
        })
    }

    pub fn layout(&self) -> &SegmentLayout {
        &self.layout
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    fn ptr_at(&self, offset: usize, len: usize) -> *mut u8 {
        assert!(
            offset.checked_add(len).is_some_and(|end| end <= self.len),
            "access of {} bytes at offset {} is outside the {}-byte segment",
            len,
            offset,
            self.len
        );
        unsafe { self.base.as_ptr().add(offset) }
    }

    #[inline]
    fn atomic_at(&self, offset: usize) -> &AtomicU32 {
        assert!(offset % 4 == 0, "flag at offset {} is not 4-byte aligned", offset);
        let ptr = self.ptr_at(offset, 4) as *mut u32;
        unsafe { AtomicU32::from_ptr(ptr) }
    }

    #[inline]
    fn read_array<const N: usize>(&self, offset: usize) -> [u8; N] {
        unsafe { ptr::read_volatile(self.ptr_at(offset, N) as *const [u8; N]) }
    }

    #[inline]
    fn write_array<const N: usize>(&self, offset: usize, bytes: [u8; N]) {
        unsafe { ptr::write_volatile(self.ptr_at(offset, N) as *mut [u8; N], bytes) }
    }

    pub fn read_u32(&self, offset: usize) -> u32 {
        u32::from_le_bytes(self.read_array(offset))
    }

    pub fn read_i32(&self, offset: usize) -> i32 {
        i32::from_le_bytes(self.read_array(offset))
    }

    pub fn read_f32(&self, offset: usize) -> f32 {
        f32::from_le_bytes(self.read_array(offset))
    }

    pub fn write_u32(&self, offset: usize, value: u32) {
        self.write_array(offset, value.to_le_bytes());
    }

    pub fn write_i32(&self, offset: usize, value: i32) {
        self.write_array(offset, value.to_le_bytes());
    }

    pub fn write_f32(&self, offset: usize, value: f32) {
        self.write_array(offset, value.to_le_bytes());
    }

    /// Load a flag word with `Acquire`.
    pub fn load_u32(&self, offset: usize) -> u32 {
        self.atomic_at(offset).load(Ordering::Acquire)
    }

    /// Publish a flag word with `Release`; every earlier write is visible
    /// to a peer that observes the new value.
    pub fn store_u32(&self, offset: usize, value: u32) {
        self.atomic_at(offset).store(value, Ordering::Release);
    }

    pub fn compare_exchange_u32(&self, offset: usize, current: u32, new: u32) -> Result<u32, u32> {
        self.atomic_at(offset)
            .compare_exchange(current, new, Ordering::AcqRel, Ordering::Acquire)
    }

    /// Bump a counter word, returning the new value. Peer-side helper.
    pub fn increment_u32(&self, offset: usize) -> u32 {
        self.atomic_at(offset)
            .fetch_add(1, Ordering::AcqRel)
            .wrapping_add(1)
    }

    pub fn write_bytes(&self, offset: usize, bytes: &[u8]) {
        let dst = self.ptr_at(offset, bytes.len());
        unsafe { ptr::copy_nonoverlapping(bytes.as_ptr(), dst, bytes.len()) }
    }

    pub fn read_bytes(&self, offset: usize, out: &mut [u8]) {
        let src = self.ptr_at(offset, out.len());
        unsafe { ptr::copy_nonoverlapping(src, out.as_mut_ptr(), out.len()) }
    }

    /// Borrow `len` bytes in place. The peer may rewrite them at any time.
    pub fn slice(&self, offset: usize, len: usize) -> &[u8] {
        let ptr = self.ptr_at(offset, len);
        unsafe { std::slice::from_raw_parts(ptr, len) }
    }

    /// Unmap. Equivalent to dropping the segment.
    pub fn close(self) {}
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("len", &self.len)
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use tempfile::tempdir;

    const LAYOUT: SegmentLayout = SegmentLayout::new(8, 4, 2);

    #[test]
    fn test_open_path_times_out_when_peer_never_creates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.shm");
        let cancel = AtomicBool::new(false);
        let timeout = Duration::from_millis(80);

        let start = Instant::now();
        let err = Segment::open_path(
            &path,
            LAYOUT,
            Some(timeout),
            Duration::from_millis(10),
            &cancel,
        )
        .unwrap_err();

        assert!(start.elapsed() >= timeout);
        match err {
            BridgeError::NotFound { path: p, waited } => {
                assert_eq!(p, path);
                assert!(waited >= timeout);
            }
            other => panic!("Expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_open_path_rejects_wrong_size() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("small.shm");
        std::fs::write(&path, vec![0u8; 64]).unwrap();
        let cancel = AtomicBool::new(false);

        let err = Segment::open_path(
            &path,
            LAYOUT,
            Some(Duration::from_secs(1)),
            Duration::from_millis(10),
            &cancel,
        )
        .unwrap_err();

        match err {
            BridgeError::ProtocolViolation(ProtocolViolation::SegmentSize { expected, actual }) => {
                assert_eq!(expected, LAYOUT.total_size());
                assert_eq!(actual, 64);
            }
            other => panic!("Expected SegmentSize violation, got {:?}", other),
        }
    }

    #[test]
    fn test_open_path_waits_for_empty_file_to_be_sized() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("late.shm");
        std::fs::File::create(&path).unwrap();

        let sizer_path = path.clone();
        let sizer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            let file = OpenOptions::new().write(true).open(sizer_path).unwrap();
            file.set_len(LAYOUT.total_size() as u64).unwrap();
        });

        let cancel = AtomicBool::new(false);
        let segment = Segment::open_path(
            &path,
            LAYOUT,
            Some(Duration::from_secs(5)),
            Duration::from_millis(5),
            &cancel,
        )
        .unwrap();
        sizer.join().unwrap();

        assert_eq!(segment.len(), LAYOUT.total_size());
    }

    #[test]
    fn test_open_path_honours_cancellation() {
        let dir = tempdir().unwrap();
        let cancel = AtomicBool::new(true);

        let err = Segment::open_path(
            dir.path().join("never.shm"),
            LAYOUT,
            None,
            Duration::from_millis(5),
            &cancel,
        )
        .unwrap_err();

        assert!(matches!(err, BridgeError::Cancelled));
    }

    #[test]
    fn test_writes_are_visible_through_second_mapping() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("shared.shm");
        let peer = Segment::create_path(&path, LAYOUT).unwrap();

        let cancel = AtomicBool::new(false);
        let controller = Segment::open_path(
            &path,
            LAYOUT,
            Some(Duration::from_secs(1)),
            Duration::from_millis(5),
            &cancel,
        )
        .unwrap();

        controller.write_f32(8, 1.5);
        controller.write_i32(12, -7);
        controller.store_u32(0, 42);

        assert_eq!(peer.load_u32(0), 42);
        assert_eq!(peer.read_f32(8), 1.5);
        assert_eq!(peer.read_i32(12), -7);

        peer.write_bytes(32, &[1, 2, 3, 4]);
        assert_eq!(controller.slice(32, 4), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_values_are_little_endian_on_the_wire() {
        let dir = tempdir().unwrap();
        let segment = Segment::create_path(dir.path().join("le.shm"), LAYOUT).unwrap();

        segment.write_u32(4, 0x0403_0201);
        assert_eq!(segment.slice(4, 4), &[1, 2, 3, 4]);

        segment.write_f32(8, 1.0);
        assert_eq!(segment.slice(8, 4), &1.0f32.to_le_bytes());
    }

    #[test]
    fn test_compare_exchange_and_increment() {
        let dir = tempdir().unwrap();
        let segment = Segment::create_path(dir.path().join("cas.shm"), LAYOUT).unwrap();

        assert_eq!(segment.compare_exchange_u32(0, 0, 1), Ok(0));
        assert_eq!(segment.compare_exchange_u32(0, 0, 5), Err(1));
        assert_eq!(segment.increment_u32(0), 2);

        segment.store_u32(0, u32::MAX);
        assert_eq!(segment.increment_u32(0), 0, "counter wraps mod 2^32");
    }

    #[test]
    #[should_panic(expected = "outside the")]
    fn test_out_of_bounds_access_panics() {
        let dir = tempdir().unwrap();
        let segment = Segment::create_path(dir.path().join("oob.shm"), LAYOUT).unwrap();
        segment.read_u32(LAYOUT.total_size() - 2);
    }
}
