//! Admission-control tokens: in-process semaphores and named, process-wide tokens.
//!
//! A token hands out at most `capacity` [`Permit`]s at a time. Dropping a permit
//! returns it. Named tokens live in the filesystem so that every process opening
//! the same name shares the same permits:
//!
//! ```text
//! <namespace>/<name>/open.lock      held exclusively while a handle opens or closes
//! <namespace>/<name>/handles.lock   shared-locked by every live handle
//! <namespace>/<name>/token.json     manifest written by the owner
//! <namespace>/<name>/slot-<i>.lock  one advisory file lock per permit
//! ```
//!
//! The object lives as long as some handle holds `handles.lock`. An opener
//! that can lock it exclusively finds no live handle and becomes the owner;
//! the last handle to close removes the manifest and slots.

use std::fmt;
use std::fs::{self, File, OpenOptions, TryLockError};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::cancel::CancellationContext;
use super::error::QueueError;

/// Longest name segment kept for a named token.
pub const MAX_NAME_LEN: usize = 200;

const MANIFEST: &str = "token.json";
const OPEN_LOCK: &str = "open.lock";
const HANDLES_LOCK: &str = "handles.lock";
const OPEN_TIMEOUT: Duration = Duration::from_secs(2);
const POLL_MIN: Duration = Duration::from_millis(2);
const POLL_MAX: Duration = Duration::from_millis(50);

/// Capability shared by every admission-control primitive.
pub trait AdmissionToken: Send + Sync + fmt::Debug {
    /// Block until a permit is available or `ctx` is cancelled.
    ///
    /// # Errors
    ///
    /// `QueueError::Canceled` when `ctx` trips first; `QueueError::NamedObject`
    /// when the backing object fails.
    fn acquire(&self, ctx: &CancellationContext) -> Result<Permit, QueueError>;

    /// Take a permit without blocking.
    ///
    /// # Errors
    ///
    /// `QueueError::NamedObject` when the backing object fails.
    fn try_acquire(&self) -> Result<Option<Permit>, QueueError>;

    /// Maximum number of simultaneous permits.
    fn capacity(&self) -> usize;

    /// Whether this handle created the underlying object.
    fn is_owner(&self) -> bool;

    /// Object name, for named tokens.
    fn name(&self) -> Option<&str>;

    /// Wake blocked acquirers so they re-check cancellation.
    fn interrupt(&self);
}

/// A held admission permit; released on drop.
pub struct Permit {
    kind: PermitKind,
}

enum PermitKind {
    Local(Arc<SemaphoreState>),
    Named(File),
}

impl Drop for Permit {
    fn drop(&mut self) {
        match &self.kind {
            PermitKind::Local(state) => state.release(),
            PermitKind::Named(file) => {
                if let Err(e) = file.unlock() {
                    debug!(error = %e, "failed to unlock named permit; closing releases it");
                }
            }
        }
    }
}

impl fmt::Debug for Permit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            PermitKind::Local(_) => "local",
            PermitKind::Named(_) => "named",
        };
        f.debug_struct("Permit").field("kind", &kind).finish()
    }
}

// ============================================================================
// In-process semaphore
// ============================================================================

#[derive(Debug)]
struct SemaphoreState {
    available: Mutex<usize>,
    cvar: Condvar,
}

impl SemaphoreState {
    fn release(&self) {
        let mut available = self.available.lock();
        *available += 1;
        self.cvar.notify_one();
    }
}

/// Counting semaphore local to this process.
#[derive(Debug, Clone)]
pub struct LocalSemaphore {
    state: Arc<SemaphoreState>,
    capacity: usize,
}

impl LocalSemaphore {
    /// Create a semaphore with `capacity` permits (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Arc::new(SemaphoreState {
                available: Mutex::new(capacity),
                cvar: Condvar::new(),
            }),
            capacity,
        }
    }

    /// Permits currently free.
    #[must_use]
    pub fn available(&self) -> usize {
        *self.state.available.lock()
    }

    fn permit(&self) -> Permit {
        Permit {
            kind: PermitKind::Local(Arc::clone(&self.state)),
        }
    }
}

impl AdmissionToken for LocalSemaphore {
    fn acquire(&self, ctx: &CancellationContext) -> Result<Permit, QueueError> {
        let mut available = self.state.available.lock();
        loop {
            if ctx.is_canceled() {
                return Err(QueueError::Canceled);
            }
            if *available > 0 {
                *available -= 1;
                return Ok(self.permit());
            }
            self.state.cvar.wait(&mut available);
        }
    }

    fn try_acquire(&self) -> Result<Option<Permit>, QueueError> {
        let mut available = self.state.available.lock();
        if *available == 0 {
            return Ok(None);
        }
        *available -= 1;
        Ok(Some(self.permit()))
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn is_owner(&self) -> bool {
        true
    }

    fn name(&self) -> Option<&str> {
        None
    }

    fn interrupt(&self) {
        let _guard = self.state.available.lock();
        self.state.cvar.notify_all();
    }
}

// ============================================================================
// Named token
// ============================================================================

/// Access control applied by the owner of a named token.
///
/// On unix the mode bits are applied to the token directory and slot files;
/// elsewhere the descriptor is recorded in the manifest only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessDescriptor {
    /// Permission bits for slot files, e.g. `0o660`.
    pub mode: u32,
}

impl AccessDescriptor {
    /// Descriptor with the given file mode.
    #[must_use]
    pub const fn new(mode: u32) -> Self {
        Self { mode }
    }

    /// Owner and group may use the token.
    #[must_use]
    pub const fn group() -> Self {
        Self::new(0o660)
    }

    /// Directory mode derived from the file mode: readable implies traversable.
    const fn dir_mode(self) -> u32 {
        let mut mode = self.mode;
        if mode & 0o400 != 0 {
            mode |= 0o100;
        }
        if mode & 0o040 != 0 {
            mode |= 0o010;
        }
        if mode & 0o004 != 0 {
            mode |= 0o001;
        }
        mode
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct TokenManifest {
    name: String,
    capacity: usize,
    access: Option<AccessDescriptor>,
    created_by: u32,
    created_at_ms: u128,
}

/// Process-wide admission token identified by a name.
///
/// The first handle to open a name creates it and becomes the owner: it alone
/// fixes the capacity and applies the access descriptor. Later handles adopt
/// the owner's capacity while any handle, in any process, is still open.
/// Once the last handle closes the object is gone and the next opener owns a
/// fresh one.
#[derive(Debug)]
pub struct NamedToken {
    name: String,
    dir: PathBuf,
    slots: Vec<PathBuf>,
    owner: bool,
    next_slot: AtomicUsize,
    /// Shared lock on `handles.lock`, held for the life of the handle.
    handle: File,
}

impl NamedToken {
    /// Default namespace directory shared by all processes of this user.
    #[must_use]
    pub fn default_namespace() -> PathBuf {
        std::env::temp_dir().join("prometheus-thread-queue")
    }

    /// Open `name` in the default namespace, creating it with `capacity` permits if absent.
    ///
    /// # Errors
    ///
    /// `QueueError::NamedObject` on any failure; there is no fallback to an unnamed token.
    pub fn open_or_create(
        name: &str,
        capacity: usize,
        access: Option<AccessDescriptor>,
    ) -> Result<Self, QueueError> {
        Self::open_in(&Self::default_namespace(), name, capacity, access)
    }

    /// Open `name` inside `namespace`, creating it with `capacity` permits if absent.
    ///
    /// # Errors
    ///
    /// `QueueError::NamedObject` on any failure, `QueueError::Configuration` for an empty name.
    pub fn open_in(
        namespace: &Path,
        name: &str,
        capacity: usize,
        access: Option<AccessDescriptor>,
    ) -> Result<Self, QueueError> {
        let key = sanitize(name);
        if key.is_empty() {
            return Err(QueueError::Configuration("named token requires a non-empty name".into()));
        }
        let wrap = |source: io::Error| QueueError::NamedObject {
            name: name.to_string(),
            source,
        };

        let dir = namespace.join(&key);
        fs::create_dir_all(&dir).map_err(wrap)?;
        let _opening = lock_for_open(&dir).map_err(wrap)?;

        let handle = open_lock_file(&dir.join(HANDLES_LOCK)).map_err(wrap)?;
        let owner = match handle.try_lock() {
            Ok(()) => true,
            Err(TryLockError::WouldBlock) => false,
            Err(TryLockError::Error(e)) => return Err(wrap(e)),
        };

        let capacity = if owner {
            // No live handle anywhere: whatever is on disk is stale.
            let capacity = capacity.max(1);
            let created = create_object(&dir, name, capacity, access);
            handle.unlock().map_err(wrap)?;
            created.map_err(wrap)?;
            info!(name, capacity, "created named admission token");
            capacity
        } else {
            let manifest = read_manifest(&dir).map_err(wrap)?;
            if manifest.capacity != capacity {
                debug!(
                    name,
                    requested = capacity,
                    existing = manifest.capacity,
                    "named token exists; adopting owner's capacity"
                );
            }
            manifest.capacity
        };
        // Exclusive holders only exist under the open lock, so this never waits.
        handle.lock_shared().map_err(wrap)?;

        let slots = (0..capacity).map(|i| slot_path(&dir, i)).collect();
        Ok(Self {
            name: name.to_string(),
            dir,
            slots,
            owner,
            next_slot: AtomicUsize::new(0),
            handle,
        })
    }

    /// Directory backing this token.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.dir
    }

    fn wrap(&self, source: io::Error) -> QueueError {
        QueueError::NamedObject {
            name: self.name.clone(),
            source,
        }
    }
}

impl Drop for NamedToken {
    fn drop(&mut self) {
        let _ = self.handle.unlock();
        let Ok(opening) = open_lock_file(&self.dir.join(OPEN_LOCK)) else {
            return;
        };
        // An opener in progress takes over the object as it finds it.
        if opening.try_lock().is_err() {
            return;
        }
        let Ok(handles) = open_lock_file(&self.dir.join(HANDLES_LOCK)) else {
            return;
        };
        if handles.try_lock().is_ok() {
            match remove_object(&self.dir) {
                Ok(()) => debug!(name = %self.name, "last handle closed; named token removed"),
                Err(e) => debug!(name = %self.name, error = %e, "failed to remove named token"),
            }
        }
    }
}

impl AdmissionToken for NamedToken {
    fn acquire(&self, ctx: &CancellationContext) -> Result<Permit, QueueError> {
        let mut backoff = POLL_MIN;
        loop {
            if ctx.is_canceled() {
                return Err(QueueError::Canceled);
            }
            if let Some(permit) = self.try_acquire()? {
                return Ok(permit);
            }
            // Other processes release without notifying us.
            if ctx.wait_timeout(backoff) {
                return Err(QueueError::Canceled);
            }
            backoff = (backoff * 2).min(POLL_MAX);
        }
    }

    fn try_acquire(&self) -> Result<Option<Permit>, QueueError> {
        let start = self.next_slot.fetch_add(1, Ordering::Relaxed);
        for offset in 0..self.slots.len() {
            let path = &self.slots[(start + offset) % self.slots.len()];
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .open(path)
                .map_err(|e| self.wrap(e))?;
            match file.try_lock() {
                Ok(()) => {
                    return Ok(Some(Permit {
                        kind: PermitKind::Named(file),
                    }))
                }
                Err(TryLockError::WouldBlock) => {}
                Err(TryLockError::Error(e)) => return Err(self.wrap(e)),
            }
        }
        Ok(None)
    }

    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn is_owner(&self) -> bool {
        self.owner
    }

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn interrupt(&self) {}
}

fn sanitize(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .take(MAX_NAME_LEN)
        .collect::<String>()
        .trim_start_matches('.')
        .to_string()
}

fn slot_path(dir: &Path, index: usize) -> PathBuf {
    dir.join(format!("slot-{index}.lock"))
}

fn open_lock_file(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
}

/// Take `open.lock` exclusively, giving up after [`OPEN_TIMEOUT`].
fn lock_for_open(dir: &Path) -> io::Result<File> {
    let file = open_lock_file(&dir.join(OPEN_LOCK))?;
    let deadline = Instant::now() + OPEN_TIMEOUT;
    let mut backoff = POLL_MIN;
    loop {
        match file.try_lock() {
            Ok(()) => return Ok(file),
            Err(TryLockError::WouldBlock) if Instant::now() < deadline => {
                std::thread::sleep(backoff);
                backoff = (backoff * 2).min(POLL_MAX);
            }
            Err(TryLockError::WouldBlock) => {
                return Err(io::Error::new(
                    ErrorKind::TimedOut,
                    "named token is held open by another opener",
                ))
            }
            Err(TryLockError::Error(e)) => return Err(e),
        }
    }
}

/// Delete the manifest and every slot file. Lock files stay.
fn remove_object(dir: &Path) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        let stale = file_name.starts_with(MANIFEST) || (file_name.starts_with("slot-") && file_name.ends_with(".lock"));
        if stale {
            match fs::remove_file(&path) {
                Err(e) if e.kind() != ErrorKind::NotFound => return Err(e),
                _ => {}
            }
        }
    }
    Ok(())
}

fn create_object(
    dir: &Path,
    name: &str,
    capacity: usize,
    access: Option<AccessDescriptor>,
) -> io::Result<()> {
    remove_object(dir)?;
    for i in 0..capacity {
        let path = slot_path(dir, i);
        File::create(&path)?;
        if let Some(access) = access {
            apply_access(&path, access.mode)?;
        }
    }

    let manifest = TokenManifest {
        name: name.to_string(),
        capacity,
        access,
        created_by: std::process::id(),
        created_at_ms: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_millis()),
    };
    let body = serde_json::to_vec_pretty(&manifest).map_err(io::Error::other)?;
    // Rename so openers never observe a half-written manifest.
    let tmp = dir.join(format!("{MANIFEST}.tmp"));
    fs::write(&tmp, body)?;
    fs::rename(&tmp, dir.join(MANIFEST))?;

    if let Some(access) = access {
        apply_access(dir, access.dir_mode())?;
    }
    Ok(())
}

/// Manifest of a live object. The owner publishes it before releasing the open lock.
fn read_manifest(dir: &Path) -> io::Result<TokenManifest> {
    match fs::read(dir.join(MANIFEST)) {
        Ok(body) => serde_json::from_slice(&body).map_err(io::Error::other),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(io::Error::new(
            ErrorKind::InvalidData,
            "named token has live handles but no manifest",
        )),
        Err(e) => Err(e),
    }
}

#[cfg(unix)]
fn apply_access(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn apply_access(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn namespace() -> PathBuf {
        std::env::temp_dir().join(format!("ptq-token-{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_local_semaphore_counts() {
        let sem = LocalSemaphore::new(2);
        let a = sem.try_acquire().unwrap().unwrap();
        let _b = sem.try_acquire().unwrap().unwrap();
        assert!(sem.try_acquire().unwrap().is_none());
        drop(a);
        assert_eq!(sem.available(), 1);
    }

    #[test]
    fn test_local_semaphore_acquire_cancelled() {
        let sem = LocalSemaphore::new(1);
        let _held = sem.try_acquire().unwrap().unwrap();
        let ctx = CancellationContext::new();

        let remote = ctx.clone();
        let waker = sem.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            remote.cancel();
            waker.interrupt();
        });
        assert!(matches!(sem.acquire(&ctx), Err(QueueError::Canceled)));
        handle.join().unwrap();
    }

    #[test]
    fn test_named_owner_and_opener() {
        let ns = namespace();
        let owner = NamedToken::open_in(&ns, "jobs", 2, Some(AccessDescriptor::group())).unwrap();
        let opener = NamedToken::open_in(&ns, "jobs", 5, None).unwrap();

        assert!(owner.is_owner());
        assert!(!opener.is_owner());
        assert_eq!(opener.capacity(), 2);
        fs::remove_dir_all(ns).ok();
    }

    #[test]
    fn test_named_permits_shared_between_handles() {
        let ns = namespace();
        let first = NamedToken::open_in(&ns, "gate", 1, None).unwrap();
        let second = NamedToken::open_in(&ns, "gate", 1, None).unwrap();

        let held = first.try_acquire().unwrap().expect("first permit");
        assert!(second.try_acquire().unwrap().is_none());
        drop(held);
        assert!(second.try_acquire().unwrap().is_some());
        fs::remove_dir_all(ns).ok();
    }

    #[test]
    fn test_named_acquire_observes_cancel() {
        let ns = namespace();
        let token = NamedToken::open_in(&ns, "busy", 1, None).unwrap();
        let _held = token.try_acquire().unwrap().unwrap();
        let ctx = CancellationContext::new();
        ctx.cancel();
        assert!(matches!(token.acquire(&ctx), Err(QueueError::Canceled)));
        fs::remove_dir_all(ns).ok();
    }

    #[test]
    fn test_named_object_removed_with_last_handle() {
        let ns = namespace();
        let first = NamedToken::open_in(&ns, "fresh", 3, None).unwrap();
        let dir = first.path().to_path_buf();
        assert!(dir.join(MANIFEST).exists());
        drop(first);
        assert!(!dir.join(MANIFEST).exists());
        assert!(!slot_path(&dir, 0).exists());

        let second = NamedToken::open_in(&ns, "fresh", 1, None).unwrap();
        assert!(second.is_owner());
        assert_eq!(second.capacity(), 1);
        fs::remove_dir_all(ns).ok();
    }

    #[test]
    fn test_named_object_survives_while_any_handle_open() {
        let ns = namespace();
        let owner = NamedToken::open_in(&ns, "relay", 2, None).unwrap();
        let opener = NamedToken::open_in(&ns, "relay", 4, None).unwrap();
        drop(owner);

        let late = NamedToken::open_in(&ns, "relay", 7, None).unwrap();
        assert!(!late.is_owner());
        assert_eq!(late.capacity(), 2);
        drop(opener);
        drop(late);
        fs::remove_dir_all(ns).ok();
    }

    #[test]
    fn test_named_stale_directory_is_reclaimed() {
        let ns = namespace();
        // Left behind by a creator that died before publishing its manifest.
        let dir = ns.join("crashed");
        fs::create_dir_all(&dir).unwrap();
        File::create(slot_path(&dir, 0)).unwrap();
        File::create(dir.join(format!("{MANIFEST}.tmp"))).unwrap();

        let token = NamedToken::open_in(&ns, "crashed", 2, None).unwrap();
        assert!(token.is_owner());
        assert_eq!(token.capacity(), 2);
        assert!(token.try_acquire().unwrap().is_some());
        fs::remove_dir_all(ns).ok();
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("Global\\jobs/queue"), "Global_jobs_queue");
        assert_eq!(sanitize("..hidden"), "hidden");
        assert_eq!(sanitize(&"x".repeat(500)).len(), MAX_NAME_LEN);
    }
}
