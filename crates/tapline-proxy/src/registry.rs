//! Capture directory and sequence registry.
//!
//! The registry owns the only shared mutable state of the capture pipeline:
//! the active [`CaptureDirectory`] with its sequence counter (plus the
//! [`Settings`] they derive from) behind one mutex, and the [`Mode`] flag as a
//! lone atomic.
//!
//! ## Locking
//!
//! ```text
//! tag request ──► reserve() ──┐
//! rotate()   ─────────────────┼──► Mutex<RegistryInner> { settings, active, next_seq }
//! reload_settings() ──────────┘
//!
//! set_mode() / mode() ───────────► AtomicU8
//! ```
//!
//! The critical section covers directory creation and the counter bump only.
//! Artifact writes happen outside the lock.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tapline_core::{Mode, Settings};
use uuid::Uuid;

/// A directory holding every artifact captured since the last rotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureDirectory {
    /// Unique identifier; also the directory name under the base log root.
    pub id: Uuid,
    /// Directory artifacts are written to.
    pub path: PathBuf,
    /// When the directory became active.
    pub created_at: DateTime<Utc>,
    /// True if creation failed and the base log root is used instead.
    pub is_fallback: bool,
}

impl CaptureDirectory {
    /// Returns the path of an artifact inside this directory.
    pub fn artifact_path(&self, file_name: &str) -> PathBuf {
        self.path.join(file_name)
    }
}

/// A sequence id together with the directory it was issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    /// Directory that was active when the id was issued.
    pub directory: CaptureDirectory,
    /// Sequence id, unique within `directory`.
    pub sequence_id: u64,
}

#[derive(Debug)]
struct RegistryInner {
    settings: Arc<Settings>,
    active: Option<CaptureDirectory>,
    next_seq: u64,
}

impl RegistryInner {
    fn rotate(&mut self) -> CaptureDirectory {
        let id = Uuid::new_v4();
        let base = self.settings.base_log_dir.clone();
        let path = base.join(id.to_string());

        let directory = match fs::create_dir_all(&path) {
            Ok(()) => {
                tracing::info!("Capture directory is now {:?}", path);
                CaptureDirectory {
                    id,
                    path,
                    created_at: Utc::now(),
                    is_fallback: false,
                }
            }
            Err(e) => {
                // Captures from now on share the base root with earlier runs.
                tracing::warn!(
                    "Failed to create capture directory {:?}: {}; falling back to {:?}",
                    path,
                    e,
                    base
                );
                CaptureDirectory {
                    id,
                    path: base,
                    created_at: Utc::now(),
                    is_fallback: true,
                }
            }
        };

        self.active = Some(directory.clone());
        self.next_seq = 1;
        directory
    }

    fn ensure_active(&mut self) -> CaptureDirectory {
        match &self.active {
            // A fallback stays active until an explicit rotation retries.
            Some(dir) if dir.is_fallback || dir.path.is_dir() => dir.clone(),
            Some(dir) => {
                tracing::warn!("Capture directory {:?} disappeared, rotating", dir.path);
                self.rotate()
            }
            None => self.rotate(),
        }
    }

    fn next_sequence(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }
}

/// Process-wide registry of the active capture directory, sequence counter
/// and operating mode.
#[derive(Debug)]
pub struct CaptureRegistry {
    inner: Mutex<RegistryInner>,
    mode: AtomicU8,
}

impl CaptureRegistry {
    /// Creates a registry with no active directory.
    ///
    /// The first [`reserve`](Self::reserve) or [`ensure_active`](Self::ensure_active)
    /// creates one.
    pub fn new(settings: Settings) -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                settings: Arc::new(settings),
                active: None,
                next_seq: 1,
            }),
            mode: AtomicU8::new(Mode::Production.to_u8()),
        }
    }

    /// Starts a fresh capture directory and resets the sequence counter to 1.
    ///
    /// Directory creation failures fall back to the base log root.
    pub fn rotate(&self) -> CaptureDirectory {
        self.inner.lock().rotate()
    }

    /// Returns the active directory, rotating first if there is none or it
    /// was removed from disk.
    ///
    /// A fallback directory is kept as is, even if unusable, so sequence ids
    /// keep counting up; only [`rotate`](Self::rotate) retries creation.
    pub fn ensure_active(&self) -> CaptureDirectory {
        self.inner.lock().ensure_active()
    }

    /// Returns the next sequence id for the active directory.
    pub fn next_sequence(&self) -> u64 {
        self.inner.lock().next_sequence()
    }

    /// Ensures an active directory and issues a sequence id for it in one
    /// critical section, so a concurrent rotation cannot split the pair.
    pub fn reserve(&self) -> Reservation {
        let mut inner = self.inner.lock();
        let directory = inner.ensure_active();
        let sequence_id = inner.next_sequence();
        Reservation {
            directory,
            sequence_id,
        }
    }

    /// Returns the active directory without creating one.
    pub fn active(&self) -> Option<CaptureDirectory> {
        self.inner.lock().active.clone()
    }

    /// Returns the id the next reservation would receive.
    pub fn peek_next_sequence(&self) -> u64 {
        self.inner.lock().next_seq
    }

    /// Returns the current settings.
    pub fn settings(&self) -> Arc<Settings> {
        Arc::clone(&self.inner.lock().settings)
    }

    /// Replaces the settings.
    ///
    /// The active directory is kept; the next rotation uses the new base root.
    pub fn replace_settings(&self, settings: Settings) {
        let mut inner = self.inner.lock();
        inner.settings = Arc::new(settings);
    }

    /// Returns the operating mode.
    #[inline]
    pub fn mode(&self) -> Mode {
        Mode::from_u8(self.mode.load(Ordering::Acquire))
    }

    /// Sets the operating mode, returning the previous one.
    pub fn set_mode(&self, mode: Mode) -> Mode {
        let previous = Mode::from_u8(self.mode.swap(mode.to_u8(), Ordering::AcqRel));
        if previous != mode {
            tracing::info!("Mode changed: {} -> {}", previous, mode);
        }
        previous
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;
    use tempfile::TempDir;

    fn test_registry(dir: &TempDir) -> CaptureRegistry {
        CaptureRegistry::new(Settings::default().with_base_log_dir(dir.path().join("logs")))
    }

    #[test]
    fn rotate_creates_uuid_directory() {
        let temp = TempDir::new().unwrap();
        let registry = test_registry(&temp);

        let dir = registry.rotate();
        assert!(dir.path.is_dir());
        assert!(!dir.is_fallback);
        assert_eq!(dir.path, temp.path().join("logs").join(dir.id.to_string()));
        assert_eq!(registry.active(), Some(dir));
    }

    #[test]
    fn sequence_starts_at_one_and_increments() {
        let temp = TempDir::new().unwrap();
        let registry = test_registry(&temp);
        registry.rotate();

        assert_eq!(registry.next_sequence(), 1);
        assert_eq!(registry.next_sequence(), 2);
        assert_eq!(registry.next_sequence(), 3);
    }

    #[test]
    fn rotate_resets_sequence() {
        let temp = TempDir::new().unwrap();
        let registry = test_registry(&temp);

        let first = registry.rotate();
        for _ in 0..41 {
            registry.next_sequence();
        }
        let second = registry.rotate();

        assert_ne!(first.id, second.id);
        assert_eq!(registry.peek_next_sequence(), 1);
        assert_eq!(registry.reserve().sequence_id, 1);
    }

    #[test]
    fn ensure_active_creates_when_missing() {
        let temp = TempDir::new().unwrap();
        let registry = test_registry(&temp);
        assert!(registry.active().is_none());

        let dir = registry.ensure_active();
        assert!(dir.path.is_dir());
        assert_eq!(registry.ensure_active(), dir);
    }

    #[test]
    fn ensure_active_rotates_after_external_delete() {
        let temp = TempDir::new().unwrap();
        let registry = test_registry(&temp);

        let first = registry.ensure_active();
        registry.next_sequence();
        fs::remove_dir_all(&first.path).unwrap();

        let second = registry.ensure_active();
        assert_ne!(first.id, second.id);
        assert!(second.path.is_dir());
        assert_eq!(registry.next_sequence(), 1);
    }

    #[test]
    fn rotate_falls_back_to_base_root() {
        let temp = TempDir::new().unwrap();
        // A file where the base root should be makes create_dir_all fail.
        let blocker = temp.path().join("logs");
        fs::write(&blocker, b"not a directory").unwrap();

        let registry = test_registry(&temp);
        let dir = registry.rotate();

        assert!(dir.is_fallback);
        assert_eq!(dir.path, blocker);
        assert_eq!(registry.settings().base_log_dir, dir.path);
        assert_eq!(registry.next_sequence(), 1);
    }

    #[test]
    fn fallback_stays_active_across_reservations() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("logs"), b"not a directory").unwrap();

        let registry = test_registry(&temp);
        let first = registry.reserve();
        let second = registry.reserve();

        assert!(first.directory.is_fallback);
        assert_eq!(first.directory, second.directory);
        assert_eq!(first.sequence_id, 1);
        assert_eq!(second.sequence_id, 2);

        // An explicit rotation retries and resets the counter.
        fs::remove_file(temp.path().join("logs")).unwrap();
        let retried = registry.rotate();
        assert!(!retried.is_fallback);
        assert!(retried.path.is_dir());
        assert_eq!(registry.reserve().sequence_id, 1);
    }

    #[test]
    fn concurrent_reservations_are_unique_and_gapless() {
        let temp = TempDir::new().unwrap();
        let registry = Arc::new(test_registry(&temp));
        registry.rotate();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    (0..250)
                        .map(|_| registry.reserve().sequence_id)
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for seq in handle.join().unwrap() {
                assert!(seen.insert(seq), "duplicate sequence id {}", seq);
            }
        }

        assert_eq!(seen.len(), 2000);
        assert_eq!(seen.iter().min(), Some(&1));
        assert_eq!(seen.iter().max(), Some(&2000));
    }

    #[test]
    fn mode_set_and_read() {
        let temp = TempDir::new().unwrap();
        let registry = test_registry(&temp);

        assert_eq!(registry.mode(), Mode::Production);
        assert_eq!(registry.set_mode(Mode::Mock), Mode::Production);
        assert_eq!(registry.mode(), Mode::Mock);
        // Idempotent.
        assert_eq!(registry.set_mode(Mode::Mock), Mode::Mock);
        assert_eq!(registry.mode(), Mode::Mock);
    }

    #[test]
    fn replace_settings_applies_on_next_rotation() {
        let temp = TempDir::new().unwrap();
        let registry = test_registry(&temp);
        let first = registry.rotate();

        let new_root = temp.path().join("other");
        registry.replace_settings(Settings::default().with_base_log_dir(&new_root));
        assert_eq!(registry.active(), Some(first));
        assert_eq!(registry.settings().base_log_dir, new_root);

        let second = registry.rotate();
        assert!(second.path.starts_with(&new_root));
    }
}
