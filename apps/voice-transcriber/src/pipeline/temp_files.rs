use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// Temporary files created on behalf of one job.
///
/// Paths are registered *before* anything is written to them, so a stage that
/// fails half-way still has its output removed. [`TempFiles::cleanup`] is the
/// normal exit; if the owning future is dropped first, `Drop` removes whatever
/// is left synchronously.
pub struct TempFiles {
	dir: PathBuf,
	paths: Vec<PathBuf>,
}

impl TempFiles {
	pub fn new(dir: impl Into<PathBuf>) -> Self {
		Self {
			dir: dir.into(),
			paths: Vec::new(),
		}
	}

	/// Reserve a fresh, collision-resistant path in the temp dir
	pub fn allocate(&mut self, prefix: &str, extension: &str) -> PathBuf {
		let path = self.dir.join(format!("{prefix}_{}.{extension}", Uuid::new_v4().simple()));
		self.paths.push(path.clone());
		path
	}

	/// Register a path derived from an earlier one
	pub fn track(&mut self, path: PathBuf) -> PathBuf {
		if !self.paths.contains(&path) {
			self.paths.push(path.clone());
		}
		path
	}

	#[must_use]
	pub fn paths(&self) -> &[PathBuf] {
		&self.paths
	}

	/// Remove every registered file.
	///
	/// Missing files are fine (the stage may have failed before writing).
	/// Other failures are logged and counted, and never stop the remaining
	/// removals. Returns the number of files that could not be removed.
	pub async fn cleanup(mut self) -> usize {
		let mut failures = 0;

		for path in std::mem::take(&mut self.paths) {
			match tokio::fs::remove_file(&path).await {
				Ok(()) => debug!(path = %path.display(), "🧹 Removed temp file"),
				Err(e) if e.kind() == ErrorKind::NotFound => {}
				Err(e) => {
					failures += 1;
					warn!(path = %path.display(), error = %e, "Failed to delete temp file");
				}
			}
		}

		failures
	}
}

impl Drop for TempFiles {
	fn drop(&mut self) {
		for path in self.paths.drain(..) {
			remove_now(&path);
		}
	}
}

fn remove_now(path: &Path) {
	match std::fs::remove_file(path) {
		Ok(()) => debug!(path = %path.display(), "🧹 Removed temp file of abandoned job"),
		Err(e) if e.kind() == ErrorKind::NotFound => {}
		Err(e) => warn!(path = %path.display(), error = %e, "Failed to delete temp file of abandoned job"),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_cleanup_removes_created_and_ignores_missing() {
		let dir = tempfile::tempdir().expect("temp dir");
		let mut files = TempFiles::new(dir.path());

		let ogg = files.allocate("audio", "ogg");
		let wav = files.track(ogg.with_extension("wav"));
		std::fs::write(&ogg, b"OggS").expect("write");

		assert_eq!(files.paths().len(), 2);
		assert!(ogg.file_name().unwrap().to_string_lossy().starts_with("audio_"));

		assert_eq!(files.cleanup().await, 0);
		assert!(!ogg.exists());
		assert!(!wav.exists());
	}

	#[tokio::test]
	async fn test_cleanup_continues_after_failure() {
		let dir = tempfile::tempdir().expect("temp dir");
		let mut files = TempFiles::new(dir.path());

		// A directory cannot be removed with remove_file
		let stuck = files.allocate("audio", "ogg");
		std::fs::create_dir(&stuck).expect("mkdir");
		let wav = files.track(stuck.with_extension("wav"));
		std::fs::write(&wav, b"RIFF").expect("write");

		assert_eq!(files.cleanup().await, 1);
		assert!(!wav.exists());
	}

	#[test]
	fn test_drop_removes_leftovers() {
		let dir = tempfile::tempdir().expect("temp dir");
		let path = {
			let mut files = TempFiles::new(dir.path());
			let path = files.allocate("audio", "ogg");
			std::fs::write(&path, b"OggS").expect("write");
			path
		};

		assert!(!path.exists());
	}

	#[test]
	fn test_allocated_paths_are_unique() {
		let mut files = TempFiles::new("/tmp");
		let a = files.allocate("audio", "ogg");
		let b = files.allocate("audio", "ogg");
		assert_ne!(a, b);
		files.paths.clear();
	}
}
