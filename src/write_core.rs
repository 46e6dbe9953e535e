use anyhow::{Context, Result};
use std::fs::{self, File, Metadata};
use std::io::{self, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const MAX_SYMLINK_HOPS: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurabilityMode {
    Durable,
    Fast,
}

#[derive(Debug, Clone)]
pub struct WriteOptions {
    pub durability: DurabilityMode,
    pub preserve_permissions: bool,
    pub idempotent_skip: bool,
    /// Unix mode applied to the new file (e.g. 0o755 for executables).
    pub mode: Option<u32>,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            durability: DurabilityMode::Durable,
            preserve_permissions: true,
            idempotent_skip: true,
            mode: None,
        }
    }
}

impl WriteOptions {
    pub fn durable() -> Self {
        Self::default()
    }

    /// Stats files are rewritten on every tool call; skip fsync for them.
    pub fn fast() -> Self {
        Self {
            durability: DurabilityMode::Fast,
            ..Self::default()
        }
    }

    pub fn executable() -> Self {
        Self {
            preserve_permissions: false,
            idempotent_skip: false,
            mode: Some(0o755),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteStats {
    pub bytes_written: u64,
    pub skipped_unchanged: bool,
}

/// Write-to-temp-then-rename writer. A crash mid-write leaves the old file intact.
pub struct AtomicWriter {
    options: WriteOptions,
}

impl AtomicWriter {
    pub fn new(options: WriteOptions) -> Self {
        Self { options }
    }

    pub fn write_str(&self, path: &Path, content: &str) -> Result<WriteStats> {
        self.write_bytes(path, content.as_bytes())
    }

    /// A symlinked `path` is followed: the link's final target is replaced and
    /// the link itself stays in place.
    pub fn write_bytes(&self, path: &Path, content: &[u8]) -> Result<WriteStats> {
        let target = resolve_symlinks(path)?;
        let path = target.as_path();
        let existing_meta = stat(path)?;

        if self.options.idempotent_skip {
            if let Some(meta) = existing_meta.as_ref() {
                if meta.len() == content.len() as u64 && file_equals_bytes(path, content)? {
                    return Ok(WriteStats {
                        bytes_written: 0,
                        skipped_unchanged: true,
                    });
                }
            }
        }

        let mut reader = content;
        self.replace_from(path, &mut reader, existing_meta.as_ref())
    }

    /// Atomically replace `dest` with a copy of `src`. Renaming over the target
    /// works even while the old binary is running, unlike writing into it.
    pub fn copy_file(&self, src: &Path, dest: &Path) -> Result<WriteStats> {
        let mut input =
            File::open(src).with_context(|| format!("Failed to open {}", src.display()))?;
        let existing_meta = stat(dest)?;
        self.replace_from(dest, &mut input, existing_meta.as_ref())
    }

    fn replace_from(
        &self,
        path: &Path,
        reader: &mut dyn Read,
        existing_meta: Option<&Metadata>,
    ) -> Result<WriteStats> {
        let parent = parent_dir(path)?;

        if existing_meta.is_none() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create parent directory for {}", path.display())
            })?;
        }

        let mut temp_file = NamedTempFile::new_in(parent)
            .with_context(|| format!("Failed to create temp file in {}", parent.display()))?;

        let bytes_written = {
            let mut writer = BufWriter::new(temp_file.as_file_mut());
            let n = io::copy(reader, &mut writer)
                .with_context(|| format!("Failed to write temp file for {}", path.display()))?;
            writer.flush().context("Failed to flush temp file")?;
            n
        };

        if self.options.preserve_permissions {
            if let Some(meta) = existing_meta {
                fs::set_permissions(temp_file.path(), meta.permissions()).with_context(|| {
                    format!(
                        "Failed to preserve permissions while writing {}",
                        path.display()
                    )
                })?;
            }
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = self.options.mode {
                fs::set_permissions(temp_file.path(), fs::Permissions::from_mode(mode))
                    .with_context(|| {
                        format!("Failed to set mode {:o} on {}", mode, path.display())
                    })?;
            }
        }

        if self.options.durability == DurabilityMode::Durable {
            temp_file
                .as_file()
                .sync_data()
                .with_context(|| format!("Failed to sync temp data for {}", path.display()))?;
        }

        temp_file.persist(path).map_err(|e| {
            anyhow::Error::new(e.error)
                .context(format!("Failed to atomically replace {}", path.display()))
        })?;

        if self.options.durability == DurabilityMode::Durable {
            fsync_parent_dir(parent)
                .with_context(|| format!("Failed to sync parent dir {}", parent.display()))?;
        }

        Ok(WriteStats {
            bytes_written,
            skipped_unchanged: false,
        })
    }
}

/// Walk a symlink chain to the path that actually holds the bytes. A dangling
/// link resolves to its missing target, which the write then creates.
fn resolve_symlinks(path: &Path) -> Result<PathBuf> {
    let mut current = path.to_path_buf();
    for _ in 0..MAX_SYMLINK_HOPS {
        match fs::symlink_metadata(&current) {
            Ok(meta) if meta.file_type().is_symlink() => {
                let link = fs::read_link(&current)
                    .with_context(|| format!("Failed to read symlink {}", current.display()))?;
                current = match current.parent() {
                    Some(dir) if link.is_relative() => dir.join(link),
                    _ => link,
                };
            }
            Ok(_) => return Ok(current),
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(current),
            Err(err) => {
                return Err(err).with_context(|| format!("Failed to stat {}", current.display()))
            }
        }
    }
    anyhow::bail!("Too many levels of symbolic links at {}", path.display())
}

fn stat(path: &Path) -> Result<Option<Metadata>> {
    match fs::metadata(path) {
        Ok(meta) => Ok(Some(meta)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err).with_context(|| format!("Failed to stat {}", path.display())),
    }
}

fn parent_dir(path: &Path) -> Result<&Path> {
    let parent = path.parent().with_context(|| {
        format!(
            "Cannot write to {}: path has no parent directory",
            path.display()
        )
    })?;
    // relative paths like "settings.json" yield parent="" which breaks File::open
    Ok(if parent.as_os_str().is_empty() {
        Path::new(".")
    } else {
        parent
    })
}

fn file_equals_bytes(path: &Path, expected: &[u8]) -> Result<bool> {
    let mut file = File::open(path)
        .with_context(|| format!("Failed to read existing file {}", path.display()))?;
    let mut buf = [0u8; 8192];
    let mut offset = 0usize;

    loop {
        let n = file
            .read(&mut buf)
            .with_context(|| format!("Failed to read existing file {}", path.display()))?;
        if n == 0 {
            return Ok(offset == expected.len());
        }
        if offset + n > expected.len() {
            return Ok(false);
        }
        if expected.get(offset..offset + n) != Some(&buf[..n]) {
            return Ok(false);
        }
        offset += n;
    }
}

#[cfg(unix)]
fn fsync_parent_dir(parent: &Path) -> Result<()> {
    let dir = File::open(parent)
        .with_context(|| format!("Failed to open parent dir {}", parent.display()))?;
    dir.sync_all()
        .with_context(|| format!("Failed to fsync parent dir {}", parent.display()))?;
    Ok(())
}

#[cfg(not(unix))]
fn fsync_parent_dir(_parent: &Path) -> Result<()> {
    Ok(())
}
