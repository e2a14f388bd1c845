//! Conversion between native paths and canonical paths.
//!
//! Canonical paths always start with `/`, use `/` between segments, and are in
//! Unicode Normalization Form C. Native paths are what the storage backend and
//! the OS hand us: platform separator, and NFD on filesystems that store names
//! decomposed. Both directions are total: an empty path is the root.
//!
//! The platform behaviour is a [`Normalizer`] strategy chosen at compile time;
//! [`to_canonical`] and [`to_native`] dispatch to it.

use std::path::{Path, PathBuf};
use unicode_normalization::UnicodeNormalization;

/// Separator used in canonical paths.
pub const SEPARATOR: char = '/';

/// Canonical root path.
pub const ROOT: &str = "/";

/// Platform-specific rules for converting paths.
pub trait Normalizer {
    /// Separator used by native paths
    const NATIVE_SEPARATOR: char;

    /// Whether the native filesystem stores decomposed Unicode names
    const DECOMPOSED: bool;

    fn to_canonical(native: &str) -> String {
        let joined = native
            .split(|c| c == SEPARATOR || c == Self::NATIVE_SEPARATOR)
            .filter(|s| !s.is_empty() && *s != ".")
            .collect::<Vec<_>>()
            .join("/");
        let canonical = format!("{SEPARATOR}{joined}");
        if Self::DECOMPOSED {
            canonical.nfc().collect()
        } else {
            canonical
        }
    }

    fn to_native(canonical: &str) -> String {
        let segments: Vec<&str> = canonical
            .split(SEPARATOR)
            .filter(|s| !s.is_empty() && *s != ".")
            .collect();
        let sep = Self::NATIVE_SEPARATOR.to_string();
        let native = format!("{sep}{}", segments.join(&sep));
        if Self::DECOMPOSED {
            native.nfd().collect()
        } else {
            native
        }
    }
}

/// Plain POSIX filesystems: separator substitution only.
pub struct Posix;

impl Normalizer for Posix {
    const NATIVE_SEPARATOR: char = '/';
    const DECOMPOSED: bool = false;
}

/// macOS filesystems, which hand back decomposed names.
pub struct Darwin;

impl Normalizer for Darwin {
    const NATIVE_SEPARATOR: char = '/';
    const DECOMPOSED: bool = true;
}

/// Windows filesystems, backslash separated.
pub struct Windows;

impl Normalizer for Windows {
    const NATIVE_SEPARATOR: char = '\\';
    const DECOMPOSED: bool = false;
}

#[cfg(target_os = "macos")]
pub type Platform = Darwin;

#[cfg(windows)]
pub type Platform = Windows;

#[cfg(not(any(target_os = "macos", windows)))]
pub type Platform = Posix;

/// Convert a native path (relative to the endpoint root) to canonical form.
pub fn to_canonical(native: &str) -> String {
    Platform::to_canonical(native)
}

/// Convert a canonical path to the platform's native form.
pub fn to_native(canonical: &str) -> String {
    Platform::to_native(canonical)
}

/// Native form of a canonical path, as a `PathBuf`.
pub fn native_path(canonical: &str) -> PathBuf {
    PathBuf::from(to_native(canonical))
}

/// Whether this platform rewrites Unicode forms.
pub fn requires_normalization() -> bool {
    <Platform as Normalizer>::DECOMPOSED
}

pub fn is_root(canonical: &str) -> bool {
    canonical.split(SEPARATOR).all(|s| s.is_empty())
}

/// Number of segments below the root.
pub fn depth(canonical: &str) -> usize {
    canonical.split(SEPARATOR).filter(|s| !s.is_empty()).count()
}

/// Append a name to a canonical path.
pub fn join(parent: &str, name: &str) -> String {
    let parent = parent.trim_end_matches(SEPARATOR);
    let name = name.trim_start_matches(SEPARATOR);
    format!("{parent}{SEPARATOR}{name}")
}

/// Parent of a canonical path, `None` for the root.
pub fn parent(canonical: &str) -> Option<String> {
    if is_root(canonical) {
        return None;
    }
    let trimmed = canonical.trim_end_matches(SEPARATOR);
    match trimmed.rfind(SEPARATOR) {
        Some(0) | None => Some(ROOT.to_string()),
        Some(idx) => Some(trimmed[..idx].to_string()),
    }
}

/// Last segment of a canonical path, `None` for the root.
pub fn file_name(canonical: &str) -> Option<&str> {
    canonical.split(SEPARATOR).filter(|s| !s.is_empty()).last()
}

/// Whether `path` is `base` or lies below it, segment-wise.
pub fn starts_with(path: &str, base: &str) -> bool {
    let mut path_segments = path.split(SEPARATOR).filter(|s| !s.is_empty());
    base.split(SEPARATOR)
        .filter(|s| !s.is_empty())
        .all(|b| path_segments.next() == Some(b))
}

/// Replace the `from` prefix of `path` with `to`.
///
/// Returns `None` when `path` is not under `from`.
pub fn rebase(path: &str, from: &str, to: &str) -> Option<String> {
    if !starts_with(path, from) {
        return None;
    }
    let suffix: Vec<&str> = path
        .split(SEPARATOR)
        .filter(|s| !s.is_empty())
        .skip(depth(from))
        .collect();
    if suffix.is_empty() {
        return Some(clean(to));
    }
    Some(join(&clean(to), &suffix.join("/")))
}

/// Tidy a path that is already canonical: leading separator, no empty or
/// `.` segments. Unicode is left as is.
pub fn clean(canonical: &str) -> String {
    Posix::to_canonical(canonical)
}

/// Resolve an endpoint root once, at construction.
///
/// Notification sources report fully resolved paths, so the root is
/// canonicalized when possible for prefixes to strip cleanly.
#[cfg(not(windows))]
pub fn resolve_root(root: &Path) -> PathBuf {
    std::fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf())
}

/// Resolve an endpoint root once, at construction.
///
/// Leading separators are dropped, symlinks resolved, and the drive letter
/// lower-cased so that every path derived from the root compares equal.
#[cfg(windows)]
pub fn resolve_root(root: &Path) -> PathBuf {
    let raw = root.to_string_lossy();
    let trimmed = raw.trim_start_matches(['/', '\\']);
    let resolved = match std::fs::canonicalize(trimmed) {
        Ok(p) => p,
        Err(_) => return PathBuf::from(trimmed),
    };
    let resolved = resolved.to_string_lossy();
    let resolved = resolved.strip_prefix(r"\\?\").unwrap_or(&resolved);
    match resolved.split_once(':') {
        Some((volume, rest)) if volume.len() == 1 => {
            PathBuf::from(format!("{}:{}", volume.to_ascii_lowercase(), rest))
        }
        _ => PathBuf::from(resolved),
    }
}
