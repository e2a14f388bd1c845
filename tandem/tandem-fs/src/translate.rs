//! Raw notification to [`ChangeEvent`] translation.

use crate::filter::IgnoreList;
use crate::notification::{RawEvent, RawMask};
use crate::path;
use crate::storage::Storage;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tandem_core::{ChangeEvent, ChangeType, Result, SourceRef, TandemError};
use tracing::{debug, warn};

/// Turns raw notifications under one root into domain events.
///
/// Create and write notifications are confirmed with a stat; a target that is
/// already gone was ephemeral and produces nothing. A rename whose target is
/// gone is reported as a removal. Removals are trusted without a stat.
#[derive(Clone)]
pub struct Translator {
    storage: Arc<dyn Storage>,
    root: PathBuf,
    ignore: IgnoreList,
    source: SourceRef,
}

impl Translator {
    pub fn new(storage: Arc<dyn Storage>, root: PathBuf, ignore: IgnoreList, source: SourceRef) -> Self {
        Self {
            storage,
            root,
            ignore,
            source,
        }
    }

    /// Native path relative to the root, `None` if outside it.
    fn relative<'a>(&self, native: &'a Path) -> Option<&'a Path> {
        native.strip_prefix(&self.root).ok()
    }

    /// Translate one notification into zero or one event.
    ///
    /// Ignore patterns are matched with the type found by the stat, so a
    /// directory-only pattern hides the same nodes here as in a walk. Without
    /// a stat the path is dropped if it would be ignored as either type.
    pub async fn translate(&self, raw: &RawEvent) -> Result<Option<ChangeEvent>> {
        let Some(relative) = self.relative(&raw.path) else {
            warn!("Ignoring notification outside of root: {}", raw.path.display());
            return Ok(None);
        };
        let canonical = path::to_canonical(&relative.to_string_lossy());

        let change_type = if raw.mask.intersects(RawMask::CREATE | RawMask::WRITE) {
            if raw.mask.contains(RawMask::CREATE) {
                ChangeType::Create
            } else {
                ChangeType::Write
            }
        } else if raw.mask.contains(RawMask::RENAME) {
            ChangeType::Rename
        } else if raw.mask.contains(RawMask::REMOVE) {
            return Ok(self.removed(canonical));
        } else {
            return Ok(None);
        };

        match self.storage.stat(relative).await {
            Ok(md) if self.ignore.is_ignored(&canonical, md.is_dir) => Ok(None),
            Ok(md) => Ok(Some(
                ChangeEvent::present(change_type, canonical, md.len, md.is_dir)
                    .with_source(self.source.clone()),
            )),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                if change_type == ChangeType::Rename {
                    Ok(self.removed(canonical))
                } else {
                    debug!("Ignoring {} on vanished {}", change_type, canonical);
                    Ok(None)
                }
            }
            Err(_) if self.ignore.is_ignored_any(&canonical) => Ok(None),
            Err(e) => Err(TandemError::storage(canonical, e)),
        }
    }

    fn removed(&self, canonical: String) -> Option<ChangeEvent> {
        if self.ignore.is_ignored_any(&canonical) {
            return None;
        }
        Some(ChangeEvent::removed(canonical).with_source(self.source.clone()))
    }
}
