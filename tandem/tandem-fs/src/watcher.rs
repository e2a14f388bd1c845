//! Watch lifecycle for [`FsEndpoint`].
//!
//! Each session runs two tasks. The supervisor holds the OS subscription
//! until the session's done signal fires, then unregisters it. The
//! translator drains the growable buffer, translates every notification and
//! forwards the result; once the buffer runs dry after unregistration it
//! closes the session's channels. Nothing is sent after that point since the
//! translator is the only producer.

use crate::buffer;
use crate::endpoint::FsEndpoint;
use crate::notification::{RawNotification, Subscription};
use crate::path;
use crate::storage::relative;
use crate::translate::Translator;
use dashmap::DashSet;
use std::sync::Arc;
use tandem_core::{Result, SessionHandles, TandemError, WatchSession, WatchState};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Marks a sub-path as watched for as long as it lives.
struct ActiveGuard {
    active: Arc<DashSet<String>>,
    key: String,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.active.remove(&self.key);
    }
}

impl FsEndpoint {
    pub(crate) async fn start_watch(&self, sub_path: &str) -> Result<WatchSession> {
        let key = path::clean(sub_path);
        if !self.active.insert(key.clone()) {
            return Err(TandemError::AlreadyWatching(key));
        }
        let guard = ActiveGuard {
            active: Arc::clone(&self.active),
            key: key.clone(),
        };

        let (session, handles) = WatchSession::channel(self.watch_config.event_channel_capacity);

        let physical_root = match self.storage.physical_root() {
            Some(root) if self.storage.capabilities().native_notifications => root.to_path_buf(),
            _ => {
                debug!("No notification source for {:?}, session on {} stays idle", self.storage, key);
                tokio::spawn(idle(handles, guard));
                return Ok(session);
            }
        };

        let watch_path = physical_root.join(relative(&path::native_path(&key)));
        let (input, output) = buffer::open::<RawNotification>(self.watch_config.buffer_capacity);
        let subscription = Subscription::register(&watch_path, input)
            .map_err(|e| TandemError::subscription(key.as_str(), e))?;

        handles.set_state(WatchState::Subscribed);
        info!("Watching {}", watch_path.display());

        let translator = Translator::new(
            Arc::clone(&self.storage),
            physical_root,
            self.ignore.clone(),
            self.source_ref(),
        );

        tokio::spawn(supervise(subscription, handles.done.clone()));
        tokio::spawn(translate(translator, output, handles, guard));

        Ok(session)
    }
}

/// Session on a storage the OS cannot observe: nothing ever arrives.
async fn idle(handles: SessionHandles, guard: ActiveGuard) {
    handles.done.cancelled().await;
    drop(guard);
    handles.close();
}

async fn supervise(subscription: Subscription, done: CancellationToken) {
    done.cancelled().await;
    info!("Unwatching {}", subscription.path().display());
    // Unwatching waits on the notification thread.
    if let Err(err) = tokio::task::spawn_blocking(move || subscription.unregister()).await {
        warn!("Unregister task failed: {}", err);
    }
}

async fn translate(
    translator: Translator,
    mut output: mpsc::Receiver<RawNotification>,
    handles: SessionHandles,
    guard: ActiveGuard,
) {
    let mut draining = false;
    loop {
        let next = tokio::select! {
            _ = handles.done.cancelled(), if !draining => {
                draining = true;
                handles.set_state(WatchState::Draining);
                continue;
            }
            next = output.recv() => next,
        };

        let result = match next {
            Some(Ok(raw)) => translator.translate(&raw).await,
            Some(Err(err)) => Err(TandemError::notification(err.to_string())),
            None => break,
        };

        match result {
            Ok(Some(event)) => {
                debug!("{} {}", event.change_type, event.path);
                if handles.events.send(event).await.is_err() {
                    debug!("Session dropped, discarding remaining notifications");
                    break;
                }
            }
            Ok(None) => {}
            Err(err) => {
                warn!("Watch error: {}", err);
                let _ = handles.errors.send(err);
            }
        }
    }

    drop(guard);
    handles.close();
    debug!("Watch session closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::IgnoreList;
    use crate::notification::{RawEvent, RawMask};
    use crate::storage::testing::FaultyStorage;
    use crate::storage::{MemoryStorage, Storage};
    use std::path::{Path, PathBuf};
    use std::sync::Weak;
    use tandem_core::{ChangeType, PathSyncSource, SourceRef};

    const ROOT: &str = "/mnt/sync";
    const FILES: usize = 20;

    fn raw(relative: &str, mask: RawMask) -> RawNotification {
        Ok(RawEvent::new(Path::new(ROOT).join(relative), mask))
    }

    async fn create_translator() -> Translator {
        let storage = MemoryStorage::new();
        storage.create_dir_all(Path::new("/docs")).await.unwrap();
        storage.write_file(Path::new("/secret"), b"x").await.unwrap();
        for i in 0..FILES {
            storage
                .write_file(&PathBuf::from(format!("/docs/f{i}")), b"data")
                .await
                .unwrap();
        }
        let weak: Weak<dyn PathSyncSource> = Weak::<FsEndpoint>::new();
        Translator::new(
            Arc::new(FaultyStorage::new(storage, "/secret")),
            PathBuf::from(ROOT),
            IgnoreList::builtin().unwrap(),
            SourceRef::new(weak),
        )
    }

    #[tokio::test]
    async fn test_errors_are_forwarded_and_buffer_drains_after_done() {
        let translator = create_translator().await;
        let (mut session, handles) = WatchSession::channel(4);
        let active = Arc::new(DashSet::new());
        active.insert("/".to_string());
        let guard = ActiveGuard {
            active: Arc::clone(&active),
            key: "/".to_string(),
        };

        let (input, output) = buffer::open::<RawNotification>(8);
        input.send(raw("secret", RawMask::WRITE)).await.unwrap();
        input.send(raw("docs", RawMask::CREATE)).await.unwrap();
        for i in 0..FILES {
            input.send(raw(&format!("docs/f{i}"), RawMask::WRITE)).await.unwrap();
        }
        input
            .send(Err(notify::Error::generic("event queue overflow")))
            .await
            .unwrap();

        // Done before anything is translated; the backlog must still arrive.
        session.close();
        let task = tokio::spawn(translate(translator, output, handles, guard));
        drop(input);

        let mut events = Vec::new();
        while let Some(event) = session.next_event().await {
            events.push(event);
        }
        let mut errors = Vec::new();
        while let Some(err) = session.next_error().await {
            errors.push(err);
        }
        task.await.unwrap();

        assert_eq!(events.len(), FILES + 1);
        assert_eq!(events[0].path, "/docs");
        assert_eq!(events[0].change_type, ChangeType::Create);
        for (i, event) in events[1..].iter().enumerate() {
            assert_eq!(event.path, format!("/docs/f{i}"));
            assert_eq!(event.change_type, ChangeType::Write);
        }

        assert_eq!(errors.len(), 2);
        assert!(matches!(&errors[0], TandemError::Storage { path, .. } if path == "/secret"));
        assert!(matches!(&errors[1], TandemError::Notification(_)));

        assert_eq!(session.state(), WatchState::Closed);
        assert!(active.is_empty());
    }

    #[tokio::test]
    async fn test_dropped_session_stops_translation() {
        let translator = create_translator().await;
        let (session, handles) = WatchSession::channel(1);
        let guard = ActiveGuard {
            active: Arc::new(DashSet::new()),
            key: "/".to_string(),
        };
        let (input, output) = buffer::open::<RawNotification>(8);
        for i in 0..FILES {
            input.send(raw(&format!("docs/f{i}"), RawMask::WRITE)).await.unwrap();
        }

        drop(session);
        // The pipeline gives up without waiting for the input to close.
        let task = tokio::spawn(translate(translator, output, handles, guard));
        tokio::time::timeout(std::time::Duration::from_secs(5), task)
            .await
            .expect("translation kept running")
            .unwrap();
        drop(input);
    }
}
