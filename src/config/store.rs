use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use tokio::sync::{Mutex, RwLock};

use super::{Binding, ConfigDocument, LayerIndex, Result, SlotKey};

/// Owns the in-memory configuration snapshot and its file on disk.
///
/// Readers get an `Arc` to an immutable document; reloads swap the whole
/// snapshot. A reload that fails to parse leaves the previous snapshot in
/// place.
pub struct ConfigStore {
    path: PathBuf,
    current: RwLock<Option<Arc<ConfigDocument>>>,
    seen_modified: Mutex<Option<SystemTime>>,
    active_layer: AtomicU8,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            current: RwLock::new(None),
            seen_modified: Mutex::new(None),
            active_layer: AtomicU8::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse the file; a missing file is `Ok(None)`
    pub async fn load(&self) -> Result<Option<ConfigDocument>> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        ConfigDocument::from_json_str(&text).map(Some)
    }

    /// Replace the in-memory snapshot with the file contents.
    ///
    /// Returns whether a document is now loaded.
    pub async fn reload(&self) -> Result<bool> {
        let modified = self.file_modified().await;
        let loaded = self.load().await?;
        *self.seen_modified.lock().await = modified;

        let present = loaded.is_some();
        match loaded {
            Some(doc) => {
                log::info!(
                    "Loaded configuration from {} ({} mapped inputs)",
                    self.path.display(),
                    doc.config().mappings.len()
                );
                *self.current.write().await = Some(Arc::new(doc));
            }
            None => {
                log::info!("No configuration at {}", self.path.display());
                *self.current.write().await = None;
            }
        }
        Ok(present)
    }

    /// Persist `doc` and make it the current snapshot
    pub async fn save(&self, doc: ConfigDocument) -> Result<()> {
        self.write_document(&doc).await?;
        *self.current.write().await = Some(Arc::new(doc));
        Ok(())
    }

    /// Atomically replace the file with `doc`.
    ///
    /// The write only counts as seen when no external edit was pending, so an
    /// edit made just before still reaches the watcher.
    async fn write_document(&self, doc: &ConfigDocument) -> Result<()> {
        let text = doc.to_json_string()?;
        let mut seen = self.seen_modified.lock().await;
        let pending_edit = match (self.file_modified().await, *seen) {
            (Some(on_disk), Some(previous)) => on_disk > previous,
            (Some(_), None) => true,
            (None, _) => false,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let staging = self.path.with_extension("json.tmp");
        tokio::fs::write(&staging, text).await?;
        tokio::fs::rename(&staging, &self.path).await?;

        if !pending_edit {
            *seen = self.file_modified().await;
        }
        log::debug!("Saved configuration to {}", self.path.display());
        Ok(())
    }

    pub async fn current(&self) -> Option<Arc<ConfigDocument>> {
        self.current.read().await.clone()
    }

    pub async fn last_port(&self) -> Option<String> {
        self.current
            .read()
            .await
            .as_ref()
            .and_then(|doc| doc.last_port().map(str::to_string))
    }

    pub async fn monitoring_enabled(&self) -> bool {
        self.current
            .read()
            .await
            .as_ref()
            .map_or(true, |doc| doc.config().settings.device_monitoring_enabled)
    }

    /// Store `port` as `device.COM`, writing only when it changed.
    ///
    /// The file is re-read first so external edits survive. A file that no
    /// longer parses is left untouched and the error returned.
    pub async fn record_last_port(&self, port: &str) -> Result<bool> {
        let mut doc = self.fresh_document().await?;
        let changed = doc.set_last_port(port);
        if changed {
            self.write_document(&doc).await?;
            log::info!("Remembered {} as last known port", port);
        }
        self.patch_current(doc, |current| current.set_last_port(port)).await;
        Ok(changed)
    }

    /// Remove the stored last known port
    pub async fn clear_last_port(&self) -> Result<bool> {
        let mut doc = self.fresh_document().await?;
        let changed = doc.clear_last_port();
        if changed {
            self.write_document(&doc).await?;
        }
        self.patch_current(doc, |current| current.clear_last_port()).await;
        Ok(changed)
    }

    async fn fresh_document(&self) -> Result<ConfigDocument> {
        match self.load().await {
            Ok(doc) => Ok(doc.unwrap_or_else(ConfigDocument::empty)),
            Err(e) => {
                log::warn!(
                    "Not writing {}: it no longer parses: {}",
                    self.path.display(),
                    e
                );
                Err(e)
            }
        }
    }

    /// Apply `edit` to the loaded snapshot, leaving its other settings alone;
    /// with nothing loaded yet, `written` becomes the snapshot
    async fn patch_current(
        &self,
        written: ConfigDocument,
        edit: impl FnOnce(&mut ConfigDocument) -> bool,
    ) {
        let mut current = self.current.write().await;
        let next = match current.as_ref() {
            Some(doc) => {
                let mut doc = (**doc).clone();
                edit(&mut doc);
                doc
            }
            None => written,
        };
        *current = Some(Arc::new(next));
    }

    pub async fn binding(&self, slot: SlotKey, layer: LayerIndex) -> Option<Binding> {
        self.current()
            .await
            .and_then(|doc| doc.config().binding(slot, layer).cloned())
    }

    /// Binding for `slot` on the layer the device last reported
    pub async fn current_layer_binding(&self, slot: SlotKey) -> Option<Binding> {
        self.binding(slot, self.active_layer()).await
    }

    pub fn active_layer(&self) -> LayerIndex {
        LayerIndex(self.active_layer.load(Ordering::Relaxed))
    }

    pub fn set_active_layer(&self, layer: LayerIndex) {
        self.active_layer.store(layer.0, Ordering::Relaxed);
    }

    /// True once per external modification of the file
    pub async fn poll_modified(&self) -> Result<bool> {
        let modified = match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta.modified()?,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        let mut seen = self.seen_modified.lock().await;
        let changed = match *seen {
            Some(previous) => modified > previous,
            None => true,
        };
        if changed {
            *seen = Some(modified);
        }
        Ok(changed)
    }

    async fn file_modified(&self) -> Option<SystemTime> {
        tokio::fs::metadata(&self.path)
            .await
            .ok()
            .and_then(|meta| meta.modified().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;

    fn temp_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("kommpad-store-{}", uuid::Uuid::new_v4()))
            .join("config.json")
    }

    #[tokio::test]
    async fn missing_file_is_absent_not_error() {
        let store = ConfigStore::new(temp_path());
        assert!(store.load().await.expect("load").is_none());
        assert!(!store.reload().await.expect("reload"));
        assert!(store.current().await.is_none());
        assert!(store.monitoring_enabled().await);
    }

    #[tokio::test]
    async fn malformed_reload_keeps_previous_snapshot() {
        let path = temp_path();
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        tokio::fs::write(&path, r#"{ "device": { "COM": "COM4" } }"#).await.unwrap();

        let store = ConfigStore::new(&path);
        assert!(store.reload().await.unwrap());
        assert_eq!(store.last_port().await.as_deref(), Some("COM4"));

        tokio::fs::write(&path, "{ not json").await.unwrap();
        let err = store.reload().await.unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
        assert_eq!(store.last_port().await.as_deref(), Some("COM4"));
    }

    #[tokio::test]
    async fn record_last_port_creates_document_once() {
        let path = temp_path();
        let store = ConfigStore::new(&path);

        assert!(store.record_last_port("COM5").await.unwrap());
        assert!(!store.record_last_port("COM5").await.unwrap());
        assert_eq!(store.last_port().await.as_deref(), Some("COM5"));

        let text = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(text.contains("\"COM\": \"COM5\""));

        assert!(store.clear_last_port().await.unwrap());
        assert!(store.last_port().await.is_none());
    }

    #[tokio::test]
    async fn own_writes_do_not_count_as_modifications() {
        let store = ConfigStore::new(temp_path());
        store.record_last_port("COM1").await.unwrap();
        assert!(!store.poll_modified().await.unwrap());
    }

    #[tokio::test]
    async fn malformed_file_is_never_overwritten() {
        let path = temp_path();
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        tokio::fs::write(&path, r#"{ "device": { "COM": "COM4" } }"#).await.unwrap();
        let store = ConfigStore::new(&path);
        store.reload().await.unwrap();

        tokio::fs::write(&path, "{ \"settings\": ").await.unwrap();
        assert!(matches!(
            store.record_last_port("COM5").await,
            Err(ConfigError::ParseError(_))
        ));
        assert!(store.clear_last_port().await.is_err());
        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "{ \"settings\": ");
    }

    #[tokio::test]
    async fn recording_a_port_keeps_a_pending_edit_visible() {
        let path = temp_path();
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        tokio::fs::write(&path, r#"{ "settings": { "Brightness": 60 } }"#).await.unwrap();
        let store = ConfigStore::new(&path);
        store.reload().await.unwrap();
        assert!(!store.poll_modified().await.unwrap());

        // an edit the watcher has not looked at yet
        tokio::fs::write(&path, r#"{ "settings": { "Brightness": 20 } }"#).await.unwrap();
        let file = std::fs::File::options().write(true).open(&path).unwrap();
        file.set_modified(SystemTime::now() + std::time::Duration::from_secs(5))
            .unwrap();
        drop(file);

        assert!(store.record_last_port("COM5").await.unwrap());
        let current = store.current().await.unwrap();
        assert_eq!(current.config().settings.brightness, 60);
        assert_eq!(current.last_port(), Some("COM5"));

        assert!(store.poll_modified().await.unwrap());
        store.reload().await.unwrap();
        let current = store.current().await.unwrap();
        assert_eq!(current.config().settings.brightness, 20);
        assert_eq!(current.last_port(), Some("COM5"));
    }

    #[tokio::test]
    async fn current_layer_binding_follows_reported_layer() {
        let path = temp_path();
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        tokio::fs::write(
            &path,
            r#"{ "mappings": { "button1": {
                "layer0": { "action": "key", "value": "a", "display": "A" },
                "layer1": { "action": "key", "value": "b", "display": "B" } } } }"#,
        )
        .await
        .unwrap();

        let store = ConfigStore::new(&path);
        store.reload().await.unwrap();
        assert_eq!(
            store.current_layer_binding(SlotKey::Button(1)).await.map(|b| b.display().to_string()),
            Some("A".to_string())
        );
        store.set_active_layer(LayerIndex(1));
        assert_eq!(
            store.current_layer_binding(SlotKey::Button(1)).await.map(|b| b.display().to_string()),
            Some("B".to_string())
        );
    }
}
