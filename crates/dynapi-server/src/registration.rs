//! Registration of codec-backed resources.
//!
//! A registration is an encoder/decoder template pair identified by a key.
//! The [`Registrar`] compiles pairs and mounts the resulting resources on the
//! router; [`RegistrationDir`] feeds it from a watched directory of TOML
//! files, one registration per file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use dynapi_core::TypeDescriptor;
use dynapi_template::TemplateCompiler;
use notify::RecursiveMode;
use notify_debouncer_mini::new_debouncer;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::apiserver::DynamicApiServer;
use crate::instances::StoreSet;
use crate::resource::DynamicResource;

pub const ENCODER_KEY: &str = "encoder";
pub const DECODER_KEY: &str = "decoder";

/// Encoder and decoder template sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplatePair {
    pub encoder: String,
    pub decoder: String,
}

impl TemplatePair {
    /// Reads a pair from TOML text. Text that is not a table with both string
    /// keys is not a registration and yields `None`.
    pub fn from_toml(text: &str) -> Option<Self> {
        let table: toml::Table = toml::from_str(text).ok()?;
        let encoder = table.get(ENCODER_KEY)?.as_str()?;
        let decoder = table.get(DECODER_KEY)?.as_str()?;
        Some(Self {
            encoder: encoder.to_string(),
            decoder: decoder.to_string(),
        })
    }
}

/// Compiles registrations and keeps the router in sync with them.
pub struct Registrar {
    api: Arc<DynamicApiServer>,
    compiler: TemplateCompiler,
    stores: StoreSet,
    mounted: Mutex<HashMap<String, TypeDescriptor>>,
}

impl Registrar {
    pub fn new(api: Arc<DynamicApiServer>, compiler: TemplateCompiler, stores: StoreSet) -> Self {
        Self {
            api,
            compiler,
            stores,
            mounted: Mutex::new(HashMap::new()),
        }
    }

    /// Descriptor mounted for `key`, if any.
    pub fn mounted(&self, key: &str) -> Option<TypeDescriptor> {
        self.mounted.lock().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.mounted.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.mounted.lock().is_empty()
    }

    /// Handles an added registration. Returns the mounted type, if any.
    pub fn add(&self, key: &str, pair: Option<&TemplatePair>) -> Option<TypeDescriptor> {
        self.apply(key, pair)
    }

    /// Handles a changed registration: the old resource is removed, then the
    /// new pair is added.
    pub fn update(&self, key: &str, pair: Option<&TemplatePair>) -> Option<TypeDescriptor> {
        self.apply(key, pair)
    }

    /// Handles a removed registration.
    pub fn delete(&self, key: &str) {
        self.apply(key, None);
    }

    #[instrument(skip(self, pair))]
    fn apply(&self, key: &str, pair: Option<&TemplatePair>) -> Option<TypeDescriptor> {
        let mut mounted = self.mounted.lock();
        if let Some(old) = mounted.remove(key) {
            self.api.remove_resource(&old);
        }

        let Some(pair) = pair else {
            debug!("No template pair; nothing to mount");
            return None;
        };
        let codec = match self.compiler.compile(&pair.encoder, &pair.decoder) {
            Ok(codec) => codec,
            Err(e) => {
                error!(error = %e, "Failed to compile registration");
                return None;
            }
        };
        let descriptor = codec.source().clone();
        if let Some((other, _)) = mounted.iter().find(|(_, d)| **d == descriptor) {
            warn!(other = %other, "Registration replaces a resource mounted by another key");
        }
        self.api
            .add_resource(Arc::new(DynamicResource::new(codec, self.stores.clone())));
        mounted.insert(key.to_string(), descriptor.clone());
        Some(descriptor)
    }
}

/// Handle for a running directory watcher.
pub struct WatchHandle {
    handle: tokio::task::JoinHandle<()>,
    shutdown: CancellationToken,
}

impl WatchHandle {
    pub async fn stop(self) {
        self.shutdown.cancel();
        let _ = self.handle.await;
    }
}

/// Directory of `*.toml` registration files.
#[derive(Debug, Clone)]
pub struct RegistrationDir {
    dir: PathBuf,
    debounce: Duration,
}

impl RegistrationDir {
    pub fn new(dir: impl Into<PathBuf>, debounce: Duration) -> Self {
        Self {
            dir: dir.into(),
            debounce,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn is_registration(path: &Path) -> bool {
        path.extension().is_some_and(|ext| ext == "toml")
    }

    fn key(path: &Path) -> String {
        path.to_string_lossy().into_owned()
    }

    fn read(path: &Path) -> Option<TemplatePair> {
        match std::fs::read_to_string(path) {
            Ok(text) => TemplatePair::from_toml(&text),
            Err(e) => {
                debug!(path = ?path, error = %e, "Cannot read registration file");
                None
            }
        }
    }

    /// Adds every registration currently in the directory. Returns how many mounted.
    pub fn scan(&self, registrar: &Registrar) -> usize {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = ?self.dir, error = %e, "Cannot read registrations directory");
                return 0;
            }
        };
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| Self::is_registration(path))
            .collect();
        paths.sort();

        let mounted = paths
            .iter()
            .filter(|path| {
                registrar
                    .add(&Self::key(path), Self::read(path).as_ref())
                    .is_some()
            })
            .count();
        info!(dir = ?self.dir, files = paths.len(), mounted, "Loaded registrations");
        mounted
    }

    /// Re-reads one file after a change event.
    pub fn refresh(&self, registrar: &Registrar, path: &Path) {
        if !Self::is_registration(path) {
            return;
        }
        let key = Self::key(path);
        if path.exists() {
            info!(path = ?path, "Registration changed");
            registrar.update(&key, Self::read(path).as_ref());
        } else if registrar.mounted(&key).is_some() {
            info!(path = ?path, "Registration removed");
            registrar.delete(&key);
        }
    }

    /// Watches the directory and applies changes until stopped.
    pub fn watch(self, registrar: Arc<Registrar>) -> WatchHandle {
        let shutdown = CancellationToken::new();
        let stopped = shutdown.clone();

        let handle = tokio::spawn(async move {
            let (notify_tx, notify_rx) = std::sync::mpsc::channel();
            let mut debouncer = match new_debouncer(self.debounce, notify_tx) {
                Ok(d) => d,
                Err(e) => {
                    error!("Failed to create registrations watcher: {e}");
                    return;
                }
            };
            if let Err(e) = debouncer
                .watcher()
                .watch(&self.dir, RecursiveMode::NonRecursive)
            {
                error!("Failed to watch {:?}: {e}", self.dir);
                return;
            }
            info!("Watching registrations in {:?}", self.dir);

            loop {
                tokio::select! {
                    _ = stopped.cancelled() => {
                        info!("Registrations watcher shutting down");
                        break;
                    }
                    _ = tokio::time::sleep(Duration::from_millis(100)) => {
                        while let Ok(events) = notify_rx.try_recv() {
                            match events {
                                Ok(events) => {
                                    for event in events {
                                        self.refresh(&registrar, &event.path);
                                    }
                                }
                                Err(e) => error!("Registrations watcher error: {e:?}"),
                            }
                        }
                    }
                }
            }
        });

        WatchHandle { handle, shutdown }
    }
}
