use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::debug;
use thiserror::Error;

use crate::geometry::MeshData;
use crate::obj::load_obj_from_str;
use crate::scene::{EnvironmentMap, MappingMode};

/// Failure at the loader boundary. Never fatal to the render loop.
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("unable to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {message}")]
    Parse { path: String, message: String },
    #[error("unsupported format for {path}: {detail}")]
    UnsupportedFormat { path: String, detail: String },
}

/// Fully parsed model resource, ready to attach to the graph.
#[derive(Debug, Clone)]
pub struct LoadedModel {
    pub name: String,
    pub path: String,
    pub mesh: Arc<MeshData>,
}

/// Completion message delivered to the update thread.
#[derive(Debug)]
pub enum LoadEvent {
    Model(LoadedModel),
    Environment(EnvironmentMap),
    Failed { path: String, error: AssetError },
}

/// Spawns one worker per requested resource and funnels completions through
/// a channel drained on the update thread, so a completion is only ever
/// observed between render ticks, never concurrently with one.
pub struct AssetLoader {
    sender: Sender<LoadEvent>,
    receiver: Receiver<LoadEvent>,
    running: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

impl Default for AssetLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl AssetLoader {
    pub fn new() -> Self {
        let (sender, receiver) = channel();
        Self {
            sender,
            receiver,
            running: Arc::new(AtomicBool::new(true)),
            workers: Vec::new(),
        }
    }

    /// Number of loads requested so far.
    pub fn requested(&self) -> usize {
        self.workers.len()
    }

    /// Requests an OBJ model; the completion carries `name` for attachment.
    pub fn request_model(&mut self, name: impl Into<String>, path: impl Into<String>) {
        let name = name.into();
        let path = path.into();
        self.spawn(path.clone(), move |p| {
            load_model_file(&name, p).map(LoadEvent::Model)
        });
    }

    /// Requests an equirectangular environment map.
    pub fn request_environment(&mut self, path: impl Into<String>) {
        self.spawn(path.into(), |p| {
            load_environment_file(p).map(LoadEvent::Environment)
        });
    }

    fn spawn<F>(&mut self, path: String, load: F)
    where
        F: FnOnce(&str) -> Result<LoadEvent, AssetError> + Send + 'static,
    {
        let sender = self.sender.clone();
        let running = Arc::clone(&self.running);
        let handle = thread::spawn(move || {
            let event = match load(&path) {
                Ok(event) => event,
                Err(error) => LoadEvent::Failed { path, error },
            };
            if running.load(Ordering::Acquire) {
                // The receiver may already be gone during shutdown.
                let _ = sender.send(event);
            }
        });
        self.workers.push(handle);
    }

    /// Takes every completion that has arrived since the last drain.
    pub fn drain(&mut self) -> Vec<LoadEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }

    /// Blocks until every in-flight load has finished.
    pub fn wait(&mut self) {
        for handle in std::mem::take(&mut self.workers) {
            if handle.join().is_err() {
                debug!("asset worker panicked");
            }
        }
    }

    /// Stops accepting completions and joins the workers.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        self.wait();
    }
}

impl Drop for AssetLoader {
    fn drop(&mut self) {
        self.stop();
    }
}

fn load_model_file(name: &str, path: &str) -> Result<LoadedModel, AssetError> {
    let contents = fs::read_to_string(path).map_err(|source| AssetError::Io {
        path: path.to_string(),
        source,
    })?;
    let mesh = load_obj_from_str(&contents).map_err(|err| AssetError::Parse {
        path: path.to_string(),
        message: format!("{err:#}"),
    })?;
    debug!(
        "parsed model {path}: {} vertices, {} triangles",
        mesh.vertex_count(),
        mesh.triangle_count()
    );
    Ok(LoadedModel {
        name: name.to_string(),
        path: path.to_string(),
        mesh: Arc::new(mesh),
    })
}

/// Validates a Radiance HDR header and extracts the image dimensions.
///
/// Pixel decoding is out of scope; the environment contributes a mapping tag
/// and an intensity, both resolved elsewhere.
fn load_environment_file(path: &str) -> Result<EnvironmentMap, AssetError> {
    let bytes = fs::read(path).map_err(|source| AssetError::Io {
        path: path.to_string(),
        source,
    })?;
    parse_hdr_header(path, &bytes)
}

fn parse_hdr_header(path: &str, bytes: &[u8]) -> Result<EnvironmentMap, AssetError> {
    let header_len = bytes.len().min(512);
    let header = String::from_utf8_lossy(&bytes[..header_len]);
    let mut lines = header.lines();

    match lines.next() {
        Some(magic) if magic.starts_with("#?RADIANCE") || magic.starts_with("#?RGBE") => {}
        _ => {
            return Err(AssetError::UnsupportedFormat {
                path: path.to_string(),
                detail: "missing Radiance magic".to_string(),
            })
        }
    }

    for line in lines {
        let trimmed = line.trim();
        // Resolution line: "-Y <height> +X <width>".
        let mut parts = trimmed.split_whitespace();
        if parts.next() == Some("-Y") {
            let height = parts.next().and_then(|v| v.parse::<u32>().ok());
            let width = match (parts.next(), parts.next()) {
                (Some("+X"), Some(v)) => v.parse::<u32>().ok(),
                _ => None,
            };
            if let (Some(height), Some(width)) = (height, width) {
                let name = Path::new(path)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.to_string());
                return Ok(EnvironmentMap {
                    name,
                    width,
                    height,
                    mapping: MappingMode::EquirectangularReflection,
                });
            }
        }
    }

    Err(AssetError::UnsupportedFormat {
        path: path.to_string(),
        detail: "missing resolution line".to_string(),
    })
}
