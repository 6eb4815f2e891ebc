//! Stagelight is a small showcase runtime: it loads a model and an
//! environment map asynchronously, stands them on a lit stage with a
//! turntable animation, and renders the result with orbit controls,
//! shadow mapping and configurable tone mapping.
//!
//! The library half is window-free; [`app::App`] owns the scene, camera
//! and loader, and the binary wires it to a window and GPU surface.

pub mod animation;
pub mod app;
pub mod assets;
pub mod camera;
pub mod config;
pub mod geometry;
pub mod obj;
pub mod panel;
pub mod render;
pub mod scene;

pub use app::{App, StopHandle};
pub use config::StageConfig;
pub use scene::Scene;
