#![warn(clippy::all)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

//! Distributed ray-tracing service.
//!
//! A master process owns a scene and repeatedly produces rendered frames
//! by fanning tile-sized work units out to a pool of compute slaves,
//! gathering the returned pixel tiles, and serving assembled frames to
//! interactive observers, whose input events steer the camera and fire
//! shotline/spall-cone probes.

pub mod config;
pub mod errors;
pub mod master;
pub mod observer;
pub mod protocol;
pub mod scene;
pub mod slave;
pub mod sync;
pub mod wire;

pub use config::{MasterConfig, ObserverConfig, Profile, SlaveConfig};
pub use errors::{RaynetError, Result};
pub use master::{CameraConsole, CameraRig, MasterHandle, NullBridge, ScriptingBridge};
pub use observer::{Display, HeadlessDisplay, ObserverClient};
pub use protocol::{Overlay, ProbeReport, WireEvent, WorkHeader};
pub use scene::{CameraState, Environment, Mesh, Property, RenderMode, SceneDb, Texture};
pub use slave::{Engine, SolidEngine};
