//! # vswitch Configuration
//!
//! - [`settings`]: runtime settings of a context, layered from defaults, an
//!   optional TOML file and `VSWITCH_*` environment variables
//! - [`snapshot`]: the persisted component set and its argument model
//! - [`codec`]: file codecs for snapshots (TOML, JSON)

pub mod codec;
pub mod error;
pub mod settings;
pub mod snapshot;

pub use codec::{codec_for_path, load_snapshot, save_snapshot, ConfigCodec, JsonCodec, TomlCodec};
pub use error::{ConfigError, Result};
pub use settings::{ContextSettings, LogSettings, PacketSettings, RegistrySettings, ENV_PREFIX};
pub use snapshot::{
    ComponentArgs, ComponentKind, ComponentRecord, ConfigSnapshot, ConnectionManagerArgs,
    TransportArgs,
};
