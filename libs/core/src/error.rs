//! Context Error Types
//!
//! One variant per failure class a caller of the context or component API can
//! act on. [`ContextError::errno`] gives the POSIX code for callers that speak
//! integer error codes.

use nix::errno::Errno;
use thiserror::Error;
use vswitch_config::{ComponentKind, ConfigError};
use vswitch_packet::PacketError;

#[derive(Error, Debug)]
pub enum ContextError {
    /// Context capacity or another finite resource is used up
    #[error("Resource exhausted: {resource}: {message}")]
    ResourceExhausted { resource: String, message: String },

    #[error("Component not found: {name}")]
    ComponentNotFound { name: String },

    /// No implementation registered for the `(kind, family)` pair
    #[error("No {kind} implementation for family '{family}'")]
    FamilyNotFound { kind: ComponentKind, family: String },

    #[error("Component name '{name}' is already taken")]
    NameCollision { name: String },

    /// Removal blocked by live back-references
    #[error("Component '{name}' is in use by {holders} reference(s)")]
    InUse { name: String, holders: usize },

    /// Event handler lacks a required operation
    #[error("Malformed event handler: missing {missing}")]
    MalformedHandler { missing: String },

    #[error("Context is already initialized")]
    AlreadyInitialized,

    #[error("Invalid state for {operation}: context is {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    /// The event handler returned no token
    #[error("Event registration failed: {operation}")]
    Registration { operation: &'static str },

    #[error("Invalid arguments for '{component}': {message}")]
    InvalidArguments { component: String, message: String },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Packet(#[from] PacketError),

    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for context operations
pub type Result<T> = std::result::Result<T, ContextError>;

impl ContextError {
    pub fn resource_exhausted(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ResourceExhausted {
            resource: resource.into(),
            message: message.into(),
        }
    }

    pub fn not_found(name: impl Into<String>) -> Self {
        Self::ComponentNotFound { name: name.into() }
    }

    pub fn family_not_found(kind: ComponentKind, family: impl Into<String>) -> Self {
        Self::FamilyNotFound {
            kind,
            family: family.into(),
        }
    }

    pub fn name_collision(name: impl Into<String>) -> Self {
        Self::NameCollision { name: name.into() }
    }

    pub fn in_use(name: impl Into<String>, holders: usize) -> Self {
        Self::InUse {
            name: name.into(),
            holders,
        }
    }

    pub fn malformed_handler(missing: impl Into<String>) -> Self {
        Self::MalformedHandler {
            missing: missing.into(),
        }
    }

    pub fn invalid_state(operation: &'static str, state: &'static str) -> Self {
        Self::InvalidState { operation, state }
    }

    pub fn registration(operation: &'static str) -> Self {
        Self::Registration { operation }
    }

    pub fn invalid_arguments(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            component: component.into(),
            message: message.into(),
        }
    }

    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    /// POSIX error code for this failure
    pub fn errno(&self) -> Errno {
        match self {
            Self::ResourceExhausted { .. } => Errno::ENOMEM,
            Self::ComponentNotFound { .. } | Self::FamilyNotFound { .. } => Errno::ENOENT,
            Self::NameCollision { .. } => Errno::EEXIST,
            Self::InUse { .. } => Errno::EBUSY,
            Self::AlreadyInitialized => Errno::EALREADY,
            Self::MalformedHandler { .. }
            | Self::InvalidState { .. }
            | Self::InvalidArguments { .. }
            | Self::Packet(_) => Errno::EINVAL,
            Self::Registration { .. } => Errno::EIO,
            Self::Config(ConfigError::Io { source, .. }) | Self::Io { source, .. } => source
                .raw_os_error()
                .map(Errno::from_raw)
                .unwrap_or(Errno::EIO),
            Self::Config(_) => Errno::EINVAL,
        }
    }
}

impl From<Errno> for ContextError {
    fn from(errno: Errno) -> Self {
        Self::io(errno.desc(), errno.into())
    }
}
