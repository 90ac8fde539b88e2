/// Mesh-level errors.
///
/// Wraps transport errors and adds routing-specific variants.
#[derive(Debug, thiserror::Error)]
pub enum MeshError {
    #[error("transport error: {0}")]
    Transport(#[from] mesh_transport::TransportError),

    #[error("invalid envelope: {reason}")]
    InvalidEnvelope { reason: String },

    #[error("malformed frame: {reason}")]
    MalformedFrame { reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("mesh component shut down")]
    Shutdown,
}

impl From<serde_json::Error> for MeshError {
    fn from(e: serde_json::Error) -> Self {
        MeshError::InvalidEnvelope {
            reason: e.to_string(),
        }
    }
}
