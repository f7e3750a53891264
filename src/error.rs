//! Error type shared by every phase of the demo.

/// Everything that can end a run early.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No head-mounted display could be opened. This is the only failure the user is told
    /// about through a modal dialog.
    #[error("failed initializing HMD, make sure it is connected and turned on")]
    NoDevice,

    /// A session call was made before `HmdRuntime::initialize` or after `shutdown`.
    #[error("the HMD runtime is not initialized")]
    RuntimeNotInitialized,

    /// The HMD runtime rejected a request.
    #[error("HMD runtime error: {0}")]
    Runtime(String),

    /// HLSL compilation failed; `message` carries the compiler output.
    #[error("shader compilation failed for `{entry_point}` ({profile}): {message}")]
    ShaderCompilation {
        entry_point: String,
        profile: String,
        message: String,
    },

    /// A platform API call (Direct3D, DXGI, Win32, OpenXR) failed.
    #[error("{api} call failed: {source}")]
    Backend {
        api: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl Error {
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime(message.into())
    }

    pub fn backend(
        api: &'static str,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Backend {
            api,
            source: Box::new(source),
        }
    }

    /// Process exit status for this failure. Always non-zero.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::NoDevice => 1,
            _ => 2,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
