use thiserror::Error;

/// Batch-level loader failures. Individual malformed records never produce
/// one of these; they are counted in the `LoadReport` instead.
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("warehouse error: {0}")]
    Db(#[from] tgmi_db::DbError),

    #[error(transparent)]
    Lake(#[from] tgmi_collector::LakeError),

    #[error(transparent)]
    DetectionFile(#[from] tgmi_vision::DetectionFileError),

    #[error("in-memory warehouse lock poisoned")]
    Poisoned,
}

/// Failure of the external transform stage.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("failed to launch `{program} {step}`: {source}")]
    Spawn {
        program: String,
        step: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("`{program} {step}` exited with {status}: {stderr}")]
    Failed {
        program: String,
        step: &'static str,
        status: String,
        stderr: String,
    },
}
