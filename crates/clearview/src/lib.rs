pub mod broadcast;
pub mod config;
pub mod error;
pub mod item;
pub mod port;
pub mod queue;
pub mod secrets;
pub mod workspace;

pub use broadcast::{ItemEvent, ItemEventBroadcaster, ItemEventKind};
pub use config::{load_config, Config};
pub use error::{
    ClearviewError, ConfigError, CredentialError, IntakeError, ProcessError, Result,
    WorkspaceError,
};
pub use item::{
    Artifact, AspectRatio, BatchItem, IntakeFile, ItemId, JobConfig, ProcessingStatus,
    SourcePayload, VideoResolution,
};
pub use port::{
    ConfiguredCredential, CredentialProvider, DispatchJob, GeminiClient, RemoteProcessor,
    StaticCredential, VideoJobParams, VideoReconstructor, WatermarkRemover,
};
pub use queue::{CredentialAlert, DrainPolicy, DriverState, ItemStore, StartPolicy, StoreStats};
pub use secrets::{resolve_secret, SecretError};
pub use workspace::{
    IntakeRejection, IntakeReport, Workspace, WorkspaceMode, WorkspaceOptions, WorkspaceStats,
};
