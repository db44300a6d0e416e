use crate::actions::ActionContextType;
use crate::store::BlockId;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid block id `{0}`")]
    InvalidBlockId(String),
    #[error("block `{0}` not found")]
    BlockNotFound(BlockId),
    #[error("block `{0}` already exists")]
    DuplicateBlock(BlockId),
    #[error("repository was dropped")]
    RepoClosed,
    #[error("block `{0}` is a root block")]
    RootBlock(BlockId),
    #[error("block `{0}` cannot be moved under itself or a descendant")]
    CycleDetected(BlockId),
    #[error("block `{child}` is not linked under `{parent}`")]
    NotLinked { parent: BlockId, child: BlockId },
    #[error("unknown action `{0}`")]
    UnknownAction(String),
    #[error("context `{0}` is not registered")]
    UnknownContext(ActionContextType),
    #[error("context `{0}` is not active")]
    ContextInactive(ActionContextType),
    #[error("invalid dependencies for context `{context}` at {phase}")]
    InvalidDependencies {
        context: ActionContextType,
        phase: ValidationPhase,
    },
    #[error("invalid key combination `{0}`")]
    InvalidKeyCombo(String),
    #[error("could not resolve a project directory")]
    ProjectDir,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValidationPhase {
    Activation,
    Dispatch,
}

impl std::fmt::Display for ValidationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationPhase::Activation => f.write_str("activation"),
            ValidationPhase::Dispatch => f.write_str("dispatch"),
        }
    }
}
