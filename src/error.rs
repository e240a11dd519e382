use std::fmt;

use thiserror::Error;

/// Which side of a registration a realm was being resolved for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextRole {
    Emitter,
    Handler,
}

impl fmt::Display for ContextRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextRole::Emitter => f.write_str("emitter"),
            ContextRole::Handler => f.write_str("handler"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ListenError {
    #[error("unable to resolve the allocation context of the {0}")]
    ContextResolution(ContextRole),
    #[error("failed to parse listener options: {0}")]
    Options(#[from] serde_yaml::Error),
}
