//! Shared error type for IR structural checks.
use thiserror::Error;

use crate::modules::{
    InstrId,
    operand::{Label, Name},
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("function `{function}` has no entry block")]
    MissingEntryBlock { function: String },

    #[error("SSA name {duplicate} is defined more than once")]
    DuplicateSsaName { duplicate: Name },

    #[error("SSA name {undefined} is used but never defined")]
    UndefinedSsaName { undefined: Name },

    #[error("instruction identity {duplicate} is used more than once")]
    DuplicateInstrId { duplicate: InstrId },

    #[error("terminator targets {undefined} which does not exist")]
    UndefinedLabel { undefined: Label },
}
