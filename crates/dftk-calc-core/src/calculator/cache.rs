use crate::model::Basis;
use std::fmt::{Display, Formatter};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidationReason {
    ParametersChanged,
    StructureChanged,
    OverrideInstalled,
    Reset,
    RecordLoaded,
}

impl InvalidationReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ParametersChanged => "parameters changed",
            Self::StructureChanged => "structure changed",
            Self::OverrideInstalled => "model or basis override installed",
            Self::Reset => "reset",
            Self::RecordLoaded => "record loaded",
        }
    }
}

impl Display for InvalidationReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A converged solution together with the basis it was solved on.
#[derive(Debug, Clone)]
pub struct CachedState<T> {
    pub basis: Basis,
    pub solution: T,
}

#[derive(Debug, Clone)]
pub enum CacheState<T> {
    Stale,
    Fresh(CachedState<T>),
}

impl<T> Default for CacheState<T> {
    fn default() -> Self {
        Self::Stale
    }
}

impl<T> CacheState<T> {
    pub fn is_fresh(&self) -> bool {
        matches!(self, Self::Fresh(_))
    }

    pub fn cached(&self) -> Option<&CachedState<T>> {
        match self {
            Self::Fresh(state) => Some(state),
            Self::Stale => None,
        }
    }

    /// Drops any cached solution. Returns whether one was present.
    pub fn invalidate(&mut self, reason: InvalidationReason) -> bool {
        let was_fresh = self.is_fresh();
        *self = Self::Stale;
        if was_fresh {
            debug!(%reason, "cache fresh -> stale");
        } else {
            debug!(%reason, "cache already stale");
        }
        was_fresh
    }

    pub fn commit(&mut self, basis: Basis, solution: T) {
        debug!(kgrid = %basis.kgrid, "cache stale -> fresh");
        *self = Self::Fresh(CachedState { basis, solution });
    }
}
