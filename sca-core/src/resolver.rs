//! SCA approach resolution.
//!
//! Pure lookup: which of the three delivery approaches governs an
//! authorisation. An unknown or not-yet-bound authorisation resolves to
//! [`ApproachResolution::Unbound`], never to an error; the caller falls
//! back to the bank default and binds it on first persistence.

use crate::store::{LifecycleStore, Lookup};
use sca_spi::ScaApproach;
use std::sync::Arc;

/// Outcome of a per-authorisation approach lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApproachResolution {
    /// The authorisation already carries a bound approach.
    Bound(ScaApproach),
    /// No binding yet (or no such authorisation); use the default.
    Unbound,
}

impl ApproachResolution {
    /// The effective approach, falling back to `default` when unbound.
    pub fn or_default(self, default: ScaApproach) -> ScaApproach {
        match self {
            ApproachResolution::Bound(approach) => approach,
            ApproachResolution::Unbound => default,
        }
    }
}

/// Resolves the SCA approach for authorisations against one bank profile.
pub struct ScaApproachResolver {
    default_approach: ScaApproach,
    store: Arc<dyn LifecycleStore>,
}

impl ScaApproachResolver {
    pub fn new(default_approach: ScaApproach, store: Arc<dyn LifecycleStore>) -> Self {
        Self {
            default_approach,
            store,
        }
    }

    /// The bank-wide configured default approach.
    pub fn resolve_default(&self) -> ScaApproach {
        self.default_approach
    }

    /// The approach bound to an existing authorisation, if any.
    pub async fn resolve_for(&self, authorisation_id: &str) -> ApproachResolution {
        match self.store.get_authorisation(authorisation_id).await {
            Lookup::Found(record) => match record.value.sca_approach {
                Some(approach) => ApproachResolution::Bound(approach),
                None => ApproachResolution::Unbound,
            },
            Lookup::NotFound => ApproachResolution::Unbound,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Authorisation;
    use crate::store::InMemoryLifecycleStore;
    use sca_spi::ParentKind;

    #[tokio::test]
    async fn unknown_id_resolves_to_unbound_not_error() {
        let store = Arc::new(InMemoryLifecycleStore::new());
        let resolver = ScaApproachResolver::new(ScaApproach::Embedded, store);

        let resolution = resolver.resolve_for("missing").await;
        assert_eq!(resolution, ApproachResolution::Unbound);
        assert_eq!(
            resolution.or_default(resolver.resolve_default()),
            ScaApproach::Embedded
        );
    }

    #[tokio::test]
    async fn bound_approach_wins_over_default() {
        let store = Arc::new(InMemoryLifecycleStore::new());
        let mut auth = Authorisation::new("a1", "c1", ParentKind::Consent);
        auth.sca_approach = Some(ScaApproach::Redirect);
        store.insert_authorisation(auth).await.unwrap();

        let resolver = ScaApproachResolver::new(ScaApproach::Embedded, store);
        assert_eq!(
            resolver.resolve_for("a1").await,
            ApproachResolution::Bound(ScaApproach::Redirect)
        );
    }
}
