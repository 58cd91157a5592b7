use std::sync::Arc;

use crate::domain::model::AppConfig;
use crate::ports::{
    clock::Clock, documents::DocumentStore, random::RandomSource, repo::Repo,
    source::SourceFetcher,
};

/// Everything a run needs: configuration plus one handle per port.
pub struct AppContext<R, S, D, C, G>
where
    R: Repo,
    S: SourceFetcher,
    D: DocumentStore,
    C: Clock,
    G: RandomSource,
{
    pub cfg: AppConfig,
    pub repo: Arc<R>,
    pub source: Arc<S>,
    pub documents: Arc<D>,
    pub clock: Arc<C>,
    pub rng: Arc<G>,
}
