use std::sync::Arc;

use crate::admin::CorrectionService;
use crate::oracle::PriceOracle;
use crate::reconcile::ReconciledView;
use crate::requests::RequestService;
use crate::store::Backend;
use crate::swap::{SwapEngine, SwapSettings};

/// Shared gateway state; every service runs over the same backend
pub struct AppState {
    pub backend: Arc<dyn Backend>,
    pub swaps: SwapEngine,
    pub requests: RequestService,
    pub movements: ReconciledView,
    pub corrections: CorrectionService,
}

impl AppState {
    pub fn new(
        backend: Arc<dyn Backend>,
        oracle: Arc<dyn PriceOracle>,
        asset_id: impl Into<String>,
        settings: SwapSettings,
    ) -> Self {
        let default_currency = settings.default_currency.clone();
        Self {
            swaps: SwapEngine::new(backend.clone(), oracle, asset_id, settings),
            requests: RequestService::new(backend.clone(), default_currency.clone()),
            movements: ReconciledView::new(backend.clone()),
            corrections: CorrectionService::new(backend.clone(), default_currency),
            backend,
        }
    }
}
