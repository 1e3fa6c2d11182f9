//! Service wiring for the casino core
//!
//! `Casino` builds every component from a `CasinoConfig` and hands them out
//! as shared handles. Collaborators that a deployment may want to replace
//! (store, random source, shoe source, session store) can be injected with
//! `with_components`.

use crate::{
    config::{CasinoConfig, StorageBackend},
    errors::{CasinoResult, ConfigurationError},
    fairness::FairnessService,
    games::{
        BlackjackEngine, CardDeck, GameResult, GameType, RoundState, RouletteBet, RouletteEngine, ShoeSource,
        SpinResult,
    },
    reconciliation::{ReconciliationReport, ReconciliationWorker, Reconciler},
    rng::{OsRandomSource, RandomSource},
    session::{SessionStore, TtlSessionStore},
    storage::{KeyValueStore, MemoryStorage, OptimizedStorage},
    wallet::WalletLedger,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Casino core with all services wired together
pub struct Casino {
    config: CasinoConfig,
    store: Arc<dyn KeyValueStore>,
    ledger: Arc<WalletLedger>,
    fairness: Arc<FairnessService>,
    blackjack: Arc<BlackjackEngine>,
    roulette: Arc<RouletteEngine>,
    reconciler: Arc<Reconciler>,
    sessions: Arc<dyn SessionStore>,
}

impl Casino {
    /// Validate `config` and build the default components for it
    pub fn from_config(config: CasinoConfig) -> CasinoResult<Self> {
        Self::validate(&config)?;

        let store = Self::create_storage(&config)?;
        let rng: Arc<dyn RandomSource> = Arc::new(OsRandomSource);
        let shoes: Arc<dyn ShoeSource> = Arc::new(CardDeck::new(rng.clone()));
        let sessions: Arc<dyn SessionStore> = Arc::new(TtlSessionStore::new(config.session_ttl()));

        tracing::info!(
            backend = ?config.storage.backend,
            data_dir = %config.storage.data_directory,
            "Casino services initialized"
        );
        Self::with_components(config, store, rng, shoes, sessions)
    }

    /// Validate `config` and build around caller-supplied collaborators
    pub fn with_components(
        config: CasinoConfig,
        store: Arc<dyn KeyValueStore>,
        rng: Arc<dyn RandomSource>,
        shoes: Arc<dyn ShoeSource>,
        sessions: Arc<dyn SessionStore>,
    ) -> CasinoResult<Self> {
        Self::validate(&config)?;

        let ledger = Arc::new(WalletLedger::new(store.clone(), config.wallet.clone()));
        let fairness = Arc::new(FairnessService::new(store.clone(), rng.clone(), config.fairness.clone()));
        let blackjack = Arc::new(BlackjackEngine::new(
            store.clone(),
            ledger.clone(),
            shoes,
            fairness.clone(),
            config.blackjack.clone(),
        ));
        let roulette = Arc::new(RouletteEngine::new(
            ledger.clone(),
            rng,
            fairness.clone(),
            config.roulette.clone(),
        ));
        let reconciler = Arc::new(Reconciler::new(
            store.clone(),
            blackjack.clone(),
            config.reconciliation.clone(),
        ));

        Ok(Self {
            config,
            store,
            ledger,
            fairness,
            blackjack,
            roulette,
            reconciler,
            sessions,
        })
    }

    pub fn config(&self) -> &CasinoConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<dyn KeyValueStore> {
        Arc::clone(&self.store)
    }

    pub fn ledger(&self) -> Arc<WalletLedger> {
        Arc::clone(&self.ledger)
    }

    pub fn fairness(&self) -> Arc<FairnessService> {
        Arc::clone(&self.fairness)
    }

    pub fn blackjack(&self) -> Arc<BlackjackEngine> {
        Arc::clone(&self.blackjack)
    }

    pub fn roulette(&self) -> Arc<RouletteEngine> {
        Arc::clone(&self.roulette)
    }

    pub fn sessions(&self) -> Arc<dyn SessionStore> {
        Arc::clone(&self.sessions)
    }

    // Game entry points. Each successful action refreshes the player's session.

    pub fn deal(&self, user_id: u64, bet_amount: u64) -> GameResult<RoundState> {
        let state = self.blackjack.initialize_game(user_id, bet_amount)?;
        self.sessions.touch(user_id, GameType::Blackjack);
        Ok(state)
    }

    pub fn hit(&self, round_id: Uuid, user_id: u64) -> GameResult<RoundState> {
        let state = self.blackjack.hit(round_id, user_id)?;
        self.sessions.touch(user_id, GameType::Blackjack);
        Ok(state)
    }

    pub fn stand(&self, round_id: Uuid, user_id: u64) -> GameResult<RoundState> {
        let state = self.blackjack.stand(round_id, user_id)?;
        self.sessions.touch(user_id, GameType::Blackjack);
        Ok(state)
    }

    pub fn double_down(&self, round_id: Uuid, user_id: u64) -> GameResult<RoundState> {
        let state = self.blackjack.double_down(round_id, user_id)?;
        self.sessions.touch(user_id, GameType::Blackjack);
        Ok(state)
    }

    pub fn spin(&self, user_id: u64, bets: &[RouletteBet]) -> GameResult<SpinResult> {
        let result = self.roulette.spin(user_id, bets)?;
        self.sessions.touch(user_id, GameType::Roulette);
        Ok(result)
    }

    /// One reconciliation pass at the current time
    pub fn reconcile(&self) -> CasinoResult<ReconciliationReport> {
        self.reconcile_at(Utc::now())
    }

    /// One reconciliation pass treating `now` as the current time
    pub fn reconcile_at(&self, now: DateTime<Utc>) -> CasinoResult<ReconciliationReport> {
        let report = self.reconciler.reconcile(now)?;
        let purged = self.sessions.purge_expired();
        if purged > 0 {
            tracing::debug!(purged, "Expired sessions purged");
        }
        Ok(report)
    }

    /// Start the background reconciler. Must be called inside a tokio runtime.
    pub fn spawn_reconciliation_worker(&self) -> Arc<ReconciliationWorker> {
        ReconciliationWorker::spawn(self.reconciler.clone(), self.config.scan_interval())
    }

    // Private factory methods
    fn validate(config: &CasinoConfig) -> CasinoResult<()> {
        config.validate().map_err(ConfigurationError::from)?;
        Ok(())
    }

    fn create_storage(config: &CasinoConfig) -> CasinoResult<Arc<dyn KeyValueStore>> {
        let store: Arc<dyn KeyValueStore> = match config.storage.backend {
            StorageBackend::RocksDb => Arc::new(OptimizedStorage::new_with_config(&config.storage)?),
            StorageBackend::Memory => Arc::new(MemoryStorage::new()),
        };
        Ok(store)
    }
}
