//! Swap engine
//!
//! Balance check, price acquisition, then both balance moves and both
//! ledger legs in a single posting. The store re-checks the debit under its
//! own lock, so a concurrent debit from another process still fails cleanly.

use chrono::Utc;
use rand::Rng;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};

use super::error::SwapError;
use super::locks::UserLocks;
use super::types::{SwapOutcome, SwapRequest, SwapSettings, SwapSummary};
use crate::account::User;
use crate::core_types::Asset;
use crate::ledger::{EntryMetadata, EntryType, Posting, PostingLeg, SwapLeg, SwapMetadata};
use crate::money::{parse_amount, round_down, scale_for};
use crate::oracle::{OracleError, PriceOracle};
use crate::store::Backend;

pub struct SwapEngine {
    backend: Arc<dyn Backend>,
    oracle: Arc<dyn PriceOracle>,
    /// Oracle id of the secondary asset
    asset_id: String,
    settings: SwapSettings,
    locks: UserLocks,
}

/// `SWP-<millis>-<8 hex>`
fn swap_reference() -> String {
    let suffix: u32 = rand::thread_rng().r#gen();
    format!("SWP-{}-{:08X}", Utc::now().timestamp_millis(), suffix)
}

impl SwapEngine {
    pub fn new(
        backend: Arc<dyn Backend>,
        oracle: Arc<dyn PriceOracle>,
        asset_id: impl Into<String>,
        settings: SwapSettings,
    ) -> Self {
        Self {
            backend,
            oracle,
            asset_id: asset_id.into(),
            settings,
            locks: UserLocks::new(),
        }
    }

    /// User currency, then caller currency, then the platform default
    fn quote_currency(&self, user: &User, requested: Option<&str>) -> String {
        user.currency
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .or(requested.filter(|c| !c.trim().is_empty()))
            .unwrap_or(&self.settings.default_currency)
            .trim()
            .to_uppercase()
    }

    /// Amount received for `from_amount`, rounded toward zero at the target scale
    pub fn convert(from: Asset, from_amount: Decimal, rate: Decimal) -> Result<Decimal, SwapError> {
        let raw = match from {
            Asset::Fiat => from_amount.checked_div(rate),
            Asset::Secondary => from_amount.checked_mul(rate),
        }
        .ok_or_else(|| SwapError::Validation("amount out of range".into()))?;
        Ok(round_down(raw, from.other()))
    }

    pub async fn swap(&self, req: SwapRequest) -> Result<SwapOutcome, SwapError> {
        let from: Asset = req.from_asset.parse().map_err(SwapError::Validation)?;
        let to: Asset = req.to_asset.parse().map_err(SwapError::Validation)?;
        if from == to {
            return Err(SwapError::Validation(
                "from_asset and to_asset must differ".into(),
            ));
        }
        let from_amount = parse_amount(&req.from_amount, scale_for(from))?;

        let _guard = self.locks.acquire(req.user_id).await;

        let user = self
            .backend
            .get_user(req.user_id)
            .await
            .map_err(|e| SwapError::Persistence(e.to_string()))?
            .ok_or(SwapError::UserNotFound(req.user_id))?;

        let available = user.balance(from);
        if available < from_amount {
            return Err(SwapError::InsufficientFunds {
                asset: from,
                available,
                required: from_amount,
            });
        }

        let quote = self.quote_currency(&user, req.user_currency.as_deref());
        let rate = match self.oracle.fetch_rate(&self.asset_id, &quote).await {
            Ok(rate) => rate,
            Err(OracleError::UnsupportedCurrency(c)) => {
                return Err(SwapError::Validation(format!("unsupported quote currency {}", c)));
            }
            Err(e) => {
                warn!(user_id = %user.id, currency = %quote, error = %e, "Swap rejected: no rate");
                return Err(SwapError::RateUnavailable(e.to_string()));
            }
        };

        let to_amount = Self::convert(from, from_amount, rate)?;
        if to_amount <= Decimal::ZERO {
            return Err(SwapError::Validation(format!(
                "{} {} converts to zero {}",
                from_amount, from, to
            )));
        }

        let (fiat_amount, secondary_amount) = match from {
            Asset::Fiat => (from_amount, to_amount),
            Asset::Secondary => (to_amount, from_amount),
        };
        // value of the secondary side at the swap rate
        let secondary_value = secondary_amount
            .checked_mul(rate)
            .map(|v| round_down(v, Asset::Fiat))
            .ok_or_else(|| SwapError::Validation("amount out of range".into()))?;
        let fiat_equivalent = |asset: Asset| match asset {
            Asset::Fiat => fiat_amount,
            Asset::Secondary => secondary_value,
        };
        let currency_of = |asset: Asset| match asset {
            Asset::Fiat => quote.clone(),
            Asset::Secondary => self.settings.secondary_symbol.clone(),
        };

        let base = swap_reference();
        let make_leg = |leg: SwapLeg, asset: Asset, amount: Decimal, counterpart: Asset, counterpart_amount: Decimal| {
            let entry_type = match leg {
                SwapLeg::Out => EntryType::TransferOut,
                SwapLeg::In => EntryType::TransferIn,
            };
            PostingLeg {
                user_id: user.id,
                asset,
                amount,
                entry_type,
                currency: currency_of(asset),
                reference: leg.reference(&base),
                description: format!("Swap {} {} to {} {}", from_amount, from, to_amount, to),
                metadata: EntryMetadata::Swap(SwapMetadata {
                    swap_reference: base.clone(),
                    leg,
                    rate,
                    quote_currency: quote.to_lowercase(),
                    fiat_equivalent: fiat_equivalent(asset),
                    fee: Decimal::ZERO,
                    counterpart_asset: counterpart,
                    counterpart_amount,
                }),
            }
        };

        let posting = Posting::new()
            .leg(make_leg(SwapLeg::Out, from, from_amount, to, to_amount))
            .leg(make_leg(SwapLeg::In, to, to_amount, from, from_amount));

        let receipt = self.backend.settle(posting).await.map_err(|e| match SwapError::from(e) {
            SwapError::InsufficientFunds { asset, .. } => SwapError::InsufficientFunds {
                asset,
                available,
                required: from_amount,
            },
            other => other,
        })?;

        let new_balances = receipt
            .balance_of(user.id)
            .cloned()
            .ok_or_else(|| SwapError::Persistence("posting returned no balances".into()))?;

        info!(
            user_id = %user.id,
            reference = %base,
            from = %from,
            to = %to,
            %from_amount,
            %to_amount,
            %rate,
            "Swap settled"
        );

        Ok(SwapOutcome {
            swap: SwapSummary {
                from_asset: from,
                to_asset: to,
                from_amount,
                to_amount,
                rate,
                quote_currency: quote,
                fee: Decimal::ZERO,
                reference: base,
            },
            transactions: receipt.entries,
            new_balances,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::find_unpaired_swaps;
    use crate::oracle::OracleError;
    use crate::store::{LedgerQuery, LedgerStore, MemoryStore, Settlement, UserStore};
    use async_trait::async_trait;
    use std::str::FromStr;
    use std::sync::Mutex;

    /// Fixed rate or permanent failure; records the currencies asked for
    struct FixedOracle {
        rate: Option<Decimal>,
        asked: Mutex<Vec<String>>,
    }

    impl FixedOracle {
        fn new(rate: Option<i64>) -> Arc<Self> {
            Arc::new(Self {
                rate: rate.map(|r| Decimal::new(r, 0)),
                asked: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl PriceOracle for FixedOracle {
        async fn fetch_rate(&self, _asset: &str, quote: &str) -> Result<Decimal, OracleError> {
            self.asked.lock().unwrap().push(quote.to_string());
            if !["USD", "EUR", "GBP"].contains(&quote) {
                return Err(OracleError::UnsupportedCurrency(quote.to_string()));
            }
            self.rate.ok_or(OracleError::RateUnavailable {
                attempts: 4,
                last_error: "HTTP 503".into(),
            })
        }
    }

    async fn setup(fiat: i64, rate: Option<i64>) -> (SwapEngine, Arc<MemoryStore>, Arc<FixedOracle>, User) {
        let store = Arc::new(MemoryStore::new());
        let user = store
            .create_user(User::new("s@x.io", "S").with_balances(Decimal::new(fiat, 0), Decimal::ZERO))
            .await
            .unwrap();
        let oracle = FixedOracle::new(rate);
        let engine = SwapEngine::new(store.clone(), oracle.clone(), "bitcoin", SwapSettings::default());
        (engine, store, oracle, user)
    }

    fn request(user: &User, from: &str, to: &str, amount: &str) -> SwapRequest {
        SwapRequest {
            user_id: user.id,
            from_asset: from.into(),
            to_asset: to.into(),
            from_amount: amount.into(),
            user_currency: None,
        }
    }

    #[tokio::test]
    async fn test_fiat_to_secondary() {
        let (engine, store, _, user) = setup(1000, Some(50000)).await;
        let out = engine.swap(request(&user, "fiat", "secondary", "100")).await.unwrap();

        assert_eq!(out.swap.to_amount, Decimal::from_str("0.002").unwrap());
        assert_eq!(out.swap.fee, Decimal::ZERO);
        assert_eq!(out.new_balances.fiat, Decimal::new(900, 0));
        assert_eq!(out.new_balances.secondary, Decimal::from_str("0.002").unwrap());

        assert_eq!(out.transactions.len(), 2);
        let debit = &out.transactions[0];
        let credit = &out.transactions[1];
        assert_eq!(debit.entry_type, EntryType::TransferOut);
        assert_eq!(debit.balance_after, Decimal::new(900, 0));
        assert_eq!(credit.entry_type, EntryType::TransferIn);
        assert_eq!(credit.balance_after, Decimal::from_str("0.002").unwrap());
        assert!(debit.reference.ends_with("-OUT"));
        assert!(credit.reference.ends_with("-IN"));

        let swaps = store.find_swap_entries(Some(user.id)).await.unwrap();
        assert!(find_unpaired_swaps(&swaps).is_empty());
    }

    #[tokio::test]
    async fn test_secondary_to_fiat_rounds_down() {
        let (engine, store, _, user) = setup(0, Some(33333)).await;
        store
            .settle(Posting::new().leg(PostingLeg {
                user_id: user.id,
                asset: Asset::Secondary,
                amount: Decimal::ONE,
                entry_type: EntryType::Deposit,
                currency: "BTC".into(),
                reference: "SEED".into(),
                description: String::new(),
                metadata: EntryMetadata::None,
            }))
            .await
            .unwrap();

        let out = engine
            .swap(request(&user, "secondary", "fiat", "0.00012345"))
            .await
            .unwrap();
        // 0.00012345 * 33333 = 4.11495885
        assert_eq!(out.swap.to_amount, Decimal::from_str("4.11").unwrap());
        assert_eq!(out.new_balances.secondary, Decimal::from_str("0.99987655").unwrap());
    }

    #[tokio::test]
    async fn test_insufficient_funds_writes_nothing() {
        let (engine, store, oracle, user) = setup(50, Some(50000)).await;
        let err = engine.swap(request(&user, "fiat", "secondary", "100")).await.unwrap_err();
        assert!(matches!(err, SwapError::InsufficientFunds { asset: Asset::Fiat, .. }));
        assert!(oracle.asked.lock().unwrap().is_empty());
        assert_eq!(store.count_entries(&LedgerQuery::default()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_oracle_down_is_fail_closed() {
        let (engine, store, _, user) = setup(1000, None).await;
        let err = engine.swap(request(&user, "fiat", "secondary", "100")).await.unwrap_err();
        assert_eq!(err.http_status(), 503);

        let stored = store.get_user(user.id).await.unwrap().unwrap();
        assert_eq!(stored.fiat_balance, Decimal::new(1000, 0));
        assert_eq!(stored.secondary_balance, Decimal::ZERO);
        assert_eq!(store.count_entries(&LedgerQuery::default()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unsupported_quote_currency_is_rejected() {
        let (engine, store, oracle, user) = setup(1000, Some(50000)).await;
        let mut req = request(&user, "fiat", "secondary", "100");
        req.user_currency = Some("xyz".into());
        let err = engine.swap(req).await.unwrap_err();

        assert!(matches!(err, SwapError::Validation(ref m) if m.contains("XYZ")));
        assert_eq!(err.http_status(), 400);
        assert_eq!(*oracle.asked.lock().unwrap(), vec!["XYZ"]);
        let stored = store.get_user(user.id).await.unwrap().unwrap();
        assert_eq!(stored.fiat_balance, Decimal::new(1000, 0));
        assert_eq!(store.count_entries(&LedgerQuery::default()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_validation() {
        let (engine, _, _, user) = setup(1000, Some(50000)).await;
        for (from, to, amount) in [
            ("fiat", "fiat", "1"),
            ("fiat", "gold", "1"),
            ("fiat", "secondary", "0"),
            ("fiat", "secondary", "-5"),
            ("fiat", "secondary", "abc"),
            ("fiat", "secondary", "1.001"),
        ] {
            let err = engine.swap(request(&user, from, to, amount)).await.unwrap_err();
            assert_eq!(err.http_status(), 400, "{} {} {}", from, to, amount);
        }
    }

    #[tokio::test]
    async fn test_unknown_user() {
        let (engine, _, _, _) = setup(0, Some(1)).await;
        let ghost = User::new("g@x.io", "G");
        let err = engine.swap(request(&ghost, "fiat", "secondary", "1")).await.unwrap_err();
        assert!(matches!(err, SwapError::UserNotFound(id) if id == ghost.id));
    }

    #[tokio::test]
    async fn test_quote_currency_precedence() {
        let (engine, store, oracle, user) = setup(1000, Some(50000)).await;
        let mut req = request(&user, "fiat", "secondary", "1");
        req.user_currency = Some("eur".into());
        engine.swap(req.clone()).await.unwrap();

        let euro_user = store
            .create_user(
                User::new("e@x.io", "E")
                    .with_balances(Decimal::new(10, 0), Decimal::ZERO)
                    .with_currency("GBP"),
            )
            .await
            .unwrap();
        req.user_id = euro_user.id;
        engine.swap(req).await.unwrap();

        engine.swap(request(&user, "fiat", "secondary", "1")).await.unwrap();
        assert_eq!(*oracle.asked.lock().unwrap(), vec!["EUR", "GBP", "USD"]);
    }

    #[tokio::test]
    async fn test_concurrent_swaps_never_overdraw() {
        let (engine, store, _, user) = setup(1000, Some(50000)).await;
        let engine = Arc::new(engine);
        let mut handles = Vec::new();
        for _ in 0..5 {
            let engine = engine.clone();
            let req = request(&user, "fiat", "secondary", "300");
            handles.push(tokio::spawn(async move { engine.swap(req).await }));
        }
        let mut ok = 0;
        for h in handles {
            if h.await.unwrap().is_ok() {
                ok += 1;
            }
        }
        assert_eq!(ok, 3);
        let stored = store.get_user(user.id).await.unwrap().unwrap();
        assert_eq!(stored.fiat_balance, Decimal::new(100, 0));
        assert_eq!(store.count_entries(&LedgerQuery::default()).await.unwrap(), 6);
    }

    #[test]
    fn test_convert() {
        let rate = Decimal::new(50000, 0);
        assert_eq!(
            SwapEngine::convert(Asset::Fiat, Decimal::new(1, 0), rate).unwrap(),
            Decimal::from_str("0.00002").unwrap()
        );
        assert_eq!(
            SwapEngine::convert(Asset::Fiat, Decimal::new(1, 0), Decimal::new(3, 0)).unwrap(),
            Decimal::from_str("0.33333333").unwrap()
        );
    }
}
