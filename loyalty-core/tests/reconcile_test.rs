//! Reconciliation loop tests
//!
//! The accrual authority is replaced by a scripted fake. Loop tests run on a
//! paused tokio clock, so the one-second interval costs nothing.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::watch;

use loyalty_core::adapters::duckdb::DuckDbStore;
use loyalty_core::adapters::memory::InMemoryStore;
use loyalty_core::config::Config;
use loyalty_core::domain::result::Result;
use loyalty_core::ports::{AccrualAuthority, LedgerStore};
use loyalty_core::services::{
    BalanceService, ReconcileScope, Reconciler, ReconcilerConfig, WithdrawalService,
};
use loyalty_core::{
    AccrualReport, AccrualStatus, Error, LoopExit, LoyaltyContext, Order, OrderStatus,
    WithdrawOutcome,
};

type Answer = dyn Fn(usize, &str) -> Result<Option<AccrualReport>> + Send + Sync;

/// Authority whose answer depends on the call number (1-based) and order id
struct ScriptedAuthority {
    calls: AtomicUsize,
    answer: Box<Answer>,
}

impl ScriptedAuthority {
    fn new<F>(answer: F) -> Arc<Self>
    where
        F: Fn(usize, &str) -> Result<Option<AccrualReport>> + Send + Sync + 'static,
    {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            answer: Box::new(answer),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AccrualAuthority for ScriptedAuthority {
    async fn order_status(&self, order_id: &str) -> Result<Option<AccrualReport>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        (self.answer)(call, order_id)
    }
}

fn report(
    order_id: &str,
    status: AccrualStatus,
    accrual: Option<Decimal>,
) -> Option<AccrualReport> {
    Some(AccrualReport {
        order: order_id.to_string(),
        status,
        accrual,
    })
}

fn unreachable_authority() -> Result<Option<AccrualReport>> {
    Err(Error::authority("connection refused"))
}

async fn store_with(orders: &[&str]) -> Arc<dyn LedgerStore> {
    let store: Arc<dyn LedgerStore> = Arc::new(InMemoryStore::new());
    for id in orders {
        store.insert_order(&Order::new(*id, "alice")).await.unwrap();
    }
    store
}

fn reconciler(
    store: &Arc<dyn LedgerStore>,
    authority: &Arc<ScriptedAuthority>,
    scope: ReconcileScope,
) -> Reconciler {
    let authority: Arc<dyn AccrualAuthority> = authority.clone();
    Reconciler::new(
        Arc::clone(store),
        authority,
        ReconcilerConfig {
            scope,
            ..ReconcilerConfig::default()
        },
    )
}

#[tokio::test]
async fn test_repeated_processed_answer_leaves_order_identical() {
    let dir = tempfile::tempdir().unwrap();
    let duck = DuckDbStore::open(&dir.path().join("ledger.duckdb")).unwrap();
    duck.ensure_schema().unwrap();
    let store: Arc<dyn LedgerStore> = Arc::new(duck);
    store.insert_order(&Order::new("2377225624", "alice")).await.unwrap();

    let authority = ScriptedAuthority::new(|_, id| {
        Ok(report(id, AccrualStatus::Processed, Some(Decimal::new(72998, 2))))
    });
    let reconciler = reconciler(&store, &authority, ReconcileScope::All);

    let first = reconciler.run_cycle().await.unwrap();
    assert_eq!(first.updated, 1);
    let after_first = store.get_order("2377225624").await.unwrap().unwrap();
    assert_eq!(after_first.status, OrderStatus::Processed);
    assert_eq!(after_first.accrual, Decimal::new(72998, 2));

    let second = reconciler.run_cycle().await.unwrap();
    assert_eq!(second.polled, 1);
    let after_second = store.get_order("2377225624").await.unwrap().unwrap();
    assert_eq!(after_first, after_second);
    assert_eq!(
        serde_json::to_string(&after_first).unwrap(),
        serde_json::to_string(&after_second).unwrap()
    );
}

#[tokio::test]
async fn test_terminal_orders_are_never_modified() {
    let store = store_with(&["18", "26"]).await;
    store
        .update_order("18", OrderStatus::Processed, Decimal::new(10, 0))
        .await
        .unwrap();
    store
        .update_order("26", OrderStatus::Invalid, Decimal::ZERO)
        .await
        .unwrap();

    let authority = ScriptedAuthority::new(|_, id| {
        Ok(report(id, AccrualStatus::Processed, Some(Decimal::new(999, 0))))
    });
    let reconciler = reconciler(&store, &authority, ReconcileScope::All);

    let cycle = reconciler.run_cycle().await.unwrap();
    assert_eq!(cycle.polled, 2);
    assert_eq!(cycle.unchanged, 2);

    let processed = store.get_order("18").await.unwrap().unwrap();
    assert_eq!(processed.accrual, Decimal::new(10, 0));
    let invalid = store.get_order("26").await.unwrap().unwrap();
    assert_eq!(invalid.status, OrderStatus::Invalid);
}

#[tokio::test]
async fn test_open_scope_skips_terminal_orders() {
    let store = store_with(&["18", "26"]).await;
    store
        .update_order("18", OrderStatus::Processed, Decimal::new(10, 0))
        .await
        .unwrap();

    let authority =
        ScriptedAuthority::new(|_, id| Ok(report(id, AccrualStatus::Processing, None)));
    let reconciler = reconciler(&store, &authority, ReconcileScope::Open);

    let cycle = reconciler.run_cycle().await.unwrap();
    assert_eq!(cycle.polled, 1);
    assert_eq!(authority.calls(), 1);
    let order = store.get_order("26").await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Processing);
}

#[tokio::test]
async fn test_one_failing_order_does_not_block_the_rest() {
    let store = store_with(&["18", "26", "34"]).await;
    let authority = ScriptedAuthority::new(|_, id| match id {
        "26" => unreachable_authority(),
        _ => Ok(report(id, AccrualStatus::Processed, Some(Decimal::new(5, 0)))),
    });
    let reconciler = reconciler(&store, &authority, ReconcileScope::Open);

    let cycle = reconciler.run_cycle().await.unwrap();
    assert_eq!(cycle.failed, 1);
    assert_eq!(cycle.updated, 2);
    assert!(!cycle.is_failure());

    for id in ["18", "34"] {
        let order = store.get_order(id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Processed);
    }
    let failed = store.get_order("26").await.unwrap().unwrap();
    assert_eq!(failed.status, OrderStatus::New);
}

#[tokio::test]
async fn test_unregistered_order_is_left_alone() {
    let store = store_with(&["18"]).await;
    let authority = ScriptedAuthority::new(|_, _| Ok(None));
    let reconciler = reconciler(&store, &authority, ReconcileScope::Open);

    let cycle = reconciler.run_cycle().await.unwrap();
    assert_eq!(cycle.skipped, 1);
    assert!(!cycle.is_failure());
    let order = store.get_order("18").await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::New);
}

#[tokio::test]
async fn test_negative_accrual_is_never_recorded() {
    let store = store_with(&["18", "26"]).await;
    store
        .update_order("18", OrderStatus::Processed, Decimal::new(55, 0))
        .await
        .unwrap();
    let withdrawals = WithdrawalService::new(Arc::clone(&store));
    let outcome = withdrawals
        .withdraw("alice", "2377225624", Decimal::new(55, 0))
        .await
        .unwrap();
    assert!(matches!(outcome, WithdrawOutcome::Accepted(_)));

    let authority = ScriptedAuthority::new(|_, id| {
        Ok(report(id, AccrualStatus::Processed, Some(Decimal::new(-30, 0))))
    });
    let reconciler = reconciler(&store, &authority, ReconcileScope::Open);

    let cycle = reconciler.run_cycle().await.unwrap();
    assert_eq!(cycle.polled, 1);
    assert_eq!(cycle.updated, 0);
    assert_eq!(cycle.failed, 1);
    assert!(cycle.is_failure());

    let order = store.get_order("26").await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::New);
    assert_eq!(order.accrual, Decimal::ZERO);

    let balance = BalanceService::new(Arc::clone(&store))
        .balance("alice")
        .await
        .unwrap();
    assert_eq!(balance.current, Decimal::ZERO);
    assert_eq!(balance.withdrawn, Decimal::new(55, 0));
}

#[tokio::test]
async fn test_answer_for_another_order_is_not_applied() {
    let store = store_with(&["18", "26"]).await;
    let authority = ScriptedAuthority::new(|_, id| {
        let other = if id == "18" { "26" } else { "18" };
        Ok(report(other, AccrualStatus::Processed, Some(Decimal::new(100, 0))))
    });
    let reconciler = reconciler(&store, &authority, ReconcileScope::Open);

    let cycle = reconciler.run_cycle().await.unwrap();
    assert_eq!(cycle.polled, 2);
    assert_eq!(cycle.failed, 2);
    assert_eq!(cycle.updated, 0);

    for id in ["18", "26"] {
        let order = store.get_order(id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::New);
        assert_eq!(order.accrual, Decimal::ZERO);
    }
}

#[tokio::test]
async fn test_rate_limit_ends_cycle_early() {
    let store = store_with(&["18", "26"]).await;
    let authority = ScriptedAuthority::new(|_, _| {
        Err(Error::RateLimited {
            retry_after: Duration::from_secs(60),
        })
    });
    let reconciler = reconciler(&store, &authority, ReconcileScope::Open);

    let cycle = reconciler.run_cycle().await.unwrap();
    assert_eq!(authority.calls(), 1);
    assert_eq!(cycle.retry_after, Some(Duration::from_secs(60)));
    assert!(!cycle.is_failure());
}

#[tokio::test(start_paused = true)]
async fn test_loop_stops_after_too_many_failed_cycles() {
    let store = store_with(&["18"]).await;
    let authority = ScriptedAuthority::new(|_, _| unreachable_authority());
    let reconciler = reconciler(&store, &authority, ReconcileScope::Open);
    let state = reconciler.state();

    let (_tx, rx) = watch::channel(false);
    assert_eq!(reconciler.run(rx.clone()).await, LoopExit::Stopped);

    assert!(state.is_stopped());
    assert_eq!(state.consecutive_failures(), 11);
    assert_eq!(state.cycles_completed(), 11);
    assert_eq!(authority.calls(), 11);

    // stays stopped until reset
    assert_eq!(reconciler.run(rx.clone()).await, LoopExit::Stopped);
    assert_eq!(authority.calls(), 11);

    state.reset();
    assert!(!state.is_stopped());
    assert_eq!(reconciler.run(rx).await, LoopExit::Stopped);
    assert_eq!(authority.calls(), 22);
}

#[tokio::test(start_paused = true)]
async fn test_successful_cycle_resets_failure_count() {
    let store = store_with(&["18"]).await;
    // ten failures, one success, then failures forever
    let authority = ScriptedAuthority::new(|call, id| {
        if call == 11 {
            Ok(report(id, AccrualStatus::Processing, None))
        } else {
            unreachable_authority()
        }
    });
    let reconciler = reconciler(&store, &authority, ReconcileScope::Open);
    let state = reconciler.state();

    let (_tx, rx) = watch::channel(false);
    assert_eq!(reconciler.run(rx).await, LoopExit::Stopped);
    assert_eq!(state.cycles_completed(), 22);
}

#[tokio::test(start_paused = true)]
async fn test_empty_ledger_is_not_a_failure() {
    let store = store_with(&[]).await;
    let authority = ScriptedAuthority::new(|_, _| unreachable_authority());
    let reconciler = Arc::new(reconciler(&store, &authority, ReconcileScope::Open));
    let state = reconciler.state();

    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn({
        let reconciler = Arc::clone(&reconciler);
        async move { reconciler.run(rx).await }
    });

    tokio::time::sleep(Duration::from_secs(30)).await;
    tx.send(true).unwrap();

    assert_eq!(handle.await.unwrap(), LoopExit::Shutdown);
    assert_eq!(state.consecutive_failures(), 0);
    assert!(state.cycles_completed() >= 20);
    assert_eq!(authority.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_loop_exits_on_shutdown() {
    let store = store_with(&["18"]).await;
    let authority =
        ScriptedAuthority::new(|_, id| Ok(report(id, AccrualStatus::Processing, None)));
    let reconciler = Arc::new(reconciler(&store, &authority, ReconcileScope::Open));
    let state = reconciler.state();

    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn({
        let reconciler = Arc::clone(&reconciler);
        async move { reconciler.run(rx).await }
    });

    tokio::time::sleep(Duration::from_millis(3500)).await;
    tx.send(true).unwrap();

    let exit = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("loop must exit promptly")
        .unwrap();
    assert_eq!(exit, LoopExit::Shutdown);
    assert!(!state.is_stopped());
    assert!(state.cycles_completed() >= 1);

    let order = store.get_order("18").await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Processing);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_shutdown_sender_stops_loop() {
    let store = store_with(&["18"]).await;
    let authority = ScriptedAuthority::new(|_, _| Ok(None));
    let reconciler = reconciler(&store, &authority, ReconcileScope::Open);

    let (tx, rx) = watch::channel(false);
    drop(tx);
    assert_eq!(reconciler.run(rx).await, LoopExit::Shutdown);
    assert_eq!(authority.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_context_spawns_reconciler_task() {
    let store = store_with(&["18"]).await;
    let authority = ScriptedAuthority::new(|_, id| {
        Ok(report(id, AccrualStatus::Processed, Some(Decimal::new(42, 0))))
    });
    let authority_port: Arc<dyn AccrualAuthority> = authority.clone();
    let context =
        LoyaltyContext::with_parts(Config::default(), Arc::clone(&store), Some(authority_port));

    let (tx, rx) = watch::channel(false);
    let handle = context.spawn_reconciler(rx).expect("authority is configured");

    tokio::time::sleep(Duration::from_millis(2500)).await;
    tx.send(true).unwrap();
    assert_eq!(handle.await.unwrap(), LoopExit::Shutdown);

    let order = store.get_order("18").await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Processed);
    assert_eq!(order.accrual, Decimal::new(42, 0));
    // the order left the open scope after the first cycle
    assert_eq!(authority.calls(), 1);
}

#[tokio::test]
async fn test_context_without_authority_has_no_reconciler() {
    let store = store_with(&[]).await;
    let context = LoyaltyContext::with_parts(Config::default(), store, None);
    let (_tx, rx) = watch::channel(false);
    assert!(context.reconciler.is_none());
    assert!(context.spawn_reconciler(rx).is_none());
}
