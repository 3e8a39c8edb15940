mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{fast_config, Harness, Reply};
use rust_decimal_macros::dec;
use shipsync_core::{Order, OrderStore, Seller};
use shipsync_order::{RunObserver, RunOptions, RunPhase, RunReport, SchedulerConfig};
use tokio::sync::watch;

#[tokio::test]
async fn one_failing_order_does_not_stop_the_run() {
    let h = Harness::new().await;
    let slow = h.shipped_order("YAL-200", "Expédié", dec!(100)).await;
    let delivered = h.shipped_order("YAL-201", "Expédié", dec!(250)).await;
    let quiet = h.shipped_order("YAL-202", "Expédié", dec!(80)).await;
    h.carrier.set("YAL-200", Reply::TimedOut);
    h.carrier.set("YAL-201", Reply::Status("Livré"));
    h.carrier.set("YAL-202", Reply::NoData);

    let report = h.scheduler(fast_config()).run_once(RunOptions::default()).await.unwrap();

    assert_eq!(report.candidates, 3);
    assert_eq!(report.failed, 1);
    assert_eq!(report.updated, 1);
    assert_eq!(report.unchanged, 1);
    assert_eq!(report.credited, 1);
    assert_eq!(h.reload(&slow).await.status, slow.status);
    assert_eq!(h.reload(&delivered).await.status.as_deref(), Some("Livré"));
    assert_eq!(h.reload(&quiet).await.status, quiet.status);
    assert_eq!(h.store.history_for(slow.id).await.unwrap().len(), 0);
    assert_eq!(h.store.history_for(quiet.id).await.unwrap().len(), 0);
    // Failed and unchanged attempts are still recorded as synced.
    assert!(h.reload(&slow).await.last_synced_at.is_some());
    assert!(h.reload(&quiet).await.last_synced_at.is_some());
    assert_eq!(h.balance().await, dec!(250));
}

#[tokio::test]
async fn hanging_carrier_is_cut_off_by_order_timeout() {
    let h = Harness::new().await;
    let stuck = h.shipped_order("YAL-210", "Expédié", dec!(100)).await;
    h.shipped_order("YAL-211", "Expédié", dec!(100)).await;
    h.carrier.set("YAL-210", Reply::Hang);
    h.carrier.set("YAL-211", Reply::Status("En cours de livraison"));

    let report = tokio::time::timeout(
        Duration::from_secs(5),
        h.scheduler(fast_config()).run_once(RunOptions::default()),
    )
    .await
    .expect("run must not wait for the hanging carrier")
    .unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(report.updated, 1);
    let stored = h.reload(&stuck).await;
    assert_eq!(stored.status, stuck.status);
    assert!(stored.last_synced_at.is_some());
}

#[tokio::test]
async fn delivered_orders_leave_the_candidate_set() {
    let h = Harness::new().await;
    h.shipped_order("YAL-220", "En cours de livraison", dec!(600)).await;
    h.carrier.set("YAL-220", Reply::Status("Livré"));
    let scheduler = h.scheduler(fast_config());

    let first = scheduler.run_once(RunOptions::default()).await.unwrap();
    let calls_after_first = h.carrier.calls();
    let second = scheduler.run_once(RunOptions::default()).await.unwrap();

    assert_eq!(first.candidates, 1);
    assert_eq!(second.candidates, 0);
    assert_eq!(h.carrier.calls(), calls_after_first);
    assert_eq!(h.balance().await, dec!(600));
}

#[tokio::test]
async fn repeated_runs_credit_exactly_once() {
    let h = Harness::new().await;
    h.shipped_order("YAL-230", "Expédié", dec!(1500)).await;
    h.shipped_order("YAL-231", "Expédié", dec!(500)).await;
    h.carrier.set("YAL-230", Reply::Status("Livré"));
    h.carrier.set("YAL-231", Reply::Status("Livré"));
    let scheduler = h.scheduler(fast_config());

    let mut credited = 0;
    for _ in 0..5 {
        let report = scheduler.run_once(RunOptions { force: true, limit: None }).await.unwrap();
        credited += report.credited;
    }

    assert_eq!(credited, 2);
    assert_eq!(h.balance().await, dec!(2000));
}

#[tokio::test]
async fn force_and_limit_override_default_selection() {
    let h = Harness::new().await;
    h.shipped_order("YAL-240", "Livré", dec!(10)).await;
    h.shipped_order("YAL-241", "Expédié", dec!(10)).await;
    h.shipped_order("YAL-242", "Expédié", dec!(10)).await;
    let scheduler = h.scheduler(fast_config());

    let default = scheduler.run_once(RunOptions::default()).await.unwrap();
    let forced = scheduler.run_once(RunOptions { force: true, limit: None }).await.unwrap();
    let capped = scheduler.run_once(RunOptions { force: true, limit: Some(1) }).await.unwrap();

    assert_eq!(default.candidates, 2);
    assert_eq!(forced.candidates, 3);
    assert!(forced.forced);
    assert_eq!(capped.candidates, 1);
}

#[tokio::test]
async fn configured_batch_limit_applies_when_no_override() {
    let h = Harness::new().await;
    for i in 0..5 {
        h.shipped_order(&format!("YAL-25{}", i), "Expédié", dec!(10)).await;
    }
    let config = SchedulerConfig {
        batch_limit: Some(2),
        ..fast_config()
    };

    let report = h.scheduler(config).run_once(RunOptions::default()).await.unwrap();

    assert_eq!(report.candidates, 2);
}

#[tokio::test]
async fn capped_runs_rotate_through_all_candidates() {
    let h = Harness::new().await;
    let quiet = h.shipped_order("YAL-255", "Expédié", dec!(10)).await;
    let delivered = h.shipped_order("YAL-256", "Expédié", dec!(725)).await;
    h.carrier.set("YAL-255", Reply::Status("Expédié"));
    h.carrier.set("YAL-256", Reply::Status("Livré"));
    let scheduler = h.scheduler(fast_config());

    for _ in 0..2 {
        let report = scheduler.run_once(RunOptions { force: false, limit: Some(1) }).await.unwrap();
        assert_eq!(report.candidates, 1);
    }

    assert_eq!(h.reload(&delivered).await.status.as_deref(), Some("Livré"));
    assert_eq!(h.reload(&quiet).await.status.as_deref(), Some("Expédié"));
    assert!(h.reload(&quiet).await.last_synced_at.is_some());
    assert_eq!(h.balance().await, dec!(725));
}

#[tokio::test]
async fn failed_settlement_is_retried_on_a_later_run() {
    let h = Harness::new().await;
    let seller = Seller::new("Late Seller");
    let seller_id = seller.id;
    let order = Order::new(seller_id, dec!(880))
        .with_tracking_number("YAL-260")
        .with_status("En cours de livraison");
    h.store.insert_order(order.clone()).await;
    h.carrier.set("YAL-260", Reply::Status("Livré"));
    let scheduler = h.scheduler(fast_config());

    let first = scheduler.run_once(RunOptions::default()).await.unwrap();
    assert_eq!(first.settlement_failures, 1);
    assert_eq!(first.settlement_retries, 0);
    assert!(!h.reload(&order).await.is_settled());

    // Seller record shows up; the order is delivered and no longer a candidate.
    h.store.insert_seller(seller).await;
    let second = scheduler.run_once(RunOptions::default()).await.unwrap();

    assert_eq!(second.candidates, 0);
    assert_eq!(second.settlement_retries, 1);
    assert_eq!(second.credited, 1);
    assert!(h.reload(&order).await.is_settled());
    assert_eq!(h.store.seller(seller_id).await.unwrap().balance, dec!(880));
    assert_eq!(h.store.history_for(order.id).await.unwrap().len(), 1);
}

#[derive(Default)]
struct Recorder {
    reports: Mutex<Vec<RunReport>>,
}

impl RunObserver for Recorder {
    fn on_run_completed(&self, report: &RunReport) {
        self.reports.lock().unwrap().push(report.clone());
    }
}

#[tokio::test]
async fn observer_sees_each_run_and_phase_returns_to_idle() {
    let h = Harness::new().await;
    h.shipped_order("YAL-270", "Expédié", dec!(10)).await;
    let recorder = Arc::new(Recorder::default());
    let scheduler = h.scheduler(fast_config()).with_observer(recorder.clone());

    scheduler.run_once(RunOptions::default()).await.unwrap();

    assert_eq!(recorder.reports.lock().unwrap().len(), 1);
    assert_eq!(scheduler.phase(), RunPhase::Idle);
}

#[tokio::test]
async fn run_forever_ticks_until_shutdown() {
    let h = Harness::new().await;
    h.shipped_order("YAL-280", "Expédié", dec!(10)).await;
    h.carrier.set("YAL-280", Reply::Status("Expédié"));
    let recorder = Arc::new(Recorder::default());
    let scheduler = Arc::new(h.scheduler(fast_config()).with_observer(recorder.clone()));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let task = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.run_forever(shutdown_rx).await })
    };
    tokio::time::sleep(Duration::from_millis(180)).await;
    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("scheduler should stop")
        .unwrap();

    assert!(recorder.reports.lock().unwrap().len() >= 2);
    assert_eq!(scheduler.phase(), RunPhase::Idle);
}
