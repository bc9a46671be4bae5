//! Inbound deposit scenarios, end to end through the sync workers.

use payhub_core::events::HubEvent;
use payhub_core::types::NetworkKind;
use payhub_ledger::AccountId;
use payhub_routing::{DepositKind, DepositStatus, RouteDescriptor};

use payhub_integration_tests::{eth, SimChain, TestHub};

#[tokio::test]
async fn test_blockchain_deposit_credits_user_through_clearing() {
    let hub = TestHub::new();
    let alice = hub.accounts.create_user("alice").unwrap();
    let chain = SimChain::new(1);
    chain.seal_empty_blocks(100);
    hub.run_pass(&chain).await;

    let (deposit, _, address) =
        hub.open_blockchain_deposit(&alice, DepositKind::Order { value: 100 }, 100);
    chain.inject_payment(&address, &eth(), 100);
    chain.seal_block();
    hub.run_pass(&chain).await;

    // Settled but below the confirmation threshold: no balance movement.
    assert_eq!(hub.ledger.balance(&AccountId::User(alice.clone()), &eth()), 0);
    assert_eq!(
        hub.tracker.deposit_status(&deposit, chain.height()),
        DepositStatus::Paid
    );

    chain.seal_empty_blocks(10);
    hub.run_pass(&chain).await;

    // The user gained, the clearing account owes, the treasury nets zero.
    assert_eq!(
        hub.ledger.balance(&AccountId::User(alice.clone()), &eth()),
        100
    );
    assert_eq!(
        hub.ledger
            .balance(&AccountId::Network(NetworkKind::Blockchain), &eth()),
        -100
    );
    assert_eq!(hub.ledger.balance(&AccountId::Treasury, &eth()), 0);
    assert!(hub.ledger.is_balanced());
    assert_eq!(
        hub.tracker.deposit_status(&deposit, chain.height()),
        DepositStatus::Confirmed
    );
}

#[tokio::test]
async fn test_partial_payments_reach_target_together() {
    let hub = TestHub::new();
    let alice = hub.accounts.create_user("alice").unwrap();
    let chain = SimChain::new(1);
    chain.seal_empty_blocks(100);
    hub.run_pass(&chain).await;

    let (deposit, _, address) =
        hub.open_blockchain_deposit(&alice, DepositKind::Order { value: 100 }, 100);

    chain.inject_payment(&address, &eth(), 40);
    chain.seal_block();
    chain.inject_payment(&address, &eth(), 60);
    chain.seal_block();
    hub.run_pass(&chain).await;

    assert_eq!(hub.tracker.total_paid(deposit.id), 100);
    assert_eq!(
        hub.tracker.deposit_status(&deposit, chain.height()),
        DepositStatus::Paid
    );

    chain.seal_empty_blocks(10);
    hub.run_pass(&chain).await;

    assert_eq!(hub.tracker.total_confirmed(deposit.id), 100);
    assert_eq!(hub.ledger.balance(&AccountId::User(alice), &eth()), 100);
    assert!(hub.ledger.is_balanced());
}

#[tokio::test]
async fn test_unpaid_route_expires_and_is_announced() {
    let hub = TestHub::new();
    let alice = hub.accounts.create_user("alice").unwrap();
    let chain = SimChain::new(1);
    chain.seal_empty_blocks(100);
    hub.run_pass(&chain).await;

    let mut rx = hub.bus.subscribe();
    let (deposit, route, _) =
        hub.open_blockchain_deposit(&alice, DepositKind::Order { value: 100 }, 100);

    // Past the route's window with no payment.
    chain.seal_empty_blocks(101);
    hub.run_pass(&chain).await;

    let expired = loop {
        match rx.recv().await.unwrap() {
            HubEvent::RouteExpired { route_id } => break route_id,
            _ => continue,
        }
    };
    assert_eq!(expired, route.id);
    assert_eq!(
        hub.tracker.deposit_status(&deposit, chain.height()),
        DepositStatus::Expired
    );
    assert_eq!(hub.ledger.balance(&AccountId::User(alice), &eth()), 0);
}

#[tokio::test]
async fn test_channel_deposit_confirms_without_waiting() {
    let hub = TestHub::new();
    let alice = hub.accounts.create_user("alice").unwrap();
    hub.channels.register("node-1");
    hub.channels.set_online("node-1", true);
    hub.channels.set_capacity("node-1", eth(), 10_000);

    let deposit = payhub_routing::Deposit::new(
        alice.clone(),
        eth(),
        DepositKind::Order { value: 750 },
    );
    hub.deposits.insert(deposit.clone());
    let route = hub
        .allocator
        .make(&deposit, NetworkKind::Channel, None)
        .unwrap();
    match &route.descriptor {
        RouteDescriptor::Channel { node_id, .. } => assert_eq!(node_id, "node-1"),
        _ => panic!("expected channel route"),
    }

    hub.tracker
        .channel_payment("node-1", route.id, 9, 750)
        .unwrap();

    assert_eq!(hub.ledger.balance(&AccountId::User(alice), &eth()), 750);
    assert_eq!(
        hub.ledger
            .balance(&AccountId::Network(NetworkKind::Channel), &eth()),
        -750
    );
    assert!(hub.ledger.is_balanced());
    assert_eq!(
        hub.tracker.deposit_status(&deposit, 0),
        DepositStatus::Confirmed
    );
}
