//! Chain reorganization scenarios.

use payhub_core::types::NetworkKind;
use payhub_ledger::AccountId;
use payhub_routing::DepositKind;

use payhub_integration_tests::{eth, SimChain, TestHub};

#[tokio::test]
async fn test_reorg_unwinds_confirmed_deposit() {
    let hub = TestHub::new();
    let alice = hub.accounts.create_user("alice").unwrap();
    let chain = SimChain::new(1);
    chain.seal_empty_blocks(100);
    hub.run_pass(&chain).await;

    let (deposit, _, address) =
        hub.open_blockchain_deposit(&alice, DepositKind::Order { value: 100 }, 100);
    chain.inject_payment(&address, &eth(), 100);
    chain.seal_block();
    chain.seal_empty_blocks(10);
    hub.run_pass(&chain).await;
    assert_eq!(
        hub.ledger.balance(&AccountId::User(alice.clone()), &eth()),
        100
    );

    // The chain drops back below the payment's block.
    chain.truncate(100);
    hub.run_pass(&chain).await;

    assert_eq!(hub.tracker.cursor(1), 100);
    assert!(hub.tracker.payments_for(deposit.id).is_empty());
    assert_eq!(hub.ledger.balance(&AccountId::User(alice.clone()), &eth()), 0);
    assert_eq!(
        hub.ledger
            .balance(&AccountId::Network(NetworkKind::Blockchain), &eth()),
        0
    );
    assert!(hub.ledger.is_balanced());
}

#[tokio::test]
async fn test_payment_reconfirms_on_canonical_chain() {
    let hub = TestHub::new();
    let alice = hub.accounts.create_user("alice").unwrap();
    let chain = SimChain::new(1);
    chain.seal_empty_blocks(100);
    hub.run_pass(&chain).await;

    let (deposit, _, address) =
        hub.open_blockchain_deposit(&alice, DepositKind::Order { value: 100 }, 100);
    chain.inject_payment(&address, &eth(), 100);
    chain.seal_block();
    chain.seal_empty_blocks(10);
    hub.run_pass(&chain).await;

    chain.truncate(100);
    hub.run_pass(&chain).await;
    assert_eq!(hub.ledger.balance(&AccountId::User(alice.clone()), &eth()), 0);

    // The payment is mined again on the canonical chain and reconfirms.
    chain.inject_payment(&address, &eth(), 100);
    chain.seal_block();
    chain.seal_empty_blocks(10);
    hub.run_pass(&chain).await;

    assert_eq!(hub.tracker.total_confirmed(deposit.id), 100);
    assert_eq!(hub.ledger.balance(&AccountId::User(alice), &eth()), 100);
    assert!(hub.ledger.is_balanced());
}

#[tokio::test]
async fn test_reorg_spares_deeper_payments() {
    let hub = TestHub::new();
    let alice = hub.accounts.create_user("alice").unwrap();
    let chain = SimChain::new(1);
    chain.seal_empty_blocks(100);
    hub.run_pass(&chain).await;

    // Two open-ended payments, far apart.
    let (deposit, _, address) = hub.open_blockchain_deposit(&alice, DepositKind::Open, 100);
    chain.inject_payment(&address, &eth(), 100);
    chain.seal_block(); // block 101
    chain.seal_empty_blocks(48);
    chain.inject_payment(&address, &eth(), 50);
    chain.seal_block(); // block 150
    chain.seal_empty_blocks(10);
    hub.run_pass(&chain).await;
    assert_eq!(hub.tracker.total_confirmed(deposit.id), 150);

    // Reorg above the first payment, below the second.
    chain.truncate(120);
    hub.run_pass(&chain).await;

    assert_eq!(hub.tracker.total_confirmed(deposit.id), 100);
    assert_eq!(hub.ledger.balance(&AccountId::User(alice), &eth()), 100);
    assert!(hub.ledger.is_balanced());
}
