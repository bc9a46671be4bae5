//! Outbound transfer scenarios.

use payhub_core::state_machine::TransferState;
use payhub_core::types::{Address, NetworkKind, TokenAmount};
use payhub_ledger::AccountId;
use payhub_routing::DepositKind;
use payhub_settlement::TransferKind;

use payhub_integration_tests::{eth, SimChain, TestHub};

/// Fund a user balance the way it happens in production: a confirmed
/// blockchain deposit.
async fn fund_user(hub: &TestHub, chain: &SimChain, user: &payhub_core::types::UserId, value: u128) {
    let height = chain.height().max(1);
    let (_, _, address) =
        hub.open_blockchain_deposit(user, DepositKind::Order { value }, height);
    chain.inject_payment(&address, &eth(), value);
    chain.seal_block();
    chain.seal_empty_blocks(10);
    hub.run_pass(chain).await;
}

#[tokio::test]
async fn test_internal_transfer_moves_balance_between_users() {
    let hub = TestHub::new();
    let alice = hub.accounts.create_user("alice").unwrap();
    let bob = hub.accounts.create_user("bob").unwrap();
    let chain = SimChain::new(1);
    chain.seal_empty_blocks(1);
    fund_user(&hub, &chain, &alice, 500).await;

    hub.transfers
        .create(
            alice.clone(),
            TokenAmount::new(eth(), 200),
            TransferKind::Internal {
                receiver: bob.clone(),
            },
        )
        .unwrap();
    hub.run_pass(&chain).await;

    assert_eq!(hub.ledger.balance(&AccountId::User(alice), &eth()), 300);
    assert_eq!(hub.ledger.balance(&AccountId::User(bob), &eth()), 200);
    assert_eq!(hub.ledger.balance(&AccountId::Treasury, &eth()), 0);
    assert!(hub.ledger.is_balanced());
}

#[tokio::test]
async fn test_external_transfer_settles_with_fee() {
    let hub = TestHub::new();
    let alice = hub.accounts.create_user("alice").unwrap();
    let chain = SimChain::new(1);
    chain.seal_empty_blocks(1);
    fund_user(&hub, &chain, &alice, 500).await;

    let operator = hub.wallets.generate();
    chain.fund(&operator, &eth(), 1_000_000);

    let id = hub
        .transfers
        .create(
            alice.clone(),
            TokenAmount::new(eth(), 200),
            TransferKind::Blockchain {
                to: Address::random(),
            },
        )
        .unwrap();
    hub.run_pass(&chain).await;
    assert_eq!(hub.transfers.get(id).unwrap().state, TransferState::Processed);

    hub.transfers
        .confirm(id, Some(TokenAmount::new(eth(), 5)))
        .unwrap();

    // 500 in, 200 out, 5 fee.
    assert_eq!(hub.ledger.balance(&AccountId::User(alice), &eth()), 295);
    assert_eq!(
        hub.ledger
            .balance(&AccountId::Network(NetworkKind::Blockchain), &eth()),
        -295
    );
    assert_eq!(hub.ledger.balance(&AccountId::Treasury, &eth()), 0);
    assert!(hub.ledger.is_balanced());
}

#[tokio::test]
async fn test_external_transfer_confirms_once_receipt_is_buried() {
    let hub = TestHub::new();
    let alice = hub.accounts.create_user("alice").unwrap();
    let chain = SimChain::new(1);
    chain.seal_empty_blocks(1);
    fund_user(&hub, &chain, &alice, 500).await;

    let operator = hub.wallets.generate();
    chain.fund(&operator, &eth(), 1_000_000);

    let id = hub
        .transfers
        .create(
            alice.clone(),
            TokenAmount::new(eth(), 200),
            TransferKind::Blockchain {
                to: Address::random(),
            },
        )
        .unwrap();
    hub.run_pass(&chain).await;
    assert_eq!(hub.transfers.get(id).unwrap().state, TransferState::Processed);

    // The submitted transaction is mined and buried past the threshold;
    // no explicit confirmation call is needed.
    chain.seal_block();
    chain.seal_empty_blocks(10);
    hub.run_pass(&chain).await;

    assert_eq!(hub.transfers.get(id).unwrap().state, TransferState::Confirmed);
    assert_eq!(hub.ledger.balance(&AccountId::User(alice), &eth()), 300);
    assert_eq!(
        hub.ledger
            .balance(&AccountId::Network(NetworkKind::Blockchain), &eth()),
        -300
    );
    assert_eq!(hub.ledger.balance(&AccountId::Treasury, &eth()), 0);
    assert!(hub.ledger.is_balanced());
}

#[tokio::test]
async fn test_failed_transfer_returns_reservation() {
    let hub = TestHub::new();
    let alice = hub.accounts.create_user("alice").unwrap();
    let chain = SimChain::new(1);
    chain.seal_empty_blocks(1);
    fund_user(&hub, &chain, &alice, 500).await;

    // An operator wallet exists but holds nothing on-chain.
    hub.wallets.generate();

    let id = hub
        .transfers
        .create(
            alice.clone(),
            TokenAmount::new(eth(), 200),
            TransferKind::Blockchain {
                to: Address::random(),
            },
        )
        .unwrap();
    assert_eq!(hub.ledger.balance(&AccountId::User(alice.clone()), &eth()), 300);

    hub.run_pass(&chain).await;

    let transfer = hub.transfers.get(id).unwrap();
    assert_eq!(transfer.state, TransferState::Failed);
    assert!(transfer.failure_reason.is_some());
    assert_eq!(hub.ledger.balance(&AccountId::User(alice), &eth()), 500);
    assert!(hub.ledger.is_balanced());
}

#[tokio::test]
async fn test_cancel_restores_balance_exactly() {
    let hub = TestHub::new();
    let alice = hub.accounts.create_user("alice").unwrap();
    let chain = SimChain::new(1);
    chain.seal_empty_blocks(1);
    fund_user(&hub, &chain, &alice, 123_456).await;

    let id = hub
        .transfers
        .create(
            alice.clone(),
            TokenAmount::new(eth(), 123_456),
            TransferKind::Blockchain {
                to: Address::random(),
            },
        )
        .unwrap();
    assert_eq!(hub.ledger.balance(&AccountId::User(alice.clone()), &eth()), 0);

    hub.transfers.cancel(id).unwrap();

    assert_eq!(
        hub.ledger.balance(&AccountId::User(alice), &eth()),
        123_456
    );
    assert_eq!(
        hub.transfers.get(id).unwrap().state,
        TransferState::Canceled
    );
    assert!(hub.ledger.is_balanced());
}
