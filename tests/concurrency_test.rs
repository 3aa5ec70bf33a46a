mod common;

use bankcore::application::Policy;
use bankcore::application::decoder::CommandVector;
use bankcore::domain::money::Balance;
use bankcore::error::ErrorKind;
use common::{bank, bank_with, decimal, open_account_line};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::task::JoinSet;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_overspend_never_breaches_limit() {
    let bank = bank().await;
    let (alice, alice_number) = bank.register("8001015009087", "Alice").await;
    let (bob, bob_number) = bank.register("8101015009088", "Bob").await;

    let mut tasks = JoinSet::new();
    for _ in 0..20 {
        let dispatcher = bank.dispatcher.clone();
        let line = format!("{}~pain~1~{}@~{}@~10~~~split", alice, alice_number, bob_number);
        tasks.spawn(async move {
            let vector = CommandVector::parse_line(&line);
            dispatcher.dispatch(&vector).await
        });
    }

    let mut approved = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined.unwrap() {
            Ok(_) => approved += 1,
            Err(e) => assert_eq!(e.kind(), ErrorKind::InsufficientFunds),
        }
    }

    // Each transfer costs 10.001 including the fee.
    assert_eq!(approved, 9);
    assert_eq!(bank.balance(&alice, &alice_number).await, dec!(9.991));
    assert_eq!(bank.balance(&bob, &bob_number).await, dec!(190));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_crossing_transfers_conserve_money() {
    let bank = bank().await;
    let (alice, alice_number) = bank.register("8001015009087", "Alice").await;
    let (bob, bob_number) = bank.register("8101015009088", "Bob").await;

    let mut tasks = JoinSet::new();
    for i in 0..50 {
        let dispatcher = bank.dispatcher.clone();
        let line = if i % 2 == 0 {
            format!("{}~pain~1~{}@~{}@~3~~~ping", alice, alice_number, bob_number)
        } else {
            format!("{}~pain~1~{}@~{}@~3~~~pong", bob, bob_number, alice_number)
        };
        tasks.spawn(async move {
            let vector = CommandVector::parse_line(&line);
            dispatcher.dispatch(&vector).await
        });
    }

    let mut approved = 0u32;
    while let Some(joined) = tasks.join_next().await {
        if joined.unwrap().is_ok() {
            approved += 1;
        }
    }

    let alice_balance = bank.balance(&alice, &alice_number).await;
    let bob_balance = bank.balance(&bob, &bob_number).await;
    let fees = dec!(0.0003) * Decimal::from(approved);
    assert!(alice_balance >= Decimal::ZERO);
    assert!(bob_balance >= Decimal::ZERO);
    assert_eq!(alice_balance + bob_balance + fees, dec!(200));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_logins_issue_distinct_sessions() {
    let bank = bank().await;
    bank.register("8001015009087", "Alice").await;

    let mut tasks = JoinSet::new();
    for _ in 0..10 {
        let dispatcher = bank.dispatcher.clone();
        tasks.spawn(async move {
            let line = format!("0~appauth~2~8001015009087~{}", common::PASSWORD);
            let vector = CommandVector::parse_line(&line);
            let reply = dispatcher.dispatch(&vector).await.unwrap();
            reply["token"].as_str().unwrap().to_string()
        });
    }

    let mut tokens = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        tokens.push(joined.unwrap());
    }
    tokens.sort();
    tokens.dedup();
    assert_eq!(tokens.len(), 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_close_never_swallows_a_racing_deposit() {
    let policy = Policy {
        opening_balance: Balance::ZERO,
        ..Policy::default()
    };
    let bank = bank_with(policy).await;
    let (alice, first) = bank.register("8001015009087", "Alice").await;
    let mut numbers = vec![first];
    for _ in 0..9 {
        let line = open_account_line("8001015009087", "Alice", "Tester", "cheque");
        let opened = bank.ok(&line).await;
        numbers.push(opened["account_number"].as_str().unwrap().to_string());
    }

    let mut tasks = JoinSet::new();
    for number in &numbers {
        let deposit = format!("{}~pain~1000~{}@~5~~~late", alice, number);
        let close = format!("{}~acmt~19~{}", alice, number);
        let dispatcher = bank.dispatcher.clone();
        tasks.spawn(async move {
            let deposit_cmd = CommandVector::parse_line(&deposit);
            let close_cmd = CommandVector::parse_line(&close);
            let (deposited, closed) = tokio::join!(
                dispatcher.dispatch(&deposit_cmd),
                dispatcher.dispatch(&close_cmd),
            );
            (deposited.is_ok(), closed.is_ok())
        });
    }

    let mut deposits = 0;
    while let Some(joined) = tasks.join_next().await {
        let (deposited, closed) = joined.unwrap();
        assert!(deposited != closed, "deposit {} close {}", deposited, closed);
        if deposited {
            deposits += 1;
        }
    }

    let accounts = bank.ok(&format!("{}~acmt~1001", alice)).await;
    let accounts = accounts.as_array().unwrap();
    assert_eq!(accounts.len(), deposits);
    for account in accounts {
        assert_eq!(decimal(&account["balance"]), dec!(5));
    }
}
