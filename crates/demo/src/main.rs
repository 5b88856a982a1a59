//! Replays the "buy coffee" walkthrough against an in-memory ledger:
//! deploy, three tips, withdraw to the owner, then list the memos.

use std::sync::Arc;

use anyhow::Context;

use tipjar_core::{Amount, Identity};
use tipjar_events::{EventEnvelope, InMemoryEventBus};
use tipjar_infra::{InMemoryBank, InMemoryEventStore, LedgerConfig, LedgerService, WithdrawalService};
use tipjar_ledger::LedgerId;

type Bus = Arc<InMemoryEventBus<EventEnvelope<serde_json::Value>>>;
type Withdrawals = WithdrawalService<InMemoryEventStore, Bus, InMemoryBank>;

/// One coffee, in the smallest unit (1e18).
const COFFEE: i128 = 1_000_000_000_000_000_000;

fn main() -> anyhow::Result<()> {
    tipjar_observability::init();

    let config = LedgerConfig::from_env().context("invalid ledger configuration")?;
    let bus: Bus = Arc::new(InMemoryEventBus::new());
    let ledger = Arc::new(LedgerService::from_config(InMemoryEventStore::new(), bus, &config));
    let withdrawals = WithdrawalService::new(ledger.clone(), InMemoryBank::new());
    let events = ledger.subscribe();

    let owner = Identity::new();
    let tippers = [
        (Identity::new(), "Carolina", "Good stuff! 1"),
        (Identity::new(), "Tom", "Good stuff! 2"),
        (Identity::new(), "Steve", "Good stuff! 3"),
    ];

    let ledger_id = ledger.initialize(owner).context("initialize ledger")?;
    tracing::info!(ledger_id = %ledger_id, owner = %owner, ?config, "== start ==");
    log_balances(&withdrawals, ledger_id, owner)?;

    for (sender, name, message) in tippers {
        ledger
            .buy_coffee(ledger_id, sender, COFFEE, name, message)
            .with_context(|| format!("buy coffee for {name}"))?;
    }
    tracing::info!("== coffee bought ==");
    log_balances(&withdrawals, ledger_id, owner)?;

    withdrawals.withdraw(ledger_id, owner).context("withdraw tips")?;
    tracing::info!("== withdraw funds ==");
    log_balances(&withdrawals, ledger_id, owner)?;

    tracing::info!("== memos ==");
    for memo in ledger.get_memos(ledger_id).context("read memos")? {
        tracing::info!(
            timestamp = %memo.timestamp,
            name = %memo.name,
            sender = %memo.sender,
            message = %memo.message,
            "memo"
        );
    }

    let published = events.drain();
    tracing::info!(events = published.len(), "ledger events published");

    Ok(())
}

fn log_balances(withdrawals: &Withdrawals, ledger_id: LedgerId, owner: Identity) -> anyhow::Result<()> {
    let jar: Amount = withdrawals.ledger().balance_of(ledger_id).context("read balance")?;
    let paid_out = withdrawals.transfer().balance_of(owner);
    tracing::info!(jar = %jar, owner_received = %paid_out, "balances");
    Ok(())
}
